use std::time::Duration;

use chrono::NaiveDateTime;
use chrono_tz::Tz;
use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::scraper::{DEFAULT_USER_AGENT, FetchRequest};
use crate::text::slug_to_name;

const LIST_SEPARATORS: [char; 4] = ['|', ',', ';', '\n'];
const CLUB_PREFIX: &str = "MyFitnessPlace";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    pub debug: bool,
    pub enable_swagger: bool,
    pub port: u16,
    pub schedule_urls: String,
    pub club_names: Option<String>,
    pub event_selectors: Option<String>,
    pub timezone: String,
    pub max_results: usize,
    pub user_agent: String,
    pub request_timeout_s: u64,
    pub use_browser: bool,
    pub browser_wait_selector: Option<String>,
    pub browser_timeout_s: u64,
    pub browser_headless: bool,
    pub seek_week: bool,
    pub max_steps: u32,
}

/// One configured schedule page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClubSource {
    pub name: String,
    pub url: Url,
    pub selector: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let config = Config::builder()
            // APP_ prefixed variables; "__" so keys like schedule_urls stay whole
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_default("debug", false)?
            .set_default("enable_swagger", true)?
            .set_default("port", 8080)?
            .set_default("schedule_urls", "")?
            .set_default("timezone", "Europe/Warsaw")?
            .set_default("max_results", 20)?
            .set_default("user_agent", DEFAULT_USER_AGENT)?
            .set_default("request_timeout_s", 20)?
            .set_default("use_browser", true)?
            .set_default("browser_timeout_s", 25)?
            .set_default("browser_headless", true)?
            .set_default("seek_week", true)?
            .set_default("max_steps", 12)?
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.clubs()?;
        settings.tz()?;
        Ok(settings)
    }

    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse()
            .map_err(|err| ConfigError::Message(format!("invalid timezone {}: {err}", self.timezone)))
    }

    pub fn clubs(&self) -> Result<Vec<ClubSource>, ConfigError> {
        let urls = split_list(&self.schedule_urls)
            .into_iter()
            .map(|raw| {
                Url::parse(&raw)
                    .map_err(|err| ConfigError::Message(format!("invalid schedule url {raw}: {err}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if urls.is_empty() {
            return Err(ConfigError::Message("APP_SCHEDULE_URLS is required".into()));
        }

        let names = match split_list(self.club_names.as_deref().unwrap_or_default()) {
            names if names.is_empty() => urls.iter().map(derive_club_name).collect(),
            names => align(names, urls.len(), "APP_CLUB_NAMES")?,
        };
        let selectors = match split_list(self.event_selectors.as_deref().unwrap_or_default()) {
            selectors if selectors.is_empty() => vec![None; urls.len()],
            selectors => align(selectors, urls.len(), "APP_EVENT_SELECTORS")?
                .into_iter()
                .map(Some)
                .collect(),
        };

        Ok(urls
            .into_iter()
            .zip(names)
            .zip(selectors)
            .map(|((url, name), selector)| ClubSource { name, url, selector })
            .collect())
    }

    /// `now` and `tz` are the studio's wall clock and zone.
    pub fn fetch_request(&self, club: &ClubSource, now: NaiveDateTime, tz: Tz) -> FetchRequest {
        FetchRequest {
            selector: club.selector.clone(),
            wait_selector: self.browser_wait_selector.clone(),
            user_agent: self.user_agent.clone(),
            use_browser: self.use_browser,
            headless: self.browser_headless,
            static_timeout: Duration::from_secs(self.request_timeout_s),
            browser_timeout: Duration::from_secs(self.browser_timeout_s),
            seek_week: self.seek_week,
            max_steps: self.max_steps,
            tz,
            ..FetchRequest::new(club.url.clone(), now)
        }
    }
}

pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(LIST_SEPARATORS)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

/// A single value applies to every club; otherwise one value per club.
fn align(values: Vec<String>, count: usize, key: &str) -> Result<Vec<String>, ConfigError> {
    match values.len() {
        1 => Ok(vec![values[0].clone(); count]),
        n if n == count => Ok(values),
        n => Err(ConfigError::Message(format!(
            "{key} has {n} values for {count} schedule urls"
        ))),
    }
}

/// `.../krakow-bonarka/grafik-zajec` becomes "MyFitnessPlace Krakow Bonarka".
pub fn derive_club_name(url: &Url) -> String {
    let segments: Vec<&str> = url
        .path_segments()
        .map(|parts| parts.filter(|part| !part.is_empty()).collect())
        .unwrap_or_default();
    let slug = match segments.iter().position(|part| *part == "grafik-zajec") {
        Some(index) if index > 0 => Some(segments[index - 1]),
        _ => segments.last().copied(),
    };
    match slug.map(slug_to_name).filter(|name| !name.is_empty()) {
        Some(name) => format!("{CLUB_PREFIX} {name}"),
        None => "Schedule".to_string(),
    }
}
