use std::future::Future;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use reqwest::header::{ACCEPT_LANGUAGE, USER_AGENT};
use scraper::Html;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::browser::{BrowserError, CancelFlag, render_schedule};
use crate::heuristic::extract_heuristic;
use crate::models::ScheduleResult;
use crate::structured::extract_structured;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; StudioSlots/1.0)";
const LANGUAGES: &str = "pl,en;q=0.8";
const BUDGET_OVERHEAD: Duration = Duration::from_secs(10);
const STEP_ALLOWANCE: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),
    #[error("schedule fetch timed out after {0:?}")]
    Timeout(Duration),
    #[error("browser worker failed: {0}")]
    Worker(String),
}

/// One schedule source to fetch, with everything the fetch needs.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    /// Overrides candidate discovery in the heuristic extractor.
    pub selector: Option<String>,
    pub wait_selector: Option<String>,
    pub user_agent: String,
    pub use_browser: bool,
    pub headless: bool,
    pub static_timeout: Duration,
    pub browser_timeout: Duration,
    pub seek_week: bool,
    pub max_steps: u32,
    /// Local wall-clock reference for year inference and week seeking.
    pub now: NaiveDateTime,
    /// Zone that Unix timestamps in the markup are converted into.
    pub tz: Tz,
}

impl FetchRequest {
    pub fn new(url: Url, now: NaiveDateTime) -> Self {
        Self {
            url,
            selector: None,
            wait_selector: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            use_browser: true,
            headless: true,
            static_timeout: Duration::from_secs(20),
            browser_timeout: Duration::from_secs(25),
            seek_week: true,
            max_steps: 12,
            now,
            tz: chrono_tz::Europe::Warsaw,
        }
    }

    pub fn timeout_budget(&self) -> Duration {
        self.static_timeout.max(self.browser_timeout) + BUDGET_OVERHEAD + STEP_ALLOWANCE * self.max_steps
    }
}

/// The browser is only worth launching when the static page gave nothing.
pub fn needs_escalation(result: &ScheduleResult, request: &FetchRequest) -> bool {
    request.use_browser && result.is_empty()
}

/// Structured markup wins whenever present; otherwise the heuristic runs.
pub fn parse_schedule_html(
    html: &str,
    selector: Option<&str>,
    today: NaiveDate,
    tz: Tz,
    base_url: &Url,
) -> ScheduleResult {
    let document = Html::parse_document(html);
    if let Some(result) = extract_structured(&document, base_url) {
        return result;
    }
    extract_heuristic(&document, selector, today, tz, base_url)
}

/// Runs `fetch` for at most `budget`. On expiry the flag is raised so a
/// browser session still running on its own thread stops at its next step.
async fn within_budget<F>(
    budget: Duration,
    cancel: &CancelFlag,
    url: &Url,
    fetch: F,
) -> Result<ScheduleResult, FetchError>
where
    F: Future<Output = Result<ScheduleResult, FetchError>>,
{
    match tokio::time::timeout(budget, fetch).await {
        Ok(result) => result,
        Err(_) => {
            cancel.cancel();
            warn!(url = %url, ?budget, "schedule fetch timed out");
            Err(FetchError::Timeout(budget))
        }
    }
}

#[derive(Clone, Default)]
pub struct ScheduleScraper {
    client: reqwest::Client,
}

impl ScheduleScraper {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn fetch_html(&self, request: &FetchRequest) -> Result<String, FetchError> {
        let response = self
            .client
            .get(request.url.as_str())
            .header(USER_AGENT, request.user_agent.as_str())
            .header(ACCEPT_LANGUAGE, LANGUAGES)
            .timeout(request.static_timeout)
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;
        Ok(body)
    }

    /// Fetches and parses one source within its timeout budget.
    pub async fn fetch_schedule(&self, request: &FetchRequest) -> Result<ScheduleResult, FetchError> {
        let cancel = CancelFlag::default();
        let budget = request.timeout_budget();
        within_budget(budget, &cancel, &request.url, self.fetch_and_parse(request, &cancel)).await
    }

    async fn fetch_and_parse(
        &self,
        request: &FetchRequest,
        cancel: &CancelFlag,
    ) -> Result<ScheduleResult, FetchError> {
        let today = request.now.date();
        let selector = request.selector.as_deref();

        let html = self.fetch_html(request).await?;
        let result = parse_schedule_html(&html, selector, today, request.tz, &request.url);
        info!(
            url = %request.url,
            slots = result.slots.len(),
            raw_count = result.raw_count,
            "parsed static schedule"
        );
        if !needs_escalation(&result, request) {
            return Ok(result);
        }

        info!(url = %request.url, "no slots in static page, rendering in browser");
        let html = self.render_in_browser(request, cancel).await?;
        let result = parse_schedule_html(&html, selector, today, request.tz, &request.url);
        info!(
            url = %request.url,
            slots = result.slots.len(),
            raw_count = result.raw_count,
            "parsed rendered schedule"
        );
        Ok(result)
    }

    async fn render_in_browser(
        &self,
        request: &FetchRequest,
        cancel: &CancelFlag,
    ) -> Result<String, FetchError> {
        let request = request.clone();
        let cancel = cancel.clone();
        let html = tokio::task::spawn_blocking(move || render_schedule(&request, &cancel))
            .await
            .map_err(|err| FetchError::Worker(err.to_string()))??;
        Ok(html)
    }
}
