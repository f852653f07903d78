//! Headless Chrome session for schedules rendered on the client.
//!
//! The session runs on a blocking thread. Everything the navigation loop
//! needs from the browser goes through [`SchedulePage`], and every UI
//! interaction reports a [`UiOutcome`] instead of failing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::Duration;

use headless_chrome::{Browser, LaunchOptions, Tab};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::filter::week_range;
use crate::navigation::{WeekSeek, prepare_page, seek_week};
use crate::scraper::FetchRequest;

const ACCEPT_LANGUAGE: &str = "pl,en;q=0.8";
const RESPONSE_HANDLER: &str = "schedule-responses";

static API_HINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(api|graphql|schedule|timetable|grafik|lesson|class|event|calendar|plan)")
        .expect("regex compiles")
});

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("browser session failed: {0}")]
    Session(String),
    #[error("browser session cancelled")]
    Cancelled,
}

fn session_error(err: impl std::fmt::Display) -> BrowserError {
    BrowserError::Session(err.to_string())
}

/// Raised when the caller stops waiting; the session checks it between steps.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiAction {
    AcceptCookies,
    WeekView,
    Today,
    Previous,
    Next,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiOutcome {
    Acted,
    NotFound,
    /// A control was found but interacting with it failed.
    Failed,
}

impl UiOutcome {
    pub fn acted(self) -> bool {
        self == UiOutcome::Acted
    }
}

/// What the navigation loop needs from a rendered page.
pub trait SchedulePage {
    fn content(&self) -> Result<String, BrowserError>;
    fn act(&self, action: UiAction) -> UiOutcome;
    fn wait_for_selector(&self, selector: &str, timeout: Duration) -> bool;
    fn pause(&self, delay: Duration);
}

/// A clickable control: a CSS selector, or an element of `tag` whose text
/// contains `label` (case-insensitive).
#[derive(Debug, Clone, Copy)]
pub enum Control {
    Css(&'static str),
    Label { tag: &'static str, label: &'static str },
}

const fn button(label: &'static str) -> Control {
    Control::Label { tag: "button", label }
}

const fn link(label: &'static str) -> Control {
    Control::Label { tag: "a", label }
}

const COOKIE_CONTROLS: &[Control] = &[
    button("Zaakceptuj i zamknij"),
    button("Zaakceptuj"),
    button("Akceptuj"),
    button("Akcept"),
    button("Zgadzam"),
    button("Accept"),
    button("OK"),
    button("Rozumiem"),
    button("Zamknij"),
    Control::Css(r#"[aria-label*="accept" i]"#),
    Control::Css(r#"[aria-label*="zgadzam" i]"#),
];

const WEEK_VIEW_CONTROLS: &[Control] = &[
    Control::Css(".fc-timeGridWeek-button"),
    Control::Css(".fc-dayGridWeek-button"),
    Control::Css(".fc-listWeek-button"),
    button("Tydzień"),
    button("Tydzien"),
    button("Week"),
    link("Tydzień"),
    link("Tydzien"),
];

const TODAY_CONTROLS: &[Control] = &[
    Control::Css(".fc-today-button"),
    button("Dziś"),
    button("Dzis"),
    button("Dzisiaj"),
    button("Today"),
    button("Teraz"),
    link("Dziś"),
    link("Dzis"),
    link("Dzisiaj"),
    Control::Css(r#"[aria-label*="today" i]"#),
    Control::Css(r#"[aria-label*="dzis" i]"#),
];

const PREVIOUS_CONTROLS: &[Control] = &[
    Control::Css(".fc-prev-button"),
    Control::Css(".swiper-button-prev"),
    button("Poprzed"),
    button("Prev"),
    button("‹"),
    button("<"),
    link("Poprzed"),
    Control::Css(r#"a[rel="prev"]"#),
    Control::Css(r#"[aria-label*="prev" i]"#),
];

const NEXT_CONTROLS: &[Control] = &[
    Control::Css(".fc-next-button"),
    Control::Css(".swiper-button-next"),
    button("Nast"),
    button("Next"),
    button("›"),
    button(">"),
    link("Nast"),
    Control::Css(r#"a[rel="next"]"#),
    Control::Css(r#"[aria-label*="next" i]"#),
];

impl UiAction {
    /// Candidates in the order they are tried.
    pub fn controls(self) -> &'static [Control] {
        match self {
            UiAction::AcceptCookies => COOKIE_CONTROLS,
            UiAction::WeekView => WEEK_VIEW_CONTROLS,
            UiAction::Today => TODAY_CONTROLS,
            UiAction::Previous => PREVIOUS_CONTROLS,
            UiAction::Next => NEXT_CONTROLS,
        }
    }
}

pub struct ChromePage {
    tab: Arc<Tab>,
}

impl ChromePage {
    fn click_control(&self, control: Control) -> UiOutcome {
        let (selector, label) = match control {
            Control::Css(selector) => (selector, None),
            Control::Label { tag, label } => (tag, Some(label.to_lowercase())),
        };
        let Ok(elements) = self.tab.find_elements(selector) else {
            return UiOutcome::NotFound;
        };
        let target = elements.iter().find(|element| match &label {
            None => true,
            Some(label) => element
                .get_inner_text()
                .map(|text| text.to_lowercase().contains(label.as_str()))
                .unwrap_or(false),
        });
        match target.map(|element| element.click().map(|_| ())) {
            None => UiOutcome::NotFound,
            Some(Ok(())) => UiOutcome::Acted,
            Some(Err(err)) => {
                debug!(?control, error = %err, "click failed");
                UiOutcome::Failed
            }
        }
    }
}

impl SchedulePage for ChromePage {
    fn content(&self) -> Result<String, BrowserError> {
        self.tab.get_content().map_err(session_error)
    }

    fn act(&self, action: UiAction) -> UiOutcome {
        let mut outcome = UiOutcome::NotFound;
        for control in action.controls() {
            match self.click_control(*control) {
                UiOutcome::Acted => {
                    debug!(?action, ?control, "ui action performed");
                    return UiOutcome::Acted;
                }
                UiOutcome::Failed => outcome = UiOutcome::Failed,
                UiOutcome::NotFound => {}
            }
        }
        debug!(?action, ?outcome, "ui action skipped");
        outcome
    }

    fn wait_for_selector(&self, selector: &str, timeout: Duration) -> bool {
        self.tab
            .wait_for_element_with_custom_timeout(selector, timeout)
            .is_ok()
    }

    fn pause(&self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

/// A network response that looked like schedule data.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub url: String,
    pub status: u32,
    pub mime_type: String,
}

impl CapturedResponse {
    fn looks_like_api(&self) -> bool {
        self.mime_type.contains("json") || API_HINT_RE.is_match(&self.url)
    }
}

fn drain_responses(responses: &Receiver<CapturedResponse>) {
    for response in responses.try_iter() {
        debug!(
            url = %response.url,
            status = response.status,
            mime_type = %response.mime_type,
            "captured schedule response"
        );
    }
}

/// Opens the page, works the calendar UI and returns the rendered markup.
pub fn render_schedule(request: &FetchRequest, cancel: &CancelFlag) -> Result<String, BrowserError> {
    if cancel.is_cancelled() {
        return Err(BrowserError::Cancelled);
    }

    let options = LaunchOptions::default_builder()
        .headless(request.headless)
        .idle_browser_timeout(request.browser_timeout)
        .build()
        .map_err(|err| BrowserError::Launch(err.to_string()))?;
    let browser = Browser::new(options).map_err(|err| BrowserError::Launch(err.to_string()))?;
    let tab = browser.new_tab().map_err(session_error)?;
    tab.set_default_timeout(request.browser_timeout);
    tab.set_user_agent(&request.user_agent, Some(ACCEPT_LANGUAGE), None)
        .map_err(session_error)?;

    let (sender, responses) = mpsc::channel();
    let registered = tab.register_response_handling(
        RESPONSE_HANDLER,
        Box::new(move |params, _fetch_body| {
            let captured = CapturedResponse {
                url: params.response.url,
                status: params.response.status,
                mime_type: params.response.mime_type,
            };
            if captured.looks_like_api() {
                let _ = sender.send(captured);
            }
        }),
    );
    if let Err(err) = registered {
        warn!(error = %err, "response capture unavailable");
    }

    info!(url = %request.url, headless = request.headless, "opening schedule in browser");
    tab.navigate_to(request.url.as_str())
        .map_err(session_error)?
        .wait_until_navigated()
        .map_err(session_error)?;

    let page = ChromePage { tab };
    prepare_page(&page, request.wait_selector.as_deref(), request.browser_timeout);
    drain_responses(&responses);

    let content = if request.seek_week {
        let seek = WeekSeek {
            selector: request.selector.as_deref(),
            today: request.now.date(),
            tz: request.tz,
            base_url: &request.url,
            week: week_range(request.now),
            max_steps: request.max_steps,
        };
        seek_week(&page, &seek, cancel)?
    } else {
        page.content()?
    };
    drain_responses(&responses);
    Ok(content)
}
