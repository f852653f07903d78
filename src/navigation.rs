//! Working a rendered calendar until it shows the current week.

use std::time::Duration;

use chrono::NaiveDate;
use chrono_tz::Tz;
use tracing::debug;
use url::Url;

use crate::browser::{BrowserError, CancelFlag, SchedulePage, UiAction};
use crate::filter::WeekRange;
use crate::models::ScheduleResult;
use crate::scraper::parse_schedule_html;

const UI_SETTLE: Duration = Duration::from_millis(500);
const RENDER_SETTLE: Duration = Duration::from_secs(1);
const NAV_SETTLE: Duration = Duration::from_millis(700);
const FAST_WAIT_MIN: Duration = Duration::from_millis(1500);
const FAST_WAIT_MAX: Duration = Duration::from_secs(5);

/// Containers that show up once a schedule widget has rendered.
pub const DEFAULT_WAIT_SELECTORS: &[&str] = &[
    ".fc-view-harness",
    ".fc-scrollgrid",
    ".fc-event",
    ".fc-timegrid-event",
    ".fc-daygrid-event",
    "[data-event]",
    "[data-lesson]",
    ".schedule",
    ".timetable",
    ".calendar",
];

/// Dismisses cookie banners, switches to the week view, jumps to today and
/// waits for the schedule to render. Every step is best-effort.
pub fn prepare_page<P: SchedulePage + ?Sized>(page: &P, wait_selector: Option<&str>, timeout: Duration) {
    for action in [UiAction::AcceptCookies, UiAction::WeekView, UiAction::Today] {
        if page.act(action).acted() {
            page.pause(UI_SETTLE);
        }
    }
    page.pause(RENDER_SETTLE);

    let rendered = match wait_selector {
        Some(selector) => page.wait_for_selector(selector, timeout),
        None => page.wait_for_selector(
            &DEFAULT_WAIT_SELECTORS.join(", "),
            (timeout / 3).clamp(FAST_WAIT_MIN, FAST_WAIT_MAX),
        ),
    };
    if !rendered {
        debug!(selector = ?wait_selector, "schedule container did not appear");
    }
}

pub struct WeekSeek<'a> {
    pub selector: Option<&'a str>,
    pub today: NaiveDate,
    pub tz: Tz,
    pub base_url: &'a Url,
    pub week: WeekRange,
    pub max_steps: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavDecision {
    NoSlots,
    InWeek,
    Previous,
    Next,
    /// Slots on both sides of the week but none inside it.
    Straddles,
}

pub fn decide(result: &ScheduleResult, week: &WeekRange) -> NavDecision {
    let Some((earliest, latest)) = result.date_span() else {
        return NavDecision::NoSlots;
    };
    if result.slots.iter().any(|slot| week.contains(slot.start)) {
        NavDecision::InWeek
    } else if earliest > week.end {
        NavDecision::Previous
    } else if latest < week.start {
        NavDecision::Next
    } else {
        NavDecision::Straddles
    }
}

/// Clicks previous/next until the page shows a slot inside `seek.week`,
/// returning the page content at the point it stopped.
pub fn seek_week<P: SchedulePage + ?Sized>(
    page: &P,
    seek: &WeekSeek<'_>,
    cancel: &CancelFlag,
) -> Result<String, BrowserError> {
    for step in 0..=seek.max_steps {
        if cancel.is_cancelled() {
            return Err(BrowserError::Cancelled);
        }
        let content = page.content()?;
        let result =
            parse_schedule_html(&content, seek.selector, seek.today, seek.tz, seek.base_url);
        let action = match decide(&result, &seek.week) {
            NavDecision::Previous => UiAction::Previous,
            NavDecision::Next => UiAction::Next,
            decision => {
                debug!(step, ?decision, slots = result.slots.len(), "week seek finished");
                return Ok(content);
            }
        };
        let outcome = page.act(action);
        if !outcome.acted() {
            debug!(step, ?action, ?outcome, "calendar control unavailable");
            return Ok(content);
        }
        page.pause(NAV_SETTLE);
    }
    debug!(max_steps = seek.max_steps, "week seek ran out of steps");
    page.content()
}
