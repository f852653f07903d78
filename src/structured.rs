//! Fast path for the `li.club-schedule-item` schedule markup.
//!
//! Each item carries its day in `data-day`, its start in a `<time>` child,
//! activity and trainer links, a registration block with the booking status,
//! a participant counter and a relative booking URL in `data-url`.

use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::models::{ScheduleResult, Slot};
use crate::status::{classify_status, parse_capacity};
use crate::temporal::parse_time;
use crate::text::{element_text, slug_to_name};

static ITEM_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("li.club-schedule-item").expect("selector parses"));
static TIME_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("time").expect("selector parses"));
static ACTIVITY_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.activity").expect("selector parses"));
static TRAINER_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.trainer").expect("selector parses"));
static REGISTRATION_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"div[class*="registration"]"#).expect("selector parses"));

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"];

/// Parses every structured item on the page.
///
/// Returns `None` when the page has no such items, so the caller can fall
/// back to the heuristic extractor. `raw_count` is the number of items found,
/// whether or not they resolved a start.
pub fn extract_structured(document: &Html, base_url: &Url) -> Option<ScheduleResult> {
    let items: Vec<ElementRef<'_>> = document.select(&ITEM_SEL).collect();
    if items.is_empty() {
        return None;
    }

    let slots = items
        .iter()
        .filter_map(|item| parse_item(*item, base_url))
        .collect();
    Some(ScheduleResult::new(slots, items.len()))
}

fn parse_item(item: ElementRef<'_>, base_url: &Url) -> Option<Slot> {
    let raw = element_text(item);
    let attr = |name: &str| {
        item.value()
            .attr(name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let day = attr("data-day").and_then(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").ok());
    let Some(start) = resolve_start(item, day, &raw) else {
        tracing::debug!(text = %raw, "skipping schedule item without start");
        return None;
    };

    let activity = item.select(&ACTIVITY_SEL).next();
    let name = activity
        .map(element_text)
        .filter(|t| !t.is_empty())
        .or_else(|| attr("data-activity").map(slug_to_name))
        .unwrap_or_else(|| raw.clone());

    let trainer = item
        .select(&TRAINER_SEL)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
        .or_else(|| attr("data-trainer").map(slug_to_name));

    let registration = item
        .select(&REGISTRATION_SEL)
        .next()
        .map(element_text)
        .unwrap_or_default();
    let status = classify_status(&registration).or_else(|| classify_status(&raw));

    let url = attr("data-url")
        .or_else(|| activity.and_then(|a| a.value().attr("href")))
        .and_then(|href| base_url.join(href).ok())
        .map(String::from);
    let capacity = parse_capacity(item);

    let mut slot = Slot::new(name, start, raw);
    slot.trainer = trainer;
    slot.status = status;
    slot.url = url;
    slot.capacity_used = capacity.map(|(used, _)| used);
    slot.capacity_total = capacity.map(|(_, total)| total);
    Some(slot)
}

fn resolve_start(item: ElementRef<'_>, day: Option<NaiveDate>, raw: &str) -> Option<NaiveDateTime> {
    if let Some(time_el) = item.select(&TIME_SEL).next() {
        let from_attr = time_el.value().attr("datetime").and_then(|value| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(value.trim(), fmt).ok())
        });
        if from_attr.is_some() {
            return from_attr;
        }
        if let (Some(day), Some(time)) = (day, parse_time(&element_text(time_el))) {
            return Some(day.and_time(time));
        }
    }
    Some(day?.and_time(parse_time(raw)?))
}
