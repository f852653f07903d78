//! Generic extraction for pages without the structured schedule markup.

use chrono::{NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

use crate::models::{ScheduleResult, Slot};
use crate::status::{classify_status, strip_status_keywords};
use crate::temporal::{
    contains_time, parse_date, parse_date_from_attributes, parse_datetime_from_attributes,
    parse_time, parse_time_from_attributes, strip_times,
};
use crate::text::element_text;

/// Attributes that schedule widgets commonly put on event nodes.
const DATA_MARKERS: [&str; 5] = ["data-event", "data-class", "data-lesson", "data-start", "data-id"];

/// Longer blocks are containers, not single events.
const MAX_EVENT_TEXT_LEN: usize = 220;

/// Nodes examined while looking for a date above an undated row.
const MAX_CONTEXT_NODES: usize = 50;

const NAME_SEPARATORS: [&str; 3] = [" - ", " / ", " | "];

static BLOCK_SEL: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("li, tr, div, article, section, td").expect("selector parses")
});
static LINK_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("selector parses"));

pub fn extract_heuristic(
    document: &Html,
    selector: Option<&str>,
    today: NaiveDate,
    tz: Tz,
    base_url: &Url,
) -> ScheduleResult {
    let candidates = select_candidates(document, selector);
    let slots = candidates
        .iter()
        .filter_map(|candidate| parse_candidate(*candidate, today, tz, base_url))
        .collect();
    ScheduleResult::new(slots, candidates.len())
}

/// Caller selector, then data-attribute markers, then the innermost blocks
/// that mention a time. The first source with any match is used.
pub(crate) fn select_candidates<'a>(document: &'a Html, selector: Option<&str>) -> Vec<ElementRef<'a>> {
    if let Some(raw) = selector {
        match Selector::parse(raw) {
            Ok(sel) => {
                let found: Vec<_> = document.select(&sel).collect();
                if !found.is_empty() {
                    return found;
                }
                debug!(selector = raw, "event selector matched nothing");
            }
            Err(err) => warn!(selector = raw, error = %err, "invalid event selector"),
        }
    }

    for marker in DATA_MARKERS {
        let Ok(sel) = Selector::parse(&format!("[{marker}]")) else {
            continue;
        };
        let found: Vec<_> = document.select(&sel).collect();
        if !found.is_empty() {
            debug!(marker, count = found.len(), "using data attribute candidates");
            return found;
        }
    }

    document
        .select(&BLOCK_SEL)
        .filter(|block| {
            let text = element_text(*block);
            contains_time(&text) && text.chars().count() <= MAX_EVENT_TEXT_LEN
        })
        .filter(|block| !has_timed_descendant(*block))
        .collect()
}

fn has_timed_descendant(block: ElementRef<'_>) -> bool {
    block
        .select(&BLOCK_SEL)
        .any(|inner| inner.id() != block.id() && contains_time(&element_text(inner)))
}

fn parse_candidate(
    candidate: ElementRef<'_>,
    today: NaiveDate,
    tz: Tz,
    base_url: &Url,
) -> Option<Slot> {
    let text = element_text(candidate);
    if text.is_empty() {
        return None;
    }

    let start = match resolve_start(candidate, &text, today, tz) {
        Some(start) => start,
        None => {
            debug!(text = %text, "skipping event without date or time");
            return None;
        }
    };

    let (name, trainer) = split_name_and_trainer(&text);
    let mut slot = Slot::new(if name.is_empty() { text.clone() } else { name }, start, text.as_str());
    slot.trainer = trainer;
    slot.status = classify_status(&text);
    slot.url = candidate
        .select(&LINK_SEL)
        .filter_map(|a| a.value().attr("href"))
        .find(|href| !href.starts_with('#') && !href.starts_with("javascript:"))
        .and_then(|href| base_url.join(href).ok())
        .map(String::from);
    Some(slot)
}

fn resolve_start(
    candidate: ElementRef<'_>,
    text: &str,
    today: NaiveDate,
    tz: Tz,
) -> Option<NaiveDateTime> {
    if let Some(start) = parse_datetime_from_attributes(candidate, tz) {
        return Some(start);
    }
    let time = parse_time(text).or_else(|| parse_time_from_attributes(candidate))?;
    let date = parse_date(text, today)
        .or_else(|| parse_date_from_attributes(candidate, today))
        .or_else(|| find_date_context(candidate, today))?;
    Some(date.and_time(time))
}

/// Walks the node, its preceding siblings, then its parent and so on,
/// returning the first date found in any node's text. Blank text nodes are
/// skipped without counting towards the limit.
fn find_date_context(element: ElementRef<'_>, today: NaiveDate) -> Option<NaiveDate> {
    let mut visited = 0;
    let mut current = Some(element);

    while let Some(node) = current {
        if visited >= MAX_CONTEXT_NODES {
            return None;
        }
        visited += 1;
        if let Some(found) = parse_date(&element_text(node), today) {
            return Some(found);
        }

        let mut sibling = node.prev_sibling();
        while let Some(prev) = sibling {
            sibling = prev.prev_sibling();
            let text = match ElementRef::wrap(prev) {
                Some(el) => element_text(el),
                None => prev
                    .value()
                    .as_text()
                    .map(|t| t.trim().to_string())
                    .unwrap_or_default(),
            };
            if text.is_empty() {
                continue;
            }
            if visited >= MAX_CONTEXT_NODES {
                return None;
            }
            visited += 1;
            if let Some(found) = parse_date(&text, today) {
                return Some(found);
            }
        }

        current = node.parent().and_then(ElementRef::wrap);
    }
    None
}

/// Strips times and status words, then splits "Name - Trainer" style text.
pub fn split_name_and_trainer(text: &str) -> (String, Option<String>) {
    let cleaned = strip_status_keywords(&strip_times(text));
    let cleaned = cleaned.trim_matches(|c| matches!(c, ' ' | '-' | '|' | '/'));

    for sep in NAME_SEPARATORS {
        if let Some((left, right)) = cleaned.split_once(sep) {
            let (left, right) = (left.trim(), right.trim());
            if !left.is_empty() && !right.is_empty() {
                return (left.to_string(), Some(right.to_string()));
            }
        }
    }
    (cleaned.to_string(), None)
}
