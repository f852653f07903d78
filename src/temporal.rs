//! Date and time recognition for schedule text and element attributes.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use scraper::ElementRef;

use crate::text::normalize;

static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([01]\d|2[0-3])[:.]([0-5]\d)\b").expect("regex compiles"));
static DATE_NUM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})[./-](\d{1,2})(?:[./-](\d{4}))?\b").expect("regex compiles")
});
static DATE_WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})\s+(\p{L}+)").expect("regex compiles"));
static ISO_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("regex compiles"));
static ISO_DATETIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})[T ](\d{2}):(\d{2})").expect("regex compiles")
});
static UNIX_TS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{13}|\d{10})\b").expect("regex compiles"));

/// A month written more than this many months before today's month is read
/// as next year's.
const YEAR_BOUNDARY_MONTHS: u32 = 6;

/// Attribute name fragments that may carry a Unix timestamp.
const TIMESTAMP_HINTS: [&str; 4] = ["time", "date", "start", "begin"];

/// Genitive month names as they follow a day number ("5 marca").
const MONTHS: [(&str, u32); 12] = [
    ("stycznia", 1),
    ("lutego", 2),
    ("marca", 3),
    ("kwietnia", 4),
    ("maja", 5),
    ("czerwca", 6),
    ("lipca", 7),
    ("sierpnia", 8),
    ("wrzesnia", 9),
    ("pazdziernika", 10),
    ("listopada", 11),
    ("grudnia", 12),
];

pub fn contains_time(text: &str) -> bool {
    TIME_RE.is_match(text)
}

/// Removes every time token, leaving a space in its place.
pub fn strip_times(text: &str) -> String {
    TIME_RE.replace_all(text, " ").into_owned()
}

/// First 24-hour `HH:MM` or `HH.MM` in the text, read left to right.
///
/// Dotted pairs that belong to a numeric date are skipped: a pair chained
/// to another `.` or `/` digit group (`05.03.2025`), or a valid day.month
/// pair (`05.03`) followed by a later time. A pair that opens a range
/// (`07.10-08.10`) is always a time.
pub fn parse_time(text: &str) -> Option<NaiveTime> {
    let candidates: Vec<Captures<'_>> = TIME_RE
        .captures_iter(text)
        .filter(|caps| !chained_to_date(text, caps))
        .collect();
    let last = candidates.len().checked_sub(1)?;
    let (_, caps) = candidates
        .iter()
        .enumerate()
        .find(|(index, caps)| {
            *index == last || opens_range(text, caps) || !reads_as_day_month(caps)
        })?;
    let hour = caps[1].parse().ok()?;
    let minute = caps[2].parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn chained_to_date(text: &str, caps: &Captures<'_>) -> bool {
    let Some(whole) = caps.get(0) else {
        return false;
    };
    let separator = |c: char| matches!(c, '.' | '/');
    let mut after = text[whole.end()..].chars();
    let followed = matches!(
        (after.next(), after.next()),
        (Some(sep), Some(digit)) if separator(sep) && digit.is_ascii_digit()
    );
    let mut before = text[..whole.start()].chars().rev();
    let preceded = matches!(
        (before.next(), before.next()),
        (Some(sep), Some(digit)) if separator(sep) && digit.is_ascii_digit()
    );
    followed || preceded
}

fn opens_range(text: &str, caps: &Captures<'_>) -> bool {
    caps.get(0).is_some_and(|whole| {
        text[whole.end()..]
            .trim_start()
            .starts_with(['-', '–'])
    })
}

fn reads_as_day_month(caps: &Captures<'_>) -> bool {
    if &caps[0][2..3] != "." {
        return false;
    }
    let day: u32 = caps[1].parse().unwrap_or(0);
    let month: u32 = caps[2].parse().unwrap_or(0);
    (1..=31).contains(&day) && (1..=12).contains(&month)
}

/// ISO (`2025-03-05`), numeric (`5.03`, `05/03/2025`) or worded
/// (`5 marca`) date.
///
/// ISO is checked first, so `2025-03-07` is never read as day 3 of month 7
/// by the numeric form. Otherwise the first numeric match decides, and the
/// worded form is only consulted when no numeric pattern is present. An
/// explicit year is taken as written.
pub fn parse_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    if let Some(caps) = ISO_DATE_RE.captures(text) {
        return NaiveDate::from_ymd_opt(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        );
    }

    if let Some(caps) = DATE_NUM_RE.captures(text) {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let year = match caps.get(3) {
            Some(year) => year.as_str().parse().ok()?,
            None => implied_year(today, month),
        };
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    DATE_WORD_RE.captures_iter(text).find_map(|caps| {
        let month = month_from_name(&caps[2])?;
        let day: u32 = caps[1].parse().ok()?;
        NaiveDate::from_ymd_opt(implied_year(today, month), month, day)
    })
}

fn month_from_name(word: &str) -> Option<u32> {
    let word = normalize(word);
    MONTHS
        .iter()
        .find(|(name, _)| *name == word)
        .map(|(_, month)| *month)
}

fn implied_year(today: NaiveDate, month: u32) -> i32 {
    if month < today.month() && today.month() - month > YEAR_BOUNDARY_MONTHS {
        today.year() + 1
    } else {
        today.year()
    }
}

fn attribute_values<'a>(element: ElementRef<'a>) -> impl Iterator<Item = (&'a str, &'a str)> {
    element
        .value()
        .attrs()
        .filter(|(_, value)| !value.trim().is_empty())
}

pub fn parse_date_from_attributes(element: ElementRef<'_>, today: NaiveDate) -> Option<NaiveDate> {
    attribute_values(element).find_map(|(_, value)| parse_date(value, today))
}

pub fn parse_time_from_attributes(element: ElementRef<'_>) -> Option<NaiveTime> {
    attribute_values(element).find_map(|(_, value)| parse_time(value))
}

/// ISO datetime in any attribute, or a Unix timestamp in an attribute whose
/// name looks time-related. Timestamps are read as wall-clock time in `tz`.
pub fn parse_datetime_from_attributes(element: ElementRef<'_>, tz: Tz) -> Option<NaiveDateTime> {
    attribute_values(element).find_map(|(name, value)| {
        if let Some(found) = parse_iso_datetime(value) {
            return Some(found);
        }
        let name = name.to_ascii_lowercase();
        if !TIMESTAMP_HINTS.iter().any(|hint| name.contains(hint)) {
            return None;
        }
        parse_unix_timestamp(value, tz)
    })
}

fn parse_iso_datetime(value: &str) -> Option<NaiveDateTime> {
    let caps = ISO_DATETIME_RE.captures(value)?;
    let date = NaiveDate::from_ymd_opt(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    )?;
    let time = NaiveTime::from_hms_opt(caps[4].parse().ok()?, caps[5].parse().ok()?, 0)?;
    Some(date.and_time(time))
}

fn parse_unix_timestamp(value: &str, tz: Tz) -> Option<NaiveDateTime> {
    let raw = UNIX_TS_RE.find(value)?.as_str();
    let mut seconds: i64 = raw.parse().ok()?;
    if raw.len() == 13 {
        seconds /= 1000;
    }
    let utc = DateTime::from_timestamp(seconds, 0)?;
    Some(utc.with_timezone(&tz).naive_local())
}
