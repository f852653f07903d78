use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime};

use crate::models::Slot;
use crate::text::{compact, normalize};

/// Inclusive wall-clock bounds of one Monday-to-Sunday week.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl WeekRange {
    pub fn contains(&self, at: NaiveDateTime) -> bool {
        self.start <= at && at <= self.end
    }
}

/// Monday 00:00:00 through Sunday 23:59:59 of the week containing `now`.
pub fn week_range(now: NaiveDateTime) -> WeekRange {
    let monday = now.date() - Duration::days(now.weekday().num_days_from_monday() as i64);
    let start = monday.and_time(NaiveTime::MIN);
    let end = start + Duration::days(7) - Duration::seconds(1);
    WeekRange { start, end }
}

pub fn filter_slots_for_week(slots: &[Slot], now: NaiveDateTime) -> Vec<Slot> {
    let week = week_range(now);
    slots
        .iter()
        .filter(|slot| week.contains(slot.start))
        .cloned()
        .collect()
}

pub fn filter_slots_by_name(slots: &[Slot], query: &str) -> Vec<Slot> {
    filter_by_haystack(slots, query, |slot| format!("{} {}", slot.name, slot.raw))
}

pub fn filter_slots_by_trainer(slots: &[Slot], query: &str) -> Vec<Slot> {
    filter_by_haystack(slots, query, |slot| {
        format!(
            "{} {} {}",
            slot.trainer.as_deref().unwrap_or_default(),
            slot.raw,
            slot.name
        )
    })
}

fn filter_by_haystack(slots: &[Slot], query: &str, haystack: impl Fn(&Slot) -> String) -> Vec<Slot> {
    let query_norm = normalize(query);
    let query_compact = compact(query);
    slots
        .iter()
        .filter(|slot| {
            let text = haystack(*slot);
            normalize(&text).contains(&query_norm) || compact(&text).contains(&query_compact)
        })
        .cloned()
        .collect()
}
