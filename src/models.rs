use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Open,
    Full,
    Waitlist,
    Cancelled,
    Closed,
    Unknown,
}

/// One class occurrence with a resolved start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Slot {
    pub name: String,
    #[schema(value_type = String, format = "date-time", example = "2025-11-24T06:00:00")]
    pub start: NaiveDateTime,
    pub status: Option<SlotStatus>,
    pub trainer: Option<String>,
    /// Text the slot was extracted from, kept for search.
    pub raw: String,
    pub url: Option<String>,
    pub capacity_used: Option<u32>,
    pub capacity_total: Option<u32>,
    /// Filled by enrichment outside the extraction engine.
    pub waitlist_used: Option<u32>,
}

impl Slot {
    pub fn new(name: impl Into<String>, start: NaiveDateTime, raw: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start,
            status: None,
            trainer: None,
            raw: raw.into(),
            url: None,
            capacity_used: None,
            capacity_total: None,
            waitlist_used: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ScheduleResult {
    pub slots: Vec<Slot>,
    /// Candidates examined, including the ones that never resolved a start.
    pub raw_count: usize,
}

impl ScheduleResult {
    pub fn new(mut slots: Vec<Slot>, raw_count: usize) -> Self {
        slots.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then(a.name.cmp(&b.name))
                .then(a.trainer.cmp(&b.trainer))
        });
        Self { slots, raw_count }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Earliest and latest slot start.
    pub fn date_span(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let earliest = self.slots.iter().map(|s| s.start).min()?;
        let latest = self.slots.iter().map(|s| s.start).max()?;
        Some((earliest, latest))
    }
}
