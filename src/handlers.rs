use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use chrono::NaiveDateTime;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use utoipa::ToSchema;

use crate::{
    AppState,
    error::ApiError,
    filter::{filter_slots_by_name, filter_slots_by_trainer, filter_slots_for_week, week_range},
    models::{ScheduleResult, Slot},
    scraper::FetchError,
    settings::ClubSource,
    validation::validate_query,
};

const TRAINER_PREFIXES: [&str; 3] = ["trainer:", "trener:", "coach:"];
const DEBUG_EXAMPLES: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Class,
    Trainer,
}

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    pub q: String,
    pub mode: Option<SearchMode>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClubSlots {
    pub club: String,
    pub url: String,
    pub ok: bool,
    pub error: Option<String>,
    /// Matches before the result cap was applied.
    pub total: usize,
    pub slots: Vec<Slot>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResponse {
    pub query: String,
    pub mode: SearchMode,
    pub week_start: NaiveDateTime,
    pub week_end: NaiveDateTime,
    pub clubs: Vec<ClubSlots>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClubDiagnostics {
    pub club: String,
    pub url: String,
    pub ok: bool,
    pub error: Option<String>,
    pub raw_count: usize,
    pub slot_count: usize,
    pub week_count: usize,
    pub earliest: Option<NaiveDateTime>,
    pub latest: Option<NaiveDateTime>,
    pub examples: Vec<Slot>,
}

/// Splits a `trainer:`-style prefix off the query. The prefix wins over
/// the `mode` parameter.
pub fn resolve_search(q: &str, mode: Option<SearchMode>) -> (SearchMode, &str) {
    let q = q.trim();
    for prefix in TRAINER_PREFIXES {
        if q
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        {
            return (SearchMode::Trainer, q[prefix.len()..].trim());
        }
    }
    (mode.unwrap_or_default(), q)
}

async fn fetch_all(
    state: &AppState,
    now: NaiveDateTime,
) -> Vec<(&ClubSource, Result<ScheduleResult, FetchError>)> {
    let fetches = state.clubs.iter().map(|club| {
        let request = state.settings.fetch_request(club, now, state.timezone);
        async move {
            let result = state.scraper.fetch_schedule(&request).await;
            if let Err(err) = &result {
                error!(club = %club.name, url = %club.url, error = %err, "failed to fetch schedule");
            }
            (club, result)
        }
    });
    join_all(fetches).await
}

#[utoipa::path(get, path = "/", tag = "slots")]
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Studio Slots API",
        "endpoints": {
            "/slots": "Search this week's classes by class name or trainer",
            "/debug": "Per-club extraction diagnostics"
        }
    }))
}

#[utoipa::path(get, path = "/healthz/live", tag = "slots")]
pub async fn healthz_live() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

#[utoipa::path(get, path = "/healthz/ready", tag = "slots")]
pub async fn healthz_ready() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

#[utoipa::path(
    get,
    path = "/slots",
    params(
        ("q" = String, Query, description = "Class name or trainer, at least 2 characters; prefix with trainer: to search trainers"),
        ("mode" = Option<SearchMode>, Query, description = "class (default) or trainer")
    ),
    responses(
        (status = 200, description = "Matching slots in the current week, per club", body = SearchResponse),
        (status = 400, description = "Query too short"),
        (status = 502, description = "No schedule could be fetched")
    ),
    tag = "slots"
)]
pub async fn get_slots(
    State(state): State<AppState>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<SearchResponse>, ApiError> {
    let (mode, text) = resolve_search(&query.q, query.mode);
    let text = validate_query(text)?;

    let now = state.now();
    let week = week_range(now);
    let results = fetch_all(&state, now).await;
    if results.iter().all(|(_, result)| result.is_err()) {
        return Err(ApiError::Upstream("Failed to fetch any schedule".into()));
    }

    let clubs: Vec<ClubSlots> = results
        .into_iter()
        .map(|(club, result)| match result {
            Ok(schedule) => {
                let week_slots = filter_slots_for_week(&schedule.slots, now);
                let mut found = match mode {
                    SearchMode::Class => filter_slots_by_name(&week_slots, text),
                    SearchMode::Trainer => filter_slots_by_trainer(&week_slots, text),
                };
                found.sort_by_key(|slot| slot.start);
                let total = found.len();
                found.truncate(state.settings.max_results);
                ClubSlots {
                    club: club.name.clone(),
                    url: club.url.to_string(),
                    ok: true,
                    error: None,
                    total,
                    slots: found,
                }
            }
            Err(err) => ClubSlots {
                club: club.name.clone(),
                url: club.url.to_string(),
                ok: false,
                error: Some(err.to_string()),
                total: 0,
                slots: Vec::new(),
            },
        })
        .collect();

    info!(
        query = text,
        ?mode,
        matches = clubs.iter().map(|c| c.total).sum::<usize>(),
        "slot search"
    );
    Ok(Json(SearchResponse {
        query: text.to_string(),
        mode,
        week_start: week.start,
        week_end: week.end,
        clubs,
    }))
}

#[utoipa::path(
    get,
    path = "/debug",
    responses(
        (status = 200, description = "Extraction diagnostics per club", body = [ClubDiagnostics])
    ),
    tag = "slots"
)]
pub async fn get_debug(State(state): State<AppState>) -> impl IntoResponse {
    let now = state.now();
    let diagnostics: Vec<ClubDiagnostics> = fetch_all(&state, now)
        .await
        .into_iter()
        .map(|(club, result)| match result {
            Ok(schedule) => {
                let mut week_slots = filter_slots_for_week(&schedule.slots, now);
                let week_count = week_slots.len();
                week_slots.truncate(DEBUG_EXAMPLES.min(state.settings.max_results));
                let span = schedule.date_span();
                ClubDiagnostics {
                    club: club.name.clone(),
                    url: club.url.to_string(),
                    ok: true,
                    error: None,
                    raw_count: schedule.raw_count,
                    slot_count: schedule.slots.len(),
                    week_count,
                    earliest: span.map(|(earliest, _)| earliest),
                    latest: span.map(|(_, latest)| latest),
                    examples: week_slots,
                }
            }
            Err(err) => ClubDiagnostics {
                club: club.name.clone(),
                url: club.url.to_string(),
                ok: false,
                error: Some(err.to_string()),
                raw_count: 0,
                slot_count: 0,
                week_count: 0,
                earliest: None,
                latest: None,
                examples: Vec::new(),
            },
        })
        .collect();
    Json(diagnostics)
}
