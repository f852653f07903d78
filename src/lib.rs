pub mod browser;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod heuristic;
pub mod models;
pub mod navigation;
pub mod openapi;
pub mod scraper;
pub mod settings;
pub mod status;
pub mod structured;
pub mod temporal;
pub mod text;
pub mod validation;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, routing::get};
use chrono::{NaiveDateTime, Utc};
use chrono_tz::Tz;
use config::ConfigError;
use handlers::{get_debug, get_slots, healthz_live, healthz_ready, root};
use tower_http::LatencyUnit;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::openapi::ApiDoc;
use crate::scraper::ScheduleScraper;
use crate::settings::{ClubSource, Settings};

#[derive(Clone)]
pub struct AppState {
    pub(crate) settings: Settings,
    pub(crate) clubs: Arc<Vec<ClubSource>>,
    pub(crate) timezone: Tz,
    pub(crate) scraper: Arc<ScheduleScraper>,
}

impl AppState {
    pub fn new(settings: Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            clubs: Arc::new(settings.clubs()?),
            timezone: settings.tz()?,
            scraper: Arc::new(ScheduleScraper::new()),
            settings,
        })
    }

    /// Wall-clock time in the configured timezone.
    pub(crate) fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.timezone).naive_local()
    }
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;

    let env_filter = if settings.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .without_time()
        .init();

    let state = AppState::new(settings)?;
    for club in state.clubs.iter() {
        info!(club = %club.name, url = %club.url, "schedule source configured");
    }

    let app = build_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], state.settings.port));
    info!("Starting Studio Slots API on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(LatencyUnit::Millis),
        );

    let mut router = Router::new()
        .route("/", get(root))
        .route("/healthz/live", get(healthz_live))
        .route("/healthz/ready", get(healthz_ready))
        .route("/slots", get(get_slots))
        .route("/debug", get(get_debug))
        .with_state(state.clone());

    if state.settings.enable_swagger {
        let openapi = ApiDoc::openapi();
        let swagger = SwaggerUi::new("/docs").url("/openapi.json", openapi);
        router = router.merge(swagger);
    }

    router.layer(trace_layer)
}
