use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use httpmock::prelude::*;
use studio_slots::scraper::{FetchError, FetchRequest, ScheduleScraper};
use studio_slots::settings::Settings;
use studio_slots::{AppState, build_router};
use tower::Service;
use url::Url;

const USER_AGENT: &str = "StudioSlotsTest/1.0";

/// Settings pointing at the given schedule pages, browser disabled.
fn test_settings(schedule_urls: &str) -> Settings {
    Settings {
        debug: true,
        enable_swagger: true,
        port: 8080,
        schedule_urls: schedule_urls.to_string(),
        club_names: None,
        event_selectors: None,
        timezone: "Europe/Warsaw".to_string(),
        max_results: 20,
        user_agent: USER_AGENT.to_string(),
        request_timeout_s: 5,
        use_browser: false,
        browser_wait_selector: None,
        browser_timeout_s: 5,
        browser_headless: true,
        seek_week: false,
        max_steps: 0,
    }
}

fn create_test_state(schedule_urls: &str) -> AppState {
    AppState::new(test_settings(schedule_urls)).unwrap()
}

fn today() -> NaiveDate {
    Utc::now()
        .with_timezone(&chrono_tz::Europe::Warsaw)
        .date_naive()
}

/// A structured schedule page with today's classes.
fn schedule_page(day: NaiveDate) -> String {
    let day = day.format("%Y-%m-%d");
    format!(
        r#"
        <html>
        <body>
        <ul class="club-schedule">
          <li class="club-schedule-item" data-day="{day}" data-url="/rezerwacja/1">
            <time>07:00</time>
            <a class="activity">Yoga Flow</a>
            <a class="trainer">Anna Nowak</a>
            <span class="users">3 / 12</span>
            <div class="registration">Zapisz się</div>
          </li>
          <li class="club-schedule-item" data-day="{day}">
            <time>18:00</time>
            <a class="activity">Cross Fit 60</a>
            <a class="trainer">Michał Wójcik</a>
            <div class="registration">Brak miejsc</div>
          </li>
          <li class="club-schedule-item" data-day="{day}">
            <time>19:30</time>
            <a class="activity">Yoga Nidra</a>
            <a class="trainer">Ewa Zielińska</a>
          </li>
        </ul>
        </body>
        </html>
    "#
    )
}

/// Helper to extract response body as string
async fn response_body_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn get_json(app: &mut axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .call(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response_body_string(response.into_body()).await;
    (status, serde_json::from_str(&body).unwrap_or(serde_json::Value::Null))
}

#[tokio::test]
async fn test_root_endpoint() {
    // Arrange
    let state = create_test_state("http://example.com/krakow/grafik-zajec/");
    let mut app = build_router(state);

    // Act
    let response = app
        .call(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_body_string(response.into_body()).await;
    assert!(body.contains("Studio Slots API"));
    assert!(body.contains("/slots"));
    assert!(body.contains("/debug"));
}

#[tokio::test]
async fn test_healthz_endpoints() {
    let state = create_test_state("http://example.com/");
    let mut app = build_router(state);

    for uri in ["/healthz/live", "/healthz/ready"] {
        let (status, body) = get_json(&mut app, uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }
}

#[tokio::test]
async fn test_openapi_served_when_enabled() {
    let state = create_test_state("http://example.com/");
    let mut app = build_router(state);

    let (status, body) = get_json(&mut app, "/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/slots"].is_object());
}

#[tokio::test]
async fn test_slots_query_too_short() {
    // Arrange
    let state = create_test_state("http://example.com/");
    let mut app = build_router(state);

    // Act
    let response = app
        .call(
            Request::builder()
                .uri("/slots?q=%20y%20")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, _) = get_json(&mut app, "/slots?q=trainer:").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_slots_query_without_letters_or_digits() {
    let mock_server = MockServer::start();
    let schedule = mock_server.mock(|when, then| {
        when.method(GET).path("/krakow/grafik-zajec/");
        then.status(200).body(schedule_page(today()));
    });
    let mut app = build_router(create_test_state(&mock_server.url("/krakow/grafik-zajec/")));

    for uri in ["/slots?q=--", "/slots?q=%D0%B9%D0%BE%D0%B3%D0%B0"] {
        let (status, _) = get_json(&mut app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
    }
    schedule.assert_calls(0);
}

#[tokio::test]
async fn test_slots_by_class_name() {
    // Arrange
    let mock_server = MockServer::start();
    let page = mock_server.mock(|when, then| {
        when.method(GET)
            .path("/krakow/grafik-zajec/")
            .header("user-agent", USER_AGENT)
            .header("accept-language", "pl,en;q=0.8");
        then.status(200).body(schedule_page(today()));
    });
    let state = create_test_state(&mock_server.url("/krakow/grafik-zajec/"));
    let mut app = build_router(state);

    // Act
    let (status, body) = get_json(&mut app, "/slots?q=yoga").await;

    // Assert
    page.assert();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "class");
    let club = &body["clubs"][0];
    assert_eq!(club["club"], "MyFitnessPlace Krakow");
    assert_eq!(club["ok"], true);
    assert_eq!(club["total"], 2);
    assert_eq!(club["slots"][0]["name"], "Yoga Flow");
    assert_eq!(club["slots"][0]["status"], "open");
    assert_eq!(club["slots"][0]["capacity_used"], 3);
    assert_eq!(club["slots"][0]["capacity_total"], 12);
    assert_eq!(
        club["slots"][0]["url"],
        mock_server.url("/rezerwacja/1").as_str()
    );
    assert_eq!(club["slots"][1]["name"], "Yoga Nidra");
}

#[tokio::test]
async fn test_slots_compact_match_and_trainer_prefix() {
    let mock_server = MockServer::start();
    mock_server.mock(|when, then| {
        when.method(GET).path("/gdansk/grafik-zajec/");
        then.status(200).body(schedule_page(today()));
    });
    let state = create_test_state(&mock_server.url("/gdansk/grafik-zajec/"));
    let mut app = build_router(state);

    let (status, body) = get_json(&mut app, "/slots?q=crossfit").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["clubs"][0]["total"], 1);
    assert_eq!(body["clubs"][0]["slots"][0]["name"], "Cross Fit 60");
    assert_eq!(body["clubs"][0]["slots"][0]["status"], "full");

    let (status, body) = get_json(&mut app, "/slots?q=trener:%20michal%20wojcik").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "trainer");
    assert_eq!(body["clubs"][0]["total"], 1);
    assert_eq!(body["clubs"][0]["slots"][0]["trainer"], "Michał Wójcik");

    let (_, body) = get_json(&mut app, "/slots?q=zielinska&mode=trainer").await;
    assert_eq!(body["clubs"][0]["slots"][0]["name"], "Yoga Nidra");
}

#[tokio::test]
async fn test_slots_capped_at_max_results() {
    let mock_server = MockServer::start();
    mock_server.mock(|when, then| {
        when.method(GET).path("/krakow/grafik-zajec/");
        then.status(200).body(schedule_page(today()));
    });
    let mut settings = test_settings(&mock_server.url("/krakow/grafik-zajec/"));
    settings.max_results = 1;
    let mut app = build_router(AppState::new(settings).unwrap());

    let (_, body) = get_json(&mut app, "/slots?q=yoga").await;
    assert_eq!(body["clubs"][0]["total"], 2);
    assert_eq!(body["clubs"][0]["slots"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_slots_outside_current_week_are_dropped() {
    let mock_server = MockServer::start();
    mock_server.mock(|when, then| {
        when.method(GET).path("/krakow/grafik-zajec/");
        then.status(200)
            .body(schedule_page(today() + chrono::Duration::days(14)));
    });
    let state = create_test_state(&mock_server.url("/krakow/grafik-zajec/"));
    let mut app = build_router(state);

    let (status, body) = get_json(&mut app, "/slots?q=yoga").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["clubs"][0]["ok"], true);
    assert_eq!(body["clubs"][0]["total"], 0);
}

#[tokio::test]
async fn test_failing_club_does_not_fail_others() {
    // Arrange
    let mock_server = MockServer::start();
    mock_server.mock(|when, then| {
        when.method(GET).path("/krakow/grafik-zajec/");
        then.status(200).body(schedule_page(today()));
    });
    mock_server.mock(|when, then| {
        when.method(GET).path("/gdynia/grafik-zajec/");
        then.status(500);
    });
    let urls = format!(
        "{} | {}",
        mock_server.url("/krakow/grafik-zajec/"),
        mock_server.url("/gdynia/grafik-zajec/")
    );
    let mut app = build_router(create_test_state(&urls));

    // Act
    let (status, body) = get_json(&mut app, "/slots?q=yoga").await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    let clubs = body["clubs"].as_array().unwrap();
    assert_eq!(clubs.len(), 2);
    assert_eq!(clubs[0]["ok"], true);
    assert_eq!(clubs[0]["total"], 2);
    assert_eq!(clubs[1]["club"], "MyFitnessPlace Gdynia");
    assert_eq!(clubs[1]["ok"], false);
    assert!(clubs[1]["error"].as_str().unwrap().contains("HTTP error"));
}

#[tokio::test]
async fn test_all_clubs_failing_is_bad_gateway() {
    let mock_server = MockServer::start();
    mock_server.mock(|when, then| {
        when.method(GET);
        then.status(503);
    });
    let state = create_test_state(&mock_server.url("/krakow/grafik-zajec/"));
    let mut app = build_router(state);

    let (status, _) = get_json(&mut app, "/slots?q=yoga").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_debug_endpoint() {
    let mock_server = MockServer::start();
    let page = format!(
        "{}<ul><li class=\"club-schedule-item\">no day here</li></ul>",
        schedule_page(today())
    );
    mock_server.mock(|when, then| {
        when.method(GET).path("/krakow/grafik-zajec/");
        then.status(200).body(page.as_str());
    });
    let state = create_test_state(&mock_server.url("/krakow/grafik-zajec/"));
    let mut app = build_router(state);

    let (status, body) = get_json(&mut app, "/debug").await;
    assert_eq!(status, StatusCode::OK);
    let club = &body[0];
    assert_eq!(club["ok"], true);
    assert_eq!(club["raw_count"], 4);
    assert_eq!(club["slot_count"], 3);
    assert_eq!(club["week_count"], 3);
    assert_eq!(club["examples"].as_array().unwrap().len(), 3);
    assert!(club["earliest"].as_str().unwrap().ends_with("07:00:00"));
    assert!(club["latest"].as_str().unwrap().ends_with("19:30:00"));
}

#[tokio::test]
async fn test_debug_examples_follow_result_cap() {
    let mock_server = MockServer::start();
    mock_server.mock(|when, then| {
        when.method(GET).path("/krakow/grafik-zajec/");
        then.status(200).body(schedule_page(today()));
    });
    let mut settings = test_settings(&mock_server.url("/krakow/grafik-zajec/"));
    settings.max_results = 1;
    let mut app = build_router(AppState::new(settings).unwrap());

    let (status, body) = get_json(&mut app, "/debug").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["week_count"], 3);
    assert_eq!(body[0]["examples"].as_array().unwrap().len(), 1);
}

fn fetch_request(url: String) -> FetchRequest {
    let now = NaiveDateTime::parse_from_str("2025-03-05 10:00", "%Y-%m-%d %H:%M").unwrap();
    let mut request = FetchRequest::new(Url::parse(&url).unwrap(), now);
    request.use_browser = false;
    request
}

#[tokio::test]
async fn test_fetch_schedule_heuristic_page() {
    let mock_server = MockServer::start();
    mock_server.mock(|when, then| {
        when.method(GET).path("/plan");
        then.status(200).body(
            r#"
            <html><body>
              <h3>Środa 05.03</h3>
              <div class="row">07:00 Pilates - Kasia</div>
              <div class="row">18:15 Boks / Tomek</div>
              <h3>Czwartek 06.03</h3>
              <div class="row">09:00 Zdrowy kręgosłup</div>
            </body></html>"#,
        );
    });

    let scraper = ScheduleScraper::new();
    let result = scraper
        .fetch_schedule(&fetch_request(mock_server.url("/plan")))
        .await
        .unwrap();

    assert_eq!(result.slots.len(), 3);
    assert_eq!(result.slots[0].name, "Pilates");
    assert_eq!(result.slots[0].trainer.as_deref(), Some("Kasia"));
    assert_eq!(result.slots[1].name, "Boks");
    assert_eq!(
        result.slots[2].start.format("%Y-%m-%d %H:%M").to_string(),
        "2025-03-06 09:00"
    );
}

#[tokio::test]
async fn test_fetch_schedule_empty_page_without_browser() {
    let mock_server = MockServer::start();
    mock_server.mock(|when, then| {
        when.method(GET).path("/empty");
        then.status(200).body("<html><body><p>Grafik wkrótce</p></body></html>");
    });

    let result = ScheduleScraper::new()
        .fetch_schedule(&fetch_request(mock_server.url("/empty")))
        .await
        .unwrap();
    assert!(result.slots.is_empty());
}

#[tokio::test]
async fn test_fetch_schedule_static_failure_is_not_escalated() {
    let mock_server = MockServer::start();
    mock_server.mock(|when, then| {
        when.method(GET).path("/down");
        then.status(404);
    });

    let mut request = fetch_request(mock_server.url("/down"));
    request.use_browser = true;
    let err = ScheduleScraper::new()
        .fetch_schedule(&request)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Http(_)));
}

#[tokio::test]
async fn test_fetch_schedule_static_timeout() {
    let mock_server = MockServer::start();
    mock_server.mock(|when, then| {
        when.method(GET).path("/slow");
        then.status(200)
            .delay(Duration::from_secs(3))
            .body(schedule_page(today()));
    });

    let mut request = fetch_request(mock_server.url("/slow"));
    request.static_timeout = Duration::from_millis(200);
    let err = ScheduleScraper::new()
        .fetch_schedule(&request)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Http(ref e) if e.is_timeout()));
}
