use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use quiztrack_core::analytics::AnalyticsBackend;
use quiztrack_core::config::Config;
use quiztrack_core::null::NullBackend;
use quiztrack_duckdb::DuckDbBackend;
use quiztrack_server::app::build_app;
use quiztrack_server::state::AppState;

fn test_config() -> Config {
    Config {
        port: 0,
        data_dir: "/tmp/quiztrack-test".to_string(),
        ip_salt: "test-salt".to_string(),
        ..Config::default()
    }
}

/// Create a fresh in-memory backend + state + app for each test.
fn setup() -> (Arc<AppState>, axum::Router) {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");
    let state = Arc::new(AppState::new(db, test_config()));
    let app = build_app(Arc::clone(&state));
    (state, app)
}

fn track_request(body: Value, ip: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/track")
        .header("content-type", "application/json")
        .header("x-forwarded-for", ip)
        .header("origin", "https://www.quizsite.com")
        .body(Body::from(body.to_string()))
        .expect("build request")
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("parse json")
}

// BDD: a valid view is stored and attributed to the Origin domain
#[tokio::test]
async fn test_track_view_is_stored() {
    let (state, app) = setup();

    let response = app
        .oneshot(track_request(
            json!({"event": "view", "quizId": "abc", "utm_campaign": "spring"}),
            "1.2.3.4",
        ))
        .await
        .expect("request");

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["saved"], "stored");
    assert_eq!(body["event"], "view");
    assert_eq!(body["quizId"], "abc");
    assert_eq!(body["site"], "quizsite.com");
    assert!(body.get("error").is_none());

    assert_eq!(state.analytics.count_events().await.expect("count"), 1);
    assert_eq!(
        state.analytics.list_site_domains().await.expect("sites"),
        vec!["quizsite.com"]
    );
}

// BDD: the raw IP is never persisted
#[tokio::test]
async fn test_track_stores_only_ip_hash() {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");
    let db = Arc::new(db);
    let backend: Arc<dyn AnalyticsBackend> = db.clone();
    let app = build_app(Arc::new(AppState::with_backend(backend, test_config())));

    app.oneshot(track_request(json!({"event": "view", "quizId": "abc"}), "203.0.113.7"))
        .await
        .expect("request");

    let conn = db.conn_for_test().await;
    let ip_hash: String = conn
        .prepare("SELECT ip_hash FROM events")
        .expect("prepare")
        .query_row([], |row| row.get(0))
        .expect("row");
    assert_eq!(ip_hash.len(), 16);
    assert!(!ip_hash.contains("203.0.113.7"));
}

// BDD: sendBeacon posts text/plain; the body is still parsed as JSON
#[tokio::test]
async fn test_track_accepts_text_plain_and_aliases() {
    let (_state, app) = setup();

    let request = Request::builder()
        .method("POST")
        .uri("/track")
        .header("content-type", "text/plain;charset=UTF-8")
        .header("x-forwarded-for", "1.2.3.4")
        .body(Body::from(
            json!({"event": "complete", "quiz_id": "abc", "site": "https://Blog.Example.org/q"})
                .to_string(),
        ))
        .expect("build request");

    let response = app.oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["saved"], "stored");
    assert_eq!(body["event"], "complete");
    assert_eq!(body["site"], "blog.example.org");
}

#[tokio::test]
async fn test_track_missing_fields_is_400() {
    let (state, app) = setup();

    let response = app
        .oneshot(track_request(json!({"event": "view"}), "1.2.3.4"))
        .await
        .expect("request");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Missing event or quizId");
    assert_eq!(state.analytics.count_events().await.expect("count"), 0);
}

#[tokio::test]
async fn test_track_unknown_event_is_400() {
    let (_state, app) = setup();

    let response = app
        .oneshot(track_request(json!({"event": "click", "quizId": "abc"}), "1.2.3.4"))
        .await
        .expect("request");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Invalid event type");
}

#[tokio::test]
async fn test_track_malformed_json_is_400() {
    let (_state, app) = setup();

    let request = Request::builder()
        .method("POST")
        .uri("/api/track")
        .body(Body::from("{not json"))
        .expect("build request");
    let response = app.oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// BDD: ten events from one client within a minute pass; the eleventh is 429
#[tokio::test]
async fn test_track_rate_limit_returns_429_with_retry_after() {
    let (state, app) = setup();

    for i in 0..10 {
        let response = app
            .clone()
            .oneshot(track_request(
                json!({"event": "view", "quizId": format!("quiz-{i}")}),
                "9.9.9.9",
            ))
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(track_request(json!({"event": "view", "quizId": "quiz-x"}), "9.9.9.9"))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok()),
        Some("60")
    );
    let body = json_body(response).await;
    assert!(body["error"].is_string());
    assert!(body["message"].is_string());

    assert_eq!(state.analytics.count_events().await.expect("count"), 10);

    // A different client is not affected.
    let response = app
        .oneshot(track_request(json!({"event": "view", "quizId": "quiz-x"}), "8.8.8.8"))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
}

fn direct_request(body: Value, peer: [u8; 4]) -> Request<Body> {
    let mut request = Request::builder()
        .method("POST")
        .uri("/api/track")
        .header("content-type", "application/json")
        .header("origin", "https://www.quizsite.com")
        .body(Body::from(body.to_string()))
        .expect("build request");
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from((peer, 50000))));
    request
}

// BDD: clients without proxy headers are limited by their socket address,
// so one busy visitor does not throttle everyone else
#[tokio::test]
async fn test_track_rate_limit_is_per_peer_without_proxy_headers() {
    let (state, app) = setup();

    for i in 0..10 {
        let response = app
            .clone()
            .oneshot(direct_request(
                json!({"event": "view", "quizId": format!("quiz-{i}")}),
                [203, 0, 113, 1],
            ))
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(direct_request(
            json!({"event": "view", "quizId": "quiz-x"}),
            [203, 0, 113, 1],
        ))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let response = app
        .oneshot(direct_request(
            json!({"event": "view", "quizId": "quiz-x"}),
            [198, 51, 100, 7],
        ))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(state.analytics.count_events().await.expect("count"), 11);
}

// BDD: the same session/quiz/kind inside the window is acknowledged but not stored
#[tokio::test]
async fn test_track_duplicate_session_is_skipped() {
    let (state, app) = setup();
    let payload = json!({"event": "view", "quizId": "abc", "session_id": "s-1"});

    let first = app
        .clone()
        .oneshot(track_request(payload.clone(), "1.2.3.4"))
        .await
        .expect("request");
    assert_eq!(json_body(first).await["saved"], "stored");

    let second = app
        .clone()
        .oneshot(track_request(payload, "1.2.3.4"))
        .await
        .expect("request");
    assert_eq!(second.status(), StatusCode::OK);
    let body = json_body(second).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["saved"], "duplicate-skipped");

    // A complete in the same session is a different event.
    let complete = app
        .oneshot(track_request(
            json!({"event": "complete", "quizId": "abc", "sessionId": "s-1"}),
            "1.2.3.4",
        ))
        .await
        .expect("request");
    assert_eq!(json_body(complete).await["saved"], "stored");

    assert_eq!(state.analytics.count_events().await.expect("count"), 2);
}

// BDD: without a durable store, tracking still answers 200 with saved=logged
#[tokio::test]
async fn test_track_without_store_is_logged() {
    let state = Arc::new(AppState::with_backend(Arc::new(NullBackend), test_config()));
    let app = build_app(Arc::clone(&state));

    let response = app
        .oneshot(track_request(json!({"event": "view", "quizId": "abc"}), "1.2.3.4"))
        .await
        .expect("request");

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["saved"], "logged");
    assert_eq!(state.monitor.len().await, 1);
}

// BDD: accepted calls show up in the debug monitor, newest first
#[tokio::test]
async fn test_monitor_lists_recent_calls() {
    let (_state, app) = setup();

    for (event, quiz) in [("view", "a"), ("view", "a"), ("complete", "a"), ("view", "b")] {
        app.clone()
            .oneshot(track_request(json!({"event": event, "quizId": quiz}), "1.2.3.4"))
            .await
            .expect("request");
    }

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/monitor")
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("request");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get("cache-control")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("no-store")));
    let body = json_body(response).await;
    assert_eq!(body["totalEventsTracked"], 4);
    assert_eq!(body["maxEvents"], 50);
    assert_eq!(body["recentEvents"][0]["quizId"], "b");
    assert_eq!(body["summary"]["a"], json!({"views": 2, "completes": 1}));
}
