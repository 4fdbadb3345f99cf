use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use quiztrack_core::config::Config;
use quiztrack_duckdb::DuckDbBackend;
use quiztrack_server::app::build_app;
use quiztrack_server::state::AppState;

fn setup(auth_token: Option<&str>) -> axum::Router {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");
    let config = Config {
        port: 0,
        auth_token: auth_token.map(str::to_string),
        ..Config::default()
    };
    build_app(Arc::new(AppState::new(db, config)))
}

fn auth_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/auth")
        .header("content-type", "application/json")
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

// BDD: without AUTH_TOKEN the auth endpoint is unavailable
#[tokio::test]
async fn test_auth_unconfigured_is_503() {
    let app = setup(None);
    let response = app
        .oneshot(auth_request(json!({"action": "login", "password": "x"})))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// BDD: login with the shared secret issues a token that verifies
#[tokio::test]
async fn test_login_then_verify() {
    let app = setup(Some("s3cret"));

    let response = app
        .clone()
        .oneshot(auth_request(json!({"action": "login", "password": "s3cret"})))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    let token = body["token"].as_str().expect("token").to_string();
    assert!(body["expiresAt"].is_string());

    let response = app
        .oneshot(auth_request(json!({"action": "verify", "token": token})))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["success"], true);
}

#[tokio::test]
async fn test_login_wrong_password_is_401() {
    let app = setup(Some("s3cret"));
    let response = app
        .oneshot(auth_request(json!({"action": "login", "password": "nope"})))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["success"], false);
}

#[tokio::test]
async fn test_verify_garbage_token_is_401() {
    let app = setup(Some("s3cret"));
    let response = app
        .oneshot(auth_request(json!({"action": "verify", "token": "abc.def.ghi"})))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_fields_and_unknown_action_are_400() {
    let app = setup(Some("s3cret"));

    for body in [
        json!({"action": "login"}),
        json!({"action": "verify"}),
        json!({"action": "logout"}),
        json!({}),
    ] {
        let response = app
            .clone()
            .oneshot(auth_request(body))
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

// BDD: a malformed or non-JSON body gets the same flat error shape as other routes
#[tokio::test]
async fn test_malformed_body_is_400_json() {
    let app = setup(Some("s3cret"));

    for (content_type, body) in [
        ("application/json", "{not json"),
        ("text/plain", "action=login"),
        ("application/json", ""),
    ] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth")
                    .header("content-type", content_type)
                    .body(Body::from(body))
                    .expect("build request"),
            )
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"].is_string());
    }
}
