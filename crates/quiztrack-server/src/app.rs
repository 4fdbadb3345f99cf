use std::sync::Arc;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{auth, routes, state::AppState};

/// Construct the Axum [`Router`] with all routes and middleware attached.
///
/// Middleware is applied in outer-to-inner order (outermost runs first on
/// request, last on response):
///
/// 1. `CorsLayer`: the tracking script runs on third-party quiz pages, so
///    every origin is allowed unless `QUIZTRACK_CORS_ORIGINS` narrows it.
/// 2. `TraceLayer`: structured request/response logging via `tracing`.
///
/// Legacy unprefixed paths (`/track`, `/stats`, `/campaigns/...`) are kept as
/// aliases for already-deployed embeds.
pub fn build_app(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/track", post(routes::track::track))
        .route("/track", post(routes::track::track))
        .route("/api/stats", get(routes::stats::stats))
        .route("/stats", get(routes::stats::stats))
        .route("/api/campaigns/{quiz_id}", get(routes::campaigns::campaigns))
        .route("/campaigns/{quiz_id}", get(routes::campaigns::campaigns))
        .route("/api/monitor", get(routes::monitor::monitor))
        .route("/api/diagnostics", get(routes::diagnostics::diagnostics))
        .route("/api/auth", post(auth::handlers::auth))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(allowed))
    }
}
