use std::sync::Arc;

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;

use crate::{monitor::summarize, state::AppState};

/// `GET /api/monitor`: the most recent tracking calls, newest first.
///
/// Debug aid for checking that embed scripts fire. Never cached.
pub async fn monitor(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let recent = state.monitor.recent().await;
    let message = if recent.is_empty() {
        "No events received yet. Tracking scripts may not be firing.".to_string()
    } else {
        format!("{} events received recently.", recent.len())
    };

    (
        [
            (
                header::CACHE_CONTROL,
                "no-cache, no-store, must-revalidate, max-age=0",
            ),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        Json(json!({
            "timestamp": Utc::now().to_rfc3339(),
            "totalEventsTracked": recent.len(),
            "maxEvents": state.monitor.capacity(),
            "summary": summarize(&recent),
            "recentEvents": recent,
            "message": message,
        })),
    )
}
