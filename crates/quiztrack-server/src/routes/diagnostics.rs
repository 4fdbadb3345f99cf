use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};
use chrono::Utc;
use serde_json::json;

use crate::state::AppState;

/// `GET /api/diagnostics`: configuration and store reachability at a glance.
#[tracing::instrument(skip(state))]
pub async fn diagnostics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let configured = state.analytics.is_configured();
    let (reachable, total_events) = if configured {
        match state.analytics.count_events().await {
            Ok(count) => (true, Some(count)),
            Err(e) => {
                tracing::warn!(error = %e, "Diagnostics: store unreachable");
                (false, None)
            }
        }
    } else {
        (false, None)
    };

    Json(json!({
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "store": {
            "configured": configured,
            "reachable": reachable,
            "totalEvents": total_events,
        },
        "auth": {
            "configured": state.config.auth_token.is_some(),
        },
        "rateLimit": {
            "enabled": !state.config.rate_limit_disable,
            "max": state.config.rate_limit_max,
            "windowSeconds": state.config.rate_limit_window_secs,
        },
        "monitor": {
            "events": state.monitor.len().await,
            "capacity": state.monitor.capacity(),
        },
    }))
}
