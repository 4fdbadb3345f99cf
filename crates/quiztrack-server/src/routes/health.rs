use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use quiztrack_core::error::StoreError;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StoreHealth {
    Ok,
    /// `QUIZTRACK_STORE=none`: calls are logged, nothing persists.
    NotConfigured,
    Unreachable,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub version: &'static str,
    pub store: StoreHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `GET /health`: 200 when the store answers a ping, 503 otherwise.
///
/// The `store` field says which kind of 503 it is, so a deploy running in
/// log-only mode is distinguishable from a broken database.
#[tracing::instrument(skip(state))]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (store, error) = match state.analytics.ping().await {
        Ok(()) => (StoreHealth::Ok, None),
        Err(e) if StoreError::is_not_configured(&e) => {
            (StoreHealth::NotConfigured, Some(e.to_string()))
        }
        Err(e) => {
            tracing::error!(error = %e, "Store ping failed");
            (StoreHealth::Unreachable, Some(e.to_string()))
        }
    };

    let code = if store == StoreHealth::Ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let report = HealthReport {
        status: if code == StatusCode::OK { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        store,
        error,
    };
    (code, Json(report))
}
