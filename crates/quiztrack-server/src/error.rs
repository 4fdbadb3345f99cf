use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use quiztrack_core::error::TrackError;

/// Application-level errors that map directly to HTTP responses.
///
/// Every variant implements [`IntoResponse`] so Axum handlers can use
/// `Result<impl IntoResponse, AppError>` as their return type. Bodies are
/// flat `{ "error": "..." }` objects; rate limiting adds a `message`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("rate limited")]
    RateLimited { retry_after_seconds: u64 },

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<TrackError> for AppError {
    fn from(err: TrackError) -> Self {
        match err {
            TrackError::Validation(msg) => AppError::BadRequest(msg),
            TrackError::RateLimited {
                retry_after_seconds,
            } => AppError::RateLimited {
                retry_after_seconds,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body, retry_after_seconds) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg }), None),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg }), None),
            AppError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                json!({ "success": false, "error": msg }),
                None,
            ),
            AppError::RateLimited {
                retry_after_seconds,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({
                    "error": "Too many requests",
                    "message": format!(
                        "Rate limit exceeded. Try again in {retry_after_seconds} seconds."
                    ),
                }),
                Some(*retry_after_seconds),
            ),
            AppError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": msg }),
                None,
            ),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                    None,
                )
            }
        };

        let mut response = (status, Json(body)).into_response();

        if let Some(retry_after_seconds) = retry_after_seconds {
            if let Ok(value) = retry_after_seconds.to_string().parse() {
                response
                    .headers_mut()
                    .insert(axum::http::header::RETRY_AFTER, value);
            }
        }

        response
    }
}
