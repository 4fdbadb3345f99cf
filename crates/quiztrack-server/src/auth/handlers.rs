use std::sync::Arc;

use axum::{body::Bytes, extract::State, response::IntoResponse, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::{error::AppError, state::AppState};

use super::jwt::{decode_jwt, encode_jwt};

#[derive(Debug, Default, Deserialize)]
pub struct AuthRequest {
    pub action: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
}

/// `POST /api/auth`: dashboard login and token verification.
///
/// - `{"action":"login","password":...}` → `{success, token, expiresAt}`
/// - `{"action":"verify","token":...}` → `{success}`
///
/// 503 when `AUTH_TOKEN` is not configured, 401 on a wrong password or an
/// invalid/expired token, 400 on a malformed body, missing fields or an
/// unknown action. Every error uses the flat `{error}` body.
#[tracing::instrument(skip(state, body))]
pub async fn auth(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let Some(secret) = state.config.auth_token.as_deref() else {
        return Err(AppError::ServiceUnavailable(
            "AUTH_TOKEN is not configured".to_string(),
        ));
    };
    let req: AuthRequest = serde_json::from_slice(&body)
        .map_err(|_| AppError::BadRequest("Invalid JSON body".to_string()))?;

    match req.action.as_deref() {
        Some("login") => {
            let password = req
                .password
                .filter(|p| !p.is_empty())
                .ok_or_else(|| AppError::BadRequest("Password not provided".to_string()))?;
            if !password_matches(&password, secret) {
                tracing::warn!("Dashboard login rejected");
                return Err(AppError::Unauthorized("Incorrect password".to_string()));
            }
            let (token, expires_at) = encode_jwt(secret, Utc::now())?;
            tracing::info!("Dashboard login succeeded");
            Ok(Json(json!({
                "success": true,
                "token": token,
                "expiresAt": expires_at,
                "message": "Authenticated",
            })))
        }
        Some("verify") => {
            let token = req
                .token
                .filter(|t| !t.is_empty())
                .ok_or_else(|| AppError::BadRequest("Token not provided".to_string()))?;
            decode_jwt(&token, secret)
                .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;
            Ok(Json(json!({ "success": true, "message": "Token valid" })))
        }
        _ => Err(AppError::BadRequest("Invalid action".to_string())),
    }
}

/// Compares digests so neither content nor length leaks through timing.
fn password_matches(candidate: &str, secret: &str) -> bool {
    let candidate = Sha256::digest(candidate.as_bytes());
    let secret = Sha256::digest(secret.as_bytes());
    candidate.as_slice().ct_eq(secret.as_slice()).into()
}
