use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{header, request::Parts, HeaderMap},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;

use quiztrack_core::{
    event::{SaveStatus, TrackPayload},
    identity::pick_domain_hint,
};

use crate::{error::AppError, monitor::MonitorEntry, state::AppState};

/// `POST /api/track`: record one quiz `view` or `complete`.
///
/// ## Body
/// `{event, quizId, site?, utm_campaign?, session_id?}`. Parsed as JSON
/// whatever the `Content-Type`, since `navigator.sendBeacon` posts
/// `text/plain`. An empty body counts as an empty payload.
///
/// ## Site
/// Explicit `site`, then `Origin`, `Referer`, `Host`, then `"unknown"`.
///
/// ## Response
/// - `200 {ok, saved, event, quizId, site, error?}` for every accepted call,
///   including store failures (`saved: "error"`, `ok: false`).
/// - `400 {error}` on an invalid payload.
/// - `429 {error, message}` with `Retry-After` when the client IP is over
///   the limit.
#[tracing::instrument(skip(state, peer, headers, body))]
pub async fn track(
    State(state): State<Arc<AppState>>,
    peer: MaybeConnectInfo,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload: TrackPayload = if body.iter().all(u8::is_ascii_whitespace) {
        TrackPayload::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|_| AppError::BadRequest("Invalid JSON body".to_string()))?
    };
    let track = payload.validate()?;

    let domain_hint = pick_domain_hint(
        track.site.as_deref(),
        header_str(&headers, header::ORIGIN),
        header_str(&headers, header::REFERER),
        header_str(&headers, header::HOST),
    );
    let client_ip = extract_client_ip(&headers, peer.0);

    let kind = track.kind;
    let quiz_id = track.quiz_id.clone();
    let utm_campaign = track.utm_campaign.clone();
    let session_id = track.session_id.clone();

    let outcome = state
        .recorder()
        .record(track, &domain_hint, &client_ip)
        .await?;

    state
        .monitor
        .push(MonitorEntry {
            event: kind,
            quiz_id: quiz_id.clone(),
            site: outcome.site.clone(),
            utm_campaign,
            session_id,
            saved: outcome.saved,
            received_at: Utc::now(),
        })
        .await;

    let mut body = json!({
        "ok": outcome.saved != SaveStatus::Error,
        "saved": outcome.saved,
        "event": kind,
        "quizId": quiz_id,
        "site": outcome.site,
    });
    if let Some(error) = outcome.error {
        body["error"] = json!(error);
    }

    Ok(Json(body))
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// TCP peer address, present when the server is started with
/// `into_make_service_with_connect_info`.
pub struct MaybeConnectInfo(pub Option<SocketAddr>);

impl<S> FromRequestParts<S> for MaybeConnectInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let peer = ConnectInfo::<SocketAddr>::from_request_parts(parts, state)
            .await
            .ok()
            .map(|ConnectInfo(addr)| addr);
        Ok(Self(peer))
    }
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`, then the socket peer,
/// else `"unknown"`.
fn extract_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}
