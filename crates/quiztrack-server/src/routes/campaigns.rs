use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use quiztrack_core::analytics::{ConversionTotals, Granularity, StatsFilter};

use crate::{
    error::AppError,
    routes::stats::{iso, non_blank, site_filter, window_from_query},
    state::AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct CampaignQuery {
    #[serde(rename = "startDate", alias = "start_date")]
    pub start_date: Option<String>,
    #[serde(rename = "endDate", alias = "end_date")]
    pub end_date: Option<String>,
    pub days: Option<String>,
    pub site: Option<String>,
}

/// `GET /api/campaigns/{quiz_id}`: per-campaign conversion for one quiz.
///
/// Events without a campaign are reported under `"(none)"`. Same window and
/// site rules as `/api/stats`.
#[tracing::instrument(skip(state))]
pub async fn campaigns(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<String>,
    Query(query): Query<CampaignQuery>,
) -> Result<impl IntoResponse, AppError> {
    let quiz_id = non_blank(Some(quiz_id.as_str()))
        .ok_or_else(|| AppError::BadRequest("Missing quizId".to_string()))?
        .to_string();

    let (start, end) = window_from_query(
        Utc::now(),
        query.start_date.as_deref(),
        query.end_date.as_deref(),
        query.days.as_deref(),
    )?;
    let filter = StatsFilter {
        start,
        end,
        granularity: Granularity::default(),
        site: site_filter(query.site.as_deref()),
        campaign: None,
    };

    let cache_key = format!(
        "campaigns|{quiz_id}|{:?}|{:?}|{:?}|{:?}",
        query.start_date, query.end_date, query.days, query.site
    );
    let out = state.engine.campaigns(&cache_key, &quiz_id, &filter).await;
    let totals = ConversionTotals::from_campaigns(&out.data);

    let mut body = json!({
        "quizId": quiz_id,
        "site": filter.site,
        "startDate": iso(filter.start),
        "endDate": iso(filter.end),
        "campaigns": out.data,
        "totals": totals,
    });
    if let Some(warning) = &out.warning {
        body["warning"] = json!(warning);
    }
    if let Some(error) = &out.error {
        body["error"] = json!(error);
    }

    Ok(Json(body))
}
