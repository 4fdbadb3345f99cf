use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::json;

use quiztrack_core::{
    analytics::{format_conversion_rate, parse_boundary, resolve_window, Granularity, StatsFilter},
    error::StoreError,
    identity::normalize_domain,
};

use crate::{error::AppError, state::AppState};

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub range: Option<String>,
    pub site: Option<String>,
    pub campaign: Option<String>,
    pub days: Option<String>,
    #[serde(rename = "startDate", alias = "start_date")]
    pub start_date: Option<String>,
    #[serde(rename = "endDate", alias = "end_date")]
    pub end_date: Option<String>,
    pub distinct: Option<String>,
    pub debug: Option<String>,
}

impl StatsQuery {
    /// Cache key over the raw filter tuple. Relative windows resolve to a new
    /// instant on every call, so the resolved filter cannot be the key.
    fn cache_key(&self) -> String {
        format!(
            "stats|{:?}|{:?}|{:?}|{:?}|{:?}|{:?}",
            self.range, self.site, self.campaign, self.days, self.start_date, self.end_date
        )
    }
}

/// Resolve `startDate`/`endDate`/`days` into an inclusive UTC window.
pub(crate) fn window_from_query(
    now: DateTime<Utc>,
    start_date: Option<&str>,
    end_date: Option<&str>,
    days: Option<&str>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), AppError> {
    let start = non_blank(start_date)
        .map(|s| parse_boundary(s, false))
        .transpose()
        .map_err(AppError::BadRequest)?;
    let end = non_blank(end_date)
        .map(|s| parse_boundary(s, true))
        .transpose()
        .map_err(AppError::BadRequest)?;
    let days = non_blank(days).and_then(|d| d.parse::<i64>().ok());
    resolve_window(now, start, end, days).map_err(AppError::BadRequest)
}

/// Site filters are normalized like tracked domains so `https://www.X.com/`
/// matches rows stored as `x.com`.
pub(crate) fn site_filter(raw: Option<&str>) -> Option<String> {
    non_blank(raw).map(normalize_domain)
}

pub(crate) fn non_blank(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

pub(crate) fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `GET /api/stats`: bucketed and total conversion statistics.
///
/// Query: `range` (hour|day|week, default day), `site`, `campaign`, `days`,
/// `startDate`, `endDate`, `distinct=site`, `debug=true`.
///
/// Aggregation failures never produce an HTTP error: the body carries
/// `warning` (approximate fallback) or `error` (empty degraded result).
#[tracing::instrument(skip(state))]
pub async fn stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, AppError> {
    if query.distinct.as_deref() == Some("site") {
        return Ok(Json(distinct_sites(&state).await));
    }

    let (start, end) = window_from_query(
        Utc::now(),
        query.start_date.as_deref(),
        query.end_date.as_deref(),
        query.days.as_deref(),
    )?;
    let filter = StatsFilter {
        start,
        end,
        granularity: Granularity::parse(query.range.as_deref()),
        site: site_filter(query.site.as_deref()),
        campaign: non_blank(query.campaign.as_deref()).map(str::to_string),
    };

    let out = state.engine.stats(&query.cache_key(), &filter).await;

    let mut body = json!({
        "range": filter.granularity.as_str(),
        "site": filter.site,
        "campaign": filter.campaign,
        "startDate": iso(filter.start),
        "endDate": iso(filter.end),
        "bucketed": out.data.bucketed,
        "totals": out.data.totals,
    });
    if let Some(warning) = &out.warning {
        body["warning"] = json!(warning);
    }
    if let Some(error) = &out.error {
        body["error"] = json!(error);
    }

    if query.debug.as_deref() == Some("true") {
        let views: i64 = out.data.totals.iter().map(|r| r.views).sum();
        let completes: i64 = out.data.totals.iter().map(|r| r.completes).sum();
        body["summary"] = json!({
            "totalEvents": views + completes,
            "totalViews": views,
            "totalCompletes": completes,
            "overallConversionRate": format_conversion_rate(views, completes),
            "totalQuizzes": out.data.totals.len(),
            "source": out.source,
        });
    }

    Ok(Json(body))
}

async fn distinct_sites(state: &AppState) -> serde_json::Value {
    match state.analytics.list_site_domains().await {
        Ok(sites) => json!({ "sites": sites }),
        Err(e) if StoreError::is_not_configured(&e) => {
            json!({ "sites": [], "error": "No durable store configured" })
        }
        Err(e) => {
            tracing::error!(error = %e, "Listing sites failed");
            json!({ "sites": [], "error": "Sites temporarily unavailable" })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 8, 0, 0)
            .single()
            .expect("valid ts")
    }

    #[test]
    fn plain_end_date_is_inclusive_of_whole_day() {
        let (start, end) =
            window_from_query(now(), Some("2026-10-01"), Some("2026-10-02"), None).expect("window");
        assert_eq!(iso(start), "2026-10-01T00:00:00.000Z");
        assert_eq!(iso(end), "2026-10-02T23:59:59.999Z");
    }

    #[test]
    fn unparseable_days_falls_back_to_default() {
        let (start, end) = window_from_query(now(), None, None, Some("abc")).expect("window");
        assert_eq!((end - start).num_days(), 30);
    }

    #[test]
    fn bad_date_is_a_bad_request() {
        let err = window_from_query(now(), Some("yesterday"), None, None).expect_err("invalid");
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn blank_site_filter_is_ignored() {
        assert_eq!(site_filter(Some("  ")), None);
        assert_eq!(site_filter(Some("https://www.X.com/")), Some("x.com".to_string()));
    }
}
