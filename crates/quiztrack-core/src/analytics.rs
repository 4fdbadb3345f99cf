//! Analytics backend abstraction.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::event::{Event, EventKind, Site};

pub const DEFAULT_WINDOW_DAYS: i64 = 30;
pub const MAX_WINDOW_DAYS: i64 = 365;

/// Label for events recorded without a `utm_campaign`.
pub const NO_CAMPAIGN: &str = "(none)";

/// Bucket width for charted series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    #[default]
    Day,
    Week,
}

impl Granularity {
    /// Lenient parse: anything unrecognised is a daily series.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("hour") => Self::Hour,
            Some("week") => Self::Week,
            _ => Self::Day,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
        }
    }
}

/// Filters applied uniformly to every aggregation query.
///
/// `start` and `end` are both inclusive. `site` is a normalized domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsFilter {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub granularity: Granularity,
    pub site: Option<String>,
    pub campaign: Option<String>,
}

/// Parse a `startDate`/`endDate` query value.
///
/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates. A plain end date
/// covers the whole day.
pub fn parse_boundary(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| format!("invalid date: {raw} (expected ISO 8601)"))?;
    let time = if end_of_day {
        date.and_hms_micro_opt(23, 59, 59, 999_999)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.map(|t| t.and_utc())
        .ok_or_else(|| format!("invalid date: {raw}"))
}

/// Resolve the query window.
///
/// Explicit dates win over `days`; with neither, the last
/// [`DEFAULT_WINDOW_DAYS`] days are used. `days` is clamped to
/// `1..=MAX_WINDOW_DAYS`.
pub fn resolve_window(
    now: DateTime<Utc>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    days: Option<i64>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), String> {
    if start.is_some() || end.is_some() {
        let end = end.unwrap_or(now);
        let start = start.unwrap_or(end - Duration::days(DEFAULT_WINDOW_DAYS));
        if end < start {
            return Err("endDate must be on or after startDate".to_string());
        }
        return Ok((start, end));
    }

    let days = days
        .unwrap_or(DEFAULT_WINDOW_DAYS)
        .clamp(1, MAX_WINDOW_DAYS);
    Ok((now - Duration::days(days), now))
}

/// `completes / views * 100`, clamped to `[0, 100]`. Zero when `views` is 0.
pub fn conversion_rate_pct(views: i64, completes: i64) -> f64 {
    if views <= 0 {
        return 0.0;
    }
    (completes.max(0) as f64 / views as f64 * 100.0).clamp(0.0, 100.0)
}

/// Percentage string with one decimal, e.g. `"33.3%"`.
pub fn format_conversion_rate(views: i64, completes: i64) -> String {
    format!("{:.1}%", conversion_rate_pct(views, completes))
}

/// One grouped row of the stats response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    pub site: String,
    pub quiz_id: String,
    pub views: i64,
    pub completes: i64,
    pub conversion_rate: String,
}

impl AggregateRow {
    pub fn new(
        bucket: Option<String>,
        site: String,
        quiz_id: String,
        views: i64,
        completes: i64,
    ) -> Self {
        Self {
            bucket,
            site,
            quiz_id,
            views,
            completes,
            conversion_rate: format_conversion_rate(views, completes),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignRow {
    pub campaign: String,
    pub views: i64,
    pub completes: i64,
    pub conversion_rate: String,
}

impl CampaignRow {
    pub fn new(campaign: String, views: i64, completes: i64) -> Self {
        Self {
            campaign,
            views,
            completes,
            conversion_rate: format_conversion_rate(views, completes),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionTotals {
    pub views: i64,
    pub completes: i64,
    pub conversion_rate: String,
}

impl ConversionTotals {
    pub fn from_campaigns(rows: &[CampaignRow]) -> Self {
        let views = rows.iter().map(|r| r.views).sum();
        let completes = rows.iter().map(|r| r.completes).sum();
        Self {
            views,
            completes,
            conversion_rate: format_conversion_rate(views, completes),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsResult {
    pub bucketed: Vec<AggregateRow>,
    pub totals: Vec<AggregateRow>,
}

/// A raw event joined with its site, as returned by the coarse scan.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRow {
    pub site: String,
    pub quiz_id: String,
    pub kind: EventKind,
    pub utm_campaign: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Bucket label for `ts`. Weeks start on Monday (ISO).
pub fn bucket_key(ts: DateTime<Utc>, granularity: Granularity) -> String {
    match granularity {
        Granularity::Hour => ts.format("%Y-%m-%dT%H:00:00Z").to_string(),
        Granularity::Day => ts.format("%Y-%m-%d").to_string(),
        Granularity::Week => {
            let date = ts.date_naive();
            let monday =
                date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
            monday.format("%Y-%m-%d").to_string()
        }
    }
}

/// Views descending; ties by site then quiz for a stable response.
pub fn sort_totals(rows: &mut [AggregateRow]) {
    rows.sort_by(|a, b| {
        b.views
            .cmp(&a.views)
            .then_with(|| a.site.cmp(&b.site))
            .then_with(|| a.quiz_id.cmp(&b.quiz_id))
    });
}

pub fn sort_campaigns(rows: &mut [CampaignRow]) {
    rows.sort_by(|a, b| b.views.cmp(&a.views).then_with(|| a.campaign.cmp(&b.campaign)));
}

fn tally(counts: &mut (i64, i64), kind: EventKind) {
    match kind {
        EventKind::View => counts.0 += 1,
        EventKind::Complete => counts.1 += 1,
    }
}

/// In-process equivalent of the store's grouped aggregate query.
pub fn aggregate_event_rows(rows: &[EventRow], granularity: Granularity) -> StatsResult {
    let mut bucketed: BTreeMap<(String, String, String), (i64, i64)> = BTreeMap::new();
    let mut totals: BTreeMap<(String, String), (i64, i64)> = BTreeMap::new();

    for row in rows {
        let bucket = bucket_key(row.created_at, granularity);
        tally(
            bucketed
                .entry((bucket, row.site.clone(), row.quiz_id.clone()))
                .or_default(),
            row.kind,
        );
        tally(
            totals
                .entry((row.site.clone(), row.quiz_id.clone()))
                .or_default(),
            row.kind,
        );
    }

    let bucketed = bucketed
        .into_iter()
        .map(|((bucket, site, quiz_id), (v, c))| AggregateRow::new(Some(bucket), site, quiz_id, v, c))
        .collect();
    let mut totals: Vec<AggregateRow> = totals
        .into_iter()
        .map(|((site, quiz_id), (v, c))| AggregateRow::new(None, site, quiz_id, v, c))
        .collect();
    sort_totals(&mut totals);

    StatsResult { bucketed, totals }
}

/// Per-campaign counts for rows already scoped to one quiz.
pub fn aggregate_campaign_rows(rows: &[EventRow]) -> Vec<CampaignRow> {
    let mut by_campaign: BTreeMap<String, (i64, i64)> = BTreeMap::new();
    for row in rows {
        let campaign = row
            .utm_campaign
            .clone()
            .unwrap_or_else(|| NO_CAMPAIGN.to_string());
        tally(by_campaign.entry(campaign).or_default(), row.kind);
    }
    let mut out: Vec<CampaignRow> = by_campaign
        .into_iter()
        .map(|(campaign, (v, c))| CampaignRow::new(campaign, v, c))
        .collect();
    sort_campaigns(&mut out);
    out
}

#[async_trait::async_trait]
pub trait AnalyticsBackend: Send + Sync + 'static {
    /// `false` for the log-only backend; the recorder skips the store entirely.
    fn is_configured(&self) -> bool {
        true
    }

    async fn ping(&self) -> anyhow::Result<()>;

    /// Atomic upsert keyed by normalized domain. Concurrent first writers for
    /// one domain must converge on a single row.
    async fn upsert_site(&self, domain: &str) -> anyhow::Result<Site>;

    async fn list_site_domains(&self) -> anyhow::Result<Vec<String>>;

    async fn insert_event(&self, event: &Event) -> anyhow::Result<()>;

    /// Events recorded for `ip_hash` with `created_at >= since`.
    async fn count_recent_by_ip(
        &self,
        ip_hash: &str,
        since: DateTime<Utc>,
    ) -> anyhow::Result<i64>;

    /// Whether `(session_id, quiz_id, kind)` was recorded at or after `since`.
    async fn duplicate_exists(
        &self,
        session_id: &str,
        quiz_id: &str,
        kind: EventKind,
        since: DateTime<Utc>,
    ) -> anyhow::Result<bool>;

    async fn count_events(&self) -> anyhow::Result<i64>;

    /// Precise grouped aggregate over the whole window.
    async fn get_stats(&self, filter: &StatsFilter) -> anyhow::Result<StatsResult>;

    /// Precise per-campaign aggregate for one quiz.
    async fn get_campaign_stats(
        &self,
        quiz_id: &str,
        filter: &StatsFilter,
    ) -> anyhow::Result<Vec<CampaignRow>>;

    /// Coarse fallback: the `limit` most recent matching raw events.
    async fn scan_events(
        &self,
        quiz_id: Option<&str>,
        filter: &StatsFilter,
        limit: usize,
    ) -> anyhow::Result<Vec<EventRow>>;
}
