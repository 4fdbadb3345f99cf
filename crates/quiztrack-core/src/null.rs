use chrono::{DateTime, Utc};

use crate::analytics::{AnalyticsBackend, CampaignRow, EventRow, StatsFilter, StatsResult};
use crate::error::StoreError;
use crate::event::{Event, EventKind, Site};

/// [`AnalyticsBackend`] used when no durable store is configured.
///
/// Every call fails with [`StoreError::NotConfigured`]; tracking degrades to
/// `saved: "logged"` and stats to an empty, flagged result.
pub struct NullBackend;

#[async_trait::async_trait]
impl AnalyticsBackend for NullBackend {
    fn is_configured(&self) -> bool {
        false
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Err(StoreError::NotConfigured.into())
    }

    async fn upsert_site(&self, _domain: &str) -> anyhow::Result<Site> {
        Err(StoreError::NotConfigured.into())
    }

    async fn list_site_domains(&self) -> anyhow::Result<Vec<String>> {
        Err(StoreError::NotConfigured.into())
    }

    async fn insert_event(&self, _event: &Event) -> anyhow::Result<()> {
        Err(StoreError::NotConfigured.into())
    }

    async fn count_recent_by_ip(
        &self,
        _ip_hash: &str,
        _since: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        Err(StoreError::NotConfigured.into())
    }

    async fn duplicate_exists(
        &self,
        _session_id: &str,
        _quiz_id: &str,
        _kind: EventKind,
        _since: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        Err(StoreError::NotConfigured.into())
    }

    async fn count_events(&self) -> anyhow::Result<i64> {
        Err(StoreError::NotConfigured.into())
    }

    async fn get_stats(&self, _filter: &StatsFilter) -> anyhow::Result<StatsResult> {
        Err(StoreError::NotConfigured.into())
    }

    async fn get_campaign_stats(
        &self,
        _quiz_id: &str,
        _filter: &StatsFilter,
    ) -> anyhow::Result<Vec<CampaignRow>> {
        Err(StoreError::NotConfigured.into())
    }

    async fn scan_events(
        &self,
        _quiz_id: Option<&str>,
        _filter: &StatsFilter,
        _limit: usize,
    ) -> anyhow::Result<Vec<EventRow>> {
        Err(StoreError::NotConfigured.into())
    }
}
