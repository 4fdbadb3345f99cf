use async_trait::async_trait;
use chrono::{DateTime, Utc};

use quiztrack_core::analytics::{AnalyticsBackend, CampaignRow, EventRow, StatsFilter, StatsResult};
use quiztrack_core::event::{Event, EventKind, Site};

use crate::DuckDbBackend;

#[async_trait]
impl AnalyticsBackend for DuckDbBackend {
    async fn ping(&self) -> anyhow::Result<()> {
        DuckDbBackend::ping(self).await
    }

    async fn upsert_site(&self, domain: &str) -> anyhow::Result<Site> {
        DuckDbBackend::upsert_site(self, domain).await
    }

    async fn list_site_domains(&self) -> anyhow::Result<Vec<String>> {
        DuckDbBackend::list_site_domains(self).await
    }

    async fn insert_event(&self, event: &Event) -> anyhow::Result<()> {
        DuckDbBackend::insert_event(self, event).await
    }

    async fn count_recent_by_ip(
        &self,
        ip_hash: &str,
        since: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        DuckDbBackend::count_recent_by_ip(self, ip_hash, since).await
    }

    async fn duplicate_exists(
        &self,
        session_id: &str,
        quiz_id: &str,
        kind: EventKind,
        since: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        DuckDbBackend::duplicate_exists(self, session_id, quiz_id, kind, since).await
    }

    async fn count_events(&self) -> anyhow::Result<i64> {
        DuckDbBackend::count_events(self).await
    }

    async fn get_stats(&self, filter: &StatsFilter) -> anyhow::Result<StatsResult> {
        crate::queries::stats::get_stats_inner(self, filter).await
    }

    async fn get_campaign_stats(
        &self,
        quiz_id: &str,
        filter: &StatsFilter,
    ) -> anyhow::Result<Vec<CampaignRow>> {
        crate::queries::campaigns::get_campaign_stats_inner(self, quiz_id, filter).await
    }

    async fn scan_events(
        &self,
        quiz_id: Option<&str>,
        filter: &StatsFilter,
        limit: usize,
    ) -> anyhow::Result<Vec<EventRow>> {
        crate::queries::events::scan_events_inner(self, quiz_id, filter, limit).await
    }
}
