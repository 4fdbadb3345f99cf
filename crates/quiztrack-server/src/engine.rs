use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, warn};

use quiztrack_core::{
    analytics::{
        aggregate_campaign_rows, aggregate_event_rows, AnalyticsBackend, CampaignRow,
        StatsFilter, StatsResult,
    },
    config::Config,
    error::StoreError,
};

/// Upper bound on raw events pulled by the coarse fallback scan.
pub const FALLBACK_SCAN_LIMIT: usize = 1000;

const FALLBACK_WARNING: &str =
    "Precise aggregation unavailable; results approximate the 1000 most recent events";

/// Where an aggregation result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Precise,
    Cache,
    Fallback,
    Degraded,
}

#[derive(Debug, Clone)]
pub struct Aggregated<T> {
    pub data: T,
    pub source: Source,
    pub warning: Option<String>,
    pub error: Option<String>,
}

impl<T: Default> Aggregated<T> {
    fn with_source(data: T, source: Source) -> Self {
        Self {
            data,
            source,
            warning: None,
            error: None,
        }
    }

    fn degraded(message: &str) -> Self {
        Self {
            data: T::default(),
            source: Source::Degraded,
            warning: None,
            error: Some(message.to_string()),
        }
    }
}

/// Short-lived result cache keyed by the raw request filter tuple.
/// A zero TTL disables it.
struct TtlCache<T> {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, T)>>,
}

impl<T: Clone> TtlCache<T> {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    async fn get(&self, key: &str) -> Option<T> {
        if self.ttl.is_zero() {
            return None;
        }
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|(stored_at, _)| stored_at.elapsed() < self.ttl)
            .map(|(_, value)| value.clone())
    }

    async fn put(&self, key: String, value: T) {
        if self.ttl.is_zero() {
            return;
        }
        let mut entries = self.entries.lock().await;
        let ttl = self.ttl;
        entries.retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
        entries.insert(key, (Instant::now(), value));
    }
}

/// Time-bucketed and total conversion statistics with an explicit fallback
/// policy:
///
/// 1. Run the precise grouped query under `timeout`.
/// 2. On timeout or [`StoreError::Unsupported`], aggregate at most
///    [`FALLBACK_SCAN_LIMIT`] recent events in-process and attach a warning.
/// 3. Any other failure (or a failed fallback) yields an empty result with
///    an error flag.
///
/// Only precise results are cached.
pub struct AggregationEngine {
    backend: Arc<dyn AnalyticsBackend>,
    timeout: Duration,
    stats_cache: TtlCache<StatsResult>,
    campaign_cache: TtlCache<Vec<CampaignRow>>,
}

impl AggregationEngine {
    pub fn new(backend: Arc<dyn AnalyticsBackend>, config: &Config) -> Self {
        Self {
            backend,
            timeout: config.stats_timeout(),
            stats_cache: TtlCache::new(config.stats_cache_ttl()),
            campaign_cache: TtlCache::new(config.stats_cache_ttl()),
        }
    }

    pub async fn stats(&self, cache_key: &str, filter: &StatsFilter) -> Aggregated<StatsResult> {
        if let Some(hit) = self.stats_cache.get(cache_key).await {
            return Aggregated::with_source(hit, Source::Cache);
        }

        let backend = &self.backend;
        let out = self
            .aggregate("stats", backend.get_stats(filter), || async move {
                let rows = backend
                    .scan_events(None, filter, FALLBACK_SCAN_LIMIT)
                    .await?;
                Ok::<_, anyhow::Error>(aggregate_event_rows(&rows, filter.granularity))
            })
            .await;

        if out.source == Source::Precise {
            self.stats_cache
                .put(cache_key.to_string(), out.data.clone())
                .await;
        }
        out
    }

    pub async fn campaigns(
        &self,
        cache_key: &str,
        quiz_id: &str,
        filter: &StatsFilter,
    ) -> Aggregated<Vec<CampaignRow>> {
        if let Some(hit) = self.campaign_cache.get(cache_key).await {
            return Aggregated::with_source(hit, Source::Cache);
        }

        let backend = &self.backend;
        let out = self
            .aggregate(
                "campaigns",
                backend.get_campaign_stats(quiz_id, filter),
                || async move {
                    let rows = backend
                        .scan_events(Some(quiz_id), filter, FALLBACK_SCAN_LIMIT)
                        .await?;
                    Ok::<_, anyhow::Error>(aggregate_campaign_rows(&rows))
                },
            )
            .await;

        if out.source == Source::Precise {
            self.campaign_cache
                .put(cache_key.to_string(), out.data.clone())
                .await;
        }
        out
    }

    async fn aggregate<T, P, F, FF>(&self, what: &'static str, precise: P, fallback: F) -> Aggregated<T>
    where
        T: Default,
        P: Future<Output = anyhow::Result<T>>,
        F: FnOnce() -> FF,
        FF: Future<Output = anyhow::Result<T>>,
    {
        let err = match tokio::time::timeout(self.timeout, precise).await {
            Ok(Ok(data)) => return Aggregated::with_source(data, Source::Precise),
            Ok(Err(e)) => e,
            Err(_) => StoreError::Timeout.into(),
        };

        if StoreError::is_not_configured(&err) {
            warn!(what, "Aggregation requested without a durable store");
            return Aggregated::degraded("No durable store configured");
        }
        if !StoreError::allows_fallback(&err) {
            error!(what, error = %err, "Aggregation query failed");
            return Aggregated::degraded("Statistics temporarily unavailable");
        }

        warn!(what, error = %err, "Precise aggregation failed, falling back to recent-event scan");
        match fallback().await {
            Ok(data) => Aggregated {
                data,
                source: Source::Fallback,
                warning: Some(FALLBACK_WARNING.to_string()),
                error: None,
            },
            Err(e) => {
                error!(what, error = %e, "Fallback scan failed");
                Aggregated::degraded("Statistics temporarily unavailable")
            }
        }
    }
}
