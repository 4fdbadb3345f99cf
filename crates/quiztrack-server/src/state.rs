use std::sync::Arc;

use quiztrack_core::{analytics::AnalyticsBackend, config::Config};
use quiztrack_duckdb::DuckDbBackend;

use crate::{engine::AggregationEngine, monitor::EventMonitor, recorder::EventRecorder};

/// Shared application state injected into every Axum handler via
/// [`axum::extract::State`].
pub struct AppState {
    /// Durable store, or `NullBackend` when running log-only.
    pub analytics: Arc<dyn AnalyticsBackend>,

    /// Parsed configuration, loaded once at startup from environment variables.
    pub config: Arc<Config>,

    /// Recent tracking calls for `GET /api/monitor`.
    pub monitor: EventMonitor,

    /// Aggregation with timeout, fallback and result cache.
    pub engine: AggregationEngine,
}

impl AppState {
    /// Construct a new `AppState` wrapping the DuckDB backend and config.
    pub fn new(db: DuckDbBackend, config: Config) -> Self {
        Self::with_backend(Arc::new(db), config)
    }

    pub fn with_backend(analytics: Arc<dyn AnalyticsBackend>, config: Config) -> Self {
        let engine = AggregationEngine::new(Arc::clone(&analytics), &config);
        Self {
            monitor: EventMonitor::new(config.monitor_capacity),
            analytics,
            config: Arc::new(config),
            engine,
        }
    }

    pub fn recorder(&self) -> EventRecorder<'_> {
        EventRecorder::new(self.analytics.as_ref(), &self.config)
    }
}
