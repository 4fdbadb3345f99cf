use thiserror::Error;

/// Failures a tracking call can surface to the client.
///
/// Everything else on the tracking path (store outages, write failures) is
/// converted into a soft outcome and never reaches this type.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackError {
    #[error("{0}")]
    Validation(String),

    #[error("rate limit exceeded")]
    RateLimited { retry_after_seconds: u64 },
}

/// Failures raised by an [`AnalyticsBackend`](crate::analytics::AnalyticsBackend).
///
/// Backends return `anyhow::Result`; callers recover the category with
/// `err.downcast_ref::<StoreError>()`. Errors that do not downcast are
/// treated as [`StoreError::Unavailable`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("durable store not configured")]
    NotConfigured,

    #[error("durable store unavailable: {0}")]
    Unavailable(String),

    #[error("store query timed out")]
    Timeout,

    #[error("unsupported query: {0}")]
    Unsupported(String),
}

impl StoreError {
    /// `true` when the aggregation engine should retry with the coarse scan.
    pub fn allows_fallback(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::Timeout) | Some(StoreError::Unsupported(_))
        )
    }

    pub fn is_not_configured(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<StoreError>(), Some(StoreError::NotConfigured))
    }
}
