use chrono::{DateTime, Duration, Utc};
use tracing::{error, info, warn};

use quiztrack_core::{
    analytics::AnalyticsBackend,
    config::Config,
    error::TrackError,
    event::{Event, SaveStatus, ValidTrack},
    identity::{hash_ip, normalize_domain},
};

/// What the recorder did with an accepted tracking call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackOutcome {
    pub saved: SaveStatus,
    /// Normalized domain the event was attributed to.
    pub site: String,
    pub error: Option<String>,
}

impl TrackOutcome {
    fn new(saved: SaveStatus, site: String) -> Self {
        Self {
            saved,
            site,
            error: None,
        }
    }
}

/// Validates-then-persists tracking calls behind the abuse guard.
///
/// Order: IP hash → rate limit → duplicate suppression → site resolution →
/// insert. Only validation and rate limiting surface as errors; store
/// failures become `saved: "error"`.
pub struct EventRecorder<'a> {
    backend: &'a dyn AnalyticsBackend,
    config: &'a Config,
}

impl<'a> EventRecorder<'a> {
    pub fn new(backend: &'a dyn AnalyticsBackend, config: &'a Config) -> Self {
        Self { backend, config }
    }

    pub async fn record(
        &self,
        track: ValidTrack,
        domain_hint: &str,
        client_ip: &str,
    ) -> Result<TrackOutcome, TrackError> {
        self.record_at(track, domain_hint, client_ip, Utc::now()).await
    }

    /// [`record`](Self::record) with an explicit clock.
    pub async fn record_at(
        &self,
        track: ValidTrack,
        domain_hint: &str,
        client_ip: &str,
        now: DateTime<Utc>,
    ) -> Result<TrackOutcome, TrackError> {
        let domain = normalize_domain(domain_hint);

        if !self.backend.is_configured() {
            info!(
                event = track.kind.as_str(),
                quiz_id = %track.quiz_id,
                site = %domain,
                "Event logged (no durable store)"
            );
            return Ok(TrackOutcome::new(SaveStatus::Logged, domain));
        }

        let ip_hash = hash_ip(&self.config.ip_salt, client_ip);
        let guard = AbuseGuard::new(self.backend, self.config);

        guard.check_rate_limit(&ip_hash, now).await?;
        if guard.is_duplicate(&track, now).await {
            info!(
                quiz_id = %track.quiz_id,
                event = track.kind.as_str(),
                "Duplicate event skipped"
            );
            return Ok(TrackOutcome::new(SaveStatus::DuplicateSkipped, domain));
        }

        let site = match self.backend.upsert_site(&domain).await {
            Ok(site) => site,
            Err(e) => {
                error!(error = %e, site = %domain, "Site resolution failed");
                return Ok(TrackOutcome {
                    saved: SaveStatus::Error,
                    site: domain,
                    error: Some(e.to_string()),
                });
            }
        };

        let event = Event {
            id: uuid::Uuid::new_v4().to_string(),
            quiz_id: track.quiz_id,
            event_kind: track.kind,
            site_id: site.id,
            utm_campaign: track.utm_campaign,
            session_id: track.session_id,
            ip_hash,
            created_at: now,
        };

        match self.backend.insert_event(&event).await {
            Ok(()) => {
                info!(
                    event = event.event_kind.as_str(),
                    quiz_id = %event.quiz_id,
                    site = %site.domain,
                    "Event stored"
                );
                Ok(TrackOutcome::new(SaveStatus::Stored, site.domain))
            }
            Err(e) => {
                error!(error = %e, quiz_id = %event.quiz_id, "Event insert failed");
                Ok(TrackOutcome {
                    saved: SaveStatus::Error,
                    site: site.domain,
                    error: Some(e.to_string()),
                })
            }
        }
    }
}

/// Per-IP sliding-window rate limit and per-session duplicate suppression.
///
/// Both checks read the event log and decide; no lock is held across
/// requests. A store error while checking lets the event through.
pub struct AbuseGuard<'a> {
    backend: &'a dyn AnalyticsBackend,
    config: &'a Config,
}

impl<'a> AbuseGuard<'a> {
    pub fn new(backend: &'a dyn AnalyticsBackend, config: &'a Config) -> Self {
        Self { backend, config }
    }

    /// Rejects when `ip_hash` already has `rate_limit_max` events in the
    /// trailing window.
    pub async fn check_rate_limit(
        &self,
        ip_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), TrackError> {
        if self.config.rate_limit_disable {
            return Ok(());
        }
        let window = self.config.rate_limit_window_secs;
        let since = now - Duration::seconds(window);
        match self.backend.count_recent_by_ip(ip_hash, since).await {
            Ok(count) if count >= self.config.rate_limit_max => {
                warn!(ip_hash, count, "Rate limit exceeded");
                Err(TrackError::RateLimited {
                    retry_after_seconds: window.max(1) as u64,
                })
            }
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Rate limit check failed, allowing event");
                Ok(())
            }
        }
    }

    /// Whether the same `(session_id, quiz_id, kind)` was recorded inside the
    /// dedup window. Calls without a session are never duplicates.
    pub async fn is_duplicate(&self, track: &ValidTrack, now: DateTime<Utc>) -> bool {
        let Some(session_id) = track.session_id.as_deref() else {
            return false;
        };
        let since = now - Duration::seconds(self.config.dedup_window_secs);
        match self
            .backend
            .duplicate_exists(session_id, &track.quiz_id, track.kind, since)
            .await
        {
            Ok(exists) => exists,
            Err(e) => {
                warn!(error = %e, "Duplicate check failed, allowing event");
                false
            }
        }
    }
}
