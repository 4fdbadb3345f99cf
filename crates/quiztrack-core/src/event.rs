use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TrackError;

/// Longest accepted `quizId`, `utm_campaign` or `session_id`.
pub const MAX_FIELD_LEN: usize = 256;

/// The two funnel steps a quiz page reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    View,
    Complete,
}

impl EventKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "view" => Some(Self::View),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Complete => "complete",
        }
    }
}

/// The payload the quiz page sends to `POST /api/track`.
///
/// Every field is optional at the serde layer so a missing field surfaces as
/// a validation message rather than a generic deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackPayload {
    pub event: Option<String>,
    #[serde(rename = "quizId", alias = "quiz_id")]
    pub quiz_id: Option<String>,
    pub site: Option<String>,
    #[serde(alias = "utmCampaign")]
    pub utm_campaign: Option<String>,
    #[serde(alias = "sessionId")]
    pub session_id: Option<String>,
}

/// A payload that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidTrack {
    pub kind: EventKind,
    pub quiz_id: String,
    pub site: Option<String>,
    pub utm_campaign: Option<String>,
    pub session_id: Option<String>,
}

impl TrackPayload {
    pub fn validate(self) -> Result<ValidTrack, TrackError> {
        let event = non_empty(self.event);
        let quiz_id = non_empty(self.quiz_id);
        let (Some(event), Some(quiz_id)) = (event, quiz_id) else {
            return Err(TrackError::Validation(
                "Missing event or quizId".to_string(),
            ));
        };

        let kind = EventKind::parse(&event)
            .ok_or_else(|| TrackError::Validation("Invalid event type".to_string()))?;

        if quiz_id.len() > MAX_FIELD_LEN {
            return Err(TrackError::Validation(format!(
                "quizId exceeds {MAX_FIELD_LEN} characters"
            )));
        }

        let utm_campaign = non_empty(self.utm_campaign).filter(|c| c != "null");
        let session_id = non_empty(self.session_id);
        for (name, value) in [("utm_campaign", &utm_campaign), ("session_id", &session_id)] {
            if value.as_ref().is_some_and(|v| v.len() > MAX_FIELD_LEN) {
                return Err(TrackError::Validation(format!(
                    "{name} exceeds {MAX_FIELD_LEN} characters"
                )));
            }
        }

        Ok(ValidTrack {
            kind,
            quiz_id,
            site: non_empty(self.site),
            utm_campaign,
            session_id,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// A tenant, keyed by its normalized hostname.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub domain: String,
}

/// The stored event. Mirrors the `events` table columns exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub quiz_id: String,
    pub event_kind: EventKind,
    pub site_id: String,
    pub utm_campaign: Option<String>,
    pub session_id: Option<String>,
    /// Truncated SHA-256 of salt + client IP. The raw IP is never stored.
    pub ip_hash: String,
    pub created_at: DateTime<Utc>,
}

/// What happened to an accepted tracking call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SaveStatus {
    Stored,
    DuplicateSkipped,
    /// No durable store is configured; the event only reached the log.
    Logged,
    /// The store rejected the write.
    Error,
}

impl SaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stored => "stored",
            Self::DuplicateSkipped => "duplicate-skipped",
            Self::Logged => "logged",
            Self::Error => "error",
        }
    }
}
