use anyhow::Result;
use chrono::{DateTime, Utc};

use quiztrack_core::event::EventKind;

use crate::backend::ts_param;
use crate::DuckDbBackend;

impl DuckDbBackend {
    /// Count events recorded for `ip_hash` at or after `since`.
    ///
    /// Read-then-decide with no lock held across requests: two concurrent
    /// requests at the boundary may both pass.
    pub async fn count_recent_by_ip(&self, ip_hash: &str, since: DateTime<Utc>) -> Result<i64> {
        let conn = self.conn.lock().await;
        let count: i64 = conn
            .prepare("SELECT COUNT(*) FROM events WHERE ip_hash = ?1 AND created_at >= ?2")?
            .query_row(duckdb::params![ip_hash, ts_param(since)], |row| row.get(0))?;
        Ok(count)
    }

    /// Whether `(session_id, quiz_id, kind)` was recorded at or after `since`.
    pub async fn duplicate_exists(
        &self,
        session_id: &str,
        quiz_id: &str,
        kind: EventKind,
        since: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn.lock().await;
        let count: i64 = conn
            .prepare(
                "SELECT COUNT(*) FROM events \
                 WHERE session_id = ?1 AND quiz_id = ?2 AND event_kind = ?3 \
                 AND created_at >= ?4",
            )?
            .query_row(
                duckdb::params![session_id, quiz_id, kind.as_str(), ts_param(since)],
                |row| row.get(0),
            )?;
        Ok(count > 0)
    }
}
