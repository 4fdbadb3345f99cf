use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::{Connection, InterruptHandle};
use tokio::sync::Mutex;
use tracing::{info, warn};

use quiztrack_core::{error::StoreError, event::Event};

use crate::schema::init_sql;

/// Storage format for every TIMESTAMP parameter (naive UTC).
const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

pub(crate) fn ts_param(ts: DateTime<Utc>) -> String {
    ts.format(TS_FORMAT).to_string()
}

/// Parse `CAST(ts AS VARCHAR)` output back into UTC.
pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|t| t.and_utc())
        .with_context(|| format!("unparseable timestamp from store: {raw}"))
}

/// Map DuckDB failures onto the categories the aggregation engine acts on.
///
/// Binder and catalog errors (a function or column the store does not
/// have) become [`StoreError::Unsupported`]; an interrupted statement
/// becomes [`StoreError::Timeout`]. Anything else passes through untouched.
pub(crate) fn classify_query_error(err: anyhow::Error) -> anyhow::Error {
    if err.downcast_ref::<StoreError>().is_some() {
        return err;
    }
    let msg = format!("{err:#}");
    if msg.contains("INTERRUPT") || msg.to_ascii_lowercase().contains("interrupted") {
        return StoreError::Timeout.into();
    }
    if msg.contains("No function matches")
        || msg.contains("Catalog Error")
        || msg.contains("Binder Error")
    {
        return StoreError::Unsupported(msg).into();
    }
    err
}

/// Interrupts the statement running on a connection unless disarmed.
struct InterruptOnDrop(Option<Arc<InterruptHandle>>);

impl InterruptOnDrop {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            warn!("Interrupting abandoned DuckDB query");
            handle.interrupt();
        }
    }
}

/// A DuckDB backend for quiztrack.
///
/// DuckDB is single-writer: the connection lives behind `Arc<Mutex<_>>` so
/// every handler serialises through one connection while the struct stays
/// cheap to share across Axum handlers. Each trait call holds the lock for
/// a single round trip.
pub struct DuckDbBackend {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl DuckDbBackend {
    /// Open (or create) a DuckDB database file at `path`.
    ///
    /// `memory_limit` is a DuckDB size string such as `"1GB"` or `"512MB"`.
    pub fn open(path: &str, memory_limit: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(&init_sql(memory_limit))?;
        info!(
            "DuckDB opened at {} with memory_limit={}, threads=2",
            path, memory_limit
        );
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an **in-memory** DuckDB database.
    ///
    /// Intended for tests only; data is discarded when the struct is dropped.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(&init_sql("1GB"))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` on the blocking pool while holding the connection lock.
    ///
    /// The calling task stays free while DuckDB works, so a caller-side
    /// `tokio::time::timeout` fires on time. Dropping the returned future
    /// before `f` finishes interrupts the running statement and the lock is
    /// released shortly after. Errors go through [`classify_query_error`].
    pub(crate) async fn run_query<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn).lock_owned().await;
        let interrupt = InterruptOnDrop(Some(conn.interrupt_handle()));
        let joined = tokio::task::spawn_blocking(move || f(&conn)).await;
        interrupt.disarm();
        joined
            .map_err(|e| anyhow!("query task failed: {e}"))?
            .map_err(classify_query_error)
    }

    /// Append one event. `site_id` must already exist.
    pub async fn insert_event(&self, event: &Event) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO events (
                id, quiz_id, event_kind, site_id,
                utm_campaign, session_id, ip_hash, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            duckdb::params![
                event.id,
                event.quiz_id,
                event.event_kind.as_str(),
                event.site_id,
                event.utm_campaign,
                event.session_id,
                event.ip_hash,
                ts_param(event.created_at),
            ],
        )?;
        tracing::debug!(quiz_id = %event.quiz_id, kind = event.event_kind.as_str(), "Event inserted");
        Ok(())
    }

    pub async fn count_events(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        let count: i64 = conn
            .prepare("SELECT COUNT(*) FROM events")?
            .query_row([], |row| row.get(0))?;
        Ok(count)
    }

    /// Execute `SELECT 1` as a lightweight liveness check.
    pub async fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch("SELECT 1")?;
        Ok(())
    }

    /// Acquire the DuckDB connection lock for direct queries.
    ///
    /// Intended for integration tests that need to verify stored data.
    /// Production code should use the typed methods.
    pub async fn conn_for_test(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamp_param_round_trips_through_store_format() {
        let ts = Utc
            .with_ymd_and_hms(2026, 10, 17, 9, 30, 5)
            .single()
            .expect("valid ts");
        assert_eq!(ts_param(ts), "2026-10-17 09:30:05.000000");
        assert_eq!(parse_ts("2026-10-17 09:30:05").expect("parse"), ts);
        assert_eq!(parse_ts(&ts_param(ts)).expect("parse"), ts);
    }

    #[test]
    fn missing_function_is_classified_unsupported() {
        let conn = Connection::open_in_memory().expect("db");
        let err = conn
            .prepare("SELECT quiz_no_such_function(1)")
            .map(|_| ())
            .map_err(anyhow::Error::from)
            .expect_err("unknown function must fail");
        let err = classify_query_error(err);
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::Unsupported(_))
        ));
        assert!(StoreError::allows_fallback(&err));
    }

    #[test]
    fn interrupted_statement_is_classified_timeout() {
        let err = classify_query_error(anyhow!("INTERRUPT Error: Interrupted!"));
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::Timeout)
        ));
    }

    #[test]
    fn other_errors_pass_through() {
        let err = classify_query_error(anyhow!("Constraint Error: duplicate key"));
        assert!(err.downcast_ref::<StoreError>().is_none());
        assert!(!StoreError::allows_fallback(&err));
    }
}
