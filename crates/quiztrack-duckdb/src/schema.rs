/// DuckDB initialization SQL.
///
/// Executed once at database open time via `Connection::execute_batch`.
/// All statements use `IF NOT EXISTS` so they are safe to re-run on every
/// startup.
///
/// `memory_limit` comes from `Config.duckdb_memory_limit`
/// (env `QUIZTRACK_DUCKDB_MEMORY`, default `"1GB"`). Always set an explicit
/// limit: the DuckDB default (80% of system RAM) is not acceptable for a
/// server process.
///
/// All timestamps are naive UTC.
pub fn init_sql(memory_limit: &str) -> String {
    format!(
        r#"SET memory_limit = '{memory_limit}';
SET threads = 2;

-- ===========================================
-- SITES (one row per normalized domain)
-- ===========================================
-- Rows are created by upsert on the first event from a new domain and never
-- updated. The UNIQUE constraint on domain is what makes
-- `INSERT ... ON CONFLICT (domain) DO NOTHING` converge under concurrent
-- first writers.
CREATE TABLE IF NOT EXISTS sites (
    id              VARCHAR PRIMARY KEY,           -- 'site_' + 10 random [0-9a-z]
    domain          VARCHAR NOT NULL UNIQUE,       -- normalized hostname or 'unknown'
    created_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

-- ===========================================
-- EVENTS (append-only tracking log)
-- ===========================================
CREATE TABLE IF NOT EXISTS events (
    id              VARCHAR PRIMARY KEY,           -- UUID v4
    quiz_id         VARCHAR NOT NULL,
    event_kind      VARCHAR NOT NULL CHECK (event_kind IN ('view', 'complete')),
    site_id         VARCHAR NOT NULL REFERENCES sites(id),
    utm_campaign    VARCHAR,
    session_id      VARCHAR,                       -- client-supplied, nullable
    ip_hash         VARCHAR(16) NOT NULL,          -- sha256(salt + ip)[0:8] hex
    created_at      TIMESTAMP NOT NULL             -- server-assigned
);

-- Rate limit: events per ip_hash in the trailing window
CREATE INDEX IF NOT EXISTS idx_events_ip_time
    ON events(ip_hash, created_at);

-- Duplicate suppression lookup
CREATE INDEX IF NOT EXISTS idx_events_dedup
    ON events(session_id, quiz_id, event_kind, created_at);

-- Primary aggregation pattern: site + quiz + date range
CREATE INDEX IF NOT EXISTS idx_events_site_quiz_time
    ON events(site_id, quiz_id, created_at);

-- Campaign breakdown for one quiz
CREATE INDEX IF NOT EXISTS idx_events_quiz_time
    ON events(quiz_id, created_at);
"#
    )
}
