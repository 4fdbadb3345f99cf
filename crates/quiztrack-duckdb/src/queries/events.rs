use anyhow::{anyhow, Result};
use duckdb::Connection;

use quiztrack_core::analytics::{EventRow, StatsFilter};
use quiztrack_core::event::EventKind;

use crate::backend::parse_ts;
use crate::queries::filter::FilterSql;
use crate::DuckDbBackend;

/// The `limit` most recent raw events matching the filter, newest first.
///
/// Used by the aggregation fallback when the grouped query is too slow or
/// unavailable; callers aggregate the rows in-process.
pub async fn scan_events_inner(
    db: &DuckDbBackend,
    quiz_id: Option<&str>,
    filter: &StatsFilter,
    limit: usize,
) -> Result<Vec<EventRow>> {
    let quiz_id = quiz_id.map(str::to_string);
    let filter = filter.clone();
    db.run_query(move |conn| query_recent(conn, quiz_id.as_deref(), &filter, limit))
        .await
}

fn query_recent(
    conn: &Connection,
    quiz_id: Option<&str>,
    filter: &StatsFilter,
    limit: usize,
) -> Result<Vec<EventRow>> {
    let where_clause = FilterSql::build(filter, quiz_id);

    let sql = format!(
        r#"
        SELECT
            s.domain,
            e.quiz_id,
            e.event_kind,
            e.utm_campaign,
            CAST(e.created_at AS VARCHAR)
        FROM events e
        JOIN sites s ON s.id = e.site_id
        WHERE {where_sql}
        ORDER BY e.created_at DESC
        LIMIT {limit}
        "#,
        where_sql = where_clause.sql,
    );

    let params = where_clause.param_refs();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params.as_slice(), |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (site, quiz_id, kind, utm_campaign, created_at) = row?;
        let kind = EventKind::parse(&kind)
            .ok_or_else(|| anyhow!("unknown event_kind in store: {kind}"))?;
        out.push(EventRow {
            site,
            quiz_id,
            kind,
            utm_campaign,
            created_at: parse_ts(&created_at)?,
        });
    }
    Ok(out)
}
