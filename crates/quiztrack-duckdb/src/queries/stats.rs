use anyhow::Result;
use duckdb::Connection;

use quiztrack_core::analytics::{AggregateRow, Granularity, StatsFilter, StatsResult};

use crate::queries::filter::FilterSql;
use crate::DuckDbBackend;

/// Bucket label expression. Must render exactly what `bucket_key` renders so
/// fallback and precise results are interchangeable.
fn bucket_expr(granularity: Granularity) -> &'static str {
    match granularity {
        Granularity::Hour => "strftime(date_trunc('hour', e.created_at), '%Y-%m-%dT%H:00:00Z')",
        Granularity::Day => "strftime(date_trunc('day', e.created_at), '%Y-%m-%d')",
        Granularity::Week => "strftime(date_trunc('week', e.created_at), '%Y-%m-%d')",
    }
}

/// Grouped (bucket, site, quiz) and per-(site, quiz) totals under one lock,
/// so both halves see the same snapshot.
pub async fn get_stats_inner(db: &DuckDbBackend, filter: &StatsFilter) -> Result<StatsResult> {
    let filter = filter.clone();
    db.run_query(move |conn| {
        let where_clause = FilterSql::build(&filter, None);
        let bucketed = query_bucketed(conn, &where_clause, filter.granularity)?;
        let totals = query_totals(conn, &where_clause)?;
        Ok(StatsResult { bucketed, totals })
    })
    .await
}

fn query_bucketed(
    conn: &Connection,
    where_clause: &FilterSql,
    granularity: Granularity,
) -> Result<Vec<AggregateRow>> {
    let bucket = bucket_expr(granularity);
    let sql = format!(
        r#"
        SELECT
            {bucket} AS bucket,
            s.domain,
            e.quiz_id,
            COUNT(*) FILTER (WHERE e.event_kind = 'view') AS views,
            COUNT(*) FILTER (WHERE e.event_kind = 'complete') AS completes
        FROM events e
        JOIN sites s ON s.id = e.site_id
        WHERE {where_sql}
        GROUP BY bucket, s.domain, e.quiz_id
        ORDER BY bucket, s.domain, e.quiz_id
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
            row.get::<_, i64>(3)?,
            row.get::<_, i64>(4)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (bucket, site, quiz_id, views, completes) = row?;
        out.push(AggregateRow::new(Some(bucket), site, quiz_id, views, completes));
    }
    Ok(out)
}

fn query_totals(conn: &Connection, where_clause: &FilterSql) -> Result<Vec<AggregateRow>> {
    let sql = format!(
        r#"
        SELECT
            s.domain,
            e.quiz_id,
            COUNT(*) FILTER (WHERE e.event_kind = 'view') AS views,
            COUNT(*) FILTER (WHERE e.event_kind = 'complete') AS completes
        FROM events e
        JOIN sites s ON s.id = e.site_id
        WHERE {where_sql}
        GROUP BY s.domain, e.quiz_id
        ORDER BY views DESC, s.domain, e.quiz_id
        "#,
        where_sql = where_clause.sql,
    );

    let params = where_clause.param_refs();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params.as_slice(), |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, i64>(3)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (site, quiz_id, views, completes) = row?;
        out.push(AggregateRow::new(None, site, quiz_id, views, completes));
    }
    Ok(out)
}
