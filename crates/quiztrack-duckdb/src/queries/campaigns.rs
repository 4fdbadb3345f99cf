use anyhow::Result;
use duckdb::{types::ToSql, Connection};

use quiztrack_core::analytics::{CampaignRow, StatsFilter, NO_CAMPAIGN};

use crate::queries::filter::FilterSql;
use crate::DuckDbBackend;

/// Views/completes per campaign for one quiz. Events without a campaign are
/// grouped under `(none)`.
pub async fn get_campaign_stats_inner(
    db: &DuckDbBackend,
    quiz_id: &str,
    filter: &StatsFilter,
) -> Result<Vec<CampaignRow>> {
    let quiz_id = quiz_id.to_string();
    let filter = filter.clone();
    db.run_query(move |conn| query_campaigns(conn, &quiz_id, &filter))
        .await
}

fn query_campaigns(
    conn: &Connection,
    quiz_id: &str,
    filter: &StatsFilter,
) -> Result<Vec<CampaignRow>> {
    let mut where_clause = FilterSql::build(filter, Some(quiz_id));
    where_clause.params.push(Box::new(NO_CAMPAIGN.to_string()));
    let none_idx = where_clause.params.len();

    let sql = format!(
        r#"
        SELECT
            COALESCE(e.utm_campaign, ?{none_idx}) AS campaign,
            COUNT(*) FILTER (WHERE e.event_kind = 'view') AS views,
            COUNT(*) FILTER (WHERE e.event_kind = 'complete') AS completes
        FROM events e
        JOIN sites s ON s.id = e.site_id
        WHERE {where_sql}
        GROUP BY campaign
        ORDER BY views DESC, campaign
        "#,
        where_sql = where_clause.sql,
    );

    let params: Vec<&dyn ToSql> = where_clause.param_refs();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params.as_slice(), |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (campaign, views, completes) = row?;
        out.push(CampaignRow::new(campaign, views, completes));
    }
    Ok(out)
}
