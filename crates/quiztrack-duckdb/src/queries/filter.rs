use duckdb::types::ToSql;

use quiztrack_core::analytics::StatsFilter;

use crate::backend::ts_param;

/// WHERE clause plus positional parameters shared by every aggregation query.
///
/// Queries alias `events` as `e` and `sites` as `s`. Parameters `?1`/`?2`
/// are always the inclusive window bounds.
pub(crate) struct FilterSql {
    pub sql: String,
    pub params: Vec<Box<dyn ToSql>>,
}

impl FilterSql {
    pub fn build(filter: &StatsFilter, quiz_id: Option<&str>) -> Self {
        let mut sql = String::from("e.created_at >= ?1 AND e.created_at <= ?2");
        let mut params: Vec<Box<dyn ToSql>> = vec![
            Box::new(ts_param(filter.start)),
            Box::new(ts_param(filter.end)),
        ];

        if let Some(ref site) = filter.site {
            params.push(Box::new(site.clone()));
            sql.push_str(&format!(" AND s.domain = ?{}", params.len()));
        }
        if let Some(ref campaign) = filter.campaign {
            params.push(Box::new(campaign.clone()));
            sql.push_str(&format!(" AND e.utm_campaign = ?{}", params.len()));
        }
        if let Some(quiz_id) = quiz_id {
            params.push(Box::new(quiz_id.to_string()));
            sql.push_str(&format!(" AND e.quiz_id = ?{}", params.len()));
        }

        Self { sql, params }
    }

    pub fn param_refs(&self) -> Vec<&dyn ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }
}
