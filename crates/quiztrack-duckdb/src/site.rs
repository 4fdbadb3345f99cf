use anyhow::Result;

use quiztrack_core::event::Site;

use crate::DuckDbBackend;

/// Generate a site ID: "site_" + 10 random alphanumeric chars.
fn generate_site_id() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let chars: String = (0..10)
        .map(|_| {
            let idx = rng.gen_range(0..36u8);
            if idx < 10 {
                (b'0' + idx) as char
            } else {
                (b'a' + idx - 10) as char
            }
        })
        .collect();
    format!("site_{}", chars)
}

impl DuckDbBackend {
    /// Return the site for `domain`, creating it on first sight.
    ///
    /// `domain` must already be normalized. The insert relies on the UNIQUE
    /// constraint (`ON CONFLICT (domain) DO NOTHING`), never on a prior read,
    /// so racing first writers all read back the same winning row.
    pub async fn upsert_site(&self, domain: &str) -> Result<Site> {
        let conn = self.conn.lock().await;
        let inserted = conn.execute(
            "INSERT INTO sites (id, domain, created_at) VALUES (?1, ?2, CURRENT_TIMESTAMP) \
             ON CONFLICT (domain) DO NOTHING",
            duckdb::params![generate_site_id(), domain],
        )?;
        let id: String = conn
            .prepare("SELECT id FROM sites WHERE domain = ?1")?
            .query_row(duckdb::params![domain], |row| row.get(0))?;
        if inserted > 0 {
            tracing::info!(domain, site_id = %id, "New site onboarded");
        }
        Ok(Site {
            id,
            domain: domain.to_string(),
        })
    }

    /// All onboarded domains, sorted.
    pub async fn list_site_domains(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT domain FROM sites ORDER BY domain")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut domains = Vec::new();
        for row in rows {
            domains.push(row?);
        }
        Ok(domains)
    }
}
