use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: String,
    pub store: StoreMode,
    pub duckdb_memory_limit: String,
    /// Mixed into every IP digest so hashes are not portable across installs.
    pub ip_salt: String,
    pub rate_limit_max: i64,
    pub rate_limit_window_secs: i64,
    pub rate_limit_disable: bool,
    pub dedup_window_secs: i64,
    pub stats_cache_ttl_secs: u64,
    pub stats_timeout_ms: u64,
    pub monitor_capacity: usize,
    /// Dashboard shared secret. `None` disables `/api/auth`.
    pub auth_token: Option<String>,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreMode {
    DuckDb,
    /// No durable store: tracking calls are accepted and only logged.
    None,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            port: std::env::var("QUIZTRACK_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            data_dir: std::env::var("QUIZTRACK_DATA_DIR")
                .unwrap_or_else(|_| "./data".to_string()),
            store: {
                let raw = std::env::var("QUIZTRACK_STORE")
                    .unwrap_or_else(|_| "duckdb".to_string());
                match raw.as_str() {
                    "none" => StoreMode::None,
                    "duckdb" => StoreMode::DuckDb,
                    other => return Err(format!("invalid QUIZTRACK_STORE: {other}")),
                }
            },
            duckdb_memory_limit: std::env::var("QUIZTRACK_DUCKDB_MEMORY")
                .unwrap_or_else(|_| "1GB".to_string()),
            ip_salt: std::env::var("QUIZTRACK_IP_SALT").unwrap_or_default(),
            rate_limit_max: std::env::var("QUIZTRACK_RATE_LIMIT_MAX")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            rate_limit_window_secs: 60,
            rate_limit_disable: std::env::var("QUIZTRACK_RATE_LIMIT_DISABLE")
                .map(|v| v == "true")
                .unwrap_or(false),
            dedup_window_secs: 60,
            stats_cache_ttl_secs: std::env::var("QUIZTRACK_STATS_CACHE_TTL_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            stats_timeout_ms: std::env::var("QUIZTRACK_STATS_TIMEOUT_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .unwrap_or(5000),
            monitor_capacity: std::env::var("QUIZTRACK_MONITOR_CAPACITY")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .unwrap_or(50),
            auth_token: std::env::var("AUTH_TOKEN").ok().filter(|t| !t.is_empty()),
            cors_origins: std::env::var("QUIZTRACK_CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    pub fn stats_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.stats_cache_ttl_secs)
    }

    pub fn stats_timeout(&self) -> Duration {
        Duration::from_millis(self.stats_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            data_dir: "./data".to_string(),
            store: StoreMode::DuckDb,
            duckdb_memory_limit: "1GB".to_string(),
            ip_salt: String::new(),
            rate_limit_max: 10,
            rate_limit_window_secs: 60,
            rate_limit_disable: false,
            dedup_window_secs: 60,
            stats_cache_ttl_secs: 10,
            stats_timeout_ms: 5000,
            monitor_capacity: 50,
            auth_token: None,
            cors_origins: Vec::new(),
        }
    }
}
