use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use quiztrack_core::{
    analytics::AnalyticsBackend,
    config::{Config, StoreMode},
    null::NullBackend,
};
use quiztrack_duckdb::DuckDbBackend;
use quiztrack_server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Structured JSON logging. Level controlled via RUST_LOG env var.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("quiztrack=info".parse()?),
        )
        .json()
        .init();

    let cfg = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    let backend: Arc<dyn AnalyticsBackend> = match cfg.store {
        StoreMode::DuckDb => {
            std::fs::create_dir_all(&cfg.data_dir)?;
            let db_path = format!("{}/quiztrack.db", cfg.data_dir);
            Arc::new(DuckDbBackend::open(&db_path, &cfg.duckdb_memory_limit)?)
        }
        StoreMode::None => {
            tracing::warn!(
                "QUIZTRACK_STORE=none: tracking calls are logged only and stats stay empty"
            );
            Arc::new(NullBackend)
        }
    };

    if cfg.ip_salt.is_empty() {
        tracing::warn!("QUIZTRACK_IP_SALT is empty; IP hashes are unsalted");
    }
    if cfg.auth_token.is_none() {
        info!("AUTH_TOKEN not set; dashboard login disabled");
    }

    let addr = format!("0.0.0.0:{}", cfg.port);
    let state = Arc::new(AppState::with_backend(backend, cfg.clone()));
    let app = quiztrack_server::app::build_app(state);

    info!(port = cfg.port, store = ?cfg.store, "quiztrack listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        tokio::signal::ctrl_c().await.ok();
    })
    .await?;

    Ok(())
}
