//! ETL Runtime - Fleet analytics service daemon
//!
//! Opens the SQLite stores, bootstraps the schema, and runs the ETL
//! scheduler until interrupted.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin etl_runtime
//! ```
//!
//! ## Environment Variables
//!
//! - GRIDFLOW_DB_PATH - SQLite database path (default: data/gridflow.db)
//! - ETL_INTERVAL_SECS - Scheduler cadence in seconds (default: 300)
//! - ETL_WINDOW_MINUTES - Trailing window per tick (default: 5)
//! - SAMPLE_INTERVAL_SECS - Assumed fleet sampling cadence (default: 60)
//! - RUST_LOG - Logging level (optional, default: info)

use gridflow::config::Config;
use gridflow::engine::{etl_scheduler_task, MemoryResultCache, SchedulerConfig, Services};
use gridflow::store::sqlite::{
    open_database, SqliteAnalyticsStore, SqliteMetadataStore, SqliteTelemetryStore,
    SqliteTransactionStore,
};
use std::sync::Arc;
use tokio::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv::dotenv().ok();

    // Logs go to stderr so stdout stays clean for tooling
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = Config::from_env();

    log::info!("🚀 Starting gridflow ETL runtime...");
    log::info!("📊 Configuration:");
    log::info!("   DB path: {}", config.db_path);
    log::info!("   Cadence: {}s", config.etl_interval_secs);
    log::info!("   Trailing window: {}m", config.etl_window_minutes);
    log::info!("   Sample interval: {}s", config.sample_interval_secs);

    if let Some(parent) = std::path::Path::new(&config.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let conn = open_database(&config.db_path)?;

    // All handles constructed once and shared by reference from here on
    let services = Arc::new(Services::new(
        Arc::new(SqliteTelemetryStore::new(conn.clone())),
        Arc::new(SqliteTransactionStore::new(conn.clone())),
        Arc::new(SqliteMetadataStore::new(conn.clone())),
        Arc::new(SqliteAnalyticsStore::new(conn)),
        Arc::new(MemoryResultCache::new()),
        config.sample_interval_secs,
    ));

    let scheduler_config = SchedulerConfig {
        cadence: Duration::from_secs(config.etl_interval_secs),
        window_minutes: config.etl_window_minutes,
    };
    let scheduler_services = Arc::clone(&services);
    let scheduler = tokio::spawn(async move {
        etl_scheduler_task(scheduler_services, scheduler_config).await;
    });

    tokio::signal::ctrl_c().await?;
    log::info!("👋 Shutdown requested, stopping scheduler");
    scheduler.abort();

    Ok(())
}
