//! ETL Trigger - Manual fleet or node recomputation
//!
//! Runs one ETL pass and prints the persisted aggregate to stdout.
//!
//! ## Usage
//!
//! ```bash
//! # Fleet-wide trailing window (default 5 minutes)
//! cargo run --bin etl_trigger
//! cargo run --bin etl_trigger -- --window 15
//!
//! # Single node, explicit RFC 3339 bounds (backfills a historical gap)
//! cargo run --bin etl_trigger -- --node n42 \
//!     --start 2026-08-01T00:00:00Z --end 2026-08-01T06:00:00Z
//! ```
//!
//! ## Environment Variables
//!
//! - GRIDFLOW_DB_PATH - SQLite database path (default: data/gridflow.db)
//! - SAMPLE_INTERVAL_SECS - Assumed fleet sampling cadence (default: 60)
//! - RUST_LOG - Logging level (optional, default: info)

use chrono::DateTime;
use gridflow::config::Config;
use gridflow::engine::{run_fleet_etl, run_node_etl, MemoryResultCache, Services};
use gridflow::error::EngineError;
use gridflow::store::sqlite::{
    open_database, SqliteAnalyticsStore, SqliteMetadataStore, SqliteTelemetryStore,
    SqliteTransactionStore,
};
use std::env;
use std::sync::Arc;

#[derive(Debug, Default)]
struct TriggerArgs {
    node: Option<String>,
    window_minutes: Option<i64>,
    start_ts: Option<i64>,
    end_ts: Option<i64>,
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|idx| args.get(idx + 1))
        .cloned()
}

fn parse_bound(raw: &str, flag: &str) -> Result<i64, EngineError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.timestamp())
        .map_err(|e| EngineError::Validation(format!("bad {} bound '{}': {}", flag, raw, e)))
}

fn parse_args() -> Result<TriggerArgs, EngineError> {
    let args: Vec<String> = env::args().collect();
    let mut parsed = TriggerArgs {
        node: flag_value(&args, "--node"),
        ..Default::default()
    };

    if let Some(raw) = flag_value(&args, "--window") {
        let minutes = raw
            .parse()
            .map_err(|_| EngineError::Validation(format!("bad --window value '{}'", raw)))?;
        parsed.window_minutes = Some(minutes);
    }
    if let Some(raw) = flag_value(&args, "--start") {
        parsed.start_ts = Some(parse_bound(&raw, "--start")?);
    }
    if let Some(raw) = flag_value(&args, "--end") {
        parsed.end_ts = Some(parse_bound(&raw, "--end")?);
    }

    Ok(parsed)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let args = parse_args()?;
    let config = Config::from_env();

    let conn = open_database(&config.db_path)?;
    let services = Services::new(
        Arc::new(SqliteTelemetryStore::new(conn.clone())),
        Arc::new(SqliteTransactionStore::new(conn.clone())),
        Arc::new(SqliteMetadataStore::new(conn.clone())),
        Arc::new(SqliteAnalyticsStore::new(conn)),
        Arc::new(MemoryResultCache::new()),
        config.sample_interval_secs,
    );

    let result = match &args.node {
        Some(node_id) => {
            log::info!("🔧 Manual node ETL for {}", node_id);
            run_node_etl(&services, node_id, args.start_ts, args.end_ts).await?
        }
        None => {
            let window = args.window_minutes.unwrap_or(config.etl_window_minutes);
            log::info!("🔧 Manual fleet ETL over trailing {}m", window);
            run_fleet_etl(&services, window).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
