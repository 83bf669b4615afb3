//! Runtime configuration from environment variables

use std::env;

/// Configuration for the ETL runtime and trigger binaries
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub db_path: String,

    /// Scheduler cadence in seconds (default: every 5 minutes)
    pub etl_interval_secs: u64,

    /// Trailing window recomputed by each scheduler tick, in minutes
    pub etl_window_minutes: i64,

    /// Assumed fixed sampling cadence of the fleet, in seconds
    pub sample_interval_secs: i64,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `GRIDFLOW_DB_PATH` (default: data/gridflow.db)
    /// - `ETL_INTERVAL_SECS` (default: 300)
    /// - `ETL_WINDOW_MINUTES` (default: 5)
    /// - `SAMPLE_INTERVAL_SECS` (default: 60)
    pub fn from_env() -> Self {
        Self {
            db_path: env::var("GRIDFLOW_DB_PATH")
                .unwrap_or_else(|_| "data/gridflow.db".to_string()),

            etl_interval_secs: env::var("ETL_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),

            etl_window_minutes: env::var("ETL_WINDOW_MINUTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),

            sample_interval_secs: env::var("SAMPLE_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
        }
    }
}
