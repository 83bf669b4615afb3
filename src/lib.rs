//! # gridflow
//!
//! Windowed aggregation engine for distributed energy resource fleet
//! telemetry: schema-on-read metric discovery, daily/monthly/portfolio
//! analytics, a TTL result cache, and a recurring ETL scheduler writing
//! idempotent aggregates keyed on (node, period).
//!
//! The crate is the analytics core of a larger platform. Ingestion, HTTP
//! routing, and the dashboard live elsewhere; this code reads rows those
//! collaborators already persisted and computes derived metrics from
//! them.
//!
//! Binaries:
//! - `etl_runtime` - long-running service: scheduler + stores
//! - `etl_trigger` - one-shot manual fleet/node recomputation

pub mod config;
pub mod engine;
pub mod error;
pub mod store;

#[cfg(test)]
mod testutil;

pub use config::Config;
pub use engine::{
    AggregationEngine, AnalyticsService, CacheScope, MemoryResultCache, ResultCache,
    SchedulerConfig, Services,
};
pub use error::EngineError;
