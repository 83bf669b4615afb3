//! # Aggregation engine
//!
//! Turns raw per-node telemetry and transaction streams into derived
//! metrics over arbitrary or calendar-aligned windows, with a TTL cache
//! and a recurring scheduler driving recomputation.
//!
//! ## Architecture
//!
//! ```text
//! scheduler tick / manual trigger
//!     ↓
//! AggregationEngine (reads telemetry/transaction/metadata stores)
//!     ↓
//! AggregateResult / derived analytics
//!     ↓
//! ResultCache (on-demand reads)   AnalyticsStore (historical reads)
//! ```
//!
//! Raw rows are never written here: the ingestion pipeline persists and
//! validates them before this engine runs. Everything downstream of the
//! stores is pure computation plus two write targets - the cache and the
//! analytics upsert.
//!
//! ## Module organization
//!
//! - `types` - data model (readings, transactions, metadata, results)
//! - `aggregation` - windowed computation (daily/monthly/portfolio/benchmarks)
//! - `cache` - TTL result cache
//! - `service` - service container, read-through callers, manual triggers
//! - `scheduler` - recurring trailing-window recomputation

pub mod aggregation;
pub mod cache;
pub mod scheduler;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use aggregation::AggregationEngine;
pub use cache::{CacheScope, MemoryResultCache, ResultCache};
pub use scheduler::{etl_scheduler_task, SchedulerConfig};
pub use service::{run_fleet_etl, run_node_etl, AnalyticsService, Services};
pub use types::{
    AggregateResult, DailyAnalytics, MetricStats, MonthlyAnalytics, NodeBenchmarks, NodeMetadata,
    PortfolioAnalytics, TelemetryReading, TransactionRecord, TransactionStatus, FLEET_SENTINEL,
};
