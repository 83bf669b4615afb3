//! Store boundaries consumed by the aggregation engine
//!
//! The telemetry, transaction, and metadata stores are external
//! collaborators: durable storage of rows that were validated and
//! persisted by the ingestion pipeline before the engine ever runs. The
//! analytics store is the core persistence boundary for computed results
//! (idempotent upsert keyed on node + period).
//!
//! All methods are async trait objects so the engine and scheduler can be
//! handed `Arc<dyn ...>` handles built once at startup.

pub mod sqlite;

use crate::engine::types::{
    AggregateResult, NodeMetadata, TelemetryReading, TransactionRecord, TransactionStatus,
};
use async_trait::async_trait;

/// Boxed error for store implementations; the engine maps these to
/// `EngineError::Store`.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Native aggregation result from the time-series store
///
/// Used by the monthly path, which pushes the reduction down to the store
/// instead of folding rows engine-side. Must be numerically equivalent to
/// the engine's own reduction over the same rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerSummary {
    pub sample_count: u64,
    pub total_power_kw: f64,
    pub avg_power_kw: f64,
    pub min_power_kw: f64,
    pub max_power_kw: f64,
    pub avg_efficiency: Option<f64>,
}

impl PowerSummary {
    /// Summary of an empty row set
    pub fn empty() -> Self {
        Self {
            sample_count: 0,
            total_power_kw: 0.0,
            avg_power_kw: 0.0,
            min_power_kw: 0.0,
            max_power_kw: 0.0,
            avg_efficiency: None,
        }
    }
}

/// Durable storage of telemetry readings, queryable by node and time range
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Readings in `[start_ts, end_ts)` for one node, or fleet-wide when
    /// `node_id` is None. Ordered by timestamp ascending.
    async fn fetch_range(
        &self,
        node_id: Option<&str>,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<Vec<TelemetryReading>, StoreError>;

    /// Store-native power aggregation over `[start_ts, end_ts)` for one node
    async fn aggregate_power(
        &self,
        node_id: &str,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<PowerSummary, StoreError>;
}

/// Durable storage of transaction records, queryable by node, range, status
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn fetch_range(
        &self,
        node_id: Option<&str>,
        start_ts: i64,
        end_ts: i64,
        status: Option<TransactionStatus>,
    ) -> Result<Vec<TransactionRecord>, StoreError>;
}

/// Reference data for fleet nodes
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, node_id: &str) -> Result<Option<NodeMetadata>, StoreError>;

    async fn list_nodes(&self) -> Result<Vec<NodeMetadata>, StoreError>;
}

/// Persisted analytics results, keyed on the unique pair (node_id, period)
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Overwrite semantics: a repeated upsert with the same key replaces
    /// the prior document entirely (last-write-wins, no merge).
    async fn upsert(&self, result: &AggregateResult) -> Result<(), StoreError>;

    async fn get(&self, node_id: &str, period: &str)
        -> Result<Option<AggregateResult>, StoreError>;

    /// Most recent results for a node, ordered by generation time descending
    async fn list_by_node(
        &self,
        node_id: &str,
        limit: u32,
    ) -> Result<Vec<AggregateResult>, StoreError>;
}
