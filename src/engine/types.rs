//! Core data structures for the aggregation engine
//!
//! All timestamps are unix seconds (UTC). Readings carry an open-ended
//! numeric metric bag next to the fixed power/efficiency fields; the
//! engine discovers the key union at aggregation time (schema-on-read).
//!
//! Types mirror the persisted analytics schema:
//! - `analytics_results` table -> `AggregateResult`
//! - `telemetry_readings` table -> `TelemetryReading`
//! - `transactions` table -> `TransactionRecord`
//! - `node_metadata` table -> `NodeMetadata`

use chrono::{DateTime, NaiveDate, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reserved node id for fleet-wide aggregates
pub const FLEET_SENTINEL: &str = "fleet";

/// Metric-bag key for the fixed power output field
pub const POWER_KEY: &str = "power_output_kw";

/// Metric-bag key for the fixed efficiency field
pub const EFFICIENCY_KEY: &str = "efficiency";

/// One telemetry sample from a fleet node
///
/// Immutable once written; the engine only ever reads these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryReading {
    pub node_id: String,
    pub timestamp: i64,
    pub power_output_kw: f64,
    pub efficiency: Option<f64>,
    /// Open metric bag: arbitrary numeric keys carried by the reading.
    /// BTreeMap so iteration order is deterministic.
    #[serde(default)]
    pub extra_metrics: BTreeMap<String, f64>,
}

impl TelemetryReading {
    /// All numeric metric entries of this reading, fixed fields included.
    ///
    /// The fixed fields fold into the bag under `power_output_kw` and
    /// `efficiency` so the schema-on-read scan sees one uniform key space.
    pub fn metric_entries(&self) -> Vec<(&str, f64)> {
        let mut entries = Vec::with_capacity(2 + self.extra_metrics.len());
        entries.push((POWER_KEY, self.power_output_kw));
        if let Some(eff) = self.efficiency {
            entries.push((EFFICIENCY_KEY, eff));
        }
        for (key, value) in &self.extra_metrics {
            entries.push((key.as_str(), *value));
        }
        entries
    }
}

/// Settlement state of a transaction record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Settled,
    Pending,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Settled => "settled",
            TransactionStatus::Pending => "pending",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "settled" => Some(TransactionStatus::Settled),
            "pending" => Some(TransactionStatus::Pending),
            "failed" => Some(TransactionStatus::Failed),
            _ => None,
        }
    }
}

/// Financial breakdown of a single transaction
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Financials {
    pub revenue: f64,
    pub costs: f64,
    pub profit: f64,
}

/// One financial/dispatch transaction for a node
///
/// Only `Settled` records count toward revenue aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub node_id: String,
    pub timestamp: i64,
    pub status: TransactionStatus,
    pub financial: Financials,
}

/// Reference data for a fleet node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub node_id: String,
    pub rated_capacity_kw: f64,
    pub technology_type: String,
    pub region: String,
}

/// Per-key summary statistics produced by the schema-on-read scan
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub count: u64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

/// A computed aggregate over one window, keyed by (node_id, period)
///
/// At most one current result exists per key; recomputation replaces the
/// prior value entirely via the analytics store upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateResult {
    pub node_id: String,
    pub period: String,
    pub start_ts: i64,
    pub end_ts: i64,
    pub metrics: BTreeMap<String, MetricStats>,
    pub row_count: u64,
    pub generated_at: i64,
}

/// Daily analytics for a single node (midnight-to-midnight UTC)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyAnalytics {
    pub node_id: String,
    pub date: NaiveDate,
    pub total_generation_kwh: f64,
    pub avg_efficiency: Option<f64>,
    pub uptime_pct: f64,
    pub total_revenue: f64,
    pub total_costs: f64,
    pub total_profit: f64,
    pub avg_power_kw: f64,
    pub max_power_kw: f64,
    pub min_power_kw: f64,
    pub sample_count: u64,
}

/// Monthly analytics for a single node (calendar month, UTC)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyAnalytics {
    pub node_id: String,
    pub year: i32,
    pub month: u32,
    pub total_generation_kwh: f64,
    pub avg_efficiency: Option<f64>,
    pub uptime_pct: f64,
    pub total_revenue: f64,
    pub total_costs: f64,
    pub total_profit: f64,
    pub avg_power_kw: f64,
    pub max_power_kw: f64,
    pub min_power_kw: f64,
    pub sample_count: u64,
}

/// A node whose fetch failed during the portfolio fan-out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeFailure {
    pub node_id: String,
    pub reason: String,
}

/// Fleet-slice analytics reduced from concurrent per-node fetches
///
/// Nodes that failed to fetch are listed in `failures` and excluded from
/// the totals; one bad node never aborts the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioAnalytics {
    pub node_count: usize,
    pub total_capacity_kw: f64,
    pub total_generation_kwh: f64,
    pub total_revenue: f64,
    /// Capacity-weighted mean efficiency over nodes reporting efficiency
    pub weighted_avg_efficiency: Option<f64>,
    /// total generation / (total capacity x window hours)
    pub capacity_factor: f64,
    /// distinct technology types / node count
    pub diversification_index: f64,
    pub window_start_ts: i64,
    pub window_end_ts: i64,
    pub failures: Vec<NodeFailure>,
}

/// Performance benchmarks for one node over a trailing window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeBenchmarks {
    pub node_id: String,
    pub period_days: i64,
    pub rated_capacity_kw: f64,
    /// avg power / rated capacity
    pub utilization: f64,
    /// max power / rated capacity
    pub peak_utilization: f64,
    /// observed samples / expected samples x 100
    pub availability_pct: f64,
    /// 100 when availability > 95, otherwise availability unchanged
    pub reliability_pct: f64,
    pub avg_power_kw: f64,
    pub max_power_kw: f64,
    pub sample_count: u64,
}

/// RFC 3339 rendering of a unix-second timestamp, UTC
pub fn iso_ts(ts: i64) -> String {
    match DateTime::from_timestamp(ts, 0) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, true),
        None => ts.to_string(),
    }
}

/// Period key for an ad-hoc or ETL window: ISO bounds joined by '/'
pub fn window_period_key(start_ts: i64, end_ts: i64) -> String {
    format!("{}/{}", iso_ts(start_ts), iso_ts(end_ts))
}

/// Period key for a daily aggregate
pub fn daily_period_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Period key for a monthly aggregate
pub fn monthly_period_key(year: i32, month: u32) -> String {
    format!("{:04}-{:02}", year, month)
}
