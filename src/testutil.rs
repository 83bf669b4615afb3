//! In-memory store doubles shared by unit tests

use crate::engine::cache::{CacheError, CacheScope, ResultCache};
use crate::engine::types::{
    AggregateResult, Financials, NodeMetadata, TelemetryReading, TransactionRecord,
    TransactionStatus,
};
use crate::store::{
    AnalyticsStore, MetadataStore, PowerSummary, StoreError, TelemetryStore, TransactionStore,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn make_reading(node_id: &str, ts: i64, power: f64, efficiency: Option<f64>) -> TelemetryReading {
    TelemetryReading {
        node_id: node_id.to_string(),
        timestamp: ts,
        power_output_kw: power,
        efficiency,
        extra_metrics: BTreeMap::new(),
    }
}

pub fn make_transaction(
    node_id: &str,
    ts: i64,
    status: TransactionStatus,
    revenue: f64,
    costs: f64,
) -> TransactionRecord {
    TransactionRecord {
        node_id: node_id.to_string(),
        timestamp: ts,
        status,
        financial: Financials {
            revenue,
            costs,
            profit: revenue - costs,
        },
    }
}

pub fn make_metadata(node_id: &str, capacity: f64, technology: &str, region: &str) -> NodeMetadata {
    NodeMetadata {
        node_id: node_id.to_string(),
        rated_capacity_kw: capacity,
        technology_type: technology.to_string(),
        region: region.to_string(),
    }
}

/// Vec-backed telemetry store with injectable per-node failures and a
/// fetch counter for cache read-through assertions
#[derive(Default)]
pub struct MemTelemetryStore {
    readings: Vec<TelemetryReading>,
    fail_nodes: HashSet<String>,
    fail_always: bool,
    pub fetch_calls: Arc<AtomicUsize>,
}

impl MemTelemetryStore {
    pub fn with_readings(readings: Vec<TelemetryReading>) -> Self {
        Self {
            readings,
            ..Default::default()
        }
    }

    pub fn fail_node(&mut self, node_id: &str) {
        self.fail_nodes.insert(node_id.to_string());
    }

    pub fn fail_always(&mut self) {
        self.fail_always = true;
    }

    fn check_failure(&self, node_id: Option<&str>) -> Result<(), StoreError> {
        if self.fail_always {
            return Err("injected telemetry failure".into());
        }
        if let Some(node) = node_id {
            if self.fail_nodes.contains(node) {
                return Err(format!("injected telemetry failure for {}", node).into());
            }
        }
        Ok(())
    }

    fn matching(&self, node_id: Option<&str>, start_ts: i64, end_ts: i64) -> Vec<TelemetryReading> {
        self.readings
            .iter()
            .filter(|r| node_id.map_or(true, |n| r.node_id == n))
            .filter(|r| r.timestamp >= start_ts && r.timestamp < end_ts)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TelemetryStore for MemTelemetryStore {
    async fn fetch_range(
        &self,
        node_id: Option<&str>,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<Vec<TelemetryReading>, StoreError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure(node_id)?;
        Ok(self.matching(node_id, start_ts, end_ts))
    }

    async fn aggregate_power(
        &self,
        node_id: &str,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<PowerSummary, StoreError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure(Some(node_id))?;

        let rows = self.matching(Some(node_id), start_ts, end_ts);
        if rows.is_empty() {
            return Ok(PowerSummary::empty());
        }

        let total: f64 = rows.iter().map(|r| r.power_output_kw).sum();
        let min = rows.iter().map(|r| r.power_output_kw).fold(f64::INFINITY, f64::min);
        let max = rows.iter().map(|r| r.power_output_kw).fold(f64::NEG_INFINITY, f64::max);
        let effs: Vec<f64> = rows.iter().filter_map(|r| r.efficiency).collect();

        Ok(PowerSummary {
            sample_count: rows.len() as u64,
            total_power_kw: total,
            avg_power_kw: total / rows.len() as f64,
            min_power_kw: min,
            max_power_kw: max,
            avg_efficiency: if effs.is_empty() {
                None
            } else {
                Some(effs.iter().sum::<f64>() / effs.len() as f64)
            },
        })
    }
}

#[derive(Default)]
pub struct MemTransactionStore {
    records: Vec<TransactionRecord>,
}

impl MemTransactionStore {
    pub fn with_records(records: Vec<TransactionRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl TransactionStore for MemTransactionStore {
    async fn fetch_range(
        &self,
        node_id: Option<&str>,
        start_ts: i64,
        end_ts: i64,
        status: Option<TransactionStatus>,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        Ok(self
            .records
            .iter()
            .filter(|r| node_id.map_or(true, |n| r.node_id == n))
            .filter(|r| r.timestamp >= start_ts && r.timestamp < end_ts)
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemMetadataStore {
    nodes: Vec<NodeMetadata>,
}

impl MemMetadataStore {
    pub fn with_nodes(nodes: Vec<NodeMetadata>) -> Self {
        Self { nodes }
    }
}

#[async_trait]
impl MetadataStore for MemMetadataStore {
    async fn get(&self, node_id: &str) -> Result<Option<NodeMetadata>, StoreError> {
        Ok(self.nodes.iter().find(|n| n.node_id == node_id).cloned())
    }

    async fn list_nodes(&self) -> Result<Vec<NodeMetadata>, StoreError> {
        Ok(self.nodes.clone())
    }
}

/// Map-backed analytics store mirroring the (node_id, period) upsert contract
#[derive(Default)]
pub struct MemAnalyticsStore {
    entries: Mutex<HashMap<(String, String), AggregateResult>>,
}

impl MemAnalyticsStore {
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl AnalyticsStore for MemAnalyticsStore {
    async fn upsert(&self, result: &AggregateResult) -> Result<(), StoreError> {
        self.entries.lock().unwrap().insert(
            (result.node_id.clone(), result.period.clone()),
            result.clone(),
        );
        Ok(())
    }

    async fn get(
        &self,
        node_id: &str,
        period: &str,
    ) -> Result<Option<AggregateResult>, StoreError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(&(node_id.to_string(), period.to_string()))
            .cloned())
    }

    async fn list_by_node(
        &self,
        node_id: &str,
        limit: u32,
    ) -> Result<Vec<AggregateResult>, StoreError> {
        let mut results: Vec<AggregateResult> = self
            .entries
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.node_id == node_id)
            .cloned()
            .collect();
        results.sort_by_key(|r| std::cmp::Reverse(r.generated_at));
        results.truncate(limit as usize);
        Ok(results)
    }
}

/// Cache that always errors, for soft-failure assertions
pub struct FailingCache;

impl ResultCache for FailingCache {
    fn get(
        &self,
        _scope: CacheScope,
        _node_id: &str,
        _period_key: &str,
    ) -> Result<Option<serde_json::Value>, CacheError> {
        Err("cache backend unreachable".into())
    }

    fn put(
        &self,
        _scope: CacheScope,
        _node_id: &str,
        _period_key: &str,
        _value: serde_json::Value,
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        Err("cache backend unreachable".into())
    }
}
