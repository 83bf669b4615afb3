//! Time-windowed aggregation over fleet telemetry
//!
//! Pure computation: given store handles and a window, produce derived
//! metrics. Nothing here writes; persistence and caching belong to the
//! service layer.
//!
//! ## Schema-on-read
//!
//! Readings carry an open metric bag, so window aggregation runs two
//! passes: the first scans all rows once to discover the union of numeric
//! metric keys, the second computes {count, avg, min, max} per key. The
//! result mapping is a BTreeMap so repeated runs against unchanged data
//! produce identical output regardless of row order.
//!
//! ## Failure model
//!
//! A store-read failure in any single-node computation surfaces as
//! `EngineError::Store` to the caller. The portfolio fan-out isolates
//! per-node failures instead: a bad node lands in the diagnostics list
//! and never aborts its siblings.

use crate::engine::types::{
    window_period_key, AggregateResult, DailyAnalytics, MetricStats, MonthlyAnalytics,
    NodeBenchmarks, NodeFailure, PortfolioAnalytics, TelemetryReading, TransactionStatus,
    FLEET_SENTINEL,
};
use crate::error::EngineError;
use crate::store::{MetadataStore, StoreError, TelemetryStore, TransactionStore};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

const SECS_PER_DAY: i64 = 86_400;

/// Default assumed sampling cadence of the fleet (one reading per minute)
pub const DEFAULT_SAMPLE_INTERVAL_SECS: i64 = 60;

fn store_err(err: StoreError) -> EngineError {
    EngineError::Store(err.to_string())
}

/// Derived power figures for one node over one window
struct PowerDerivation {
    sample_count: u64,
    total_generation_kwh: f64,
    avg_power_kw: f64,
    min_power_kw: f64,
    max_power_kw: f64,
    avg_efficiency: Option<f64>,
}

/// Settled-transaction totals; profit is computed per record, then summed
struct RevenueTotals {
    revenue: f64,
    costs: f64,
    profit: f64,
}

/// Windowed aggregation engine over the three raw store boundaries
///
/// Constructed once at startup with explicit store handles (no globals)
/// and shared by reference. The timestamp function is injectable so tests
/// can freeze "now".
#[derive(Clone)]
pub struct AggregationEngine {
    telemetry: Arc<dyn TelemetryStore>,
    transactions: Arc<dyn TransactionStore>,
    metadata: Arc<dyn MetadataStore>,
    sample_interval_secs: i64,
    now_fn: Arc<dyn Fn() -> i64 + Send + Sync>,
}

impl AggregationEngine {
    pub fn new(
        telemetry: Arc<dyn TelemetryStore>,
        transactions: Arc<dyn TransactionStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            telemetry,
            transactions,
            metadata,
            sample_interval_secs: DEFAULT_SAMPLE_INTERVAL_SECS,
            now_fn: Arc::new(|| chrono::Utc::now().timestamp()),
        }
    }

    /// Override the assumed sampling cadence (uptime/availability math)
    pub fn with_sample_interval(mut self, secs: i64) -> Self {
        self.sample_interval_secs = secs;
        self
    }

    /// Override the timestamp source (deterministic tests)
    pub fn with_now_fn(mut self, now_fn: Arc<dyn Fn() -> i64 + Send + Sync>) -> Self {
        self.now_fn = now_fn;
        self
    }

    pub fn now(&self) -> i64 {
        (self.now_fn)()
    }

    /// Schema-on-read aggregation of one window
    ///
    /// `node_id = None` aggregates the whole fleet. Empty input yields an
    /// empty metrics mapping and `row_count = 0`, not an error.
    pub async fn compute_window_metrics(
        &self,
        node_id: Option<&str>,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<AggregateResult, EngineError> {
        validate_window(start_ts, end_ts)?;

        let readings = self
            .telemetry
            .fetch_range(node_id, start_ts, end_ts)
            .await
            .map_err(store_err)?;

        let metrics = aggregate_metric_bag(&readings);

        Ok(AggregateResult {
            node_id: node_id.unwrap_or(FLEET_SENTINEL).to_string(),
            period: window_period_key(start_ts, end_ts),
            start_ts,
            end_ts,
            metrics,
            row_count: readings.len() as u64,
            generated_at: self.now(),
        })
    }

    /// Daily analytics for one node (midnight-to-midnight UTC)
    pub async fn compute_daily_analytics(
        &self,
        node_id: &str,
        date: NaiveDate,
    ) -> Result<DailyAnalytics, EngineError> {
        let start_ts = match date.and_hms_opt(0, 0, 0) {
            Some(midnight) => midnight.and_utc().timestamp(),
            None => return Err(EngineError::Validation(format!("invalid date: {}", date))),
        };
        let end_ts = start_ts + SECS_PER_DAY;

        let readings = self
            .telemetry
            .fetch_range(Some(node_id), start_ts, end_ts)
            .await
            .map_err(store_err)?;

        let power = derive_power_series(&readings, self.sample_interval_secs);
        let uptime_pct = uptime_pct(power.sample_count, end_ts - start_ts, self.sample_interval_secs);
        let totals = self.settled_totals(node_id, start_ts, end_ts).await?;

        Ok(DailyAnalytics {
            node_id: node_id.to_string(),
            date,
            total_generation_kwh: power.total_generation_kwh,
            avg_efficiency: power.avg_efficiency,
            uptime_pct,
            total_revenue: totals.revenue,
            total_costs: totals.costs,
            total_profit: totals.profit,
            avg_power_kw: power.avg_power_kw,
            max_power_kw: power.max_power_kw,
            min_power_kw: power.min_power_kw,
            sample_count: power.sample_count,
        })
    }

    /// Monthly analytics for one node (calendar month, UTC)
    ///
    /// Uses the store's native aggregation instead of folding rows
    /// engine-side; the derivations match the daily formulas exactly.
    pub async fn compute_monthly_analytics(
        &self,
        node_id: &str,
        year: i32,
        month: u32,
    ) -> Result<MonthlyAnalytics, EngineError> {
        let (start_ts, end_ts) = month_window(year, month)?;

        let summary = self
            .telemetry
            .aggregate_power(node_id, start_ts, end_ts)
            .await
            .map_err(store_err)?;

        let interval_hours = self.sample_interval_secs as f64 / 3600.0;
        let total_generation_kwh = summary.total_power_kw * interval_hours;
        let uptime = uptime_pct(summary.sample_count, end_ts - start_ts, self.sample_interval_secs);
        let totals = self.settled_totals(node_id, start_ts, end_ts).await?;

        Ok(MonthlyAnalytics {
            node_id: node_id.to_string(),
            year,
            month,
            total_generation_kwh,
            avg_efficiency: summary.avg_efficiency,
            uptime_pct: uptime,
            total_revenue: totals.revenue,
            total_costs: totals.costs,
            total_profit: totals.profit,
            avg_power_kw: summary.avg_power_kw,
            max_power_kw: summary.max_power_kw,
            min_power_kw: summary.min_power_kw,
            sample_count: summary.sample_count,
        })
    }

    /// Fleet-slice analytics with concurrent per-node fan-out
    ///
    /// One spawned fetch set per node; a node whose fetch fails is
    /// recorded in `failures` and skipped by the fold. Sibling nodes are
    /// never aborted by one bad node.
    pub async fn compute_portfolio_analytics(
        &self,
        node_ids: &[String],
        start_ts: i64,
        end_ts: i64,
    ) -> Result<PortfolioAnalytics, EngineError> {
        validate_window(start_ts, end_ts)?;

        let mut handles = Vec::with_capacity(node_ids.len());
        for node_id in node_ids {
            let telemetry = Arc::clone(&self.telemetry);
            let transactions = Arc::clone(&self.transactions);
            let metadata = Arc::clone(&self.metadata);
            let node = node_id.clone();
            let interval = self.sample_interval_secs;

            let handle = tokio::spawn(async move {
                fetch_node_slice(telemetry, transactions, metadata, &node, start_ts, end_ts, interval)
                    .await
            });
            handles.push((node_id.clone(), handle));
        }

        let mut slices = Vec::new();
        let mut failures = Vec::new();
        for (node_id, handle) in handles {
            match handle.await {
                Ok(Ok(slice)) => slices.push(slice),
                Ok(Err(err)) => failures.push(NodeFailure {
                    node_id,
                    reason: err.to_string(),
                }),
                Err(join_err) => failures.push(NodeFailure {
                    node_id,
                    reason: format!("fetch task failed: {}", join_err),
                }),
            }
        }

        if !failures.is_empty() {
            log::warn!(
                "⚠️  Portfolio fan-out skipped {} of {} nodes",
                failures.len(),
                node_ids.len()
            );
        }

        let total_capacity_kw: f64 = slices.iter().map(|s| s.capacity_kw).sum();
        let total_generation_kwh: f64 = slices.iter().map(|s| s.generation_kwh).sum();
        let total_revenue: f64 = slices.iter().map(|s| s.revenue).sum();

        let mut eff_weight = 0.0;
        let mut eff_sum = 0.0;
        for slice in &slices {
            if let Some(eff) = slice.avg_efficiency {
                eff_weight += slice.capacity_kw;
                eff_sum += eff * slice.capacity_kw;
            }
        }
        let weighted_avg_efficiency = if eff_weight > 0.0 {
            Some(eff_sum / eff_weight)
        } else {
            None
        };

        let window_hours = (end_ts - start_ts) as f64 / 3600.0;
        let capacity_factor = if total_capacity_kw > 0.0 && window_hours > 0.0 {
            total_generation_kwh / (total_capacity_kw * window_hours)
        } else {
            0.0
        };

        let technology_types: HashSet<&str> =
            slices.iter().map(|s| s.technology_type.as_str()).collect();
        let diversification_index = if slices.is_empty() {
            0.0
        } else {
            technology_types.len() as f64 / slices.len() as f64
        };

        Ok(PortfolioAnalytics {
            node_count: slices.len(),
            total_capacity_kw,
            total_generation_kwh,
            total_revenue,
            weighted_avg_efficiency,
            capacity_factor,
            diversification_index,
            window_start_ts: start_ts,
            window_end_ts: end_ts,
            failures,
        })
    }

    /// Utilization/availability benchmarks over a trailing window ending now
    pub async fn compute_performance_benchmarks(
        &self,
        node_id: &str,
        period_days: i64,
    ) -> Result<NodeBenchmarks, EngineError> {
        if period_days < 1 {
            return Err(EngineError::Validation(format!(
                "period_days must be at least 1, got {}",
                period_days
            )));
        }

        let metadata = self
            .metadata
            .get(node_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| EngineError::Validation(format!("unknown node: {}", node_id)))?;

        let end_ts = self.now();
        let start_ts = end_ts - period_days * SECS_PER_DAY;

        let summary = self
            .telemetry
            .aggregate_power(node_id, start_ts, end_ts)
            .await
            .map_err(store_err)?;

        let capacity = metadata.rated_capacity_kw;
        let utilization = if capacity > 0.0 {
            summary.avg_power_kw / capacity
        } else {
            0.0
        };
        let peak_utilization = if capacity > 0.0 {
            summary.max_power_kw / capacity
        } else {
            0.0
        };

        let availability_pct = uptime_pct(
            summary.sample_count,
            end_ts - start_ts,
            self.sample_interval_secs,
        );
        // Threshold rule, not a statistical estimator
        let reliability_pct = if availability_pct > 95.0 {
            100.0
        } else {
            availability_pct
        };

        Ok(NodeBenchmarks {
            node_id: node_id.to_string(),
            period_days,
            rated_capacity_kw: capacity,
            utilization,
            peak_utilization,
            availability_pct,
            reliability_pct,
            avg_power_kw: summary.avg_power_kw,
            max_power_kw: summary.max_power_kw,
            sample_count: summary.sample_count,
        })
    }

    async fn settled_totals(
        &self,
        node_id: &str,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<RevenueTotals, EngineError> {
        let records = self
            .transactions
            .fetch_range(Some(node_id), start_ts, end_ts, Some(TransactionStatus::Settled))
            .await
            .map_err(store_err)?;

        let mut totals = RevenueTotals {
            revenue: 0.0,
            costs: 0.0,
            profit: 0.0,
        };
        for record in &records {
            totals.revenue += record.financial.revenue;
            totals.costs += record.financial.costs;
            // Profit per record at aggregation time, never re-derived
            // from the summed totals.
            totals.profit += record.financial.revenue - record.financial.costs;
        }
        Ok(totals)
    }
}

fn validate_window(start_ts: i64, end_ts: i64) -> Result<(), EngineError> {
    if start_ts >= end_ts {
        return Err(EngineError::Validation(format!(
            "window start {} must precede end {}",
            start_ts, end_ts
        )));
    }
    Ok(())
}

fn month_window(year: i32, month: u32) -> Result<(i64, i64), EngineError> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| EngineError::Validation(format!("invalid month: {}-{}", year, month)))?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(|| EngineError::Validation(format!("invalid month: {}-{}", year, month)))?;

    let start = first.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
    let end = next.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
    Ok((start, end))
}

/// Two-pass schema-on-read aggregation of the metric bag
fn aggregate_metric_bag(readings: &[TelemetryReading]) -> BTreeMap<String, MetricStats> {
    // Pass 1: union of numeric metric keys across all rows
    let mut discovered: HashSet<String> = HashSet::new();
    for reading in readings {
        for (key, _) in reading.metric_entries() {
            discovered.insert(key.to_string());
        }
    }

    struct Acc {
        count: u64,
        sum: f64,
        min: f64,
        max: f64,
    }

    let mut accumulators: BTreeMap<String, Acc> = discovered
        .into_iter()
        .map(|key| {
            (
                key,
                Acc {
                    count: 0,
                    sum: 0.0,
                    min: f64::INFINITY,
                    max: f64::NEG_INFINITY,
                },
            )
        })
        .collect();

    // Pass 2: per-key stats over the discovered key set
    for reading in readings {
        for (key, value) in reading.metric_entries() {
            if let Some(acc) = accumulators.get_mut(key) {
                acc.count += 1;
                acc.sum += value;
                acc.min = acc.min.min(value);
                acc.max = acc.max.max(value);
            }
        }
    }

    accumulators
        .into_iter()
        .map(|(key, acc)| {
            (
                key,
                MetricStats {
                    count: acc.count,
                    avg: acc.sum / acc.count as f64,
                    min: acc.min,
                    max: acc.max,
                },
            )
        })
        .collect()
}

/// Fold a window of readings into power/energy figures
///
/// Energy is instantaneous power times the sampling-interval duration,
/// summed over the window.
fn derive_power_series(readings: &[TelemetryReading], sample_interval_secs: i64) -> PowerDerivation {
    if readings.is_empty() {
        return PowerDerivation {
            sample_count: 0,
            total_generation_kwh: 0.0,
            avg_power_kw: 0.0,
            min_power_kw: 0.0,
            max_power_kw: 0.0,
            avg_efficiency: None,
        };
    }

    let interval_hours = sample_interval_secs as f64 / 3600.0;
    let mut power_sum = 0.0;
    let mut min_power = f64::INFINITY;
    let mut max_power = f64::NEG_INFINITY;
    let mut eff_sum = 0.0;
    let mut eff_count = 0u64;

    for reading in readings {
        power_sum += reading.power_output_kw;
        min_power = min_power.min(reading.power_output_kw);
        max_power = max_power.max(reading.power_output_kw);
        if let Some(eff) = reading.efficiency {
            eff_sum += eff;
            eff_count += 1;
        }
    }

    PowerDerivation {
        sample_count: readings.len() as u64,
        total_generation_kwh: power_sum * interval_hours,
        avg_power_kw: power_sum / readings.len() as f64,
        min_power_kw: min_power,
        max_power_kw: max_power,
        avg_efficiency: if eff_count > 0 {
            Some(eff_sum / eff_count as f64)
        } else {
            None
        },
    }
}

/// observed samples / expected samples x 100, at the assumed fixed cadence
fn uptime_pct(observed: u64, window_secs: i64, sample_interval_secs: i64) -> f64 {
    if sample_interval_secs <= 0 || window_secs <= 0 {
        return 0.0;
    }
    let expected = window_secs / sample_interval_secs;
    if expected == 0 {
        return 0.0;
    }
    observed as f64 / expected as f64 * 100.0
}

/// One node's contribution to the portfolio reduction
struct NodeSlice {
    capacity_kw: f64,
    technology_type: String,
    generation_kwh: f64,
    revenue: f64,
    avg_efficiency: Option<f64>,
}

async fn fetch_node_slice(
    telemetry: Arc<dyn TelemetryStore>,
    transactions: Arc<dyn TransactionStore>,
    metadata: Arc<dyn MetadataStore>,
    node_id: &str,
    start_ts: i64,
    end_ts: i64,
    sample_interval_secs: i64,
) -> Result<NodeSlice, EngineError> {
    let (readings, records, meta) = tokio::join!(
        telemetry.fetch_range(Some(node_id), start_ts, end_ts),
        transactions.fetch_range(Some(node_id), start_ts, end_ts, Some(TransactionStatus::Settled)),
        metadata.get(node_id),
    );

    let readings = readings.map_err(store_err)?;
    let records = records.map_err(store_err)?;
    let meta = meta
        .map_err(store_err)?
        .ok_or_else(|| EngineError::Store(format!("no metadata for node {}", node_id)))?;

    let power = derive_power_series(&readings, sample_interval_secs);
    let revenue: f64 = records.iter().map(|r| r.financial.revenue).sum();

    Ok(NodeSlice {
        capacity_kw: meta.rated_capacity_kw,
        technology_type: meta.technology_type,
        generation_kwh: power.total_generation_kwh,
        revenue,
        avg_efficiency: power.avg_efficiency,
    })
}
