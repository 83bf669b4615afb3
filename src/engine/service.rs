//! Service container and read-through analytics callers
//!
//! `Services` is the explicitly constructed handle bundle: built once at
//! startup, passed by reference into the engine, scheduler, and trigger
//! paths, dropped at shutdown. No process-wide globals.
//!
//! `AnalyticsService` implements the read-through pattern over the result
//! cache: a hit is returned verbatim and trusted until its TTL expires; a
//! miss computes via the engine and writes through. Any cache failure is
//! soft - the operation logs a warning and returns a correct, just
//! unmemoized, result.

use crate::engine::aggregation::AggregationEngine;
use crate::engine::cache::{CacheScope, ResultCache};
use crate::engine::types::{
    daily_period_key, monthly_period_key, window_period_key, AggregateResult, DailyAnalytics,
    MonthlyAnalytics, NodeBenchmarks, PortfolioAnalytics, FLEET_SENTINEL,
};
use crate::error::EngineError;
use crate::store::{AnalyticsStore, MetadataStore, TelemetryStore, TransactionStore};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Manual node triggers default to the trailing five minutes
pub const DEFAULT_TRIGGER_WINDOW_SECS: i64 = 5 * 60;

/// Store, cache, and engine handles constructed once at startup
pub struct Services {
    pub analytics: Arc<dyn AnalyticsStore>,
    pub cache: Arc<dyn ResultCache>,
    pub engine: AggregationEngine,
}

impl Services {
    pub fn new(
        telemetry: Arc<dyn TelemetryStore>,
        transactions: Arc<dyn TransactionStore>,
        metadata: Arc<dyn MetadataStore>,
        analytics: Arc<dyn AnalyticsStore>,
        cache: Arc<dyn ResultCache>,
        sample_interval_secs: i64,
    ) -> Self {
        let engine = AggregationEngine::new(telemetry, transactions, metadata)
            .with_sample_interval(sample_interval_secs);
        Self {
            analytics,
            cache,
            engine,
        }
    }
}

/// Recompute the trailing fleet window and upsert it
///
/// The upsert is idempotent on (node, period): a concurrent manual run of
/// the same window converges to the last writer with no coordination.
pub async fn run_fleet_etl(
    services: &Services,
    window_minutes: i64,
) -> Result<AggregateResult, EngineError> {
    if window_minutes < 1 {
        return Err(EngineError::Validation(format!(
            "window_minutes must be at least 1, got {}",
            window_minutes
        )));
    }

    let end_ts = services.engine.now();
    let start_ts = end_ts - window_minutes * 60;

    let result = services
        .engine
        .compute_window_metrics(None, start_ts, end_ts)
        .await?;

    services
        .analytics
        .upsert(&result)
        .await
        .map_err(|e| EngineError::Store(e.to_string()))?;

    log::info!(
        "✅ Fleet ETL wrote {} ({} rows, {} metric keys)",
        result.period,
        result.row_count,
        result.metrics.len()
    );
    Ok(result)
}

/// Recompute one node's window and upsert it
///
/// Bounds default to the trailing five minutes when omitted. A malformed
/// range surfaces as a ValidationError and is never retried.
pub async fn run_node_etl(
    services: &Services,
    node_id: &str,
    start_ts: Option<i64>,
    end_ts: Option<i64>,
) -> Result<AggregateResult, EngineError> {
    let end_ts = end_ts.unwrap_or_else(|| services.engine.now());
    let start_ts = start_ts.unwrap_or(end_ts - DEFAULT_TRIGGER_WINDOW_SECS);

    let result = services
        .engine
        .compute_window_metrics(Some(node_id), start_ts, end_ts)
        .await?;

    services
        .analytics
        .upsert(&result)
        .await
        .map_err(|e| EngineError::Store(e.to_string()))?;

    log::info!(
        "✅ Node ETL wrote {} for {} ({} rows)",
        result.period,
        node_id,
        result.row_count
    );
    Ok(result)
}

/// Cached read paths over the aggregation engine
pub struct AnalyticsService {
    services: Arc<Services>,
}

impl AnalyticsService {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    pub async fn daily_analytics(
        &self,
        node_id: &str,
        date: NaiveDate,
    ) -> Result<DailyAnalytics, EngineError> {
        let key = daily_period_key(date);
        if let Some(hit) = self.cache_get(CacheScope::Daily, node_id, &key) {
            return Ok(hit);
        }

        let fresh = self.services.engine.compute_daily_analytics(node_id, date).await?;
        self.cache_put(CacheScope::Daily, node_id, &key, &fresh);
        Ok(fresh)
    }

    pub async fn monthly_analytics(
        &self,
        node_id: &str,
        year: i32,
        month: u32,
    ) -> Result<MonthlyAnalytics, EngineError> {
        let key = monthly_period_key(year, month);
        if let Some(hit) = self.cache_get(CacheScope::Monthly, node_id, &key) {
            return Ok(hit);
        }

        let fresh = self
            .services
            .engine
            .compute_monthly_analytics(node_id, year, month)
            .await?;
        self.cache_put(CacheScope::Monthly, node_id, &key, &fresh);
        Ok(fresh)
    }

    /// Fleet portfolio snapshot, cached under the fleet sentinel
    pub async fn portfolio_analytics(
        &self,
        node_ids: &[String],
        start_ts: i64,
        end_ts: i64,
    ) -> Result<PortfolioAnalytics, EngineError> {
        let key = window_period_key(start_ts, end_ts);
        if let Some(hit) = self.cache_get(CacheScope::Portfolio, FLEET_SENTINEL, &key) {
            return Ok(hit);
        }

        let fresh = self
            .services
            .engine
            .compute_portfolio_analytics(node_ids, start_ts, end_ts)
            .await?;
        self.cache_put(CacheScope::Portfolio, FLEET_SENTINEL, &key, &fresh);
        Ok(fresh)
    }

    /// Benchmarks are uncached: the trailing window ends at "now", so no
    /// stable period key exists for it.
    pub async fn performance_benchmarks(
        &self,
        node_id: &str,
        period_days: i64,
    ) -> Result<NodeBenchmarks, EngineError> {
        self.services
            .engine
            .compute_performance_benchmarks(node_id, period_days)
            .await
    }

    fn cache_get<T: DeserializeOwned>(
        &self,
        scope: CacheScope,
        node_id: &str,
        key: &str,
    ) -> Option<T> {
        match self.services.cache.get(scope, node_id, key) {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(hit) => Some(hit),
                Err(e) => {
                    log::warn!("⚠️  Discarding undecodable {} cache entry: {}", scope.as_str(), e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                let soft = EngineError::CacheUnavailable(e.to_string());
                log::warn!("⚠️  {} ({} read), computing uncached", soft, scope.as_str());
                None
            }
        }
    }

    fn cache_put<T: Serialize>(&self, scope: CacheScope, node_id: &str, key: &str, value: &T) {
        let snapshot = match serde_json::to_value(value) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::warn!("⚠️  Could not snapshot {} result for cache: {}", scope.as_str(), e);
                return;
            }
        };
        if let Err(e) = self
            .services
            .cache
            .put(scope, node_id, key, snapshot, scope.ttl())
        {
            let soft = EngineError::CacheUnavailable(e.to_string());
            log::warn!("⚠️  {} ({} write), result stays unmemoized", soft, scope.as_str());
        }
    }
}
