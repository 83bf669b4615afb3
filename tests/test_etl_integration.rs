//! End-to-end ETL flow over the SQLite stores
//!
//! Exercises the full path a scheduler tick or manual trigger takes:
//! rows already persisted in SQLite -> aggregation engine -> analytics
//! upsert -> historical read-back, plus the cached read paths.

use gridflow::engine::{
    run_fleet_etl, run_node_etl, AnalyticsService, MemoryResultCache, Services, FLEET_SENTINEL,
};
use gridflow::store::sqlite::{
    open_database, SharedConnection, SqliteAnalyticsStore, SqliteMetadataStore,
    SqliteTelemetryStore, SqliteTransactionStore,
};
use gridflow::store::AnalyticsStore;
use std::sync::Arc;

const BASE: i64 = 1_700_000_000;

fn seed_reading(conn: &SharedConnection, node: &str, ts: i64, power: f64, bag: Option<&str>) {
    conn.lock()
        .unwrap()
        .execute(
            "INSERT INTO telemetry_readings
             (node_id, timestamp, power_output_kw, efficiency, extra_metrics_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![node, ts, power, 0.9_f64, bag],
        )
        .unwrap();
}

fn seed_transaction(conn: &SharedConnection, node: &str, ts: i64, status: &str, revenue: f64, costs: f64) {
    conn.lock()
        .unwrap()
        .execute(
            "INSERT INTO transactions (node_id, timestamp, status, revenue, costs, profit)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![node, ts, status, revenue, costs, revenue - costs],
        )
        .unwrap();
}

fn seed_node(conn: &SharedConnection, node: &str, capacity: f64, tech: &str) {
    conn.lock()
        .unwrap()
        .execute(
            "INSERT INTO node_metadata (node_id, rated_capacity_kw, technology_type, region)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![node, capacity, tech, "region-1"],
        )
        .unwrap();
}

fn build_services(conn: SharedConnection) -> Arc<Services> {
    Arc::new(Services::new(
        Arc::new(SqliteTelemetryStore::new(conn.clone())),
        Arc::new(SqliteTransactionStore::new(conn.clone())),
        Arc::new(SqliteMetadataStore::new(conn.clone())),
        Arc::new(SqliteAnalyticsStore::new(conn)),
        Arc::new(MemoryResultCache::new()),
        60,
    ))
}

#[tokio::test]
async fn test_node_etl_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let conn = open_database(dir.path().join("gridflow.db")).unwrap();

    // One hour of one-minute readings plus a metric-bag straggler
    for i in 0..60 {
        seed_reading(&conn, "n1", BASE + i * 60, 100.0, None);
    }
    seed_reading(
        &conn,
        "n1",
        BASE + 30 * 60 + 1,
        100.0,
        Some(r#"{"temperature_c": 39.0}"#),
    );

    let services = build_services(conn);
    let result = run_node_etl(&services, "n1", Some(BASE), Some(BASE + 3_600))
        .await
        .unwrap();

    assert_eq!(result.node_id, "n1");
    assert_eq!(result.row_count, 61);
    // Discovered keys: efficiency + power + bag straggler
    assert_eq!(result.metrics.len(), 3);
    assert_eq!(result.metrics["temperature_c"].count, 1);
    assert_eq!(result.metrics["power_output_kw"].count, 61);

    // The upsert is readable back through the historical path
    let stored = services
        .analytics
        .get("n1", &result.period)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.metrics, result.metrics);
    assert_eq!(stored.row_count, 61);

    // Recomputation of the identical window replaces, never duplicates
    run_node_etl(&services, "n1", Some(BASE), Some(BASE + 3_600))
        .await
        .unwrap();
    let listed = services.analytics.list_by_node("n1", 10).await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn test_fleet_etl_covers_all_nodes() {
    let dir = tempfile::tempdir().unwrap();
    let conn = open_database(dir.path().join("gridflow.db")).unwrap();

    let now = chrono::Utc::now().timestamp();
    seed_reading(&conn, "n1", now - 60, 80.0, None);
    seed_reading(&conn, "n2", now - 120, 40.0, None);

    let services = build_services(conn);
    let result = run_fleet_etl(&services, 5).await.unwrap();

    assert_eq!(result.node_id, FLEET_SENTINEL);
    assert_eq!(result.row_count, 2);
    assert!((result.metrics["power_output_kw"].avg - 60.0).abs() < 1e-9);

    let listed = services
        .analytics
        .list_by_node(FLEET_SENTINEL, 10)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].period, result.period);
}

#[tokio::test]
async fn test_portfolio_and_cached_reads_over_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let conn = open_database(dir.path().join("gridflow.db")).unwrap();

    // Two nodes, two technology types, 24 hourly readings each
    seed_node(&conn, "n1", 500.0, "solar");
    seed_node(&conn, "n2", 500.0, "wind");
    for h in 0..24 {
        seed_reading(&conn, "n1", BASE + h * 3_600, 250.0, None);
        seed_reading(&conn, "n2", BASE + h * 3_600, 250.0, None);
    }
    seed_transaction(&conn, "n1", BASE + 100, "settled", 500.0, 200.0);
    seed_transaction(&conn, "n1", BASE + 200, "settled", 300.0, 100.0);
    seed_transaction(&conn, "n1", BASE + 300, "pending", 1_000.0, 0.0);

    let services = Arc::new(Services::new(
        Arc::new(SqliteTelemetryStore::new(conn.clone())),
        Arc::new(SqliteTransactionStore::new(conn.clone())),
        Arc::new(SqliteMetadataStore::new(conn.clone())),
        Arc::new(SqliteAnalyticsStore::new(conn)),
        Arc::new(MemoryResultCache::new()),
        3_600, // hourly sampling
    ));

    let node_ids = vec!["n1".to_string(), "n2".to_string()];
    let portfolio = services
        .engine
        .compute_portfolio_analytics(&node_ids, BASE, BASE + 24 * 3_600)
        .await
        .unwrap();

    assert_eq!(portfolio.node_count, 2);
    assert!(portfolio.failures.is_empty());
    assert!((portfolio.total_capacity_kw - 1_000.0).abs() < 1e-9);
    assert!((portfolio.total_generation_kwh - 12_000.0).abs() < 1e-6);
    assert!((portfolio.capacity_factor - 0.5).abs() < 1e-9);
    assert!((portfolio.diversification_index - 1.0).abs() < 1e-9);
    assert!((portfolio.total_revenue - 800.0).abs() < 1e-9);

    // Cached portfolio read path returns the same snapshot on a hit
    let analytics = AnalyticsService::new(Arc::clone(&services));
    let first = analytics
        .portfolio_analytics(&node_ids, BASE, BASE + 24 * 3_600)
        .await
        .unwrap();
    let second = analytics
        .portfolio_analytics(&node_ids, BASE, BASE + 24 * 3_600)
        .await
        .unwrap();
    assert_eq!(first.total_generation_kwh, second.total_generation_kwh);
    assert_eq!(first.node_count, second.node_count);
}

#[tokio::test]
async fn test_monthly_native_aggregation_over_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let conn = open_database(dir.path().join("gridflow.db")).unwrap();

    // November 2023, one reading every 2 hours
    let month_start = 1_698_796_800; // 2023-11-01T00:00:00Z
    for i in 0..360 {
        seed_reading(&conn, "n1", month_start + i * 7_200, 120.0, None);
    }

    let services = build_services(conn);
    let monthly = services
        .engine
        .compute_monthly_analytics("n1", 2023, 11)
        .await
        .unwrap();

    assert_eq!(monthly.sample_count, 360);
    // 360 samples x 120 kW at one-minute assumed cadence = 720 kWh
    assert!((monthly.total_generation_kwh - 720.0).abs() < 1e-6);
    assert!((monthly.avg_power_kw - 120.0).abs() < 1e-9);
    assert_eq!(monthly.avg_efficiency, Some(0.9));
}
