//! SQLite-backed store implementations
//!
//! One struct per store boundary, all sharing a single connection handle
//! opened once at startup. Schema bootstrap is idempotent (every statement
//! uses IF NOT EXISTS) and enables WAL mode for concurrent readers.
//!
//! The raw stores (telemetry, transactions, metadata) are read-only from
//! this crate's point of view: the ingestion pipeline owns the writes.
//! Only the analytics store writes, via the (node_id, period) upsert.

use super::{
    AnalyticsStore, MetadataStore, PowerSummary, StoreError, TelemetryStore, TransactionStore,
};
use crate::engine::types::{
    AggregateResult, Financials, NodeMetadata, TelemetryReading, TransactionRecord,
    TransactionStatus,
};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS telemetry_readings (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    node_id             TEXT NOT NULL,
    timestamp           INTEGER NOT NULL,
    power_output_kw     REAL NOT NULL,
    efficiency          REAL,
    extra_metrics_json  TEXT
);
CREATE INDEX IF NOT EXISTS idx_telemetry_node_ts
    ON telemetry_readings (node_id, timestamp);

CREATE TABLE IF NOT EXISTS transactions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    node_id     TEXT NOT NULL,
    timestamp   INTEGER NOT NULL,
    status      TEXT NOT NULL,
    revenue     REAL NOT NULL,
    costs       REAL NOT NULL,
    profit      REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_transactions_node_ts
    ON transactions (node_id, timestamp);

CREATE TABLE IF NOT EXISTS node_metadata (
    node_id             TEXT PRIMARY KEY,
    rated_capacity_kw   REAL NOT NULL,
    technology_type     TEXT NOT NULL,
    region              TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS analytics_results (
    node_id         TEXT NOT NULL,
    period          TEXT NOT NULL,
    start_ts        INTEGER NOT NULL,
    end_ts          INTEGER NOT NULL,
    metrics_json    TEXT NOT NULL,
    row_count       INTEGER NOT NULL,
    generated_at    INTEGER NOT NULL,
    PRIMARY KEY (node_id, period)
);
"#;

/// Shared connection handle used by all four store structs
pub type SharedConnection = Arc<Mutex<Connection>>;

/// Open (or create) the database, enable WAL, and run the schema bootstrap
pub fn open_database(db_path: impl AsRef<Path>) -> Result<SharedConnection, StoreError> {
    let conn = Connection::open(db_path)?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    conn.execute_batch(SCHEMA_SQL)?;
    log::info!("📊 SQLite database ready (WAL mode, schema bootstrapped)");

    Ok(Arc::new(Mutex::new(conn)))
}

pub struct SqliteTelemetryStore {
    conn: SharedConnection,
}

impl SqliteTelemetryStore {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl TelemetryStore for SqliteTelemetryStore {
    async fn fetch_range(
        &self,
        node_id: Option<&str>,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<Vec<TelemetryReading>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT node_id, timestamp, power_output_kw, efficiency, extra_metrics_json
             FROM telemetry_readings
             WHERE (?1 IS NULL OR node_id = ?1)
               AND timestamp >= ?2 AND timestamp < ?3
             ORDER BY timestamp ASC",
        )?;

        let rows = stmt.query_map(rusqlite::params![node_id, start_ts, end_ts], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, Option<f64>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        let mut readings = Vec::new();
        for row in rows {
            let (node_id, timestamp, power_output_kw, efficiency, bag_json) = row?;
            let extra_metrics: BTreeMap<String, f64> = match bag_json {
                Some(json) => serde_json::from_str(&json)?,
                None => BTreeMap::new(),
            };
            readings.push(TelemetryReading {
                node_id,
                timestamp,
                power_output_kw,
                efficiency,
                extra_metrics,
            });
        }

        Ok(readings)
    }

    async fn aggregate_power(
        &self,
        node_id: &str,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<PowerSummary, StoreError> {
        let conn = self.conn.lock().unwrap();
        let summary = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(power_output_kw), 0.0),
                    COALESCE(AVG(power_output_kw), 0.0),
                    COALESCE(MIN(power_output_kw), 0.0),
                    COALESCE(MAX(power_output_kw), 0.0),
                    AVG(efficiency)
             FROM telemetry_readings
             WHERE node_id = ?1 AND timestamp >= ?2 AND timestamp < ?3",
            rusqlite::params![node_id, start_ts, end_ts],
            |row| {
                Ok(PowerSummary {
                    sample_count: row.get::<_, i64>(0)? as u64,
                    total_power_kw: row.get(1)?,
                    avg_power_kw: row.get(2)?,
                    min_power_kw: row.get(3)?,
                    max_power_kw: row.get(4)?,
                    avg_efficiency: row.get(5)?,
                })
            },
        )?;

        Ok(summary)
    }
}

pub struct SqliteTransactionStore {
    conn: SharedConnection,
}

impl SqliteTransactionStore {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl TransactionStore for SqliteTransactionStore {
    async fn fetch_range(
        &self,
        node_id: Option<&str>,
        start_ts: i64,
        end_ts: i64,
        status: Option<TransactionStatus>,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT node_id, timestamp, status, revenue, costs, profit
             FROM transactions
             WHERE (?1 IS NULL OR node_id = ?1)
               AND timestamp >= ?2 AND timestamp < ?3
               AND (?4 IS NULL OR status = ?4)
             ORDER BY timestamp ASC",
        )?;

        let status_str = status.map(|s| s.as_str());
        let rows = stmt.query_map(
            rusqlite::params![node_id, start_ts, end_ts, status_str],
            |row| {
                let status_raw: String = row.get(2)?;
                let status = TransactionStatus::parse(&status_raw)
                    .ok_or(rusqlite::Error::InvalidQuery)?;
                Ok(TransactionRecord {
                    node_id: row.get(0)?,
                    timestamp: row.get(1)?,
                    status,
                    financial: Financials {
                        revenue: row.get(3)?,
                        costs: row.get(4)?,
                        profit: row.get(5)?,
                    },
                })
            },
        )?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}

pub struct SqliteMetadataStore {
    conn: SharedConnection,
}

impl SqliteMetadataStore {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }
}

fn metadata_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NodeMetadata> {
    Ok(NodeMetadata {
        node_id: row.get(0)?,
        rated_capacity_kw: row.get(1)?,
        technology_type: row.get(2)?,
        region: row.get(3)?,
    })
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn get(&self, node_id: &str) -> Result<Option<NodeMetadata>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let metadata = conn
            .query_row(
                "SELECT node_id, rated_capacity_kw, technology_type, region
                 FROM node_metadata WHERE node_id = ?1",
                [node_id],
                metadata_from_row,
            )
            .optional()?;
        Ok(metadata)
    }

    async fn list_nodes(&self) -> Result<Vec<NodeMetadata>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT node_id, rated_capacity_kw, technology_type, region
             FROM node_metadata ORDER BY node_id ASC",
        )?;
        let rows = stmt.query_map([], metadata_from_row)?;

        let mut nodes = Vec::new();
        for row in rows {
            nodes.push(row?);
        }
        Ok(nodes)
    }
}

pub struct SqliteAnalyticsStore {
    conn: SharedConnection,
}

impl SqliteAnalyticsStore {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }
}

fn result_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(AggregateResult, String)> {
    let metrics_json: String = row.get(4)?;
    Ok((
        AggregateResult {
            node_id: row.get(0)?,
            period: row.get(1)?,
            start_ts: row.get(2)?,
            end_ts: row.get(3)?,
            metrics: BTreeMap::new(),
            row_count: row.get::<_, i64>(5)? as u64,
            generated_at: row.get(6)?,
        },
        metrics_json,
    ))
}

#[async_trait]
impl AnalyticsStore for SqliteAnalyticsStore {
    async fn upsert(&self, result: &AggregateResult) -> Result<(), StoreError> {
        let metrics_json = serde_json::to_string(&result.metrics)?;
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO analytics_results (
                node_id, period, start_ts, end_ts, metrics_json, row_count, generated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(node_id, period) DO UPDATE SET
                start_ts = excluded.start_ts,
                end_ts = excluded.end_ts,
                metrics_json = excluded.metrics_json,
                row_count = excluded.row_count,
                generated_at = excluded.generated_at",
            rusqlite::params![
                result.node_id,
                result.period,
                result.start_ts,
                result.end_ts,
                metrics_json,
                result.row_count as i64,
                result.generated_at,
            ],
        )?;

        Ok(())
    }

    async fn get(
        &self,
        node_id: &str,
        period: &str,
    ) -> Result<Option<AggregateResult>, StoreError> {
        let row = {
            let conn = self.conn.lock().unwrap();
            conn.query_row(
                "SELECT node_id, period, start_ts, end_ts, metrics_json, row_count, generated_at
                 FROM analytics_results WHERE node_id = ?1 AND period = ?2",
                [node_id, period],
                result_from_row,
            )
            .optional()?
        };

        match row {
            Some((mut result, metrics_json)) => {
                result.metrics = serde_json::from_str(&metrics_json)?;
                Ok(Some(result))
            }
            None => Ok(None),
        }
    }

    async fn list_by_node(
        &self,
        node_id: &str,
        limit: u32,
    ) -> Result<Vec<AggregateResult>, StoreError> {
        let rows = {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT node_id, period, start_ts, end_ts, metrics_json, row_count, generated_at
                 FROM analytics_results
                 WHERE node_id = ?1
                 ORDER BY generated_at DESC
                 LIMIT ?2",
            )?;
            let mapped = stmt.query_map(rusqlite::params![node_id, limit], result_from_row)?;

            let mut rows = Vec::new();
            for row in mapped {
                rows.push(row?);
            }
            rows
        };

        let mut results = Vec::with_capacity(rows.len());
        for (mut result, metrics_json) in rows {
            result.metrics = serde_json::from_str(&metrics_json)?;
            results.push(result);
        }
        Ok(results)
    }
}
