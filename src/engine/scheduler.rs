//! Periodic recomputation of the trailing fleet window
//!
//! A single cooperative timer task. Every cadence tick spawns an
//! independent task that runs the fleet ETL and contains its own failure:
//! a failed tick logs and the scheduler moves on to the next cadence. No
//! state is carried between ticks besides the shared service handles.
//!
//! There is no overlap protection. If a tick's work outlives the cadence,
//! the next tick starts concurrently; the analytics store upsert is
//! idempotent on (node, period), so overlap costs duplicate work, not
//! corruption. Missed windows are never backfilled - the next tick covers
//! a newer window, and historical gaps stay until a manual trigger with
//! explicit bounds fills them.

use crate::engine::service::{run_fleet_etl, Services};
use std::sync::Arc;
use tokio::time::{interval, Duration};

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Tick cadence (default: every 5 minutes)
    pub cadence: Duration,
    /// Trailing window recomputed on each tick
    pub window_minutes: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cadence: Duration::from_secs(300),
            window_minutes: 5,
        }
    }
}

/// Run the ETL scheduler until the task is dropped or aborted
pub async fn etl_scheduler_task(services: Arc<Services>, config: SchedulerConfig) {
    log::info!(
        "⏰ Starting ETL scheduler (cadence: {}s, trailing window: {}m)",
        config.cadence.as_secs(),
        config.window_minutes
    );

    let mut timer = interval(config.cadence);

    loop {
        timer.tick().await;

        let services = Arc::clone(&services);
        let window_minutes = config.window_minutes;

        // Fire-and-forget: each tick is its own task with a local catch
        tokio::spawn(async move {
            match run_fleet_etl(&services, window_minutes).await {
                Ok(result) => {
                    log::debug!(
                        "⏰ ETL tick wrote {} ({} rows)",
                        result.period,
                        result.row_count
                    );
                }
                Err(e) => {
                    log::error!("❌ ETL tick failed, waiting for next cadence: {}", e);
                }
            }
        });
    }
}
