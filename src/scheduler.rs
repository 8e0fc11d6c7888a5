/// Interval-driven runs for `serve` mode.
///
/// Ticks go through the same check-and-set as the HTTP trigger, so a tick
/// that lands while a run is active is skipped rather than queued.
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::handlers::{start_run, AppState};

/// One scheduler tick. `None` when the tick was skipped.
pub async fn tick(state: &Arc<AppState>) -> Option<JoinHandle<()>> {
    match start_run(state, "schedule").await {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::info!("Scheduled run skipped: {}", e);
            None
        }
    }
}

/// Runs the pipeline every `period` until `shutdown` fires. The first tick
/// is immediate.
pub async fn run_every(state: Arc<AppState>, period: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    // A long run swallows ticks instead of causing a burst afterwards
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!("📅 Scheduled runs every {}s", period.as_secs());

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                tick(&state).await;
            }
        }
    }
    tracing::info!("Scheduler stopped");
}
