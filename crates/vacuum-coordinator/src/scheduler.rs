//! Periodic sync scheduler.
//!
//! Drives `Coordinator::synchronize` on a fixed interval and
//! `Coordinator::rebalance` on every Nth tick. Failures are logged and the
//! loop carries on.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::coordinator::Coordinator;

/// Counters accumulated by a scheduler loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatistics {
    /// Ticks processed
    pub ticks: u64,
    /// Successful synchronisations
    pub syncs: u64,
    /// Successful rebalances
    pub rebalances: u64,
    /// Operations that returned an error
    pub failures: u64,
    /// Sequence of the most recent anchor
    pub last_anchor: Option<u64>,
}

/// Handle to a running scheduler task.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<SchedulerStatistics>,
}

impl SchedulerHandle {
    /// Stop the loop after its current tick and return its counters.
    pub async fn shutdown(self) -> SchedulerStatistics {
        let _ = self.shutdown_tx.send(true);
        match self.task.await {
            Ok(stats) => stats,
            Err(error) => {
                warn!(error = %error, "Scheduler task did not finish cleanly");
                SchedulerStatistics::default()
            }
        }
    }

    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawns and runs the periodic sync loop.
pub struct SyncScheduler;

impl SyncScheduler {
    /// Spawn a loop that runs until `shutdown` is called.
    pub fn spawn(
        coordinator: Arc<Coordinator>,
        interval: Duration,
        rebalance_every: u64,
    ) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_loop(
            coordinator,
            interval,
            rebalance_every,
            None,
            shutdown_rx,
        ));
        SchedulerHandle { shutdown_tx, task }
    }

    /// Run exactly `ticks` ticks in the current task.
    pub async fn run_ticks(
        coordinator: Arc<Coordinator>,
        interval: Duration,
        rebalance_every: u64,
        ticks: u64,
    ) -> SchedulerStatistics {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        run_loop(coordinator, interval, rebalance_every, Some(ticks), shutdown_rx).await
    }
}

async fn run_loop(
    coordinator: Arc<Coordinator>,
    interval: Duration,
    rebalance_every: u64,
    max_ticks: Option<u64>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> SchedulerStatistics {
    let rebalance_every = rebalance_every.max(1);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut stats = SchedulerStatistics::default();
    info!(?interval, rebalance_every, ?max_ticks, "Sync scheduler started");

    loop {
        if max_ticks.is_some_and(|max| stats.ticks >= max) || *shutdown_rx.borrow() {
            break;
        }
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = ticker.tick() => {}
        }
        stats.ticks += 1;
        debug!(tick = stats.ticks, "Scheduler tick");

        match coordinator.synchronize().await {
            Ok(report) => {
                stats.syncs += 1;
                stats.last_anchor = Some(report.anchor.sequence);
            }
            Err(error) => {
                stats.failures += 1;
                warn!(tick = stats.ticks, error = %error, "Synchronization failed");
            }
        }

        if stats.ticks % rebalance_every == 0 {
            match coordinator.rebalance().await {
                Ok(_) => stats.rebalances += 1,
                Err(error) => {
                    stats.failures += 1;
                    warn!(tick = stats.ticks, error = %error, "Rebalance failed");
                }
            }
        }
    }

    info!(
        ticks = stats.ticks,
        syncs = stats.syncs,
        rebalances = stats.rebalances,
        failures = stats.failures,
        "Sync scheduler stopped"
    );
    stats
}
