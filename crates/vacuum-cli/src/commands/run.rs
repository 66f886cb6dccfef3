//! Periodic sync loop

use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use vacuum_coordinator::{Coordinator, SyncScheduler};

use super::common::print_json;

/// Run the sync scheduler in the foreground
#[derive(Args)]
pub struct RunCommand {
    /// Stop after this many ticks (runs until Ctrl-C otherwise)
    #[arg(long)]
    pub ticks: Option<u64>,

    /// Override the configured tick interval
    #[arg(long)]
    pub interval_secs: Option<u64>,
}

/// Handle run command execution
pub async fn handle_run_command(
    cmd: RunCommand,
    coordinator: &Arc<Coordinator>,
    json: bool,
) -> Result<()> {
    let config = coordinator.config();
    let interval = Duration::from_secs(cmd.interval_secs.unwrap_or(config.sync_interval_secs));
    let rebalance_every = config.rebalance_every_ticks;

    let stats = match cmd.ticks {
        Some(ticks) => {
            SyncScheduler::run_ticks(Arc::clone(coordinator), interval, rebalance_every, ticks).await
        }
        None => {
            let handle = SyncScheduler::spawn(Arc::clone(coordinator), interval, rebalance_every);
            info!("Scheduler running, press Ctrl-C to stop");
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            info!("Shutting down scheduler");
            handle.shutdown().await
        }
    };

    if json {
        print_json(&stats)?;
    } else {
        println!(
            "Ticks: {}  syncs: {}  rebalances: {}  failures: {}",
            stats.ticks, stats.syncs, stats.rebalances, stats.failures
        );
        if let Some(sequence) = stats.last_anchor {
            println!("Last anchor: #{sequence}");
        }
    }
    Ok(())
}
