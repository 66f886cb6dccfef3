//! Backup command

use anyhow::{bail, Context, Result};
use clap::Args;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};
use vacuum_coordinator::{Coordinator, NodeOutcome, ReplicationTier};

use super::common::print_json;

/// Replicate one file across the registered nodes
#[derive(Args)]
pub struct BackupCommand {
    /// File to back up
    pub file: PathBuf,

    /// Metadata entry attached to the report (repeatable)
    #[arg(short, long = "meta", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub metadata: Vec<(String, String)>,
}

/// Parse a `KEY=VALUE` pair.
pub fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Handle backup command execution
pub async fn handle_backup_command(
    cmd: BackupCommand,
    coordinator: &Coordinator,
    json: bool,
) -> Result<()> {
    let payload = tokio::fs::read(&cmd.file)
        .await
        .with_context(|| format!("Failed to read {}", cmd.file.display()))?;

    let mut metadata: BTreeMap<String, String> = cmd.metadata.into_iter().collect();
    metadata
        .entry("source".to_string())
        .or_insert_with(|| cmd.file.display().to_string());

    info!(file = %cmd.file.display(), size = payload.len(), "Starting backup");
    let report = coordinator.backup(&payload, metadata).await;

    if json {
        print_json(&report)?;
    } else {
        println!("Payload: {}", report.payload_hash);
        println!("Size: {} bytes", report.size_bytes);
        println!("Tier: {}", report.tier);
        for result in &report.per_node_results {
            match &result.outcome {
                NodeOutcome::Succeeded => {
                    println!("  {:<12} {:<14} ok", result.node_id.as_str(), result.backend_class.to_string())
                }
                NodeOutcome::Failed { error, .. } => println!(
                    "  {:<12} {:<14} failed: {error}",
                    result.node_id.as_str(),
                    result.backend_class.to_string()
                ),
            }
        }
    }

    match report.tier {
        ReplicationTier::Vacuum => Ok(()),
        ReplicationTier::Partial => {
            warn!(classes = report.succeeded_classes.len(), "Backup reached a single backend class");
            Ok(())
        }
        ReplicationTier::Failed => bail!("backup failed on every node"),
    }
}
