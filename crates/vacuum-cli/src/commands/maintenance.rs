//! Sync, rebalance and compliance commands

use anyhow::{bail, Result};
use tracing::info;
use vacuum_coordinator::Coordinator;

use super::common::print_json;

/// Run one synchronisation pass.
pub async fn handle_sync(coordinator: &Coordinator, json: bool) -> Result<()> {
    let report = coordinator.synchronize().await?;
    if json {
        return print_json(&report);
    }

    println!("Synced at {}", report.synced_at.to_rfc3339());
    for (status, count) in &report.status_counts {
        println!("  {status}: {count}");
    }
    for change in &report.changes {
        println!("  {} {} -> {}", change.node_id, change.from, change.to);
    }
    println!(
        "Anchor #{} {}",
        report.anchor.sequence, report.anchor.entry_hash
    );
    if !report.compliance.all_passed() {
        println!("Failing principles: {:?}", report.compliance.failing());
    }
    Ok(())
}

/// Run one rebalance pass.
pub async fn handle_rebalance(coordinator: &Coordinator, json: bool) -> Result<()> {
    let report = coordinator.rebalance().await?;
    info!(adjusted = report.adjustments.len(), "Rebalance complete");
    if json {
        return print_json(&report);
    }

    println!(
        "Target utilisation: {:.4}",
        report.plan.target_utilization
    );
    println!(
        "Balance coefficient: {:.6} -> {:.6}",
        report.coefficient_before, report.coefficient_after
    );
    for adjustment in &report.adjustments {
        println!(
            "  {:<12} {} -> {} bytes",
            adjustment.node_id.as_str(),
            adjustment.before_bytes,
            adjustment.after_bytes
        );
    }
    Ok(())
}

/// Evaluate compliance; fails when any principle does not hold.
pub fn handle_compliance(coordinator: &Coordinator, json: bool) -> Result<()> {
    let report = coordinator.evaluate_compliance();
    if json {
        print_json(&report)?;
    } else {
        for (principle, passed) in &report.principles {
            println!("  {:<24} {}", principle.to_string(), if *passed { "pass" } else { "FAIL" });
        }
    }

    if report.all_passed() {
        Ok(())
    } else {
        bail!("compliance failed: {:?}", report.failing())
    }
}
