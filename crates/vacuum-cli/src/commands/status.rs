//! Status display

use anyhow::Result;
use vacuum_coordinator::Coordinator;

use super::common::print_json;

/// Print registry, escalation and anchor status.
pub fn show_status(coordinator: &Coordinator, json: bool) -> Result<()> {
    let status = coordinator.status();
    if json {
        return print_json(&status);
    }

    let stats = &status.statistics;
    println!("Vacuum Coordinator Status");
    println!("=========================");
    println!(
        "Nodes: {} ({} active, {} degraded, {} failed, {} sealed)",
        stats.total_nodes,
        stats.active_nodes,
        stats.degraded_nodes,
        stats.failed_nodes,
        stats.sealed_nodes
    );
    println!(
        "Usage: {} / {} bytes",
        stats.total_used_bytes, stats.total_capacity_bytes
    );
    println!("Overflow state: {:?}", status.overflow_state);
    println!("Active vetoes: {}", status.active_vetoes);
    println!("Pending validations: {}", status.pending_validations);
    match &status.anchor_head {
        Some(head) => println!("Anchor head: #{} {}", head.sequence, head.entry_hash),
        None => println!("Anchor head: none"),
    }

    println!();
    for node in &status.nodes {
        println!(
            "  {:<12} {:<14} {:<9} {:>6.2}%  {}{}",
            node.id.as_str(),
            node.backend_class.to_string(),
            node.status.to_string(),
            node.utilization() * 100.0,
            node.region,
            if node.is_primary { " (primary)" } else { "" }
        );
    }
    Ok(())
}
