//! Command-line adapter for the vacuum backup coordinator
//!
//! Operates a local coordinator whose backends are directories under the
//! configured data dir. Registry and anchor chain persist between runs in a
//! JSON state file.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod backend;
mod commands;
mod state;

use commands::{
    backup::{handle_backup_command, BackupCommand},
    common,
    maintenance,
    run::{handle_run_command, RunCommand},
    status,
};

#[derive(Parser)]
#[command(name = "vacuum")]
#[command(about = "Vacuum - multi-backend backup coordinator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true, default_value = "vacuum.toml")]
    config: PathBuf,

    /// State file path
    #[arg(short, long, global = true, default_value = "vacuum-state.json")]
    state: PathBuf,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show registry, escalation and anchor status
    Status,

    /// Replicate a file across every registered node
    Backup(BackupCommand),

    /// Reconcile node health and anchor the registry
    Sync,

    /// Even out utilisation across backend classes
    Rebalance,

    /// Evaluate the compliance principles
    Compliance,

    /// Run the periodic sync loop
    Run(RunCommand),
}

impl Commands {
    fn mutates_state(&self) -> bool {
        !matches!(self, Commands::Status | Commands::Compliance)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    let coordinator = common::open_coordinator(&cli.config, &cli.state).await?;
    let mutates = cli.command.mutates_state();

    let outcome = match cli.command {
        Commands::Status => status::show_status(&coordinator, cli.json),
        Commands::Backup(cmd) => handle_backup_command(cmd, &coordinator, cli.json).await,
        Commands::Sync => maintenance::handle_sync(&coordinator, cli.json).await,
        Commands::Rebalance => maintenance::handle_rebalance(&coordinator, cli.json).await,
        Commands::Compliance => maintenance::handle_compliance(&coordinator, cli.json),
        Commands::Run(cmd) => handle_run_command(cmd, &coordinator, cli.json).await,
    };

    coordinator.flush_audit().await;
    if mutates {
        common::save_coordinator(&coordinator, &cli.state).await?;
    }
    outcome
}
