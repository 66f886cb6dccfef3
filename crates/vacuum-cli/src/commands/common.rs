//! Common utilities for CLI commands

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use vacuum_coordinator::Coordinator;
use vacuum_core::CoordinatorConfig;

use crate::backend::DirectoryBackend;
use crate::state::{self, PersistedState};

/// Build a coordinator from the config file and resume persisted state.
///
/// A missing config file means defaults; a missing state file means the
/// configured seed set and an empty anchor chain.
pub async fn open_coordinator(config_path: &Path, state_path: &Path) -> Result<Arc<Coordinator>> {
    let config = CoordinatorConfig::load(Some(config_path))
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    let backend = Arc::new(DirectoryBackend::new(config.data_dir.clone()));

    let mut builder = Coordinator::builder().with_backend(backend);
    match state::load(state_path).await? {
        Some(persisted) => {
            debug!(
                nodes = persisted.nodes.len(),
                anchors = persisted.anchors.len(),
                "Resuming persisted state"
            );
            builder = builder
                .with_nodes(persisted.nodes)
                .with_anchors(persisted.anchors);
        }
        None => info!(state = %state_path.display(), "No state file, starting from seed nodes"),
    }

    let coordinator = builder.with_config(config).build()?;
    Ok(Arc::new(coordinator))
}

/// Persist the coordinator's registry and anchor chain.
pub async fn save_coordinator(coordinator: &Coordinator, state_path: &Path) -> Result<()> {
    state::save(state_path, &PersistedState::capture(coordinator)).await?;
    debug!(state = %state_path.display(), "State saved");
    Ok(())
}

/// Print `value` as pretty JSON.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
