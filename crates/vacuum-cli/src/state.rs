//! JSON persistence of the registry and anchor chain between CLI runs.
//!
//! Veto and validation state is not persisted; every run starts with a
//! `Normal` escalation state and no open validations.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use vacuum_coordinator::{AnchorEntry, Coordinator};
use vacuum_core::Node;

/// On-disk state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Registry snapshot in registration order
    pub nodes: Vec<Node>,
    /// Anchor chain from genesis
    #[serde(default)]
    pub anchors: Vec<AnchorEntry>,
}

impl PersistedState {
    /// Capture the coordinator's current registry and chain.
    pub fn capture(coordinator: &Coordinator) -> Self {
        Self {
            nodes: coordinator.registry().snapshot(),
            anchors: coordinator.anchors().entries(),
        }
    }
}

/// Read the state file. A missing file yields `None`.
pub async fn load(path: &Path) -> Result<Option<PersistedState>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read state {}", path.display()))
        }
    };
    let state = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse state {}", path.display()))?;
    Ok(Some(state))
}

/// Write the state file via a sibling temp file and rename.
pub async fn save(path: &Path, state: &PersistedState) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let json = serde_json::to_vec_pretty(state)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
