//! Directory-backed storage backend.
//!
//! Each node maps to a subdirectory of the data dir and each payload to a
//! file named by its hash, so repeated writes of the same payload overwrite
//! in place.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;
use vacuum_core::{NodeId, StorageBackend, StorageBackendError};

/// Writes payloads to `<root>/<node_id>/<payload_hash>`.
#[derive(Debug, Clone)]
pub struct DirectoryBackend {
    root: PathBuf,
}

impl DirectoryBackend {
    /// Backend rooted at `root`. Directories are created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path a payload lands at.
    pub fn payload_path(&self, node_id: &NodeId, payload_hash: &str) -> PathBuf {
        self.root.join(node_id.as_str()).join(payload_hash)
    }
}

fn is_plain_component(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\'])
        && Path::new(segment).components().count() == 1
}

#[async_trait]
impl StorageBackend for DirectoryBackend {
    async fn write(
        &self,
        node_id: &NodeId,
        payload_hash: &str,
        bytes: &[u8],
    ) -> Result<(), StorageBackendError> {
        for segment in [node_id.as_str(), payload_hash] {
            if !is_plain_component(segment) {
                return Err(StorageBackendError::Rejected {
                    reason: format!("'{segment}' is not a valid path segment"),
                });
            }
        }

        let path = self.payload_path(node_id, payload_hash);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| StorageBackendError::Unavailable {
                    reason: format!("create {}: {e}", dir.display()),
                })?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StorageBackendError::Unavailable {
                reason: format!("write {}: {e}", path.display()),
            })?;

        debug!(node_id = %node_id, path = %path.display(), size = bytes.len(), "Payload written");
        Ok(())
    }
}
