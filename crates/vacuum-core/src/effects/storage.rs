//! Storage backend effect.
//!
//! The coordinator never talks to a real backend directly; it calls
//! `StorageBackend::write` once per registered node and classifies the
//! outcome. Transport, retries and encryption are the implementor's concern.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::NodeId;

/// Error type for storage backend writes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum StorageBackendError {
    /// Backend could not be reached
    #[error("Backend unavailable: {reason}")]
    Unavailable {
        /// Failure detail
        reason: String,
    },
    /// Backend was reached but refused the write
    #[error("Write rejected: {reason}")]
    Rejected {
        /// Failure detail
        reason: String,
    },
    /// Backend did not answer within its own deadline
    #[error("Timeout after {timeout_ms}ms")]
    Timeout {
        /// Deadline that elapsed
        timeout_ms: u64,
    },
}

/// Write capability for one pool of backend nodes.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Persist `bytes` on `node_id` under `payload_hash`.
    async fn write(
        &self,
        node_id: &NodeId,
        payload_hash: &str,
        bytes: &[u8],
    ) -> Result<(), StorageBackendError>;
}
