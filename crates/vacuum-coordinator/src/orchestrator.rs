//! Backup orchestrator
//!
//! Fans a payload out to every registered node and classifies the result.
//!
//! A backup runs in two phases:
//! 1. Reservation: usage is reserved on each node in registration order. A
//!    node without room fails with `CapacityExceeded` and is not written.
//! 2. Write: all reserved nodes are written concurrently, each bounded by the
//!    configured timeout. A failed or timed-out write releases its
//!    reservation.
//!
//! Node status is left alone; health follows utilisation and is
//! recomputed by synchronisation.
//!
//! Per-node failures never fail the backup as a whole; they are reported in
//! `BackupReport::per_node_results` and reflected in the replication tier.
//! Dropping the backup future mid-write leaves committed reservations in
//! place.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use vacuum_core::{
    hash::sha256_hex, BackendClass, Clock, CoordinatorError, Node, NodeId, StorageBackend,
};

use crate::registry::NodeRegistry;

/// Replication tier reached by a backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationTier {
    /// Stored on nodes of at least two distinct backend classes
    Vacuum,
    /// Stored somewhere, but on a single backend class
    Partial,
    /// Stored nowhere
    Failed,
}

impl ReplicationTier {
    /// Tier for a backup that succeeded on `succeeded_nodes` nodes spanning
    /// `succeeded_classes`.
    pub fn classify(succeeded_classes: &BTreeSet<BackendClass>, succeeded_nodes: usize) -> Self {
        if succeeded_classes.len() >= 2 {
            ReplicationTier::Vacuum
        } else if succeeded_nodes >= 1 {
            ReplicationTier::Partial
        } else {
            ReplicationTier::Failed
        }
    }
}

impl fmt::Display for ReplicationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReplicationTier::Vacuum => "vacuum",
            ReplicationTier::Partial => "partial",
            ReplicationTier::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a node did not receive the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    /// Node had no room for the payload
    CapacityExceeded,
    /// Backend write failed or timed out
    BackendError,
}

/// Outcome of the backup on one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeOutcome {
    /// Payload stored
    Succeeded,
    /// Payload not stored
    Failed {
        /// Failure class
        reason: FailureReason,
        /// Underlying error
        error: CoordinatorError,
    },
}

impl NodeOutcome {
    /// Whether the payload was stored.
    pub fn is_success(&self) -> bool {
        matches!(self, NodeOutcome::Succeeded)
    }
}

/// Backup result for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeBackupResult {
    /// Node written to
    pub node_id: NodeId,
    /// Node's backend class
    pub backend_class: BackendClass,
    /// What happened
    pub outcome: NodeOutcome,
}

/// Result of one backup fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupReport {
    /// SHA-256 of the payload
    pub payload_hash: String,
    /// Payload length
    pub size_bytes: u64,
    /// One entry per registered node, in registration order
    pub per_node_results: Vec<NodeBackupResult>,
    /// Tier reached
    pub tier: ReplicationTier,
    /// Distinct backend classes that stored the payload
    pub succeeded_classes: BTreeSet<BackendClass>,
    /// Caller-supplied metadata, echoed back
    pub metadata: BTreeMap<String, String>,
}

impl BackupReport {
    /// Nodes that stored the payload.
    pub fn succeeded(&self) -> impl Iterator<Item = &NodeBackupResult> {
        self.per_node_results
            .iter()
            .filter(|r| r.outcome.is_success())
    }

    /// Nodes that did not store the payload.
    pub fn failed(&self) -> impl Iterator<Item = &NodeBackupResult> {
        self.per_node_results
            .iter()
            .filter(|r| !r.outcome.is_success())
    }
}

enum Reservation {
    Reserved(Node),
    Rejected(Node, CoordinatorError),
}

/// Replicates payloads across the registry.
pub struct BackupOrchestrator {
    registry: Arc<NodeRegistry>,
    backend: Arc<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
    write_timeout: Duration,
}

impl BackupOrchestrator {
    /// Create an orchestrator writing through `backend`.
    pub fn new(
        registry: Arc<NodeRegistry>,
        backend: Arc<dyn StorageBackend>,
        clock: Arc<dyn Clock>,
        write_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            backend,
            clock,
            write_timeout,
        }
    }

    /// Replicate `payload` to every registered node.
    pub async fn backup(
        &self,
        payload: &[u8],
        metadata: BTreeMap<String, String>,
    ) -> BackupReport {
        let payload_hash = sha256_hex(payload);
        let size_bytes = payload.len() as u64;
        debug!(hash = %payload_hash, size_bytes, "Starting backup");

        let reservations: Vec<Reservation> = self
            .registry
            .snapshot()
            .into_iter()
            .map(|node| match self.registry.apply_usage(&node.id, size_bytes) {
                Ok(_) => Reservation::Reserved(node),
                Err(error) => Reservation::Rejected(node, error),
            })
            .collect();

        let writes = reservations.into_iter().map(|reservation| {
            let payload_hash = payload_hash.as_str();
            async move {
                match reservation {
                    Reservation::Reserved(node) => {
                        self.write_one(node, payload_hash, payload, size_bytes).await
                    }
                    Reservation::Rejected(node, error) => {
                        warn!(node_id = %node.id, error = %error, "Node has no room for payload");
                        let result = NodeBackupResult {
                            node_id: node.id,
                            backend_class: node.backend_class,
                            outcome: NodeOutcome::Failed {
                                reason: FailureReason::CapacityExceeded,
                                error,
                            },
                        };
                        result
                    }
                }
            }
        });
        let per_node_results: Vec<NodeBackupResult> = join_all(writes).await;

        let succeeded_classes: BTreeSet<BackendClass> = per_node_results
            .iter()
            .filter(|r| r.outcome.is_success())
            .map(|r| r.backend_class)
            .collect();
        let succeeded_nodes = per_node_results
            .iter()
            .filter(|r| r.outcome.is_success())
            .count();
        let tier = ReplicationTier::classify(&succeeded_classes, succeeded_nodes);

        info!(
            hash = %payload_hash,
            size_bytes,
            tier = %tier,
            succeeded = succeeded_nodes,
            attempted = per_node_results.len(),
            "Backup completed"
        );

        BackupReport {
            payload_hash,
            size_bytes,
            per_node_results,
            tier,
            succeeded_classes,
            metadata,
        }
    }

    async fn write_one(
        &self,
        node: Node,
        payload_hash: &str,
        payload: &[u8],
        size_bytes: u64,
    ) -> NodeBackupResult {
        let timeout_ms = self.write_timeout.as_millis() as u64;
        let write = self.backend.write(&node.id, payload_hash, payload);
        let error = match tokio::time::timeout(self.write_timeout, write).await {
            Ok(Ok(())) => {
                if let Err(error) = self.registry.mark_synced(&node.id, self.clock.now()) {
                    warn!(node_id = %node.id, error = %error, "Could not record sync time");
                }
                return NodeBackupResult {
                    node_id: node.id,
                    backend_class: node.backend_class,
                    outcome: NodeOutcome::Succeeded,
                };
            }
            Ok(Err(error)) => CoordinatorError::backend(node.id.as_str(), error.to_string()),
            Err(_) => CoordinatorError::timeout(node.id.as_str(), timeout_ms),
        };

        warn!(node_id = %node.id, error = %error, "Backend write failed");
        if let Err(e) = self.registry.release_usage(&node.id, size_bytes) {
            warn!(node_id = %node.id, error = %e, "Could not release reservation");
        }

        NodeBackupResult {
            node_id: node.id,
            backend_class: node.backend_class,
            outcome: NodeOutcome::Failed {
                reason: FailureReason::BackendError,
                error,
            },
        }
    }
}
