//! Backend node records.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::identifiers::{NodeId, Timestamp};

/// Class of storage backend a node belongs to.
///
/// Replication across two or more distinct classes is what earns the
/// vacuum tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BackendClass {
    /// S3-style object storage
    ObjectStore,
    /// Block volume attached to a managed server
    ServerVolume,
    /// Provider-managed cloud volume
    CloudVolume,
}

impl BackendClass {
    /// All classes in declaration order.
    pub const ALL: [BackendClass; 3] = [
        BackendClass::ObjectStore,
        BackendClass::ServerVolume,
        BackendClass::CloudVolume,
    ];
}

impl fmt::Display for BackendClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendClass::ObjectStore => "object-store",
            BackendClass::ServerVolume => "server-volume",
            BackendClass::CloudVolume => "cloud-volume",
        };
        f.write_str(name)
    }
}

/// Health status of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeStatus {
    /// Below the degraded utilisation threshold
    Active,
    /// Between the degraded and failed thresholds
    Degraded,
    /// At or above the failed threshold
    Failed,
    /// Operator-sealed; synchronisation leaves it alone
    Sealed,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A storage backend tracked by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Stable identifier
    pub id: NodeId,
    /// Backend class
    pub backend_class: BackendClass,
    /// Transport endpoint (opaque to the coordinator)
    pub endpoint: String,
    /// Deployment region label
    pub region: String,
    /// Whether this node is a primary for its class
    pub is_primary: bool,
    /// Last successful write or synchronisation
    pub last_sync_at: Option<Timestamp>,
    /// Current health status
    pub status: NodeStatus,
    /// Total capacity in bytes
    pub capacity_bytes: u64,
    /// Bytes in use; never exceeds `capacity_bytes`
    pub used_bytes: u64,
}

impl Node {
    /// Create an empty, active node.
    pub fn new(
        id: impl Into<NodeId>,
        backend_class: BackendClass,
        endpoint: impl Into<String>,
        region: impl Into<String>,
        capacity_bytes: u64,
    ) -> Self {
        Self {
            id: id.into(),
            backend_class,
            endpoint: endpoint.into(),
            region: region.into(),
            is_primary: false,
            last_sync_at: None,
            status: NodeStatus::Active,
            capacity_bytes,
            used_bytes: 0,
        }
    }

    /// Mark as primary.
    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    /// Start with some bytes already in use (clamped to capacity).
    pub fn with_used(mut self, used_bytes: u64) -> Self {
        self.used_bytes = used_bytes.min(self.capacity_bytes);
        self
    }

    /// Bytes still available.
    pub fn available_bytes(&self) -> u64 {
        self.capacity_bytes.saturating_sub(self.used_bytes)
    }

    /// Fraction of capacity in use. A zero-capacity node counts as full.
    pub fn utilization(&self) -> f64 {
        if self.capacity_bytes == 0 {
            1.0
        } else {
            self.used_bytes as f64 / self.capacity_bytes as f64
        }
    }
}

/// Filter for registry listings. `None` fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeFilter {
    /// Restrict to one backend class
    pub backend_class: Option<BackendClass>,
    /// Restrict to one status
    pub status: Option<NodeStatus>,
}

impl NodeFilter {
    /// Match every node.
    pub fn all() -> Self {
        Self::default()
    }

    /// Match nodes of one class.
    pub fn class(backend_class: BackendClass) -> Self {
        Self {
            backend_class: Some(backend_class),
            status: None,
        }
    }

    /// Match nodes with one status.
    pub fn status(status: NodeStatus) -> Self {
        Self {
            backend_class: None,
            status: Some(status),
        }
    }

    /// Whether `node` passes the filter.
    pub fn matches(&self, node: &Node) -> bool {
        self.backend_class.map_or(true, |c| c == node.backend_class)
            && self.status.map_or(true, |s| s == node.status)
    }
}

/// A status change produced by the registry, consumed by audit emission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    /// Node whose status changed
    pub node_id: NodeId,
    /// Status before the change
    pub from: NodeStatus,
    /// Status after the change
    pub to: NodeStatus,
}
