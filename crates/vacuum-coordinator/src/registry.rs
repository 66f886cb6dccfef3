//! Node registry
//!
//! Authoritative store of backend nodes. Each node sits behind its own lock so
//! that usage updates on different nodes never contend; the outer map lock is
//! only held long enough to look up or insert a node handle.
//!
//! # Locking
//!
//! Lock order is map, then node. The map guard is released before a node
//! guard is taken, and no guard is ever held across an `.await`.

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use vacuum_core::{
    CoordinatorError, CoordinatorResult, Node, NodeFilter, NodeId, NodeSeed, NodeStatus,
    StatusChange, Timestamp,
};

type NodeHandle = Arc<Mutex<Node>>;

/// Registry of backend nodes in registration order.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: RwLock<IndexMap<NodeId, NodeHandle>>,
}

impl NodeRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `nodes` in the given order.
    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> CoordinatorResult<Self> {
        let registry = Self::new();
        for node in nodes {
            registry.register(node)?;
        }
        Ok(registry)
    }

    /// Registry materialised from configured seeds.
    pub fn with_seed(seeds: &[NodeSeed]) -> CoordinatorResult<Self> {
        Self::from_nodes(seeds.iter().map(NodeSeed::to_node))
    }

    /// Add a node. Ids are unique; usage is clamped to capacity.
    pub fn register(&self, mut node: Node) -> CoordinatorResult<()> {
        node.used_bytes = node.used_bytes.min(node.capacity_bytes);
        let mut nodes = self.nodes.write();
        if nodes.contains_key(&node.id) {
            return Err(CoordinatorError::already_exists(node.id.as_str()));
        }
        info!(
            node_id = %node.id,
            class = %node.backend_class,
            capacity = node.capacity_bytes,
            "Registered node"
        );
        nodes.insert(node.id.clone(), Arc::new(Mutex::new(node)));
        Ok(())
    }

    /// Copy of one node.
    pub fn get(&self, node_id: &NodeId) -> Option<Node> {
        let handle = self.nodes.read().get(node_id).cloned()?;
        let node = handle.lock().clone();
        Some(node)
    }

    /// Copies of the nodes matching `filter`, in registration order.
    pub fn list(&self, filter: NodeFilter) -> Vec<Node> {
        self.handles()
            .into_iter()
            .map(|handle| handle.lock().clone())
            .filter(|node| filter.matches(node))
            .collect()
    }

    /// Copies of every node, in registration order.
    pub fn snapshot(&self) -> Vec<Node> {
        self.list(NodeFilter::all())
    }

    /// Registered ids, in registration order.
    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.read().keys().cloned().collect()
    }

    /// Number of registered nodes.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// Whether no nodes are registered.
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Reserve `bytes` on a node.
    ///
    /// Fails with `CapacityExceeded` and leaves usage untouched when the
    /// reservation would push the node past its capacity.
    pub fn apply_usage(&self, node_id: &NodeId, bytes: u64) -> CoordinatorResult<()> {
        self.update(node_id, |node| {
            let available = node.available_bytes();
            if bytes > available {
                return Err(CoordinatorError::capacity_exceeded(
                    node.id.as_str(),
                    bytes,
                    available,
                ));
            }
            node.used_bytes += bytes;
            debug!(node_id = %node.id, bytes, used = node.used_bytes, "Applied usage");
            Ok(())
        })?
    }

    /// Return `bytes` previously reserved on a node. Saturates at zero.
    pub fn release_usage(&self, node_id: &NodeId, bytes: u64) -> CoordinatorResult<u64> {
        self.update(node_id, |node| {
            node.used_bytes = node.used_bytes.saturating_sub(bytes);
            debug!(node_id = %node.id, bytes, used = node.used_bytes, "Released usage");
            node.used_bytes
        })
    }

    /// Set a node's status. Returns the change, or `None` if it already had
    /// that status.
    pub fn set_status(
        &self,
        node_id: &NodeId,
        status: NodeStatus,
    ) -> CoordinatorResult<Option<StatusChange>> {
        self.update(node_id, |node| {
            if node.status == status {
                return None;
            }
            let change = StatusChange {
                node_id: node.id.clone(),
                from: node.status,
                to: status,
            };
            node.status = status;
            Some(change)
        })
    }

    /// Record a successful write or synchronisation.
    pub fn mark_synced(&self, node_id: &NodeId, at: Timestamp) -> CoordinatorResult<()> {
        self.update(node_id, |node| node.last_sync_at = Some(at))
    }

    /// Run `f` against one node under its lock.
    ///
    /// `f` must not block or await; usage written by `f` is clamped back to
    /// capacity afterwards.
    pub fn update<F, R>(&self, node_id: &NodeId, f: F) -> CoordinatorResult<R>
    where
        F: FnOnce(&mut Node) -> R,
    {
        let handle = self
            .nodes
            .read()
            .get(node_id)
            .cloned()
            .ok_or_else(|| CoordinatorError::not_found("node", node_id.as_str()))?;
        let mut node = handle.lock();
        let result = f(&mut node);
        node.used_bytes = node.used_bytes.min(node.capacity_bytes);
        Ok(result)
    }

    /// Aggregate counts over the current nodes.
    pub fn statistics(&self) -> RegistryStatistics {
        let nodes = self.snapshot();
        let count = |status: NodeStatus| nodes.iter().filter(|n| n.status == status).count();
        RegistryStatistics {
            total_nodes: nodes.len(),
            active_nodes: count(NodeStatus::Active),
            degraded_nodes: count(NodeStatus::Degraded),
            failed_nodes: count(NodeStatus::Failed),
            sealed_nodes: count(NodeStatus::Sealed),
            total_capacity_bytes: nodes.iter().map(|n| n.capacity_bytes).sum(),
            total_used_bytes: nodes.iter().map(|n| n.used_bytes).sum(),
        }
    }

    fn handles(&self) -> Vec<NodeHandle> {
        self.nodes.read().values().cloned().collect()
    }
}

/// Statistics about registry state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStatistics {
    /// Total registered nodes
    pub total_nodes: usize,

    /// Nodes with status `Active`
    pub active_nodes: usize,

    /// Nodes with status `Degraded`
    pub degraded_nodes: usize,

    /// Nodes with status `Failed`
    pub failed_nodes: usize,

    /// Nodes with status `Sealed`
    pub sealed_nodes: usize,

    /// Summed capacity
    pub total_capacity_bytes: u64,

    /// Summed usage
    pub total_used_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use vacuum_core::BackendClass;
    use vacuum_testkit::{node, three_node_scenario};

    #[test]
    fn test_register_rejects_duplicates() {
        let registry = NodeRegistry::from_nodes(three_node_scenario()).unwrap();
        let err = registry
            .register(node("sv-a", BackendClass::CloudVolume, 10))
            .unwrap_err();
        assert_matches!(err, CoordinatorError::AlreadyExists { .. });
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_register_clamps_usage() {
        let registry = NodeRegistry::new();
        let mut oversized = node("x", BackendClass::CloudVolume, 100);
        oversized.used_bytes = 500;
        registry.register(oversized).unwrap();
        assert_eq!(registry.get(&NodeId::new("x")).unwrap().used_bytes, 100);
    }

    #[test]
    fn test_listing_preserves_registration_order() {
        let registry = NodeRegistry::from_nodes(three_node_scenario()).unwrap();
        let ids: Vec<_> = registry.snapshot().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, registry.ids());
        assert_eq!(ids[0].as_str(), "os-a");

        let volumes = registry.list(NodeFilter::class(BackendClass::ServerVolume));
        assert_eq!(volumes.len(), 2);
    }

    #[test]
    fn test_apply_usage_rejects_overflow() {
        let registry = NodeRegistry::from_nodes(three_node_scenario()).unwrap();
        let id = NodeId::new("os-a");

        registry.apply_usage(&id, 600).unwrap();
        let err = registry.apply_usage(&id, 600).unwrap_err();
        assert_matches!(
            err,
            CoordinatorError::CapacityExceeded { requested: 600, available: 400, .. }
        );
        assert_eq!(registry.get(&id).unwrap().used_bytes, 600);

        assert_eq!(registry.release_usage(&id, 1_000).unwrap(), 0);
    }

    #[test]
    fn test_unknown_node() {
        let registry = NodeRegistry::new();
        assert_matches!(
            registry.apply_usage(&NodeId::new("ghost"), 1),
            Err(CoordinatorError::NotFound { .. })
        );
        assert!(registry.get(&NodeId::new("ghost")).is_none());
    }

    #[test]
    fn test_set_status_reports_changes_only() {
        let registry = NodeRegistry::from_nodes(three_node_scenario()).unwrap();
        let id = NodeId::new("sv-b");
        let change = registry.set_status(&id, NodeStatus::Sealed).unwrap().unwrap();
        assert_eq!(change.from, NodeStatus::Active);
        assert_eq!(change.to, NodeStatus::Sealed);
        assert!(registry.set_status(&id, NodeStatus::Sealed).unwrap().is_none());

        let stats = registry.statistics();
        assert_eq!(stats.sealed_nodes, 1);
        assert_eq!(stats.active_nodes, 2);
        assert_eq!(stats.total_capacity_bytes, 3000);
    }

    #[test]
    fn test_concurrent_usage_never_exceeds_capacity() {
        let registry = Arc::new(
            NodeRegistry::from_nodes(vec![node("os-a", BackendClass::ObjectStore, 1000)]).unwrap(),
        );
        let id = NodeId::new("os-a");
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let id = id.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .filter(|_| registry.apply_usage(&id, 7).is_ok())
                        .count()
                })
            })
            .collect();
        let accepted: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();

        let used = registry.get(&id).unwrap().used_bytes;
        assert!(used <= 1000);
        assert_eq!(used, accepted as u64 * 7);
    }
}
