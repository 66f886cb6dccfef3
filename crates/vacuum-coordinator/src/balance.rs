//! Sync & balance engine
//!
//! `synchronize` reclassifies node health from utilisation, anchors the
//! resulting snapshot and evaluates compliance. `rebalance` evens utilisation
//! across backend classes by shifting each class towards the global target.
//!
//! Rebalancing models migrating excess load elsewhere; no data moves.
//! Reductions are applied as deltas under each node's lock, so backups that
//! land between planning and applying are not overwritten.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};
use vacuum_core::{
    BackendClass, Clock, CoordinatorConfig, CoordinatorResult, Node, NodeId, NodeStatus,
    StatusChange, Timestamp,
};

use crate::anchor::{AnchorChain, AnchorEntry};
use crate::compliance::{evaluate, ComplianceInputs, ComplianceReport, ComplianceThresholds};
use crate::escalation::EscalationController;
use crate::gate::SignatureGate;
use crate::registry::NodeRegistry;

/// Utilisation thresholds for health classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthThresholds {
    /// At or above this a node is `Degraded`
    pub degraded_ratio: f64,
    /// At or above this a node is `Failed`
    pub failed_ratio: f64,
}

impl HealthThresholds {
    /// Thresholds from coordinator configuration.
    pub fn from_config(config: &CoordinatorConfig) -> Self {
        Self {
            degraded_ratio: config.degraded_ratio,
            failed_ratio: config.failed_ratio,
        }
    }

    /// Status `node` should have. Sealed nodes keep their status.
    pub fn classify(&self, node: &Node) -> NodeStatus {
        if node.status == NodeStatus::Sealed {
            return NodeStatus::Sealed;
        }
        let utilization = node.utilization();
        if utilization >= self.failed_ratio {
            NodeStatus::Failed
        } else if utilization >= self.degraded_ratio {
            NodeStatus::Degraded
        } else {
            NodeStatus::Active
        }
    }
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self::from_config(&CoordinatorConfig::default())
    }
}

/// Population variance of per-node utilisation. Zero for an empty fleet.
pub fn balance_coefficient(nodes: &[Node]) -> f64 {
    if nodes.is_empty() {
        return 0.0;
    }
    let count = nodes.len() as f64;
    let mean = nodes.iter().map(Node::utilization).sum::<f64>() / count;
    nodes
        .iter()
        .map(|n| (n.utilization() - mean).powi(2))
        .sum::<f64>()
        / count
}

/// Per-class figures computed while planning a rebalance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassBalance {
    /// Backend class
    pub backend_class: BackendClass,
    /// Nodes in the class
    pub node_count: usize,
    /// Summed capacity
    pub capacity_bytes: u64,
    /// Summed usage before rebalancing
    pub used_bytes: u64,
    /// `capacity_bytes * target_utilization`
    pub target_bytes: f64,
    /// Reduction applied to each node in the class (negative adds load)
    pub per_node_reduction: f64,
}

/// Rebalance plan over a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalancePlan {
    /// Global `total_used / total_capacity`
    pub target_utilization: f64,
    /// One entry per class present, in class order
    pub classes: Vec<ClassBalance>,
}

impl RebalancePlan {
    /// Plan the per-class reductions for `nodes`.
    pub fn compute(nodes: &[Node]) -> Self {
        let total_capacity: u64 = nodes.iter().map(|n| n.capacity_bytes).sum();
        let total_used: u64 = nodes.iter().map(|n| n.used_bytes).sum();
        let target_utilization = if total_capacity == 0 {
            0.0
        } else {
            total_used as f64 / total_capacity as f64
        };

        let mut grouped: BTreeMap<BackendClass, Vec<&Node>> = BTreeMap::new();
        for node in nodes {
            grouped.entry(node.backend_class).or_default().push(node);
        }

        let classes = grouped
            .into_iter()
            .map(|(backend_class, members)| {
                let capacity_bytes: u64 = members.iter().map(|n| n.capacity_bytes).sum();
                let used_bytes: u64 = members.iter().map(|n| n.used_bytes).sum();
                let target_bytes = capacity_bytes as f64 * target_utilization;
                let diff = used_bytes as f64 - target_bytes;
                ClassBalance {
                    backend_class,
                    node_count: members.len(),
                    capacity_bytes,
                    used_bytes,
                    target_bytes,
                    per_node_reduction: diff / members.len() as f64,
                }
            })
            .collect();

        Self {
            target_utilization,
            classes,
        }
    }

    /// Reduction for nodes of `backend_class`.
    pub fn reduction_for(&self, backend_class: BackendClass) -> f64 {
        self.classes
            .iter()
            .find(|c| c.backend_class == backend_class)
            .map_or(0.0, |c| c.per_node_reduction)
    }
}

/// `used` shifted by `reduction`, rounded and clamped to `[0, capacity]`.
pub fn apply_reduction(used: u64, capacity: u64, reduction: f64) -> u64 {
    let shifted = (used as f64 - reduction).round();
    if shifted <= 0.0 {
        0
    } else {
        (shifted as u64).min(capacity)
    }
}

/// Usage change on one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAdjustment {
    /// Node adjusted
    pub node_id: NodeId,
    /// Usage before
    pub before_bytes: u64,
    /// Usage after
    pub after_bytes: u64,
}

/// Result of a rebalance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceReport {
    /// Plan that was applied
    pub plan: RebalancePlan,
    /// Coefficient over the snapshot the plan was computed from
    pub coefficient_before: f64,
    /// Coefficient over the registry after applying
    pub coefficient_after: f64,
    /// Nodes whose usage changed
    pub adjustments: Vec<NodeAdjustment>,
}

/// Result of a synchronisation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    /// When the pass ran
    pub synced_at: Timestamp,
    /// Node count per status after the pass
    pub status_counts: BTreeMap<NodeStatus, usize>,
    /// Status changes made by the pass
    pub changes: Vec<StatusChange>,
    /// Anchor of the post-sync snapshot
    pub anchor: AnchorEntry,
    /// Compliance of the post-sync state
    pub compliance: ComplianceReport,
}

/// Periodic health reconciliation and load balancing.
pub struct BalanceEngine {
    registry: Arc<NodeRegistry>,
    gate: Arc<SignatureGate>,
    escalation: Arc<EscalationController>,
    anchors: Arc<AnchorChain>,
    clock: Arc<dyn Clock>,
    health: HealthThresholds,
    compliance: ComplianceThresholds,
}

impl BalanceEngine {
    /// Create an engine over the shared coordinator state.
    pub fn new(
        registry: Arc<NodeRegistry>,
        gate: Arc<SignatureGate>,
        escalation: Arc<EscalationController>,
        anchors: Arc<AnchorChain>,
        clock: Arc<dyn Clock>,
        config: &CoordinatorConfig,
    ) -> Self {
        Self {
            registry,
            gate,
            escalation,
            anchors,
            clock,
            health: HealthThresholds::from_config(config),
            compliance: ComplianceThresholds::from_config(config),
        }
    }

    /// Reclassify every node, anchor the snapshot and evaluate compliance.
    pub fn synchronize(&self) -> CoordinatorResult<SyncReport> {
        let synced_at = self.clock.now();
        let mut changes = Vec::new();
        for node_id in self.registry.ids() {
            let change = self.registry.update(&node_id, |node| {
                node.last_sync_at = Some(synced_at);
                let status = self.health.classify(node);
                if status == node.status {
                    return None;
                }
                let change = StatusChange {
                    node_id: node.id.clone(),
                    from: node.status,
                    to: status,
                };
                node.status = status;
                Some(change)
            })?;
            if let Some(change) = change {
                debug!(node_id = %change.node_id, from = %change.from, to = %change.to, "Node status changed");
                changes.push(change);
            }
        }

        let snapshot = self.registry.snapshot();
        let mut status_counts: BTreeMap<NodeStatus, usize> = [
            NodeStatus::Active,
            NodeStatus::Degraded,
            NodeStatus::Failed,
            NodeStatus::Sealed,
        ]
        .into_iter()
        .map(|status| (status, 0))
        .collect();
        for node in &snapshot {
            *status_counts.entry(node.status).or_default() += 1;
        }

        let anchor = self.anchors.anchor(&snapshot, synced_at)?;
        let compliance = self.evaluate_snapshot(&snapshot);

        info!(
            nodes = snapshot.len(),
            changes = changes.len(),
            anchor = anchor.sequence,
            compliant = compliance.all_passed(),
            "Synchronization complete"
        );
        Ok(SyncReport {
            synced_at,
            status_counts,
            changes,
            anchor,
            compliance,
        })
    }

    /// Shift each class's usage towards the global target utilisation.
    pub fn rebalance(&self) -> CoordinatorResult<BalanceReport> {
        let snapshot = self.registry.snapshot();
        let coefficient_before = balance_coefficient(&snapshot);
        let plan = RebalancePlan::compute(&snapshot);

        let mut adjustments = Vec::new();
        for node in &snapshot {
            let reduction = plan.reduction_for(node.backend_class);
            let adjustment = self.registry.update(&node.id, |live| {
                let before_bytes = live.used_bytes;
                live.used_bytes = apply_reduction(before_bytes, live.capacity_bytes, reduction);
                NodeAdjustment {
                    node_id: live.id.clone(),
                    before_bytes,
                    after_bytes: live.used_bytes,
                }
            })?;
            if adjustment.before_bytes != adjustment.after_bytes {
                adjustments.push(adjustment);
            }
        }

        let coefficient_after = balance_coefficient(&self.registry.snapshot());
        info!(
            target = plan.target_utilization,
            before = coefficient_before,
            after = coefficient_after,
            adjusted = adjustments.len(),
            "Rebalance applied"
        );
        Ok(BalanceReport {
            plan,
            coefficient_before,
            coefficient_after,
            adjustments,
        })
    }

    /// Evaluate compliance against the current state.
    pub fn evaluate_compliance(&self) -> ComplianceReport {
        self.evaluate_snapshot(&self.registry.snapshot())
    }

    fn evaluate_snapshot(&self, nodes: &[Node]) -> ComplianceReport {
        let validations = self.gate.list();
        evaluate(
            &ComplianceInputs {
                nodes,
                overflow_state: self.escalation.current_state(),
                validations: &validations,
            },
            &self.compliance,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::ApprovalRules;
    use vacuum_testkit::{node, ManualClock, StaticPolicySource};

    fn engine(nodes: Vec<Node>) -> (BalanceEngine, Arc<NodeRegistry>, Arc<AnchorChain>) {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::epoch());
        let registry = Arc::new(NodeRegistry::from_nodes(nodes).unwrap());
        let escalation = Arc::new(EscalationController::new(Arc::clone(&clock), 1));
        let gate = Arc::new(SignatureGate::new(
            ApprovalRules::default(),
            Arc::clone(&escalation),
            Arc::new(StaticPolicySource::allowing("p")),
            Arc::clone(&clock),
        ));
        let anchors = Arc::new(AnchorChain::new());
        let engine = BalanceEngine::new(
            Arc::clone(&registry),
            gate,
            escalation,
            Arc::clone(&anchors),
            clock,
            &CoordinatorConfig::default(),
        );
        (engine, registry, anchors)
    }

    #[test]
    fn test_classify_thresholds() {
        let health = HealthThresholds::default();
        let at = |used| node("n", BackendClass::ObjectStore, 100).with_used(used);
        assert_eq!(health.classify(&at(79)), NodeStatus::Active);
        assert_eq!(health.classify(&at(80)), NodeStatus::Degraded);
        assert_eq!(health.classify(&at(94)), NodeStatus::Degraded);
        assert_eq!(health.classify(&at(95)), NodeStatus::Failed);

        let mut sealed = at(100);
        sealed.status = NodeStatus::Sealed;
        assert_eq!(health.classify(&sealed), NodeStatus::Sealed);
        assert_eq!(
            health.classify(&node("z", BackendClass::CloudVolume, 0)),
            NodeStatus::Failed
        );
    }

    #[test]
    fn test_balance_coefficient() {
        assert_eq!(balance_coefficient(&[]), 0.0);
        let nodes = vec![
            node("a", BackendClass::ObjectStore, 100).with_used(90),
            node("b", BackendClass::ObjectStore, 100).with_used(10),
        ];
        assert!((balance_coefficient(&nodes) - 0.16).abs() < 1e-9);
    }

    #[test]
    fn test_apply_reduction_clamps() {
        assert_eq!(apply_reduction(50, 100, 80.0), 0);
        assert_eq!(apply_reduction(50, 100, -80.0), 100);
        assert_eq!(apply_reduction(50, 100, 10.4), 40);
    }

    #[test]
    fn test_synchronize_reclassifies_and_anchors() {
        let (engine, registry, anchors) = engine(vec![
            node("os-a", BackendClass::ObjectStore, 100).primary(),
            node("sv-a", BackendClass::ServerVolume, 100).with_used(85),
            node("sv-b", BackendClass::ServerVolume, 100).with_used(99),
        ]);
        registry.set_status(&NodeId::new("os-a"), NodeStatus::Failed).unwrap();

        let report = engine.synchronize().unwrap();

        assert_eq!(report.status_counts[&NodeStatus::Active], 1);
        assert_eq!(report.status_counts[&NodeStatus::Degraded], 1);
        assert_eq!(report.status_counts[&NodeStatus::Failed], 1);
        assert_eq!(report.status_counts[&NodeStatus::Sealed], 0);
        assert_eq!(report.changes.len(), 3);
        assert_eq!(report.anchor.sequence, 0);
        assert_eq!(anchors.len(), 1);
        assert!(registry.snapshot().iter().all(|n| n.last_sync_at == Some(report.synced_at)));

        let again = engine.synchronize().unwrap();
        assert!(again.changes.is_empty());
        assert_eq!(again.anchor.previous_hash, report.anchor.entry_hash);
    }

    #[test]
    fn test_rebalance_shifts_classes_towards_target() {
        let (engine, registry, _) = engine(vec![
            node("os-a", BackendClass::ObjectStore, 1000).with_used(900),
            node("os-b", BackendClass::ObjectStore, 1000).with_used(700),
            node("cv-a", BackendClass::CloudVolume, 1000).with_used(100),
            node("cv-b", BackendClass::CloudVolume, 1000).with_used(300),
        ]);

        let report = engine.rebalance().unwrap();

        assert!((report.plan.target_utilization - 0.5).abs() < 1e-9);
        let used: Vec<_> = registry.snapshot().iter().map(|n| n.used_bytes).collect();
        assert_eq!(used, vec![600, 400, 400, 600]);
        assert_eq!(report.adjustments.len(), 4);
        assert!(report.coefficient_after <= report.coefficient_before);
    }
}
