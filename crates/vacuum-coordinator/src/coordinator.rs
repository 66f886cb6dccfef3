//! Coordinator facade
//!
//! Owns the registry, orchestrator, signature gate, escalation controller,
//! balance engine and anchor chain, wires them to the injected collaborators,
//! and emits an audit event for every state transition.
//!
//! Audit events are queued after the operation has finished and all of its
//! locks are released, and delivered in the background by an
//! [`AuditDispatcher`]. Sink failures are logged and dropped;
//! [`Coordinator::flush_audit`] waits for delivery.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use vacuum_core::{
    AuditEvent, AuditEventKind, AuditSink, Clock, CoordinatorConfig, CoordinatorError,
    CoordinatorResult, DefaultPolicySource, Node, NodeId, NodeStatus, OverflowState,
    PolicySource, Signature, StatusChange, StorageBackend, SystemClock, TracingAuditSink,
    TransitionId, TransitionValidation, ValidationId, ValidationState, VetoRecord,
};

use crate::anchor::{AnchorChain, AnchorEntry};
use crate::audit::AuditDispatcher;
use crate::balance::{BalanceEngine, BalanceReport, SyncReport};
use crate::compliance::ComplianceReport;
use crate::escalation::{EscalationController, EscalationReset};
use crate::gate::{ApprovalRules, SignatureGate};
use crate::orchestrator::{BackupOrchestrator, BackupReport};
use crate::registry::{NodeRegistry, RegistryStatistics};

/// Result of triggering a veto.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VetoOutcome {
    /// Record appended to the veto log
    pub record: VetoRecord,
    /// Validations rejected by this veto
    pub rejected: Vec<ValidationId>,
}

/// Point-in-time view of coordinator state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorStatus {
    /// Registry snapshot
    pub nodes: Vec<Node>,
    /// Registry aggregates
    pub statistics: RegistryStatistics,
    /// Escalation level
    pub overflow_state: OverflowState,
    /// Veto records still in force
    pub active_vetoes: usize,
    /// Validations not yet decided
    pub pending_validations: usize,
    /// Latest anchor, if any
    pub anchor_head: Option<AnchorEntry>,
}

/// Backup coordinator shared by `Arc` across callers.
pub struct Coordinator {
    config: CoordinatorConfig,
    registry: Arc<NodeRegistry>,
    orchestrator: BackupOrchestrator,
    gate: Arc<SignatureGate>,
    escalation: Arc<EscalationController>,
    engine: BalanceEngine,
    anchors: Arc<AnchorChain>,
    audit: AuditDispatcher,
    clock: Arc<dyn Clock>,
}

impl Coordinator {
    /// Start building a coordinator.
    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::default()
    }

    /// Configuration in force.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Node registry.
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Signature gate.
    pub fn gate(&self) -> &Arc<SignatureGate> {
        &self.gate
    }

    /// Escalation controller.
    pub fn escalation(&self) -> &Arc<EscalationController> {
        &self.escalation
    }

    /// Anchor chain.
    pub fn anchors(&self) -> &Arc<AnchorChain> {
        &self.anchors
    }

    // =========================================================================
    // Registry
    // =========================================================================

    /// Register a node.
    pub async fn register_node(&self, node: Node) -> CoordinatorResult<()> {
        let payload = serde_json::json!({
            "node_id": node.id,
            "backend_class": node.backend_class,
            "capacity_bytes": node.capacity_bytes,
            "is_primary": node.is_primary,
        });
        self.registry.register(node)?;
        self.emit(AuditEventKind::NodeRegistered, &payload);
        Ok(())
    }

    /// Set a node's status explicitly, e.g. to seal it.
    pub async fn set_node_status(
        &self,
        node_id: &NodeId,
        status: NodeStatus,
    ) -> CoordinatorResult<Option<StatusChange>> {
        let change = self.registry.set_status(node_id, status)?;
        if let Some(change) = &change {
            self.emit(AuditEventKind::NodeStatusChanged, change);
        }
        Ok(change)
    }

    // =========================================================================
    // Backup
    // =========================================================================

    /// Replicate `payload` to every registered node.
    pub async fn backup(&self, payload: &[u8], metadata: BTreeMap<String, String>) -> BackupReport {
        let report = self.orchestrator.backup(payload, metadata).await;
        let failed: Vec<&NodeId> = report.failed().map(|r| &r.node_id).collect();
        self.emit(
            AuditEventKind::BackupCompleted,
            &serde_json::json!({
                "payload_hash": report.payload_hash,
                "size_bytes": report.size_bytes,
                "tier": report.tier,
                "succeeded_classes": report.succeeded_classes,
                "failed_nodes": failed,
            }),
        );
        report
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Open a validation for a sensitive transition.
    pub async fn open_transition(
        &self,
        transition_id: TransitionId,
        context: BTreeMap<String, String>,
    ) -> CoordinatorResult<TransitionValidation> {
        let validation = self.gate.open_transition(transition_id, context).await?;
        self.emit(
            AuditEventKind::TransitionOpened,
            &serde_json::json!({
                "validation_id": validation.id,
                "transition_id": validation.transition_id,
                "policy_precheck_passed": validation.policy_precheck_passed,
                "policy_snapshot_hash": validation.policy_snapshot_hash,
                "state": validation.state,
            }),
        );
        if validation.state == ValidationState::Rejected {
            self.emit_rejection(&validation.id, &validation.transition_id, None);
        }
        Ok(validation)
    }

    /// Append a co-signature.
    pub async fn add_signature(
        &self,
        validation_id: &ValidationId,
        signer_id: &str,
        signature: Signature,
    ) -> CoordinatorResult<TransitionValidation> {
        let validation = self.gate.add_signature(validation_id, signer_id, signature)?;
        self.emit(
            AuditEventKind::SignatureAdded,
            &serde_json::json!({
                "validation_id": validation.id,
                "transition_id": validation.transition_id,
                "signer_id": signer_id,
                "signatures": validation.signatures.len(),
                "state": validation.state,
            }),
        );
        if validation.state == ValidationState::Rejected {
            self.emit_rejection(&validation.id, &validation.transition_id, None);
        }
        Ok(validation)
    }

    // =========================================================================
    // Escalation
    // =========================================================================

    /// Raise the escalation level and reject the named transitions.
    pub async fn trigger_veto(
        &self,
        triggered_by: &str,
        reason: &str,
        affected_transition_ids: BTreeSet<TransitionId>,
    ) -> VetoOutcome {
        let record = self
            .escalation
            .trigger(triggered_by, reason, affected_transition_ids);
        let rejected = self.gate.apply_veto(&record);

        self.emit(AuditEventKind::VetoTriggered, &record);
        for validation_id in &rejected {
            if let Some(validation) = self.gate.get(validation_id) {
                self.emit_rejection(validation_id, &validation.transition_id, Some(&record));
            }
        }
        VetoOutcome { record, rejected }
    }

    /// Return escalation to `Normal` with a quorum of authorisers.
    pub async fn reset_escalation<I, S>(&self, authorizers: I) -> CoordinatorResult<EscalationReset>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let reset = self.escalation.reset(authorizers)?;
        self.emit(AuditEventKind::EscalationReset, &reset);
        Ok(reset)
    }

    // =========================================================================
    // Sync & balance
    // =========================================================================

    /// Reconcile node health, anchor the snapshot and evaluate compliance.
    pub async fn synchronize(&self) -> CoordinatorResult<SyncReport> {
        let report = self.engine.synchronize()?;
        for change in &report.changes {
            self.emit(AuditEventKind::NodeStatusChanged, change);
        }
        self.emit(AuditEventKind::SnapshotAnchored, &report.anchor);
        Ok(report)
    }

    /// Even out utilisation across backend classes.
    pub async fn rebalance(&self) -> CoordinatorResult<BalanceReport> {
        let report = self.engine.rebalance()?;
        if !report.adjustments.is_empty() {
            self.emit(
                AuditEventKind::RebalanceApplied,
                &serde_json::json!({
                    "target_utilization": report.plan.target_utilization,
                    "coefficient_before": report.coefficient_before,
                    "coefficient_after": report.coefficient_after,
                    "adjustments": report.adjustments,
                }),
            );
        }
        Ok(report)
    }

    /// Evaluate the compliance principles against current state.
    pub fn evaluate_compliance(&self) -> ComplianceReport {
        self.engine.evaluate_compliance()
    }

    /// Point-in-time status.
    pub fn status(&self) -> CoordinatorStatus {
        CoordinatorStatus {
            nodes: self.registry.snapshot(),
            statistics: self.registry.statistics(),
            overflow_state: self.escalation.current_state(),
            active_vetoes: self.escalation.active_records().len(),
            pending_validations: self.gate.pending_count(),
            anchor_head: self.anchors.head(),
        }
    }

    /// Wait until every audit event emitted so far has reached the sink.
    pub async fn flush_audit(&self) {
        self.audit.flush().await;
    }

    fn emit_rejection(
        &self,
        validation_id: &ValidationId,
        transition_id: &TransitionId,
        veto: Option<&VetoRecord>,
    ) {
        self.emit(
            AuditEventKind::TransitionRejected,
            &serde_json::json!({
                "validation_id": validation_id,
                "transition_id": transition_id,
                "veto_id": veto.map(|v| v.id),
            }),
        );
    }

    fn emit<P: Serialize + ?Sized>(&self, kind: AuditEventKind, payload: &P) {
        self.audit.dispatch(AuditEvent::new(self.clock.now(), kind, &payload));
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`Coordinator`].
///
/// Only the storage backend is required. Everything else defaults to the
/// production implementations: `DefaultPolicySource` over the configured
/// policy material, `TracingAuditSink`, `SystemClock`, and a registry seeded
/// from `config.seed_nodes`.
#[derive(Default)]
pub struct CoordinatorBuilder {
    config: Option<CoordinatorConfig>,
    nodes: Option<Vec<Node>>,
    anchors: Option<Vec<AnchorEntry>>,
    backend: Option<Arc<dyn StorageBackend>>,
    policy: Option<Arc<dyn PolicySource>>,
    audit: Option<Arc<dyn AuditSink>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoordinatorBuilder {
    /// Set configuration
    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Start from these nodes instead of the configured seed set
    pub fn with_nodes(mut self, nodes: Vec<Node>) -> Self {
        self.nodes = Some(nodes);
        self
    }

    /// Resume an existing anchor chain
    pub fn with_anchors(mut self, entries: Vec<AnchorEntry>) -> Self {
        self.anchors = Some(entries);
        self
    }

    /// Set storage backend
    pub fn with_backend(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set policy source
    pub fn with_policy(mut self, policy: Arc<dyn PolicySource>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Set audit sink
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Set clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the coordinator
    pub fn build(self) -> CoordinatorResult<Coordinator> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let backend = self
            .backend
            .ok_or_else(|| CoordinatorError::config("a storage backend is required"))?;
        let policy = self
            .policy
            .unwrap_or_else(|| Arc::new(DefaultPolicySource::new(&config.policy_material)));
        let audit = self.audit.unwrap_or_else(|| Arc::new(TracingAuditSink));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let registry = Arc::new(match self.nodes {
            Some(nodes) => NodeRegistry::from_nodes(nodes)?,
            None => NodeRegistry::with_seed(&config.seed_nodes)?,
        });
        let anchors = Arc::new(
            match self.anchors {
                Some(entries) => AnchorChain::from_entries(entries)?,
                None => AnchorChain::new(),
            }
            .with_retention(config.anchor_retention),
        );
        let escalation = Arc::new(EscalationController::new(
            Arc::clone(&clock),
            config.deescalation_quorum,
        ));
        let gate = Arc::new(SignatureGate::new(
            ApprovalRules::from_config(&config),
            Arc::clone(&escalation),
            policy,
            Arc::clone(&clock),
        ));
        let orchestrator = BackupOrchestrator::new(
            Arc::clone(&registry),
            backend,
            Arc::clone(&clock),
            Duration::from_millis(config.backend_write_timeout_ms),
        );
        let engine = BalanceEngine::new(
            Arc::clone(&registry),
            Arc::clone(&gate),
            Arc::clone(&escalation),
            Arc::clone(&anchors),
            Arc::clone(&clock),
            &config,
        );

        Ok(Coordinator {
            config,
            registry,
            orchestrator,
            gate,
            escalation,
            engine,
            anchors,
            audit: AuditDispatcher::new(audit),
            clock,
        })
    }
}
