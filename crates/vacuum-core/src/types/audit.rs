//! Audit events emitted on every coordinator state transition.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::identifiers::Timestamp;

/// Kind of state transition being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    /// Node added to the registry
    NodeRegistered,
    /// Node status changed (explicitly or by synchronisation)
    NodeStatusChanged,
    /// Backup fan-out finished
    BackupCompleted,
    /// Transition validation opened
    TransitionOpened,
    /// Signature appended to a validation
    SignatureAdded,
    /// Validation forced to `Rejected` by a veto
    TransitionRejected,
    /// Veto triggered on the escalation controller
    VetoTriggered,
    /// Escalation state reset by an authorised quorum
    EscalationReset,
    /// Rebalance adjusted node usage
    RebalanceApplied,
    /// Registry snapshot appended to the anchor chain
    SnapshotAnchored,
}

impl fmt::Display for AuditEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuditEventKind::NodeRegistered => "node_registered",
            AuditEventKind::NodeStatusChanged => "node_status_changed",
            AuditEventKind::BackupCompleted => "backup_completed",
            AuditEventKind::TransitionOpened => "transition_opened",
            AuditEventKind::SignatureAdded => "signature_added",
            AuditEventKind::TransitionRejected => "transition_rejected",
            AuditEventKind::VetoTriggered => "veto_triggered",
            AuditEventKind::EscalationReset => "escalation_reset",
            AuditEventKind::RebalanceApplied => "rebalance_applied",
            AuditEventKind::SnapshotAnchored => "snapshot_anchored",
        };
        f.write_str(name)
    }
}

/// `{timestamp, kind, payload}` record handed to the audit sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the transition happened
    pub timestamp: Timestamp,
    /// What happened
    pub kind: AuditEventKind,
    /// Kind-specific detail
    pub payload: serde_json::Value,
}

impl AuditEvent {
    /// Build an event from any serialisable payload.
    ///
    /// Payloads that fail to serialise are recorded as `null`; the event
    /// itself is still emitted.
    pub fn new<P: Serialize>(timestamp: Timestamp, kind: AuditEventKind, payload: &P) -> Self {
        Self {
            timestamp,
            kind,
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        }
    }
}
