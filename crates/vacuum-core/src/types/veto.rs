//! Escalation levels and veto records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::identifiers::{Timestamp, TransitionId, VetoId};

/// Global escalation level.
///
/// Ordered so that `Normal < Elevated < Critical < VetoActive`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum OverflowState {
    /// No outstanding concerns
    #[default]
    Normal,
    /// One concern raised
    Elevated,
    /// Two concerns raised
    Critical,
    /// Saturated; the coordinator is in veto mode
    VetoActive,
}

impl OverflowState {
    /// Next level, saturating at `VetoActive`.
    pub fn escalate(self) -> Self {
        match self {
            OverflowState::Normal => OverflowState::Elevated,
            OverflowState::Elevated => OverflowState::Critical,
            OverflowState::Critical | OverflowState::VetoActive => OverflowState::VetoActive,
        }
    }
}

impl fmt::Display for OverflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Whether a veto record still stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionStatus {
    /// Still in force
    Active,
    /// Cleared by an authorised reset
    Resolved,
}

/// Append-only log entry for one veto trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VetoRecord {
    /// Record identifier
    pub id: VetoId,
    /// When the veto was triggered
    pub created_at: Timestamp,
    /// Overflow state after this trigger was applied
    pub overflow_state: OverflowState,
    /// Who raised the veto
    pub triggered_by: String,
    /// Free-form justification
    pub reason: String,
    /// Transitions this veto rejects
    pub affected_transition_ids: BTreeSet<TransitionId>,
    /// Whether the record is still in force
    pub resolution_status: ResolutionStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalation_saturates() {
        let mut state = OverflowState::Normal;
        let mut seen = vec![state];
        for _ in 0..6 {
            state = state.escalate();
            seen.push(state);
        }
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(state, OverflowState::VetoActive);
        assert_eq!(seen[1], OverflowState::Elevated);
        assert_eq!(seen[2], OverflowState::Critical);
    }
}
