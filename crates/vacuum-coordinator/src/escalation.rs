//! Overflow escalation and veto log.
//!
//! Each trigger raises the global overflow state one level, saturating at
//! `VetoActive`, and appends a `VetoRecord`. The state only moves down through
//! an explicit `reset` signed off by a quorum of distinct authorisers.
//!
//! Vetoed transitions stay vetoed for the life of the controller, including
//! across a reset; a reset lowers the escalation level, it does not un-reject
//! anything.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};
use vacuum_core::{
    Clock, CoordinatorError, CoordinatorResult, OverflowState, ResolutionStatus, TransitionId,
    VetoId, VetoRecord,
};

#[derive(Debug, Default)]
struct EscalationState {
    overflow_state: OverflowState,
    records: Vec<VetoRecord>,
    vetoed: BTreeSet<TransitionId>,
}

/// Result of an authorised reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationReset {
    /// State before the reset
    pub previous_state: OverflowState,
    /// Records moved to `Resolved`
    pub resolved: Vec<VetoId>,
    /// Distinct authorisers who signed off
    pub authorizers: BTreeSet<String>,
}

/// Global escalation state machine.
pub struct EscalationController {
    state: Mutex<EscalationState>,
    clock: Arc<dyn Clock>,
    reset_quorum: usize,
}

impl EscalationController {
    /// Controller starting at `Normal` that needs `reset_quorum` distinct
    /// authorisers to reset.
    pub fn new(clock: Arc<dyn Clock>, reset_quorum: usize) -> Self {
        Self {
            state: Mutex::new(EscalationState::default()),
            clock,
            reset_quorum: reset_quorum.max(1),
        }
    }

    /// Raise the overflow state one level and record the veto.
    ///
    /// The affected transitions are marked vetoed before the record is
    /// returned, so any signature arriving afterwards sees the veto.
    pub fn trigger(
        &self,
        triggered_by: impl Into<String>,
        reason: impl Into<String>,
        affected_transition_ids: BTreeSet<TransitionId>,
    ) -> VetoRecord {
        let created_at = self.clock.now();
        let mut state = self.state.lock();
        let previous = state.overflow_state;
        state.overflow_state = previous.escalate();
        state
            .vetoed
            .extend(affected_transition_ids.iter().cloned());

        let record = VetoRecord {
            id: VetoId::new_random(),
            created_at,
            overflow_state: state.overflow_state,
            triggered_by: triggered_by.into(),
            reason: reason.into(),
            affected_transition_ids,
            resolution_status: ResolutionStatus::Active,
        };
        state.records.push(record.clone());

        warn!(
            veto_id = %record.id,
            from = %previous,
            to = %record.overflow_state,
            triggered_by = %record.triggered_by,
            affected = record.affected_transition_ids.len(),
            "Veto triggered"
        );
        record
    }

    /// Return to `Normal`, resolving every active record.
    ///
    /// Requires at least the configured quorum of distinct, non-empty
    /// authoriser ids.
    pub fn reset<I, S>(&self, authorizers: I) -> CoordinatorResult<EscalationReset>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let authorizers: BTreeSet<String> = authorizers
            .into_iter()
            .map(Into::into)
            .filter(|a: &String| !a.trim().is_empty())
            .collect();
        if authorizers.len() < self.reset_quorum {
            return Err(CoordinatorError::unauthorized(format!(
                "escalation reset needs {} distinct authorisers, got {}",
                self.reset_quorum,
                authorizers.len()
            )));
        }

        let mut state = self.state.lock();
        let previous_state = state.overflow_state;
        state.overflow_state = OverflowState::Normal;
        let mut resolved = Vec::new();
        for record in state
            .records
            .iter_mut()
            .filter(|r| r.resolution_status == ResolutionStatus::Active)
        {
            record.resolution_status = ResolutionStatus::Resolved;
            resolved.push(record.id);
        }

        info!(
            from = %previous_state,
            resolved = resolved.len(),
            authorizers = authorizers.len(),
            "Escalation reset"
        );
        Ok(EscalationReset {
            previous_state,
            resolved,
            authorizers,
        })
    }

    /// Current overflow state.
    pub fn current_state(&self) -> OverflowState {
        self.state.lock().overflow_state
    }

    /// Whether any veto has named `transition_id`.
    pub fn is_vetoed(&self, transition_id: &TransitionId) -> bool {
        self.state.lock().vetoed.contains(transition_id)
    }

    /// Every veto record, oldest first.
    pub fn records(&self) -> Vec<VetoRecord> {
        self.state.lock().records.clone()
    }

    /// Records still in force.
    pub fn active_records(&self) -> Vec<VetoRecord> {
        self.state
            .lock()
            .records
            .iter()
            .filter(|r| r.resolution_status == ResolutionStatus::Active)
            .cloned()
            .collect()
    }
}
