//! Triple-Sign gate
//!
//! Tracks co-signature approval of sensitive data transitions. A validation
//! becomes `FullySigned` once enough signatures arrive, unless its transition
//! has been vetoed, in which case it becomes `Rejected`. Terminal validations
//! accept no further signatures.
//!
//! Veto precedence is decided under the validation's own lock: a signature
//! that would complete the threshold checks the escalation controller's veto
//! set at that moment, and `apply_veto` rejects whatever is still open after
//! the veto set was updated. A transition therefore never ends up both vetoed
//! and `FullySigned` unless it was approved before the veto was raised.

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};
use vacuum_core::{
    missing_context_keys, Clock, CoordinatorConfig, CoordinatorError, CoordinatorResult,
    PolicySource, Signature, SignerPolicy, TransitionId, TransitionValidation, ValidationId,
    ValidationState, VetoRecord,
};

use crate::escalation::EscalationController;

type ValidationHandle = Arc<Mutex<TransitionValidation>>;

/// Rules deciding when a validation is approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalRules {
    /// Counted signatures required
    pub threshold: usize,
    /// How signatures are counted
    pub signer_policy: SignerPolicy,
    /// Whether a failed precheck blocks approval
    pub require_precheck: bool,
}

impl ApprovalRules {
    /// Rules from coordinator configuration.
    pub fn from_config(config: &CoordinatorConfig) -> Self {
        Self {
            threshold: config.signature_threshold.max(1),
            signer_policy: config.signer_policy,
            require_precheck: config.require_precheck_for_approval,
        }
    }

    /// Whether `validation` carries enough counted signatures.
    pub fn threshold_met(&self, validation: &TransitionValidation) -> bool {
        validation.counted_signatures(self.signer_policy) >= self.threshold
    }

    /// State a non-terminal validation should move to given its signatures
    /// and whether its transition is vetoed.
    pub fn next_state(&self, validation: &TransitionValidation, vetoed: bool) -> ValidationState {
        if validation.signatures.is_empty() {
            ValidationState::Pending
        } else if !self.threshold_met(validation) {
            ValidationState::PartialSigned
        } else if vetoed {
            ValidationState::Rejected
        } else if self.require_precheck && !validation.policy_precheck_passed {
            ValidationState::PartialSigned
        } else {
            ValidationState::FullySigned
        }
    }
}

impl Default for ApprovalRules {
    fn default() -> Self {
        Self::from_config(&CoordinatorConfig::default())
    }
}

#[derive(Debug, Default)]
struct GateIndex {
    validations: IndexMap<ValidationId, ValidationHandle>,
    by_transition: HashMap<TransitionId, Vec<ValidationId>>,
}

/// Co-signature gate over transition validations.
pub struct SignatureGate {
    rules: ApprovalRules,
    index: RwLock<GateIndex>,
    escalation: Arc<EscalationController>,
    policy: Arc<dyn PolicySource>,
    clock: Arc<dyn Clock>,
}

impl SignatureGate {
    /// Create a gate consulting `escalation` for vetoes and `policy` for
    /// prechecks.
    pub fn new(
        rules: ApprovalRules,
        escalation: Arc<EscalationController>,
        policy: Arc<dyn PolicySource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            rules,
            index: RwLock::new(GateIndex::default()),
            escalation,
            policy,
            clock,
        }
    }

    /// Approval rules in force.
    pub fn rules(&self) -> ApprovalRules {
        self.rules
    }

    /// Open a validation for `transition_id`.
    ///
    /// The context must carry `originNode`, `destinationNode` and
    /// `dataClass`; otherwise nothing is created. The policy hash and
    /// precheck are captured once, here. A transition that is already vetoed
    /// opens directly as `Rejected`.
    pub async fn open_transition(
        &self,
        transition_id: TransitionId,
        context: BTreeMap<String, String>,
    ) -> CoordinatorResult<TransitionValidation> {
        let missing = missing_context_keys(&context);
        if !missing.is_empty() {
            return Err(CoordinatorError::invalid_context(missing));
        }

        let policy_hash = self.policy.current_policy_hash().await;
        let precheck_passed = self.policy.precheck(&context).await;
        let mut validation = TransitionValidation::new(
            transition_id,
            context,
            precheck_passed,
            policy_hash,
            self.clock.now(),
        );

        {
            let mut index = self.index.write();
            if self.escalation.is_vetoed(&validation.transition_id) {
                validation.state = ValidationState::Rejected;
            }
            index
                .by_transition
                .entry(validation.transition_id.clone())
                .or_default()
                .push(validation.id);
            index
                .validations
                .insert(validation.id, Arc::new(Mutex::new(validation.clone())));
        }

        info!(
            validation_id = %validation.id,
            transition_id = %validation.transition_id,
            precheck = precheck_passed,
            state = %validation.state,
            "Opened transition validation"
        );
        Ok(validation)
    }

    /// Append `signature` from `signer_id` and recompute the state.
    pub fn add_signature(
        &self,
        validation_id: &ValidationId,
        signer_id: &str,
        signature: Signature,
    ) -> CoordinatorResult<TransitionValidation> {
        if signature.signer_id != signer_id {
            return Err(CoordinatorError::SignerMismatch {
                expected: signer_id.to_string(),
                actual: signature.signer_id,
            });
        }
        let handle = self.handle(validation_id)?;

        let mut validation = handle.lock();
        if validation.state.is_terminal() {
            return Err(CoordinatorError::already_final(
                validation_id.to_string(),
                validation.state.to_string(),
            ));
        }
        validation.signatures.push(signature);

        let vetoed = self.escalation.is_vetoed(&validation.transition_id);
        let previous = validation.state;
        validation.state = self.rules.next_state(&validation, vetoed);

        debug!(
            validation_id = %validation_id,
            signer_id,
            counted = validation.counted_signatures(self.rules.signer_policy),
            threshold = self.rules.threshold,
            state = %validation.state,
            "Signature added"
        );
        if previous != validation.state && validation.state.is_terminal() {
            info!(
                validation_id = %validation_id,
                transition_id = %validation.transition_id,
                state = %validation.state,
                "Transition validation decided"
            );
        } else if self.rules.threshold_met(&validation)
            && validation.state == ValidationState::PartialSigned
        {
            info!(
                validation_id = %validation_id,
                "Threshold reached but policy precheck failed; holding approval"
            );
        }
        Ok(validation.clone())
    }

    /// Reject every open validation of the transitions named by `record`.
    ///
    /// `FullySigned` validations are left alone. Returns the ids rejected by
    /// this call.
    pub fn apply_veto(&self, record: &VetoRecord) -> Vec<ValidationId> {
        let handles: Vec<ValidationHandle> = {
            let index = self.index.read();
            record
                .affected_transition_ids
                .iter()
                .filter_map(|tid| index.by_transition.get(tid))
                .flatten()
                .filter_map(|vid| index.validations.get(vid).cloned())
                .collect()
        };

        let mut rejected = Vec::new();
        for handle in handles {
            let mut validation = handle.lock();
            if validation.state.is_terminal() {
                continue;
            }
            validation.state = ValidationState::Rejected;
            info!(
                validation_id = %validation.id,
                transition_id = %validation.transition_id,
                veto_id = %record.id,
                "Transition rejected by veto"
            );
            rejected.push(validation.id);
        }
        rejected
    }

    /// Copy of one validation.
    pub fn get(&self, validation_id: &ValidationId) -> Option<TransitionValidation> {
        let handle = self.index.read().validations.get(validation_id).cloned()?;
        let validation = handle.lock().clone();
        Some(validation)
    }

    /// Validations opened for `transition_id`, oldest first.
    pub fn for_transition(&self, transition_id: &TransitionId) -> Vec<TransitionValidation> {
        let handles: Vec<ValidationHandle> = {
            let index = self.index.read();
            index
                .by_transition
                .get(transition_id)
                .into_iter()
                .flatten()
                .filter_map(|vid| index.validations.get(vid).cloned())
                .collect()
        };
        handles.iter().map(|h| h.lock().clone()).collect()
    }

    /// Copies of every validation, oldest first.
    pub fn list(&self) -> Vec<TransitionValidation> {
        let handles: Vec<ValidationHandle> =
            self.index.read().validations.values().cloned().collect();
        handles.iter().map(|h| h.lock().clone()).collect()
    }

    /// Number of validations not yet decided.
    pub fn pending_count(&self) -> usize {
        self.list()
            .iter()
            .filter(|v| !v.state.is_terminal())
            .count()
    }

    fn handle(&self, validation_id: &ValidationId) -> CoordinatorResult<ValidationHandle> {
        self.index
            .read()
            .validations
            .get(validation_id)
            .cloned()
            .ok_or_else(|| CoordinatorError::not_found("validation", validation_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::BTreeSet;
    use vacuum_core::DefaultPolicySource;
    use vacuum_testkit::{signature, transition_context, ManualClock, StaticPolicySource};

    struct Harness {
        gate: SignatureGate,
        escalation: Arc<EscalationController>,
        clock: Arc<ManualClock>,
    }

    fn harness(rules: ApprovalRules, policy: Arc<dyn PolicySource>) -> Harness {
        let clock = Arc::new(ManualClock::epoch());
        let escalation = Arc::new(EscalationController::new(clock.clone(), 1));
        let gate = SignatureGate::new(rules, Arc::clone(&escalation), policy, clock.clone());
        Harness {
            gate,
            escalation,
            clock,
        }
    }

    fn default_harness() -> Harness {
        harness(
            ApprovalRules::default(),
            Arc::new(StaticPolicySource::allowing("policy-v1")),
        )
    }

    impl Harness {
        async fn open(&self, transition: &str) -> TransitionValidation {
            self.gate
                .open_transition(
                    TransitionId::new(transition),
                    transition_context("os-1", "sv-1", "personal"),
                )
                .await
                .unwrap()
        }

        fn sign(&self, id: &ValidationId, signer: &str) -> CoordinatorResult<TransitionValidation> {
            self.gate
                .add_signature(id, signer, signature(signer, self.clock.now()))
        }
    }

    #[test]
    fn test_next_state_rules() {
        let rules = ApprovalRules {
            threshold: 2,
            signer_policy: SignerPolicy::DistinctSigners,
            require_precheck: true,
        };
        let now = chrono::Utc::now();
        let mut v = TransitionValidation::new(TransitionId::new("t"), BTreeMap::new(), true, "p", now);
        assert_eq!(rules.next_state(&v, false), ValidationState::Pending);
        v.signatures.push(signature("a", now));
        assert_eq!(rules.next_state(&v, true), ValidationState::PartialSigned);
        v.signatures.push(signature("b", now));
        assert_eq!(rules.next_state(&v, false), ValidationState::FullySigned);
        assert_eq!(rules.next_state(&v, true), ValidationState::Rejected);
        v.policy_precheck_passed = false;
        assert_eq!(rules.next_state(&v, false), ValidationState::PartialSigned);
    }

    #[tokio::test]
    async fn test_three_signers_approve() {
        let h = default_harness();
        let opened = h.open("t-1").await;
        assert_eq!(opened.state, ValidationState::Pending);
        assert_eq!(opened.policy_snapshot_hash, "policy-v1");

        assert_eq!(h.sign(&opened.id, "alice").unwrap().state, ValidationState::PartialSigned);
        assert_eq!(h.sign(&opened.id, "bob").unwrap().state, ValidationState::PartialSigned);
        assert_eq!(h.sign(&opened.id, "carol").unwrap().state, ValidationState::FullySigned);

        assert_matches!(
            h.sign(&opened.id, "dave"),
            Err(CoordinatorError::AlreadyFinal { .. })
        );
        assert_eq!(h.gate.get(&opened.id).unwrap().signatures.len(), 3);
    }

    #[tokio::test]
    async fn test_repeat_signer_counts_once_by_default() {
        let h = default_harness();
        let opened = h.open("t-1").await;
        for _ in 0..3 {
            h.sign(&opened.id, "alice").unwrap();
        }
        let v = h.gate.get(&opened.id).unwrap();
        assert_eq!(v.signatures.len(), 3);
        assert_eq!(v.state, ValidationState::PartialSigned);
    }

    #[tokio::test]
    async fn test_count_every_signature_policy() {
        let rules = ApprovalRules {
            signer_policy: SignerPolicy::CountEverySignature,
            ..ApprovalRules::default()
        };
        let h = harness(rules, Arc::new(StaticPolicySource::allowing("p")));
        let opened = h.open("t-1").await;
        h.sign(&opened.id, "alice").unwrap();
        h.sign(&opened.id, "alice").unwrap();
        assert_eq!(h.sign(&opened.id, "alice").unwrap().state, ValidationState::FullySigned);
    }

    #[tokio::test]
    async fn test_missing_context_creates_nothing() {
        let h = default_harness();
        let mut context = transition_context("os-1", "sv-1", "personal");
        context.remove("dataClass");
        let err = h
            .gate
            .open_transition(TransitionId::new("t-1"), context)
            .await
            .unwrap_err();
        assert_matches!(err, CoordinatorError::InvalidContext { missing } if missing == vec!["dataClass".to_string()]);
        assert!(h.gate.list().is_empty());
    }

    #[tokio::test]
    async fn test_signer_mismatch() {
        let h = default_harness();
        let opened = h.open("t-1").await;
        let err = h
            .gate
            .add_signature(&opened.id, "alice", signature("mallory", h.clock.now()))
            .unwrap_err();
        assert_matches!(err, CoordinatorError::SignerMismatch { .. });
        assert!(h.gate.get(&opened.id).unwrap().signatures.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_validation() {
        let h = default_harness();
        assert_matches!(
            h.sign(&ValidationId::new_random(), "alice"),
            Err(CoordinatorError::NotFound { .. })
        );
    }

    #[tokio::test]
    async fn test_failed_precheck_holds_approval() {
        let h = harness(
            ApprovalRules::default(),
            Arc::new(DefaultPolicySource::new("material")),
        );
        let opened = h
            .gate
            .open_transition(
                TransitionId::new("t-1"),
                transition_context("os-1", "os-1", "personal"),
            )
            .await
            .unwrap();
        assert!(!opened.policy_precheck_passed);
        for signer in ["alice", "bob", "carol", "dave"] {
            assert_eq!(
                h.sign(&opened.id, signer).unwrap().state,
                ValidationState::PartialSigned
            );
        }
    }

    #[tokio::test]
    async fn test_veto_rejects_open_validations_only() {
        let h = default_harness();
        let approved = h.open("t-1").await;
        for signer in ["alice", "bob", "carol"] {
            h.sign(&approved.id, signer).unwrap();
        }
        let open = h.open("t-1").await;
        h.sign(&open.id, "alice").unwrap();

        let record = h
            .escalation
            .trigger("auditor", "late concern", BTreeSet::from([TransitionId::new("t-1")]));
        let rejected = h.gate.apply_veto(&record);

        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0], open.id);
        assert_eq!(
            h.gate.get(&approved.id).unwrap().state,
            ValidationState::FullySigned
        );
        assert_matches!(
            h.sign(&open.id, "bob"),
            Err(CoordinatorError::AlreadyFinal { .. })
        );
    }

    #[tokio::test]
    async fn test_vetoed_transition_opens_rejected() {
        let h = default_harness();
        h.escalation
            .trigger("auditor", "pre-emptive", BTreeSet::from([TransitionId::new("t-9")]));
        let opened = h.open("t-9").await;
        assert_eq!(opened.state, ValidationState::Rejected);
        assert_eq!(h.gate.pending_count(), 0);
        assert_eq!(h.gate.for_transition(&TransitionId::new("t-9")).len(), 1);
    }
}
