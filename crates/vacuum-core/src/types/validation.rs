//! Transition validation records for the Triple-Sign gate.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::identifiers::{Timestamp, TransitionId, ValidationId};

/// Context keys every transition must carry.
pub const REQUIRED_CONTEXT_KEYS: [&str; 3] = ["originNode", "destinationNode", "dataClass"];

/// Lifecycle of a transition validation.
///
/// `Pending -> PartialSigned -> FullySigned` is monotonic; `Rejected` can be
/// reached from either non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationState {
    /// No signatures yet
    Pending,
    /// Some signatures, threshold not reached
    PartialSigned,
    /// Threshold reached with no veto
    FullySigned,
    /// Vetoed before approval
    Rejected,
}

impl ValidationState {
    /// Terminal states accept no further mutation.
    pub fn is_terminal(self) -> bool {
        matches!(self, ValidationState::FullySigned | ValidationState::Rejected)
    }
}

impl fmt::Display for ValidationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How signatures count towards the threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignerPolicy {
    /// Only distinct signer ids count
    #[default]
    DistinctSigners,
    /// Every appended signature counts, including repeats from one signer
    CountEverySignature,
}

/// One co-signature on a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Signer identity
    pub signer_id: String,
    /// When the signer produced the signature
    pub signed_at: Timestamp,
    /// Opaque signature digest
    pub signature_hash: String,
    /// Signer role label (e.g. "custodian", "auditor")
    pub signer_class: String,
}

impl Signature {
    /// Build a signature record.
    pub fn new(
        signer_id: impl Into<String>,
        signer_class: impl Into<String>,
        signature_hash: impl Into<String>,
        signed_at: Timestamp,
    ) -> Self {
        Self {
            signer_id: signer_id.into(),
            signed_at,
            signature_hash: signature_hash.into(),
            signer_class: signer_class.into(),
        }
    }
}

/// Pending or decided approval of a sensitive data transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionValidation {
    /// Validation identifier
    pub id: ValidationId,
    /// Transition this validation gates
    pub transition_id: TransitionId,
    /// Creation time
    pub created_at: Timestamp,
    /// Signatures in arrival order
    pub signatures: Vec<Signature>,
    /// Current state
    pub state: ValidationState,
    /// Policy precheck result captured at open time
    pub policy_precheck_passed: bool,
    /// Policy hash captured at open time
    pub policy_snapshot_hash: String,
    /// Caller-supplied transition context
    pub context: BTreeMap<String, String>,
}

impl TransitionValidation {
    /// Fresh pending validation.
    pub fn new(
        transition_id: TransitionId,
        context: BTreeMap<String, String>,
        policy_precheck_passed: bool,
        policy_snapshot_hash: impl Into<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: ValidationId::new_random(),
            transition_id,
            created_at,
            signatures: Vec::new(),
            state: ValidationState::Pending,
            policy_precheck_passed,
            policy_snapshot_hash: policy_snapshot_hash.into(),
            context,
        }
    }

    /// Number of distinct signer ids.
    pub fn distinct_signers(&self) -> usize {
        self.signatures
            .iter()
            .map(|s| s.signer_id.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Signatures that count towards the threshold under `policy`.
    pub fn counted_signatures(&self, policy: SignerPolicy) -> usize {
        match policy {
            SignerPolicy::DistinctSigners => self.distinct_signers(),
            SignerPolicy::CountEverySignature => self.signatures.len(),
        }
    }

    /// Whether a signer has already signed.
    pub fn has_signed(&self, signer_id: &str) -> bool {
        self.signatures.iter().any(|s| s.signer_id == signer_id)
    }
}

/// Required context keys absent from `context`, in canonical order.
pub fn missing_context_keys(context: &BTreeMap<String, String>) -> Vec<String> {
    REQUIRED_CONTEXT_KEYS
        .iter()
        .filter(|key| !context.contains_key(**key))
        .map(|key| key.to_string())
        .collect()
}
