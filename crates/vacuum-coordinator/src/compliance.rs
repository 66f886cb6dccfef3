//! Policy compliance evaluation.
//!
//! Five principles, each a pure predicate over a snapshot of coordinator
//! state. Evaluation takes no locks; callers assemble `ComplianceInputs` from
//! copies.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use vacuum_core::{
    CoordinatorConfig, Node, NodeStatus, OverflowState, TransitionValidation, ValidationState,
};

use crate::balance::balance_coefficient;
use crate::gate::ApprovalRules;

/// A compliance principle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Principle {
    /// At least one primary node is active
    SymbioticLink,
    /// The coordinator is not in veto mode
    EthicalCoherence,
    /// Enough nodes are active
    DistributedResilience,
    /// Every approval met the signature and precheck rules
    TransitionalIntegrity,
    /// Class utilisation is balanced
    ConfigurationBalance,
}

impl Principle {
    /// All principles in evaluation order.
    pub const ALL: [Principle; 5] = [
        Principle::SymbioticLink,
        Principle::EthicalCoherence,
        Principle::DistributedResilience,
        Principle::TransitionalIntegrity,
        Principle::ConfigurationBalance,
    ];
}

impl fmt::Display for Principle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Principle::SymbioticLink => "symbiotic_link",
            Principle::EthicalCoherence => "ethical_coherence",
            Principle::DistributedResilience => "distributed_resilience",
            Principle::TransitionalIntegrity => "transitional_integrity",
            Principle::ConfigurationBalance => "configuration_balance",
        };
        f.write_str(name)
    }
}

/// Thresholds the predicates compare against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComplianceThresholds {
    /// Minimum active nodes for distributed resilience
    pub min_active_nodes: usize,
    /// Balance coefficient must stay strictly below this
    pub balance_ceiling: f64,
    /// Rules every `FullySigned` validation must satisfy
    pub approval: ApprovalRules,
}

impl ComplianceThresholds {
    /// Thresholds from coordinator configuration.
    pub fn from_config(config: &CoordinatorConfig) -> Self {
        Self {
            min_active_nodes: config.min_active_nodes,
            balance_ceiling: config.balance_ceiling,
            approval: ApprovalRules::from_config(config),
        }
    }
}

/// Snapshot the predicates evaluate.
#[derive(Debug, Clone, Copy)]
pub struct ComplianceInputs<'a> {
    /// Registry snapshot
    pub nodes: &'a [Node],
    /// Escalation state
    pub overflow_state: OverflowState,
    /// Every known validation
    pub validations: &'a [TransitionValidation],
}

/// Per-principle verdicts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceReport {
    /// Verdict for each principle
    pub principles: BTreeMap<Principle, bool>,
}

impl ComplianceReport {
    /// Whether every principle holds.
    pub fn all_passed(&self) -> bool {
        self.principles.values().all(|passed| *passed)
    }

    /// Principles that do not hold.
    pub fn failing(&self) -> Vec<Principle> {
        self.principles
            .iter()
            .filter(|(_, passed)| !**passed)
            .map(|(principle, _)| *principle)
            .collect()
    }

    /// Verdict for one principle.
    pub fn passed(&self, principle: Principle) -> bool {
        self.principles.get(&principle).copied().unwrap_or(false)
    }
}

/// Evaluate every principle against `inputs`.
pub fn evaluate(inputs: &ComplianceInputs<'_>, thresholds: &ComplianceThresholds) -> ComplianceReport {
    let principles = Principle::ALL
        .iter()
        .map(|principle| (*principle, check(*principle, inputs, thresholds)))
        .collect();
    ComplianceReport { principles }
}

fn check(principle: Principle, inputs: &ComplianceInputs<'_>, thresholds: &ComplianceThresholds) -> bool {
    match principle {
        Principle::SymbioticLink => inputs
            .nodes
            .iter()
            .any(|n| n.is_primary && n.status == NodeStatus::Active),
        Principle::EthicalCoherence => inputs.overflow_state != OverflowState::VetoActive,
        Principle::DistributedResilience => {
            inputs
                .nodes
                .iter()
                .filter(|n| n.status == NodeStatus::Active)
                .count()
                >= thresholds.min_active_nodes
        }
        Principle::TransitionalIntegrity => inputs
            .validations
            .iter()
            .filter(|v| v.state == ValidationState::FullySigned)
            .all(|v| {
                thresholds.approval.threshold_met(v)
                    && (!thresholds.approval.require_precheck || v.policy_precheck_passed)
            }),
        Principle::ConfigurationBalance => {
            balance_coefficient(inputs.nodes) < thresholds.balance_ceiling
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vacuum_core::{BackendClass, SignerPolicy, TransitionId};
    use vacuum_testkit::{node, seeded_fleet, signature};

    fn thresholds() -> ComplianceThresholds {
        ComplianceThresholds {
            min_active_nodes: 5,
            balance_ceiling: 0.1,
            approval: ApprovalRules {
                threshold: 3,
                signer_policy: SignerPolicy::DistinctSigners,
                require_precheck: true,
            },
        }
    }

    fn approved(signers: &[&str], precheck: bool) -> TransitionValidation {
        let now = chrono::Utc::now();
        let mut v = TransitionValidation::new(
            TransitionId::new("t"),
            Default::default(),
            precheck,
            "p",
            now,
        );
        v.signatures = signers.iter().map(|s| signature(s, now)).collect();
        v.state = ValidationState::FullySigned;
        v
    }

    #[test]
    fn test_healthy_fleet_passes_everything() {
        let nodes = seeded_fleet();
        let validations = vec![approved(&["a", "b", "c"], true)];
        let report = evaluate(
            &ComplianceInputs {
                nodes: &nodes,
                overflow_state: OverflowState::Critical,
                validations: &validations,
            },
            &thresholds(),
        );
        assert!(report.all_passed(), "failing: {:?}", report.failing());
        assert_eq!(report.principles.len(), 5);
    }

    #[test]
    fn test_each_principle_can_fail() {
        let mut nodes = seeded_fleet();
        for n in nodes.iter_mut().filter(|n| n.is_primary) {
            n.status = NodeStatus::Degraded;
        }
        nodes[1] = nodes[1].clone().with_used(nodes[1].capacity_bytes);
        let validations = vec![approved(&["a", "a", "a"], true), approved(&["a", "b", "c"], false)];

        let report = evaluate(
            &ComplianceInputs {
                nodes: &nodes,
                overflow_state: OverflowState::VetoActive,
                validations: &validations,
            },
            &thresholds(),
        );
        assert_eq!(report.failing(), Principle::ALL.to_vec());
    }

    #[test]
    fn test_empty_inputs() {
        let report = evaluate(
            &ComplianceInputs {
                nodes: &[],
                overflow_state: OverflowState::Normal,
                validations: &[],
            },
            &thresholds(),
        );
        assert!(!report.passed(Principle::SymbioticLink));
        assert!(report.passed(Principle::EthicalCoherence));
        assert!(!report.passed(Principle::DistributedResilience));
        assert!(report.passed(Principle::TransitionalIntegrity));
        assert!(report.passed(Principle::ConfigurationBalance));
    }

    #[test]
    fn test_resilience_counts_active_only() {
        let nodes: Vec<_> = (0..5)
            .map(|i| node(&format!("n{i}"), BackendClass::ObjectStore, 10))
            .collect();
        let mut inputs_nodes = nodes.clone();
        let t = thresholds();
        let inputs = ComplianceInputs {
            nodes: &nodes,
            overflow_state: OverflowState::Normal,
            validations: &[],
        };
        assert!(evaluate(&inputs, &t).passed(Principle::DistributedResilience));

        inputs_nodes[0].status = NodeStatus::Sealed;
        let inputs = ComplianceInputs {
            nodes: &inputs_nodes,
            ..inputs
        };
        assert!(!evaluate(&inputs, &t).passed(Principle::DistributedResilience));
    }
}
