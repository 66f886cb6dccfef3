//! Triple-Sign gate and escalation integration tests.

use assert_matches::assert_matches;
use std::collections::BTreeSet;
use std::sync::Arc;
use vacuum_coordinator::Coordinator;
use vacuum_core::{
    AuditEventKind, CoordinatorConfig, CoordinatorError, OverflowState, SignerPolicy,
    TransitionId, ValidationState,
};
use vacuum_testkit::{
    signature, test_config, three_node_scenario, transition_context, MemoryStorageBackend,
    RecordingAuditSink, StaticPolicySource,
};

fn coordinator_with(config: CoordinatorConfig, audit: Arc<RecordingAuditSink>) -> Arc<Coordinator> {
    Arc::new(
        Coordinator::builder()
            .with_config(config)
            .with_nodes(three_node_scenario())
            .with_backend(Arc::new(MemoryStorageBackend::new()))
            .with_policy(Arc::new(StaticPolicySource::allowing("policy-v1")))
            .with_audit(audit)
            .build()
            .unwrap(),
    )
}

fn coordinator() -> Arc<Coordinator> {
    coordinator_with(test_config(), Arc::new(RecordingAuditSink::new()))
}

fn ids(raw: &[&str]) -> BTreeSet<TransitionId> {
    raw.iter().map(|id| TransitionId::new(*id)).collect()
}

async fn open(coordinator: &Coordinator, transition: &str) -> vacuum_core::TransitionValidation {
    coordinator
        .open_transition(
            TransitionId::new(transition),
            transition_context("os-a", "sv-a", "financial"),
        )
        .await
        .unwrap()
}

async fn sign(
    coordinator: &Coordinator,
    validation: &vacuum_core::ValidationId,
    signer: &str,
) -> Result<vacuum_core::TransitionValidation, CoordinatorError> {
    coordinator
        .add_signature(validation, signer, signature(signer, chrono::Utc::now()))
        .await
}

#[tokio::test]
async fn test_two_signers_partial_three_signers_full() {
    let audit = Arc::new(RecordingAuditSink::new());
    let coordinator = coordinator_with(test_config(), Arc::clone(&audit));
    let v = open(&coordinator, "move-42").await;

    assert_eq!(sign(&coordinator, &v.id, "alice").await.unwrap().state, ValidationState::PartialSigned);
    assert_eq!(sign(&coordinator, &v.id, "bob").await.unwrap().state, ValidationState::PartialSigned);
    let done = sign(&coordinator, &v.id, "carol").await.unwrap();

    assert_eq!(done.state, ValidationState::FullySigned);
    assert_eq!(done.policy_snapshot_hash, "policy-v1");
    coordinator.flush_audit().await;
    assert_eq!(audit.count(AuditEventKind::TransitionOpened), 1);
    assert_eq!(audit.count(AuditEventKind::SignatureAdded), 3);
}

#[tokio::test]
async fn test_veto_then_threshold_signature_rejects() {
    let coordinator = coordinator();
    let pending = open(&coordinator, "t-pending").await;
    let partial = open(&coordinator, "t-partial").await;
    sign(&coordinator, &partial.id, "alice").await.unwrap();
    sign(&coordinator, &partial.id, "bob").await.unwrap();

    let outcome = coordinator
        .trigger_veto("auditor", "suspicious destination", ids(&["t-pending", "t-partial"]))
        .await;
    assert_eq!(outcome.rejected.len(), 2);

    for v in [&pending, &partial] {
        assert_eq!(
            coordinator.gate().get(&v.id).unwrap().state,
            ValidationState::Rejected
        );
        assert_matches!(
            sign(&coordinator, &v.id, "carol").await,
            Err(CoordinatorError::AlreadyFinal { .. })
        );
    }
}

#[tokio::test]
async fn test_veto_after_approval_keeps_approval() {
    let coordinator = coordinator();
    let v = open(&coordinator, "t-1").await;
    for signer in ["alice", "bob", "carol"] {
        sign(&coordinator, &v.id, signer).await.unwrap();
    }

    let outcome = coordinator
        .trigger_veto("auditor", "too late", ids(&["t-1"]))
        .await;

    assert!(outcome.rejected.is_empty());
    assert_eq!(
        coordinator.gate().get(&v.id).unwrap().state,
        ValidationState::FullySigned
    );
    assert!(coordinator.escalation().is_vetoed(&TransitionId::new("t-1")));
}

#[tokio::test]
async fn test_reopened_vetoed_transition_is_rejected() {
    let audit = Arc::new(RecordingAuditSink::new());
    let coordinator = coordinator_with(test_config(), Arc::clone(&audit));
    coordinator
        .trigger_veto("auditor", "blocked", ids(&["t-blocked"]))
        .await;

    let v = open(&coordinator, "t-blocked").await;

    assert_eq!(v.state, ValidationState::Rejected);
    coordinator.flush_audit().await;
    assert_eq!(audit.count(AuditEventKind::TransitionRejected), 1);
}

#[tokio::test]
async fn test_escalation_is_monotonic_until_reset() {
    let audit = Arc::new(RecordingAuditSink::new());
    let coordinator = coordinator_with(test_config(), Arc::clone(&audit));
    let mut previous = coordinator.escalation().current_state();
    assert_eq!(previous, OverflowState::Normal);

    for round in 0..6 {
        let outcome = coordinator
            .trigger_veto("auditor", &format!("round {round}"), BTreeSet::new())
            .await;
        let current = coordinator.escalation().current_state();
        assert!(current >= previous);
        assert_eq!(outcome.record.overflow_state, current);
        previous = current;
    }
    assert_eq!(previous, OverflowState::VetoActive);
    assert_eq!(coordinator.escalation().records().len(), 6);

    assert_matches!(
        coordinator.reset_escalation(["alice", "bob"]).await,
        Err(CoordinatorError::Unauthorized { .. })
    );
    assert_eq!(coordinator.escalation().current_state(), OverflowState::VetoActive);

    let reset = coordinator
        .reset_escalation(["alice", "bob", "carol"])
        .await
        .unwrap();
    assert_eq!(reset.previous_state, OverflowState::VetoActive);
    assert_eq!(reset.resolved.len(), 6);
    assert_eq!(coordinator.escalation().current_state(), OverflowState::Normal);
    coordinator.flush_audit().await;
    assert_eq!(audit.count(AuditEventKind::EscalationReset), 1);
}

#[tokio::test]
async fn test_invalid_context_and_signer_mismatch() {
    let coordinator = coordinator();
    let mut context = transition_context("os-a", "sv-a", "financial");
    context.remove("originNode");
    context.remove("destinationNode");
    let err = coordinator
        .open_transition(TransitionId::new("t-x"), context)
        .await
        .unwrap_err();
    assert_matches!(err, CoordinatorError::InvalidContext { ref missing } if missing.len() == 2);
    assert!(coordinator.gate().list().is_empty());

    let v = open(&coordinator, "t-y").await;
    let err = coordinator
        .add_signature(&v.id, "alice", signature("eve", chrono::Utc::now()))
        .await
        .unwrap_err();
    assert_matches!(err, CoordinatorError::SignerMismatch { .. });
}

#[tokio::test]
async fn test_source_counting_policy_accepts_repeat_signers() {
    let config = CoordinatorConfig {
        signer_policy: SignerPolicy::CountEverySignature,
        ..test_config()
    };
    let coordinator = coordinator_with(config, Arc::new(RecordingAuditSink::new()));
    let v = open(&coordinator, "t-1").await;
    sign(&coordinator, &v.id, "alice").await.unwrap();
    sign(&coordinator, &v.id, "alice").await.unwrap();
    let done = sign(&coordinator, &v.id, "alice").await.unwrap();
    assert_eq!(done.state, ValidationState::FullySigned);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_signers_decide_exactly_once() {
    let coordinator = coordinator();
    let v = open(&coordinator, "t-race").await;

    let tasks: Vec<_> = (0..12)
        .map(|i| {
            let coordinator = Arc::clone(&coordinator);
            let id = v.id;
            tokio::spawn(async move {
                let signer = format!("signer-{i}");
                coordinator
                    .add_signature(&id, &signer, signature(&signer, chrono::Utc::now()))
                    .await
            })
        })
        .collect();

    let mut accepted = 0;
    let mut approvals = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(validation) => {
                accepted += 1;
                if validation.state == ValidationState::FullySigned {
                    approvals += 1;
                }
            }
            Err(err) => assert_matches!(err, CoordinatorError::AlreadyFinal { .. }),
        }
    }

    assert_eq!(accepted, 3);
    assert_eq!(approvals, 1);
    let final_state = coordinator.gate().get(&v.id).unwrap();
    assert_eq!(final_state.state, ValidationState::FullySigned);
    assert_eq!(final_state.signatures.len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_veto_never_leaves_vetoed_approval_open() {
    for round in 0..20 {
        let coordinator = coordinator();
        let transition = format!("t-{round}");
        let v = open(&coordinator, &transition).await;
        sign(&coordinator, &v.id, "alice").await.unwrap();
        sign(&coordinator, &v.id, "bob").await.unwrap();

        let signer = {
            let coordinator = Arc::clone(&coordinator);
            let id = v.id;
            tokio::spawn(async move { sign(&coordinator, &id, "carol").await })
        };
        let veto = {
            let coordinator = Arc::clone(&coordinator);
            let affected = ids(&[transition.as_str()]);
            tokio::spawn(async move { coordinator.trigger_veto("auditor", "race", affected).await })
        };
        let signed = signer.await.unwrap();
        let outcome = veto.await.unwrap();

        let state = coordinator.gate().get(&v.id).unwrap().state;
        assert!(state.is_terminal());
        match signed {
            Ok(validation) => assert_eq!(validation.state, state),
            Err(err) => {
                assert_matches!(err, CoordinatorError::AlreadyFinal { .. });
                assert!(outcome.rejected.contains(&v.id));
            }
        }
        if outcome.rejected.contains(&v.id) {
            assert_eq!(state, ValidationState::Rejected);
        }
        if state == ValidationState::FullySigned {
            assert!(outcome.rejected.is_empty());
        }
    }
}
