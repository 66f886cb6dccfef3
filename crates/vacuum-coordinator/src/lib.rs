//! # Vacuum Coordinator
//!
//! Replicates opaque payloads across heterogeneous storage backends, gates
//! sensitive data transitions behind co-signatures with an escalation veto,
//! and keeps backend utilisation balanced.
//!
//! ## Components
//!
//! - [`registry`]: authoritative node store with per-node locking
//! - [`orchestrator`]: backup fan-out and replication tier classification
//! - [`gate`]: Triple-Sign transition validation
//! - [`escalation`]: overflow state machine and veto log
//! - [`balance`]: health synchronisation and rebalancing
//! - [`compliance`]: five-principle policy evaluation
//! - [`anchor`]: hash-chained registry snapshots
//! - [`audit`]: background audit delivery
//! - [`coordinator`]: facade wiring the above to injected collaborators
//! - [`scheduler`]: periodic sync loop
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vacuum_coordinator::Coordinator;
//! # async fn example(backend: Arc<dyn vacuum_core::StorageBackend>) -> vacuum_core::CoordinatorResult<()> {
//! let coordinator = Coordinator::builder().with_backend(backend).build()?;
//! let report = coordinator.backup(b"payload", Default::default()).await;
//! println!("tier: {}", report.tier);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod anchor;
pub mod audit;
pub mod balance;
pub mod compliance;
pub mod coordinator;
pub mod escalation;
pub mod gate;
pub mod orchestrator;
pub mod registry;
pub mod scheduler;

pub use anchor::{AnchorChain, AnchorEntry, GENESIS_HASH};
pub use audit::AuditDispatcher;
pub use balance::{
    balance_coefficient, BalanceEngine, BalanceReport, HealthThresholds, NodeAdjustment,
    RebalancePlan, SyncReport,
};
pub use compliance::{evaluate, ComplianceInputs, ComplianceReport, Principle};
pub use coordinator::{Coordinator, CoordinatorBuilder, CoordinatorStatus, VetoOutcome};
pub use escalation::{EscalationController, EscalationReset};
pub use gate::{ApprovalRules, SignatureGate};
pub use orchestrator::{
    BackupOrchestrator, BackupReport, FailureReason, NodeBackupResult, NodeOutcome,
    ReplicationTier,
};
pub use registry::{NodeRegistry, RegistryStatistics};
pub use scheduler::{SchedulerHandle, SchedulerStatistics, SyncScheduler};
