//! Effect traits for the coordinator's external collaborators.
//!
//! Each collaborator is a trait so hosts can plug in real transports and tests
//! can plug in deterministic handlers (see `vacuum-testkit`):
//! - `StorageBackend`: per-node payload writes
//! - `PolicySource`: policy hash and transition precheck
//! - `AuditSink`: best-effort event delivery
//! - `Clock`: wall-clock timestamps

pub mod audit;
pub mod policy;
pub mod storage;
pub mod time;

pub use audit::{AuditError, AuditSink, TracingAuditSink};
pub use policy::{DefaultPolicySource, PolicySource};
pub use storage::{StorageBackend, StorageBackendError};
pub use time::{Clock, SystemClock};
