//! # Vacuum Core - Foundation
//!
//! Domain types, the unified error type, effect traits for external
//! collaborators, and configuration for the vacuum backup coordinator.
//!
//! ## What belongs here
//!
//! - Typed records: `Node`, `TransitionValidation`, `VetoRecord`, `AuditEvent`
//! - `CoordinatorError` and `CoordinatorResult`
//! - Effect traits: `StorageBackend`, `PolicySource`, `AuditSink`, `Clock`
//! - `CoordinatorConfig` loading and validation
//!
//! ## What does NOT belong here
//!
//! - Shared mutable state or locking (that's `vacuum-coordinator`)
//! - Test doubles (that's `vacuum-testkit`)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Coordinator configuration
pub mod config;

/// Effect traits for external collaborators
pub mod effects;

/// Unified error type
pub mod errors;

/// SHA-256 helpers
pub mod hash;

/// Domain records
pub mod types;

pub use config::{default_seed_nodes, CoordinatorConfig, NodeSeed};
pub use effects::{
    AuditError, AuditSink, Clock, DefaultPolicySource, PolicySource, StorageBackend,
    StorageBackendError, SystemClock, TracingAuditSink,
};
pub use errors::{CoordinatorError, CoordinatorResult};
pub use types::*;
