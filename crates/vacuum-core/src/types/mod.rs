//! Shared domain types.

pub mod audit;
pub mod identifiers;
pub mod node;
pub mod validation;
pub mod veto;

pub use audit::{AuditEvent, AuditEventKind};
pub use identifiers::{NodeId, Timestamp, TransitionId, ValidationId, VetoId};
pub use node::{BackendClass, Node, NodeFilter, NodeStatus, StatusChange};
pub use validation::{
    missing_context_keys, Signature, SignerPolicy, TransitionValidation, ValidationState,
    REQUIRED_CONTEXT_KEYS,
};
pub use veto::{OverflowState, ResolutionStatus, VetoRecord};
