//! Unified error system for the vacuum coordinator
//!
//! A single error type covers every caller-visible failure. Per-node failures
//! during a backup (`CapacityExceeded`, `Backend`, `Timeout`) are normally
//! folded into the backup report rather than returned; the remaining variants
//! are caller errors and are always returned before any state is mutated.

use serde::{Deserialize, Serialize};

/// Unified error type for all coordinator operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum CoordinatorError {
    /// A usage delta would push a node past its capacity
    #[error("Capacity exceeded on node {node_id}: requested {requested} bytes, {available} available")]
    CapacityExceeded {
        /// Node that rejected the write
        node_id: String,
        /// Bytes the caller tried to add
        requested: u64,
        /// Bytes still free on the node
        available: u64,
    },

    /// The storage backend refused or failed the write
    #[error("Backend error on node {node_id}: {message}")]
    Backend {
        /// Node whose backend failed
        node_id: String,
        /// Backend-provided detail
        message: String,
    },

    /// The storage backend did not answer in time
    #[error("Backend write to node {node_id} timed out after {timeout_ms}ms")]
    Timeout {
        /// Node whose backend timed out
        node_id: String,
        /// Configured write timeout
        timeout_ms: u64,
    },

    /// Unknown identifier
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind ("node", "validation", "veto")
        kind: String,
        /// Identifier that failed to resolve
        id: String,
    },

    /// Registration of an identifier that already exists
    #[error("Already exists: {id}")]
    AlreadyExists {
        /// Conflicting identifier
        id: String,
    },

    /// Mutation attempted on a validation in a terminal state
    #[error("Validation {validation_id} is already final ({state})")]
    AlreadyFinal {
        /// Validation identifier
        validation_id: String,
        /// Terminal state the validation is in
        state: String,
    },

    /// Required transition context keys are missing
    #[error("Invalid transition context: missing {missing:?}")]
    InvalidContext {
        /// Keys that were absent
        missing: Vec<String>,
    },

    /// Signature payload names a different signer than the submitter
    #[error("Signer mismatch: submitted by {expected}, signature names {actual}")]
    SignerMismatch {
        /// Signer id supplied with the call
        expected: String,
        /// Signer id carried inside the signature
        actual: String,
    },

    /// Operation requires an authorisation that was not supplied
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// What was missing
        message: String,
    },

    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration problem
        message: String,
    },

    /// Anchor chain link does not match its recomputed hash
    #[error("Anchor chain broken at sequence {sequence}")]
    ChainBroken {
        /// First entry whose link failed verification
        sequence: u64,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message describing the serialization failure
        message: String,
    },
}

impl CoordinatorError {
    /// Create a capacity exceeded error
    pub fn capacity_exceeded(node_id: impl Into<String>, requested: u64, available: u64) -> Self {
        Self::CapacityExceeded {
            node_id: node_id.into(),
            requested,
            available,
        }
    }

    /// Create a backend error
    pub fn backend(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            node_id: node_id.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(node_id: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            node_id: node_id.into(),
            timeout_ms,
        }
    }

    /// Create a not found error
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Create an already exists error
    pub fn already_exists(id: impl Into<String>) -> Self {
        Self::AlreadyExists { id: id.into() }
    }

    /// Create an already final error
    pub fn already_final(validation_id: impl Into<String>, state: impl Into<String>) -> Self {
        Self::AlreadyFinal {
            validation_id: validation_id.into(),
            state: state.into(),
        }
    }

    /// Create an invalid context error
    pub fn invalid_context(missing: Vec<String>) -> Self {
        Self::InvalidContext { missing }
    }

    /// Create an unauthorized error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Whether this error is a per-node failure that degrades a backup
    /// rather than a caller error.
    pub fn is_per_node(&self) -> bool {
        matches!(
            self,
            Self::CapacityExceeded { .. } | Self::Backend { .. } | Self::Timeout { .. }
        )
    }
}

/// Standard Result type for coordinator operations
pub type CoordinatorResult<T> = std::result::Result<T, CoordinatorError>;

impl From<serde_json::Error> for CoordinatorError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<toml::de::Error> for CoordinatorError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(err.to_string())
    }
}

impl From<std::io::Error> for CoordinatorError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found("file", err.to_string()),
            _ => Self::config(err.to_string()),
        }
    }
}
