//! Policy source effect.
//!
//! The signature gate consults the policy source exactly once per transition,
//! at open time, outside any lock.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::hash::sha256_hex;

/// Supplies policy material and transition prechecks.
#[async_trait]
pub trait PolicySource: Send + Sync {
    /// Hash identifying the policy currently in force.
    async fn current_policy_hash(&self) -> String;

    /// Whether a transition with this context may proceed to signing.
    async fn precheck(&self, context: &BTreeMap<String, String>) -> bool;
}

/// Policy source backed by configured policy material.
///
/// The policy hash is the SHA-256 of the material. The precheck rejects
/// transitions whose origin and destination name the same node, since such a
/// move relocates nothing.
#[derive(Debug, Clone)]
pub struct DefaultPolicySource {
    policy_hash: String,
}

impl DefaultPolicySource {
    /// Build from raw policy material.
    pub fn new(policy_material: &str) -> Self {
        Self {
            policy_hash: sha256_hex(policy_material.as_bytes()),
        }
    }
}

#[async_trait]
impl PolicySource for DefaultPolicySource {
    async fn current_policy_hash(&self) -> String {
        self.policy_hash.clone()
    }

    async fn precheck(&self, context: &BTreeMap<String, String>) -> bool {
        match (context.get("originNode"), context.get("destinationNode")) {
            (Some(origin), Some(destination)) => origin != destination,
            _ => false,
        }
    }
}
