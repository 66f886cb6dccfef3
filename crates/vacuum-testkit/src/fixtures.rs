//! Reusable test fixtures.

use std::collections::BTreeMap;
use vacuum_core::{
    default_seed_nodes, hash::sha256_hex, BackendClass, CoordinatorConfig, Node, Signature,
    Timestamp,
};

/// Node with an endpoint and region derived from its id.
pub fn node(id: &str, backend_class: BackendClass, capacity_bytes: u64) -> Node {
    Node::new(
        id,
        backend_class,
        format!("mem://{id}"),
        "test-region",
        capacity_bytes,
    )
}

/// One object store and two server volumes of 1000 bytes each, the object
/// store primary.
pub fn three_node_scenario() -> Vec<Node> {
    vec![
        node("os-a", BackendClass::ObjectStore, 1000).primary(),
        node("sv-a", BackendClass::ServerVolume, 1000),
        node("sv-b", BackendClass::ServerVolume, 1000),
    ]
}

/// The default six-node seed set, empty and active.
pub fn seeded_fleet() -> Vec<Node> {
    default_seed_nodes().iter().map(|seed| seed.to_node()).collect()
}

/// Config with no seed nodes and a short write timeout.
pub fn test_config() -> CoordinatorConfig {
    CoordinatorConfig {
        seed_nodes: Vec::new(),
        backend_write_timeout_ms: 250,
        ..CoordinatorConfig::default()
    }
}

/// Context carrying the three required keys.
pub fn transition_context(origin: &str, destination: &str, data_class: &str) -> BTreeMap<String, String> {
    let mut context = BTreeMap::new();
    context.insert("originNode".to_string(), origin.to_string());
    context.insert("destinationNode".to_string(), destination.to_string());
    context.insert("dataClass".to_string(), data_class.to_string());
    context
}

/// Custodian signature whose hash is derived from the signer id.
pub fn signature(signer_id: &str, signed_at: Timestamp) -> Signature {
    Signature::new(
        signer_id,
        "custodian",
        sha256_hex(signer_id.as_bytes()),
        signed_at,
    )
}
