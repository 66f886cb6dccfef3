//! Property test strategies for vacuum types.

use proptest::prelude::*;

// Re-export proptest for convenience
pub use proptest;

use vacuum_core::{BackendClass, Node};

/// Any backend class.
pub fn arb_backend_class() -> impl Strategy<Value = BackendClass> {
    prop_oneof![
        Just(BackendClass::ObjectStore),
        Just(BackendClass::ServerVolume),
        Just(BackendClass::CloudVolume),
    ]
}

/// Between one and `max` nodes with unique ids, capacities up to 4096 bytes
/// and usage at or below capacity.
pub fn arb_fleet(max: usize) -> impl Strategy<Value = Vec<Node>> {
    prop::collection::vec((arb_backend_class(), 0u64..=4096, 0u64..=100), 1..=max).prop_map(
        |specs| {
            specs
                .into_iter()
                .enumerate()
                .map(|(index, (class, capacity, used_pct))| {
                    Node::new(
                        format!("node-{index}"),
                        class,
                        format!("mem://node-{index}"),
                        "prop",
                        capacity,
                    )
                    .with_used(capacity * used_pct / 100)
                })
                .collect()
        },
    )
}

/// Payload sizes from empty up to `max` bytes.
pub fn arb_payload(max: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max)
}
