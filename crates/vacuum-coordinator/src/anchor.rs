//! Hash-chained registry snapshots.
//!
//! Every synchronisation anchors the registry snapshot it produced. Entries
//! link to their predecessor by hash, so rewriting any entry breaks every link
//! after it.
//!
//! A chain with a retention limit drops its oldest entries once the limit is
//! exceeded. The first retained entry then becomes the trust root: its own
//! hash and every later link are still checked, but what preceded it is not.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;
use vacuum_core::{
    hash::{canonical_hash, sha256_hex_parts},
    CoordinatorError, CoordinatorResult, Node, Timestamp,
};

/// Previous-hash of the first entry.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// One link in the anchor chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorEntry {
    /// Zero-based position in the chain
    pub sequence: u64,
    /// When the snapshot was anchored
    pub anchored_at: Timestamp,
    /// Nodes in the snapshot
    pub node_count: usize,
    /// SHA-256 of the snapshot's canonical JSON
    pub snapshot_hash: String,
    /// `entry_hash` of the previous entry, or `GENESIS_HASH`
    pub previous_hash: String,
    /// SHA-256 over this entry's other fields
    pub entry_hash: String,
}

impl AnchorEntry {
    fn compute_hash(
        sequence: u64,
        anchored_at: &Timestamp,
        snapshot_hash: &str,
        previous_hash: &str,
    ) -> String {
        sha256_hex_parts(&[
            sequence.to_be_bytes().as_slice(),
            anchored_at.to_rfc3339().as_bytes(),
            snapshot_hash.as_bytes(),
            previous_hash.as_bytes(),
        ])
    }

    fn expected_hash(&self) -> String {
        Self::compute_hash(
            self.sequence,
            &self.anchored_at,
            &self.snapshot_hash,
            &self.previous_hash,
        )
    }
}

/// Append-only chain of snapshot anchors.
#[derive(Debug, Default)]
pub struct AnchorChain {
    entries: Mutex<VecDeque<AnchorEntry>>,
    retention: usize,
}

impl AnchorChain {
    /// Empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain restored from persisted entries after verifying them.
    pub fn from_entries(entries: Vec<AnchorEntry>) -> CoordinatorResult<Self> {
        verify_entries(&entries)?;
        Ok(Self {
            entries: Mutex::new(entries.into()),
            retention: 0,
        })
    }

    /// Keep at most `retention` entries, dropping the oldest first. Zero keeps
    /// everything.
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        prune(self.entries.get_mut(), retention);
        self
    }

    /// Hash `snapshot` and append it.
    pub fn anchor(&self, snapshot: &[Node], anchored_at: Timestamp) -> CoordinatorResult<AnchorEntry> {
        let snapshot_hash = canonical_hash(&snapshot)?;
        let mut entries = self.entries.lock();
        let sequence = entries.back().map_or(0, |e| e.sequence + 1);
        let previous_hash = entries
            .back()
            .map_or_else(|| GENESIS_HASH.to_string(), |e| e.entry_hash.clone());
        let entry_hash =
            AnchorEntry::compute_hash(sequence, &anchored_at, &snapshot_hash, &previous_hash);
        let entry = AnchorEntry {
            sequence,
            anchored_at,
            node_count: snapshot.len(),
            snapshot_hash,
            previous_hash,
            entry_hash,
        };
        entries.push_back(entry.clone());
        prune(&mut entries, self.retention);
        debug!(sequence, hash = %entry.entry_hash, "Anchored registry snapshot");
        Ok(entry)
    }

    /// Recompute every link.
    pub fn verify(&self) -> CoordinatorResult<()> {
        verify_entries(self.entries.lock().make_contiguous())
    }

    /// Latest entry.
    pub fn head(&self) -> Option<AnchorEntry> {
        self.entries.lock().back().cloned()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing has been anchored.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Copy of every retained entry, oldest first.
    pub fn entries(&self) -> Vec<AnchorEntry> {
        self.entries.lock().iter().cloned().collect()
    }
}

fn prune(entries: &mut VecDeque<AnchorEntry>, retention: usize) {
    if retention == 0 {
        return;
    }
    while entries.len() > retention {
        entries.pop_front();
    }
}

/// Check sequence numbers, predecessor links and entry hashes.
///
/// A slice starting at sequence 0 must link to `GENESIS_HASH`; a pruned
/// slice is trusted back to its first entry's `previous_hash`.
pub fn verify_entries(entries: &[AnchorEntry]) -> CoordinatorResult<()> {
    let Some(first) = entries.first() else {
        return Ok(());
    };
    let start = first.sequence;
    let mut previous = if start == 0 {
        GENESIS_HASH
    } else {
        first.previous_hash.as_str()
    };
    for (offset, entry) in entries.iter().enumerate() {
        let sequence = start + offset as u64;
        if entry.sequence != sequence
            || entry.previous_hash != previous
            || entry.entry_hash != entry.expected_hash()
        {
            return Err(CoordinatorError::ChainBroken { sequence });
        }
        previous = entry.entry_hash.as_str();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use vacuum_core::Clock;
    use vacuum_testkit::{three_node_scenario, ManualClock};

    fn chain_of(len: usize) -> AnchorChain {
        let clock = ManualClock::epoch();
        let chain = AnchorChain::new();
        let mut nodes = three_node_scenario();
        for i in 0..len {
            nodes[0].used_bytes = i as u64;
            chain.anchor(&nodes, clock.now()).unwrap();
            clock.advance_secs(60);
        }
        chain
    }

    #[test]
    fn test_chain_links() {
        let chain = chain_of(3);
        let entries = chain.entries();
        assert_eq!(entries[0].previous_hash, GENESIS_HASH);
        assert_eq!(entries[1].previous_hash, entries[0].entry_hash);
        assert_eq!(entries[2].previous_hash, entries[1].entry_hash);
        assert_ne!(entries[0].snapshot_hash, entries[1].snapshot_hash);
        assert_eq!(chain.head().unwrap().sequence, 2);
        chain.verify().unwrap();
    }

    #[test]
    fn test_same_snapshot_same_hash() {
        let nodes = three_node_scenario();
        assert_eq!(
            canonical_hash(&nodes.as_slice()).unwrap(),
            canonical_hash(&nodes.clone().as_slice()).unwrap()
        );
    }

    #[test]
    fn test_retention_drops_oldest_and_keeps_sequence() {
        let clock = ManualClock::epoch();
        let chain = AnchorChain::new().with_retention(3);
        let nodes = three_node_scenario();
        for _ in 0..5 {
            chain.anchor(&nodes, clock.now()).unwrap();
            clock.advance_secs(60);
        }

        let entries = chain.entries();
        assert_eq!(chain.len(), 3);
        let sequences: Vec<u64> = entries.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![2, 3, 4]);
        assert_eq!(entries[1].previous_hash, entries[0].entry_hash);
        chain.verify().unwrap();

        let resumed = AnchorChain::from_entries(entries).unwrap().with_retention(3);
        let next = resumed.anchor(&nodes, clock.now()).unwrap();
        assert_eq!(next.sequence, 5);
        assert_eq!(resumed.len(), 3);
        resumed.verify().unwrap();
    }

    #[test]
    fn test_retention_applies_to_restored_chain() {
        let chain = AnchorChain::from_entries(chain_of(6).entries())
            .unwrap()
            .with_retention(2);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.head().unwrap().sequence, 5);
        chain.verify().unwrap();
    }

    #[test]
    fn test_pruned_chain_still_detects_tampering() {
        let mut entries = chain_of(5).entries().split_off(2);
        entries[1].snapshot_hash = "e".repeat(64);
        assert_matches!(
            verify_entries(&entries),
            Err(CoordinatorError::ChainBroken { sequence: 3 })
        );
    }

    #[test]
    fn test_tampering_detected() {
        let mut entries = chain_of(4).entries();
        entries[1].snapshot_hash = "f".repeat(64);
        assert_matches!(
            verify_entries(&entries),
            Err(CoordinatorError::ChainBroken { sequence: 1 })
        );

        let mut entries = chain_of(4).entries();
        entries.remove(2);
        assert_matches!(
            AnchorChain::from_entries(entries),
            Err(CoordinatorError::ChainBroken { sequence: 2 })
        );
    }
}
