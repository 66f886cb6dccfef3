//! Deterministic effect handlers.
//!
//! Every collaborator trait from `vacuum_core::effects` has an in-memory
//! handler here with knobs for failure injection and inspection.
//!
//! # Blocking Lock Usage
//!
//! Uses `std::sync::Mutex`; guards are never held across an `.await`.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use vacuum_core::{
    AuditError, AuditEvent, AuditEventKind, AuditSink, Clock, NodeId, PolicySource,
    StorageBackend, StorageBackendError, Timestamp,
};

/// In-memory storage backend with per-node failure and latency injection.
#[derive(Debug, Default)]
pub struct MemoryStorageBackend {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    objects: HashMap<(NodeId, String), Vec<u8>>,
    failing: HashSet<NodeId>,
    delays: HashMap<NodeId, Duration>,
    attempts: Vec<NodeId>,
}

impl MemoryStorageBackend {
    /// Empty backend that accepts every write.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write to `node_id` fail with `Unavailable`.
    pub fn fail_node(&self, node_id: impl Into<NodeId>) {
        self.state.lock().unwrap().failing.insert(node_id.into());
    }

    /// Stop failing writes to `node_id`.
    pub fn heal_node(&self, node_id: impl Into<NodeId>) {
        self.state.lock().unwrap().failing.remove(&node_id.into());
    }

    /// Sleep for `delay` before answering writes to `node_id`.
    pub fn delay_node(&self, node_id: impl Into<NodeId>, delay: Duration) {
        self.state
            .lock()
            .unwrap()
            .delays
            .insert(node_id.into(), delay);
    }

    /// Bytes stored on `node_id` under `payload_hash`, if any.
    pub fn stored(&self, node_id: &str, payload_hash: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&(NodeId::new(node_id), payload_hash.to_string()))
            .cloned()
    }

    /// Number of objects held across all nodes.
    pub fn object_count(&self) -> usize {
        self.state.lock().unwrap().objects.len()
    }

    /// Nodes that received a write call, in call order.
    pub fn attempts(&self) -> Vec<NodeId> {
        self.state.lock().unwrap().attempts.clone()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorageBackend {
    async fn write(
        &self,
        node_id: &NodeId,
        payload_hash: &str,
        bytes: &[u8],
    ) -> Result<(), StorageBackendError> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.attempts.push(node_id.clone());
            state.delays.get(node_id).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if state.failing.contains(node_id) {
            return Err(StorageBackendError::Unavailable {
                reason: format!("injected failure on {node_id}"),
            });
        }
        state
            .objects
            .insert((node_id.clone(), payload_hash.to_string()), bytes.to_vec());
        Ok(())
    }
}

/// Policy source with a fixed hash and a switchable precheck verdict.
#[derive(Debug)]
pub struct StaticPolicySource {
    policy_hash: String,
    verdict: Mutex<bool>,
    prechecks: Mutex<usize>,
}

impl StaticPolicySource {
    /// Policy source whose precheck always passes.
    pub fn allowing(policy_hash: impl Into<String>) -> Self {
        Self {
            policy_hash: policy_hash.into(),
            verdict: Mutex::new(true),
            prechecks: Mutex::new(0),
        }
    }

    /// Policy source whose precheck always fails.
    pub fn denying(policy_hash: impl Into<String>) -> Self {
        let source = Self::allowing(policy_hash);
        source.set_verdict(false);
        source
    }

    /// Change the precheck verdict for subsequent transitions.
    pub fn set_verdict(&self, verdict: bool) {
        *self.verdict.lock().unwrap() = verdict;
    }

    /// Number of prechecks answered so far.
    pub fn precheck_count(&self) -> usize {
        *self.prechecks.lock().unwrap()
    }
}

#[async_trait]
impl PolicySource for StaticPolicySource {
    async fn current_policy_hash(&self) -> String {
        self.policy_hash.clone()
    }

    async fn precheck(&self, _context: &BTreeMap<String, String>) -> bool {
        *self.prechecks.lock().unwrap() += 1;
        *self.verdict.lock().unwrap()
    }
}

/// Audit sink that keeps every event, optionally refusing or holding
/// delivery.
#[derive(Debug)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<AuditEvent>>,
    unavailable: Mutex<bool>,
    open: watch::Sender<bool>,
}

impl Default for RecordingAuditSink {
    fn default() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            unavailable: Mutex::new(false),
            open: watch::channel(true).0,
        }
    }
}

impl RecordingAuditSink {
    /// Sink that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that rejects every event.
    pub fn unavailable() -> Self {
        let sink = Self::default();
        *sink.unavailable.lock().unwrap() = true;
        sink
    }

    /// Sink whose `emit` blocks until [`release`](Self::release) is called.
    pub fn held() -> Self {
        let sink = Self::default();
        sink.open.send_replace(false);
        sink
    }

    /// Let held deliveries through.
    pub fn release(&self) {
        self.open.send_replace(true);
    }

    /// All accepted events in emission order.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Kinds of accepted events in emission order.
    pub fn kinds(&self) -> Vec<AuditEventKind> {
        self.events.lock().unwrap().iter().map(|e| e.kind).collect()
    }

    /// How many accepted events have `kind`.
    pub fn count(&self, kind: AuditEventKind) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn emit(&self, event: AuditEvent) -> Result<(), AuditError> {
        let mut open = self.open.subscribe();
        let _ = open.wait_for(|ready| *ready).await;
        if *self.unavailable.lock().unwrap() {
            return Err(AuditError::Unavailable {
                reason: "recording sink disabled".to_string(),
            });
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    /// Clock fixed at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Clock fixed at 2024-01-01T00:00:00Z.
    pub fn epoch() -> Self {
        Self::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    /// Move forward by `seconds`.
    pub fn advance_secs(&self, seconds: i64) {
        let mut now = self.now.lock().unwrap();
        *now += ChronoDuration::seconds(seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_failure_injection() {
        let backend = MemoryStorageBackend::new();
        let node = NodeId::new("os-1");
        backend.write(&node, "h", b"data").await.unwrap();
        assert_eq!(backend.stored("os-1", "h"), Some(b"data".to_vec()));

        backend.fail_node("os-1");
        assert!(backend.write(&node, "h2", b"more").await.is_err());
        backend.heal_node("os-1");
        backend.write(&node, "h2", b"more").await.unwrap();

        assert_eq!(backend.object_count(), 2);
        assert_eq!(backend.attempts().len(), 3);
    }

    #[tokio::test]
    async fn test_recording_sink() {
        let sink = RecordingAuditSink::new();
        let event = AuditEvent::new(Utc::now(), AuditEventKind::VetoTriggered, &"x");
        sink.emit(event).await.unwrap();
        assert_eq!(sink.count(AuditEventKind::VetoTriggered), 1);

        let closed = RecordingAuditSink::unavailable();
        let event = AuditEvent::new(Utc::now(), AuditEventKind::VetoTriggered, &"x");
        assert!(closed.emit(event).await.is_err());
        assert!(closed.events().is_empty());
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::epoch();
        let start = clock.now();
        clock.advance_secs(90);
        assert_eq!((clock.now() - start).num_seconds(), 90);
    }
}
