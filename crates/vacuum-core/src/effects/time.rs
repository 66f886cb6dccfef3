//! Physical time effect.
//!
//! Synchronous on purpose: timestamps are taken while per-entity locks are
//! held, and no lock may be held across an `.await`.

use crate::types::Timestamp;

/// Wall-clock source.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> Timestamp;
}

/// Clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now()
    }
}
