//! Audit sink effect.
//!
//! Delivery is best-effort: the coordinator logs and drops sink errors.

use async_trait::async_trait;

use crate::types::AuditEvent;

/// Error type for audit delivery.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuditError {
    /// Sink could not accept the event
    #[error("Audit sink unavailable: {reason}")]
    Unavailable {
        /// Failure detail
        reason: String,
    },
}

/// Receives audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Deliver one event.
    async fn emit(&self, event: AuditEvent) -> Result<(), AuditError>;
}

/// Writes audit events as structured `tracing` records on the `vacuum::audit`
/// target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn emit(&self, event: AuditEvent) -> Result<(), AuditError> {
        tracing::info!(
            target: "vacuum::audit",
            kind = %event.kind,
            timestamp = %event.timestamp,
            payload = %event.payload,
            "audit"
        );
        Ok(())
    }
}
