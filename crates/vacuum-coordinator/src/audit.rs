//! Background audit delivery.
//!
//! Operations enqueue events and return immediately. A single drain task
//! hands them to the sink in enqueue order and logs sink failures. The task
//! is started lazily on the first event, inside whatever runtime the caller
//! is running on, and ends once the dispatcher is dropped and the queue is
//! empty.
//!
//! # Blocking Lock Usage
//!
//! Uses `parking_lot::Mutex` only to hand the receiver to the drain task
//! once; the lock is never held across `.await`.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use vacuum_core::{AuditEvent, AuditSink};

enum AuditCommand {
    Emit(AuditEvent),
    Flush(oneshot::Sender<()>),
}

type PendingDrain = (mpsc::UnboundedReceiver<AuditCommand>, Arc<dyn AuditSink>);

/// Fire-and-forget front for an [`AuditSink`].
pub struct AuditDispatcher {
    tx: mpsc::UnboundedSender<AuditCommand>,
    pending: Mutex<Option<PendingDrain>>,
}

impl AuditDispatcher {
    /// Dispatcher delivering to `sink`. No task is spawned until the first
    /// event, so this can be built outside a runtime.
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            pending: Mutex::new(Some((rx, sink))),
        }
    }

    /// Queue `event` for delivery.
    pub fn dispatch(&self, event: AuditEvent) {
        self.ensure_started();
        if let Err(mpsc::error::SendError(AuditCommand::Emit(event))) =
            self.tx.send(AuditCommand::Emit(event))
        {
            warn!(kind = %event.kind, "Audit queue closed, event dropped");
        }
    }

    /// Wait until every event queued so far has been handed to the sink.
    pub async fn flush(&self) {
        self.ensure_started();
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(AuditCommand::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    fn ensure_started(&self) {
        let mut pending = self.pending.lock();
        if pending.is_none() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                if let Some((rx, sink)) = pending.take() {
                    handle.spawn(drain(rx, sink));
                }
            }
            Err(_) => debug!("No runtime yet, audit delivery deferred"),
        }
    }
}

async fn drain(mut rx: mpsc::UnboundedReceiver<AuditCommand>, sink: Arc<dyn AuditSink>) {
    while let Some(command) = rx.recv().await {
        match command {
            AuditCommand::Emit(event) => {
                let kind = event.kind;
                if let Err(error) = sink.emit(event).await {
                    warn!(kind = %kind, error = %error, "Audit sink rejected event");
                }
            }
            AuditCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Audit drain stopped");
}
