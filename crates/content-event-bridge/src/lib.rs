//! # Content Event Bridge
//!
//! Connects the store's change feed to the sync dispatcher: every committed
//! content mutation becomes a [`FederationJob`] on the dispatcher's job
//! channel.
//!
//! The bridge is a pass-through, not a deduplicator. The feed delivers at
//! least once and the bridge forwards every delivery; the dispatcher's
//! mapping checks make replays harmless.

use federation_core::{ContentEvent, ContentEventSink, FederationJob, JobOperation, Protocol};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// [`ContentEventSink`] implementation that turns change events into
/// federation jobs targeting the configured protocols.
pub struct FederationEventBridge {
    job_tx: mpsc::UnboundedSender<FederationJob>,
    protocols: Vec<Protocol>,
}

impl FederationEventBridge {
    /// Creates a bridge sending jobs for `protocols` down `job_tx`.
    pub fn new(job_tx: mpsc::UnboundedSender<FederationJob>, protocols: Vec<Protocol>) -> Self {
        Self { job_tx, protocols }
    }

    /// Protocols every forwarded job targets.
    pub fn protocols(&self) -> &[Protocol] {
        &self.protocols
    }
}

impl ContentEventSink for FederationEventBridge {
    fn emit(&self, event: ContentEvent) {
        if self.protocols.is_empty() {
            debug!(content_id = %event.content_id(), "No protocols enabled, event ignored");
            return;
        }

        let operation = match &event {
            ContentEvent::ContentCreated { .. } => JobOperation::Create,
            ContentEvent::ContentUpdated { .. } => JobOperation::Update,
            ContentEvent::ContentDeleted { .. } => JobOperation::Delete,
        };
        let job = FederationJob::new(
            event.content_id().clone(),
            operation,
            self.protocols.clone(),
        );

        if self.job_tx.send(job).is_err() {
            // Dispatcher already gone, which only happens during shutdown.
            // The next startup sweep re-drives whatever was left pending.
            warn!(
                content_id = %event.content_id(),
                operation = %operation,
                "Job channel closed, change event dropped"
            );
        } else {
            debug!(
                content_id = %event.content_id(),
                operation = %operation,
                "Change event queued for federation"
            );
        }
    }
}

impl std::fmt::Debug for FederationEventBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederationEventBridge")
            .field("protocols", &self.protocols)
            .finish_non_exhaustive()
    }
}
