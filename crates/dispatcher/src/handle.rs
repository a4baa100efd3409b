//! TransportHandle - fire-and-forget batch posting on a runtime

use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument};

use contracts::{Event, EventTransport};

use crate::metrics::DispatcherMetrics;
use crate::transports::Transport;

/// Why a batch left the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Queue had reached the batch threshold before an enqueue
    Threshold,
    /// Caller passed `forceful`
    Forceful,
}

impl FlushReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Threshold => "threshold",
            Self::Forceful => "forceful",
        }
    }
}

/// Handle owning the transport and the runtime posts are spawned on
pub struct TransportHandle {
    transport: Arc<Transport>,
    runtime: Handle,
    metrics: Arc<DispatcherMetrics>,
}

impl TransportHandle {
    pub fn new(transport: Transport, runtime: Handle, metrics: Arc<DispatcherMetrics>) -> Self {
        Self {
            transport: Arc::new(transport),
            runtime,
            metrics,
        }
    }

    /// Transport name
    pub fn name(&self) -> &str {
        self.transport.name()
    }

    /// Spawn a post of `batch` (non-blocking)
    ///
    /// The returned handle may be dropped; the post keeps running and its
    /// outcome is only logged and counted.
    pub fn dispatch(&self, batch: Vec<Event>, reason: FlushReason) -> JoinHandle<()> {
        self.metrics
            .record_flush(batch.len(), reason == FlushReason::Forceful);
        let in_flight = InFlightGuard::new(Arc::clone(&self.metrics));

        debug!(
            transport = self.transport.name(),
            batch = batch.len(),
            reason = reason.as_str(),
            "Dispatching batch"
        );

        let transport = Arc::clone(&self.transport);
        self.runtime
            .spawn(post_batch(transport, batch, reason, in_flight))
    }
}

/// Counts one post as in flight until dropped
///
/// Also released when the post panics or its task is dropped unpolled.
struct InFlightGuard(Arc<DispatcherMetrics>);

impl InFlightGuard {
    fn new(metrics: Arc<DispatcherMetrics>) -> Self {
        metrics.inc_in_flight();
        Self(metrics)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.dec_in_flight();
    }
}

/// Task that performs one post and records its outcome
#[instrument(
    name = "transport_post_batch",
    skip(transport, batch, in_flight),
    fields(transport = %transport.name(), batch = batch.len(), reason = reason.as_str())
)]
async fn post_batch(
    transport: Arc<Transport>,
    batch: Vec<Event>,
    reason: FlushReason,
    in_flight: InFlightGuard,
) {
    let size = batch.len();
    match transport.post(batch).await {
        Ok(()) => {
            debug!(transport = transport.name(), batch = size, "Batch posted");
        }
        Err(e) => {
            in_flight.0.inc_transport_failures();
            error!(
                transport = transport.name(),
                batch = size,
                error = %e,
                "Batch post failed, batch dropped"
            );
            // No retry, no requeue
        }
    }
}
