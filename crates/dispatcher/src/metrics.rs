//! Dispatcher metrics for observability

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters for a single dispatcher instance
#[derive(Debug, Default)]
pub struct DispatcherMetrics {
    /// Current in-memory queue length
    queue_len: AtomicUsize,
    /// Total events accepted by `send_event`
    events_enqueued: AtomicU64,
    /// Total batches handed to the transport
    batches_flushed: AtomicU64,
    /// Total events contained in flushed batches
    events_flushed: AtomicU64,
    /// Flushes requested with `forceful`
    forced_flushes: AtomicU64,
    /// Posts that ended in an error
    transport_failures: AtomicU64,
    /// Store operations that failed or returned corrupt data
    storage_errors: AtomicU64,
    /// Events recovered from a previous instance
    recovered_events: AtomicU64,
    /// Posts spawned and not yet finished
    in_flight: AtomicUsize,
}

impl DispatcherMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn events_enqueued(&self) -> u64 {
        self.events_enqueued.load(Ordering::Relaxed)
    }

    pub fn inc_events_enqueued(&self) {
        self.events_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn batches_flushed(&self) -> u64 {
        self.batches_flushed.load(Ordering::Relaxed)
    }

    pub fn events_flushed(&self) -> u64 {
        self.events_flushed.load(Ordering::Relaxed)
    }

    /// Record one batch of `size` events leaving for the transport
    pub fn record_flush(&self, size: usize, forced: bool) {
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
        self.events_flushed.fetch_add(size as u64, Ordering::Relaxed);
        if forced {
            self.forced_flushes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn forced_flushes(&self) -> u64 {
        self.forced_flushes.load(Ordering::Relaxed)
    }

    pub fn transport_failures(&self) -> u64 {
        self.transport_failures.load(Ordering::Relaxed)
    }

    pub fn inc_transport_failures(&self) {
        self.transport_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn storage_errors(&self) -> u64 {
        self.storage_errors.load(Ordering::Relaxed)
    }

    pub fn inc_storage_errors(&self) {
        self.storage_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn recovered_events(&self) -> u64 {
        self.recovered_events.load(Ordering::Relaxed)
    }

    pub fn add_recovered_events(&self, count: usize) {
        self.recovered_events
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn inc_in_flight(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    pub fn dec_in_flight(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            events_enqueued: self.events_enqueued(),
            batches_flushed: self.batches_flushed(),
            events_flushed: self.events_flushed(),
            forced_flushes: self.forced_flushes(),
            transport_failures: self.transport_failures(),
            storage_errors: self.storage_errors(),
            recovered_events: self.recovered_events(),
            in_flight: self.in_flight(),
        }
    }
}

/// Snapshot of dispatcher metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub events_enqueued: u64,
    pub batches_flushed: u64,
    pub events_flushed: u64,
    pub forced_flushes: u64,
    pub transport_failures: u64,
    pub storage_errors: u64,
    pub recovered_events: u64,
    pub in_flight: usize,
}
