//! # Dispatcher
//!
//! Event batching dispatcher.
//!
//! Responsibilities:
//! - Stamp and enrich every submitted `Event` exactly once
//! - Keep the pending batch mirrored in a `DurableStore`
//! - Flush to the configured transport on threshold, on demand, or on unload
//! - Recover a batch left behind by a previous instance

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod identity;
pub mod lifecycle;
pub mod metrics;
pub mod stores;
pub mod transports;

pub use contracts::{DurableStore, Event, EventTransport, LifecycleSource};
pub use dispatcher::{
    create_dispatcher, Dispatcher, DispatcherBuilder, DispatcherConfig, FlushTarget, SendOptions,
};
pub use error::DispatcherError;
pub use handle::{FlushReason, TransportHandle};
pub use identity::{generate_instance_id, INSTANCE_ID_SEPARATOR};
pub use lifecycle::{ManualLifecycle, NoopLifecycle, ShutdownSignal};
pub use metrics::{DispatcherMetrics, MetricsSnapshot};
pub use stores::{open_store, FileStore, MemoryStore, NoopStore};
pub use transports::{CallbackTransport, HttpTransport, Transport};
