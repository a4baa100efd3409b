//! Dispatcher - the queue / flush / persistence state machine

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};
use std::time::Duration;

use chrono::Utc;
use tokio::runtime::Handle;
use tracing::{debug, info, instrument, warn};

use contracts::{
    decode_batch, encode_batch, post_events_fn, storage_key_for, ContractError,
    DispatcherSettings, DurableStore, EnrichFn, Event, LifecycleSource, PostEventsFn,
    DISPATCHER_ID_FIELD, TIMESTAMP_FIELD, WINDOW_CLOSED_EVENT,
};

use crate::error::DispatcherError;
use crate::handle::{FlushReason, TransportHandle};
use crate::identity::generate_instance_id;
use crate::lifecycle::NoopLifecycle;
use crate::metrics::{DispatcherMetrics, MetricsSnapshot};
use crate::stores::NoopStore;
use crate::transports::Transport;

/// Poll interval of [`Dispatcher::wait_idle`]
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Where flushed batches go
///
/// Exactly one target per dispatcher.
#[derive(Clone)]
pub enum FlushTarget {
    /// HTTP `POST` of the JSON array to this URL
    Endpoint(String),
    /// Caller-supplied delivery function
    Callback(PostEventsFn),
}

impl FlushTarget {
    pub fn endpoint(url: impl Into<String>) -> Self {
        Self::Endpoint(url.into())
    }

    /// Wrap an async closure as a callback target
    pub fn callback<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ContractError>> + Send + 'static,
    {
        Self::Callback(post_events_fn(f))
    }
}

impl fmt::Debug for FlushTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Endpoint(url) => f.debug_tuple("Endpoint").field(url).finish(),
            Self::Callback(_) => f.write_str("Callback(<fn>)"),
        }
    }
}

/// Dispatcher configuration
#[derive(Clone)]
pub struct DispatcherConfig {
    /// Queue length that triggers a flush on the next send (0 = every send)
    pub batch_threshold: usize,
    /// Optional enrichment applied once per send
    pub enrich: Option<EnrichFn>,
    /// Flush destination
    pub flush_target: FlushTarget,
    /// Storage key prefix
    pub storage_key_prefix: Option<String>,
}

impl DispatcherConfig {
    /// Config flushing to `flush_target` one event at a time
    pub fn new(flush_target: FlushTarget) -> Self {
        Self {
            batch_threshold: 1,
            enrich: None,
            flush_target,
            storage_key_prefix: None,
        }
    }

    /// Config for loaded settings (endpoint target)
    pub fn from_settings(settings: &DispatcherSettings) -> Self {
        Self {
            batch_threshold: settings.batch_threshold,
            enrich: None,
            flush_target: FlushTarget::endpoint(settings.transport.endpoint.clone()),
            storage_key_prefix: settings.storage_key_prefix.clone(),
        }
    }

    pub fn with_batch_threshold(mut self, batch_threshold: usize) -> Self {
        self.batch_threshold = batch_threshold;
        self
    }

    pub fn with_enricher<F>(mut self, enrich: F) -> Self
    where
        F: Fn(Event) -> Event + Send + Sync + 'static,
    {
        self.enrich = Some(Arc::new(enrich));
        self
    }

    pub fn with_storage_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.storage_key_prefix = Some(prefix.into());
        self
    }

    pub fn with_flush_target(mut self, flush_target: FlushTarget) -> Self {
        self.flush_target = flush_target;
        self
    }
}

impl fmt::Debug for DispatcherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherConfig")
            .field("batch_threshold", &self.batch_threshold)
            .field("enrich", &self.enrich.as_ref().map(|_| "<fn>"))
            .field("flush_target", &self.flush_target)
            .field("storage_key_prefix", &self.storage_key_prefix)
            .finish()
    }
}

/// Per-call options of [`Dispatcher::send_event_with`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Flush the whole queue right after enqueueing
    pub forceful: bool,
    /// Log the enriched event
    pub debug_log: bool,
}

impl SendOptions {
    pub fn forceful() -> Self {
        Self {
            forceful: true,
            ..Self::default()
        }
    }

    pub fn with_debug_log(mut self) -> Self {
        self.debug_log = true;
        self
    }
}

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    store: Arc<dyn DurableStore>,
    lifecycle: Arc<dyn LifecycleSource>,
    runtime: Option<Handle>,
}

impl DispatcherBuilder {
    /// Create a new DispatcherBuilder with no store and no lifecycle source
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            config,
            store: Arc::new(NoopStore::new()),
            lifecycle: Arc::new(NoopLifecycle::new()),
            runtime: None,
        }
    }

    /// Durable store mirroring the pending batch
    pub fn store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.store = store;
        self
    }

    /// Source of the "unloading" notification
    pub fn lifecycle(mut self, lifecycle: Arc<dyn LifecycleSource>) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Runtime transport posts are spawned on (defaults to the current one)
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Build the dispatcher, recovering any persisted batch
    ///
    /// # Errors
    /// - Endpoint target is not an absolute http(s) URL
    /// - No runtime given and none is current
    #[instrument(
        name = "dispatcher_builder_build",
        skip(self),
        fields(
            batch_threshold = self.config.batch_threshold,
            store = self.store.name(),
            lifecycle = self.lifecycle.name()
        )
    )]
    pub fn build(self) -> Result<Dispatcher, DispatcherError> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| DispatcherError::NoRuntime)?,
        };

        let transport = Transport::from_target(&self.config.flush_target).map_err(|e| {
            DispatcherError::invalid_config("flush_target", e.to_string())
        })?;

        let metrics = Arc::new(DispatcherMetrics::new());
        let storage_key = storage_key_for(self.config.storage_key_prefix.as_deref());

        let dispatcher = Dispatcher {
            inner: Arc::new(DispatcherInner {
                transport: TransportHandle::new(transport, runtime, Arc::clone(&metrics)),
                config: self.config,
                instance_id: OnceLock::new(),
                storage_key,
                queue: Mutex::new(Vec::new()),
                store: self.store,
                metrics,
            }),
        };

        dispatcher.initialize(self.lifecycle.as_ref());
        Ok(dispatcher)
    }
}

struct DispatcherInner {
    config: DispatcherConfig,
    instance_id: OnceLock<String>,
    storage_key: String,
    queue: Mutex<Vec<Event>>,
    store: Arc<dyn DurableStore>,
    transport: TransportHandle,
    metrics: Arc<DispatcherMetrics>,
}

/// Event batching dispatcher
///
/// Cheap to clone; clones share one queue and identity. Every mutating
/// operation runs to completion under the queue lock, so the persisted copy
/// equals the in-memory queue whenever the store is available.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    /// Create a dispatcher with no durable store and no lifecycle source
    pub fn new(config: DispatcherConfig) -> Result<Self, DispatcherError> {
        DispatcherBuilder::new(config).build()
    }

    pub fn builder(config: DispatcherConfig) -> DispatcherBuilder {
        DispatcherBuilder::new(config)
    }

    /// Queue an event (not forceful, no debug log)
    pub fn send_event(&self, event: Event) {
        self.send_event_with(event, SendOptions::default());
    }

    /// Stamp, enrich and queue an event, flushing when due
    ///
    /// Never fails: store and transport errors are logged and counted.
    /// With `forceful`, the queue is flushed after the enqueue even if the
    /// threshold check already flushed, so one call can post twice.
    pub fn send_event_with(&self, event: Event, options: SendOptions) {
        let event = self.stamp_and_enrich(event);

        if options.debug_log {
            info!(
                dispatcher_id = %self.get_instance_id(),
                event = %serde_json::Value::Object(event.fields().clone()),
                "Event sent"
            );
        }

        let mut queue = self.inner.lock_queue();
        self.enqueue_and_maybe_flush(&mut queue, event);

        if options.forceful {
            self.inner
                .transport
                .dispatch(queue.clone(), FlushReason::Forceful);
        }
    }

    /// Current pending batch
    ///
    /// Read from the store when it is available (the store wins over memory),
    /// otherwise the in-memory queue.
    pub fn get_event_list(&self) -> Vec<Event> {
        let queue = self.inner.lock_queue();
        if !self.inner.store.is_available() {
            return queue.clone();
        }
        match self.inner.store.get(&self.inner.storage_key) {
            Ok(Some(raw)) => self.inner.decode_or_empty(&raw),
            Ok(None) => Vec::new(),
            Err(e) => {
                self.inner.metrics.inc_storage_errors();
                warn!(
                    key = %self.inner.storage_key,
                    error = %e,
                    "Store read failed, returning in-memory queue"
                );
                queue.clone()
            }
        }
    }

    /// Drop the pending batch from memory and from the store
    pub fn clear_events(&self) {
        let mut queue = self.inner.lock_queue();
        self.inner.remove_persisted();
        queue.clear();
        self.inner.metrics.set_queue_len(0);
        debug!(key = %self.inner.storage_key, "Events cleared");
    }

    /// Identity stamped on every event of this instance
    pub fn get_instance_id(&self) -> &str {
        self.inner.instance_id()
    }

    /// Snapshot of the in-memory queue
    pub fn pending_events(&self) -> Vec<Event> {
        self.inner.lock_queue().clone()
    }

    /// Key the pending batch is persisted under
    pub fn storage_key(&self) -> &str {
        &self.inner.storage_key
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    /// Get metrics snapshot
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Wait until no post is in flight; false if `timeout` elapsed first
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.inner.metrics.in_flight() > 0 {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
        true
    }

    /// Identity, batch recovery and unload subscription
    fn initialize(&self, lifecycle: &dyn LifecycleSource) {
        let instance_id = self.inner.instance_id().to_string();
        let recovered = self.recover_persisted_batch();
        self.subscribe_unloading(lifecycle);

        info!(
            instance_id = %instance_id,
            storage_key = %self.inner.storage_key,
            store = self.inner.store.name(),
            transport = self.inner.transport.name(),
            recovered,
            "Dispatcher initialized"
        );
    }

    /// Move a batch left by a previous instance into memory
    ///
    /// The persisted copy is removed right away; it is written back by the
    /// next mutating operation.
    fn recover_persisted_batch(&self) -> usize {
        if !self.inner.store.is_available() {
            return 0;
        }

        let raw = match self.inner.store.get(&self.inner.storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return 0,
            Err(e) => {
                self.inner.metrics.inc_storage_errors();
                warn!(key = %self.inner.storage_key, error = %e, "Store read failed during recovery");
                return 0;
            }
        };

        let events = self.inner.decode_or_empty(&raw);
        let mut queue = self.inner.lock_queue();
        self.inner.remove_persisted();
        if events.is_empty() {
            return 0;
        }

        let count = events.len();
        queue.extend(events);
        self.inner.metrics.add_recovered_events(count);
        self.inner.metrics.set_queue_len(queue.len());

        info!(key = %self.inner.storage_key, recovered = count, "Recovered persisted batch");
        count
    }

    fn subscribe_unloading(&self, lifecycle: &dyn LifecycleSource) {
        let weak: Weak<DispatcherInner> = Arc::downgrade(&self.inner);
        lifecycle.on_unloading(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                let dispatcher = Dispatcher { inner };
                debug!(instance_id = %dispatcher.get_instance_id(), "Host unloading");
                dispatcher.send_event(Event::named(WINDOW_CLOSED_EVENT));
            }
        }));
    }

    fn stamp_and_enrich(&self, mut event: Event) -> Event {
        event.insert(DISPATCHER_ID_FIELD, self.get_instance_id());
        event.insert(TIMESTAMP_FIELD, Utc::now().timestamp_millis());
        match &self.inner.config.enrich {
            Some(enrich) => enrich(event),
            None => event,
        }
    }

    /// Flush-before-enqueue: a full queue leaves before the new event joins
    fn enqueue_and_maybe_flush(&self, queue: &mut Vec<Event>, event: Event) {
        if queue.len() >= self.inner.config.batch_threshold {
            let batch = std::mem::take(queue);
            self.inner.transport.dispatch(batch, FlushReason::Threshold);
            self.inner.remove_persisted();
        }

        queue.push(event);
        self.inner.persist(queue);
        self.inner.metrics.inc_events_enqueued();
        self.inner.metrics.set_queue_len(queue.len());
    }
}

impl DispatcherInner {
    fn instance_id(&self) -> &str {
        self.instance_id.get_or_init(generate_instance_id)
    }

    fn lock_queue(&self) -> MutexGuard<'_, Vec<Event>> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, queue: &[Event]) {
        if !self.store.is_available() {
            return;
        }
        let result = encode_batch(queue).and_then(|raw| self.store.set(&self.storage_key, &raw));
        if let Err(e) = result {
            self.metrics.inc_storage_errors();
            warn!(key = %self.storage_key, error = %e, "Failed to persist queue");
        }
    }

    fn remove_persisted(&self) {
        if !self.store.is_available() {
            return;
        }
        if let Err(e) = self.store.remove(&self.storage_key) {
            self.metrics.inc_storage_errors();
            warn!(key = %self.storage_key, error = %e, "Failed to remove persisted queue");
        }
    }

    /// Unparsable data reads as an empty batch
    fn decode_or_empty(&self, raw: &str) -> Vec<Event> {
        match decode_batch(raw) {
            Ok(events) => events,
            Err(e) => {
                self.metrics.inc_storage_errors();
                let e = ContractError::corrupt_batch(&self.storage_key, e.to_string());
                warn!(error = %e, "Ignoring corrupt persisted batch");
                Vec::new()
            }
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("instance_id", &self.get_instance_id())
            .field("storage_key", &self.inner.storage_key)
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Convenience function to create a dispatcher from loaded settings
#[instrument(name = "dispatcher_create", skip(settings, store, lifecycle))]
pub fn create_dispatcher(
    settings: &DispatcherSettings,
    store: Arc<dyn DurableStore>,
    lifecycle: Arc<dyn LifecycleSource>,
) -> Result<Dispatcher, DispatcherError> {
    DispatcherBuilder::new(DispatcherConfig::from_settings(settings))
        .store(store)
        .lifecycle(lifecycle)
        .build()
}
