//! EventTransport trait - Dispatcher output interface
//!
//! Defines the abstract interface for delivering a flushed batch.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::{ContractError, Event};

/// Future returned by a caller-supplied post function
pub type PostFuture = Pin<Box<dyn Future<Output = Result<(), ContractError>> + Send>>;

/// Caller-supplied delivery function
///
/// Receives the flushed batch by value. Uses `Arc` so the dispatcher can
/// share it with every spawned post.
pub type PostEventsFn = Arc<dyn Fn(Vec<Event>) -> PostFuture + Send + Sync>;

/// Wrap an async closure as a [`PostEventsFn`]
///
/// The closure itself runs when the batch is flushed; the future it returns
/// is awaited on the dispatcher's runtime.
pub fn post_events_fn<F, Fut>(f: F) -> PostEventsFn
where
    F: Fn(Vec<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ContractError>> + Send + 'static,
{
    Arc::new(move |events: Vec<Event>| -> PostFuture { Box::pin(f(events)) })
}

/// Batch delivery trait
///
/// All transport implementations must implement this trait.
#[trait_variant::make(EventTransport: Send)]
pub trait LocalEventTransport {
    /// Transport name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Deliver one batch
    ///
    /// # Errors
    /// Returns delivery error (should include context). The dispatcher logs
    /// it and never retries.
    async fn post(&self, events: Vec<Event>) -> Result<(), ContractError>;
}
