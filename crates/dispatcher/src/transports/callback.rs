//! CallbackTransport - hands batches to a caller-supplied function

use contracts::{ContractError, Event, EventTransport, PostEventsFn};
use tracing::{debug, instrument};

/// Transport delegating delivery to a [`PostEventsFn`]
pub struct CallbackTransport {
    name: String,
    post_fn: PostEventsFn,
}

impl CallbackTransport {
    /// Create a new CallbackTransport with the given name
    pub fn new(name: impl Into<String>, post_fn: PostEventsFn) -> Self {
        Self {
            name: name.into(),
            post_fn,
        }
    }
}

impl EventTransport for CallbackTransport {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "callback_transport_post",
        skip(self, events),
        fields(transport = %self.name, batch = events.len())
    )]
    async fn post(&self, events: Vec<Event>) -> Result<(), ContractError> {
        (self.post_fn)(events).await?;
        debug!(transport = %self.name, "Batch handed to callback");
        Ok(())
    }
}
