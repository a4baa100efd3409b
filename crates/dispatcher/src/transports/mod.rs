//! Transport implementations
//!
//! Contains HttpTransport and CallbackTransport, and the [`Transport`] enum the
//! dispatcher holds.

mod callback;
mod http;

pub use self::callback::CallbackTransport;
pub use self::http::HttpTransport;

use contracts::{ContractError, Event, EventTransport};

use crate::dispatcher::FlushTarget;

/// Transport selected from a [`FlushTarget`]
pub enum Transport {
    Http(HttpTransport),
    Callback(CallbackTransport),
}

impl Transport {
    /// Build the transport for a flush target
    ///
    /// # Errors
    /// An `Endpoint` target that is not an absolute http(s) URL.
    pub fn from_target(target: &FlushTarget) -> Result<Self, ContractError> {
        match target {
            FlushTarget::Endpoint(endpoint) => {
                Ok(Self::Http(HttpTransport::new("http", endpoint)?))
            }
            FlushTarget::Callback(post_fn) => Ok(Self::Callback(CallbackTransport::new(
                "callback",
                post_fn.clone(),
            ))),
        }
    }
}

impl EventTransport for Transport {
    fn name(&self) -> &str {
        match self {
            Self::Http(transport) => transport.name(),
            Self::Callback(transport) => transport.name(),
        }
    }

    async fn post(&self, events: Vec<Event>) -> Result<(), ContractError> {
        match self {
            Self::Http(transport) => transport.post(events).await,
            Self::Callback(transport) => transport.post(events).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_endpoint_target() {
        let target = FlushTarget::endpoint("https://collector.example.com/events");
        let transport = Transport::from_target(&target).unwrap();
        assert!(matches!(transport, Transport::Http(_)));
        assert_eq!(transport.name(), "http");
    }

    #[test]
    fn test_from_invalid_endpoint_target() {
        let target = FlushTarget::endpoint("collector.example.com");
        assert!(Transport::from_target(&target).is_err());
    }

    #[test]
    fn test_from_callback_target() {
        let target = FlushTarget::callback(|_events| async { Ok(()) });
        let transport = Transport::from_target(&target).unwrap();
        assert!(matches!(transport, Transport::Callback(_)));
    }
}
