//! Event - the unit of telemetry handed to the dispatcher
//!
//! An event is an open-ended JSON object. The dispatcher injects
//! [`DISPATCHER_ID_FIELD`] and [`TIMESTAMP_FIELD`] before enrichment.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ContractError;

/// Field carrying the emitting dispatcher's identity
pub const DISPATCHER_ID_FIELD: &str = "dispatcherId";

/// Field carrying the send time (milliseconds since epoch)
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Field naming the event
pub const EVENT_NAME_FIELD: &str = "eventName";

/// Name of the system event queued when the host context unloads
pub const WINDOW_CLOSED_EVENT: &str = "WINDOW_CLOSED";

/// Enrichment hook
///
/// Receives the event after identity/timestamp injection; its return value
/// replaces the event entirely.
pub type EnrichFn = Arc<dyn Fn(Event) -> Event + Send + Sync>;

/// Telemetry event (arbitrary JSON object)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event(Map<String, Value>);

impl Event {
    /// Create an empty event
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an event carrying only `eventName`
    pub fn named(name: impl Into<String>) -> Self {
        Self::new().with(EVENT_NAME_FIELD, name.into())
    }

    /// Builder-style field insertion
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert a field, returning the previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Identity injected by the dispatcher, if any
    pub fn dispatcher_id(&self) -> Option<&str> {
        self.0.get(DISPATCHER_ID_FIELD).and_then(Value::as_str)
    }

    /// Send time injected by the dispatcher, if any
    pub fn timestamp(&self) -> Option<i64> {
        self.0.get(TIMESTAMP_FIELD).and_then(Value::as_i64)
    }

    pub fn event_name(&self) -> Option<&str> {
        self.0.get(EVENT_NAME_FIELD).and_then(Value::as_str)
    }

    /// Borrow the underlying JSON object
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Event {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl TryFrom<Value> for Event {
    type Error = ContractError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(ContractError::invalid_event(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Serialize a batch into its persisted / wire form (JSON array)
pub fn encode_batch(events: &[Event]) -> Result<String, ContractError> {
    Ok(serde_json::to_string(events)?)
}

/// Parse a persisted batch
///
/// A JSON `null` decodes to an empty batch.
pub fn decode_batch(raw: &str) -> Result<Vec<Event>, ContractError> {
    let events: Option<Vec<Event>> = serde_json::from_str(raw)?;
    Ok(events.unwrap_or_default())
}
