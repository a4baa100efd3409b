//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
///
/// Only construction can fail; `send_event` and friends never surface errors.
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Configuration rejected at construction
    #[error("invalid dispatcher config at '{field}': {message}")]
    InvalidConfig { field: String, message: String },

    /// No tokio runtime to run transport posts on
    #[error("no tokio runtime available to dispatch transport posts")]
    NoRuntime,

    /// Error from a capability (store, transport, lifecycle)
    #[error("contract error: {0}")]
    Contract(#[from] contracts::ContractError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatcherError {
    /// Create an invalid config error
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }
}
