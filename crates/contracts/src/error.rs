//! Layered error definitions
//!
//! Categorized by source: config / storage / transport / event

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Storage Errors =====
    /// Durable store operation failed
    #[error("storage '{store}' error for key '{key}': {message}")]
    Storage {
        store: String,
        key: String,
        message: String,
    },

    /// Persisted batch could not be decoded
    #[error("corrupt batch under key '{key}': {message}")]
    CorruptBatch { key: String, message: String },

    // ===== Transport Errors =====
    /// Transport could not deliver the batch
    #[error("transport '{transport}' error: {message}")]
    Transport { transport: String, message: String },

    /// Remote answered with a non-success status
    #[error("transport '{transport}' rejected batch with status {status}")]
    TransportStatus { transport: String, status: u16 },

    // ===== Event Errors =====
    /// Value is not a JSON object
    #[error("invalid event: {message}")]
    InvalidEvent { message: String },

    // ===== General Errors =====
    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create storage error
    pub fn storage(
        store: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Storage {
            store: store.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create corrupt batch error
    pub fn corrupt_batch(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CorruptBatch {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create transport error
    pub fn transport(transport: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            transport: transport.into(),
            message: message.into(),
        }
    }

    /// Create invalid event error
    pub fn invalid_event(message: impl Into<String>) -> Self {
        Self::InvalidEvent {
            message: message.into(),
        }
    }
}
