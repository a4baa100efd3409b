//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// A command-line override could not be applied
    #[error("Invalid value for {flag}: {message}")]
    InvalidOverride { flag: String, message: String },

    /// Dispatcher construction failed
    #[error("Failed to start dispatcher: {0}")]
    Dispatcher(#[from] dispatcher::DispatcherError),

    /// Configuration loading error
    #[error(transparent)]
    Contract(#[from] contracts::ContractError),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn invalid_override(flag: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidOverride {
            flag: flag.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
