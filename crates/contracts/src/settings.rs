//! DispatcherSettings - Config Loader output
//!
//! Serializable description of one dispatcher: batching, transport endpoint
//! and persistence backend. Runtime-only pieces (enrichment, callbacks) are
//! supplied in code.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete dispatcher settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DispatcherSettings {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Events accumulated before a flush (0 = flush on every send)
    #[serde(default = "default_batch_threshold")]
    pub batch_threshold: usize,

    /// Storage key prefix, e.g. `appName_userId`
    #[serde(default)]
    #[validate(length(min = 1, max = 128))]
    pub storage_key_prefix: Option<String>,

    /// Delivery endpoint
    #[validate(nested)]
    pub transport: TransportSettings,

    /// Persistence backend
    #[serde(default)]
    pub storage: StorageSettings,
}

fn default_batch_threshold() -> usize {
    1
}

/// Transport settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TransportSettings {
    /// Collector URL receiving `POST` batches
    #[validate(url)]
    pub endpoint: String,
}

/// Persistence backend kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    /// One file per key under `path`
    File,
    /// Process memory (lost on exit)
    Memory,
    /// No durable store, memory-only queue
    #[default]
    None,
}

/// Persistence settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default)]
    pub kind: StorageKind,

    /// Directory for [`StorageKind::File`]
    #[serde(default)]
    pub path: Option<PathBuf>,
}
