//! DurableStore trait - persistence interface for the pending batch

use crate::ContractError;

/// Fixed suffix of every dispatcher storage key
pub const STORAGE_KEY_SUFFIX: &str = "dispatcher_";

/// Compute the storage key for a prefix
///
/// `"<prefix>_dispatcher_"` when a prefix is given, `"dispatcher_"` otherwise.
pub fn storage_key_for(prefix: Option<&str>) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}_{STORAGE_KEY_SUFFIX}"),
        None => STORAGE_KEY_SUFFIX.to_string(),
    }
}

/// Synchronous key-value store holding serialized batches
///
/// Every call completes before returning. An unavailable store is a
/// degraded mode, not an error: callers check [`DurableStore::is_available`]
/// and fall back to memory-only operation.
pub trait DurableStore: Send + Sync {
    /// Store name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Whether the store can currently be used
    fn is_available(&self) -> bool;

    /// Read the raw value under `key`
    fn get(&self, key: &str) -> Result<Option<String>, ContractError>;

    /// Replace the value under `key`
    fn set(&self, key: &str, value: &str) -> Result<(), ContractError>;

    /// Delete `key`; deleting a missing key succeeds
    fn remove(&self, key: &str) -> Result<(), ContractError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key_with_prefix() {
        assert_eq!(storage_key_for(Some("app_42")), "app_42_dispatcher_");
    }

    #[test]
    fn test_storage_key_default() {
        assert_eq!(storage_key_for(None), "dispatcher_");
    }
}
