//! MemoryStore - process-local durable store
//!
//! Survives dispatcher re-creation within one process, which is what tests and
//! embedded hosts without a filesystem need.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use contracts::{ContractError, DurableStore};

/// In-memory key-value store
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle availability (simulates a host revoking storage)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(
        &self,
        key: &str,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, ContractError> {
        self.entries
            .lock()
            .map_err(|_| ContractError::storage(self.name(), key, "store lock poisoned"))
    }
}

impl DurableStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    fn get(&self, key: &str) -> Result<Option<String>, ContractError> {
        Ok(self.entries(key)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ContractError> {
        self.entries(key)?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ContractError> {
        self.entries(key)?.remove(key);
        Ok(())
    }
}
