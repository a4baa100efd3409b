//! NoopStore - the absent durable store

use contracts::{ContractError, DurableStore};

/// Store that is never available
///
/// Selecting it puts the dispatcher in memory-only mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStore;

impl NoopStore {
    pub fn new() -> Self {
        Self
    }
}

impl DurableStore for NoopStore {
    fn name(&self) -> &str {
        "noop"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn get(&self, _key: &str) -> Result<Option<String>, ContractError> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), ContractError> {
        Ok(())
    }

    fn remove(&self, _key: &str) -> Result<(), ContractError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_store_is_unavailable() {
        let store = NoopStore::new();
        assert!(!store.is_available());
        store.set("k", "[]").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }
}
