//! Durable store implementations
//!
//! Contains FileStore, MemoryStore, and NoopStore.

mod file;
mod memory;
mod noop;

pub use self::file::FileStore;
pub use self::memory::MemoryStore;
pub use self::noop::NoopStore;

use std::sync::Arc;

use contracts::{DurableStore, StorageKind, StorageSettings};

use crate::error::DispatcherError;

/// Open the store described by `settings`
///
/// # Errors
/// - `kind = "file"` without a `path`
/// - The file store directory cannot be created
pub fn open_store(settings: &StorageSettings) -> Result<Arc<dyn DurableStore>, DispatcherError> {
    match settings.kind {
        StorageKind::File => {
            let path = settings.path.as_ref().ok_or_else(|| {
                DispatcherError::invalid_config("storage.path", "required for file storage")
            })?;
            Ok(Arc::new(FileStore::new(path)?))
        }
        StorageKind::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageKind::None => Ok(Arc::new(NoopStore::new())),
    }
}
