//! FileStore - one JSON file per key on disk

use contracts::{ContractError, DurableStore};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Store keeping each key in its own JSON file under `base_path`
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-write leaves the previous batch intact.
#[derive(Debug)]
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    /// Create a new FileStore, creating `base_path` if needed
    pub fn new(base_path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;
        debug!(path = %base_path.display(), "FileStore opened");
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// `<key>.json` for plain keys, `hex.<hex(key)>.json` for anything else
    ///
    /// Plain stems never contain '.', so the two forms cannot collide.
    fn path_for(&self, key: &str) -> PathBuf {
        let plain = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'));
        let file_name = if plain {
            format!("{key}.json")
        } else {
            format!("hex.{}.json", hex::encode(key))
        };
        self.base_path.join(file_name)
    }

    fn write_atomically(&self, path: &Path, value: &str) -> std::io::Result<()> {
        let tmp_path = path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(value.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    }

    fn io_error(&self, key: &str, op: &str, e: std::io::Error) -> ContractError {
        error!(store = self.name(), key, op, error = %e, "FileStore operation failed");
        ContractError::storage(self.name(), key, format!("{op} failed: {e}"))
    }
}

impl DurableStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    fn is_available(&self) -> bool {
        self.base_path.is_dir()
    }

    fn get(&self, key: &str) -> Result<Option<String>, ContractError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(key, "read", e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ContractError> {
        let path = self.path_for(key);
        self.write_atomically(&path, value)
            .map_err(|e| self.io_error(key, "write", e))
    }

    fn remove(&self, key: &str) -> Result<(), ContractError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(key, "remove", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_store_write_read_remove() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        store.set("app_dispatcher_", r#"[{"n":1}]"#).unwrap();
        assert!(dir.path().join("app_dispatcher_.json").exists());
        assert_eq!(
            store.get("app_dispatcher_").unwrap().as_deref(),
            Some(r#"[{"n":1}]"#)
        );

        store.remove("app_dispatcher_").unwrap();
        assert_eq!(store.get("app_dispatcher_").unwrap(), None);
        // Removing twice is fine
        store.remove("app_dispatcher_").unwrap();
    }

    #[test]
    fn test_file_store_overwrite_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        store.set("dispatcher_", "[]").unwrap();
        store.set("dispatcher_", r#"[{"n":2}]"#).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            store.get("dispatcher_").unwrap().as_deref(),
            Some(r#"[{"n":2}]"#)
        );
    }

    #[test]
    fn test_file_store_encodes_unsafe_keys() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        for key in ["../escape", "a/b", "shop:user@example.com_dispatcher_", "."] {
            store.set(key, r#"[{"n":1}]"#).unwrap();
            assert_eq!(store.get(key).unwrap().as_deref(), Some(r#"[{"n":1}]"#));
        }
        // Every file stays directly inside the base directory
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 4);
        assert!(!dir.path().parent().unwrap().join("escape.json").exists());

        store.remove("a/b").unwrap();
        assert_eq!(store.get("a/b").unwrap(), None);
        assert!(store.get("../escape").unwrap().is_some());
    }

    #[test]
    fn test_encoded_key_does_not_shadow_plain_key() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        store.set("ab", "[1]").unwrap();
        store.set("\u{ab}", "[2]").unwrap();
        store.set("hex.ab", "[3]").unwrap();

        assert_eq!(store.get("ab").unwrap().as_deref(), Some("[1]"));
        assert_eq!(store.get("\u{ab}").unwrap().as_deref(), Some("[2]"));
        assert_eq!(store.get("hex.ab").unwrap().as_deref(), Some("[3]"));
    }

    #[test]
    fn test_file_store_creates_base_dir() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested").join("batches");
        let store = FileStore::new(&nested).unwrap();
        assert!(store.is_available());
        assert_eq!(store.base_path(), nested.as_path());
    }
}
