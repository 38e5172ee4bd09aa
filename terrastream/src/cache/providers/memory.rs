//! Process-local persistent store.

use std::collections::HashMap;
use std::time::SystemTime;

use parking_lot::RwLock;

use crate::cache::store::{validate_path, PersistentStore, StoreError};

struct StoredEntry {
    data: Vec<u8>,
    modified: SystemTime,
}

/// [`PersistentStore`] backed by a map. Contents are lost when dropped.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, StoredEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the modification time of an existing entry.
    ///
    /// Returns false if there is no entry at `path`.
    pub fn set_mtime(&self, path: &str, modified: SystemTime) -> bool {
        match self.entries.write().get_mut(path) {
            Some(entry) => {
                entry.modified = modified;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Sorted list of stored paths.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.entries.read().keys().cloned().collect();
        paths.sort();
        paths
    }
}

impl PersistentStore for MemoryStore {
    fn exists(&self, path: &str) -> bool {
        self.entries.read().contains_key(path)
    }

    fn mtime(&self, path: &str) -> Option<SystemTime> {
        self.entries.read().get(path).map(|e| e.modified)
    }

    fn read(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        validate_path(path)?;
        Ok(self.entries.read().get(path).map(|e| e.data.clone()))
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        validate_path(path)?;
        self.entries.write().insert(
            path.to_string(),
            StoredEntry {
                data: data.to_vec(),
                modified: SystemTime::now(),
            },
        );
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<bool, StoreError> {
        validate_path(path)?;
        Ok(self.entries.write().remove(path).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_basic_operations() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store.write("0/0/0_0.png", b"a").unwrap();
        store.write("0/0/0_1.png", b"b").unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.paths(), vec!["0/0/0_0.png", "0/0/0_1.png"]);
        assert_eq!(store.read("0/0/0_1.png").unwrap(), Some(b"b".to_vec()));

        assert!(store.delete("0/0/0_0.png").unwrap());
        assert!(!store.exists("0/0/0_0.png"));
    }

    #[test]
    fn test_set_mtime() {
        let store = MemoryStore::new();
        let past = SystemTime::now() - Duration::from_secs(60);

        assert!(!store.set_mtime("x.png", past));
        store.write("x.png", b"x").unwrap();
        assert!(store.set_mtime("x.png", past));
        assert_eq!(store.mtime("x.png"), Some(past));
    }
}
