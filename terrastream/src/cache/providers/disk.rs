//! Directory-backed persistent store.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::trace;

use crate::cache::store::{validate_path, PersistentStore, StoreError};

/// Stores entries as files under a root directory.
///
/// Writes go to a sibling temporary file that is renamed into place, so a
/// concurrent reader sees either the old file or the new one, never a partial
/// write.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Create a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute file path for a store path, or `None` if the path is invalid.
    pub fn file_path(&self, path: &str) -> Option<PathBuf> {
        validate_path(path).ok()?;
        Some(self.root.join(path))
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        validate_path(path)?;
        Ok(self.root.join(path))
    }
}

impl PersistentStore for DiskStore {
    fn exists(&self, path: &str) -> bool {
        self.file_path(path).is_some_and(|p| p.is_file())
    }

    fn mtime(&self, path: &str) -> Option<SystemTime> {
        let file = self.file_path(path)?;
        fs::metadata(file).and_then(|m| m.modified()).ok()
    }

    fn read(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let file = self.resolve(path)?;
        match fs::read(&file) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(file, e)),
        }
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        let file = self.resolve(path)?;
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let mut tmp = file.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let result = fs::write(&tmp, data).and_then(|()| fs::rename(&tmp, &file));
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(StoreError::io(file, e));
        }
        trace!(path = %file.display(), bytes = data.len(), "Wrote store entry");
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<bool, StoreError> {
        let file = self.resolve(path)?;
        match fs::remove_file(&file) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(file, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_write_creates_directories() {
        let temp = TempDir::new().unwrap();
        let store = DiskStore::new(temp.path());

        store.write("4/7/7_9.png", b"payload").unwrap();

        assert!(temp.path().join("4/7/7_9.png").is_file());
        assert!(!temp.path().join("4/7/7_9.png.tmp").exists());
        assert!(store.exists("4/7/7_9.png"));
        assert_eq!(
            store.read("4/7/7_9.png").unwrap(),
            Some(b"payload".to_vec())
        );
    }

    #[test]
    fn test_missing_entries() {
        let temp = TempDir::new().unwrap();
        let store = DiskStore::new(temp.path().join("not-created-yet"));

        assert!(!store.exists("0/0/0_0.png"));
        assert_eq!(store.mtime("0/0/0_0.png"), None);
        assert_eq!(store.read("0/0/0_0.png").unwrap(), None);
        assert!(!store.delete("0/0/0_0.png").unwrap());
    }

    #[test]
    fn test_overwrite_and_delete() {
        let temp = TempDir::new().unwrap();
        let store = DiskStore::new(temp.path());

        store.write("absent.json", b"[]").unwrap();
        store.write("absent.json", b"[1]").unwrap();
        assert_eq!(store.read("absent.json").unwrap(), Some(b"[1]".to_vec()));

        assert!(store.delete("absent.json").unwrap());
        assert!(!store.exists("absent.json"));
    }

    #[test]
    fn test_mtime_reflects_file_time() {
        let temp = TempDir::new().unwrap();
        let store = DiskStore::new(temp.path());
        store.write("1/0/0_0.png", b"x").unwrap();

        let old = SystemTime::now() - Duration::from_secs(86_400);
        filetime::set_file_mtime(
            temp.path().join("1/0/0_0.png"),
            filetime::FileTime::from_system_time(old),
        )
        .unwrap();

        let mtime = store.mtime("1/0/0_0.png").unwrap();
        let drift = mtime
            .duration_since(old)
            .unwrap_or_else(|e| e.duration());
        assert!(drift < Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_paths_rejected() {
        let temp = TempDir::new().unwrap();
        let store = DiskStore::new(temp.path());

        assert!(matches!(
            store.write("../escape.png", b"x"),
            Err(StoreError::InvalidPath(_))
        ));
        assert!(!store.exists("/etc/hosts"));
        assert!(store.read("a/../../b").is_err());
    }
}
