//! Persistent tile storage.
//!
//! [`PersistentStore`] is a minimal path-keyed byte store. [`TileStore`] layers
//! the tile naming scheme and expiry check on top of it:
//!
//! ```text
//! TileAddress ──► "{level}/{row}/{row}_{col}.{ext}" ──► Arc<dyn PersistentStore>
//! ```
//!
//! Paths are relative, `/`-separated and never contain `..`; providers map
//! them onto their own namespace.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use thiserror::Error;

use crate::grid::TileAddress;

/// Errors raised by persistent store providers.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid store path: {0}")]
    InvalidPath(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Path-keyed byte storage that survives restarts.
///
/// Calls are synchronous and may block; async callers run them through
/// `tokio::task::spawn_blocking`.
pub trait PersistentStore: Send + Sync {
    /// True if an entry exists at `path`.
    fn exists(&self, path: &str) -> bool;

    /// Last modification time of the entry, if it exists.
    fn mtime(&self, path: &str) -> Option<SystemTime>;

    /// Read an entry. `Ok(None)` if it does not exist.
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Create or replace an entry.
    fn write(&self, path: &str, data: &[u8]) -> Result<(), StoreError>;

    /// Delete an entry. Returns true if it existed.
    fn delete(&self, path: &str) -> Result<bool, StoreError>;
}

/// Reject absolute paths and parent-directory components.
pub(crate) fn validate_path(path: &str) -> Result<(), StoreError> {
    let bad = path.is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || path.split('/').any(|part| part.is_empty() || part == "..");
    if bad {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Tile-addressed view of a [`PersistentStore`].
#[derive(Clone)]
pub struct TileStore {
    store: Arc<dyn PersistentStore>,
    extension: String,
}

impl TileStore {
    /// Wrap `store`, naming tile files with `extension` (without the dot).
    pub fn new(store: Arc<dyn PersistentStore>, extension: impl Into<String>) -> Self {
        Self {
            store,
            extension: extension.into(),
        }
    }

    /// The underlying store, for non-tile entries such as the absence index.
    pub fn inner(&self) -> &Arc<dyn PersistentStore> {
        &self.store
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Relative path of the tile file for `address`.
    pub fn tile_path(&self, address: &TileAddress) -> String {
        format!(
            "{}/{}/{}_{}.{}",
            address.level, address.row, address.row, address.col, self.extension
        )
    }

    pub fn exists(&self, address: &TileAddress) -> bool {
        self.store.exists(&self.tile_path(address))
    }

    pub fn mtime(&self, address: &TileAddress) -> Option<SystemTime> {
        self.store.mtime(&self.tile_path(address))
    }

    pub fn read(&self, address: &TileAddress) -> Result<Option<Vec<u8>>, StoreError> {
        self.store.read(&self.tile_path(address))
    }

    pub fn write(&self, address: &TileAddress, data: &[u8]) -> Result<(), StoreError> {
        self.store.write(&self.tile_path(address), data)
    }

    pub fn delete(&self, address: &TileAddress) -> Result<bool, StoreError> {
        self.store.delete(&self.tile_path(address))
    }

    /// True if the stored tile is older than `expiry`.
    ///
    /// `None` or a zero duration never expires, and a missing file is not
    /// considered expired. Deleting expired files is left to the caller.
    pub fn is_expired(&self, address: &TileAddress, expiry: Option<Duration>) -> bool {
        self.is_expired_at(address, expiry, SystemTime::now())
    }

    /// [`is_expired`](Self::is_expired) against an explicit clock.
    pub fn is_expired_at(
        &self,
        address: &TileAddress,
        expiry: Option<Duration>,
        now: SystemTime,
    ) -> bool {
        let Some(expiry) = expiry.filter(|d| !d.is_zero()) else {
            return false;
        };
        let Some(cutoff) = now.checked_sub(expiry) else {
            return false;
        };
        match self.mtime(address) {
            Some(modified) => modified < cutoff,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::providers::MemoryStore;

    fn tile_store() -> (Arc<MemoryStore>, TileStore) {
        let memory = Arc::new(MemoryStore::new());
        let store = TileStore::new(memory.clone(), "png");
        (memory, store)
    }

    #[test]
    fn test_tile_path_layout() {
        let (_, store) = tile_store();
        assert_eq!(store.tile_path(&TileAddress::new(3, 12, 40)), "3/12/12_40.png");
        assert_eq!(store.tile_path(&TileAddress::new(0, -1, 2)), "0/-1/-1_2.png");
    }

    #[test]
    fn test_validate_path() {
        assert!(validate_path("3/12/12_40.png").is_ok());
        assert!(validate_path("absent.json").is_ok());
        assert!(validate_path("").is_err());
        assert!(validate_path("/etc/passwd").is_err());
        assert!(validate_path("a/../b").is_err());
        assert!(validate_path("a//b").is_err());
        assert!(validate_path("a\\b").is_err());
    }

    #[test]
    fn test_round_trip_through_addresses() {
        let (_, store) = tile_store();
        let address = TileAddress::new(1, 0, 1);
        assert!(!store.exists(&address));
        assert_eq!(store.read(&address).unwrap(), None);

        store.write(&address, b"tile").unwrap();
        assert!(store.exists(&address));
        assert_eq!(store.read(&address).unwrap(), Some(b"tile".to_vec()));

        assert!(store.delete(&address).unwrap());
        assert!(!store.delete(&address).unwrap());
    }

    #[test]
    fn test_is_expired() {
        let (memory, store) = tile_store();
        let address = TileAddress::new(2, 1, 1);
        let now = SystemTime::now();
        let hour = Duration::from_secs(3600);

        // Missing file never counts as expired.
        assert!(!store.is_expired_at(&address, Some(hour), now));

        store.write(&address, b"x").unwrap();
        memory.set_mtime(&store.tile_path(&address), now - 2 * hour);

        assert!(store.is_expired_at(&address, Some(hour), now));
        assert!(!store.is_expired_at(&address, Some(3 * hour), now));
        assert!(!store.is_expired_at(&address, None, now));
        assert!(!store.is_expired_at(&address, Some(Duration::ZERO), now));
    }
}
