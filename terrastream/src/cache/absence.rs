//! Negative cache of tiles confirmed unavailable.
//!
//! The selector consults the in-memory set every frame. When backed by a
//! [`PersistentStore`], every change is written through as a JSON index so
//! marks survive restarts.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::cache::store::PersistentStore;
use crate::grid::TileAddress;

/// Store path of the persisted absence index.
pub const ABSENCE_INDEX_PATH: &str = "absent.json";

/// Set of tile addresses whose resource is known not to exist.
pub struct AbsenceMarks {
    marks: RwLock<HashSet<TileAddress>>,
    store: Option<Arc<dyn PersistentStore>>,
    // Serializes index writes so an older snapshot never lands last.
    persist_lock: Mutex<()>,
}

impl AbsenceMarks {
    /// Marks held only in memory.
    pub fn in_memory() -> Self {
        Self {
            marks: RwLock::new(HashSet::new()),
            store: None,
            persist_lock: Mutex::new(()),
        }
    }

    /// Restore marks from `store`, writing later changes back to it.
    ///
    /// A missing index starts empty. An unreadable or corrupt index is
    /// logged and discarded.
    pub fn load(store: Arc<dyn PersistentStore>) -> Self {
        let marks = match store.read(ABSENCE_INDEX_PATH) {
            Ok(Some(bytes)) => match serde_json::from_slice::<Vec<TileAddress>>(&bytes) {
                Ok(list) => {
                    info!(count = list.len(), "Loaded absence marks");
                    list.into_iter().collect()
                }
                Err(e) => {
                    warn!(error = %e, "Discarding corrupt absence index");
                    HashSet::new()
                }
            },
            Ok(None) => HashSet::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read absence index");
                HashSet::new()
            }
        };
        Self {
            marks: RwLock::new(marks),
            store: Some(store),
            persist_lock: Mutex::new(()),
        }
    }

    pub fn is_marked(&self, address: &TileAddress) -> bool {
        self.marks.read().contains(address)
    }

    /// Record `address` as unavailable. Returns true if it was not marked before.
    pub fn mark(&self, address: TileAddress) -> bool {
        let inserted = self.marks.write().insert(address);
        if inserted {
            debug!(
                level = address.level,
                row = address.row,
                col = address.col,
                "Marked tile absent"
            );
            self.persist();
        }
        inserted
    }

    /// Clear the mark for `address`. Returns true if it was marked.
    pub fn unmark(&self, address: &TileAddress) -> bool {
        let removed = self.marks.write().remove(address);
        if removed {
            debug!(
                level = address.level,
                row = address.row,
                col = address.col,
                "Cleared absence mark"
            );
            self.persist();
        }
        removed
    }

    /// Drop every mark.
    pub fn clear(&self) {
        let had_marks = {
            let mut marks = self.marks.write();
            let had = !marks.is_empty();
            marks.clear();
            had
        };
        if had_marks {
            info!("Cleared all absence marks");
            self.persist();
        }
    }

    pub fn len(&self) -> usize {
        self.marks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.read().is_empty()
    }

    /// Sorted copy of the marked addresses.
    pub fn addresses(&self) -> Vec<TileAddress> {
        let mut list: Vec<TileAddress> = self.marks.read().iter().copied().collect();
        list.sort_unstable();
        list
    }

    fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let _guard = self.persist_lock.lock();
        let snapshot = self.addresses();
        let bytes = match serde_json::to_vec(&snapshot) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Failed to serialize absence index");
                return;
            }
        };
        if let Err(e) = store.write(ABSENCE_INDEX_PATH, &bytes) {
            warn!(error = %e, "Failed to persist absence index");
        }
    }
}
