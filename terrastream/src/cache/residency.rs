//! Bounded in-memory residency cache.
//!
//! Maps tile addresses to renderer-side resource handles. Capacity is a byte
//! budget enforced with two watermarks: once the running total exceeds the
//! high watermark, least-recently-used entries are evicted until the total is
//! at or below the low watermark.
//!
//! ```text
//!   bytes
//!     │        insert ──┐
//!  high ─ ─ ─ ─ ─ ─ ─ ─ ┼ ─ ─ ─ ─ ─ ─
//!     │                 │ evict LRU
//!   low ─ ─ ─ ─ ─ ─ ─ ─ ▼ ─ ─ ─ ─ ─ ─
//!     │
//! ```
//!
//! Evicted and replaced handles are passed to a release callback after the
//! internal lock has been dropped, so the callback may call back into the
//! cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::grid::TileAddress;

/// Invalid watermark configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WatermarkError {
    #[error("low watermark ({low} bytes) exceeds high watermark ({high} bytes)")]
    Inverted { low: u64, high: u64 },

    #[error("high watermark must be greater than zero")]
    ZeroCapacity,
}

/// Byte thresholds that drive eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheWatermarks {
    high: u64,
    low: u64,
}

impl CacheWatermarks {
    /// Create watermarks, requiring `0 < high` and `low <= high`.
    pub fn new(high: u64, low: u64) -> Result<Self, WatermarkError> {
        if high == 0 {
            return Err(WatermarkError::ZeroCapacity);
        }
        if low > high {
            return Err(WatermarkError::Inverted { low, high });
        }
        Ok(Self { high, low })
    }

    pub fn high(&self) -> u64 {
        self.high
    }

    pub fn low(&self) -> u64 {
        self.low
    }
}

impl Default for CacheWatermarks {
    /// 512 MB high, 384 MB low.
    fn default() -> Self {
        Self {
            high: 512 * 1024 * 1024,
            low: 384 * 1024 * 1024,
        }
    }
}

/// One resident resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord<H> {
    pub address: TileAddress,
    pub size_bytes: u64,
    pub resource: H,
}

/// Callback that disposes of handles leaving the cache.
pub type ReleaseFn<H> = Box<dyn Fn(TileAddress, H) + Send + Sync>;

struct Entry<H> {
    record: ResourceRecord<H>,
    last_access: u64,
}

struct Inner<H> {
    entries: HashMap<TileAddress, Entry<H>>,
    total_bytes: u64,
    clock: u64,
}

impl<H> Inner<H> {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn touch(&mut self, address: &TileAddress) -> Option<&Entry<H>> {
        let now = self.tick();
        let entry = self.entries.get_mut(address)?;
        entry.last_access = now;
        Some(entry)
    }

    /// Remove least-recently-used entries, sparing `keep`, until the total
    /// is at or below `low`.
    fn evict_to(&mut self, low: u64, keep: &TileAddress) -> Vec<ResourceRecord<H>> {
        let mut candidates: Vec<(u64, TileAddress)> = self
            .entries
            .iter()
            .filter(|(address, _)| *address != keep)
            .map(|(address, entry)| (entry.last_access, *address))
            .collect();
        candidates.sort_unstable();

        let mut evicted = Vec::new();
        for (_, address) in candidates {
            if self.total_bytes <= low {
                break;
            }
            if let Some(entry) = self.entries.remove(&address) {
                self.total_bytes -= entry.record.size_bytes;
                evicted.push(entry.record);
            }
        }
        evicted
    }
}

/// Point-in-time view of cache occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResidencyStats {
    pub entries: usize,
    pub total_bytes: u64,
    pub evictions: u64,
}

/// Byte-budgeted LRU map from tile address to resource handle.
///
/// `H` is the caller's resource handle. It is cloned out of the cache on
/// [`get`](Self::get), so handles are expected to be cheap references
/// (an id or an `Arc`).
pub struct ResidencyCache<H> {
    inner: Mutex<Inner<H>>,
    watermarks: CacheWatermarks,
    release: ReleaseFn<H>,
    evictions: AtomicU64,
}

impl<H: Clone> ResidencyCache<H> {
    /// Create a cache that hands every evicted or replaced handle to `release`.
    pub fn new<F>(watermarks: CacheWatermarks, release: F) -> Self
    where
        F: Fn(TileAddress, H) + Send + Sync + 'static,
    {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                total_bytes: 0,
                clock: 0,
            }),
            watermarks,
            release: Box::new(release),
            evictions: AtomicU64::new(0),
        }
    }

    /// Create a cache that simply drops evicted handles.
    pub fn without_release(watermarks: CacheWatermarks) -> Self {
        Self::new(watermarks, |_, _| {})
    }

    /// True if `address` is resident. Counts as an access.
    pub fn is_resident(&self, address: &TileAddress) -> bool {
        self.inner.lock().touch(address).is_some()
    }

    /// Handle for `address`, if resident. Counts as an access.
    pub fn get(&self, address: &TileAddress) -> Option<H> {
        self.inner
            .lock()
            .touch(address)
            .map(|entry| entry.record.resource.clone())
    }

    /// True if `address` is resident, without refreshing its access time.
    pub fn contains(&self, address: &TileAddress) -> bool {
        self.inner.lock().entries.contains_key(address)
    }

    /// Insert or replace the resource for `address`.
    ///
    /// Returns the number of entries evicted to get back under the low
    /// watermark. The entry just inserted is never evicted, even when it alone
    /// exceeds the budget.
    pub fn insert(&self, address: TileAddress, resource: H, size_bytes: u64) -> usize {
        let mut released = Vec::new();
        let evicted_count;
        {
            let mut inner = self.inner.lock();
            let now = inner.tick();
            let record = ResourceRecord {
                address,
                size_bytes,
                resource,
            };
            if let Some(old) = inner.entries.insert(
                address,
                Entry {
                    record,
                    last_access: now,
                },
            ) {
                inner.total_bytes -= old.record.size_bytes;
                released.push(old.record);
            }
            inner.total_bytes += size_bytes;

            let evicted = if inner.total_bytes > self.watermarks.high {
                inner.evict_to(self.watermarks.low, &address)
            } else {
                Vec::new()
            };
            evicted_count = evicted.len();

            debug_assert_eq!(
                inner.total_bytes,
                inner
                    .entries
                    .values()
                    .map(|e| e.record.size_bytes)
                    .sum::<u64>(),
                "resident byte total out of sync with entries"
            );
            debug_assert!(inner.entries.contains_key(&address));

            if evicted_count > 0 {
                debug!(
                    evicted = evicted_count,
                    resident_bytes = inner.total_bytes,
                    low_watermark = self.watermarks.low,
                    "Residency cache evicted entries"
                );
            }
            released.extend(evicted);
        }

        self.evictions
            .fetch_add(evicted_count as u64, Ordering::Relaxed);
        for record in released {
            (self.release)(record.address, record.resource);
        }
        evicted_count
    }

    /// Remove `address`, releasing its handle. Returns true if it was resident.
    pub fn remove(&self, address: &TileAddress) -> bool {
        let removed = {
            let mut inner = self.inner.lock();
            let removed = inner.entries.remove(address);
            if let Some(ref entry) = removed {
                inner.total_bytes -= entry.record.size_bytes;
            }
            removed
        };
        match removed {
            Some(entry) => {
                (self.release)(entry.record.address, entry.record.resource);
                true
            }
            None => false,
        }
    }

    /// Release every resident handle.
    pub fn clear(&self) {
        let drained: Vec<_> = {
            let mut inner = self.inner.lock();
            inner.total_bytes = 0;
            inner.entries.drain().map(|(_, e)| e.record).collect()
        };
        for record in drained {
            (self.release)(record.address, record.resource);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes currently resident.
    pub fn size_bytes(&self) -> u64 {
        self.inner.lock().total_bytes
    }

    pub fn watermarks(&self) -> CacheWatermarks {
        self.watermarks
    }

    pub fn stats(&self) -> ResidencyStats {
        let inner = self.inner.lock();
        ResidencyStats {
            entries: inner.entries.len(),
            total_bytes: inner.total_bytes,
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn addr(col: i32) -> TileAddress {
        TileAddress::new(1, 0, col)
    }

    fn recording_cache(high: u64, low: u64) -> (ResidencyCache<u32>, Arc<Mutex<Vec<u32>>>) {
        let released = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&released);
        let cache = ResidencyCache::new(CacheWatermarks::new(high, low).unwrap(), move |_, h| {
            sink.lock().push(h)
        });
        (cache, released)
    }

    #[test]
    fn test_watermarks_validation() {
        assert!(CacheWatermarks::new(100, 50).is_ok());
        assert!(CacheWatermarks::new(100, 100).is_ok());
        assert_eq!(
            CacheWatermarks::new(50, 100),
            Err(WatermarkError::Inverted { low: 100, high: 50 })
        );
        assert_eq!(
            CacheWatermarks::new(0, 0),
            Err(WatermarkError::ZeroCapacity)
        );
    }

    #[test]
    fn test_insert_and_get() {
        let (cache, _) = recording_cache(1000, 500);
        assert!(!cache.is_resident(&addr(0)));

        cache.insert(addr(0), 7, 100);
        assert!(cache.is_resident(&addr(0)));
        assert_eq!(cache.get(&addr(0)), Some(7));
        assert_eq!(cache.size_bytes(), 100);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_replace_releases_old_handle() {
        let (cache, released) = recording_cache(1000, 500);
        cache.insert(addr(0), 1, 100);
        cache.insert(addr(0), 2, 150);

        assert_eq!(cache.get(&addr(0)), Some(2));
        assert_eq!(cache.size_bytes(), 150);
        assert_eq!(cache.len(), 1);
        assert_eq!(*released.lock(), vec![1]);
    }

    #[test]
    fn test_no_eviction_at_high_watermark() {
        let (cache, released) = recording_cache(300, 100);
        for i in 0..3 {
            cache.insert(addr(i), i as u32, 100);
        }
        assert_eq!(cache.size_bytes(), 300);
        assert!(released.lock().is_empty());
    }

    #[test]
    fn test_eviction_settles_below_low_watermark() {
        let (cache, released) = recording_cache(300, 150);
        for i in 0..3 {
            cache.insert(addr(i), i as u32, 100);
        }
        let evicted = cache.insert(addr(3), 3, 100);

        assert_eq!(evicted, 3);
        assert!(cache.size_bytes() <= 150);
        assert!(cache.contains(&addr(3)));
        assert_eq!(*released.lock(), vec![0, 1, 2]);
        assert_eq!(cache.stats().evictions, 3);
    }

    #[test]
    fn test_eviction_uses_last_access_not_insertion() {
        let (cache, released) = recording_cache(300, 200);
        for i in 0..3 {
            cache.insert(addr(i), i as u32, 100);
        }
        // Touch the oldest insert so entry 1 becomes least recently used.
        assert!(cache.is_resident(&addr(0)));

        cache.insert(addr(3), 3, 100);

        assert_eq!(*released.lock(), vec![1, 2]);
        assert!(cache.contains(&addr(0)));
        assert!(cache.contains(&addr(3)));
        assert!(!cache.contains(&addr(1)));
    }

    #[test]
    fn test_oversized_insert_is_kept() {
        let (cache, released) = recording_cache(100, 50);
        cache.insert(addr(0), 0, 40);
        cache.insert(addr(1), 1, 500);

        assert!(cache.contains(&addr(1)));
        assert!(!cache.contains(&addr(0)));
        assert_eq!(cache.size_bytes(), 500);
        assert_eq!(*released.lock(), vec![0]);
    }

    #[test]
    fn test_contains_does_not_refresh_access() {
        let (cache, released) = recording_cache(200, 100);
        cache.insert(addr(0), 0, 100);
        cache.insert(addr(1), 1, 100);
        assert!(cache.contains(&addr(0)));

        cache.insert(addr(2), 2, 100);
        assert_eq!(*released.lock(), vec![0, 1]);
    }

    #[test]
    fn test_remove_and_clear_release() {
        let (cache, released) = recording_cache(1000, 500);
        cache.insert(addr(0), 0, 10);
        cache.insert(addr(1), 1, 10);
        cache.insert(addr(2), 2, 10);

        assert!(cache.remove(&addr(1)));
        assert!(!cache.remove(&addr(1)));
        assert_eq!(cache.size_bytes(), 20);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.size_bytes(), 0);

        let mut handles = released.lock().clone();
        handles.sort_unstable();
        assert_eq!(handles, vec![0, 1, 2]);
    }

    #[test]
    fn test_release_callback_may_reenter_cache() {
        let cache: Arc<ResidencyCache<u32>> = Arc::new_cyclic(|weak: &std::sync::Weak<ResidencyCache<u32>>| {
            let weak = weak.clone();
            ResidencyCache::new(CacheWatermarks::new(100, 0).unwrap(), move |address, _| {
                if let Some(cache) = std::sync::Weak::upgrade(&weak) {
                    assert!(!cache.contains(&address));
                }
            })
        });
        cache.insert(addr(0), 0, 100);
        cache.insert(addr(1), 1, 100);
        assert_eq!(cache.len(), 1);
    }
}
