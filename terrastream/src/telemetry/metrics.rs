//! Lock-free atomic metrics collection.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use super::TelemetrySnapshot;

/// Counters for one tile layer.
///
/// All operations use `Relaxed` ordering; the counters are independent
/// measurements.
pub struct LayerMetrics {
    start_time: Instant,

    // === Selection ===
    frames: AtomicU64,
    tiles_selected: AtomicU64,
    tiles_resident: AtomicU64,
    tiles_fallback: AtomicU64,
    tiles_missing: AtomicU64,
    eager_loads: AtomicU64,

    // === Queue ===
    fetches_queued: AtomicU64,
    fetches_deduplicated: AtomicU64,
    fetches_submitted: AtomicU64,
    fetches_dropped: AtomicU64,
    fetches_active: AtomicUsize,

    // === Outcomes ===
    store_hits: AtomicU64,
    fetch_successes: AtomicU64,
    bytes_fetched: AtomicU64,
    absence_marked: AtomicU64,
    transient_failures: AtomicU64,
    corrupt_files: AtomicU64,
    expired_files: AtomicU64,

    // === Cache ===
    evictions: AtomicU64,
}

impl LayerMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            frames: AtomicU64::new(0),
            tiles_selected: AtomicU64::new(0),
            tiles_resident: AtomicU64::new(0),
            tiles_fallback: AtomicU64::new(0),
            tiles_missing: AtomicU64::new(0),
            eager_loads: AtomicU64::new(0),
            fetches_queued: AtomicU64::new(0),
            fetches_deduplicated: AtomicU64::new(0),
            fetches_submitted: AtomicU64::new(0),
            fetches_dropped: AtomicU64::new(0),
            fetches_active: AtomicUsize::new(0),
            store_hits: AtomicU64::new(0),
            fetch_successes: AtomicU64::new(0),
            bytes_fetched: AtomicU64::new(0),
            absence_marked: AtomicU64::new(0),
            transient_failures: AtomicU64::new(0),
            corrupt_files: AtomicU64::new(0),
            expired_files: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    // === Selection ===

    /// Record one rendered frame and how its tiles were resolved.
    pub fn frame_rendered(&self, resident: u64, fallback: u64, missing: u64) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.tiles_selected
            .fetch_add(resident + fallback + missing, Ordering::Relaxed);
        self.tiles_resident.fetch_add(resident, Ordering::Relaxed);
        self.tiles_fallback.fetch_add(fallback, Ordering::Relaxed);
        self.tiles_missing.fetch_add(missing, Ordering::Relaxed);
    }

    /// A level-0 tile was loaded synchronously from the store.
    pub fn eager_load(&self) {
        self.eager_loads.fetch_add(1, Ordering::Relaxed);
    }

    // === Queue ===

    pub fn fetch_queued(&self) {
        self.fetches_queued.fetch_add(1, Ordering::Relaxed);
    }

    /// A submit collapsed into an already queued or in-flight request.
    pub fn fetch_deduplicated(&self) {
        self.fetches_deduplicated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fetches_drained(&self, submitted: u64, dropped: u64) {
        self.fetches_submitted.fetch_add(submitted, Ordering::Relaxed);
        self.fetches_dropped.fetch_add(dropped, Ordering::Relaxed);
    }

    pub fn fetch_started(&self) {
        self.fetches_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fetch_finished(&self) {
        self.fetches_active.fetch_sub(1, Ordering::Relaxed);
    }

    // === Outcomes ===

    pub fn store_hit(&self) {
        self.store_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fetch_succeeded(&self, bytes: u64) {
        self.fetch_successes.fetch_add(1, Ordering::Relaxed);
        self.bytes_fetched.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn absence_marked(&self) {
        self.absence_marked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transient_failure(&self) {
        self.transient_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn corrupt_file(&self) {
        self.corrupt_files.fetch_add(1, Ordering::Relaxed);
    }

    pub fn expired_file(&self) {
        self.expired_files.fetch_add(1, Ordering::Relaxed);
    }

    // === Cache ===

    pub fn evicted(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of every counter.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            uptime: self.start_time.elapsed(),
            frames: self.frames.load(Ordering::Relaxed),
            tiles_selected: self.tiles_selected.load(Ordering::Relaxed),
            tiles_resident: self.tiles_resident.load(Ordering::Relaxed),
            tiles_fallback: self.tiles_fallback.load(Ordering::Relaxed),
            tiles_missing: self.tiles_missing.load(Ordering::Relaxed),
            eager_loads: self.eager_loads.load(Ordering::Relaxed),
            fetches_queued: self.fetches_queued.load(Ordering::Relaxed),
            fetches_deduplicated: self.fetches_deduplicated.load(Ordering::Relaxed),
            fetches_submitted: self.fetches_submitted.load(Ordering::Relaxed),
            fetches_dropped: self.fetches_dropped.load(Ordering::Relaxed),
            fetches_active: self.fetches_active.load(Ordering::Relaxed),
            store_hits: self.store_hits.load(Ordering::Relaxed),
            fetch_successes: self.fetch_successes.load(Ordering::Relaxed),
            bytes_fetched: self.bytes_fetched.load(Ordering::Relaxed),
            absence_marked: self.absence_marked.load(Ordering::Relaxed),
            transient_failures: self.transient_failures.load(Ordering::Relaxed),
            corrupt_files: self.corrupt_files.load(Ordering::Relaxed),
            expired_files: self.expired_files.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl Default for LayerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_accounting() {
        let metrics = LayerMetrics::new();
        metrics.frame_rendered(3, 2, 1);
        metrics.frame_rendered(4, 0, 0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.frames, 2);
        assert_eq!(snapshot.tiles_selected, 10);
        assert_eq!(snapshot.tiles_resident, 7);
        assert_eq!(snapshot.tiles_fallback, 2);
        assert_eq!(snapshot.tiles_missing, 1);
    }

    #[test]
    fn test_queue_tracking() {
        let metrics = LayerMetrics::new();
        metrics.fetch_queued();
        metrics.fetch_queued();
        metrics.fetch_deduplicated();
        metrics.fetches_drained(1, 1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.fetches_queued, 2);
        assert_eq!(snapshot.fetches_deduplicated, 1);
        assert_eq!(snapshot.fetches_submitted, 1);
        assert_eq!(snapshot.fetches_dropped, 1);
    }

    #[test]
    fn test_active_fetches() {
        let metrics = LayerMetrics::new();
        metrics.fetch_started();
        metrics.fetch_started();
        metrics.fetch_finished();
        assert_eq!(metrics.snapshot().fetches_active, 1);
    }

    #[test]
    fn test_outcomes() {
        let metrics = LayerMetrics::new();
        metrics.store_hit();
        metrics.fetch_succeeded(2048);
        metrics.fetch_succeeded(1024);
        metrics.absence_marked();
        metrics.transient_failure();
        metrics.corrupt_file();
        metrics.expired_file();
        metrics.evicted(5);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.store_hits, 1);
        assert_eq!(snapshot.fetch_successes, 2);
        assert_eq!(snapshot.bytes_fetched, 3072);
        assert_eq!(snapshot.absence_marked, 1);
        assert_eq!(snapshot.transient_failures, 1);
        assert_eq!(snapshot.corrupt_files, 1);
        assert_eq!(snapshot.expired_files, 1);
        assert_eq!(snapshot.evictions, 5);
    }
}
