//! Deduplicated priority queue of pending tile fetches.
//!
//! Requests are ordered by priority (lower values first, since priority is
//! the distance to the viewer), then by address for deterministic ties.
//! An address can be either queued or in flight, never both, and at most
//! once in each.
//!
//! ```text
//!  submit ──► queued ──pop──► in flight ──CompletionGuard dropped──► gone
//!               │                  ▲
//!               └── duplicate ─────┘ (no-op)
//! ```

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::pool::{ExecutionService, Job};
use crate::grid::TileAddress;

/// A tile waiting to be fetched.
///
/// Equality and hashing consider the address only, so two requests for the
/// same tile with different priorities are the same request.
#[derive(Debug, Clone, Copy)]
pub struct PendingRequest {
    pub address: TileAddress,
    /// Lower is more urgent.
    pub priority: f64,
}

impl PartialEq for PendingRequest {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for PendingRequest {}

impl Hash for PendingRequest {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

// Heap ordering, kept separate from request equality.
struct HeapEntry(PendingRequest);

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: invert both keys so the lowest priority
        // value, then the lowest address, pops first.
        other
            .0
            .priority
            .total_cmp(&self.0.priority)
            .then_with(|| other.0.address.cmp(&self.0.address))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<HeapEntry>,
    queued: HashSet<TileAddress>,
    in_flight: HashSet<TileAddress>,
}

/// Result of [`FetchQueue::drain`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub submitted: usize,
    pub dropped: usize,
}

/// Removes an address from the in-flight set when dropped.
///
/// Travels with the fetch job, so the address is released whether the job
/// completes, fails, panics, or is dropped without running.
#[must_use = "dropping the guard immediately releases the in-flight slot"]
pub struct CompletionGuard {
    state: Arc<Mutex<QueueState>>,
    address: TileAddress,
}

impl CompletionGuard {
    pub fn address(&self) -> TileAddress {
        self.address
    }
}

impl fmt::Debug for CompletionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionGuard")
            .field("address", &self.address)
            .finish()
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        let removed = self.state.lock().in_flight.remove(&self.address);
        debug_assert!(removed, "{} was not in flight", self.address);
    }
}

/// Pending fetch requests shared between the render thread and fetch workers.
#[derive(Clone, Default)]
pub struct FetchQueue {
    state: Arc<Mutex<QueueState>>,
}

impl FetchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a fetch for `address` unless one is already queued or in flight.
    ///
    /// Returns true if a new request was queued.
    pub fn submit(&self, address: TileAddress, priority: f64) -> bool {
        let mut state = self.state.lock();
        if state.in_flight.contains(&address) || !state.queued.insert(address) {
            return false;
        }
        state.heap.push(HeapEntry(PendingRequest { address, priority }));
        debug_assert_eq!(state.heap.len(), state.queued.len());
        true
    }

    /// Pop the most urgent request and move it in flight.
    pub fn pop(&self) -> Option<(PendingRequest, CompletionGuard)> {
        let request = {
            let mut state = self.state.lock();
            let HeapEntry(request) = state.heap.pop()?;
            let was_queued = state.queued.remove(&request.address);
            debug_assert!(was_queued);
            let fresh = state.in_flight.insert(request.address);
            debug_assert!(fresh, "{} queued while in flight", request.address);
            request
        };
        let guard = CompletionGuard {
            state: Arc::clone(&self.state),
            address: request.address,
        };
        Some((request, guard))
    }

    /// Hand every pending request to `service`, most urgent first.
    ///
    /// `make_job` turns a request and its guard into a job. Requests that do
    /// not fit in the service are dropped, not requeued; a later frame that
    /// still needs the tile will submit it again.
    pub fn drain<S, F>(&self, service: &S, mut make_job: F) -> DrainReport
    where
        S: ExecutionService + ?Sized,
        F: FnMut(PendingRequest, CompletionGuard) -> Job,
    {
        let mut report = DrainReport::default();
        while let Some((request, guard)) = self.pop() {
            if service.is_full() {
                drop(guard);
                report.dropped += 1;
                continue;
            }
            if service.try_submit(make_job(request, guard)) {
                report.submitted += 1;
            } else {
                report.dropped += 1;
            }
        }
        if report.dropped > 0 {
            debug!(
                submitted = report.submitted,
                dropped = report.dropped,
                "Execution service full, dropped fetch requests"
            );
        }
        report
    }

    /// Number of queued requests, excluding in-flight ones.
    pub fn len(&self) -> usize {
        self.state.lock().queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight_count(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    pub fn is_queued(&self, address: &TileAddress) -> bool {
        self.state.lock().queued.contains(address)
    }

    pub fn is_in_flight(&self, address: &TileAddress) -> bool {
        self.state.lock().in_flight.contains(address)
    }

    /// Queued requests in pop order, without removing them.
    pub fn pending(&self) -> Vec<PendingRequest> {
        let state = self.state.lock();
        let mut entries: Vec<&HeapEntry> = state.heap.iter().collect();
        entries.sort_unstable_by(|a, b| b.cmp(a));
        entries.into_iter().map(|e| e.0).collect()
    }
}
