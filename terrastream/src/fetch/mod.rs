//! Asynchronous tile fetching.
//!
//! The render thread [`submit`](FetchQueue::submit)s requests during
//! selection and [`drain`](FetchQueue::drain)s them once per frame into an
//! [`ExecutionService`]. Each accepted request becomes a [`FetchTask`] that
//! loads from the persistent store or the [`ResourceFetcher`], and reports a
//! [`FetchOutcome`].
//!
//! # Concurrency
//!
//! - `submit`, `pop` and in-flight removal are atomic under one queue lock
//! - submission never blocks; a full service drops the request
//! - a running task always completes and releases its in-flight slot

mod pool;
mod queue;
mod task;

pub use pool::{BoxFuture, ExecutionService, Job, WorkerPool, WorkerPoolConfig};
pub use queue::{CompletionGuard, DrainReport, FetchQueue, PendingRequest};
pub use task::{
    AbsenceReason, DecodeError, Decoded, Decoder, FetchContext, FetchError, FetchOutcome,
    FetchTask, FetchedPayload, ResourceFetcher, RetryReason,
};
pub(crate) use task::LocalLoad;
