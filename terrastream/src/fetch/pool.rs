//! Bounded execution service for fetch jobs.
//!
//! [`WorkerPool`] runs a fixed number of tokio tasks that pull jobs from a
//! shared bounded channel. Submission never blocks: when the channel is full
//! the job is handed back to the caller as refused.
//!
//! ```text
//!                 try_send            ┌──► worker 0 ──► job.await
//! try_submit ───► [ bounded mpsc ] ───┼──► worker 1 ──► job.await
//!                                     └──► worker N ──► job.await
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A unit of background work.
pub type Job = BoxFuture<'static, ()>;

/// Non-blocking submission point for background jobs.
pub trait ExecutionService: Send + Sync {
    /// Enqueue `job`. Returns false, dropping the job, if it cannot be accepted.
    fn try_submit(&self, job: Job) -> bool;

    /// True if the next `try_submit` would be refused.
    fn is_full(&self) -> bool;
}

/// Worker pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Jobs that may wait for a free worker.
    pub queue_capacity: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 64,
        }
    }
}

/// Fixed-size pool of tokio worker tasks.
pub struct WorkerPool {
    sender: mpsc::Sender<Job>,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    active: Arc<AtomicUsize>,
    config: WorkerPoolConfig,
}

impl WorkerPool {
    /// Spawn the workers on the current tokio runtime.
    ///
    /// Zero workers or zero capacity are raised to one.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(config: WorkerPoolConfig) -> Self {
        let config = WorkerPoolConfig {
            workers: config.workers.max(1),
            queue_capacity: config.queue_capacity.max(1),
        };
        let (sender, receiver) = mpsc::channel::<Job>(config.queue_capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let shutdown = CancellationToken::new();
        let active = Arc::new(AtomicUsize::new(0));

        let workers = (0..config.workers)
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    Arc::clone(&receiver),
                    shutdown.clone(),
                    Arc::clone(&active),
                ))
            })
            .collect();

        debug!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            "Worker pool started"
        );

        Self {
            sender,
            shutdown,
            workers: Mutex::new(workers),
            active,
            config,
        }
    }

    pub fn config(&self) -> WorkerPoolConfig {
        self.config
    }

    /// Jobs currently executing.
    pub fn active_jobs(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Jobs accepted but not yet picked up by a worker.
    pub fn queued_jobs(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// True once there is nothing queued or running.
    pub fn is_idle(&self) -> bool {
        self.queued_jobs() == 0 && self.active_jobs() == 0
    }

    /// Token cancelled when the pool shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop the workers and wait for them to exit.
    ///
    /// Jobs already running finish first. Queued jobs that have not started
    /// are dropped.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = %e, "Fetch worker terminated abnormally");
            }
        }
        debug!("Worker pool stopped");
    }
}

impl ExecutionService for WorkerPool {
    fn try_submit(&self, job: Job) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        self.sender.try_send(job).is_ok()
    }

    fn is_full(&self) -> bool {
        self.shutdown.is_cancelled() || self.sender.capacity() == 0
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn worker_loop(
    id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    shutdown: CancellationToken,
    active: Arc<AtomicUsize>,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            job = async { receiver.lock().await.recv().await } => job,
        };
        let Some(job) = job else {
            break;
        };

        active.fetch_add(1, Ordering::Relaxed);
        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
            warn!(worker = id, "Fetch job panicked");
        }
        active.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::{oneshot, Notify};

    #[tokio::test]
    async fn test_jobs_run() {
        let pool = WorkerPool::start(WorkerPoolConfig {
            workers: 2,
            queue_capacity: 8,
        });
        let (tx, rx) = oneshot::channel();
        assert!(pool.try_submit(Box::pin(async move {
            let _ = tx.send(42);
        })));

        let value = tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value, 42);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_full_pool_refuses() {
        let pool = WorkerPool::start(WorkerPoolConfig {
            workers: 1,
            queue_capacity: 1,
        });
        let gate = Arc::new(Notify::new());
        let (started_tx, started_rx) = oneshot::channel();

        // Occupy the only worker.
        let blocker = Arc::clone(&gate);
        assert!(pool.try_submit(Box::pin(async move {
            let _ = started_tx.send(());
            blocker.notified().await;
        })));
        tokio::time::timeout(Duration::from_secs(5), started_rx)
            .await
            .unwrap()
            .unwrap();

        // Fill the single queue slot.
        assert!(pool.try_submit(Box::pin(async {})));
        assert!(pool.is_full());
        assert!(!pool.try_submit(Box::pin(async {})));
        assert_eq!(pool.queued_jobs(), 1);
        assert_eq!(pool.active_jobs(), 1);

        gate.notify_one();
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_kill_worker() {
        let pool = WorkerPool::start(WorkerPoolConfig {
            workers: 1,
            queue_capacity: 4,
        });
        assert!(pool.try_submit(Box::pin(async {
            panic!("boom");
        })));

        let (tx, rx) = oneshot::channel();
        assert!(pool.try_submit(Box::pin(async move {
            let _ = tx.send(());
        })));
        assert!(tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .unwrap()
            .is_ok());
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_refused() {
        let pool = WorkerPool::start(WorkerPoolConfig::default());
        pool.shutdown().await;

        assert!(pool.is_full());
        assert!(!pool.try_submit(Box::pin(async {})));
    }

    #[tokio::test]
    async fn test_zero_sizing_is_raised() {
        let pool = WorkerPool::start(WorkerPoolConfig {
            workers: 0,
            queue_capacity: 0,
        });
        assert_eq!(
            pool.config(),
            WorkerPoolConfig {
                workers: 1,
                queue_capacity: 1
            }
        );
        pool.shutdown().await;
    }
}
