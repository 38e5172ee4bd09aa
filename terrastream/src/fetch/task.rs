//! Fetch execution and post-processing.
//!
//! A fetch task resolves one tile address into a resident resource:
//!
//! ```text
//! local file? ──fresh──► decode ──ok──► insert ─────────────────────► StoreHit
//!     │                    └─err──► delete file, mark absent ───────► Absent(CorruptFile)
//!     ├─expired──► delete file ─┐
//!     └─missing─────────────────┤
//!                               ▼
//!                      ResourceFetcher::fetch
//!     ├─ diagnostic content type ──► mark absent ───────────────────► Absent(DiagnosticPayload)
//!     ├─ payload ──► transcode, decode ──► persist, insert, unmark ─► Fetched
//!     │                    └─err─────────────────────────────────────► Retryable(MalformedPayload)
//!     ├─ NotFound ──► mark absent ──────────────────────────────────► Absent(NotFound)
//!     └─ other error ───────────────────────────────────────────────► Retryable(..)
//! ```
//!
//! Every failure is absorbed here: the selector only ever observes
//! "resident or not" and "absence-marked or not".

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::pool::{BoxFuture, Job};
use super::queue::{CompletionGuard, PendingRequest};
use crate::cache::{AbsenceMarks, ResidencyCache, TileStore};
use crate::grid::{LevelSet, TileAddress};
use crate::telemetry::LayerMetrics;

/// Failure kinds reported by a [`ResourceFetcher`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The source definitively has no resource for the tile.
    #[error("resource not found")]
    NotFound,

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    /// The request was cut short, for example by shutdown.
    #[error("request interrupted")]
    Interrupted,
}

impl FetchError {
    /// True if retrying cannot succeed.
    pub fn is_definitive(&self) -> bool {
        matches!(self, FetchError::NotFound)
    }
}

/// Bytes returned by a fetcher with their declared content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPayload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl FetchedPayload {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
        }
    }

    /// True if the content type names an error or diagnostic document
    /// rather than tile data.
    pub fn is_diagnostic(&self) -> bool {
        let content_type = self.content_type.to_ascii_lowercase();
        ["xml", "html", "text"]
            .iter()
            .any(|marker| content_type.contains(marker))
    }
}

/// Retrieves raw tile bytes from a remote source.
pub trait ResourceFetcher: Send + Sync {
    /// Fetch `address` in the requested `format` (a MIME type).
    fn fetch(
        &self,
        address: TileAddress,
        format: &str,
    ) -> BoxFuture<'_, Result<FetchedPayload, FetchError>>;
}

/// Decoder failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed data: {0}")]
    Malformed(String),

    #[error("unsupported content type: {0}")]
    Unsupported(String),
}

/// A decoded resource and the bytes it occupies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded<H> {
    pub handle: H,
    pub size_bytes: u64,
}

/// Turns tile bytes into renderer handles.
///
/// Called from blocking worker threads, never from the render thread except
/// for level-0 eager loads.
pub trait Decoder<H>: Send + Sync {
    fn decode(&self, address: &TileAddress, bytes: &[u8]) -> Result<Decoded<H>, DecodeError>;

    /// Convert fetched bytes into the stored format. Identity by default.
    fn transcode(&self, bytes: Vec<u8>, _content_type: &str) -> Result<Vec<u8>, DecodeError> {
        Ok(bytes)
    }
}

/// Why a tile was marked absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsenceReason {
    NotFound,
    DiagnosticPayload,
    CorruptFile,
}

/// Why a fetch failed without marking the tile absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    Timeout,
    Transport,
    Interrupted,
    MalformedPayload,
    /// The blocking post-processing step panicked or was cancelled.
    Internal,
}

impl From<&FetchError> for RetryReason {
    fn from(error: &FetchError) -> Self {
        match error {
            FetchError::Timeout => RetryReason::Timeout,
            FetchError::Interrupted => RetryReason::Interrupted,
            FetchError::Transport(_) | FetchError::NotFound => RetryReason::Transport,
        }
    }
}

/// Final state of one fetch task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Loaded from the persistent store.
    StoreHit,
    /// Fetched, persisted and made resident.
    Fetched,
    /// Marked absent; the selector stops requesting it.
    Absent(AbsenceReason),
    /// Left unmarked so a later frame can request it again.
    Retryable(RetryReason),
}

/// Result of looking for a tile in the persistent store.
pub(crate) enum LocalLoad<H> {
    Loaded(H),
    Missing,
    Expired,
    Corrupt,
}

/// Everything a fetch task needs, shared by all tasks of one layer.
pub struct FetchContext<H> {
    pub(crate) levels: Arc<LevelSet>,
    pub(crate) store: TileStore,
    pub(crate) cache: Arc<ResidencyCache<H>>,
    pub(crate) absence: Arc<AbsenceMarks>,
    pub(crate) fetcher: Arc<dyn ResourceFetcher>,
    pub(crate) decoder: Arc<dyn Decoder<H>>,
    pub(crate) metrics: Arc<LayerMetrics>,
    pub(crate) format: String,
}

impl<H> FetchContext<H>
where
    H: Clone + Send + Sync + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        levels: Arc<LevelSet>,
        store: TileStore,
        cache: Arc<ResidencyCache<H>>,
        absence: Arc<AbsenceMarks>,
        fetcher: Arc<dyn ResourceFetcher>,
        decoder: Arc<dyn Decoder<H>>,
        metrics: Arc<LayerMetrics>,
        format: impl Into<String>,
    ) -> Self {
        Self {
            levels,
            store,
            cache,
            absence,
            fetcher,
            decoder,
            metrics,
            format: format.into(),
        }
    }

    /// Load `address` from the persistent store into the residency cache.
    ///
    /// Blocking. Expired files are deleted; undecodable or unreadable files are
    /// deleted and the address is marked absent.
    pub(crate) fn load_local(&self, address: &TileAddress) -> LocalLoad<H> {
        if !self.store.exists(address) {
            return LocalLoad::Missing;
        }

        if self
            .store
            .is_expired(address, self.levels.expiry_for(address))
        {
            debug!(tile = %address, "Persisted tile expired");
            self.metrics.expired_file();
            if let Err(e) = self.store.delete(address) {
                warn!(tile = %address, error = %e, "Failed to delete expired tile");
            }
            return LocalLoad::Expired;
        }

        let bytes = match self.store.read(address) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return LocalLoad::Missing,
            Err(e) => {
                warn!(tile = %address, error = %e, "Failed to read persisted tile");
                self.discard_corrupt(address);
                return LocalLoad::Corrupt;
            }
        };

        match self.decoder.decode(address, &bytes) {
            Ok(decoded) => {
                let handle = decoded.handle.clone();
                self.make_resident(*address, decoded);
                LocalLoad::Loaded(handle)
            }
            Err(e) => {
                warn!(tile = %address, error = %e, "Persisted tile is corrupt");
                self.discard_corrupt(address);
                LocalLoad::Corrupt
            }
        }
    }

    fn discard_corrupt(&self, address: &TileAddress) {
        self.metrics.corrupt_file();
        if let Err(e) = self.store.delete(address) {
            warn!(tile = %address, error = %e, "Failed to delete corrupt tile");
        }
        self.mark_absent(*address);
    }

    fn mark_absent(&self, address: TileAddress) {
        if self.absence.mark(address) {
            self.metrics.absence_marked();
        }
    }

    fn make_resident(&self, address: TileAddress, decoded: Decoded<H>) {
        let evicted = self
            .cache
            .insert(address, decoded.handle, decoded.size_bytes);
        if evicted > 0 {
            self.metrics.evicted(evicted as u64);
        }
    }

    /// Transcode, decode, persist and insert a fetched payload. Blocking.
    fn accept_payload(&self, address: TileAddress, payload: FetchedPayload) -> FetchOutcome {
        let fetched_bytes = payload.bytes.len() as u64;
        let bytes = match self
            .decoder
            .transcode(payload.bytes, &payload.content_type)
        {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(tile = %address, error = %e, "Failed to transcode fetched tile");
                return FetchOutcome::Retryable(RetryReason::MalformedPayload);
            }
        };

        let decoded = match self.decoder.decode(&address, &bytes) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(tile = %address, error = %e, "Fetched tile is malformed");
                return FetchOutcome::Retryable(RetryReason::MalformedPayload);
            }
        };

        if let Err(e) = self.store.write(&address, &bytes) {
            warn!(tile = %address, error = %e, "Failed to persist fetched tile");
        }
        self.make_resident(address, decoded);
        if self.absence.unmark(&address) {
            info!(tile = %address, "Tile available again, absence mark cleared");
        }
        self.metrics.fetch_succeeded(fetched_bytes);
        FetchOutcome::Fetched
    }
}

/// One scheduled fetch, holding its in-flight slot until dropped.
pub struct FetchTask<H> {
    context: Arc<FetchContext<H>>,
    request: PendingRequest,
    guard: CompletionGuard,
}

impl<H> FetchTask<H>
where
    H: Clone + Send + Sync + 'static,
{
    pub fn new(
        context: Arc<FetchContext<H>>,
        request: PendingRequest,
        guard: CompletionGuard,
    ) -> Self {
        debug_assert_eq!(request.address, guard.address());
        Self {
            context,
            request,
            guard,
        }
    }

    pub fn address(&self) -> TileAddress {
        self.request.address
    }

    /// Run the task to completion, then release the in-flight slot.
    pub async fn run(self) -> FetchOutcome {
        let Self {
            context,
            request,
            guard,
        } = self;
        let address = request.address;

        context.metrics.fetch_started();
        let outcome = resolve(&context, address).await;
        context.metrics.fetch_finished();

        match outcome {
            FetchOutcome::Retryable(reason) => {
                context.metrics.transient_failure();
                debug!(tile = %address, ?reason, "Fetch left eligible for retry");
            }
            _ => debug!(tile = %address, ?outcome, "Fetch finished"),
        }
        drop(guard);
        outcome
    }

    /// Box the task for an [`ExecutionService`](super::ExecutionService).
    pub fn into_job(self) -> Job {
        Box::pin(async move {
            self.run().await;
        })
    }
}

async fn resolve<H>(context: &Arc<FetchContext<H>>, address: TileAddress) -> FetchOutcome
where
    H: Clone + Send + Sync + 'static,
{
    let local = {
        let context = Arc::clone(context);
        tokio::task::spawn_blocking(move || context.load_local(&address)).await
    };
    match local {
        Ok(LocalLoad::Loaded(_)) => {
            context.metrics.store_hit();
            return FetchOutcome::StoreHit;
        }
        Ok(LocalLoad::Corrupt) => return FetchOutcome::Absent(AbsenceReason::CorruptFile),
        Ok(LocalLoad::Missing) | Ok(LocalLoad::Expired) => {}
        Err(e) => {
            warn!(tile = %address, error = %e, "Local load task failed");
            return FetchOutcome::Retryable(RetryReason::Internal);
        }
    }

    let payload = match context.fetcher.fetch(address, &context.format).await {
        Ok(payload) => payload,
        Err(FetchError::NotFound) => {
            info!(tile = %address, "Tile not found at source, marking absent");
            context.mark_absent(address);
            return FetchOutcome::Absent(AbsenceReason::NotFound);
        }
        Err(e) => {
            warn!(tile = %address, error = %e, "Tile fetch failed");
            return FetchOutcome::Retryable(RetryReason::from(&e));
        }
    };

    if payload.is_diagnostic() {
        info!(
            tile = %address,
            content_type = %payload.content_type,
            "Source returned a diagnostic payload, marking absent"
        );
        context.mark_absent(address);
        return FetchOutcome::Absent(AbsenceReason::DiagnosticPayload);
    }

    let accepted = {
        let context = Arc::clone(context);
        tokio::task::spawn_blocking(move || context.accept_payload(address, payload)).await
    };
    accepted.unwrap_or_else(|e| {
        warn!(tile = %address, error = %e, "Payload processing task failed");
        FetchOutcome::Retryable(RetryReason::Internal)
    })
}
