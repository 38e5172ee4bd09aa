//! Per-frame driver for one tiled image layer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use super::frame::{Frame, ReferencePoint, RenderTile, TileSource};
use crate::cache::{AbsenceMarks, ResidencyCache, TileStore};
use crate::fetch::{ExecutionService, FetchContext, FetchQueue, FetchTask};
use crate::grid::{LevelSet, TileAddress};
use crate::lod::{LodSelector, Tile, VisibilityOracle};
use crate::telemetry::LayerMetrics;

/// A tiled image layer: selection, residency, and fetch scheduling.
///
/// `H` is the renderer's resource handle. Built with
/// [`TileLayerBuilder`](super::TileLayerBuilder).
pub struct TileLayer<H> {
    pub(super) name: String,
    pub(super) levels: Arc<LevelSet>,
    pub(super) cache: Arc<ResidencyCache<H>>,
    pub(super) absence: Arc<AbsenceMarks>,
    pub(super) queue: FetchQueue,
    pub(super) selector: LodSelector<H>,
    pub(super) context: Arc<FetchContext<H>>,
    pub(super) executor: Arc<dyn ExecutionService>,
    pub(super) metrics: Arc<LayerMetrics>,
    pub(super) frames: AtomicU64,
}

impl<H> TileLayer<H>
where
    H: Clone + Send + Sync + 'static,
{
    /// Select, resolve and schedule the tiles for one frame.
    ///
    /// Runs on the render thread and does not block on I/O, except for
    /// level-0 eager loads when enabled.
    pub fn render_frame(&self, oracle: &dyn VisibilityOracle) -> Frame<H> {
        let number = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        let reference_point = self.reference_point(oracle);

        let tiles: Vec<RenderTile<H>> = self
            .selector
            .assemble(oracle)
            .into_iter()
            .map(|tile| self.resolve_source(tile))
            .collect();

        let drained = self.queue.drain(self.executor.as_ref(), |request, guard| {
            FetchTask::new(Arc::clone(&self.context), request, guard).into_job()
        });

        let frame = Frame {
            number,
            reference_point,
            tiles,
            drained,
        };
        let stats = frame.stats();
        self.metrics.frame_rendered(
            stats.resident as u64,
            stats.fallback as u64,
            stats.missing as u64,
        );
        self.metrics
            .fetches_drained(drained.submitted as u64, drained.dropped as u64);

        debug!(
            layer = %self.name,
            frame = number,
            tiles = frame.tiles.len(),
            resident = stats.resident,
            fallback = stats.fallback,
            missing = stats.missing,
            submitted = drained.submitted,
            dropped = drained.dropped,
            "Frame rendered"
        );
        frame
    }

    /// Coverage centroid and the eye's distance to the coverage.
    pub fn reference_point(&self, oracle: &dyn VisibilityOracle) -> ReferencePoint {
        let coverage = self.levels.sector();
        ReferencePoint {
            location: coverage.centroid(),
            eye_distance: oracle.min_eye_distance(&coverage),
        }
    }

    fn resolve_source(&self, tile: Tile) -> RenderTile<H> {
        let own = if tile.resident {
            self.cache.get(&tile.address)
        } else {
            None
        };
        let source = match own {
            Some(handle) => TileSource::Resident(handle),
            None if tile.is_drawable() => self.fallback_source(&tile),
            None => TileSource::Missing,
        };
        RenderTile {
            address: tile.address,
            sector: tile.sector,
            source,
        }
    }

    /// Ancestor resource for a tile whose own resource is not in the cache.
    ///
    /// Worker inserts can evict between selection and this lookup. The
    /// selected fallback is tried first, then the nearest ancestor that is
    /// still resident.
    fn fallback_source(&self, tile: &Tile) -> TileSource<H> {
        let selected = tile.fallback.map(|f| f.address);
        let chain = std::iter::successors(tile.address.parent(), TileAddress::parent);
        for ancestor in selected.into_iter().chain(chain) {
            if let Some(handle) = self.cache.get(&ancestor) {
                return TileSource::Fallback {
                    ancestor,
                    ancestor_sector: self.levels.grid().sector_for(&ancestor),
                    handle,
                };
            }
        }
        TileSource::Missing
    }

    /// Forget every absence mark so missing tiles are requested again.
    pub fn reset_absence_marks(&self) {
        let count = self.absence.len();
        self.absence.clear();
        info!(layer = %self.name, cleared = count, "Absence marks reset");
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn levels(&self) -> &LevelSet {
        &self.levels
    }

    pub fn cache(&self) -> &ResidencyCache<H> {
        &self.cache
    }

    pub fn absence_marks(&self) -> &AbsenceMarks {
        &self.absence
    }

    pub fn store(&self) -> &TileStore {
        &self.context.store
    }

    pub fn queue(&self) -> &FetchQueue {
        &self.queue
    }

    pub fn metrics(&self) -> &Arc<LayerMetrics> {
        &self.metrics
    }

    /// Frames rendered so far.
    pub fn frame_count(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// True while fetches are queued or running.
    pub fn has_pending_fetches(&self) -> bool {
        !self.queue.is_empty() || self.queue.in_flight_count() > 0
    }
}
