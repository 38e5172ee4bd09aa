//! Recursive quadtree descent that assembles the per-frame tile list.
//!
//! Starting from the level-0 tiles covering the level set, each visible tile
//! is either accepted (it meets the resolution criteria or sits on the final
//! level) or split into its four children. While descending, the deepest
//! resident tile seen so far is carried down as the fallback candidate for
//! tiles whose own resource is not yet resident.
//!
//! ```text
//! descend(T, ancestor)
//!   ├─ meets criteria ──► resolve(T, ancestor) ──► result
//!   └─ otherwise
//!        ├─ T resident or level 0 ──► ancestor = T
//!        ├─ else ──► request fetch of T
//!        └─ descend(child, ancestor) for each visible child
//! ```
//!
//! Selection never blocks on I/O, except for level-0 eager loads from the
//! persistent store when that policy is enabled.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::trace;

use super::oracle::VisibilityOracle;
use super::tile::{Tile, TileRef};
use crate::cache::{AbsenceMarks, ResidencyCache};
use crate::fetch::{FetchContext, FetchQueue, LocalLoad};
use crate::grid::{LevelSet, Sector, TileAddress};
use crate::telemetry::LayerMetrics;

/// Default split scale: subdivide until a texel is roughly 1/8 of the eye distance.
pub const DEFAULT_SPLIT_SCALE: f64 = 0.9;

/// Level-of-detail tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LodConfig {
    /// Log-distance margin required before a tile is subdivided.
    /// Larger values yield coarser tiles.
    pub split_scale: f64,
    /// Load missing level-0 resources synchronously from the persistent store
    /// so there is always a fallback to draw.
    pub force_level_zero_loads: bool,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            split_scale: DEFAULT_SPLIT_SCALE,
            force_level_zero_loads: false,
        }
    }
}

/// Mutable state of one walk over the quadtree.
struct Walk {
    tiles: Vec<Tile>,
    // Level-0 addresses whose eager load already failed this frame.
    eager_failed: HashSet<TileAddress>,
}

/// Selects the tiles to draw for a viewer.
pub struct LodSelector<H> {
    config: LodConfig,
    levels: Arc<LevelSet>,
    cache: Arc<ResidencyCache<H>>,
    absence: Arc<AbsenceMarks>,
    queue: FetchQueue,
    metrics: Option<Arc<LayerMetrics>>,
    loader: Option<Arc<FetchContext<H>>>,
}

impl<H> LodSelector<H>
where
    H: Clone + Send + Sync + 'static,
{
    pub fn new(
        config: LodConfig,
        levels: Arc<LevelSet>,
        cache: Arc<ResidencyCache<H>>,
        absence: Arc<AbsenceMarks>,
        queue: FetchQueue,
    ) -> Self {
        Self {
            config,
            levels,
            cache,
            absence,
            queue,
            metrics: None,
            loader: None,
        }
    }

    /// Count queued and deduplicated requests in `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<LayerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Use `loader` for level-0 eager loads.
    pub fn with_loader(mut self, loader: Arc<FetchContext<H>>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn config(&self) -> LodConfig {
        self.config
    }

    pub fn levels(&self) -> &LevelSet {
        &self.levels
    }

    /// Walk the quadtree and return the tiles to draw, in descent order.
    ///
    /// For a fixed cache state, absence set and oracle the result is
    /// identical on every call.
    pub fn assemble(&self, oracle: &dyn VisibilityOracle) -> Vec<Tile> {
        let mut walk = Walk {
            tiles: Vec::new(),
            eager_failed: HashSet::new(),
        };
        let coverage = self.levels.sector();
        for address in self.levels.top_level_tiles() {
            let sector = self.levels.grid().sector_for(&address);
            if sector.intersects(&coverage) && oracle.is_visible(&sector) {
                self.descend(oracle, address, sector, None, &mut walk);
            }
        }
        trace!(tiles = walk.tiles.len(), "Assembled tile list");
        walk.tiles
    }

    fn descend(
        &self,
        oracle: &dyn VisibilityOracle,
        address: TileAddress,
        sector: Sector,
        ancestor: Option<TileRef>,
        walk: &mut Walk,
    ) {
        let min_distance = oracle.min_eye_distance(&sector);
        if self.meets_criteria(oracle, address.level, &sector, min_distance) {
            let tile = self.resolve(address, sector, min_distance, ancestor, walk);
            walk.tiles.push(tile);
            return;
        }

        let mut next_ancestor = ancestor;
        if address.level == 0 || self.cache.is_resident(&address) {
            next_ancestor = Some(TileRef { address, sector });
        } else {
            self.request(address, min_distance);
        }

        let grid = self.levels.grid();
        let coverage = self.levels.sector();
        for child in grid.children(&address) {
            let child_sector = grid.sector_for(&child);
            if child_sector.intersects(&coverage) && oracle.is_visible(&child_sector) {
                self.descend(oracle, child, child_sector, next_ancestor, walk);
            }
        }
    }

    /// True if `sector` at `level` needs no further subdivision.
    pub fn meets_criteria(
        &self,
        oracle: &dyn VisibilityOracle,
        level: u8,
        sector: &Sector,
        min_distance: f64,
    ) -> bool {
        if self.levels.is_final_level(level) {
            return true;
        }
        let cell_size = oracle.cell_size(sector);
        cell_size.log10() <= min_distance.log10() - self.config.split_scale
    }

    fn resolve(
        &self,
        address: TileAddress,
        sector: Sector,
        priority: f64,
        ancestor: Option<TileRef>,
        walk: &mut Walk,
    ) -> Tile {
        let resident = self.cache.is_resident(&address)
            || (address.level == 0 && self.eager_load(&address, walk));
        if resident {
            return Tile {
                address,
                sector,
                priority,
                resident: true,
                fallback: None,
            };
        }

        let fallback = ancestor.filter(|a| self.ancestor_available(a, priority, walk));
        debug_assert!(fallback.map_or(true, |a| a.address.is_ancestor_of(&address)));
        self.request(address, priority);

        Tile {
            address,
            sector,
            priority,
            resident: false,
            fallback,
        }
    }

    /// True if the ancestor can supply a resource right now.
    ///
    /// A missing level-0 ancestor is either loaded eagerly or requested, so
    /// later frames have a fallback to draw.
    fn ancestor_available(&self, ancestor: &TileRef, priority: f64, walk: &mut Walk) -> bool {
        if self.cache.is_resident(&ancestor.address) {
            return true;
        }
        if ancestor.address.level != 0 {
            return false;
        }
        if self.eager_load(&ancestor.address, walk) {
            return true;
        }
        self.request(ancestor.address, priority);
        false
    }

    /// Synchronously load a level-0 resource from the persistent store.
    fn eager_load(&self, address: &TileAddress, walk: &mut Walk) -> bool {
        if !self.config.force_level_zero_loads || walk.eager_failed.contains(address) {
            return false;
        }
        let Some(loader) = &self.loader else {
            return false;
        };
        if self.absence.is_marked(address) {
            walk.eager_failed.insert(*address);
            return false;
        }
        match loader.load_local(address) {
            LocalLoad::Loaded(_) => {
                if let Some(metrics) = &self.metrics {
                    metrics.eager_load();
                }
                true
            }
            LocalLoad::Missing | LocalLoad::Expired | LocalLoad::Corrupt => {
                walk.eager_failed.insert(*address);
                false
            }
        }
    }

    /// Queue a fetch unless the tile is known absent or its level holds no data.
    fn request(&self, address: TileAddress, priority: f64) {
        if self.absence.is_marked(&address) || self.levels.is_level_empty(address.level) {
            return;
        }
        let queued = self.queue.submit(address, priority);
        if let Some(metrics) = &self.metrics {
            if queued {
                metrics.fetch_queued();
            } else {
                metrics.fetch_deduplicated();
            }
        }
    }
}
