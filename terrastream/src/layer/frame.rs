//! Per-frame output handed to the renderer.

use crate::fetch::DrainReport;
use crate::grid::{GeoPoint, Sector, TileAddress};

/// What to draw for one selected tile.
#[derive(Debug, Clone, PartialEq)]
pub enum TileSource<H> {
    /// The tile's own resource.
    Resident(H),
    /// An ancestor's resource, drawn over the tile's sector.
    Fallback {
        ancestor: TileAddress,
        ancestor_sector: Sector,
        handle: H,
    },
    /// Nothing resident yet; skip drawing this frame.
    Missing,
}

/// A selected tile with its resolved resource.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTile<H> {
    pub address: TileAddress,
    pub sector: Sector,
    pub source: TileSource<H>,
}

impl<H> RenderTile<H> {
    /// Resource handle to draw, own or fallback.
    pub fn handle(&self) -> Option<&H> {
        match &self.source {
            TileSource::Resident(handle) | TileSource::Fallback { handle, .. } => Some(handle),
            TileSource::Missing => None,
        }
    }
}

/// Where the layer sits relative to the viewer, for ordering layers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferencePoint {
    /// Centre of the covered sector.
    pub location: GeoPoint,
    /// Minimum eye distance to the covered sector.
    pub eye_distance: f64,
}

/// Result of one [`TileLayer::render_frame`](super::TileLayer::render_frame).
#[derive(Debug, Clone)]
pub struct Frame<H> {
    /// Frame counter, starting at 1.
    pub number: u64,
    pub reference_point: ReferencePoint,
    pub tiles: Vec<RenderTile<H>>,
    pub drained: DrainReport,
}

/// Tile counts by source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub resident: usize,
    pub fallback: usize,
    pub missing: usize,
    /// Deepest level among selected tiles.
    pub max_level: u8,
}

impl<H> Frame<H> {
    pub fn stats(&self) -> FrameStats {
        let mut stats = FrameStats::default();
        for tile in &self.tiles {
            match tile.source {
                TileSource::Resident(_) => stats.resident += 1,
                TileSource::Fallback { .. } => stats.fallback += 1,
                TileSource::Missing => stats.missing += 1,
            }
            stats.max_level = stats.max_level.max(tile.address.level);
        }
        stats
    }

    /// Tiles that have something to draw.
    pub fn drawable(&self) -> impl Iterator<Item = &RenderTile<H>> {
        self.tiles
            .iter()
            .filter(|t| !matches!(t.source, TileSource::Missing))
    }
}
