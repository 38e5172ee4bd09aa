//! Per-frame tile records produced by the selector.

use crate::grid::{Sector, TileAddress};

/// Reference to an ancestor tile whose resource stands in for a descendant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileRef {
    pub address: TileAddress,
    pub sector: Sector,
}

/// One tile selected for drawing this frame.
///
/// Tiles are rebuilt on every walk of the quadtree; only addresses carry
/// across frames.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub address: TileAddress,
    pub sector: Sector,
    /// Minimum eye distance to the tile; lower is more urgent.
    pub priority: f64,
    /// True if the tile's own resource was resident when selected.
    pub resident: bool,
    /// Resident ancestor to draw while this tile's resource is absent.
    pub fallback: Option<TileRef>,
}

impl Tile {
    /// True if the tile has something to draw, its own resource or a fallback.
    pub fn is_drawable(&self) -> bool {
        self.resident || self.fallback.is_some()
    }
}
