//! Tile grid arithmetic.
//!
//! Maps between geographic positions, pyramid tile addresses and the sectors
//! those addresses cover. Everything here is pure arithmetic over a grid
//! origin and a level-zero tile delta; validation of those inputs happens when
//! the owning [`LevelSet`] is built.
//!
//! Rows grow northward and columns grow eastward from the origin:
//!
//! ```text
//!   row 1 | NW | NE |
//!   row 0 | SW | SE |
//!          col0 col1
//! ```

mod levels;
mod types;

pub use levels::{
    Level, LevelSet, LevelSetConfig, LevelSetError, DEFAULT_TILE_SIZE, MAX_LEVEL_COUNT,
    MAX_TOP_LEVEL_TILES,
};
pub use types::{GeoPoint, Sector, TileAddress};

/// Grid geometry shared by every level of a pyramid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileGrid {
    origin: GeoPoint,
    level_zero_delta: f64,
}

impl TileGrid {
    /// Create a grid from its origin and level-0 tile delta (degrees).
    pub fn new(origin: GeoPoint, level_zero_delta: f64) -> Self {
        Self {
            origin,
            level_zero_delta,
        }
    }

    pub fn origin(&self) -> GeoPoint {
        self.origin
    }

    /// Tile extent in degrees at `level`: `delta(0) / 2^level`.
    #[inline]
    pub fn tile_delta(&self, level: u8) -> f64 {
        self.level_zero_delta / f64::from(1u32 << level)
    }

    /// Address of the tile at `level` containing `point`.
    #[inline]
    pub fn tile_address_for(&self, point: GeoPoint, level: u8) -> TileAddress {
        let delta = self.tile_delta(level);
        TileAddress {
            level,
            row: ((point.lat - self.origin.lat) / delta).floor() as i32,
            col: ((point.lon - self.origin.lon) / delta).floor() as i32,
        }
    }

    /// Sector covered by `address`.
    #[inline]
    pub fn sector_for(&self, address: &TileAddress) -> Sector {
        let delta = self.tile_delta(address.level);
        let min_lat = self.origin.lat + f64::from(address.row) * delta;
        let min_lon = self.origin.lon + f64::from(address.col) * delta;
        Sector::new(min_lat, min_lat + delta, min_lon, min_lon + delta)
    }

    /// The four children of `address`, in SW, SE, NW, NE order.
    ///
    /// [`LevelSet::new`] rejects grids whose finest level would overflow `i32`.
    #[inline]
    pub fn children(&self, address: &TileAddress) -> [TileAddress; 4] {
        let level = address.level + 1;
        let row = address.row * 2;
        let col = address.col * 2;
        [
            TileAddress::new(level, row, col),
            TileAddress::new(level, row, col + 1),
            TileAddress::new(level, row + 1, col),
            TileAddress::new(level, row + 1, col + 1),
        ]
    }

    /// All tiles at `level` intersecting `sector`, row-major from the south-west.
    pub fn tiles_covering(&self, sector: &Sector, level: u8) -> Vec<TileAddress> {
        let delta = self.tile_delta(level);
        let first_row = ((sector.min_lat - self.origin.lat) / delta).floor() as i32;
        let first_col = ((sector.min_lon - self.origin.lon) / delta).floor() as i32;
        // A max edge lying exactly on a tile boundary belongs to the tile below it.
        let last_row = (((sector.max_lat - self.origin.lat) / delta).ceil() as i32 - 1).max(first_row);
        let last_col = (((sector.max_lon - self.origin.lon) / delta).ceil() as i32 - 1).max(first_col);

        let rows = (i64::from(last_row) - i64::from(first_row) + 1) as usize;
        let cols = (i64::from(last_col) - i64::from(first_col) + 1) as usize;
        let mut tiles = Vec::with_capacity(rows.saturating_mul(cols));
        for row in first_row..=last_row {
            for col in first_col..=last_col {
                tiles.push(TileAddress::new(level, row, col));
            }
        }
        tiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn unit_grid() -> TileGrid {
        TileGrid::new(GeoPoint::new(0.0, 0.0), 1.0)
    }

    #[test]
    fn test_tile_delta_halves() {
        let grid = TileGrid::new(GeoPoint::new(-90.0, -180.0), 36.0);
        assert_eq!(grid.tile_delta(0), 36.0);
        assert_eq!(grid.tile_delta(1), 18.0);
        assert_eq!(grid.tile_delta(3), 4.5);
    }

    #[test]
    fn test_tile_address_for_point() {
        let grid = TileGrid::new(GeoPoint::new(-90.0, -180.0), 36.0);
        // Paris: 48.85N 2.35E
        let address = grid.tile_address_for(GeoPoint::new(48.85, 2.35), 0);
        assert_eq!(address, TileAddress::new(0, 3, 5));

        let address = grid.tile_address_for(GeoPoint::new(48.85, 2.35), 2);
        assert_eq!(address, TileAddress::new(2, 15, 20));
    }

    #[test]
    fn test_tile_address_below_origin_is_negative() {
        let grid = unit_grid();
        let address = grid.tile_address_for(GeoPoint::new(-0.5, -1.5), 0);
        assert_eq!(address, TileAddress::new(0, -1, -2));
    }

    #[test]
    fn test_sector_for_address() {
        let grid = unit_grid();
        let sector = grid.sector_for(&TileAddress::new(1, 3, 2));
        assert_eq!(sector, Sector::new(1.5, 2.0, 1.0, 1.5));
    }

    #[test]
    fn test_children_order_is_sw_se_nw_ne() {
        let grid = unit_grid();
        let parent = TileAddress::new(0, 1, 1);
        let children = grid.children(&parent);
        assert_eq!(
            children,
            [
                TileAddress::new(1, 2, 2),
                TileAddress::new(1, 2, 3),
                TileAddress::new(1, 3, 2),
                TileAddress::new(1, 3, 3),
            ]
        );

        let parent_sector = grid.sector_for(&parent);
        let sw = grid.sector_for(&children[0]);
        let ne = grid.sector_for(&children[3]);
        assert_eq!(sw.min_lat, parent_sector.min_lat);
        assert_eq!(sw.min_lon, parent_sector.min_lon);
        assert_eq!(ne.max_lat, parent_sector.max_lat);
        assert_eq!(ne.max_lon, parent_sector.max_lon);
    }

    #[test]
    fn test_children_know_their_parent() {
        let grid = unit_grid();
        let parent = TileAddress::new(2, -3, 5);
        for child in grid.children(&parent) {
            assert_eq!(child.parent(), Some(parent));
            assert!(parent.is_ancestor_of(&child));
        }
        assert_eq!(TileAddress::new(0, 0, 0).parent(), None);
    }

    #[test]
    fn test_is_ancestor_of() {
        let root = TileAddress::new(0, 1, 0);
        assert!(root.is_ancestor_of(&TileAddress::new(2, 5, 3)));
        assert!(!root.is_ancestor_of(&TileAddress::new(2, 1, 3)));
        assert!(!root.is_ancestor_of(&root));
        assert!(!TileAddress::new(2, 5, 3).is_ancestor_of(&root));
    }

    #[test]
    fn test_tiles_covering_exact_boundaries() {
        let grid = unit_grid();
        let tiles = grid.tiles_covering(&Sector::new(0.0, 2.0, 0.0, 2.0), 0);
        assert_eq!(tiles.len(), 4);
        assert_eq!(tiles[0], TileAddress::new(0, 0, 0));
        assert_eq!(tiles[3], TileAddress::new(0, 1, 1));
    }

    #[test]
    fn test_tiles_covering_partial_tiles() {
        let grid = unit_grid();
        let tiles = grid.tiles_covering(&Sector::new(0.5, 1.5, 0.25, 0.75), 0);
        assert_eq!(
            tiles,
            vec![TileAddress::new(0, 0, 0), TileAddress::new(0, 1, 0)]
        );
    }

    proptest! {
        #[test]
        fn prop_point_lies_in_its_tile_sector(
            lat in -89.9f64..89.9,
            lon in -179.9f64..179.9,
            level in 0u8..12,
        ) {
            let grid = TileGrid::new(GeoPoint::new(-90.0, -180.0), 36.0);
            let point = GeoPoint::new(lat, lon);
            let address = grid.tile_address_for(point, level);
            let sector = grid.sector_for(&address);
            prop_assert!(lat >= sector.min_lat - 1e-9 && lat <= sector.max_lat + 1e-9);
            prop_assert!(lon >= sector.min_lon - 1e-9 && lon <= sector.max_lon + 1e-9);
        }

        #[test]
        fn prop_children_partition_parent(
            row in 0i32..1000,
            col in 0i32..1000,
            level in 0u8..10,
        ) {
            let grid = TileGrid::new(GeoPoint::new(-90.0, -180.0), 36.0);
            let parent = TileAddress::new(level, row, col);
            let parent_sector = grid.sector_for(&parent);
            let mut area = 0.0;
            for child in grid.children(&parent) {
                let s = grid.sector_for(&child);
                prop_assert!(parent_sector.intersects(&s));
                area += s.delta_lat() * s.delta_lon();
            }
            let parent_area = parent_sector.delta_lat() * parent_sector.delta_lon();
            prop_assert!((area - parent_area).abs() < 1e-9 * parent_area.max(1.0));
        }
    }
}
