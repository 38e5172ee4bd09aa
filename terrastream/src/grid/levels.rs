//! Level set: the configured resolution tiers of a tile pyramid.
//!
//! A [`LevelSet`] is built once from a [`LevelSetConfig`] and validated up
//! front, so the per-frame arithmetic in [`TileGrid`](super::TileGrid) never
//! has to deal with degenerate input.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

use super::types::{GeoPoint, Sector, TileAddress};
use super::TileGrid;

/// Deepest pyramid supported. Grids with more than one level-0 row or column
/// are further limited by the `i32` index range of their finest level.
pub const MAX_LEVEL_COUNT: u8 = 30;

/// Upper bound on the number of level-0 tiles over the covered sector.
pub const MAX_TOP_LEVEL_TILES: u64 = 1 << 16;

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 512;

/// Errors detected while building a [`LevelSet`].
#[derive(Debug, Error, PartialEq)]
pub enum LevelSetError {
    #[error("level set must contain at least one level")]
    NoLevels,

    #[error("level count {0} exceeds the maximum of 30")]
    TooManyLevels(u8),

    #[error("level-zero tile delta must be finite and positive, got {0}")]
    InvalidLevelZeroDelta(f64),

    #[error("covered sector {0} is degenerate")]
    DegenerateSector(Sector),

    #[error("tile size must be positive")]
    InvalidTileSize,

    #[error("level {level} is declared empty but only {count} levels are configured")]
    EmptyLevelOutOfRange { level: u8, count: u8 },

    #[error("covered sector spans {count} level-0 tiles, more than the maximum of 65536")]
    TooManyTopLevelTiles { count: u64 },

    #[error("tile indices at level {level} exceed the 32-bit range")]
    IndexOverflow { level: u8 },
}

/// Raw level-set parameters, as read from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelSetConfig {
    /// Number of levels in the pyramid.
    pub level_count: u8,
    /// Tile extent at level 0, in degrees (both latitude and longitude).
    pub level_zero_delta: f64,
    /// Grid origin that row/column 0 are measured from.
    pub tile_origin: GeoPoint,
    /// Geographic extent the pyramid covers.
    pub sector: Sector,
    /// Tile edge length in pixels.
    pub tile_size: u32,
    /// Levels that hold no data at all.
    pub empty_levels: Vec<u8>,
    /// Expiry applied to levels without an explicit override. `None` never expires.
    pub default_expiry: Option<Duration>,
    /// Per-level expiry overrides.
    pub level_expiry: BTreeMap<u8, Duration>,
}

impl Default for LevelSetConfig {
    fn default() -> Self {
        Self {
            level_count: 5,
            level_zero_delta: 36.0,
            tile_origin: GeoPoint::new(-90.0, -180.0),
            sector: Sector::FULL_SPHERE,
            tile_size: DEFAULT_TILE_SIZE,
            empty_levels: Vec::new(),
            default_expiry: None,
            level_expiry: BTreeMap::new(),
        }
    }
}

/// One resolution tier of the pyramid.
#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    index: u8,
    tile_delta: f64,
    texel_size: f64,
    expiry: Option<Duration>,
    empty: bool,
}

impl Level {
    pub fn index(&self) -> u8 {
        self.index
    }

    /// Tile extent at this level, in degrees.
    pub fn tile_delta(&self) -> f64 {
        self.tile_delta
    }

    /// Angular size of one texel, in radians.
    pub fn texel_size(&self) -> f64 {
        self.texel_size
    }

    /// How long a persisted tile of this level stays fresh. `None` never expires.
    pub fn expiry(&self) -> Option<Duration> {
        self.expiry
    }

    /// True if the level is declared to hold no data.
    pub fn is_empty(&self) -> bool {
        self.empty
    }
}

/// Validated, ordered sequence of pyramid levels.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelSet {
    levels: Vec<Level>,
    sector: Sector,
    grid: TileGrid,
    tile_size: u32,
}

impl LevelSet {
    /// Build and validate a level set.
    pub fn new(config: &LevelSetConfig) -> Result<Self, LevelSetError> {
        if config.level_count == 0 {
            return Err(LevelSetError::NoLevels);
        }
        if config.level_count > MAX_LEVEL_COUNT {
            return Err(LevelSetError::TooManyLevels(config.level_count));
        }
        let delta = config.level_zero_delta;
        if !delta.is_finite() || delta <= 0.0 {
            return Err(LevelSetError::InvalidLevelZeroDelta(delta));
        }
        if config.sector.is_degenerate() {
            return Err(LevelSetError::DegenerateSector(config.sector));
        }
        if config.tile_size == 0 {
            return Err(LevelSetError::InvalidTileSize);
        }
        if let Some(&level) = config
            .empty_levels
            .iter()
            .find(|&&l| l >= config.level_count)
        {
            return Err(LevelSetError::EmptyLevelOutOfRange {
                level,
                count: config.level_count,
            });
        }

        let grid = TileGrid::new(config.tile_origin, delta);
        check_index_range(&grid, &config.sector, config.level_count)?;

        let levels = (0..config.level_count)
            .map(|index| {
                let tile_delta = grid.tile_delta(index);
                let expiry = config
                    .level_expiry
                    .get(&index)
                    .copied()
                    .or(config.default_expiry)
                    .filter(|d| !d.is_zero());
                Level {
                    index,
                    tile_delta,
                    texel_size: tile_delta.to_radians() / f64::from(config.tile_size),
                    expiry,
                    empty: config.empty_levels.contains(&index),
                }
            })
            .collect();

        Ok(Self {
            levels,
            sector: config.sector,
            grid,
            tile_size: config.tile_size,
        })
    }

    pub fn level_count(&self) -> u8 {
        self.levels.len() as u8
    }

    /// Index of the finest level.
    pub fn last_level(&self) -> u8 {
        self.level_count() - 1
    }

    pub fn is_final_level(&self, level: u8) -> bool {
        level >= self.last_level()
    }

    pub fn level(&self, index: u8) -> Option<&Level> {
        self.levels.get(usize::from(index))
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// Geographic extent covered by the pyramid.
    pub fn sector(&self) -> Sector {
        self.sector
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Level-0 tiles that intersect the covered sector, row-major from the south-west.
    pub fn top_level_tiles(&self) -> Vec<TileAddress> {
        self.grid.tiles_covering(&self.sector, 0)
    }

    /// Expiry for the level of `address`. Unknown levels never expire.
    pub fn expiry_for(&self, address: &TileAddress) -> Option<Duration> {
        self.level(address.level).and_then(Level::expiry)
    }

    /// True if the level of `address` is declared empty.
    pub fn is_level_empty(&self, level: u8) -> bool {
        self.level(level).map(Level::is_empty).unwrap_or(true)
    }
}

/// Reject grids whose level-0 tile count or finest-level indices are out of range.
///
/// Descent stays inside the level-0 tiles covering the sector, so the finest
/// level's indices are bounded by that block scaled by `2^(level_count - 1)`.
fn check_index_range(
    grid: &TileGrid,
    sector: &Sector,
    level_count: u8,
) -> Result<(), LevelSetError> {
    let origin = grid.origin();
    let delta = grid.tile_delta(0);
    let (first_row, last_row) = index_span(sector.min_lat, sector.max_lat, origin.lat, delta);
    let (first_col, last_col) = index_span(sector.min_lon, sector.max_lon, origin.lon, delta);

    let count = (last_row - first_row + 1.0) * (last_col - first_col + 1.0);
    if !count.is_finite() || count > MAX_TOP_LEVEL_TILES as f64 {
        // Float-to-int casts saturate, so an overflowing count reports u64::MAX.
        return Err(LevelSetError::TooManyTopLevelTiles { count: count as u64 });
    }

    let last_level = level_count - 1;
    let scale = f64::from(1u32 << last_level);
    let lowest = first_row.min(first_col) * scale;
    let highest = (last_row.max(last_col) + 1.0) * scale - 1.0;
    if lowest < f64::from(i32::MIN) || highest > f64::from(i32::MAX) {
        return Err(LevelSetError::IndexOverflow { level: last_level });
    }
    Ok(())
}

/// First and last level-0 index covering `[min, max]` along one axis.
fn index_span(min: f64, max: f64, origin: f64, delta: f64) -> (f64, f64) {
    let first = ((min - origin) / delta).floor();
    let last = (((max - origin) / delta).ceil() - 1.0).max(first);
    (first, last)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn four_tile_config() -> LevelSetConfig {
        LevelSetConfig {
            level_count: 3,
            level_zero_delta: 1.0,
            tile_origin: GeoPoint::new(0.0, 0.0),
            sector: Sector::new(0.0, 2.0, 0.0, 2.0),
            ..LevelSetConfig::default()
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let levels = LevelSet::new(&LevelSetConfig::default()).unwrap();
        assert_eq!(levels.level_count(), 5);
        assert_eq!(levels.top_level_tiles().len(), 5 * 10);
    }

    #[test]
    fn test_tile_delta_halves_per_level() {
        let levels = LevelSet::new(&four_tile_config()).unwrap();
        let deltas: Vec<f64> = levels.levels().iter().map(Level::tile_delta).collect();
        assert_eq!(deltas, vec![1.0, 0.5, 0.25]);
    }

    #[test]
    fn test_texel_size_uses_tile_size() {
        let mut config = four_tile_config();
        config.tile_size = 256;
        let levels = LevelSet::new(&config).unwrap();
        let expected = 1.0_f64.to_radians() / 256.0;
        assert!((levels.level(0).unwrap().texel_size() - expected).abs() < 1e-15);
    }

    #[test]
    fn test_top_level_tiles_cover_sector() {
        let levels = LevelSet::new(&four_tile_config()).unwrap();
        assert_eq!(
            levels.top_level_tiles(),
            vec![
                TileAddress::new(0, 0, 0),
                TileAddress::new(0, 0, 1),
                TileAddress::new(0, 1, 0),
                TileAddress::new(0, 1, 1),
            ]
        );
    }

    #[test]
    fn test_final_level() {
        let levels = LevelSet::new(&four_tile_config()).unwrap();
        assert_eq!(levels.last_level(), 2);
        assert!(!levels.is_final_level(1));
        assert!(levels.is_final_level(2));
    }

    #[test]
    fn test_zero_levels_rejected() {
        let mut config = four_tile_config();
        config.level_count = 0;
        assert_eq!(LevelSet::new(&config), Err(LevelSetError::NoLevels));
    }

    #[test]
    fn test_too_many_levels_rejected() {
        let mut config = four_tile_config();
        config.level_count = MAX_LEVEL_COUNT + 1;
        assert!(matches!(
            LevelSet::new(&config),
            Err(LevelSetError::TooManyLevels(_))
        ));
    }

    #[test]
    fn test_zero_delta_rejected() {
        let mut config = four_tile_config();
        config.level_zero_delta = 0.0;
        assert_eq!(
            LevelSet::new(&config),
            Err(LevelSetError::InvalidLevelZeroDelta(0.0))
        );

        config.level_zero_delta = f64::NAN;
        assert!(matches!(
            LevelSet::new(&config),
            Err(LevelSetError::InvalidLevelZeroDelta(_))
        ));
    }

    #[test]
    fn test_degenerate_sector_rejected() {
        let mut config = four_tile_config();
        config.sector = Sector::new(1.0, 1.0, 0.0, 2.0);
        assert!(matches!(
            LevelSet::new(&config),
            Err(LevelSetError::DegenerateSector(_))
        ));
    }

    #[test]
    fn test_zero_tile_size_rejected() {
        let mut config = four_tile_config();
        config.tile_size = 0;
        assert_eq!(LevelSet::new(&config), Err(LevelSetError::InvalidTileSize));
    }

    #[test]
    fn test_empty_level_out_of_range_rejected() {
        let mut config = four_tile_config();
        config.empty_levels = vec![3];
        assert_eq!(
            LevelSet::new(&config),
            Err(LevelSetError::EmptyLevelOutOfRange { level: 3, count: 3 })
        );
    }

    #[test]
    fn test_deep_pyramid_over_wide_grid_rejected() {
        // Five level-0 rows and ten columns: level 29 would need column 10 * 2^29 - 1.
        let config = LevelSetConfig {
            level_count: MAX_LEVEL_COUNT,
            ..LevelSetConfig::default()
        };
        assert_eq!(
            LevelSet::new(&config),
            Err(LevelSetError::IndexOverflow { level: 29 })
        );

        let config = LevelSetConfig {
            level_count: 28,
            ..LevelSetConfig::default()
        };
        assert!(LevelSet::new(&config).is_ok());
    }

    #[test]
    fn test_max_levels_accepted_on_small_grid() {
        let mut config = four_tile_config();
        config.level_count = MAX_LEVEL_COUNT;
        assert!(LevelSet::new(&config).is_ok());
    }

    #[test]
    fn test_sector_far_from_origin_overflows() {
        let mut config = four_tile_config();
        config.level_count = 10;
        config.tile_origin = GeoPoint::new(-1.0e7, 0.0);
        assert_eq!(
            LevelSet::new(&config),
            Err(LevelSetError::IndexOverflow { level: 9 })
        );
    }

    #[test]
    fn test_tiny_level_zero_delta_rejected() {
        let config = LevelSetConfig {
            level_zero_delta: 1e-4,
            ..LevelSetConfig::default()
        };
        assert!(matches!(
            LevelSet::new(&config),
            Err(LevelSetError::TooManyTopLevelTiles { .. })
        ));

        // 360 x 720 half-degree tiles is over the limit; 18 x 36 is not.
        let config = LevelSetConfig {
            level_zero_delta: 0.5,
            ..LevelSetConfig::default()
        };
        assert_eq!(
            LevelSet::new(&config),
            Err(LevelSetError::TooManyTopLevelTiles { count: 259_200 })
        );
        let config = LevelSetConfig {
            level_zero_delta: 10.0,
            ..LevelSetConfig::default()
        };
        assert_eq!(LevelSet::new(&config).unwrap().top_level_tiles().len(), 18 * 36);
    }

    #[test]
    fn test_expiry_overrides_and_zero_means_never() {
        let mut config = four_tile_config();
        config.default_expiry = Some(Duration::from_secs(3600));
        config.level_expiry.insert(1, Duration::from_secs(60));
        config.level_expiry.insert(2, Duration::ZERO);
        let levels = LevelSet::new(&config).unwrap();

        assert_eq!(
            levels.expiry_for(&TileAddress::new(0, 0, 0)),
            Some(Duration::from_secs(3600))
        );
        assert_eq!(
            levels.expiry_for(&TileAddress::new(1, 0, 0)),
            Some(Duration::from_secs(60))
        );
        assert_eq!(levels.expiry_for(&TileAddress::new(2, 0, 0)), None);
    }

    #[test]
    fn test_empty_levels() {
        let mut config = four_tile_config();
        config.empty_levels = vec![1];
        let levels = LevelSet::new(&config).unwrap();
        assert!(!levels.is_level_empty(0));
        assert!(levels.is_level_empty(1));
        assert!(!levels.is_level_empty(2));
    }
}
