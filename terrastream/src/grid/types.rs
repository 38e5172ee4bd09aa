//! Tile address and geographic extent types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GeoPoint {
    /// Latitude in degrees, positive north
    pub lat: f64,
    /// Longitude in degrees, positive east
    pub lon: f64,
}

impl GeoPoint {
    /// Create a point from latitude and longitude in degrees.
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}

/// Address of one cell of the quadtree pyramid.
///
/// Rows grow northward from the tile origin and columns grow eastward.
/// Ordering is lexicographic over `(level, row, col)`, which the fetch queue
/// uses to break priority ties.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TileAddress {
    /// Pyramid level, 0 is the coarsest
    pub level: u8,
    /// Row index (latitude direction)
    pub row: i32,
    /// Column index (longitude direction)
    pub col: i32,
}

impl TileAddress {
    /// Create a new tile address.
    pub const fn new(level: u8, row: i32, col: i32) -> Self {
        Self { level, row, col }
    }

    /// Returns the address of the tile one level up that contains this one.
    ///
    /// Level-0 tiles have no parent.
    pub fn parent(&self) -> Option<TileAddress> {
        if self.level == 0 {
            return None;
        }
        Some(TileAddress {
            level: self.level - 1,
            row: self.row.div_euclid(2),
            col: self.col.div_euclid(2),
        })
    }

    /// Returns true if `self` is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &TileAddress) -> bool {
        if self.level >= other.level {
            return false;
        }
        let shift = u32::from(other.level - self.level);
        other.row >> shift == self.row && other.col >> shift == self.col
    }
}

impl fmt::Display for TileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.level, self.row, self.col)
    }
}

/// An axis-aligned geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sector {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Sector {
    /// The whole globe.
    pub const FULL_SPHERE: Sector = Sector {
        min_lat: -90.0,
        max_lat: 90.0,
        min_lon: -180.0,
        max_lon: 180.0,
    };

    /// Create a sector from its bounds in degrees.
    pub const fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    /// Latitude extent in degrees.
    pub fn delta_lat(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Longitude extent in degrees.
    pub fn delta_lon(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// Latitude extent in radians.
    pub fn delta_lat_radians(&self) -> f64 {
        self.delta_lat().to_radians()
    }

    /// True when the sector has no area or is not finite.
    pub fn is_degenerate(&self) -> bool {
        let finite = [self.min_lat, self.max_lat, self.min_lon, self.max_lon]
            .iter()
            .all(|v| v.is_finite());
        !finite || self.delta_lat() <= 0.0 || self.delta_lon() <= 0.0
    }

    /// Geometric center of the sector.
    pub fn centroid(&self) -> GeoPoint {
        GeoPoint::new(
            (self.min_lat + self.max_lat) * 0.5,
            (self.min_lon + self.max_lon) * 0.5,
        )
    }

    /// Corners in SW, SE, NE, NW order.
    pub fn corners(&self) -> [GeoPoint; 4] {
        [
            GeoPoint::new(self.min_lat, self.min_lon),
            GeoPoint::new(self.min_lat, self.max_lon),
            GeoPoint::new(self.max_lat, self.max_lon),
            GeoPoint::new(self.max_lat, self.min_lon),
        ]
    }

    /// True if `point` lies inside the sector (edges inclusive).
    pub fn contains(&self, point: GeoPoint) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.lat)
            && (self.min_lon..=self.max_lon).contains(&point.lon)
    }

    /// True if the two sectors overlap with non-zero area.
    pub fn intersects(&self, other: &Sector) -> bool {
        self.min_lat < other.max_lat
            && other.min_lat < self.max_lat
            && self.min_lon < other.max_lon
            && other.min_lon < self.max_lon
    }

    /// Overlapping region of two sectors, if any.
    pub fn intersection(&self, other: &Sector) -> Option<Sector> {
        if !self.intersects(other) {
            return None;
        }
        Some(Sector {
            min_lat: self.min_lat.max(other.min_lat),
            max_lat: self.max_lat.min(other.max_lat),
            min_lon: self.min_lon.max(other.min_lon),
            max_lon: self.max_lon.min(other.max_lon),
        })
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.4}, {:.4}] x [{:.4}, {:.4}]",
            self.min_lat, self.max_lat, self.min_lon, self.max_lon
        )
    }
}
