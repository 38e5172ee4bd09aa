//! Visibility and error-metric inputs to tile selection.

use crate::grid::{GeoPoint, Sector};

/// Mean Earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Geometry queries the selector needs from the camera.
///
/// All three are total functions of the sector.
pub trait VisibilityOracle {
    /// True if any part of `sector` can be seen.
    fn is_visible(&self, sector: &Sector) -> bool;

    /// Shortest distance from the eye to the sector's corners and centre.
    fn min_eye_distance(&self, sector: &Sector) -> f64;

    /// Ground size of one texel of a tile covering `sector`, in the same unit
    /// as [`min_eye_distance`](Self::min_eye_distance).
    fn cell_size(&self, sector: &Sector) -> f64;
}

/// Oracle for an eye above a spherical Earth.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerOracle {
    eye: GeoPoint,
    altitude: f64,
    visible: Option<Sector>,
    tile_size: u32,
    radius: f64,
}

impl ViewerOracle {
    /// Eye at `eye`, `altitude` metres above the surface, viewing tiles of
    /// `tile_size` pixels.
    pub fn new(eye: GeoPoint, altitude: f64, tile_size: u32) -> Self {
        Self {
            eye,
            altitude: altitude.max(0.0),
            visible: None,
            tile_size: tile_size.max(1),
            radius: EARTH_RADIUS_M,
        }
    }

    /// Restrict visibility to sectors intersecting `sector`.
    pub fn with_visible_sector(mut self, sector: Sector) -> Self {
        self.visible = Some(sector);
        self
    }

    pub fn eye(&self) -> GeoPoint {
        self.eye
    }

    pub fn altitude(&self) -> f64 {
        self.altitude
    }

    pub fn visible_sector(&self) -> Option<Sector> {
        self.visible
    }

    /// Move the eye, keeping the other parameters.
    pub fn move_to(&mut self, eye: GeoPoint, altitude: f64) {
        self.eye = eye;
        self.altitude = altitude.max(0.0);
    }

    /// Straight-line distance from the eye to a surface point.
    pub fn distance_to(&self, point: GeoPoint) -> f64 {
        let eye = to_cartesian(self.eye, self.radius + self.altitude);
        let target = to_cartesian(point, self.radius);
        let (dx, dy, dz) = (eye.0 - target.0, eye.1 - target.1, eye.2 - target.2);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

fn to_cartesian(point: GeoPoint, radius: f64) -> (f64, f64, f64) {
    let (lat, lon) = (point.lat.to_radians(), point.lon.to_radians());
    (
        radius * lat.cos() * lon.cos(),
        radius * lat.cos() * lon.sin(),
        radius * lat.sin(),
    )
}

impl VisibilityOracle for ViewerOracle {
    fn is_visible(&self, sector: &Sector) -> bool {
        self.visible.map_or(true, |v| v.intersects(sector))
    }

    fn min_eye_distance(&self, sector: &Sector) -> f64 {
        sector
            .corners()
            .into_iter()
            .chain(std::iter::once(sector.centroid()))
            .map(|p| self.distance_to(p))
            .fold(f64::INFINITY, f64::min)
    }

    fn cell_size(&self, sector: &Sector) -> f64 {
        std::f64::consts::PI * sector.delta_lat_radians() * self.radius / f64::from(self.tile_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tolerance: f64) -> bool {
        (a - b).abs() <= tolerance
    }

    #[test]
    fn test_distance_straight_down_is_altitude() {
        let oracle = ViewerOracle::new(GeoPoint::new(45.0, 7.0), 1500.0, 512);
        assert!(close(oracle.distance_to(GeoPoint::new(45.0, 7.0)), 1500.0, 1e-6));
    }

    #[test]
    fn test_distance_along_equator() {
        let oracle = ViewerOracle::new(GeoPoint::new(0.0, 0.0), 0.0, 512);
        let one_degree_chord = 2.0 * EARTH_RADIUS_M * (0.5_f64.to_radians()).sin();
        assert!(close(
            oracle.distance_to(GeoPoint::new(0.0, 1.0)),
            one_degree_chord,
            1e-6
        ));
    }

    #[test]
    fn test_min_eye_distance_uses_centre() {
        let oracle = ViewerOracle::new(GeoPoint::new(0.5, 0.5), 4000.0, 512);
        let sector = Sector::new(0.0, 1.0, 0.0, 1.0);
        assert!(close(oracle.min_eye_distance(&sector), 4000.0, 1e-6));
    }

    #[test]
    fn test_cell_size_halves_with_sector() {
        let oracle = ViewerOracle::new(GeoPoint::default(), 0.0, 512);
        let parent = oracle.cell_size(&Sector::new(0.0, 1.0, 0.0, 1.0));
        let child = oracle.cell_size(&Sector::new(0.0, 0.5, 0.0, 0.5));
        assert!(close(parent, 2.0 * child, 1e-9));
        assert!(close(
            parent,
            std::f64::consts::PI * 1.0_f64.to_radians() * EARTH_RADIUS_M / 512.0,
            1e-9
        ));
    }

    #[test]
    fn test_visible_sector() {
        let oracle = ViewerOracle::new(GeoPoint::default(), 0.0, 512)
            .with_visible_sector(Sector::new(0.0, 1.0, 0.0, 1.0));
        assert!(oracle.is_visible(&Sector::new(0.5, 2.0, 0.5, 2.0)));
        assert!(!oracle.is_visible(&Sector::new(1.0, 2.0, 1.0, 2.0)));

        let unrestricted = ViewerOracle::new(GeoPoint::default(), 0.0, 512);
        assert!(unrestricted.is_visible(&Sector::new(80.0, 90.0, 170.0, 180.0)));
    }
}
