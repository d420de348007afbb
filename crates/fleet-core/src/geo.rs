//! Geometry helpers
//!
//! All shapes treat their boundary as inside: a point exactly on a circle's
//! radius, on a rectangle's edge or on a polygon's edge is contained.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Tolerance (degrees) used for on-edge polygon checks
const EDGE_EPSILON: f64 = 1e-9;

/// A latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Whether latitude is in [-90, 90] and longitude in [-180, 180]
    pub fn is_valid(&self) -> bool {
        valid_coordinates(self.lat, self.lon)
    }

    /// Return an error if the point is out of range
    pub fn validate(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(CoreError::InvalidCoordinates {
                lat: self.lat,
                lon: self.lon,
            })
        }
    }

    /// Great-circle distance to another point in meters
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        haversine_distance_m(self.lat, self.lon, other.lat, other.lon)
    }
}

/// Check coordinate ranges. NaN is never valid.
pub fn valid_coordinates(lat: f64, lon: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}

/// Haversine distance between two points in meters
pub fn haversine_distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Point-in-circle: haversine distance to the center is at most `radius_m`
pub fn point_in_circle(center: GeoPoint, radius_m: f64, point: GeoPoint) -> bool {
    center.distance_to(&point) <= radius_m
}

/// Point-in-rectangle: direct bounding comparison, edges inclusive
pub fn point_in_rectangle(min: GeoPoint, max: GeoPoint, point: GeoPoint) -> bool {
    point.lat >= min.lat && point.lat <= max.lat && point.lon >= min.lon && point.lon <= max.lon
}

/// Point-in-polygon via ray casting over the vertex ring.
///
/// The ring is closed implicitly. Returns `false` for fewer than three
/// vertices; callers validate geometry before reaching this point.
pub fn point_in_polygon(vertices: &[GeoPoint], point: GeoPoint) -> bool {
    let n = vertices.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let a = vertices[i];
        let b = vertices[j];

        if on_segment(a, b, point) {
            return true;
        }

        // Longitude is x, latitude is y
        if (a.lat > point.lat) != (b.lat > point.lat) {
            let x_cross = (b.lon - a.lon) * (point.lat - a.lat) / (b.lat - a.lat) + a.lon;
            if point.lon < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }

    inside
}

fn on_segment(a: GeoPoint, b: GeoPoint, p: GeoPoint) -> bool {
    let cross = (b.lon - a.lon) * (p.lat - a.lat) - (b.lat - a.lat) * (p.lon - a.lon);
    if cross.abs() > EDGE_EPSILON {
        return false;
    }
    p.lon >= a.lon.min(b.lon) - EDGE_EPSILON
        && p.lon <= a.lon.max(b.lon) + EDGE_EPSILON
        && p.lat >= a.lat.min(b.lat) - EDGE_EPSILON
        && p.lat <= a.lat.max(b.lat) + EDGE_EPSILON
}

/// Approximate distance in meters from `point` to the segment `a`-`b`.
///
/// Projects onto a local equirectangular plane centred on `point`, which is
/// accurate at the few-kilometre scale route deviation works at.
pub fn distance_to_segment_m(a: GeoPoint, b: GeoPoint, point: GeoPoint) -> f64 {
    let cos_lat = point.lat.to_radians().cos();
    let to_xy = |g: GeoPoint| -> (f64, f64) {
        (
            (g.lon - point.lon).to_radians() * cos_lat * EARTH_RADIUS_M,
            (g.lat - point.lat).to_radians() * EARTH_RADIUS_M,
        )
    };

    let (ax, ay) = to_xy(a);
    let (bx, by) = to_xy(b);
    let (dx, dy) = (bx - ax, by - ay);
    let len_sq = dx * dx + dy * dy;

    let t = if len_sq == 0.0 {
        0.0
    } else {
        (-(ax * dx + ay * dy) / len_sq).clamp(0.0, 1.0)
    };

    let (cx, cy) = (ax + t * dx, ay + t * dy);
    (cx * cx + cy * cy).sqrt()
}

/// Distance in meters from `point` to the nearest segment of a polyline.
///
/// A single-vertex path degenerates to point distance; an empty path yields `None`.
pub fn distance_to_path_m(path: &[GeoPoint], point: GeoPoint) -> Option<f64> {
    match path {
        [] => None,
        [only] => Some(only.distance_to(&point)),
        _ => path
            .windows(2)
            .map(|w| distance_to_segment_m(w[0], w[1], point))
            .min_by(|a, b| a.total_cmp(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<GeoPoint> {
        vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 1.0),
            GeoPoint::new(1.0, 1.0),
            GeoPoint::new(1.0, 0.0),
        ]
    }

    #[test]
    fn test_haversine_known_distance() {
        // One degree of latitude is ~111.19 km
        let d = haversine_distance_m(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_195.0).abs() < 50.0, "distance: {}", d);
    }

    #[test]
    fn test_haversine_zero() {
        assert_eq!(haversine_distance_m(12.5, 77.6, 12.5, 77.6), 0.0);
    }

    #[test]
    fn test_valid_coordinates() {
        assert!(valid_coordinates(90.0, 180.0));
        assert!(valid_coordinates(-90.0, -180.0));
        assert!(!valid_coordinates(90.1, 0.0));
        assert!(!valid_coordinates(0.0, -180.5));
        assert!(!valid_coordinates(f64::NAN, 0.0));
    }

    #[test]
    fn test_circle_inside_outside_boundary() {
        let center = GeoPoint::new(0.0, 0.0);
        let edge = GeoPoint::new(1.0, 0.0);
        let radius = center.distance_to(&edge);

        assert!(point_in_circle(center, 1000.0, GeoPoint::new(0.001, 0.0)));
        assert!(!point_in_circle(center, 1000.0, GeoPoint::new(0.5, 0.0)));
        assert!(point_in_circle(center, radius, edge));
    }

    #[test]
    fn test_rectangle_inside_outside_boundary() {
        let min = GeoPoint::new(10.0, 20.0);
        let max = GeoPoint::new(11.0, 21.0);

        assert!(point_in_rectangle(min, max, GeoPoint::new(10.5, 20.5)));
        assert!(!point_in_rectangle(min, max, GeoPoint::new(11.5, 20.5)));
        assert!(point_in_rectangle(min, max, GeoPoint::new(10.0, 20.5)));
        assert!(point_in_rectangle(min, max, GeoPoint::new(11.0, 21.0)));
    }

    #[test]
    fn test_polygon_inside_outside_boundary() {
        let poly = square();

        assert!(point_in_polygon(&poly, GeoPoint::new(0.5, 0.5)));
        assert!(!point_in_polygon(&poly, GeoPoint::new(1.5, 0.5)));
        assert!(!point_in_polygon(&poly, GeoPoint::new(-0.1, -0.1)));
        assert!(point_in_polygon(&poly, GeoPoint::new(0.0, 0.5)));
        assert!(point_in_polygon(&poly, GeoPoint::new(1.0, 1.0)));
    }

    #[test]
    fn test_polygon_concave() {
        // U-shape: the notch at the top middle is outside
        let poly = vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 3.0),
            GeoPoint::new(3.0, 3.0),
            GeoPoint::new(3.0, 2.0),
            GeoPoint::new(1.0, 2.0),
            GeoPoint::new(1.0, 1.0),
            GeoPoint::new(3.0, 1.0),
            GeoPoint::new(3.0, 0.0),
        ];

        assert!(point_in_polygon(&poly, GeoPoint::new(0.5, 1.5)));
        assert!(!point_in_polygon(&poly, GeoPoint::new(2.0, 1.5)));
        assert!(point_in_polygon(&poly, GeoPoint::new(2.0, 0.5)));
    }

    #[test]
    fn test_polygon_degenerate() {
        let line = vec![GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 1.0)];
        assert!(!point_in_polygon(&line, GeoPoint::new(0.5, 0.5)));
        assert!(!point_in_polygon(&[], GeoPoint::new(0.0, 0.0)));
    }

    #[test]
    fn test_shape_checks_idempotent() {
        let poly = square();
        let p = GeoPoint::new(0.25, 0.75);
        let first = point_in_polygon(&poly, p);
        for _ in 0..10 {
            assert_eq!(point_in_polygon(&poly, p), first);
        }
    }

    #[test]
    fn test_distance_to_segment() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(0.0, 1.0);

        // Directly above the segment midpoint by 0.01 deg lat (~1.1 km)
        let d = distance_to_segment_m(a, b, GeoPoint::new(0.01, 0.5));
        assert!((d - 1_112.0).abs() < 5.0, "distance: {}", d);

        // Beyond the end clamps to the endpoint
        let beyond = distance_to_segment_m(a, b, GeoPoint::new(0.0, 1.01));
        assert!((beyond - 1_112.0).abs() < 5.0, "distance: {}", beyond);
    }

    #[test]
    fn test_distance_to_path() {
        assert!(distance_to_path_m(&[], GeoPoint::new(0.0, 0.0)).is_none());

        let path = vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 1.0),
            GeoPoint::new(1.0, 1.0),
        ];
        let on_path = distance_to_path_m(&path, GeoPoint::new(0.5, 1.0)).unwrap();
        assert!(on_path < 1.0);
    }
}
