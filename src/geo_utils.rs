//! # Geographic Utilities
//!
//! Core geographic computations used by the trail tracker and the POI directory.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two coordinates |
//! | [`initial_bearing`] | Initial great-circle bearing from one coordinate to another |
//! | [`destination`] | Coordinate reached by travelling a distance along a bearing |
//! | [`meters_to_yards`] | Convert meters to the display unit (yards) |
//! | [`polyline_length`] | Total length of a trail in meters |
//! | [`compute_bounds`] | Bounding box of a set of coordinates |
//! | [`compute_center`] | Centroid of a set of coordinates |
//! | [`meters_to_degrees`] | Convert meters to approximate degrees at a latitude |
//! | [`normalize_degrees`] | Wrap an angle into `[0, 360)` |
//! | [`clockwise_angle`] | Clockwise angle from a heading to a bearing, in `[0, 360)` |
//! | [`signed_angle`] | Convert a `[0, 360)` angle into `(-180, 180]` |
//!
//! ## Example
//!
//! ```rust
//! use trail_guide::{Coordinate, geo_utils};
//!
//! let start = Coordinate::new(35.2200, -80.8300);
//! let end = Coordinate::new(35.2170, -80.8330);
//!
//! let meters = geo_utils::haversine_distance(&start, &end);
//! let yards = geo_utils::meters_to_yards(meters);
//! assert!(yards > meters);
//!
//! // Heading south-west
//! let bearing = geo_utils::initial_bearing(&start, &end);
//! assert!(bearing > 180.0 && bearing < 270.0);
//! ```
//!
//! ## Angle Convention
//!
//! Bearings and headings are compass degrees, clockwise from true north, in `[0, 360)`.
//! The angle between the user's heading and a POI is always reported as the unsigned
//! clockwise angle in `[0, 360)`. [`signed_angle`] gives the symmetric view used for
//! forward-cone tests.

use geo::{Bearing, Destination, Distance, Haversine, Point};
use crate::{Bounds, Coordinate};

/// Yards per meter, as displayed in distance labels.
pub const YARDS_PER_METER: f64 = 1.0936;

/// Mean Earth radius in meters, matching the haversine model used by `geo`.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

#[inline]
fn to_point(c: &Coordinate) -> Point<f64> {
    Point::new(c.longitude, c.latitude)
}

// =============================================================================
// Distance and Bearing
// =============================================================================

/// Calculate the great-circle distance between two coordinates using the Haversine formula.
///
/// Returns the distance in meters.
///
/// # Example
///
/// ```rust
/// use trail_guide::{Coordinate, geo_utils};
///
/// let london = Coordinate::new(51.5074, -0.1278);
/// let paris = Coordinate::new(48.8566, 2.3522);
///
/// let distance = geo_utils::haversine_distance(&london, &paris);
/// assert!((distance - 343_560.0).abs() < 1000.0); // ~344 km
/// ```
#[inline]
pub fn haversine_distance(p1: &Coordinate, p2: &Coordinate) -> f64 {
    Haversine::distance(to_point(p1), to_point(p2))
}

/// Initial bearing along the great circle from `from` to `to`, in degrees `[0, 360)`.
///
/// Coincident coordinates yield `0.0`.
pub fn initial_bearing(from: &Coordinate, to: &Coordinate) -> f64 {
    if from == to {
        return 0.0;
    }
    normalize_degrees(Haversine::bearing(to_point(from), to_point(to)))
}

/// Coordinate reached by travelling `meters` from `origin` along `bearing` degrees.
pub fn destination(origin: &Coordinate, bearing: f64, meters: f64) -> Coordinate {
    let p = Haversine::destination(to_point(origin), bearing, meters);
    Coordinate::new(p.y(), p.x())
}

/// Convert meters to yards.
#[inline]
pub fn meters_to_yards(meters: f64) -> f64 {
    meters * YARDS_PER_METER
}

/// Convert yards to meters.
#[inline]
pub fn yards_to_meters(yards: f64) -> f64 {
    yards / YARDS_PER_METER
}

/// Calculate the total length of a polyline in meters.
///
/// Empty or single-point inputs return 0.0.
pub fn polyline_length(points: &[Coordinate]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Convert meters to approximate degrees at a given latitude.
///
/// Uses the longitude scale at that latitude, which is the larger of the two,
/// so a square built from the result always covers the requested distance.
#[inline]
pub fn meters_to_degrees(meters: f64, latitude: f64) -> f64 {
    let lat_rad = latitude.to_radians();
    let meters_per_degree = 111_320.0 * lat_rad.cos().max(0.1);
    meters / meters_per_degree
}

// =============================================================================
// Angles
// =============================================================================

/// Wrap any angle in degrees into `[0, 360)`.
#[inline]
pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Clockwise angle from `heading` to `bearing`, in `[0, 360)`.
///
/// ```rust
/// use trail_guide::geo_utils::clockwise_angle;
///
/// assert_eq!(clockwise_angle(350.0, 10.0), 20.0);
/// assert_eq!(clockwise_angle(10.0, 350.0), 340.0);
/// ```
#[inline]
pub fn clockwise_angle(heading: f64, bearing: f64) -> f64 {
    normalize_degrees(bearing - heading)
}

/// Symmetric view of a `[0, 360)` angle, in `(-180, 180]`.
///
/// Negative values are counter-clockwise of the heading.
#[inline]
pub fn signed_angle(clockwise: f64) -> f64 {
    let a = normalize_degrees(clockwise);
    if a > 180.0 { a - 360.0 } else { a }
}

// =============================================================================
// Bounding Box Functions
// =============================================================================

/// Compute the bounding box of a set of coordinates.
///
/// For empty input, returns a bounds with MIN/MAX values that contains nothing.
pub fn compute_bounds(points: &[Coordinate]) -> Bounds {
    let mut min_lat = f64::MAX;
    let mut max_lat = f64::MIN;
    let mut min_lng = f64::MAX;
    let mut max_lng = f64::MIN;

    for p in points {
        min_lat = min_lat.min(p.latitude);
        max_lat = max_lat.max(p.latitude);
        min_lng = min_lng.min(p.longitude);
        max_lng = max_lng.max(p.longitude);
    }

    Bounds { min_lat, max_lat, min_lng, max_lng }
}

/// Compute the centroid of a set of coordinates (arithmetic mean).
///
/// Returns (0, 0) for empty input. Not suitable for data crossing the antimeridian.
pub fn compute_center(points: &[Coordinate]) -> Coordinate {
    if points.is_empty() {
        return Coordinate::new(0.0, 0.0);
    }

    let sum_lat: f64 = points.iter().map(|p| p.latitude).sum();
    let sum_lng: f64 = points.iter().map(|p| p.longitude).sum();
    let n = points.len() as f64;

    Coordinate::new(sum_lat / n, sum_lng / n)
}

// =============================================================================
// Unit Tests
// =============================================================================
