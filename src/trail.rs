//! # Trail
//!
//! The trail is the ordered polyline the user walks. It is assembled once from an
//! indexed coordinate source and is immutable afterwards.
//!
//! ## Source Format
//!
//! A bundled trail file is a JSON object whose coordinates member maps 1-based
//! string indices to `{latitude, longitude}` pairs:
//!
//! ```json
//! { "TrailCoordinates": {
//!     "1": { "latitude": 35.220, "longitude": -80.830 },
//!     "2": { "latitude": 35.217, "longitude": -80.833 }
//! } }
//! ```
//!
//! Indices are sorted numerically, so `"10"` follows `"9"`, and must run from 1
//! to N without gaps or duplicates.
//!
//! ## Segments
//!
//! Each consecutive pair of coordinates forms a [`TrailSegment`] with a
//! precomputed bearing. Segments are held in an R-tree so proximity tests only
//! look at segments near the user.

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, info};
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

use crate::error::TrailError;
use crate::geo_utils::{
    compute_bounds, haversine_distance, initial_bearing, meters_to_degrees, EARTH_RADIUS_M,
};
use crate::{Bounds, Coordinate};

/// Margin added around the trail's bounding box, in meters.
pub const DEFAULT_REGION_MARGIN_M: f64 = 50.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawCoordinate {
    latitude: f64,
    longitude: f64,
}

// ============================================================================
// Segments
// ============================================================================

/// A consecutive pair of trail coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailSegment {
    /// Position of the segment along the trail (0-based)
    pub index: usize,
    pub start: Coordinate,
    pub end: Coordinate,
    /// Initial bearing from `start` to `end`, degrees `[0, 360)`
    pub bearing: f64,
}

impl TrailSegment {
    fn new(index: usize, start: Coordinate, end: Coordinate) -> Self {
        Self { index, start, end, bearing: initial_bearing(&start, &end) }
    }

    pub fn length_meters(&self) -> f64 {
        haversine_distance(&self.start, &self.end)
    }

    /// True if `latitude` lies between the endpoints' latitudes (inclusive).
    pub fn spans_latitude(&self, latitude: f64) -> bool {
        let (lo, hi) = min_max(self.start.latitude, self.end.latitude);
        latitude >= lo && latitude <= hi
    }

    /// True if `longitude` lies between the endpoints' longitudes (inclusive).
    pub fn spans_longitude(&self, longitude: f64) -> bool {
        let (lo, hi) = min_max(self.start.longitude, self.end.longitude);
        longitude >= lo && longitude <= hi
    }

    /// The point on the segment at `latitude`, located by following the segment's bearing.
    ///
    /// Returns `None` when the latitude is outside the segment or the segment runs due
    /// east-west (every point shares one latitude, so none is singled out).
    pub fn point_at_latitude(&self, latitude: f64) -> Option<Coordinate> {
        if !self.spans_latitude(latitude) {
            return None;
        }

        let delta_lat = latitude - self.start.latitude;
        if delta_lat == 0.0 {
            return Some(self.start);
        }

        let theta = self.bearing.to_radians();
        if theta.cos().abs() < 1e-9 {
            return None;
        }

        let north_m = delta_lat.to_radians() * EARTH_RADIUS_M;
        let east_m = north_m * theta.tan();
        let mean_lat = ((self.start.latitude + latitude) / 2.0).to_radians();
        let delta_lng = (east_m / (EARTH_RADIUS_M * mean_lat.cos())).to_degrees();

        Some(Coordinate::new(latitude, self.start.longitude + delta_lng))
    }

    /// The point on the segment at `longitude`, by linear interpolation.
    pub fn point_at_longitude(&self, longitude: f64) -> Option<Coordinate> {
        if !self.spans_longitude(longitude) {
            return None;
        }
        let span = self.end.longitude - self.start.longitude;
        if span == 0.0 {
            return None;
        }
        let t = (longitude - self.start.longitude) / span;
        let latitude = self.start.latitude + t * (self.end.latitude - self.start.latitude);
        Some(Coordinate::new(latitude, longitude))
    }

    /// Lateral distance from `location` to this segment, in meters.
    ///
    /// The primary measure is the distance to the segment point at the location's
    /// latitude. Segments running close to east-west are also measured at the
    /// location's longitude, and the endpoints count as well, so corners are covered.
    /// Returns `None` if no measure applies (the location is beyond both ends).
    pub fn lateral_distance_meters(&self, location: &Coordinate) -> Option<f64> {
        let by_latitude = self
            .point_at_latitude(location.latitude)
            .map(|p| haversine_distance(&p, location));
        let by_longitude = self
            .point_at_longitude(location.longitude)
            .map(|p| haversine_distance(&p, location));
        let to_start = haversine_distance(&self.start, location);
        let to_end = haversine_distance(&self.end, location);

        let sweep = match (by_latitude, by_longitude) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        match sweep {
            Some(d) => Some(d.min(to_start).min(to_end)),
            None => Some(to_start.min(to_end)),
        }
    }
}

impl RTreeObject for TrailSegment {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.start.longitude, self.start.latitude],
            [self.end.longitude, self.end.latitude],
        )
    }
}

fn min_max(a: f64, b: f64) -> (f64, f64) {
    if a <= b { (a, b) } else { (b, a) }
}

// ============================================================================
// Trail
// ============================================================================

/// An ordered polyline of at least two coordinates.
#[derive(Debug, Clone)]
pub struct Trail {
    name: String,
    coordinates: Vec<Coordinate>,
    segments: Vec<TrailSegment>,
    index: RTree<TrailSegment>,
    bounds: Bounds,
    region: Bounds,
    region_margin_m: f64,
}

impl Trail {
    /// Build a trail from coordinates that are already in trail order.
    pub fn new(name: &str, coordinates: Vec<Coordinate>) -> Result<Self, TrailError> {
        if coordinates.len() < 2 {
            return Err(TrailError::TooFewCoordinates {
                source_name: name.to_string(),
                count: coordinates.len(),
            });
        }

        if let Some((i, c)) = coordinates.iter().enumerate().find(|(_, c)| !c.is_valid()) {
            return Err(TrailError::InvalidCoordinate {
                index: i + 1,
                latitude: c.latitude,
                longitude: c.longitude,
            });
        }

        let segments: Vec<TrailSegment> = coordinates
            .windows(2)
            .enumerate()
            .map(|(i, w)| TrailSegment::new(i, w[0], w[1]))
            .collect();
        let index = RTree::bulk_load(segments.clone());
        let bounds = compute_bounds(&coordinates);
        let region = bounds.expanded_by_meters(DEFAULT_REGION_MARGIN_M);

        debug!("[Trail] '{}' built with {} segments", name, segments.len());

        Ok(Self {
            name: name.to_string(),
            coordinates,
            segments,
            index,
            bounds,
            region,
            region_margin_m: DEFAULT_REGION_MARGIN_M,
        })
    }

    /// Assemble a trail from `(1-based index key, coordinate)` entries in any order.
    pub fn from_indexed<I>(name: &str, entries: I) -> Result<Self, TrailError>
    where
        I: IntoIterator<Item = (String, Coordinate)>,
    {
        let mut indexed: Vec<(usize, Coordinate)> = Vec::new();
        for (key, coordinate) in entries {
            let index = match key.trim().parse::<usize>() {
                Ok(i) if i >= 1 => i,
                _ => return Err(TrailError::InvalidKey(key)),
            };
            indexed.push((index, coordinate));
        }

        if indexed.len() < 2 {
            return Err(TrailError::TooFewCoordinates {
                source_name: name.to_string(),
                count: indexed.len(),
            });
        }

        indexed.sort_by_key(|(i, _)| *i);

        for pair in indexed.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(TrailError::DuplicateKey(pair[0].0));
            }
        }

        let count = indexed.len();
        if let Some(missing) = indexed
            .iter()
            .enumerate()
            .find(|(position, (index, _))| *index != position + 1)
            .map(|(position, _)| position + 1)
        {
            return Err(TrailError::MissingIndex { missing, count });
        }

        Self::new(name, indexed.into_iter().map(|(_, c)| c).collect())
    }

    /// Parse a trail document.
    ///
    /// `coordinates_path` names the member that holds the index map; an empty path means
    /// the document itself is the index map.
    pub fn from_json_str(json: &str, coordinates_path: &str, name: &str) -> Result<Self, TrailError> {
        let document: serde_json::Value = serde_json::from_str(json)?;
        Self::from_json_value(&document, coordinates_path, name)
    }

    /// Same as [`Trail::from_json_str`] for an already parsed document.
    ///
    /// The index map may also be an array indexed by position, which is how REST
    /// key/value stores return maps with small integer keys (slot 0 is `null`).
    pub fn from_json_value(
        document: &serde_json::Value,
        coordinates_path: &str,
        name: &str,
    ) -> Result<Self, TrailError> {
        let coordinates = if coordinates_path.is_empty() {
            document
        } else {
            document.get(coordinates_path).ok_or_else(|| {
                TrailError::MissingCoordinates(format!("no '{}' member", coordinates_path))
            })?
        };

        let entries: Vec<(String, RawCoordinate)> = match coordinates {
            serde_json::Value::Array(items) => items
                .iter()
                .enumerate()
                .filter(|(_, item)| !item.is_null())
                .map(|(i, item)| RawCoordinate::deserialize(item).map(|raw| (i.to_string(), raw)))
                .collect::<Result<Vec<_>, _>>(),
            other => BTreeMap::<String, RawCoordinate>::deserialize(other).map(|m| m.into_iter().collect::<Vec<_>>()),
        }
        .map_err(|e| TrailError::MissingCoordinates(e.to_string()))?;

        Self::from_indexed(
            name,
            entries
                .into_iter()
                .map(|(key, raw)| (key, Coordinate::new(raw.latitude, raw.longitude))),
        )
    }

    /// Load a bundled trail file. The trail is named after the file stem.
    pub fn load_from_file(path: impl AsRef<Path>, coordinates_path: &str) -> Result<Self, TrailError> {
        let path = path.as_ref();
        let display = path.display().to_string();

        if !path.exists() {
            return Err(TrailError::NotFound(display));
        }

        let json = std::fs::read_to_string(path).map_err(|source| TrailError::Io {
            path: display.clone(),
            source,
        })?;

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| display.clone());

        let trail = Self::from_json_str(&json, coordinates_path, &name)?;
        info!("[Trail] Loaded {} coordinates from {}", trail.len(), display);
        Ok(trail)
    }

    /// Recompute the padded region with a different margin.
    pub fn with_region_margin(mut self, meters: f64) -> Self {
        self.region_margin_m = meters;
        self.region = self.bounds.expanded_by_meters(meters);
        self
    }

    /// Export in the source format, with zero-padded keys ("001", "002", ...).
    pub fn to_json_string(&self, coordinates_path: &str) -> Result<String, TrailError> {
        let map: BTreeMap<String, RawCoordinate> = self
            .coordinates
            .iter()
            .enumerate()
            .map(|(i, c)| {
                (format!("{:03}", i + 1), RawCoordinate { latitude: c.latitude, longitude: c.longitude })
            })
            .collect();

        let json = if coordinates_path.is_empty() {
            serde_json::to_string_pretty(&map)?
        } else {
            let mut document = BTreeMap::new();
            document.insert(coordinates_path.to_string(), map);
            serde_json::to_string_pretty(&document)?
        };
        Ok(json)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn coordinates(&self) -> &[Coordinate] {
        &self.coordinates
    }

    pub fn segments(&self) -> &[TrailSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    /// Always false: a trail has at least two coordinates.
    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    /// Tight bounding box of the coordinates.
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Bounding box padded by the region margin.
    pub fn region(&self) -> Bounds {
        self.region
    }

    pub fn region_margin_meters(&self) -> f64 {
        self.region_margin_m
    }

    /// Centre of the bounding box.
    pub fn midpoint(&self) -> Coordinate {
        self.bounds.center()
    }

    pub fn length_meters(&self) -> f64 {
        crate::geo_utils::polyline_length(&self.coordinates)
    }

    /// Segments whose envelope lies within `radius_m` of `location`.
    pub fn segments_near(&self, location: &Coordinate, radius_m: f64) -> Vec<&TrailSegment> {
        let pad = meters_to_degrees(radius_m, location.latitude);
        let search = AABB::from_corners(
            [location.longitude - pad, location.latitude - pad],
            [location.longitude + pad, location.latitude + pad],
        );
        let mut near: Vec<&TrailSegment> = self.index.locate_in_envelope_intersecting(&search).collect();
        near.sort_by_key(|s| s.index);
        near
    }

    /// Shortest lateral distance from `location` to any segment, in meters.
    pub fn distance_to(&self, location: &Coordinate) -> f64 {
        self.segments
            .iter()
            .filter_map(|s| s.lateral_distance_meters(location))
            .fold(f64::INFINITY, f64::min)
    }
}

/// Order unordered points into a path by repeatedly stepping to the nearest remaining point.
///
/// Starts from `points[start]`. Returns an empty vector if `start` is out of range.
pub fn order_by_nearest_neighbor(points: &[Coordinate], start: usize) -> Vec<Coordinate> {
    if start >= points.len() {
        return vec![];
    }

    let mut remaining: Vec<Coordinate> = points.to_vec();
    let mut ordered = Vec::with_capacity(points.len());
    let mut next = remaining.swap_remove(start);

    loop {
        ordered.push(next);
        if remaining.is_empty() {
            break;
        }
        let (nearest, _) = remaining
            .iter()
            .enumerate()
            .map(|(i, p)| (i, haversine_distance(&next, p)))
            .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best });
        next = remaining.swap_remove(nearest);
    }

    ordered
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "TrailCoordinates": {
            "1": { "latitude": 35.220, "longitude": -80.830 },
            "2": { "latitude": 35.217, "longitude": -80.833 }
        }
    }"#;

    fn entries(points: &[(&str, f64, f64)]) -> Vec<(String, Coordinate)> {
        points
            .iter()
            .map(|(k, lat, lng)| (k.to_string(), Coordinate::new(*lat, *lng)))
            .collect()
    }

    #[test]
    fn test_load_sample_trail() {
        let trail = Trail::from_json_str(SAMPLE, "TrailCoordinates", "sample").unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail.coordinates()[0], Coordinate::new(35.220, -80.830));
        assert_eq!(trail.coordinates()[1], Coordinate::new(35.217, -80.833));
        assert_eq!(trail.segments().len(), 1);
        assert!(trail.segments()[0].bearing > 180.0 && trail.segments()[0].bearing < 270.0);
    }

    #[test]
    fn test_keys_sorted_numerically() {
        let points: Vec<(String, Coordinate)> = (1..=12)
            .rev()
            .map(|i| (i.to_string(), Coordinate::new(35.0 + i as f64 * 0.001, -80.0)))
            .collect();
        let trail = Trail::from_indexed("twelve", points).unwrap();
        assert_eq!(trail.len(), 12);
        for (i, c) in trail.coordinates().iter().enumerate() {
            assert_eq!(*c, Coordinate::new(35.0 + (i + 1) as f64 * 0.001, -80.0));
        }
    }

    #[test]
    fn test_zero_padded_keys_accepted() {
        let trail = Trail::from_indexed(
            "padded",
            entries(&[("002", 35.1, -80.0), ("001", 35.0, -80.0), ("003", 35.2, -80.0)]),
        )
        .unwrap();
        assert_eq!(trail.coordinates()[0].latitude, 35.0);
        assert_eq!(trail.coordinates()[2].latitude, 35.2);
    }

    #[test]
    fn test_too_few_coordinates_fails() {
        let one = r#"{ "TrailCoordinates": { "1": { "latitude": 35.0, "longitude": -80.0 } } }"#;
        match Trail::from_json_str(one, "TrailCoordinates", "one") {
            Err(TrailError::TooFewCoordinates { count, .. }) => assert_eq!(count, 1),
            other => panic!("expected TooFewCoordinates, got {:?}", other),
        }

        let none = r#"{ "TrailCoordinates": {} }"#;
        assert!(matches!(
            Trail::from_json_str(none, "TrailCoordinates", "none"),
            Err(TrailError::TooFewCoordinates { count: 0, .. })
        ));
    }

    #[test]
    fn test_shape_mismatch_fails() {
        let wrong_member = r#"{ "Path": {} }"#;
        assert!(matches!(
            Trail::from_json_str(wrong_member, "TrailCoordinates", "x"),
            Err(TrailError::MissingCoordinates(_))
        ));

        let missing_field = r#"{ "TrailCoordinates": { "1": { "latitude": 35.0 }, "2": { "latitude": 35.1, "longitude": -80.0 } } }"#;
        assert!(matches!(
            Trail::from_json_str(missing_field, "TrailCoordinates", "x"),
            Err(TrailError::MissingCoordinates(_))
        ));

        assert!(matches!(
            Trail::from_json_str("not json", "TrailCoordinates", "x"),
            Err(TrailError::Json(_))
        ));
    }

    #[test]
    fn test_bad_keys_fail() {
        assert!(matches!(
            Trail::from_indexed("x", entries(&[("a", 35.0, -80.0), ("2", 35.1, -80.0)])),
            Err(TrailError::InvalidKey(k)) if k == "a"
        ));
        assert!(matches!(
            Trail::from_indexed("x", entries(&[("0", 35.0, -80.0), ("1", 35.1, -80.0)])),
            Err(TrailError::InvalidKey(_))
        ));
        assert!(matches!(
            Trail::from_indexed("x", entries(&[("1", 35.0, -80.0), ("01", 35.1, -80.0)])),
            Err(TrailError::DuplicateKey(1))
        ));
        assert!(matches!(
            Trail::from_indexed("x", entries(&[("1", 35.0, -80.0), ("3", 35.1, -80.0)])),
            Err(TrailError::MissingIndex { missing: 2, count: 2 })
        ));
    }

    #[test]
    fn test_invalid_coordinate_fails() {
        let result = Trail::from_indexed("x", entries(&[("1", 95.0, -80.0), ("2", 35.1, -80.0)]));
        assert!(matches!(result, Err(TrailError::InvalidCoordinate { index: 1, .. })));
    }

    #[test]
    fn test_bare_index_map() {
        let bare = r#"{ "1": { "latitude": 35.0, "longitude": -80.0 }, "2": { "latitude": 35.1, "longitude": -80.0 } }"#;
        let trail = Trail::from_json_str(bare, "", "bare").unwrap();
        assert_eq!(trail.len(), 2);
    }

    #[test]
    fn test_array_form() {
        let array = serde_json::json!([
            null,
            { "latitude": 35.220, "longitude": -80.830 },
            { "latitude": 35.217, "longitude": -80.833 }
        ]);
        let trail = Trail::from_json_value(&array, "", "array").unwrap();
        assert_eq!(trail.coordinates()[1], Coordinate::new(35.217, -80.833));
    }

    #[test]
    fn test_load_missing_file() {
        let path = std::env::temp_dir().join("trail-guide-does-not-exist.json");
        assert!(matches!(
            Trail::load_from_file(&path, "TrailCoordinates"),
            Err(TrailError::NotFound(_))
        ));
    }

    #[test]
    fn test_load_from_file_and_export() {
        let path = std::env::temp_dir().join(format!("trail-guide-test-{}.json", std::process::id()));
        std::fs::write(&path, SAMPLE).unwrap();

        let trail = Trail::load_from_file(&path, "TrailCoordinates").unwrap();
        std::fs::remove_file(&path).ok();
        assert!(trail.name().starts_with("trail-guide-test-"));

        let exported = trail.to_json_string("TrailCoordinates").unwrap();
        assert!(exported.contains("\"001\""));
        assert!(exported.contains("\"002\""));
        let reloaded = Trail::from_json_str(&exported, "TrailCoordinates", "again").unwrap();
        assert_eq!(reloaded.coordinates(), trail.coordinates());
    }

    #[test]
    fn test_region_is_padded_bounds() {
        let trail = Trail::from_json_str(SAMPLE, "TrailCoordinates", "sample").unwrap();
        let bounds = trail.bounds();
        let region = trail.region();
        assert!(region.min_lat < bounds.min_lat && region.max_lat > bounds.max_lat);
        assert!(region.min_lng < bounds.min_lng && region.max_lng > bounds.max_lng);

        let mid = trail.midpoint();
        assert!((mid.latitude - 35.2185).abs() < 1e-9);
        assert!((mid.longitude - (-80.8315)).abs() < 1e-9);

        let wider = trail.with_region_margin(500.0);
        assert!(wider.region().max_lat > region.max_lat);
    }

    #[test]
    fn test_point_at_latitude_lies_on_segment() {
        let trail = Trail::from_json_str(SAMPLE, "TrailCoordinates", "sample").unwrap();
        let segment = trail.segments()[0];
        let p = segment.point_at_latitude(35.2185).unwrap();
        // Halfway in latitude should be close to halfway in longitude
        assert!((p.longitude - (-80.8315)).abs() < 1e-5);
        assert!(segment.point_at_latitude(35.3).is_none());
    }

    #[test]
    fn test_east_west_segment_uses_longitude() {
        let segment = TrailSegment::new(0, Coordinate::new(35.0, -80.01), Coordinate::new(35.0, -80.0));
        assert!(segment.point_at_latitude(35.0001).is_none());
        let d = segment.lateral_distance_meters(&Coordinate::new(35.00005, -80.005)).unwrap();
        assert!((d - 5.56).abs() < 0.1, "got {d}");
    }

    #[test]
    fn test_segments_near() {
        let points: Vec<Coordinate> = (0..10).map(|i| Coordinate::new(35.0 + i as f64 * 0.001, -80.0)).collect();
        let trail = Trail::new("straight", points).unwrap();
        let near = trail.segments_near(&Coordinate::new(35.0045, -80.0), 20.0);
        assert_eq!(near.len(), 1);
        assert_eq!(near[0].index, 4);
        assert!(trail.segments_near(&Coordinate::new(36.0, -80.0), 20.0).is_empty());
    }

    #[test]
    fn test_order_by_nearest_neighbor() {
        let scrambled = vec![
            Coordinate::new(35.003, -80.0),
            Coordinate::new(35.000, -80.0),
            Coordinate::new(35.002, -80.0),
            Coordinate::new(35.001, -80.0),
        ];
        let ordered = order_by_nearest_neighbor(&scrambled, 1);
        let lats: Vec<f64> = ordered.iter().map(|c| c.latitude).collect();
        assert_eq!(lats, vec![35.000, 35.001, 35.002, 35.003]);
        assert!(order_by_nearest_neighbor(&scrambled, 9).is_empty());
    }
}
