//! # On-Trail Detection
//!
//! Classifies each location update as on or off the trail and reports transitions.
//!
//! The primary test measures the lateral distance from the user to nearby trail
//! segments. For each candidate segment spanning the user's latitude, the point on
//! the segment at that latitude is located by following the segment's bearing, and
//! the user counts as on-trail when the great-circle distance to that point is within
//! the tolerance (10 yards by default).
//!
//! The older bounding-region test, membership in the padded trail bounding box, is
//! kept as [`DetectionMethod::BoundingRegion`]. It is coarse: a user anywhere inside
//! the box is "on" the trail.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::geo_utils::{meters_to_yards, yards_to_meters};
use crate::location::UserLocation;
use crate::trail::Trail;
use crate::Coordinate;

/// Default lateral tolerance, in yards.
pub const DEFAULT_TOLERANCE_YARDS: f64 = 10.0;

/// Default horizontal accuracy cutoff, in meters.
pub const DEFAULT_MAX_ACCURACY_M: f64 = 20.0;

/// How the detector decides whether a location is on the trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum DetectionMethod {
    /// Lateral distance to the nearest trail segment
    SegmentDistance,
    /// Membership in the padded trail region (deprecated)
    BoundingRegion,
}

/// A change of on-trail state.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct OnTrailChange {
    pub is_on: bool,
    /// Segment the user is on, for segment-distance detection
    pub segment: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Classification {
    is_on: bool,
    segment: Option<usize>,
}

impl Classification {
    const OFF: Self = Self { is_on: false, segment: None };
}

/// Tracks whether the user is on the trail.
#[derive(Debug, Clone)]
pub struct OnTrailDetector {
    trail: Trail,
    tolerance_m: f64,
    method: DetectionMethod,
    max_accuracy_m: f64,
    user_is_on: bool,
    current_segment: Option<usize>,
}

impl OnTrailDetector {
    /// Create a detector for `trail`. The user starts off-trail.
    pub fn new(trail: Trail, tolerance_yards: f64, method: DetectionMethod) -> Self {
        Self {
            trail,
            tolerance_m: yards_to_meters(tolerance_yards),
            method,
            max_accuracy_m: DEFAULT_MAX_ACCURACY_M,
            user_is_on: false,
            current_segment: None,
        }
    }

    /// Treat fixes less accurate than `meters` as unavailable.
    pub fn with_max_accuracy(mut self, meters: f64) -> Self {
        self.max_accuracy_m = meters;
        self
    }

    pub fn trail(&self) -> &Trail {
        &self.trail
    }

    pub fn method(&self) -> DetectionMethod {
        self.method
    }

    pub fn tolerance_yards(&self) -> f64 {
        meters_to_yards(self.tolerance_m)
    }

    pub fn is_on(&self) -> bool {
        self.user_is_on
    }

    /// Index of the segment the user is on, if on-trail by segment distance.
    pub fn current_segment(&self) -> Option<usize> {
        self.current_segment
    }

    /// Classify a location update, returning a change only when the state flips.
    ///
    /// `None`, or a fix less accurate than the cutoff, classifies as off-trail.
    pub fn update(&mut self, location: Option<&UserLocation>) -> Option<OnTrailChange> {
        let classification = match location {
            Some(l) if l.is_accurate(self.max_accuracy_m) => self.classify(&l.coordinate),
            Some(l) => {
                debug!(
                    "[OnTrail] Ignoring fix with accuracy {:.1}m (limit {:.1}m)",
                    l.horizontal_accuracy, self.max_accuracy_m
                );
                Classification::OFF
            }
            None => Classification::OFF,
        };

        self.current_segment = classification.segment;

        if classification.is_on == self.user_is_on {
            return None;
        }

        self.user_is_on = classification.is_on;
        info!(
            "[OnTrail] User is now {} the trail '{}'",
            if self.user_is_on { "on" } else { "off" },
            self.trail.name()
        );

        Some(OnTrailChange {
            is_on: self.user_is_on,
            segment: self.current_segment.map(|s| s as u32),
        })
    }

    /// Lateral distance from `coordinate` to the trail, in yards.
    pub fn distance_to_trail_yards(&self, coordinate: &Coordinate) -> f64 {
        meters_to_yards(self.trail.distance_to(coordinate))
    }

    /// Whether `coordinate` would classify as on the trail. Does not change state.
    pub fn is_on_trail(&self, coordinate: &Coordinate) -> bool {
        self.classify(coordinate).is_on
    }

    fn classify(&self, coordinate: &Coordinate) -> Classification {
        match self.method {
            DetectionMethod::SegmentDistance => {
                let nearest = self
                    .trail
                    .segments_near(coordinate, self.tolerance_m)
                    .into_iter()
                    .filter_map(|s| s.lateral_distance_meters(coordinate).map(|d| (s.index, d)))
                    .filter(|(_, d)| *d <= self.tolerance_m)
                    .min_by(|a, b| a.1.total_cmp(&b.1));

                match nearest {
                    Some((index, _)) => Classification { is_on: true, segment: Some(index) },
                    None => Classification::OFF,
                }
            }
            DetectionMethod::BoundingRegion => Classification {
                is_on: self.trail.region().contains(coordinate),
                segment: None,
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
