//! # Points of Interest
//!
//! A [`PointOfInterest`] is a named place along the trail with a description and an
//! image. Each POI carries [`PoiMetrics`]: its distance and bearing from the user and
//! the angle between the user's heading and that bearing. Metrics are recomputed on
//! every location or heading change.
//!
//! ## Record Format
//!
//! POIs arrive from the remote directory as JSON records:
//!
//! ```json
//! {
//!   "uid": "captain-jack",
//!   "name": "Captain Jack",
//!   "latitude": 35.2169,
//!   "longitude": -80.8327,
//!   "description": "...",
//!   "imageUrl": "https://example.com/jack.jpg"
//! }
//! ```
//!
//! `uid` may be omitted, in which case the directory key is the id. `movieUrl` and
//! `learnMoreUrl` are optional.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::DirectoryError;
use crate::geo_utils::{clockwise_angle, haversine_distance, initial_bearing, meters_to_yards, signed_angle};
use crate::location::UserLocation;
use crate::Coordinate;

/// A POI record as stored in the remote directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoiRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub description: String,
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movie_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learn_more_url: Option<String>,
}

// ============================================================================
// Metrics
// ============================================================================

/// Position of a POI relative to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct PoiMetrics {
    /// Great-circle distance from the user, in yards
    pub distance_yards: Option<f64>,
    /// Initial bearing from the user to the POI, degrees `[0, 360)`
    pub bearing_degrees: Option<f64>,
    /// Clockwise angle from the user's heading to the bearing, degrees `[0, 360)`
    pub angle_with_heading: Option<f64>,
}

impl PoiMetrics {
    /// Compute metrics for a POI at `poi` as seen from `user`.
    ///
    /// Without a location every field is `None`; without a heading only the angle is.
    pub fn compute(poi: &Coordinate, user: Option<&UserLocation>) -> Self {
        let Some(user) = user else {
            return Self::default();
        };

        let meters = haversine_distance(&user.coordinate, poi);
        let bearing = initial_bearing(&user.coordinate, poi);
        let angle = user.heading.map(|heading| clockwise_angle(heading, bearing));

        Self {
            distance_yards: Some(meters_to_yards(meters)),
            bearing_degrees: Some(bearing),
            angle_with_heading: angle,
        }
    }

    /// The angle with heading in `(-180, 180]`; negative is to the left.
    pub fn signed_angle(&self) -> Option<f64> {
        self.angle_with_heading.map(signed_angle)
    }

    /// True if the POI lies within `half_cone_degrees` either side of the heading.
    pub fn in_cone(&self, half_cone_degrees: f64) -> bool {
        self.signed_angle()
            .map(|a| a.abs() <= half_cone_degrees)
            .unwrap_or(false)
    }

    /// Distance label, e.g. "152 yds", or "<unknown>" without a location.
    pub fn distance_text(&self) -> String {
        match self.distance_yards {
            Some(yards) => format!("{} yds", yards.round() as i64),
            None => "<unknown>".to_string(),
        }
    }
}

// ============================================================================
// Point of Interest
// ============================================================================

/// A validated point of interest.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct PointOfInterest {
    pub id: String,
    pub name: String,
    pub description: String,
    pub location: Coordinate,
    pub image_url: String,
    pub movie_url: Option<String>,
    pub learn_more_url: Option<String>,
    pub metrics: PoiMetrics,
}

impl PointOfInterest {
    /// Validate a record stored under `key`.
    pub fn from_record(key: &str, record: PoiRecord) -> Result<Self, DirectoryError> {
        let invalid = |reason: String| DirectoryError::InvalidRecord { key: key.to_string(), reason };

        let id = record.uid.unwrap_or_else(|| key.to_string());
        if id.trim().is_empty() {
            return Err(invalid("empty uid".to_string()));
        }

        let location = Coordinate::new(record.latitude, record.longitude);
        if !location.is_valid() {
            return Err(invalid(format!(
                "coordinate ({}, {}) is out of range",
                record.latitude, record.longitude
            )));
        }

        let image_url = parse_url(&record.image_url).map_err(|e| invalid(format!("imageUrl: {}", e)))?;
        let movie_url = record
            .movie_url
            .map(|u| parse_url(&u))
            .transpose()
            .map_err(|e| invalid(format!("movieUrl: {}", e)))?;
        let learn_more_url = record
            .learn_more_url
            .map(|u| parse_url(&u))
            .transpose()
            .map_err(|e| invalid(format!("learnMoreUrl: {}", e)))?;

        Ok(Self {
            id,
            name: record.name,
            description: record.description,
            location,
            image_url,
            movie_url,
            learn_more_url,
            metrics: PoiMetrics::default(),
        })
    }

    /// Validate a raw JSON record stored under `key`.
    pub fn from_json_value(key: &str, value: serde_json::Value) -> Result<Self, DirectoryError> {
        let record: PoiRecord = serde_json::from_value(value).map_err(|e| DirectoryError::InvalidRecord {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_record(key, record)
    }

    /// Convert back to the directory record format.
    pub fn to_record(&self) -> PoiRecord {
        PoiRecord {
            uid: Some(self.id.clone()),
            name: self.name.clone(),
            latitude: self.location.latitude,
            longitude: self.location.longitude,
            description: self.description.clone(),
            image_url: self.image_url.clone(),
            movie_url: self.movie_url.clone(),
            learn_more_url: self.learn_more_url.clone(),
        }
    }

    /// Recompute metrics from the user's location.
    pub fn update_metrics(&mut self, user: Option<&UserLocation>) {
        self.metrics = PoiMetrics::compute(&self.location, user);
    }

    pub fn distance_text(&self) -> String {
        self.metrics.distance_text()
    }
}

fn parse_url(raw: &str) -> Result<String, url::ParseError> {
    Url::parse(raw.trim()).map(|u| u.to_string())
}

// ============================================================================
// Tests
// ============================================================================
