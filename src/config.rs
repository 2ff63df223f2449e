//! Guide configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::on_trail::DetectionMethod;
use crate::selector::SelectionStrategy;

/// Configuration for trail tracking and current-POI selection.
///
/// Every field has a default; a JSON document only needs to name the fields it changes.
///
/// ```
/// use trail_guide::GuideConfig;
///
/// let config = GuideConfig::from_json_str(r#"{ "lateralToleranceYards": 15.0 }"#).unwrap();
/// assert_eq!(config.lateral_tolerance_yards, 15.0);
/// assert_eq!(config.forward_cone_degrees, 90.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct GuideConfig {
    /// Application name used in alert titles and messages.
    /// Default: "Trail Guide"
    pub application_name: String,

    /// Member of the trail document holding the indexed coordinates.
    /// Default: "TrailCoordinates"
    pub coordinates_path: String,

    /// Margin added around the trail's bounding box when computing its region.
    /// Default: 50.0 meters
    pub region_margin_meters: f64,

    /// Maximum lateral distance from a trail segment for the user to count as on the trail.
    /// Default: 10.0 yards
    pub lateral_tolerance_yards: f64,

    /// How on-trail classification is computed.
    /// Default: segment distance (the bounding region test is a coarse fallback)
    pub detection_method: DetectionMethod,

    /// Fixes with a horizontal accuracy worse than this are treated as unavailable.
    /// Default: 20.0 meters
    pub max_horizontal_accuracy_meters: f64,

    /// Full width of the forward-facing cone centred on the user's heading.
    /// Default: 90.0 degrees (45 to either side)
    pub forward_cone_degrees: f64,

    /// Heuristic used to pick the POI the user is walking toward.
    /// Default: closest POI inside the forward cone
    pub selection_strategy: SelectionStrategy,

    /// Restrict the smallest-angle strategy to the forward cone.
    /// Default: true
    pub restrict_to_cone: bool,

    /// After the user touches the map, automatic selection stays paused for this long.
    /// Default: 3000 ms
    pub interaction_timeout_ms: u64,

    /// Recentre the map on the POI chosen by automatic selection.
    /// Default: true
    pub recenter_map_on_auto: bool,

    /// Interval at which the card view is sampled while scrolling.
    /// Default: 250 ms
    pub scroll_poll_interval_ms: u64,

    /// Interval between record-count polls when loading a remote trail without a sync signal.
    /// Default: 250 ms
    pub settle_poll_interval_ms: u64,

    /// Upper bound on the whole remote trail load.
    /// Default: 30000 ms
    pub remote_max_wait_ms: u64,
}

impl Default for GuideConfig {
    fn default() -> Self {
        Self {
            application_name: "Trail Guide".to_string(),
            coordinates_path: "TrailCoordinates".to_string(),
            region_margin_meters: 50.0,
            lateral_tolerance_yards: 10.0,
            detection_method: DetectionMethod::SegmentDistance,
            max_horizontal_accuracy_meters: 20.0,
            forward_cone_degrees: 90.0,
            selection_strategy: SelectionStrategy::ClosestInFront,
            restrict_to_cone: true,
            interaction_timeout_ms: 3000,
            recenter_map_on_auto: true,
            scroll_poll_interval_ms: 250,
            settle_poll_interval_ms: 250,
            remote_max_wait_ms: 30_000,
        }
    }
}

impl GuideConfig {
    /// Parse a configuration from JSON, filling unspecified fields with defaults.
    ///
    /// Out-of-range values are rejected; see [`GuideConfig::validate`].
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        let config: Self = serde_json::from_str(json)?;
        config.validate().map_err(<serde_json::Error as serde::de::Error>::custom)?;
        Ok(config)
    }

    /// Check the numeric tunables: distances finite and non-negative, the cone
    /// within 0..=360 degrees.
    pub fn validate(&self) -> Result<(), String> {
        let non_negative = [
            ("lateralToleranceYards", self.lateral_tolerance_yards),
            ("regionMarginMeters", self.region_margin_meters),
            ("maxHorizontalAccuracyMeters", self.max_horizontal_accuracy_meters),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{} must be a non-negative number, got {}", name, value));
            }
        }
        if !self.forward_cone_degrees.is_finite() || !(0.0..=360.0).contains(&self.forward_cone_degrees) {
            return Err(format!("forwardConeDegrees must be within 0..=360, got {}", self.forward_cone_degrees));
        }
        Ok(())
    }

    pub fn interaction_timeout(&self) -> Duration {
        Duration::from_millis(self.interaction_timeout_ms)
    }

    pub fn scroll_poll_interval(&self) -> Duration {
        Duration::from_millis(self.scroll_poll_interval_ms)
    }

    pub fn settle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.settle_poll_interval_ms)
    }

    pub fn remote_max_wait(&self) -> Duration {
        Duration::from_millis(self.remote_max_wait_ms)
    }

    /// Half-width of the forward cone.
    pub fn half_cone_degrees(&self) -> f64 {
        self.forward_cone_degrees / 2.0
    }
}
