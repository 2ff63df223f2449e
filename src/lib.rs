//! # Trail Guide
//!
//! Trail tracking and point-of-interest synchronization for location-aware trail
//! guide apps.
//!
//! This library provides:
//! - Trail loading from bundled JSON files or a realtime key/value directory
//! - On-trail detection by lateral distance to trail segments
//! - Distance, bearing and heading angle from the user to each point of interest
//! - Current-POI selection shared by the map and the card view
//!
//! ## Features
//!
//! - **`remote`** - Remote trail loading over a tokio channel (default)
//! - **`http`** - HTTP client for a REST key/value directory
//! - **`parallel`** - Recompute POI metrics in parallel with rayon
//! - **`ffi`** - FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Instant;
//! use trail_guide::{
//!     ChangeKind, Coordinate, GuideConfig, GuideEvent, ImageCache, LocationState,
//!     MemoryImageStore, Trail, TrailGuide, UserLocation,
//! };
//!
//! let trail = Trail::new(
//!     "Trail of History",
//!     vec![Coordinate::new(35.220, -80.830), Coordinate::new(35.217, -80.833)],
//! ).unwrap();
//!
//! let mut guide = TrailGuide::new(
//!     GuideConfig::default(),
//!     LocationState::new("Trail Guide"),
//!     ImageCache::new(MemoryImageStore::new()),
//! );
//! guide.set_trail(Ok(trail));
//!
//! guide.on_poi_record(ChangeKind::Added, "jack", serde_json::json!({
//!     "name": "Captain Jack",
//!     "latitude": 35.2169,
//!     "longitude": -80.8327,
//!     "description": "",
//!     "imageUrl": "https://example.com/jack.jpg"
//! }));
//! guide.on_directory_loaded();
//!
//! let here = UserLocation::new(Coordinate::new(35.2169, -80.8327), 5.0).with_heading(0.0);
//! let events = guide.on_location(here, Instant::now());
//!
//! assert_eq!(guide.current_poi(), Some("jack"));
//! assert_eq!(guide.directory().get("jack").unwrap().distance_text(), "0 yds");
//! assert!(events.iter().any(|e| matches!(e, GuideEvent::SelectionChanged { .. })));
//! ```

use serde::{Deserialize, Serialize};

pub mod broadcast;
pub mod config;
pub mod connection;
pub mod directory;
pub mod error;
pub mod geo_utils;
pub mod guide;
pub mod image_cache;
pub mod location;
pub mod on_trail;
pub mod poi;
pub mod selector;
pub mod trail;

// Remote trail loading
#[cfg(feature = "remote")]
pub mod remote;

// HTTP client for the remote directory
#[cfg(feature = "http")]
pub mod http;

pub use broadcast::{Broadcaster, Subscription};
pub use config::GuideConfig;
pub use connection::{ConnectionEvent, ConnectionMonitor};
pub use directory::{ChangeKind, DirectoryChange, PoiDirectory};
pub use error::{CacheError, DirectoryError, FetchError, TrailError};
pub use guide::{GuideEvent, ScrollOutcome, TrailGuide};
pub use image_cache::{FileImageStore, ImageCache, ImageStore, MemoryImageStore, PoiImage};
pub use location::{AuthorizationStatus, LocationState, UserLocation};
pub use on_trail::{DetectionMethod, OnTrailChange, OnTrailDetector};
pub use poi::{PoiMetrics, PoiRecord, PointOfInterest};
pub use selector::{
    CardScrollSample, CardScrollTracker, CurrentPoiSelector, ScrollPoll, SelectionCause, SelectionChange,
    SelectionStrategy, SelectorSettings,
};
pub use trail::{order_by_nearest_neighbor, Trail, TrailSegment};

#[cfg(feature = "remote")]
pub use remote::{RemoteTrailLoader, SettleDetector, SourceEvent};

#[cfg(feature = "http")]
pub use http::{DirectoryClient, DirectorySnapshot, ImageRequest, ImageResult};

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("TrailGuideRust")
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// A WGS84 coordinate in degrees.
///
/// # Example
/// ```
/// use trail_guide::Coordinate;
/// let jack = Coordinate::new(35.2169, -80.8327); // Charlotte, NC
/// assert!(jack.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Create a new coordinate.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the coordinate is finite and in range.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Latitude/longitude bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from coordinates.
    pub fn from_points(points: &[Coordinate]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        Some(geo_utils::compute_bounds(points))
    }

    /// Get the center of the bounds.
    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    /// Inclusive containment test.
    pub fn contains(&self, c: &Coordinate) -> bool {
        c.latitude >= self.min_lat
            && c.latitude <= self.max_lat
            && c.longitude >= self.min_lng
            && c.longitude <= self.max_lng
    }

    /// The bounds grown by `meters` on every side.
    pub fn expanded_by_meters(&self, meters: f64) -> Self {
        let lat_pad = meters / 111_320.0;
        let lng_pad = geo_utils::meters_to_degrees(meters, self.center().latitude);
        Self {
            min_lat: self.min_lat - lat_pad,
            max_lat: self.max_lat + lat_pad,
            min_lng: self.min_lng - lng_pad,
            max_lng: self.max_lng + lng_pad,
        }
    }
}

/// A message for the host to show the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Alert {
    pub title: String,
    pub body: String,
}

impl Alert {
    pub fn new(title: &str, body: &str) -> Self {
        Self { title: title.to_string(), body: body.to_string() }
    }
}

// ============================================================================
// FFI Exports (only when feature enabled)
// ============================================================================

#[cfg(feature = "ffi")]
mod ffi {
    use super::*;
    use log::{info, warn};
    use std::sync::{Arc, Mutex, MutexGuard};
    use std::time::Instant;

    type SharedGuide = TrailGuide<Box<dyn ImageStore + Send>>;

    /// Trail guide handle for the mobile shells.
    ///
    /// Every method returns the events to render.
    #[derive(uniffi::Object)]
    pub struct FfiTrailGuide {
        inner: Mutex<SharedGuide>,
    }

    impl FfiTrailGuide {
        fn guide(&self) -> MutexGuard<'_, SharedGuide> {
            match self.inner.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            }
        }
    }

    #[uniffi::export]
    impl FfiTrailGuide {
        /// Create a guide. Images are cached in the file at `image_cache_path`, or in memory.
        #[uniffi::constructor]
        pub fn new(config: GuideConfig, image_cache_path: Option<String>) -> Arc<Self> {
            init_logging();
            let config = match config.validate() {
                Ok(()) => config,
                Err(e) => {
                    warn!("[TrailGuideRust] Invalid config ({}), using defaults", e);
                    GuideConfig { application_name: config.application_name, ..GuideConfig::default() }
                }
            };
            info!("[TrailGuideRust] Creating guide for {}", config.application_name);

            let store: Box<dyn ImageStore + Send> = match image_cache_path {
                Some(path) => match FileImageStore::open(&path) {
                    Ok(store) => Box::new(store),
                    Err(e) => {
                        warn!("[TrailGuideRust] Image cache unavailable ({}), using memory", e);
                        Box::new(MemoryImageStore::new())
                    }
                },
                None => Box::new(MemoryImageStore::new()),
            };

            let location = LocationState::new(&config.application_name);
            Arc::new(Self {
                inner: Mutex::new(TrailGuide::new(config, location, ImageCache::new(store))),
            })
        }

        pub fn load_trail_file(&self, path: String) -> Vec<GuideEvent> {
            self.guide().load_trail_file(path)
        }

        pub fn load_trail_json(&self, json: String, name: String) -> Vec<GuideEvent> {
            let mut guide = self.guide();
            let loaded = Trail::from_json_str(&json, &guide.config().coordinates_path, &name);
            guide.set_trail(loaded)
        }

        pub fn on_location(&self, fix: UserLocation) -> Vec<GuideEvent> {
            self.guide().on_location(fix, Instant::now())
        }

        pub fn on_heading(&self, heading: f64) -> Vec<GuideEvent> {
            self.guide().on_heading(heading, Instant::now())
        }

        pub fn on_location_unavailable(&self) -> Vec<GuideEvent> {
            self.guide().on_location_unavailable()
        }

        pub fn on_authorization_changed(&self, status: AuthorizationStatus) -> Vec<GuideEvent> {
            self.guide().on_authorization_changed(status)
        }

        pub fn on_location_services_enabled(&self, enabled: bool) -> Vec<GuideEvent> {
            self.guide().on_location_services_enabled(enabled)
        }

        /// Apply a directory record given as JSON text. Unparseable text produces no events.
        pub fn on_poi_record(&self, kind: ChangeKind, key: String, record_json: String) -> Vec<GuideEvent> {
            match serde_json::from_str(&record_json) {
                Ok(record) => self.guide().on_poi_record(kind, &key, record),
                Err(e) => {
                    warn!("[TrailGuideRust] Invalid POI data for '{}': {}", key, e);
                    vec![]
                }
            }
        }

        pub fn on_directory_loaded(&self) -> Vec<GuideEvent> {
            self.guide().on_directory_loaded()
        }

        pub fn on_connectivity(&self, connected: bool) -> Vec<GuideEvent> {
            self.guide().on_connectivity(connected)
        }

        pub fn on_connect_timeout(&self) -> Vec<GuideEvent> {
            self.guide().on_connect_timeout()
        }

        pub fn on_annotation_tap(&self, id: String) -> Vec<GuideEvent> {
            self.guide().on_annotation_tap(&id)
        }

        pub fn on_map_interaction(&self) {
            self.guide().on_map_interaction(Instant::now())
        }

        pub fn set_heading_tracking(&self, enabled: bool) -> Vec<GuideEvent> {
            self.guide().set_heading_tracking(enabled, Instant::now())
        }

        /// Returns the card-scroll poll interval in milliseconds.
        pub fn begin_card_drag(&self) -> u64 {
            self.guide().begin_card_drag(Instant::now()).as_millis() as u64
        }

        pub fn on_card_scroll_sample(&self, sample: CardScrollSample) -> ScrollOutcome {
            self.guide().on_card_scroll_sample(sample, Instant::now())
        }

        /// Report a download: either `bytes`, or the `error` text.
        pub fn on_image_downloaded(
            &self,
            id: String,
            url: String,
            bytes: Option<Vec<u8>>,
            error: Option<String>,
        ) -> Vec<GuideEvent> {
            let fetched = bytes.ok_or_else(|| error.unwrap_or_else(|| "image data is nil".to_string()));
            self.guide().on_image_downloaded(&id, &url, fetched)
        }

        pub fn cached_image(&self, id: String) -> Option<Vec<u8>> {
            self.guide().cached_image(&id)
        }

        pub fn pois(&self) -> Vec<PointOfInterest> {
            self.guide().directory().as_slice().to_vec()
        }

        pub fn current_poi(&self) -> Option<String> {
            self.guide().current_poi().map(str::to_string)
        }

        pub fn is_on_trail(&self) -> bool {
            self.guide().is_on_trail()
        }

        pub fn trail_coordinates(&self) -> Vec<Coordinate> {
            self.guide().trail().map(|t| t.coordinates().to_vec()).unwrap_or_default()
        }

        pub fn trail_region(&self) -> Option<Bounds> {
            self.guide().trail().map(|t| t.region())
        }

        pub fn trail_midpoint(&self) -> Option<Coordinate> {
            self.guide().trail().map(|t| t.midpoint())
        }
    }

    #[cfg(feature = "http")]
    #[uniffi::export]
    impl FfiTrailGuide {
        /// Download the trail and POIs from a REST directory and apply them. Blocks the caller.
        pub fn load_from_directory(
            &self,
            base_url: String,
            trail_path: String,
            poi_path: String,
            trail_name: String,
        ) -> Vec<GuideEvent> {
            match http::fetch_snapshot_sync(&base_url, &trail_path, &poi_path, &trail_name) {
                Ok(snapshot) => snapshot.apply_to(&mut *self.guide()),
                Err(e) => {
                    warn!("[TrailGuideRust] Directory fetch failed: {}", e);
                    self.guide().on_connect_timeout()
                }
            }
        }
    }

    /// Get default configuration.
    #[uniffi::export]
    pub fn default_config() -> GuideConfig {
        init_logging();
        GuideConfig::default()
    }

    /// Parse a configuration document, falling back to defaults if it is invalid.
    #[uniffi::export]
    pub fn config_from_json(json: String) -> GuideConfig {
        init_logging();
        GuideConfig::from_json_str(&json).unwrap_or_else(|e| {
            warn!("[TrailGuideRust] Invalid config ({}), using defaults", e);
            GuideConfig::default()
        })
    }

    /// Distance from a POI at `poi` to a user at `user`, as displayed.
    #[uniffi::export]
    pub fn ffi_distance_text(poi: Coordinate, user: Option<UserLocation>) -> String {
        PoiMetrics::compute(&poi, user.as_ref()).distance_text()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_validation() {
        assert!(Coordinate::new(35.2169, -80.8327).is_valid());
        assert!(!Coordinate::new(91.0, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, 181.0).is_valid());
        assert!(!Coordinate::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_bounds() {
        assert!(Bounds::from_points(&[]).is_none());

        let bounds = Bounds::from_points(&[
            Coordinate::new(35.220, -80.830),
            Coordinate::new(35.217, -80.833),
        ])
        .unwrap();
        assert!(bounds.contains(&Coordinate::new(35.218, -80.831)));
        assert!(bounds.contains(&Coordinate::new(35.220, -80.830)));
        assert!(!bounds.contains(&Coordinate::new(35.221, -80.831)));
    }

    #[test]
    fn test_bounds_expanded_by_meters() {
        let bounds = Bounds { min_lat: 35.0, max_lat: 35.0, min_lng: -80.0, max_lng: -80.0 };
        let padded = bounds.expanded_by_meters(50.0);

        let north_edge = Coordinate::new(padded.max_lat, -80.0);
        let d = geo_utils::haversine_distance(&Coordinate::new(35.0, -80.0), &north_edge);
        assert!((d - 50.0).abs() < 0.5, "got {d}");

        let east_edge = Coordinate::new(35.0, padded.max_lng);
        let d = geo_utils::haversine_distance(&Coordinate::new(35.0, -80.0), &east_edge);
        assert!((d - 50.0).abs() < 0.5, "got {d}");
    }

    #[test]
    fn test_alert() {
        let alert = Alert::new("Title", "Body");
        assert_eq!(alert.title, "Title");
        assert_eq!(alert.body, "Body");
    }
}
