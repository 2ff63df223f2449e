//! # Trail Guide
//!
//! [`TrailGuide`] wires the trail, on-trail detector, POI directory and current-POI
//! selector together. The host feeds it platform events (location fixes, headings,
//! directory records, taps, scroll samples) and renders the [`GuideEvent`]s it returns.
//!
//! Every handler both returns its events and delivers them to subscribers, so a host
//! can use whichever style suits it.
//!
//! The guide is single-owner: all mutation goes through `&mut self` on the thread that
//! owns it. Async work (remote loading, downloads) produces values the owner applies.

use std::path::Path;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::broadcast::{Broadcaster, Subscription};
use crate::config::GuideConfig;
use crate::connection::{ConnectionEvent, ConnectionMonitor};
use crate::directory::{ChangeKind, PoiDirectory};
use crate::error::TrailError;
use crate::image_cache::{ImageCache, ImageStore, PoiImage};
use crate::location::{AuthorizationStatus, LocationState, UserLocation};
use crate::on_trail::OnTrailDetector;
use crate::selector::{
    CardScrollSample, CardScrollTracker, CurrentPoiSelector, SelectionCause, SelectionChange, SelectorSettings,
};
use crate::trail::Trail;
use crate::Alert;

/// A state change for the host to render.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum GuideEvent {
    TrailLoaded { coordinate_count: u32 },
    OnTrailChanged { is_on: bool, segment: Option<u32> },
    PoiAdded { id: String, index: u32 },
    PoiUpdated { id: String },
    PoiRemoved { id: String, index: u32 },
    SelectionChanged { change: SelectionChange },
    ConnectionChanged { event: ConnectionEvent },
    ImageReady { id: String, image: PoiImage },
    Alert { alert: Alert },
}

/// Result of one card-scroll poll.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct ScrollOutcome {
    pub events: Vec<GuideEvent>,
    /// False once the card view has stopped; the host cancels its timer
    pub keep_polling: bool,
}

/// The trail guide core.
pub struct TrailGuide<S: ImageStore> {
    config: GuideConfig,
    location: LocationState,
    images: ImageCache<S>,
    detector: Option<OnTrailDetector>,
    directory: PoiDirectory,
    selector: CurrentPoiSelector,
    card_scroll: CardScrollTracker,
    connection: ConnectionMonitor,
    listeners: Broadcaster<GuideEvent>,
}

impl<S: ImageStore> TrailGuide<S> {
    pub fn new(config: GuideConfig, location: LocationState, images: ImageCache<S>) -> Self {
        let selector = CurrentPoiSelector::new(SelectorSettings::from(&config));
        let card_scroll = CardScrollTracker::new(config.scroll_poll_interval());
        let connection = ConnectionMonitor::new(&config.application_name);

        Self {
            config,
            location,
            images,
            detector: None,
            directory: PoiDirectory::new(),
            selector,
            card_scroll,
            connection,
            listeners: Broadcaster::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn config(&self) -> &GuideConfig {
        &self.config
    }

    pub fn trail(&self) -> Option<&Trail> {
        self.detector.as_ref().map(|d| d.trail())
    }

    pub fn directory(&self) -> &PoiDirectory {
        &self.directory
    }

    pub fn location(&self) -> &LocationState {
        &self.location
    }

    pub fn current_poi(&self) -> Option<&str> {
        self.selector.current()
    }

    pub fn is_on_trail(&self) -> bool {
        self.detector.as_ref().map(|d| d.is_on()).unwrap_or(false)
    }

    pub fn current_segment(&self) -> Option<usize> {
        self.detector.as_ref().and_then(|d| d.current_segment())
    }

    pub fn heading_tracking(&self) -> bool {
        self.selector.heading_tracking()
    }

    pub fn subscribe<F>(&mut self, listener: F) -> Subscription
    where
        F: FnMut(&GuideEvent) + Send + 'static,
    {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        self.listeners.unsubscribe(subscription)
    }

    // ------------------------------------------------------------------------
    // Trail
    // ------------------------------------------------------------------------

    /// Install the outcome of a trail load.
    ///
    /// A failed load raises one alert and leaves the guide without a trail, which
    /// disables on-trail detection.
    pub fn set_trail(&mut self, loaded: Result<Trail, TrailError>) -> Vec<GuideEvent> {
        let trail = match loaded {
            Ok(trail) => trail.with_region_margin(self.config.region_margin_meters),
            Err(e) => {
                warn!("[TrailGuide] Trail load failed: {}", e);
                self.detector = None;
                let alert = Alert::new(
                    &format!("{} Error", self.config.application_name),
                    &format!("The map data needed to plot the trail could not be obtained. Reason: {}", e),
                );
                return self.emit(vec![GuideEvent::Alert { alert }]);
            }
        };

        info!("[TrailGuide] Trail '{}' installed ({} coordinates)", trail.name(), trail.len());
        let mut events = vec![GuideEvent::TrailLoaded { coordinate_count: trail.len() as u32 }];

        let mut detector = OnTrailDetector::new(
            trail,
            self.config.lateral_tolerance_yards,
            self.config.detection_method,
        )
        .with_max_accuracy(self.config.max_horizontal_accuracy_meters);

        let current = self.location.current();
        if let Some(change) = detector.update(current.as_ref()) {
            events.push(GuideEvent::OnTrailChanged { is_on: change.is_on, segment: change.segment });
        }
        self.detector = Some(detector);

        self.emit(events)
    }

    /// Load a bundled trail file and install it.
    pub fn load_trail_file(&mut self, path: impl AsRef<Path>) -> Vec<GuideEvent> {
        let loaded = Trail::load_from_file(path, &self.config.coordinates_path);
        self.set_trail(loaded)
    }

    // ------------------------------------------------------------------------
    // Location
    // ------------------------------------------------------------------------

    /// A new location fix.
    pub fn on_location(&mut self, fix: UserLocation, now: Instant) -> Vec<GuideEvent> {
        self.location.update_location(fix);
        let mut events = self.refresh_tracking();

        // Every fix counts until the initial selection is made; the first one may
        // have been lost before the directory finished loading.
        if !self.selector.is_initialized() {
            let user = self.location.current();
            if let Some(change) = self.selector.mark_location_observed(&self.directory, user.as_ref()) {
                events.push(GuideEvent::SelectionChanged { change });
            }
        }

        events.extend(self.auto_advance(now));
        self.emit(events)
    }

    /// A new true heading, in degrees.
    pub fn on_heading(&mut self, heading: f64, now: Instant) -> Vec<GuideEvent> {
        self.location.update_heading(heading);
        let user = self.location.current();
        let mut events: Vec<GuideEvent> = self
            .directory
            .refresh_metrics(user.as_ref())
            .into_iter()
            .map(|id| GuideEvent::PoiUpdated { id })
            .collect();
        events.extend(self.auto_advance(now));
        self.emit(events)
    }

    /// The location service lost its fix.
    pub fn on_location_unavailable(&mut self) -> Vec<GuideEvent> {
        self.location.clear_location();
        let events = self.refresh_tracking();
        self.emit(events)
    }

    pub fn on_authorization_changed(&mut self, status: AuthorizationStatus) -> Vec<GuideEvent> {
        let mut events = Vec::new();
        if let Some(alert) = self.location.set_authorization(status) {
            events.push(GuideEvent::Alert { alert });
            events.extend(self.refresh_tracking());
        }
        self.emit(events)
    }

    pub fn on_location_services_enabled(&mut self, enabled: bool) -> Vec<GuideEvent> {
        let mut events = Vec::new();
        if let Some(alert) = self.location.set_services_enabled(enabled) {
            events.push(GuideEvent::Alert { alert });
            events.extend(self.refresh_tracking());
        }
        self.emit(events)
    }

    /// Recompute POI metrics and on-trail state from the current location.
    fn refresh_tracking(&mut self) -> Vec<GuideEvent> {
        let user = self.location.current();

        let mut events: Vec<GuideEvent> = self
            .directory
            .refresh_metrics(user.as_ref())
            .into_iter()
            .map(|id| GuideEvent::PoiUpdated { id })
            .collect();

        if let Some(change) = self.detector.as_mut().and_then(|d| d.update(user.as_ref())) {
            events.push(GuideEvent::OnTrailChanged { is_on: change.is_on, segment: change.segment });
        }
        events
    }

    // ------------------------------------------------------------------------
    // Directory
    // ------------------------------------------------------------------------

    /// A record added, updated or removed in the remote directory.
    ///
    /// Invalid records are logged and produce no events.
    pub fn on_poi_record(&mut self, kind: ChangeKind, key: &str, record: serde_json::Value) -> Vec<GuideEvent> {
        let user = self.location.current();
        let change = match self.directory.apply(kind, key, record, user.as_ref()) {
            Ok(change) => change,
            Err(e) => {
                debug!("[TrailGuide] Skipping record '{}': {}", key, e);
                return vec![];
            }
        };

        let mut events = Vec::new();
        match change.kind {
            ChangeKind::Added => {
                events.push(GuideEvent::PoiAdded { id: change.id, index: change.index as u32 });
                // The directory may have finished loading empty
                if let Some(change) = self.selector.retry_initialization(&self.directory, user.as_ref()) {
                    events.push(GuideEvent::SelectionChanged { change });
                }
            }
            ChangeKind::Updated => events.push(GuideEvent::PoiUpdated { id: change.id }),
            ChangeKind::Removed => {
                if let Err(e) = self.images.evict(&change.id) {
                    warn!("[TrailGuide] Could not evict image for '{}': {}", change.id, e);
                }
                let selection = self.selector.handle_removed(&change.id, &self.directory);
                events.push(GuideEvent::PoiRemoved { id: change.id, index: change.index as u32 });
                if let Some(change) = selection {
                    events.push(GuideEvent::SelectionChanged { change });
                }
            }
        }
        self.emit(events)
    }

    /// The remote directory finished delivering its initial records.
    pub fn on_directory_loaded(&mut self) -> Vec<GuideEvent> {
        self.directory.mark_loaded();
        let user = self.location.current();
        let events = self
            .selector
            .mark_directory_loaded(&self.directory, user.as_ref())
            .map(|change| vec![GuideEvent::SelectionChanged { change }])
            .unwrap_or_default();
        self.emit(events)
    }

    /// A connectivity report from the remote directory.
    pub fn on_connectivity(&mut self, connected: bool) -> Vec<GuideEvent> {
        let event = self.connection.observe(connected);
        let events = self.connection_events(event);
        self.emit(events)
    }

    /// The host's connect timer fired.
    pub fn on_connect_timeout(&mut self) -> Vec<GuideEvent> {
        let event = self.connection.connect_timeout_elapsed();
        let events = self.connection_events(event);
        self.emit(events)
    }

    fn connection_events(&self, event: Option<ConnectionEvent>) -> Vec<GuideEvent> {
        let Some(event) = event else {
            return vec![];
        };
        let mut events = vec![GuideEvent::ConnectionChanged { event }];
        if let Some(alert) = self.connection.alert_for(event) {
            events.push(GuideEvent::Alert { alert });
        }
        events
    }

    // ------------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------------

    /// The user tapped a POI annotation on the map.
    pub fn on_annotation_tap(&mut self, id: &str) -> Vec<GuideEvent> {
        let events = self
            .selector
            .set_current(Some(id), SelectionCause::AnnotationTap, &self.directory)
            .map(|change| vec![GuideEvent::SelectionChanged { change }])
            .unwrap_or_default();
        self.emit(events)
    }

    /// The user touched the map; auto advance pauses for the interaction timeout.
    pub fn on_map_interaction(&mut self, now: Instant) {
        self.selector.note_interaction(now);
    }

    pub fn set_heading_tracking(&mut self, enabled: bool, now: Instant) -> Vec<GuideEvent> {
        self.selector.set_heading_tracking(enabled);
        let events = self.auto_advance(now);
        self.emit(events)
    }

    /// The user started dragging the card view. Returns the poll interval for the host timer.
    pub fn begin_card_drag(&mut self, now: Instant) -> Duration {
        self.selector.note_interaction(now);
        self.card_scroll.begin_drag()
    }

    /// One sample from the host's card-scroll timer.
    pub fn on_card_scroll_sample(&mut self, sample: CardScrollSample, now: Instant) -> ScrollOutcome {
        let poll = self.card_scroll.poll(sample, &self.directory);
        if poll.keep_polling {
            self.selector.note_interaction(now);
        }

        let events = match poll.centered {
            Some(id) => self
                .selector
                .set_current(Some(&id), SelectionCause::CardSettle, &self.directory)
                .map(|change| vec![GuideEvent::SelectionChanged { change }])
                .unwrap_or_default(),
            None => vec![],
        };

        ScrollOutcome { events: self.emit(events), keep_polling: poll.keep_polling }
    }

    fn auto_advance(&mut self, now: Instant) -> Vec<GuideEvent> {
        let on_trail = self.is_on_trail();
        self.selector
            .auto_advance(&self.directory, on_trail, now)
            .map(|change| vec![GuideEvent::SelectionChanged { change }])
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------------
    // Images
    // ------------------------------------------------------------------------

    /// Cached image for a POI, if it matches the POI's current image URL.
    pub fn cached_image(&self, id: &str) -> Option<Vec<u8>> {
        let poi = self.directory.get(id)?;
        self.images.cached_for(id, &poi.image_url)
    }

    /// Apply the outcome of an image download for `id`.
    pub fn on_image_downloaded<E: std::fmt::Display>(
        &mut self,
        id: &str,
        url: &str,
        fetched: Result<Vec<u8>, E>,
    ) -> Vec<GuideEvent> {
        let image = self.images.resolve(id, url, fetched);
        self.emit(vec![GuideEvent::ImageReady { id: id.to_string(), image }])
    }

    fn emit(&mut self, events: Vec<GuideEvent>) -> Vec<GuideEvent> {
        for event in &events {
            self.listeners.broadcast(event);
        }
        events
    }
}

// ============================================================================
// Tests
// ============================================================================
