//! # Current-POI Selection
//!
//! At most one POI is "current": highlighted on the map and centred in the card view.
//! It changes in four ways:
//!
//! 1. **Initial** - once the directory has loaded *and* the first location fix has
//!    arrived, the POI closest to the user becomes current. Nothing is selected
//!    automatically before both have happened.
//! 2. **Annotation tap** - the tapped POI becomes current; the map recentres and the
//!    card view scrolls to its card.
//! 3. **Card settle** - while the card view scrolls, the centred card is sampled at a
//!    fixed interval and its POI becomes current; the map recentres.
//! 4. **Auto advance** - with heading tracking on and the user on the trail, the POI
//!    the user is walking toward becomes current, unless the user touched the map
//!    within the interaction timeout.
//!
//! Assigning the POI that is already current is a no-op, so repeated triggers never
//! produce redundant highlight changes.

use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::GuideConfig;
use crate::directory::PoiDirectory;
use crate::location::UserLocation;
use crate::poi::PointOfInterest;

/// Heuristic used by auto advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum SelectionStrategy {
    /// The POI with the smallest absolute angle from the heading
    SmallestAngle,
    /// The closest POI inside the forward cone
    ClosestInFront,
}

/// What made the current POI change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum SelectionCause {
    Initial,
    AnnotationTap,
    CardSettle,
    AutoAdvance,
    PoiRemoved,
}

/// A change of current POI, with the view effects it calls for.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct SelectionChange {
    /// Revert highlight on this POI
    pub previous: Option<String>,
    /// Highlight this POI
    pub current: Option<String>,
    pub cause: SelectionCause,
    /// Recentre the map on the new current POI
    pub recenter_map: bool,
    /// Scroll the card view to centre this card
    pub scroll_to_card: Option<u32>,
}

/// Selector tunables, taken from [`GuideConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectorSettings {
    pub strategy: SelectionStrategy,
    pub half_cone_degrees: f64,
    pub restrict_to_cone: bool,
    pub interaction_timeout: Duration,
    pub recenter_map_on_auto: bool,
}

impl Default for SelectorSettings {
    fn default() -> Self {
        Self::from(&GuideConfig::default())
    }
}

impl From<&GuideConfig> for SelectorSettings {
    fn from(config: &GuideConfig) -> Self {
        Self {
            strategy: config.selection_strategy,
            half_cone_degrees: config.half_cone_degrees(),
            restrict_to_cone: config.restrict_to_cone,
            interaction_timeout: config.interaction_timeout(),
            recenter_map_on_auto: config.recenter_map_on_auto,
        }
    }
}

// ============================================================================
// Selector
// ============================================================================

/// Owns the current POI id and the rules for changing it.
#[derive(Debug, Clone)]
pub struct CurrentPoiSelector {
    settings: SelectorSettings,
    current: Option<String>,
    directory_loaded: bool,
    location_observed: bool,
    initialized: bool,
    heading_tracking: bool,
    last_interaction: Option<Instant>,
}

impl CurrentPoiSelector {
    pub fn new(settings: SelectorSettings) -> Self {
        Self {
            settings,
            current: None,
            directory_loaded: false,
            location_observed: false,
            initialized: false,
            heading_tracking: false,
            last_interaction: None,
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn settings(&self) -> &SelectorSettings {
        &self.settings
    }

    /// Both initialization gates have passed and a POI has been chosen.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn heading_tracking(&self) -> bool {
        self.heading_tracking
    }

    pub fn set_heading_tracking(&mut self, enabled: bool) {
        if self.heading_tracking != enabled {
            debug!("[Selector] Heading tracking {}", if enabled { "on" } else { "off" });
        }
        self.heading_tracking = enabled;
    }

    /// Make `id` current. Returns `None` if it already is, or if `id` is unknown.
    pub fn set_current(
        &mut self,
        id: Option<&str>,
        cause: SelectionCause,
        directory: &PoiDirectory,
    ) -> Option<SelectionChange> {
        if self.current.as_deref() == id {
            return None;
        }

        let index = match id {
            Some(id) => match directory.index_of(id) {
                Some(index) => Some(index),
                None => {
                    warn!("[Selector] Ignoring selection of unknown POI '{}'", id);
                    return None;
                }
            },
            None => None,
        };

        let previous = std::mem::replace(&mut self.current, id.map(str::to_string));
        let (recenter_map, scroll_to_card) = match cause {
            SelectionCause::AnnotationTap | SelectionCause::Initial => (index.is_some(), index),
            SelectionCause::CardSettle => (index.is_some(), None),
            SelectionCause::AutoAdvance => (index.is_some() && self.settings.recenter_map_on_auto, index),
            SelectionCause::PoiRemoved => (false, None),
        };

        info!("[Selector] Current POI {:?} -> {:?} ({:?})", previous, self.current, cause);

        Some(SelectionChange {
            previous,
            current: self.current.clone(),
            cause,
            recenter_map,
            scroll_to_card: scroll_to_card.map(|i| i as u32),
        })
    }

    /// Record that the directory finished its initial load.
    pub fn mark_directory_loaded(
        &mut self,
        directory: &PoiDirectory,
        user: Option<&UserLocation>,
    ) -> Option<SelectionChange> {
        self.directory_loaded = true;
        self.try_initialize(directory, user)
    }

    /// Record that a location fix has been observed.
    pub fn mark_location_observed(
        &mut self,
        directory: &PoiDirectory,
        user: Option<&UserLocation>,
    ) -> Option<SelectionChange> {
        self.location_observed = true;
        self.try_initialize(directory, user)
    }

    /// Retry the initial selection after the directory or the location changed.
    ///
    /// Initialization completes only once a POI is current, so a lost fix or an
    /// empty directory defers it rather than ending it.
    pub fn retry_initialization(
        &mut self,
        directory: &PoiDirectory,
        user: Option<&UserLocation>,
    ) -> Option<SelectionChange> {
        self.try_initialize(directory, user)
    }

    fn try_initialize(&mut self, directory: &PoiDirectory, user: Option<&UserLocation>) -> Option<SelectionChange> {
        if self.initialized || !self.directory_loaded || !self.location_observed {
            return None;
        }
        if self.current.is_some() {
            // The user picked a POI before the gates passed
            self.initialized = true;
            return None;
        }

        let user = user?;
        let closest = directory.closest_to(&user.coordinate)?.id.clone();
        debug!("[Selector] Initialization gates passed; closest POI is {}", closest);
        self.initialized = true;
        self.set_current(Some(&closest), SelectionCause::Initial, directory)
    }

    /// Reset the current POI if `removed_id` was it. Call after removing from the directory.
    pub fn handle_removed(&mut self, removed_id: &str, directory: &PoiDirectory) -> Option<SelectionChange> {
        if self.current.as_deref() != Some(removed_id) {
            return None;
        }
        self.set_current(None, SelectionCause::PoiRemoved, directory)
    }

    /// Record a map interaction, pausing auto advance.
    pub fn note_interaction(&mut self, now: Instant) {
        self.last_interaction = Some(now);
    }

    /// True while a recent interaction is pausing auto advance.
    pub fn interaction_active(&self, now: Instant) -> bool {
        self.last_interaction
            .map(|t| now.saturating_duration_since(t) <= self.settings.interaction_timeout)
            .unwrap_or(false)
    }

    /// Advance to the POI the user is walking toward, if the conditions allow.
    ///
    /// Keeps the current POI when no candidate qualifies.
    pub fn auto_advance(
        &mut self,
        directory: &PoiDirectory,
        user_is_on_trail: bool,
        now: Instant,
    ) -> Option<SelectionChange> {
        if !self.heading_tracking || !user_is_on_trail || !self.initialized || self.interaction_active(now) {
            return None;
        }

        let candidate = self.candidate(directory)?.id.clone();
        self.set_current(Some(&candidate), SelectionCause::AutoAdvance, directory)
    }

    /// The POI auto advance would choose, ignoring the trigger conditions.
    pub fn candidate<'a>(&self, directory: &'a PoiDirectory) -> Option<&'a PointOfInterest> {
        let half_cone = self.settings.half_cone_degrees;

        match self.settings.strategy {
            SelectionStrategy::SmallestAngle => directory
                .iter()
                .filter_map(|p| p.metrics.signed_angle().map(|a| (p, a.abs())))
                .filter(|(_, a)| !self.settings.restrict_to_cone || *a <= half_cone)
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(p, _)| p),
            SelectionStrategy::ClosestInFront => directory
                .iter()
                // Without a heading there is no cone, so every POI is in front
                .filter(|p| p.metrics.angle_with_heading.is_none() || p.metrics.in_cone(half_cone))
                .filter_map(|p| p.metrics.distance_yards.map(|d| (p, d)))
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(p, _)| p),
        }
    }
}

// ============================================================================
// Card Scroll Tracking
// ============================================================================

/// A sample of the card view taken by the host's scroll timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct CardScrollSample {
    /// Index of the card under the view's centre, if any
    pub centered_index: Option<u32>,
    pub is_dragging: bool,
    pub is_decelerating: bool,
}

/// Outcome of one scroll poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollPoll {
    /// POI under the centre of the card view
    pub centered: Option<String>,
    /// False once scrolling has stopped; the host should cancel its timer
    pub keep_polling: bool,
}

/// Follows a card-view scroll gesture until it settles.
#[derive(Debug, Clone)]
pub struct CardScrollTracker {
    interval: Duration,
    active: bool,
}

impl CardScrollTracker {
    pub fn new(interval: Duration) -> Self {
        Self { interval, active: false }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Start tracking a drag. Returns the interval at which the host should poll.
    pub fn begin_drag(&mut self) -> Duration {
        self.active = true;
        self.interval
    }

    /// Take one sample.
    pub fn poll(&mut self, sample: CardScrollSample, directory: &PoiDirectory) -> ScrollPoll {
        if !self.active {
            return ScrollPoll { centered: None, keep_polling: false };
        }

        let centered = sample
            .centered_index
            .and_then(|i| directory.at(i as usize))
            .map(|p| p.id.clone());

        let keep_polling = sample.is_dragging || sample.is_decelerating;
        if !keep_polling {
            self.active = false;
            debug!("[Selector] Card scroll settled on {:?}", centered);
        }

        ScrollPoll { centered, keep_polling }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::ChangeKind;
    use crate::geo_utils::destination;
    use crate::Coordinate;
    use serde_json::json;

    const USER: Coordinate = Coordinate { latitude: 35.2169, longitude: -80.8327 };

    fn record_at(uid: &str, location: Coordinate) -> serde_json::Value {
        json!({
            "uid": uid,
            "name": uid,
            "latitude": location.latitude,
            "longitude": location.longitude,
            "description": "",
            "imageUrl": "https://example.com/poi.jpg"
        })
    }

    /// A directory with POIs at (id, angle from north, meters) around USER.
    fn directory_around(pois: &[(&str, f64, f64)], heading: f64) -> (PoiDirectory, UserLocation) {
        let user = UserLocation::new(USER, 5.0).with_heading(heading);
        let mut directory = PoiDirectory::new();
        for (id, bearing, meters) in pois {
            let at = destination(&USER, *bearing, *meters);
            directory.apply(ChangeKind::Added, id, record_at(id, at), Some(&user)).unwrap();
        }
        (directory, user)
    }

    fn ready_selector(settings: SelectorSettings, directory: &PoiDirectory, user: &UserLocation) -> CurrentPoiSelector {
        let mut selector = CurrentPoiSelector::new(settings);
        selector.mark_directory_loaded(directory, Some(user));
        selector.mark_location_observed(directory, Some(user));
        selector.set_heading_tracking(true);
        selector
    }

    #[test]
    fn test_set_current_is_idempotent() {
        let (directory, _) = directory_around(&[("a", 0.0, 100.0), ("b", 90.0, 100.0)], 0.0);
        let mut selector = CurrentPoiSelector::new(SelectorSettings::default());

        let change = selector.set_current(Some("a"), SelectionCause::AnnotationTap, &directory).unwrap();
        assert_eq!(change.previous, None);
        assert_eq!(change.current.as_deref(), Some("a"));
        assert!(change.recenter_map);
        assert_eq!(change.scroll_to_card, directory.index_of("a").map(|i| i as u32));

        assert!(selector.set_current(Some("a"), SelectionCause::AnnotationTap, &directory).is_none());
        assert!(selector.set_current(Some("a"), SelectionCause::CardSettle, &directory).is_none());

        let change = selector.set_current(Some("b"), SelectionCause::CardSettle, &directory).unwrap();
        assert_eq!(change.previous.as_deref(), Some("a"));
        assert_eq!(change.scroll_to_card, None);
    }

    #[test]
    fn test_unknown_poi_is_ignored() {
        let (directory, _) = directory_around(&[("a", 0.0, 100.0)], 0.0);
        let mut selector = CurrentPoiSelector::new(SelectorSettings::default());
        assert!(selector.set_current(Some("zzz"), SelectionCause::AnnotationTap, &directory).is_none());
        assert_eq!(selector.current(), None);
    }

    #[test]
    fn test_initialization_needs_both_gates() {
        let (directory, user) = directory_around(&[("far", 0.0, 300.0), ("near", 180.0, 50.0)], 0.0);
        let mut selector = CurrentPoiSelector::new(SelectorSettings::default());

        assert!(selector.mark_location_observed(&directory, Some(&user)).is_none());
        assert!(!selector.is_initialized());

        let change = selector.mark_directory_loaded(&directory, Some(&user)).unwrap();
        assert_eq!(change.cause, SelectionCause::Initial);
        assert_eq!(change.current.as_deref(), Some("near"));
        assert!(selector.is_initialized());

        // Gates only fire once
        assert!(selector.mark_directory_loaded(&directory, Some(&user)).is_none());
    }

    #[test]
    fn test_initialization_deferred_without_location() {
        let (directory, user) = directory_around(&[("far", 0.0, 300.0), ("near", 180.0, 50.0)], 0.0);
        let mut selector = CurrentPoiSelector::new(SelectorSettings::default());

        assert!(selector.mark_location_observed(&directory, Some(&user)).is_none());
        // Fix lost before the directory finished
        assert!(selector.mark_directory_loaded(&directory, None).is_none());
        assert!(!selector.is_initialized());

        let change = selector.retry_initialization(&directory, Some(&user)).unwrap();
        assert_eq!(change.cause, SelectionCause::Initial);
        assert_eq!(change.current.as_deref(), Some("near"));
        assert!(selector.is_initialized());
    }

    #[test]
    fn test_initialization_deferred_while_directory_empty() {
        let user = UserLocation::new(USER, 5.0).with_heading(0.0);
        let mut selector = CurrentPoiSelector::new(SelectorSettings::default());
        let empty = PoiDirectory::new();

        assert!(selector.mark_directory_loaded(&empty, Some(&user)).is_none());
        assert!(selector.mark_location_observed(&empty, Some(&user)).is_none());
        assert!(!selector.is_initialized());

        let (directory, user) = directory_around(&[("late", 90.0, 80.0)], 0.0);
        let change = selector.retry_initialization(&directory, Some(&user)).unwrap();
        assert_eq!(change.current.as_deref(), Some("late"));
        assert!(selector.is_initialized());
    }

    #[test]
    fn test_tap_before_initialization_is_kept() {
        let (directory, user) = directory_around(&[("far", 0.0, 300.0), ("near", 180.0, 50.0)], 0.0);
        let mut selector = CurrentPoiSelector::new(SelectorSettings::default());

        selector.set_current(Some("far"), SelectionCause::AnnotationTap, &directory).unwrap();
        assert!(selector.mark_directory_loaded(&directory, Some(&user)).is_none());
        assert!(selector.mark_location_observed(&directory, Some(&user)).is_none());
        assert!(selector.is_initialized());
        assert_eq!(selector.current(), Some("far"));
    }

    #[test]
    fn test_no_auto_advance_before_initialization() {
        let (directory, _) = directory_around(&[("a", 0.0, 100.0)], 0.0);
        let mut selector = CurrentPoiSelector::new(SelectorSettings::default());
        selector.set_heading_tracking(true);
        assert!(selector.auto_advance(&directory, true, Instant::now()).is_none());
        assert_eq!(selector.current(), None);
    }

    #[test]
    fn test_closest_in_front_within_cone() {
        // +10 degrees far away, -30 degrees closer
        let (directory, user) = directory_around(&[("plus10", 10.0, 200.0), ("minus30", 330.0, 100.0), ("behind", 180.0, 20.0)], 0.0);
        let mut selector = ready_selector(SelectorSettings::default(), &directory, &user);
        selector.set_current(Some("behind"), SelectionCause::AnnotationTap, &directory);

        let change = selector.auto_advance(&directory, true, Instant::now()).unwrap();
        assert_eq!(change.cause, SelectionCause::AutoAdvance);
        assert_eq!(change.current.as_deref(), Some("minus30"));
    }

    #[test]
    fn test_closest_in_front_outside_narrow_cone() {
        let (directory, user) = directory_around(&[("plus10", 10.0, 200.0), ("minus30", 330.0, 100.0), ("behind", 180.0, 20.0)], 0.0);
        let settings = SelectorSettings { half_cone_degrees: 20.0, ..SelectorSettings::default() };
        let mut selector = ready_selector(settings, &directory, &user);

        let change = selector.auto_advance(&directory, true, Instant::now()).unwrap();
        assert_eq!(change.current.as_deref(), Some("plus10"));
    }

    #[test]
    fn test_smallest_angle_strategy() {
        let (directory, user) = directory_around(&[("plus10", 10.0, 200.0), ("minus30", 330.0, 100.0)], 0.0);
        let settings = SelectorSettings { strategy: SelectionStrategy::SmallestAngle, ..SelectorSettings::default() };
        let selector = ready_selector(settings, &directory, &user);
        assert_eq!(selector.candidate(&directory).unwrap().id, "plus10");

        // Everything behind: nothing qualifies inside the cone
        let (behind, user) = directory_around(&[("b1", 170.0, 100.0), ("b2", 200.0, 100.0)], 0.0);
        let selector = ready_selector(settings, &behind, &user);
        assert!(selector.candidate(&behind).is_none());

        let unrestricted = SelectorSettings { restrict_to_cone: false, ..settings };
        let selector = ready_selector(unrestricted, &behind, &user);
        // b2 is 160 degrees counter-clockwise, b1 170 clockwise
        assert_eq!(selector.candidate(&behind).unwrap().id, "b2");
    }

    #[test]
    fn test_angle_near_north_counts_as_in_front() {
        // Heading 350: a POI at bearing 20 is 30 degrees clockwise
        let (directory, user) = directory_around(&[("across-north", 20.0, 100.0), ("behind", 170.0, 50.0)], 350.0);
        let selector = ready_selector(SelectorSettings::default(), &directory, &user);
        assert_eq!(selector.candidate(&directory).unwrap().id, "across-north");
    }

    #[test]
    fn test_no_candidate_keeps_current() {
        let (directory, user) = directory_around(&[("b1", 170.0, 100.0), ("b2", 200.0, 50.0)], 0.0);
        let mut selector = ready_selector(SelectorSettings::default(), &directory, &user);
        let initial = selector.current().map(str::to_string);
        assert_eq!(initial.as_deref(), Some("b2"));

        assert!(selector.auto_advance(&directory, true, Instant::now()).is_none());
        assert_eq!(selector.current().map(str::to_string), initial);
    }

    #[test]
    fn test_auto_advance_conditions() {
        let (directory, user) = directory_around(&[("ahead", 0.0, 100.0), ("behind", 180.0, 10.0)], 0.0);
        let mut selector = ready_selector(SelectorSettings::default(), &directory, &user);
        assert_eq!(selector.current(), Some("behind"));
        let now = Instant::now();

        // Off trail
        assert!(selector.auto_advance(&directory, false, now).is_none());

        // Heading tracking off
        selector.set_heading_tracking(false);
        assert!(selector.auto_advance(&directory, true, now).is_none());
        selector.set_heading_tracking(true);

        // Recent interaction
        selector.note_interaction(now);
        assert!(selector.interaction_active(now + Duration::from_secs(2)));
        assert!(selector.auto_advance(&directory, true, now + Duration::from_secs(2)).is_none());

        let later = now + Duration::from_secs(4);
        assert!(!selector.interaction_active(later));
        let change = selector.auto_advance(&directory, true, later).unwrap();
        assert_eq!(change.current.as_deref(), Some("ahead"));
        assert!(change.recenter_map);

        // Already current
        assert!(selector.auto_advance(&directory, true, later).is_none());
    }

    #[test]
    fn test_removed_current_resets_to_none() {
        let (mut directory, _) = directory_around(&[("a", 0.0, 100.0), ("b", 90.0, 100.0)], 0.0);
        let mut selector = CurrentPoiSelector::new(SelectorSettings::default());
        selector.set_current(Some("a"), SelectionCause::AnnotationTap, &directory);

        directory.remove("b").unwrap();
        assert!(selector.handle_removed("b", &directory).is_none());

        directory.remove("a").unwrap();
        let change = selector.handle_removed("a", &directory).unwrap();
        assert_eq!(change.previous.as_deref(), Some("a"));
        assert_eq!(change.current, None);
        assert_eq!(change.cause, SelectionCause::PoiRemoved);
        assert_eq!(selector.current(), None);
    }

    #[test]
    fn test_card_scroll_tracker() {
        let (directory, _) = directory_around(&[("north", 0.0, 100.0), ("south", 180.0, 100.0)], 0.0);
        let mut tracker = CardScrollTracker::new(Duration::from_millis(250));

        // Not started
        let idle = tracker.poll(CardScrollSample { centered_index: Some(0), is_dragging: true, is_decelerating: false }, &directory);
        assert_eq!(idle, ScrollPoll { centered: None, keep_polling: false });

        assert_eq!(tracker.begin_drag(), Duration::from_millis(250));
        let first = tracker.poll(CardScrollSample { centered_index: Some(0), is_dragging: true, is_decelerating: false }, &directory);
        assert_eq!(first.centered.as_deref(), Some("north"));
        assert!(first.keep_polling);

        let between = tracker.poll(CardScrollSample { centered_index: None, is_dragging: false, is_decelerating: true }, &directory);
        assert_eq!(between.centered, None);
        assert!(between.keep_polling);

        let settled = tracker.poll(CardScrollSample { centered_index: Some(1), is_dragging: false, is_decelerating: false }, &directory);
        assert_eq!(settled.centered.as_deref(), Some("south"));
        assert!(!settled.keep_polling);
        assert!(!tracker.is_active());
    }
}
