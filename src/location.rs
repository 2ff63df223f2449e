//! User location, heading and location-authorization state.
//!
//! The platform location service pushes fixes, headings and authorization changes
//! into a [`LocationState`]; everything else reads from it.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{Alert, Coordinate};

/// A location fix from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct UserLocation {
    pub coordinate: Coordinate,
    /// Radius of uncertainty in meters; negative means the fix is invalid
    pub horizontal_accuracy: f64,
    /// True heading in degrees, if known
    pub heading: Option<f64>,
}

impl UserLocation {
    pub fn new(coordinate: Coordinate, horizontal_accuracy: f64) -> Self {
        Self { coordinate, horizontal_accuracy, heading: None }
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    /// A valid coordinate with a non-negative accuracy no worse than `max_accuracy_m`.
    pub fn is_accurate(&self, max_accuracy_m: f64) -> bool {
        self.coordinate.is_valid()
            && self.horizontal_accuracy >= 0.0
            && self.horizontal_accuracy <= max_accuracy_m
    }
}

/// Location authorization as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum AuthorizationStatus {
    NotDetermined,
    Restricted,
    Denied,
    AuthorizedWhenInUse,
    AuthorizedAlways,
}

impl AuthorizationStatus {
    pub fn is_authorized(self) -> bool {
        matches!(self, Self::AuthorizedWhenInUse | Self::AuthorizedAlways)
    }
}

/// Latest known user location plus authorization status.
#[derive(Debug, Clone)]
pub struct LocationState {
    application_name: String,
    current: Option<UserLocation>,
    heading: Option<f64>,
    authorization: AuthorizationStatus,
    services_enabled: bool,
    first_fix_observed: bool,
}

impl LocationState {
    pub fn new(application_name: &str) -> Self {
        Self {
            application_name: application_name.to_string(),
            current: None,
            heading: None,
            authorization: AuthorizationStatus::NotDetermined,
            services_enabled: true,
            first_fix_observed: false,
        }
    }

    /// Latest fix, carrying the latest heading if the fix had none of its own.
    pub fn current(&self) -> Option<UserLocation> {
        self.current.map(|mut l| {
            if l.heading.is_none() {
                l.heading = self.heading;
            }
            l
        })
    }

    pub fn heading(&self) -> Option<f64> {
        self.heading
    }

    pub fn authorization(&self) -> AuthorizationStatus {
        self.authorization
    }

    pub fn first_fix_observed(&self) -> bool {
        self.first_fix_observed
    }

    /// Record a new fix. Returns true if this is the first fix ever observed.
    pub fn update_location(&mut self, location: UserLocation) -> bool {
        if let Some(h) = location.heading {
            self.heading = Some(h);
        }
        self.current = Some(location);

        if self.first_fix_observed {
            return false;
        }
        self.first_fix_observed = true;
        info!(
            "[Location] First fix at ({:.5}, {:.5}) +/- {:.1}m",
            location.coordinate.latitude, location.coordinate.longitude, location.horizontal_accuracy
        );
        true
    }

    /// Record a heading update. Invalid (negative or non-finite) headings clear it.
    pub fn update_heading(&mut self, heading: f64) {
        if heading.is_finite() && heading >= 0.0 {
            self.heading = Some(crate::geo_utils::normalize_degrees(heading));
        } else {
            debug!("[Location] Discarding invalid heading {}", heading);
            self.heading = None;
        }
    }

    /// Forget the current fix, e.g. when the location service reports an error.
    pub fn clear_location(&mut self) {
        self.current = None;
    }

    /// Record that location services are switched off device-wide.
    pub fn set_services_enabled(&mut self, enabled: bool) -> Option<Alert> {
        let was_enabled = self.services_enabled;
        self.services_enabled = enabled;
        if enabled || !was_enabled {
            return None;
        }

        warn!("[Location] Location services are disabled");
        self.current = None;
        Some(Alert::new(
            "Location Services Needed",
            &format!(
                "Please enable location services so that {} can show you where you are on the trail and what the distances to the points of interest are.",
                self.application_name
            ),
        ))
    }

    /// Record an authorization change, returning an alert when access was refused.
    pub fn set_authorization(&mut self, status: AuthorizationStatus) -> Option<Alert> {
        let previous = self.authorization;
        self.authorization = status;
        if status == previous {
            return None;
        }

        info!("[Location] Authorization changed {:?} -> {:?}", previous, status);
        match status {
            AuthorizationStatus::NotDetermined
            | AuthorizationStatus::AuthorizedWhenInUse
            | AuthorizationStatus::AuthorizedAlways => None,
            AuthorizationStatus::Restricted | AuthorizationStatus::Denied => {
                self.current = None;
                Some(Alert::new(
                    "Location Access Not Authorized",
                    &format!(
                        "{} will not be able show you the distance to the points of interest. You can change the authorization in Settings",
                        self.application_name
                    ),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accuracy_check() {
        let c = Coordinate::new(35.2169, -80.8327);
        assert!(UserLocation::new(c, 5.0).is_accurate(20.0));
        assert!(UserLocation::new(c, 20.0).is_accurate(20.0));
        assert!(!UserLocation::new(c, 20.5).is_accurate(20.0));
        assert!(!UserLocation::new(c, -1.0).is_accurate(20.0));
        assert!(!UserLocation::new(Coordinate::new(f64::NAN, 0.0), 5.0).is_accurate(20.0));
    }

    #[test]
    fn test_first_fix_reported_once() {
        let mut state = LocationState::new("Trail Guide");
        let fix = UserLocation::new(Coordinate::new(35.0, -80.0), 5.0);
        assert!(!state.first_fix_observed());
        assert!(state.update_location(fix));
        assert!(!state.update_location(fix));
        assert!(state.first_fix_observed());
    }

    #[test]
    fn test_heading_merges_into_fix() {
        let mut state = LocationState::new("Trail Guide");
        state.update_location(UserLocation::new(Coordinate::new(35.0, -80.0), 5.0));
        assert_eq!(state.current().unwrap().heading, None);

        state.update_heading(370.0);
        assert_eq!(state.current().unwrap().heading, Some(10.0));

        state.update_heading(-1.0);
        assert_eq!(state.heading(), None);

        state.update_location(UserLocation::new(Coordinate::new(35.0, -80.0), 5.0).with_heading(45.0));
        assert_eq!(state.heading(), Some(45.0));
    }

    #[test]
    fn test_authorization_alerts() {
        let mut state = LocationState::new("Trail Guide");
        assert!(state.set_authorization(AuthorizationStatus::AuthorizedWhenInUse).is_none());

        let alert = state.set_authorization(AuthorizationStatus::Denied).unwrap();
        assert_eq!(alert.title, "Location Access Not Authorized");
        assert!(alert.body.starts_with("Trail Guide will not"));
        // Same status again is silent
        assert!(state.set_authorization(AuthorizationStatus::Denied).is_none());
        assert!(!state.authorization().is_authorized());
    }

    #[test]
    fn test_services_disabled_alert() {
        let mut state = LocationState::new("Trail Guide");
        state.update_location(UserLocation::new(Coordinate::new(35.0, -80.0), 5.0));

        let alert = state.set_services_enabled(false).unwrap();
        assert_eq!(alert.title, "Location Services Needed");
        assert!(state.current().is_none());
        assert!(state.set_services_enabled(false).is_none());
        assert!(state.set_services_enabled(true).is_none());
    }
}
