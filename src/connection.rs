//! Remote directory connectivity.
//!
//! Realtime directories report connectivity as a boolean stream. At startup the first
//! report is always `false`; the second says whether the initial connection worked.
//! After that a report arrives on every change.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::Alert;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    InitialCall,
    NeverConnected,
    Connected,
    Disconnected,
}

/// A connectivity transition worth telling the user about (or logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum ConnectionEvent {
    /// First successful connection
    Connected,
    /// The initial connection attempt failed
    Failed,
    /// An established connection dropped
    Lost,
    /// Connected again after a failure or loss
    Reestablished,
}

/// Tracks remote directory connectivity and produces user alerts.
#[derive(Debug, Clone)]
pub struct ConnectionMonitor {
    state: State,
    alert_title: String,
}

impl ConnectionMonitor {
    pub fn new(application_name: &str) -> Self {
        Self {
            state: State::InitialCall,
            alert_title: format!("{} Database", application_name),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == State::Connected
    }

    /// Feed one connectivity report.
    pub fn observe(&mut self, connected: bool) -> Option<ConnectionEvent> {
        let (next, event) = match (self.state, connected) {
            (State::InitialCall, false) => (State::NeverConnected, None),
            (State::InitialCall, true) | (State::NeverConnected, true) => {
                (State::Connected, Some(ConnectionEvent::Connected))
            }
            (State::NeverConnected, false) => (State::Disconnected, Some(ConnectionEvent::Failed)),
            (State::Connected, false) => (State::Disconnected, Some(ConnectionEvent::Lost)),
            (State::Disconnected, true) => (State::Connected, Some(ConnectionEvent::Reestablished)),
            (State::Connected, true) | (State::Disconnected, false) => (self.state, None),
        };

        if let Some(event) = event {
            match event {
                ConnectionEvent::Failed | ConnectionEvent::Lost => warn!("[Connection] {:?}", event),
                _ => info!("[Connection] {:?}", event),
            }
        }
        self.state = next;
        event
    }

    /// The host's connect timer fired. Reports a failure if no connection was ever made.
    pub fn connect_timeout_elapsed(&mut self) -> Option<ConnectionEvent> {
        match self.state {
            State::InitialCall | State::NeverConnected => {
                warn!("[Connection] No connection before the connect timeout");
                self.state = State::Disconnected;
                Some(ConnectionEvent::Failed)
            }
            _ => None,
        }
    }

    /// The user-facing alert for `event`, if it warrants one.
    pub fn alert_for(&self, event: ConnectionEvent) -> Option<Alert> {
        let body = match event {
            ConnectionEvent::Connected => return None,
            ConnectionEvent::Failed => {
                "We could not connect to the database. Please ensure that your device is connected to the internet."
            }
            ConnectionEvent::Lost => {
                "The connection to the database has been lost. The app will continue to work with the Points of Interest that have already been downloaded. You will not receive updates."
            }
            ConnectionEvent::Reestablished => "The connection to the database has been established.",
        };
        Some(Alert::new(&self.alert_title, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_then_connect_is_silent() {
        let mut monitor = ConnectionMonitor::new("Trail Guide");
        assert_eq!(monitor.observe(false), None);
        assert_eq!(monitor.observe(true), Some(ConnectionEvent::Connected));
        assert!(monitor.alert_for(ConnectionEvent::Connected).is_none());
        assert!(monitor.is_connected());
    }

    #[test]
    fn test_failed_then_reestablished() {
        let mut monitor = ConnectionMonitor::new("Trail Guide");
        monitor.observe(false);
        assert_eq!(monitor.observe(false), Some(ConnectionEvent::Failed));
        assert_eq!(monitor.observe(false), None);

        assert_eq!(monitor.observe(true), Some(ConnectionEvent::Reestablished));
        let alert = monitor.alert_for(ConnectionEvent::Reestablished).unwrap();
        assert_eq!(alert.title, "Trail Guide Database");
        assert_eq!(alert.body, "The connection to the database has been established.");
    }

    #[test]
    fn test_lost_connection() {
        let mut monitor = ConnectionMonitor::new("Trail Guide");
        monitor.observe(false);
        monitor.observe(true);
        assert_eq!(monitor.observe(true), None);
        assert_eq!(monitor.observe(false), Some(ConnectionEvent::Lost));
        assert!(!monitor.is_connected());
        assert!(monitor.alert_for(ConnectionEvent::Lost).unwrap().body.contains("lost"));
    }

    #[test]
    fn test_connect_timeout() {
        let mut monitor = ConnectionMonitor::new("Trail Guide");
        monitor.observe(false);
        assert_eq!(monitor.connect_timeout_elapsed(), Some(ConnectionEvent::Failed));
        assert_eq!(monitor.connect_timeout_elapsed(), None);
        // A later connection is announced
        assert_eq!(monitor.observe(true), Some(ConnectionEvent::Reestablished));
    }
}
