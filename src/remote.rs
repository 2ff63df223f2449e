//! # Remote Trail Loading
//!
//! A realtime directory delivers trail coordinates one record at a time and does not
//! say up front how many there are. Completion is detected in one of three ways:
//!
//! - the source sends [`SourceEvent::InitialSyncComplete`] (preferred)
//! - the source closes the stream
//! - the settle heuristic: the record count is sampled every poll interval and the
//!   load completes when it stops growing between two consecutive polls
//!
//! The settle heuristic can complete early on a slow network, if a pause between
//! records outlasts the poll interval. `max_wait` bounds the whole load.

use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::config::GuideConfig;
use crate::error::TrailError;
use crate::trail::Trail;
use crate::Coordinate;

/// One event from a remote coordinate source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    Record { key: String, coordinate: Coordinate },
    InitialSyncComplete,
    Closed,
}

/// Decides when a growing record count has stopped growing.
#[derive(Debug, Clone, Default)]
pub struct SettleDetector {
    previous: Option<usize>,
}

impl SettleDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the count seen at a poll. Returns true once it matches the previous poll.
    pub fn observe(&mut self, count: usize) -> bool {
        let settled = self.previous == Some(count);
        self.previous = Some(count);
        settled
    }
}

/// Loads a trail from a stream of [`SourceEvent`]s.
#[derive(Debug, Clone)]
pub struct RemoteTrailLoader {
    name: String,
    poll_interval: Duration,
    max_wait: Duration,
}

impl RemoteTrailLoader {
    pub fn new(name: &str) -> Self {
        Self::from_config(name, &GuideConfig::default())
    }

    pub fn from_config(name: &str, config: &GuideConfig) -> Self {
        Self {
            name: name.to_string(),
            poll_interval: config.settle_poll_interval(),
            max_wait: config.remote_max_wait(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Collect records until the source completes, then assemble the trail.
    ///
    /// The receiver is dropped on return, which tells the source to stop.
    pub async fn load(&self, mut events: mpsc::Receiver<SourceEvent>) -> Result<Trail, TrailError> {
        let mut records: Vec<(String, Coordinate)> = Vec::new();
        let mut settle = SettleDetector::new();

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let deadline = tokio::time::sleep(self.max_wait);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(SourceEvent::Record { key, coordinate }) => records.push((key, coordinate)),
                    Some(SourceEvent::InitialSyncComplete) => {
                        debug!("[RemoteTrail] Source signalled initial sync complete");
                        break;
                    }
                    Some(SourceEvent::Closed) | None => {
                        debug!("[RemoteTrail] Source closed");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if settle.observe(records.len()) {
                        debug!("[RemoteTrail] Record count settled at {}", records.len());
                        break;
                    }
                }
                _ = &mut deadline => {
                    warn!("[RemoteTrail] Gave up after {:?} with {} records", self.max_wait, records.len());
                    return Err(TrailError::TimedOut(self.max_wait));
                }
            }
        }

        let trail = assemble(&self.name, records)?;
        info!("[RemoteTrail] Loaded {} coordinates from the database", trail.len());
        Ok(trail)
    }
}

/// Order by numeric key when every key is numeric, else keep arrival order.
fn assemble(name: &str, records: Vec<(String, Coordinate)>) -> Result<Trail, TrailError> {
    let all_numeric = records.iter().all(|(key, _)| key.trim().parse::<usize>().is_ok());
    if all_numeric {
        Trail::from_indexed(name, records)
    } else {
        debug!("[RemoteTrail] Non-numeric keys, keeping arrival order");
        Trail::new(name, records.into_iter().map(|(_, c)| c).collect())
    }
}
