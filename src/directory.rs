//! # POI Directory
//!
//! The live set of points of interest, kept sorted northmost first (the order the
//! card view presents them). The remote directory reports added, updated and removed
//! records; each is validated and applied here.
//!
//! Metrics are recomputed for every POI on each location or heading change. With the
//! `parallel` feature the recomputation runs on rayon.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::DirectoryError;
use crate::geo_utils::haversine_distance;
use crate::location::UserLocation;
use crate::poi::PointOfInterest;
use crate::Coordinate;

/// Kind of change reported by the remote directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum ChangeKind {
    Added,
    Updated,
    Removed,
}

/// Result of applying one directory change.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryChange {
    pub kind: ChangeKind,
    pub id: String,
    /// Position after the change (before it, for removals)
    pub index: usize,
}

/// Points of interest ordered northmost first.
#[derive(Debug, Clone, Default)]
pub struct PoiDirectory {
    pois: Vec<PointOfInterest>,
    loaded: bool,
}

impl PoiDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pois.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pois.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PointOfInterest> {
        self.pois.iter()
    }

    pub fn as_slice(&self) -> &[PointOfInterest] {
        &self.pois
    }

    pub fn get(&self, id: &str) -> Option<&PointOfInterest> {
        self.pois.iter().find(|p| p.id == id)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.pois.iter().position(|p| p.id == id)
    }

    pub fn at(&self, index: usize) -> Option<&PointOfInterest> {
        self.pois.get(index)
    }

    /// Whether the initial load from the remote directory has completed.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Record that the initial load has completed. Returns true the first time.
    pub fn mark_loaded(&mut self) -> bool {
        if self.loaded {
            return false;
        }
        self.loaded = true;
        info!("[Directory] Initial load complete with {} POIs", self.pois.len());
        true
    }

    /// Validate and apply a raw directory record.
    ///
    /// Invalid records are logged and rejected without touching the directory.
    pub fn apply(
        &mut self,
        kind: ChangeKind,
        key: &str,
        record: serde_json::Value,
        user: Option<&UserLocation>,
    ) -> Result<DirectoryChange, DirectoryError> {
        let poi = PointOfInterest::from_json_value(key, record).map_err(|e| {
            warn!("[Directory] {}", e);
            e
        })?;

        match kind {
            ChangeKind::Added | ChangeKind::Updated => Ok(self.upsert(poi, user)),
            ChangeKind::Removed => self.remove(&poi.id),
        }
    }

    /// Insert a POI, or replace the one with the same id.
    pub fn upsert(&mut self, mut poi: PointOfInterest, user: Option<&UserLocation>) -> DirectoryChange {
        poi.update_metrics(user);

        let kind = match self.index_of(&poi.id) {
            Some(existing) => {
                self.pois.remove(existing);
                ChangeKind::Updated
            }
            None => ChangeKind::Added,
        };

        let index = self
            .pois
            .partition_point(|p| p.location.latitude >= poi.location.latitude);
        let id = poi.id.clone();
        debug!("[Directory] {:?} '{}' at {}", kind, poi.name, index);
        self.pois.insert(index, poi);

        DirectoryChange { kind, id, index }
    }

    /// Remove a POI by id.
    pub fn remove(&mut self, id: &str) -> Result<DirectoryChange, DirectoryError> {
        let Some(index) = self.index_of(id) else {
            warn!("[Directory] An unrecognized POI was removed: {}", id);
            return Err(DirectoryError::UnknownPoi { id: id.to_string(), action: "removed" });
        };

        let removed = self.pois.remove(index);
        debug!("[Directory] Removed '{}' from {}", removed.name, index);
        Ok(DirectoryChange { kind: ChangeKind::Removed, id: removed.id, index })
    }

    /// Recompute every POI's metrics, returning the ids whose metrics changed.
    pub fn refresh_metrics(&mut self, user: Option<&UserLocation>) -> Vec<String> {
        #[cfg(feature = "parallel")]
        use rayon::prelude::*;

        #[cfg(feature = "parallel")]
        let pois = self.pois.par_iter_mut();
        #[cfg(not(feature = "parallel"))]
        let pois = self.pois.iter_mut();

        pois.filter_map(|poi| refresh_one(poi, user)).collect()
    }

    /// The POI nearest to `coordinate`.
    pub fn closest_to(&self, coordinate: &Coordinate) -> Option<&PointOfInterest> {
        self.pois
            .iter()
            .map(|p| (p, haversine_distance(coordinate, &p.location)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(p, _)| p)
    }
}

fn refresh_one(poi: &mut PointOfInterest, user: Option<&UserLocation>) -> Option<String> {
    let before = poi.metrics;
    poi.update_metrics(user);
    if poi.metrics == before {
        None
    } else {
        Some(poi.id.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================
