//! Error types.
//!
//! Errors carry free-text context rather than structured codes; their `Display`
//! output is what ends up in user-facing alerts and log lines.

use thiserror::Error;

/// Failure to produce a [`Trail`](crate::Trail) from a coordinate source.
///
/// Loading never yields a partial trail: any of these aborts the load.
#[derive(Debug, Error)]
pub enum TrailError {
    #[error("cannot find trail resource {0}")]
    NotFound(String),

    #[error("error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("error parsing trail json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("the json object does not contain the expected types and/or keys: {0}")]
    MissingCoordinates(String),

    #[error("{source_name} has {count} coordinates; there need to be at least 2")]
    TooFewCoordinates { source_name: String, count: usize },

    #[error("coordinate key '{0}' is not a positive integer index")]
    InvalidKey(String),

    #[error("coordinate index {0} appears more than once")]
    DuplicateKey(usize),

    #[error("coordinate index {missing} is missing (indices run 1..={count})")]
    MissingIndex { missing: usize, count: usize },

    #[error("coordinate {index} ({latitude}, {longitude}) is out of range")]
    InvalidCoordinate { index: usize, latitude: f64, longitude: f64 },

    #[error("remote trail load timed out after {0:?}")]
    TimedOut(std::time::Duration),

    #[error("trail download failed: {0}")]
    Download(String),
}

/// Rejection of a single point-of-interest record.
///
/// A rejected record never fails the whole directory load.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("invalid POI record '{key}': {reason}")]
    InvalidRecord { key: String, reason: String },

    #[error("an unrecognized POI was {action}: {id}")]
    UnknownPoi { id: String, action: &'static str },
}

/// Failure of the persistent image cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("image cache io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("image cache is corrupt: {0}")]
    Corrupt(String),
}

/// Failure of a remote directory request.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to create HTTP client: {0}")]
    Client(String),

    #[error("request error: {0}")]
    Request(String),

    #[error("http response code = {0}")]
    Status(u16),

    #[error("image data is empty")]
    EmptyBody,

    #[error("JSON parse error: {0}")]
    Json(String),

    #[error(transparent)]
    Trail(#[from] TrailError),
}
