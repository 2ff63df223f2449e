//! # POI Image Cache
//!
//! Downloaded POI images are kept in a key/value store so the app can show them
//! offline. Each entry records the URL it came from; a cached image only counts as
//! current for the URL it was fetched from.
//!
//! When a download fails the fallback order is:
//! 1. the cached image for the POI, whatever URL it came from
//! 2. a placeholder carrying the error text
//!
//! Image failures are never surfaced as alerts.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use base64::Engine;
use log::{debug, warn};

use crate::error::CacheError;

/// Raw byte storage keyed by string.
pub trait ImageStore {
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn put(&mut self, key: &str, bytes: Vec<u8>) -> Result<(), CacheError>;
    /// Returns true if the key was present.
    fn remove(&mut self, key: &str) -> Result<bool, CacheError>;
}

impl<T: ImageStore + ?Sized> ImageStore for Box<T> {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        (**self).get(key)
    }

    fn put(&mut self, key: &str, bytes: Vec<u8>) -> Result<(), CacheError> {
        (**self).put(key, bytes)
    }

    fn remove(&mut self, key: &str) -> Result<bool, CacheError> {
        (**self).remove(key)
    }
}

/// In-memory store, for tests and hosts without persistence.
#[derive(Debug, Clone, Default)]
pub struct MemoryImageStore {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ImageStore for MemoryImageStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }

    fn put(&mut self, key: &str, bytes: Vec<u8>) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), bytes);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.remove(key).is_some())
    }
}

/// A JSON file mapping keys to base64 payloads. Every write rewrites the file.
#[derive(Debug, Clone)]
pub struct FileImageStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileImageStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            debug!("[ImageCache] No cache file at {}, starting empty", path.display());
            return Ok(Self { path, entries: BTreeMap::new() });
        }

        let json = std::fs::read_to_string(&path).map_err(|source| CacheError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let entries: BTreeMap<String, String> =
            serde_json::from_str(&json).map_err(|e| CacheError::Corrupt(e.to_string()))?;

        debug!("[ImageCache] Opened {} with {} entries", path.display(), entries.len());
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), CacheError> {
        let json = serde_json::to_string(&self.entries).map_err(|e| CacheError::Corrupt(e.to_string()))?;
        std::fs::write(&self.path, json).map_err(|source| CacheError::Io {
            path: self.path.display().to_string(),
            source,
        })
    }
}

impl ImageStore for FileImageStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let encoded = self.entries.get(key)?;
        match base64::engine::general_purpose::STANDARD.decode(encoded) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("[ImageCache] Undecodable entry '{}': {}", key, e);
                None
            }
        }
    }

    fn put(&mut self, key: &str, bytes: Vec<u8>) -> Result<(), CacheError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        self.entries.insert(key.to_string(), encoded);
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<bool, CacheError> {
        if self.entries.remove(key).is_none() {
            return Ok(false);
        }
        self.flush()?;
        Ok(true)
    }
}

// ============================================================================
// Cache
// ============================================================================

/// The image to show for a POI.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum PoiImage {
    /// Freshly downloaded
    Fetched { bytes: Vec<u8> },
    /// From the cache, after a failed download
    Cached { bytes: Vec<u8> },
    /// Nothing available; the host renders the text in place of the image
    Placeholder { text: String },
}

impl PoiImage {
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            PoiImage::Fetched { bytes } | PoiImage::Cached { bytes } => Some(bytes),
            PoiImage::Placeholder { .. } => None,
        }
    }
}

fn image_key(id: &str) -> String {
    format!("image:{}", id)
}

fn url_key(id: &str) -> String {
    format!("url:{}", id)
}

/// POI images keyed by POI id.
#[derive(Debug, Clone, Default)]
pub struct ImageCache<S> {
    store: S,
}

impl<S: ImageStore> ImageCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The cached image for `id`, only if it was fetched from `url`.
    pub fn cached_for(&self, id: &str, url: &str) -> Option<Vec<u8>> {
        let cached_url = self.store.get(&url_key(id))?;
        if cached_url != url.as_bytes() {
            return None;
        }
        self.store.get(&image_key(id))
    }

    /// The cached image for `id`, whatever URL it came from.
    pub fn cached_any(&self, id: &str) -> Option<Vec<u8>> {
        self.store.get(&image_key(id))
    }

    pub fn insert(&mut self, id: &str, url: &str, bytes: Vec<u8>) -> Result<(), CacheError> {
        self.store.put(&image_key(id), bytes)?;
        self.store.put(&url_key(id), url.as_bytes().to_vec())
    }

    /// Drop the cached image for `id`. Returns true if there was one.
    pub fn evict(&mut self, id: &str) -> Result<bool, CacheError> {
        let had_image = self.store.remove(&image_key(id))?;
        self.store.remove(&url_key(id))?;
        Ok(had_image)
    }

    /// Turn a download outcome into the image to show, caching successful downloads.
    pub fn resolve<E: std::fmt::Display>(&mut self, id: &str, url: &str, fetched: Result<Vec<u8>, E>) -> PoiImage {
        match fetched {
            Ok(bytes) if !bytes.is_empty() => {
                if let Err(e) = self.insert(id, url, bytes.clone()) {
                    warn!("[ImageCache] Could not cache image for '{}': {}", id, e);
                }
                PoiImage::Fetched { bytes }
            }
            Ok(_) => self.fallback(id, "image data is empty"),
            Err(e) => self.fallback(id, &e.to_string()),
        }
    }

    fn fallback(&self, id: &str, error: &str) -> PoiImage {
        debug!("[ImageCache] Download for '{}' failed: {}", id, error);
        match self.cached_any(id) {
            Some(bytes) => PoiImage::Cached { bytes },
            None => PoiImage::Placeholder { text: format!("Image Error: {}", error) },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
