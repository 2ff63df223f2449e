//! HTTP client for a REST key/value directory.
//!
//! The directory serves JSON at `{base}/{path}.json`. This module provides:
//! - Trail coordinate download
//! - POI record download
//! - Parallel image fetching with bounded concurrency
//! - Retry with exponential backoff on transport errors, 429 and 503
//!
//! Data-shape errors are never retried.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use reqwest::{Client, StatusCode};

use crate::directory::ChangeKind;
use crate::error::{FetchError, TrailError};
use crate::guide::{GuideEvent, TrailGuide};
use crate::image_cache::ImageStore;
use crate::trail::Trail;

const MAX_CONCURRENCY: usize = 8;
const MAX_RETRIES: u32 = 3;

/// One image to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub poi_id: String,
    pub url: String,
}

/// Outcome of one image download.
#[derive(Debug)]
pub struct ImageResult {
    pub poi_id: String,
    pub url: String,
    pub bytes: Result<Vec<u8>, FetchError>,
}

/// Client for the remote directory.
pub struct DirectoryClient {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
    max_retries: u32,
}

impl DirectoryClient {
    /// Create a client for the directory rooted at `base_url`.
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .pool_max_idle_per_host(MAX_CONCURRENCY * 2)
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: None,
            max_retries: MAX_RETRIES,
        })
    }

    /// Retries per request on transport errors, 429 and 503. Default 3.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Send `auth=<token>` with every directory request.
    pub fn with_auth_token(mut self, token: &str) -> Self {
        self.auth_token = Some(token.to_string());
        self
    }

    /// REST URL of a directory path.
    pub fn url_for(&self, path: &str) -> String {
        let path = path.trim_matches('/');
        match &self.auth_token {
            Some(token) => format!("{}/{}.json?auth={}", self.base_url, path, token),
            None => format!("{}/{}.json", self.base_url, path),
        }
    }

    /// Download the trail coordinate map at `path`.
    pub async fn fetch_trail(&self, path: &str, name: &str) -> Result<Trail, FetchError> {
        let document = self.get_json(&self.url_for(path)).await?;
        let trail = Trail::from_json_value(&document, "", name)?;
        info!("[DirectoryClient] Fetched trail '{}' with {} coordinates", name, trail.len());
        Ok(trail)
    }

    /// Download every POI record under `path` as `(key, record)` pairs.
    pub async fn fetch_poi_records(&self, path: &str) -> Result<Vec<(String, serde_json::Value)>, FetchError> {
        let document = self.get_json(&self.url_for(path)).await?;
        let records = split_records(document)?;
        info!("[DirectoryClient] Fetched {} POI records", records.len());
        Ok(records)
    }

    /// Download the trail and the POI records concurrently.
    pub async fn fetch_snapshot(&self, trail_path: &str, poi_path: &str, trail_name: &str) -> DirectorySnapshot {
        let (trail, poi_records) =
            futures::join!(self.fetch_trail(trail_path, trail_name), self.fetch_poi_records(poi_path));
        DirectorySnapshot { trail, poi_records }
    }

    /// Download images in parallel. Results come back in completion order.
    pub async fn fetch_images(&self, requests: Vec<ImageRequest>) -> Vec<ImageResult> {
        use futures::stream::{self, StreamExt};

        let total = requests.len() as u32;
        let completed = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let results: Vec<ImageResult> = stream::iter(requests)
            .map(|request| {
                let completed = Arc::clone(&completed);
                async move {
                    let bytes = self.get_bytes(&request.url).await;
                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!(
                        "[Progress] {}/{} images | {} {}",
                        done,
                        total,
                        request.poi_id,
                        if bytes.is_ok() { "ok" } else { "failed" }
                    );
                    ImageResult { poi_id: request.poi_id, url: request.url, bytes }
                }
            })
            .buffer_unordered(MAX_CONCURRENCY)
            .collect()
            .await;

        let failed = results.iter().filter(|r| r.bytes.is_err()).count();
        info!(
            "[DirectoryClient] Fetched {} images ({} errors) in {:.2}s",
            total,
            failed,
            start.elapsed().as_secs_f64()
        );
        results
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value, FetchError> {
        let bytes = self.get_bytes(url).await?;
        serde_json::from_slice(&bytes).map_err(|e| FetchError::Json(e.to_string()))
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut retries = 0;

        loop {
            match self.client.get(url).send().await {
                Ok(resp) => {
                    let status = resp.status();

                    if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
                        retries += 1;
                        if retries > self.max_retries {
                            return Err(FetchError::Status(status.as_u16()));
                        }
                        let wait = backoff(retries);
                        warn!("[Fetch] {} from {}, retry {} after {:?}", status, url, retries, wait);
                        tokio::time::sleep(wait).await;
                        continue;
                    }

                    if !status.is_success() {
                        return Err(FetchError::Status(status.as_u16()));
                    }

                    let bytes = resp
                        .bytes()
                        .await
                        .map_err(|e| FetchError::Request(format!("body download error: {}", e)))?;
                    if bytes.is_empty() {
                        return Err(FetchError::EmptyBody);
                    }
                    return Ok(bytes.to_vec());
                }
                Err(e) => {
                    retries += 1;
                    if retries > self.max_retries {
                        return Err(FetchError::Request(e.to_string()));
                    }
                    let wait = backoff(retries);
                    warn!("[Fetch] Error: {}, retry {} after {:?}", e, retries, wait);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

fn backoff(retries: u32) -> Duration {
    Duration::from_millis(200 * (1 << retries.min(4)))
}

/// Split a directory listing into `(key, record)` pairs.
///
/// Listings are objects keyed by record key, or arrays for small integer keys. A
/// missing path comes back as `null`, which is an empty listing.
fn split_records(document: serde_json::Value) -> Result<Vec<(String, serde_json::Value)>, FetchError> {
    match document {
        serde_json::Value::Null => Ok(vec![]),
        serde_json::Value::Object(map) => Ok(map.into_iter().collect()),
        serde_json::Value::Array(items) => Ok(items
            .into_iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (i.to_string(), v))
            .collect()),
        other => Err(FetchError::Json(format!("expected a listing, got {}", other))),
    }
}

/// Trail and POI records fetched in one go.
#[derive(Debug)]
pub struct DirectorySnapshot {
    pub trail: Result<Trail, FetchError>,
    pub poi_records: Result<Vec<(String, serde_json::Value)>, FetchError>,
}

impl DirectorySnapshot {
    /// Feed the snapshot into `guide` as if the directory had streamed it.
    ///
    /// A failed POI download counts as a failed connection; a failed trail download
    /// raises the trail alert.
    pub fn apply_to<S: ImageStore>(self, guide: &mut TrailGuide<S>) -> Vec<GuideEvent> {
        let trail = self.trail.map_err(|e| match e {
            FetchError::Trail(e) => e,
            other => TrailError::Download(other.to_string()),
        });
        let mut events = guide.set_trail(trail);

        match self.poi_records {
            Ok(records) => {
                events.extend(guide.on_connectivity(true));
                for (key, record) in records {
                    events.extend(guide.on_poi_record(ChangeKind::Added, &key, record));
                }
                events.extend(guide.on_directory_loaded());
            }
            Err(e) => {
                warn!("[DirectoryClient] POI download failed: {}", e);
                events.extend(guide.on_connect_timeout());
            }
        }
        events
    }
}

/// Synchronous wrapper for FFI - runs the async fetches on a tokio runtime
#[cfg(feature = "ffi")]
pub fn fetch_snapshot_sync(
    base_url: &str,
    trail_path: &str,
    poi_path: &str,
    trail_name: &str,
) -> Result<DirectorySnapshot, FetchError> {
    use tokio::runtime::Builder;

    let rt = Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .map_err(|e| FetchError::Client(format!("runtime error: {}", e)))?;

    let client = DirectoryClient::new(base_url)?;
    Ok(rt.block_on(client.fetch_snapshot(trail_path, poi_path, trail_name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_url_for() {
        let client = DirectoryClient::new("https://trail.example.com/").unwrap();
        assert_eq!(
            client.url_for("/points-of-interest"),
            "https://trail.example.com/points-of-interest.json"
        );

        let client = client.with_auth_token("secret");
        assert_eq!(
            client.url_for("TrailCoordinates"),
            "https://trail.example.com/TrailCoordinates.json?auth=secret"
        );
    }

    #[test]
    fn test_split_records() {
        assert!(split_records(json!(null)).unwrap().is_empty());

        let mut records = split_records(json!({ "-Kb": { "name": "b" }, "-Ka": { "name": "a" } })).unwrap();
        records.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(records[0].0, "-Ka");

        let records = split_records(json!([null, { "name": "one" }, { "name": "two" }])).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, "1");

        assert!(matches!(split_records(json!(42)), Err(FetchError::Json(_))));
    }

    #[test]
    fn test_backoff_is_bounded() {
        assert_eq!(backoff(1), Duration::from_millis(400));
        assert_eq!(backoff(10), Duration::from_millis(3200));
    }

    fn guide() -> TrailGuide<crate::MemoryImageStore> {
        TrailGuide::new(
            crate::GuideConfig::default(),
            crate::LocationState::new("Trail Guide"),
            crate::ImageCache::new(crate::MemoryImageStore::new()),
        )
    }

    #[test]
    fn test_snapshot_feeds_guide() {
        let trail = Trail::from_json_value(
            &json!([null, { "latitude": 35.220, "longitude": -80.830 }, { "latitude": 35.217, "longitude": -80.833 }]),
            "",
            "remote",
        )
        .unwrap();
        let records = split_records(json!({
            "jack": { "name": "Captain Jack", "latitude": 35.2169, "longitude": -80.8327,
                      "description": "", "imageUrl": "https://example.com/jack.jpg" },
            "bad": { "name": "No coordinates" }
        }))
        .unwrap();
        let snapshot = DirectorySnapshot { trail: Ok(trail), poi_records: Ok(records) };

        let mut guide = guide();
        let events = snapshot.apply_to(&mut guide);

        assert!(events.contains(&GuideEvent::TrailLoaded { coordinate_count: 2 }));
        assert!(events.iter().any(|e| matches!(e, GuideEvent::PoiAdded { id, .. } if id == "jack")));
        assert!(events.contains(&GuideEvent::ConnectionChanged { event: crate::ConnectionEvent::Connected }));
        assert_eq!(guide.directory().len(), 1);
        assert!(guide.directory().is_loaded());
    }

    #[test]
    fn test_failed_snapshot_alerts() {
        let snapshot = DirectorySnapshot { trail: Err(FetchError::Status(503)), poi_records: Err(FetchError::Status(503)) };

        let mut guide = guide();
        let events = snapshot.apply_to(&mut guide);

        let alerts: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                GuideEvent::Alert { alert } => Some(alert),
                _ => None,
            })
            .collect();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].title, "Trail Guide Error");
        assert!(alerts[0].body.contains("http response code = 503"));
        assert_eq!(alerts[1].title, "Trail Guide Database");
        assert!(events.contains(&GuideEvent::ConnectionChanged { event: crate::ConnectionEvent::Failed }));
        assert!(guide.trail().is_none());
        assert!(guide.directory().is_empty());
    }

    /// A local server that answers every connection with `response` (or drops it when empty).
    async fn local_server(response: &'static str) -> String {
        use tokio::io::AsyncWriteExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                if !response.is_empty() {
                    socket.write_all(response.as_bytes()).await.ok();
                }
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_dropped_connection_is_a_request_error() {
        let base = local_server("").await;
        let client = DirectoryClient::new(&base).unwrap().with_max_retries(0);
        let results = client
            .fetch_images(vec![ImageRequest { poi_id: "jack".into(), url: format!("{}/jack.jpg", base) }])
            .await;
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0].bytes, Err(FetchError::Request(_))));
    }

    #[tokio::test]
    async fn test_unavailable_status_after_retry_budget() {
        let base = local_server("HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n").await;
        let client = DirectoryClient::new(&base).unwrap().with_max_retries(1);
        let result = client.fetch_poi_records("points-of-interest").await;
        assert!(matches!(result, Err(FetchError::Status(503))));
    }

    #[tokio::test]
    async fn test_missing_path_is_empty_listing() {
        let base = local_server("HTTP/1.1 200 OK\r\ncontent-length: 4\r\nconnection: close\r\n\r\nnull").await;
        let client = DirectoryClient::new(&base).unwrap();
        let records = client.fetch_poi_records("points-of-interest").await.unwrap();
        assert!(records.is_empty());
    }
}
