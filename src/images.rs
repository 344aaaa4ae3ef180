//! Content-addressed cache of resized article images.
//!
//! A reference is resolved to an absolute URL, hashed, and mapped to
//! `a<article id>_<sha256 hex>.<ext>` inside the image directory. An existing
//! file is returned as-is without touching the network. Cached files are never
//! refreshed: a URL is treated as naming immutable content.
//!
//! Misses are single-flight per target file. Concurrent requests for the same
//! derivative wait on a keyed lock and re-check the file once they hold it,
//! so the origin is contacted at most once per target.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;
use crate::derive::{DeriveError, ImageDeriver};

/// Upper bound on a downloaded source image.
const MAX_DOWNLOAD_BYTES: usize = 25 * 1024 * 1024;

const DEFAULT_EXTENSION: &str = "jpg";

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("invalid image reference {reference:?}: {source}")]
    InvalidReference {
        reference: String,
        #[source]
        source: url::ParseError,
    },

    #[error("download failed for {url}: {message}")]
    Download { url: String, message: String },

    #[error(transparent)]
    Derive(#[from] DeriveError),

    #[error("image cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("image worker panicked")]
    Worker,
}

/// Fetches raw image bytes from the remote origin.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, ImageError>;
}

/// [`ImageFetcher`] over plain HTTP(S) with a request timeout.
///
/// Bodies larger than the byte cap are rejected from `Content-Length` when
/// the origin sends one, and otherwise as soon as the streamed body passes it.
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("folio/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            max_bytes: MAX_DOWNLOAD_BYTES,
        })
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, ImageError> {
        let failed = |message: String| ImageError::Download {
            url: url.to_string(),
            message,
        };
        let too_large = || failed(format!("response exceeds {} bytes", self.max_bytes));

        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| failed(e.to_string()))?;

        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes as u64)
        {
            return Err(too_large());
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| failed(e.to_string()))? {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }

        if body.is_empty() {
            return Err(failed("empty response body".to_string()));
        }
        Ok(body)
    }
}

pub struct ImageCacheStore {
    dir: PathBuf,
    public_prefix: String,
    base_url: Url,
    width: u32,
    height: u32,
    deriver: ImageDeriver,
    fetcher: Arc<dyn ImageFetcher>,
    inflight: InflightMap,
}

impl ImageCacheStore {
    pub fn from_config(config: &Config, fetcher: Arc<dyn ImageFetcher>) -> anyhow::Result<Self> {
        let base_url = Url::parse(&config.images.base_url)?;
        Ok(Self {
            dir: config.cache.image_dir.clone(),
            public_prefix: config.cache.public_prefix.trim_end_matches('/').to_string(),
            base_url,
            width: config.images.width,
            height: config.images.height,
            deriver: ImageDeriver::new(config.images.quality),
            fetcher,
            inflight: InflightMap::default(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve a reference to the public path of its derivative.
    ///
    /// Failures are logged and reported as `None`.
    pub async fn resolve(&self, reference: &str, article_id: i64) -> Option<String> {
        match self.try_resolve(reference, article_id).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(article_id, reference, error = %e, "image unavailable");
                None
            }
        }
    }

    pub async fn try_resolve(&self, reference: &str, article_id: i64) -> Result<String, ImageError> {
        let url = self.absolute_url(reference)?;
        let filename = target_filename(&url, article_id);
        let target = self.dir.join(&filename);

        if target.exists() {
            debug!(%url, file = %filename, "image cache hit");
            return Ok(self.public_path(&filename));
        }

        let slot = InflightSlot::claim(&self.inflight, &filename);
        let result = {
            let _guard = slot.lock.lock().await;
            if target.exists() {
                Ok(())
            } else {
                self.fetch_and_derive(&url, &target).await
            }
        };
        drop(slot);

        result.map(|()| self.public_path(&filename))
    }

    /// Join relative references against the configured origin.
    pub fn absolute_url(&self, reference: &str) -> Result<Url, ImageError> {
        let reference = reference.trim();
        let parsed = match Url::parse(reference) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => self.base_url.join(reference),
            Err(e) => Err(e),
        };
        parsed.map_err(|source| ImageError::InvalidReference {
            reference: reference.to_string(),
            source,
        })
    }

    fn public_path(&self, filename: &str) -> String {
        format!("{}/{}", self.public_prefix, filename)
    }

    async fn fetch_and_derive(&self, url: &Url, target: &Path) -> Result<(), ImageError> {
        let bytes = self.fetcher.fetch(url).await?;

        std::fs::create_dir_all(&self.dir)?;
        let dir = self.dir.clone();
        let target = target.to_path_buf();
        let deriver = self.deriver.clone();
        let (width, height) = (self.width, self.height);

        tokio::task::spawn_blocking(move || -> Result<(), ImageError> {
            // Removed when dropped, whichever way this closure exits.
            let mut download = tempfile::Builder::new()
                .prefix(".download-")
                .tempfile_in(&dir)?;
            download.write_all(&bytes)?;
            download.flush()?;
            deriver.derive(download.path(), &target, width, height)?;
            Ok(())
        })
        .await
        .map_err(|_| ImageError::Worker)??;

        info!(%url, "image derivative created");
        Ok(())
    }
}

/// Per-filename download locks. The map itself is only locked synchronously.
type InflightMap = std::sync::Mutex<HashMap<String, InflightEntry>>;

struct InflightEntry {
    lock: Arc<Mutex<()>>,
    holders: usize,
}

/// A claimed entry in the in-flight map, released on drop so a cancelled
/// resolve cannot leave its entry behind.
struct InflightSlot<'a> {
    map: &'a InflightMap,
    key: String,
    lock: Arc<Mutex<()>>,
}

impl<'a> InflightSlot<'a> {
    fn claim(map: &'a InflightMap, key: &str) -> Self {
        let mut entries = map.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| InflightEntry {
                lock: Arc::new(Mutex::new(())),
                holders: 0,
            });
        entry.holders += 1;
        Self {
            map,
            key: key.to_string(),
            lock: Arc::clone(&entry.lock),
        }
    }
}

impl Drop for InflightSlot<'_> {
    fn drop(&mut self) {
        let mut entries = self.map.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = entries.get_mut(&self.key) {
            entry.holders = entry.holders.saturating_sub(1);
            if entry.holders == 0 {
                entries.remove(&self.key);
            }
        }
    }
}

/// `a<article id>_<sha256 of the absolute URL>.<ext>`
pub fn target_filename(url: &Url, article_id: i64) -> String {
    let digest = Sha256::digest(url.as_str().as_bytes());
    format!("a{}_{:x}.{}", article_id, digest, url_extension(url))
}

fn url_extension(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| (1..=5).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([10, 120, 200])))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    /// Serves fixed bytes and counts requests.
    pub struct CountingFetcher {
        pub body: Result<Vec<u8>, String>,
        pub calls: AtomicUsize,
        pub delay: Duration,
    }

    impl CountingFetcher {
        pub fn ok(body: Vec<u8>) -> Self {
            Self {
                body: Ok(body),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        pub fn failing(message: &str) -> Self {
            Self {
                body: Err(message.to_string()),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ImageFetcher for CountingFetcher {
        async fn fetch(&self, url: &Url) -> Result<Vec<u8>, ImageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.body.clone().map_err(|message| ImageError::Download {
                url: url.to_string(),
                message,
            })
        }
    }
}
