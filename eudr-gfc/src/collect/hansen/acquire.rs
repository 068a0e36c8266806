//! Fetching Hansen layer files and describing what was acquired.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::tiles::TileId;
use crate::commons::determinism::sha256_file;
use crate::error::{ForestError, Result};

/// How a layer file came to be on local disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerStatus {
    /// Already in the local data plane
    Present,
    /// Restored from the object cache
    Cached,
    /// Fetched from the source URL
    Downloaded,
}

impl LayerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerStatus::Present => "present",
            LayerStatus::Cached => "cached",
            LayerStatus::Downloaded => "downloaded",
        }
    }
}

impl fmt::Display for LayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (tile, layer) file of a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HansenLayerEntry {
    pub tile_id: String,
    pub layer: String,
    /// Absolute path of the local file
    pub local_path: String,
    pub sha256: String,
    pub size_bytes: u64,
    pub source_url: String,
    pub status: LayerStatus,
}

impl HansenLayerEntry {
    /// Describe a file that now exists at `path`
    pub fn from_local(
        tile_id: &str,
        layer: &str,
        path: &Path,
        source_url: String,
        status: LayerStatus,
    ) -> Result<Self> {
        let absolute = std::fs::canonicalize(path).map_err(|e| ForestError::io(path, e))?;
        let size_bytes = std::fs::metadata(&absolute)
            .map_err(|e| ForestError::io(&absolute, e))?
            .len();
        Ok(HansenLayerEntry {
            tile_id: tile_id.to_string(),
            layer: layer.to_string(),
            local_path: absolute.to_string_lossy().into_owned(),
            sha256: sha256_file(&absolute)?,
            size_bytes,
            source_url,
            status,
        })
    }

    fn sort_key(&self) -> (&str, &str, &str) {
        (&self.tile_id, &self.layer, &self.local_path)
    }
}

/// Entries order by (tile_id, layer, local_path)
impl Ord for HansenLayerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sort_key()
            .cmp(&other.sort_key())
            .then_with(|| self.sha256.cmp(&other.sha256))
    }
}

impl PartialOrd for HansenLayerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Substitute `{layer}`, `{tile_id}` and `{hansen_tile}` in a URL template
pub fn source_url(template: &str, layer: &str, tile: &TileId) -> String {
    template
        .replace("{layer}", layer)
        .replace("{tile_id}", &tile.id())
        .replace("{hansen_tile}", &tile.hansen_label())
}

/// Retrieves a remote file onto local disk.
///
/// Implementations must leave `dest` either absent or complete.
pub trait TileFetcher: Sync {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// HTTP settings for [`HttpFetcher`]
#[derive(Debug, Clone)]
pub struct HttpFetchConfig {
    pub connect_timeout: Duration,
    /// Whole-request timeout, tiles are tens of megabytes
    pub request_timeout: Duration,
    /// Extra attempts after a transient failure
    pub retries: u32,
    pub retry_delay: Duration,
}

impl Default for HttpFetchConfig {
    fn default() -> Self {
        HttpFetchConfig {
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(600),
            retries: 1,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Blocking reqwest download into a temp file next to the destination
pub struct HttpFetcher {
    client: Client,
    config: HttpFetchConfig,
}

enum FetchFailure {
    Transient(ForestError),
    Permanent(ForestError),
}

impl HttpFetcher {
    pub fn new(config: HttpFetchConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;
        Ok(HttpFetcher { client, config })
    }

    fn fetch_once(&self, url: &str, dest: &Path) -> std::result::Result<(), FetchFailure> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| FetchFailure::Transient(e.into()))?;

        let status = response.status();
        if !status.is_success() {
            let err = ForestError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            };
            // Server-side errors may clear up, client errors will not
            return Err(if status.is_server_error() {
                FetchFailure::Transient(err)
            } else {
                FetchFailure::Permanent(err)
            });
        }

        let parent = dest
            .parent()
            .ok_or_else(|| {
                FetchFailure::Permanent(ForestError::Input(format!(
                    "destination has no parent directory: {}",
                    dest.display()
                )))
            })?;
        std::fs::create_dir_all(parent)
            .map_err(|e| FetchFailure::Permanent(ForestError::io(parent, e)))?;

        let mut tmp = NamedTempFile::new_in(parent)
            .map_err(|e| FetchFailure::Permanent(ForestError::io(parent, e)))?;
        response
            .copy_to(&mut tmp)
            .map_err(|e| FetchFailure::Transient(e.into()))?;
        tmp.flush()
            .map_err(|e| FetchFailure::Permanent(ForestError::io(tmp.path(), e)))?;
        tmp.persist(dest)
            .map_err(|e| FetchFailure::Permanent(ForestError::io(dest, e.error)))?;
        Ok(())
    }
}

impl TileFetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        let mut attempt = 0;
        loop {
            tracing::info!(url, dest = %dest.display(), attempt, "downloading");
            match self.fetch_once(url, dest) {
                Ok(()) => return Ok(()),
                Err(FetchFailure::Transient(err)) if attempt < self.config.retries => {
                    attempt += 1;
                    tracing::warn!(url, error = %err, attempt, "download failed, retrying");
                    std::thread::sleep(self.config.retry_delay);
                }
                Err(FetchFailure::Transient(err)) | Err(FetchFailure::Permanent(err)) => {
                    return Err(err)
                }
            }
        }
    }
}

/// One mutex per destination path.
///
/// Concurrent acquisitions of the same file within a process serialize on it.
#[derive(Default)]
pub struct PathLocks {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
