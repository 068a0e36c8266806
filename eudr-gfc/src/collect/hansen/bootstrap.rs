//! Ensure every Hansen layer an AOI needs is on local disk, then write its manifest.
//!
//! Each (tile, layer) pair is resolved local disk first, then object cache,
//! then download. With no object cache and downloads disabled nothing can
//! be resolved. Pairs are independent and resolved in parallel; the
//! manifest is only built from the collected results, sorted, and written
//! once everything succeeded.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::acquire::{source_url, HansenLayerEntry, LayerStatus, PathLocks, TileFetcher};
use super::cache::{manifest_cache_key, tile_cache_key, ObjectCache};
use super::tiles::{resolve_tile_ids, TileId};
use crate::collect::global_variables::{
    MANIFEST_CONTENT_TYPE, MANIFEST_SCHEMA_VERSION, TILE_CONTENT_TYPE,
};
use crate::commons::data_plane::DataPlane;
use crate::commons::determinism::write_json;
use crate::config::BootstrapConfig;
use crate::error::{ForestError, Result};
use crate::geometric::aoi::{load_aoi, Aoi};

/// Provenance of every layer file acquired for one AOI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TilesManifest {
    pub schema_version: String,
    pub dataset_version: String,
    pub aoi_id: String,
    /// In resolver order
    pub tile_ids: Vec<String>,
    /// Sorted, unique
    pub layers: Vec<String>,
    /// Sorted by (tile_id, layer, local_path)
    pub entries: Vec<HansenLayerEntry>,
}

impl TilesManifest {
    pub fn new(
        dataset_version: &str,
        aoi_id: &str,
        tile_ids: &[TileId],
        layers: Vec<String>,
        mut entries: Vec<HansenLayerEntry>,
    ) -> Self {
        entries.sort();
        TilesManifest {
            schema_version: MANIFEST_SCHEMA_VERSION.to_string(),
            dataset_version: dataset_version.to_string(),
            aoi_id: aoi_id.to_string(),
            tile_ids: tile_ids.iter().map(TileId::id).collect(),
            layers,
            entries,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ForestError::io(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Trim, drop blanks, sort and deduplicate layer names
pub fn normalize_layers<S: AsRef<str>>(layers: &[S]) -> Result<Vec<String>> {
    let unique: BTreeSet<String> = layers
        .iter()
        .map(|layer| layer.as_ref().trim())
        .filter(|layer| !layer.is_empty())
        .map(str::to_string)
        .collect();
    if unique.is_empty() {
        return Err(ForestError::Config("at least one layer is required".to_string()));
    }
    Ok(unique.into_iter().collect())
}

fn validate_aoi_id(aoi_id: &str) -> Result<&str> {
    let aoi_id = aoi_id.trim();
    if aoi_id.is_empty() {
        return Err(ForestError::Config("aoi_id must be non-empty".to_string()));
    }
    // Used verbatim as a directory name and cache key segment
    if aoi_id.contains(['/', '\\']) || aoi_id == "." || aoi_id == ".." {
        return Err(ForestError::Config(format!(
            "aoi_id must be a single path segment: {:?}",
            aoi_id
        )));
    }
    Ok(aoi_id)
}

fn acquisition_error(tile_id: &str, layer: &str, reason: impl Into<String>) -> ForestError {
    ForestError::Acquisition {
        tile_id: tile_id.to_string(),
        layer: layer.to_string(),
        reason: reason.into(),
    }
}

/// Acquisition policy bound to its collaborators
pub struct HansenBootstrap<'a> {
    config: &'a BootstrapConfig,
    data_plane: DataPlane,
    fetcher: &'a dyn TileFetcher,
    cache: Option<&'a dyn ObjectCache>,
    locks: PathLocks,
}

impl<'a> HansenBootstrap<'a> {
    /// Validates the configuration before any I/O.
    ///
    /// A configured object cache requires a cache client; a client passed
    /// without cache configuration (e.g. a [`super::cache::DirectoryCache`]) is used as is.
    pub fn new(
        config: &'a BootstrapConfig,
        fetcher: &'a dyn TileFetcher,
        cache: Option<&'a dyn ObjectCache>,
    ) -> Result<Self> {
        config.validate()?;
        if config.cache_enabled() && cache.is_none() {
            return Err(ForestError::Config(
                "object cache is configured but no cache client was provided".to_string(),
            ));
        }
        Ok(HansenBootstrap {
            config,
            data_plane: DataPlane::new(&config.data_root),
            fetcher,
            cache,
            locks: PathLocks::new(),
        })
    }

    pub fn data_plane(&self) -> &DataPlane {
        &self.data_plane
    }

    /// Acquire all layers for the AOI's tiles and write the manifest; returns its path.
    pub fn ensure_for_aoi<S: AsRef<str>>(
        &self,
        aoi_id: &str,
        aoi: &Aoi,
        layers: &[S],
    ) -> Result<PathBuf> {
        let aoi_id = validate_aoi_id(aoi_id)?;
        let layers = normalize_layers(layers)?;
        let tile_ids = resolve_tile_ids(aoi)?;
        let version = &self.config.dataset_version;

        if let Some(cache) = self.cache {
            cache.ensure_bucket()?;
        }

        let entries = self.acquire_all(&tile_ids, &layers)?;
        let manifest = TilesManifest::new(version, aoi_id, &tile_ids, layers, entries);

        let manifest_path = self.data_plane.manifest_path(version, aoi_id);
        write_json(&manifest_path, &manifest)?;

        if let Some(cache) = self.cache {
            cache.put_file(
                &manifest_cache_key(version, aoi_id),
                &manifest_path,
                MANIFEST_CONTENT_TYPE,
            )?;
        }

        tracing::info!(
            aoi_id,
            tiles = manifest.tile_ids.len(),
            entries = manifest.entries.len(),
            path = %manifest_path.display(),
            "wrote Hansen tiles manifest"
        );
        Ok(manifest_path)
    }

    /// Resolve every (tile, layer) pair; the first failure aborts the whole set.
    pub fn acquire_all(
        &self,
        tile_ids: &[TileId],
        layers: &[String],
    ) -> Result<Vec<HansenLayerEntry>> {
        let pairs: Vec<(&TileId, &str)> = tile_ids
            .iter()
            .flat_map(|tile| layers.iter().map(move |layer| (tile, layer.as_str())))
            .collect();

        pairs
            .into_par_iter()
            .map(|(tile, layer)| self.acquire_layer(tile, layer))
            .collect()
    }

    /// Local disk, then object cache, then download
    pub fn acquire_layer(&self, tile: &TileId, layer: &str) -> Result<HansenLayerEntry> {
        let version = &self.config.dataset_version;
        let tile_id = tile.id();
        let local_path = self.data_plane.tile_path(version, &tile_id, layer);
        let url = source_url(&self.config.url_template, layer, tile);

        // Without a cache every layer counts as missing, so only a download can supply it
        if self.cache.is_none() && !self.config.effective_download() {
            return Err(acquisition_error(
                &tile_id,
                layer,
                "object cache is disabled and downloads are disabled (offline or no-download mode)",
            ));
        }

        let lock = self.locks.lock_for(&local_path);
        let _guard = lock
            .lock()
            .map_err(|_| acquisition_error(&tile_id, layer, "local path lock poisoned"))?;

        if local_path.is_file() {
            tracing::debug!(tile_id = %tile_id, layer, "present on local disk");
            return HansenLayerEntry::from_local(&tile_id, layer, &local_path, url, LayerStatus::Present);
        }

        let cache_key = tile_cache_key(version, &tile_id, layer);
        if let Some(cache) = self.cache {
            if cache.get_file_if_exists(&cache_key, &local_path)? {
                tracing::info!(tile_id = %tile_id, layer, key = %cache_key, "restored from object cache");
                return HansenLayerEntry::from_local(&tile_id, layer, &local_path, url, LayerStatus::Cached);
            }
        }

        if !self.config.effective_download() {
            return Err(acquisition_error(
                &tile_id,
                layer,
                format!(
                    "missing at {} and downloads are disabled (offline or no-download mode)",
                    local_path.display()
                ),
            ));
        }

        self.fetcher
            .fetch(&url, &local_path)
            .map_err(|e| acquisition_error(&tile_id, layer, e.to_string()))?;
        if !local_path.is_file() {
            return Err(acquisition_error(
                &tile_id,
                layer,
                format!("fetch of {} produced no file", url),
            ));
        }
        tracing::info!(tile_id = %tile_id, layer, url = %url, "downloaded");
        let entry = HansenLayerEntry::from_local(&tile_id, layer, &local_path, url, LayerStatus::Downloaded)?;

        if let Some(cache) = self.cache {
            cache.put_file(&cache_key, &local_path, TILE_CONTENT_TYPE)?;
        }
        Ok(entry)
    }
}

/// Load the AOI GeoJSON, acquire the Hansen layers it needs and write its manifest.
///
/// No manifest is written unless every (tile, layer) pair was acquired.
pub fn ensure_hansen_for_aoi<S: AsRef<str>>(
    config: &BootstrapConfig,
    aoi_id: &str,
    aoi_geojson: &Path,
    layers: &[S],
    fetcher: &dyn TileFetcher,
    cache: Option<&dyn ObjectCache>,
) -> Result<PathBuf> {
    let bootstrap = HansenBootstrap::new(config, fetcher, cache)?;
    validate_aoi_id(aoi_id)?;
    normalize_layers(layers)?;
    let aoi = load_aoi(aoi_geojson)?;
    bootstrap.ensure_for_aoi(aoi_id, &aoi, layers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_layers() {
        assert_eq!(
            normalize_layers(&[" treecover2000", "lossyear", "lossyear", ""]).unwrap(),
            vec!["lossyear".to_string(), "treecover2000".to_string()]
        );
        let empty: [&str; 2] = ["", "  "];
        assert!(matches!(normalize_layers(&empty), Err(ForestError::Config(_))));
    }

    #[test]
    fn test_validate_aoi_id() {
        assert_eq!(validate_aoi_id(" aoi-1 ").unwrap(), "aoi-1");
        assert!(validate_aoi_id("").is_err());
        assert!(validate_aoi_id("   ").is_err());
        assert!(validate_aoi_id("a/b").is_err());
        assert!(validate_aoi_id("..").is_err());
    }

    #[test]
    fn test_manifest_sorts_entries() {
        let entry = |tile: &str, layer: &str| HansenLayerEntry {
            tile_id: tile.to_string(),
            layer: layer.to_string(),
            local_path: format!("/d/{}/{}.tif", tile, layer),
            sha256: "00".to_string(),
            size_bytes: 1,
            source_url: "u".to_string(),
            status: LayerStatus::Present,
        };
        let tiles = [TileId::new(50, 20).unwrap()];
        let manifest = TilesManifest::new(
            "GFC-2024-v1.12",
            "aoi",
            &tiles,
            vec!["lossyear".to_string(), "treecover2000".to_string()],
            vec![entry("N50_E020", "treecover2000"), entry("N50_E020", "lossyear")],
        );
        assert_eq!(manifest.schema_version, "v1");
        assert_eq!(manifest.tile_ids, vec!["N50_E020"]);
        assert_eq!(manifest.entries[0].layer, "lossyear");
        assert_eq!(manifest.entries[1].layer, "treecover2000");
    }
}
