use std::path::{Path, PathBuf};

use crate::collect::global_variables::{hansen_base_dir_name, MANIFEST_FILE_NAME, TILE_FILE_EXTENSION};
use crate::error::{ForestError, Result};

/// Directory layout below a data root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPlane {
    data_root: PathBuf,
}

impl DataPlane {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        DataPlane {
            data_root: data_root.into(),
        }
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Third-party datasets (Hansen tiles, manifests)
    pub fn external_root(&self) -> PathBuf {
        self.data_root.join("external")
    }

    pub fn cache_root(&self) -> PathBuf {
        self.data_root.join("cache")
    }

    pub fn derived_root(&self) -> PathBuf {
        self.data_root.join("derived")
    }

    /// `external/hansen/hansen_<slug>`
    pub fn hansen_root(&self, dataset_version: &str) -> PathBuf {
        self.external_root()
            .join("hansen")
            .join(hansen_base_dir_name(dataset_version))
    }

    pub fn tiles_root(&self, dataset_version: &str) -> PathBuf {
        self.hansen_root(dataset_version).join("tiles")
    }

    pub fn tile_dir(&self, dataset_version: &str, tile_id: &str) -> PathBuf {
        self.tiles_root(dataset_version).join(tile_id)
    }

    /// `tiles/<tile_id>/<layer>.tif`
    pub fn tile_path(&self, dataset_version: &str, tile_id: &str, layer: &str) -> PathBuf {
        self.tile_dir(dataset_version, tile_id)
            .join(format!("{}.{}", layer, TILE_FILE_EXTENSION))
    }

    /// `manifests/<aoi_id>/tiles_manifest.json`
    pub fn manifest_path(&self, dataset_version: &str, aoi_id: &str) -> PathBuf {
        self.hansen_root(dataset_version)
            .join("manifests")
            .join(aoi_id)
            .join(MANIFEST_FILE_NAME)
    }
}

/// Create a directory and its parents if missing
pub fn ensure_dir(path: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(path).map_err(|e| ForestError::io(path, e))?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subroots_under_data_root() {
        let dp = DataPlane::new("/data");
        assert!(dp.external_root().starts_with(dp.data_root()));
        assert!(dp.cache_root().starts_with(dp.data_root()));
        assert!(dp.derived_root().starts_with(dp.data_root()));
    }

    #[test]
    fn test_hansen_layout() {
        let dp = DataPlane::new("/data");
        assert_eq!(
            dp.tile_path("GFC-2024-v1.12", "N50_E020", "lossyear"),
            PathBuf::from("/data/external/hansen/hansen_gfc_2024_v1_12/tiles/N50_E020/lossyear.tif")
        );
        assert_eq!(
            dp.manifest_path("GFC-2024-v1.12", "aoi1"),
            PathBuf::from(
                "/data/external/hansen/hansen_gfc_2024_v1_12/manifests/aoi1/tiles_manifest.json"
            )
        );
    }

    #[test]
    fn test_ensure_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        assert_eq!(ensure_dir(&nested).unwrap(), nested);
        assert!(nested.is_dir());
    }
}
