use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::collect::global_variables::{LAYER_LOSSYEAR, LAYER_TREECOVER2000, TILE_FILE_EXTENSION};
use crate::error::{ForestError, Result};
use crate::geo_core::{Affine, Crs};
use crate::geometric::grid::{Grid, Mask};

/// One 8-bit raster band loaded into memory with its georeferencing.
///
/// Both Hansen layers are `Byte` rasters, so values are kept as `u8`.
#[derive(Debug, Clone)]
pub struct RasterBand {
    pub values: Grid<u8>,
    /// False where the source pixel is nodata
    pub valid: Mask,
    pub transform: Affine,
    pub crs: Option<Crs>,
}

impl RasterBand {
    /// Band where every pixel is valid
    pub fn new(values: Grid<u8>, transform: Affine, crs: Option<Crs>) -> Self {
        let valid = values.map(|_| true);
        RasterBand {
            values,
            valid,
            transform,
            crs,
        }
    }

    /// Band whose pixels equal to `nodata` are invalid
    pub fn with_nodata(values: Grid<u8>, nodata: u8, transform: Affine, crs: Option<Crs>) -> Self {
        let valid = values.map(|v| *v != nodata);
        RasterBand {
            values,
            valid,
            transform,
            crs,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.values.shape()
    }

    /// Values with nodata pixels replaced by 0
    pub fn filled(&self) -> Result<Grid<u8>> {
        self.values
            .zip_map(&self.valid, "band values vs valid mask", |v, ok| if *ok { *v } else { 0 })
    }
}

/// Raster-I/O collaborator: reads band 1 of a raster file
pub trait RasterReader: Sync {
    fn read_band(&self, path: &Path) -> Result<RasterBand>;
}

/// A co-registered pair of Hansen layer files for one tile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilePair {
    pub tile_id: String,
    pub treecover2000: PathBuf,
    pub lossyear: PathBuf,
}

/// Tiles laid out as `<root>/<tile_id>/<layer>.tif`
#[derive(Debug, Clone)]
pub struct LocalTileSource {
    root: PathBuf,
}

impl LocalTileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalTileSource { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Files of one layer keyed by tile id
    pub fn list_layer_files(&self, layer: &str) -> Result<BTreeMap<String, PathBuf>> {
        let mut files = BTreeMap::new();
        if !self.root.is_dir() {
            return Ok(files);
        }
        let entries = std::fs::read_dir(&self.root).map_err(|e| ForestError::io(&self.root, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| ForestError::io(&self.root, e))?;
            let tile_dir = entry.path();
            if !tile_dir.is_dir() {
                continue;
            }
            let candidate = tile_dir.join(format!("{}.{}", layer, TILE_FILE_EXTENSION));
            if candidate.is_file() {
                let tile_id = entry.file_name().to_string_lossy().to_string();
                files.insert(tile_id, candidate);
            }
        }
        Ok(files)
    }

    /// (treecover2000, lossyear) pairs sorted by tile id.
    ///
    /// A tile carrying only one of the two layers is an error.
    pub fn tile_pairs(&self) -> Result<Vec<TilePair>> {
        let treecover = self.list_layer_files(LAYER_TREECOVER2000)?;
        let mut lossyear = self.list_layer_files(LAYER_LOSSYEAR)?;

        let mut pairs = Vec::with_capacity(treecover.len());
        for (tile_id, tree_path) in treecover {
            let loss_path = lossyear.remove(&tile_id).ok_or_else(|| {
                ForestError::Input(format!("Tile {} has {} but no {}", tile_id, LAYER_TREECOVER2000, LAYER_LOSSYEAR))
            })?;
            pairs.push(TilePair {
                tile_id,
                treecover2000: tree_path,
                lossyear: loss_path,
            });
        }
        if let Some(orphan) = lossyear.keys().next() {
            return Err(ForestError::Input(format!(
                "Tile {} has {} but no {}",
                orphan, LAYER_LOSSYEAR, LAYER_TREECOVER2000
            )));
        }
        Ok(pairs)
    }
}

/// Nodata value as a byte, if it is one
#[cfg(any(feature = "gdal", test))]
fn byte_nodata(nodata: f64) -> Option<u8> {
    if nodata.fract() == 0.0 && (0.0..=255.0).contains(&nodata) {
        Some(nodata as u8)
    } else {
        None
    }
}

/// GDAL-backed reader
#[cfg(feature = "gdal")]
#[derive(Debug, Default, Clone, Copy)]
pub struct GdalRasterReader;

#[cfg(feature = "gdal")]
impl RasterReader for GdalRasterReader {
    fn read_band(&self, path: &Path) -> Result<RasterBand> {
        use gdal::Dataset;

        let dataset = Dataset::open(path)?;
        let (width, height) = dataset.raster_size();
        let band = dataset.rasterband(1)?;
        let buffer = band.read_as::<u8>((0, 0), (width, height), (width, height), None)?;
        let values = Grid::from_vec(height, width, buffer.data().to_vec())?;

        let transform = Affine::from_gdal(dataset.geo_transform()?);
        let crs = match dataset.spatial_ref() {
            Ok(srs) => match srs.auth_code() {
                Ok(code) => Some(Crs::Epsg(code as u32)),
                Err(_) => srs.to_wkt().ok().map(Crs::Custom),
            },
            Err(_) => None,
        };

        // A nodata value outside the byte range can never match a pixel
        Ok(match band.no_data_value().and_then(byte_nodata) {
            Some(nodata) => RasterBand::with_nodata(values, nodata, transform, crs),
            None => RasterBand::new(values, transform, crs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_nodata_filled() {
        let values = Grid::from_rows(vec![vec![5, 255], vec![255, 7]]).unwrap();
        let band = RasterBand::with_nodata(values, 255, Affine::north_up(0.0, 0.0, 1.0, 1.0), None);
        assert_eq!(band.valid.count(), 2);
        assert_eq!(band.filled().unwrap().as_slice(), &[5, 0, 0, 7]);
    }

    #[test]
    fn test_byte_nodata() {
        assert_eq!(byte_nodata(255.0), Some(255));
        assert_eq!(byte_nodata(0.0), Some(0));
        assert_eq!(byte_nodata(-9999.0), None);
        assert_eq!(byte_nodata(1.5), None);
        assert_eq!(byte_nodata(f64::NAN), None);
    }

    #[test]
    fn test_band_is_one_byte_per_pixel() {
        let band = RasterBand::new(Grid::filled(40, 50, 7u8), Affine::north_up(0.0, 0.0, 1.0, 1.0), None);
        assert_eq!(std::mem::size_of_val(band.values.as_slice()), 40 * 50);
    }

    #[test]
    fn test_tile_pairs() {
        let dir = tempfile::tempdir().unwrap();
        for tile in ["N60_E020", "N50_E020"] {
            let tile_dir = dir.path().join(tile);
            std::fs::create_dir_all(&tile_dir).unwrap();
            std::fs::write(tile_dir.join("treecover2000.tif"), b"t").unwrap();
            std::fs::write(tile_dir.join("lossyear.tif"), b"l").unwrap();
        }
        let pairs = LocalTileSource::new(dir.path()).tile_pairs().unwrap();
        let ids: Vec<_> = pairs.iter().map(|p| p.tile_id.as_str()).collect();
        assert_eq!(ids, vec!["N50_E020", "N60_E020"]);
        assert!(pairs[0].lossyear.ends_with("N50_E020/lossyear.tif"));
    }

    #[test]
    fn test_tile_pairs_missing_partner() {
        let dir = tempfile::tempdir().unwrap();
        let tile_dir = dir.path().join("N50_E020");
        std::fs::create_dir_all(&tile_dir).unwrap();
        std::fs::write(tile_dir.join("lossyear.tif"), b"l").unwrap();
        assert!(matches!(
            LocalTileSource::new(dir.path()).tile_pairs(),
            Err(ForestError::Input(_))
        ));
    }

    #[test]
    fn test_missing_root_is_empty() {
        let src = LocalTileSource::new("/nonexistent/tiles/root");
        assert!(src.tile_pairs().unwrap().is_empty());
    }
}
