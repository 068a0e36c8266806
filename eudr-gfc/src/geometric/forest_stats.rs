//! Forest area statistics for an AOI and for individual parcels,
//! accumulated over every Hansen tile pair that covers them.

use std::collections::BTreeMap;
use std::ops::AddAssign;
use std::path::Path;

use geo::{Geometry, MultiPolygon};
use geojson::GeoJson;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::collect::raster::{RasterBand, RasterReader, TilePair};
use crate::error::{ForestError, Result};
use crate::geo_core::{reproject_geometry, Affine, Crs};
use crate::geometric::aoi::Aoi;
use crate::geometric::forest_mask::{
    loss_mask, reference_forest_mask, remaining_forest_mask, total_loss_mask,
};
use crate::geometric::grid::{Grid, Mask};
use crate::geometric::pixel_area::pixel_area_m2;
use crate::geometric::zonal::{rasterize_polygons, zone_polygons, zonal_area_ha};

/// Anything that can be aggregated as a parcel
pub trait Parcel {
    fn parcel_id(&self) -> &str;
    fn geometry(&self) -> Option<&Geometry<f64>>;
}

/// Plain parcel record
#[derive(Debug, Clone)]
pub struct ParcelRecord {
    pub parcel_id: String,
    pub geometry: Option<Geometry<f64>>,
}

impl Parcel for ParcelRecord {
    fn parcel_id(&self) -> &str {
        &self.parcel_id
    }

    fn geometry(&self) -> Option<&Geometry<f64>> {
        self.geometry.as_ref()
    }
}

/// Read parcels from a GeoJSON FeatureCollection.
///
/// The id comes from `id_property`, then the feature id, then the feature
/// index. Features without a geometry are kept and later skipped.
pub fn load_parcels(path: &Path, id_property: &str) -> Result<Vec<ParcelRecord>> {
    let text = std::fs::read_to_string(path).map_err(|e| ForestError::io(path, e))?;
    parse_parcels(&text, id_property)
}

pub fn parse_parcels(text: &str, id_property: &str) -> Result<Vec<ParcelRecord>> {
    let geojson: GeoJson = text
        .parse()
        .map_err(|e| ForestError::Input(format!("Failed to parse parcel GeoJSON: {}", e)))?;
    let GeoJson::FeatureCollection(fc) = geojson else {
        return Err(ForestError::Input(
            "parcel GeoJSON must be a FeatureCollection".to_string(),
        ));
    };

    fc.features
        .iter()
        .enumerate()
        .map(|(index, feature)| {
            let parcel_id = match feature.property(id_property) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Number(n)) => n.to_string(),
                _ => match &feature.id {
                    Some(geojson::feature::Id::String(s)) => s.clone(),
                    Some(geojson::feature::Id::Number(n)) => n.to_string(),
                    None => index.to_string(),
                },
            };
            let geometry = feature
                .geometry
                .as_ref()
                .map(|g| {
                    Geometry::<f64>::try_from(g).map_err(|e| {
                        ForestError::Input(format!("parcel {}: invalid geometry: {}", parcel_id, e))
                    })
                })
                .transpose()?;
            Ok(ParcelRecord {
                parcel_id,
                geometry,
            })
        })
        .collect()
}

/// Parameters of the forest definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForestParams {
    /// Minimum treecover2000 percentage counted as forest
    pub canopy_threshold_percent: i32,
    /// First calendar year of the loss window
    pub loss_start_year: i32,
    /// Cutoff year; last year of the loss window and the remaining-forest year
    pub end_year: i32,
    /// Whether partially covered edge pixels belong to a zone
    pub all_touched: bool,
}

impl Default for ForestParams {
    fn default() -> Self {
        ForestParams {
            canopy_threshold_percent: 30,
            loss_start_year: 2021,
            end_year: 2024,
            all_touched: true,
        }
    }
}

impl ForestParams {
    pub fn validate(&self) -> Result<()> {
        if !(0..=100).contains(&self.canopy_threshold_percent) {
            return Err(ForestError::Config(format!(
                "canopy_threshold_percent must be within 0..=100, got {}",
                self.canopy_threshold_percent
            )));
        }
        if self.loss_start_year > self.end_year {
            return Err(ForestError::Config(format!(
                "loss_start_year {} is after end_year {}",
                self.loss_start_year, self.end_year
            )));
        }
        Ok(())
    }
}

/// Hectare figures for one zone
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ForestAreaStats {
    /// Area of valid (non-nodata) pixels in the zone
    pub land_area_ha: f64,
    pub reference_forest_ha: f64,
    pub total_loss_ha: f64,
    pub loss_in_range_ha: f64,
    pub remaining_forest_ha: f64,
}

impl AddAssign for ForestAreaStats {
    fn add_assign(&mut self, rhs: Self) {
        self.land_area_ha += rhs.land_area_ha;
        self.reference_forest_ha += rhs.reference_forest_ha;
        self.total_loss_ha += rhs.total_loss_ha;
        self.loss_in_range_ha += rhs.loss_in_range_ha;
        self.remaining_forest_ha += rhs.remaining_forest_ha;
    }
}

/// Class masks and pixel areas of one tile, restricted to valid pixels
pub struct TileMasks {
    pub transform: Affine,
    pub crs: Crs,
    pub pixel_area_m2: Grid<f64>,
    pub valid: Mask,
    pub reference_forest: Mask,
    pub total_loss: Mask,
    pub loss_in_range: Mask,
    pub remaining_forest: Mask,
}

impl TileMasks {
    /// Build all class masks for a co-registered tile pair
    pub fn build(treecover: &RasterBand, lossyear: &RasterBand, params: &ForestParams) -> Result<Self> {
        treecover
            .values
            .ensure_same_shape(&lossyear.values, "treecover2000 vs lossyear")?;
        if treecover.transform != lossyear.transform {
            return Err(ForestError::Input(
                "treecover2000 and lossyear rasters have different transforms".to_string(),
            ));
        }
        let crs = treecover.crs.clone().ok_or_else(|| {
            ForestError::Config("CRS is required to compute pixel areas".to_string())
        })?;

        let valid = treecover.valid.and(&lossyear.valid)?;
        let tc = treecover.filled()?;
        let ly = lossyear.filled()?;
        let threshold = params.canopy_threshold_percent;

        let (height, width) = tc.shape();
        let pixel_area_m2 = pixel_area_m2(&treecover.transform, height as i64, width as i64, Some(&crs))?;

        Ok(TileMasks {
            transform: treecover.transform,
            reference_forest: reference_forest_mask(&tc, threshold).and(&valid)?,
            total_loss: total_loss_mask(&tc, &ly, threshold)?.and(&valid)?,
            loss_in_range: loss_mask(&tc, &ly, threshold, params.loss_start_year, params.end_year)?
                .and(&valid)?,
            remaining_forest: remaining_forest_mask(&tc, &ly, threshold, params.end_year)?
                .and(&valid)?,
            valid,
            pixel_area_m2,
            crs,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        self.valid.shape()
    }

    /// Rasterize a WGS84 zone against this tile's grid
    pub fn zone_mask(&self, zone_wgs84: &MultiPolygon<f64>, all_touched: bool) -> Result<Mask> {
        let zone = reproject_geometry(zone_wgs84, &Crs::wgs84(), &self.crs)?;
        rasterize_polygons(&zone, self.shape(), &self.transform, all_touched)
    }

    /// Statistics over a zone mask, `None` when the zone has no valid pixel here
    pub fn zone_stats(&self, zone_mask: &Mask) -> Result<Option<ForestAreaStats>> {
        if !zone_mask.and(&self.valid)?.any() {
            return Ok(None);
        }
        let area = &self.pixel_area_m2;
        Ok(Some(ForestAreaStats {
            land_area_ha: zonal_area_ha(&self.valid, area, zone_mask)?,
            reference_forest_ha: zonal_area_ha(&self.reference_forest, area, zone_mask)?,
            total_loss_ha: zonal_area_ha(&self.total_loss, area, zone_mask)?,
            loss_in_range_ha: zonal_area_ha(&self.loss_in_range, area, zone_mask)?,
            remaining_forest_ha: zonal_area_ha(&self.remaining_forest, area, zone_mask)?,
        }))
    }
}

fn load_tile(reader: &dyn RasterReader, pair: &TilePair, params: &ForestParams) -> Result<TileMasks> {
    let treecover = reader.read_band(&pair.treecover2000)?;
    let lossyear = reader.read_band(&pair.lossyear)?;
    TileMasks::build(&treecover, &lossyear, params)
}

/// Statistics for the whole AOI, summed over every tile pair.
///
/// Tiles are processed in parallel; partial results are summed in tile order.
pub fn compute_aoi_forest_stats(
    aoi: &Aoi,
    tiles: &[TilePair],
    reader: &dyn RasterReader,
    params: &ForestParams,
) -> Result<ForestAreaStats> {
    params.validate()?;
    if tiles.is_empty() {
        return Err(ForestError::Input("No tile pairs available for the AOI".to_string()));
    }

    let partials = tiles
        .par_iter()
        .map(|pair| {
            let masks = load_tile(reader, pair, params)?;
            let zone = masks.zone_mask(&aoi.geometry, params.all_touched)?;
            masks.zone_stats(&zone)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut total = ForestAreaStats::default();
    for partial in partials.into_iter().flatten() {
        total += partial;
    }
    Ok(total)
}

/// Statistics per parcel id, summed over every tile pair.
///
/// Parcels without a geometry are left out entirely. A parcel that does not
/// overlap any valid pixel of any tile reports zeros.
pub fn compute_parcel_forest_stats<P: Parcel>(
    parcels: &[P],
    tiles: &[TilePair],
    reader: &dyn RasterReader,
    params: &ForestParams,
) -> Result<BTreeMap<String, ForestAreaStats>> {
    params.validate()?;

    let zones = parcels
        .iter()
        .filter(|p| p.geometry().is_some())
        .map(|p| Ok((p.parcel_id().to_string(), zone_polygons(p.geometry())?)))
        .collect::<Result<Vec<_>>>()?;

    let mut stats: BTreeMap<String, ForestAreaStats> = zones
        .iter()
        .map(|(id, _)| (id.clone(), ForestAreaStats::default()))
        .collect();
    if zones.is_empty() {
        return Ok(stats);
    }

    let per_tile = tiles
        .par_iter()
        .map(|pair| {
            let masks = load_tile(reader, pair, params)?;
            zones
                .iter()
                .map(|(id, zone)| {
                    let zone_mask = masks.zone_mask(zone, params.all_touched)?;
                    Ok(masks.zone_stats(&zone_mask)?.map(|s| (id.clone(), s)))
                })
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<Vec<_>>>()?;

    for (id, partial) in per_tile.into_iter().flatten().flatten() {
        if let Some(entry) = stats.get_mut(&id) {
            *entry += partial;
        }
    }
    Ok(stats)
}
