use std::path::Path;

use geo::{BooleanOps, GeodesicArea, Geometry as GeoGeometry, MultiPolygon};
use geojson::GeoJson;

use crate::error::{ForestError, Result};
use crate::geo_core::BoundingBox;

/// Method tag reported alongside geodesic AOI areas
pub const AOI_AREA_METHOD: &str = "geodesic_wgs84";

/// Area of interest in WGS84 lon/lat, as a (possibly unioned) multipolygon
#[derive(Debug, Clone, PartialEq)]
pub struct Aoi {
    pub geometry: MultiPolygon<f64>,
}

impl Aoi {
    pub fn bbox(&self) -> Result<BoundingBox> {
        BoundingBox::of_geometry(&GeoGeometry::MultiPolygon(self.geometry.clone()))
            .filter(|b| b.is_valid())
            .ok_or_else(|| ForestError::Input("AOI geometry has no valid bounding box".to_string()))
    }

    pub fn to_geometry(&self) -> GeoGeometry<f64> {
        GeoGeometry::MultiPolygon(self.geometry.clone())
    }
}

/// Read and parse an AOI GeoJSON file
pub fn load_aoi(path: &Path) -> Result<Aoi> {
    if !path.is_file() {
        return Err(ForestError::Input(format!(
            "AOI GeoJSON not found: {}",
            path.display()
        )));
    }
    let text = std::fs::read_to_string(path).map_err(|e| ForestError::io(path, e))?;
    parse_aoi(&text)
}

/// Parse an AOI from GeoJSON text.
///
/// FeatureCollections are unioned; a Feature or bare geometry is taken as is.
pub fn parse_aoi(text: &str) -> Result<Aoi> {
    let geojson: GeoJson = text
        .parse()
        .map_err(|e| ForestError::Input(format!("Failed to parse AOI GeoJSON: {}", e)))?;

    let geometry = match geojson {
        GeoJson::FeatureCollection(fc) => {
            let parts = fc
                .features
                .iter()
                .filter_map(|f| f.geometry.as_ref())
                .map(to_multipolygon)
                .collect::<Result<Vec<_>>>()?;
            if parts.is_empty() {
                return Err(ForestError::Input(
                    "AOI GeoJSON FeatureCollection has no features".to_string(),
                ));
            }
            union_all(parts)
        }
        GeoJson::Feature(feature) => {
            let geometry = feature
                .geometry
                .as_ref()
                .ok_or_else(|| ForestError::Input("AOI GeoJSON Feature has no geometry".to_string()))?;
            to_multipolygon(geometry)?
        }
        GeoJson::Geometry(geometry) => to_multipolygon(&geometry)?,
    };

    if geometry.0.is_empty() {
        return Err(ForestError::Input("AOI geometry is empty".to_string()));
    }
    Ok(Aoi { geometry })
}

/// Geodesic area of the AOI on WGS84, in hectares, with the method tag
pub fn compute_aoi_geodesic_area_ha(aoi: &Aoi) -> (f64, &'static str) {
    let area_m2 = aoi.geometry.geodesic_area_signed().abs();
    (area_m2 / 10_000.0, AOI_AREA_METHOD)
}

/// Convert a GeoJSON geometry into a multipolygon, rejecting non-areal types
pub fn to_multipolygon(geometry: &geojson::Geometry) -> Result<MultiPolygon<f64>> {
    let geo_geom: GeoGeometry<f64> = geometry
        .try_into()
        .map_err(|e| ForestError::Input(format!("Failed to convert GeoJSON geometry: {}", e)))?;

    match geo_geom {
        GeoGeometry::Polygon(p) => Ok(MultiPolygon::new(vec![p])),
        GeoGeometry::MultiPolygon(mp) => Ok(mp),
        _ => Err(ForestError::Input(
            "AOI geometry must be a Polygon or MultiPolygon".to_string(),
        )),
    }
}

fn union_all(parts: Vec<MultiPolygon<f64>>) -> MultiPolygon<f64> {
    let mut iter = parts.into_iter();
    let first = iter.next().unwrap_or_else(|| MultiPolygon::new(vec![]));
    iter.fold(first, |acc, part| acc.union(&part))
}
