use std::fmt;
use std::str::FromStr;

use crate::error::{ForestError, Result};

/// EPSG code of geographic WGS84 (lon/lat degrees)
pub const EPSG_WGS84: u32 = 4326;

/// Coordinate reference system of a raster grid.
///
/// Only the authority code matters to the core: EPSG:4326 selects the
/// geodesic pixel-area path, anything else is treated as projected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Crs {
    /// Resolved EPSG authority code
    Epsg(u32),
    /// A definition that could not be resolved to an EPSG code (WKT, PROJ string)
    Custom(String),
}

impl Crs {
    pub fn wgs84() -> Self {
        Crs::Epsg(EPSG_WGS84)
    }

    /// EPSG code if the CRS resolved to one
    pub fn to_epsg(&self) -> Option<u32> {
        match self {
            Crs::Epsg(code) => Some(*code),
            Crs::Custom(_) => None,
        }
    }

    /// True when the CRS is geographic WGS84
    pub fn is_wgs84(&self) -> bool {
        self.to_epsg() == Some(EPSG_WGS84)
    }

    /// Authority string usable with PROJ ("EPSG:4326") or the raw definition
    pub fn as_user_input(&self) -> String {
        match self {
            Crs::Epsg(code) => format!("EPSG:{}", code),
            Crs::Custom(def) => def.clone(),
        }
    }
}

impl FromStr for Crs {
    type Err = ForestError;

    /// Accepts "EPSG:4326", "epsg:4326", a bare "4326", or any other
    /// non-empty definition which is kept verbatim.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ForestError::Config(
                "CRS is required to compute pixel areas".to_string(),
            ));
        }
        let code = trimmed
            .strip_prefix("EPSG:")
            .or_else(|| trimmed.strip_prefix("epsg:"))
            .unwrap_or(trimmed);
        match code.parse::<u32>() {
            Ok(epsg) => Ok(Crs::Epsg(epsg)),
            Err(_) => Ok(Crs::Custom(trimmed.to_string())),
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_user_input())
    }
}

/// Affine pixel-to-world transform, in the `(a, b, c, d, e, f)` layout:
///
/// ```text
/// x = a * col + b * row + c
/// y = d * col + e * row + f
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Affine {
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Affine { a, b, c, d, e, f }
    }

    /// North-up transform from an origin (upper-left corner) and pixel size
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Affine::new(pixel_width, 0.0, origin_x, 0.0, -pixel_height.abs(), origin_y)
    }

    /// Build from a GDAL geotransform `[c, a, b, f, d, e]`
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Affine::new(gt[1], gt[2], gt[0], gt[4], gt[5], gt[3])
    }

    /// World coordinate of the (possibly fractional) pixel position
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.a * col + self.b * row + self.c,
            self.d * col + self.e * row + self.f,
        )
    }

    /// Inverse mapping from world coordinates to fractional (col, row)
    pub fn invert(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let det = self.a * self.e - self.b * self.d;
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let dx = x - self.c;
        let dy = y - self.f;
        let col = (self.e * dx - self.b * dy) / det;
        let row = (-self.d * dx + self.a * dy) / det;
        Some((col, row))
    }
}

/// Bounding box structure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64, // min longitude
    pub min_y: f64, // min latitude
    pub max_x: f64, // max longitude
    pub max_y: f64, // max latitude
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Bounding box of a geo geometry, `None` for empty geometries
    pub fn of_geometry(geometry: &geo::Geometry<f64>) -> Option<Self> {
        use geo::BoundingRect;

        geometry
            .bounding_rect()
            .map(|rect| BoundingBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y))
    }

    /// True when every coordinate is finite and min <= max on both axes
    pub fn is_valid(&self) -> bool {
        [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite())
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }
}

/// Reproject a geometry between two CRS definitions with PROJ.
#[cfg(feature = "proj")]
pub fn reproject_geometry(
    geometry: &geo::MultiPolygon<f64>,
    from: &Crs,
    to: &Crs,
) -> Result<geo::MultiPolygon<f64>> {
    use geo::algorithm::map_coords::MapCoords;
    use proj::Proj;

    if from == to {
        return Ok(geometry.clone());
    }

    let transform = Proj::new_known_crs(&from.as_user_input(), &to.as_user_input(), None)
        .map_err(|e| {
            ForestError::Config(format!(
                "Failed to create projection from {} to {}: {}",
                from, to, e
            ))
        })?;

    geometry
        .try_map_coords(|c| {
            transform
                .convert((c.x, c.y))
                .map(|(x, y)| geo::coord! { x: x, y: y })
        })
        .map_err(|e| ForestError::Geometry(format!("Failed to reproject geometry: {}", e)))
}

/// Without PROJ only identity reprojection is available.
#[cfg(not(feature = "proj"))]
pub fn reproject_geometry(
    geometry: &geo::MultiPolygon<f64>,
    from: &Crs,
    to: &Crs,
) -> Result<geo::MultiPolygon<f64>> {
    if from == to {
        return Ok(geometry.clone());
    }
    Err(ForestError::Config(format!(
        "Reprojecting from {} to {} requires the `proj` feature",
        from, to
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    #[test]
    fn test_crs_parse() {
        assert_eq!("EPSG:4326".parse::<Crs>().unwrap(), Crs::Epsg(4326));
        assert_eq!("epsg:3035".parse::<Crs>().unwrap(), Crs::Epsg(3035));
        assert_eq!("32633".parse::<Crs>().unwrap(), Crs::Epsg(32633));
        assert!(matches!(
            "+proj=longlat".parse::<Crs>().unwrap(),
            Crs::Custom(_)
        ));
        assert!(matches!("  ".parse::<Crs>(), Err(ForestError::Config(_))));
    }

    #[test]
    fn test_crs_wgs84() {
        assert!(Crs::wgs84().is_wgs84());
        assert!(!Crs::Epsg(3857).is_wgs84());
        assert_eq!(Crs::wgs84().to_string(), "EPSG:4326");
    }

    #[test]
    fn test_affine_roundtrip() {
        let t = Affine::north_up(20.0, 50.0, 0.00025, 0.00025);
        let (x, y) = t.apply(4.0, 8.0);
        assert!((x - 20.001).abs() < 1e-12);
        assert!((y - 49.998).abs() < 1e-12);
        let (col, row) = t.invert(x, y).unwrap();
        assert!((col - 4.0).abs() < 1e-9);
        assert!((row - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_affine_from_gdal() {
        let t = Affine::from_gdal([10.0, 30.0, 0.0, 60.0, 0.0, -30.0]);
        assert_eq!(t, Affine::new(30.0, 0.0, 10.0, 0.0, -30.0, 60.0));
    }

    #[test]
    fn test_bounding_box() {
        let bbox: BoundingBox = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        assert_eq!(bbox.min_x, 0.0);
        assert_eq!(bbox.max_x, 1.0);
        assert!(bbox.is_valid());
        assert!(!BoundingBox::new(1.0, 0.0, 0.0, 1.0).is_valid());
        assert!(!BoundingBox::new(f64::NAN, 0.0, 1.0, 1.0).is_valid());
    }

    #[test]
    fn test_bbox_intersects() {
        let a = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        assert!(a.intersects(&BoundingBox::new(0.5, 0.5, 2.0, 2.0)));
        assert!(!a.intersects(&BoundingBox::new(1.5, 1.5, 2.0, 2.0)));
    }

    #[test]
    fn test_reproject_identity() {
        let mp = geo::MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
        ]]);
        let out = reproject_geometry(&mp, &Crs::wgs84(), &Crs::wgs84()).unwrap();
        assert_eq!(out, mp);
    }
}
