use geo::{GeodesicArea, LineString, Polygon};
use rayon::prelude::*;

use crate::error::{ForestError, Result};
use crate::geo_core::{Affine, Crs};
use crate::geometric::grid::Grid;

/// Per-pixel ground area in square meters for a raster grid.
///
/// - Non-positive `height`/`width` yield an all-zero grid of the clamped shape.
/// - `crs` is mandatory.
/// - EPSG:4326: every cell is the absolute geodesic area of its footprint
///   quadrilateral on the WGS84 ellipsoid.
/// - Any other CRS is projected: constant `|a * e|` from the transform.
///
/// Rows are computed in parallel; each cell is an independent f64
/// evaluation, so the result is identical to a sequential per-cell loop.
pub fn pixel_area_m2(
    transform: &Affine,
    height: i64,
    width: i64,
    crs: Option<&Crs>,
) -> Result<Grid<f64>> {
    if height <= 0 || width <= 0 {
        return Ok(Grid::filled(
            height.max(0) as usize,
            width.max(0) as usize,
            0.0,
        ));
    }

    let crs = crs.ok_or_else(|| {
        ForestError::Config("CRS is required to compute pixel areas".to_string())
    })?;

    let (height, width) = (height as usize, width as usize);

    if crs.is_wgs84() {
        let rows: Vec<Vec<f64>> = (0..height)
            .into_par_iter()
            .map(|row| {
                (0..width)
                    .map(|col| geodesic_cell_area_m2(transform, row, col))
                    .collect()
            })
            .collect();
        return Grid::from_vec(height, width, rows.into_iter().flatten().collect());
    }

    let area = (transform.a * transform.e).abs();
    Ok(Grid::filled(height, width, area))
}

/// Absolute geodesic area (m²) of one pixel footprint under WGS84
pub fn geodesic_cell_area_m2(transform: &Affine, row: usize, col: usize) -> f64 {
    let (c, r) = (col as f64, row as f64);
    let corners = vec![
        transform.apply(c, r),
        transform.apply(c + 1.0, r),
        transform.apply(c + 1.0, r + 1.0),
        transform.apply(c, r + 1.0),
    ];
    let footprint = Polygon::new(LineString::from(corners), vec![]);
    footprint.geodesic_area_signed().abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_positive_shape_is_zero_grid() {
        let t = Affine::north_up(0.0, 0.0, 1.0, 1.0);
        let g = pixel_area_m2(&t, 0, 5, None).unwrap();
        assert_eq!(g.shape(), (0, 5));
        let g = pixel_area_m2(&t, -3, 2, None).unwrap();
        assert_eq!(g.shape(), (0, 2));
        assert!(g.is_empty());
    }

    #[test]
    fn test_missing_crs_is_config_error() {
        let t = Affine::north_up(0.0, 0.0, 1.0, 1.0);
        let err = pixel_area_m2(&t, 2, 2, None).unwrap_err();
        assert!(matches!(err, ForestError::Config(_)));
    }

    #[test]
    fn test_projected_is_uniform() {
        let t = Affine::north_up(500_000.0, 6_000_000.0, 30.0, 30.0);
        let g = pixel_area_m2(&t, 3, 4, Some(&Crs::Epsg(32633))).unwrap();
        assert_eq!(g.shape(), (3, 4));
        assert!(g.iter().all(|v| *v == 900.0));
    }

    #[test]
    fn test_geographic_decreases_with_latitude() {
        // One-degree pixels stacked from the equator to 80N
        let t = Affine::north_up(20.0, 80.0, 1.0, 1.0);
        let g = pixel_area_m2(&t, 80, 1, Some(&Crs::wgs84())).unwrap();
        for row in 1..80 {
            let north = *g.get(row - 1, 0).unwrap();
            let south = *g.get(row, 0).unwrap();
            assert!(north < south, "row {} not larger than row {}", row, row - 1);
        }
        assert!(g.iter().all(|v| *v > 0.0));
    }

    #[test]
    fn test_geographic_equator_cell_magnitude() {
        // A 1°x1° cell at the equator is about 12,308 km²
        let t = Affine::north_up(0.0, 1.0, 1.0, 1.0);
        let g = pixel_area_m2(&t, 1, 1, Some(&Crs::wgs84())).unwrap();
        let km2 = g.get(0, 0).unwrap() / 1e6;
        assert!((km2 - 12_308.0).abs() < 5.0, "got {}", km2);
    }

    #[test]
    fn test_parallel_matches_per_cell() {
        let t = Affine::north_up(24.0, 59.0, 0.00025, 0.00025);
        let g = pixel_area_m2(&t, 7, 5, Some(&Crs::wgs84())).unwrap();
        for row in 0..7 {
            for col in 0..5 {
                assert_eq!(
                    g.get(row, col).unwrap().to_bits(),
                    geodesic_cell_area_m2(&t, row, col).to_bits()
                );
            }
        }
    }
}
