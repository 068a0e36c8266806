use std::ops::Range;

use geo::{Contains, Geometry, LineString, MultiPolygon, Point, Polygon, Relate};

use crate::error::{ForestError, Result};
use crate::geo_core::{Affine, BoundingBox};
use crate::geometric::grid::{Grid, Mask};

const M2_PER_HA: f64 = 10_000.0;

/// Polygonal view of a geometry, rejecting absent, empty or non-areal input
pub fn zone_polygons(geometry: Option<&Geometry<f64>>) -> Result<MultiPolygon<f64>> {
    let geometry = geometry
        .ok_or_else(|| ForestError::Geometry("Geometry is required for rasterization".to_string()))?;

    let polygons = match geometry {
        Geometry::Polygon(p) => MultiPolygon::new(vec![p.clone()]),
        Geometry::MultiPolygon(mp) => mp.clone(),
        Geometry::Rect(r) => MultiPolygon::new(vec![r.to_polygon()]),
        other => {
            return Err(ForestError::Geometry(format!(
                "Zone geometry must be a Polygon or MultiPolygon, got {}",
                geometry_type_name(other)
            )))
        }
    };

    let is_empty = polygons
        .0
        .iter()
        .all(|p| p.exterior().0.len() < 3);
    if is_empty {
        return Err(ForestError::Geometry("Zone geometry is empty".to_string()));
    }
    Ok(polygons)
}

/// Burn a polygon geometry into a boolean mask of `shape` (height, width).
///
/// With `all_touched` every pixel whose footprint shares interior area with
/// the geometry is marked; otherwise only pixels whose center lies inside.
pub fn rasterize_zone(
    geometry: Option<&Geometry<f64>>,
    shape: (usize, usize),
    transform: &Affine,
    all_touched: bool,
) -> Result<Mask> {
    let polygons = zone_polygons(geometry)?;
    rasterize_polygons(&polygons, shape, transform, all_touched)
}

/// Same as [`rasterize_zone`] for an already validated multipolygon
pub fn rasterize_polygons(
    polygons: &MultiPolygon<f64>,
    shape: (usize, usize),
    transform: &Affine,
    all_touched: bool,
) -> Result<Mask> {
    let (height, width) = shape;
    let mut data = vec![false; height * width];

    let envelope = BoundingBox::of_geometry(&Geometry::MultiPolygon(polygons.clone()))
        .ok_or_else(|| ForestError::Geometry("Zone geometry is empty".to_string()))?;

    // Only visit pixels inside the geometry envelope
    let Some((row_range, col_range)) = pixel_window(&envelope, transform, shape) else {
        return Grid::from_vec(height, width, data);
    };

    // Pixels sharing area with the zone but with their centre outside are
    // always crossed by the zone boundary; only those get the exact test
    let boundary =
        all_touched.then(|| BoundaryPixels::trace(polygons, transform, &row_range, &col_range));

    for row in row_range {
        for col in col_range.clone() {
            let (c, r) = (col as f64, row as f64);
            let (cx, cy) = transform.apply(c + 0.5, r + 0.5);
            let mut burned = polygons.contains(&Point::new(cx, cy));

            if !burned {
                if let Some(boundary) = &boundary {
                    burned = boundary.contains(row, col) && footprint_overlaps(polygons, transform, c, r);
                }
            }

            if burned {
                data[row * width + col] = true;
            }
        }
    }

    Grid::from_vec(height, width, data)
}

/// True when the pixel footprint shares interior area with the zone
fn footprint_overlaps(polygons: &MultiPolygon<f64>, transform: &Affine, c: f64, r: f64) -> bool {
    let footprint = Polygon::new(
        LineString::from(vec![
            transform.apply(c, r),
            transform.apply(c + 1.0, r),
            transform.apply(c + 1.0, r + 1.0),
            transform.apply(c, r + 1.0),
        ]),
        vec![],
    );
    let matrix = footprint.relate(polygons);
    matrix.is_intersects() && !matrix.is_touches()
}

/// Pixels of a window crossed by any ring segment of a zone
struct BoundaryPixels {
    rows: Range<usize>,
    cols: Range<usize>,
    hit: Vec<bool>,
}

impl BoundaryPixels {
    // Slack in pixel units so rounding never drops a crossed pixel
    const EPS: f64 = 1e-9;

    fn trace(
        polygons: &MultiPolygon<f64>,
        transform: &Affine,
        rows: &Range<usize>,
        cols: &Range<usize>,
    ) -> Self {
        let mut pixels = BoundaryPixels {
            rows: rows.clone(),
            cols: cols.clone(),
            hit: vec![false; rows.len() * cols.len()],
        };
        let rings = polygons
            .0
            .iter()
            .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()));
        for ring in rings {
            for line in ring.lines() {
                let start = transform.invert(line.start.x, line.start.y);
                let end = transform.invert(line.end.x, line.end.y);
                if let (Some(start), Some(end)) = (start, end) {
                    pixels.mark_segment(start, end);
                }
            }
        }
        pixels
    }

    /// Mark every pixel a segment given in (col, row) space passes through,
    /// one row band at a time
    fn mark_segment(&mut self, (c0, r0): (f64, f64), (c1, r1): (f64, f64)) {
        let (row_min, row_max) = (r0.min(r1), r0.max(r1));
        let first_row = (row_min - Self::EPS).floor().max(self.rows.start as f64);
        let last_row = (row_max + Self::EPS).floor().min(self.rows.end as f64 - 1.0);
        if first_row > last_row {
            return;
        }

        let col_at = |y: f64| c0 + (c1 - c0) * (y - r0) / (r1 - r0);
        let mut band = first_row;
        while band <= last_row {
            let (x_lo, x_hi) = if r1 == r0 {
                (c0.min(c1), c0.max(c1))
            } else {
                let a = col_at(row_min.max(band));
                let b = col_at(row_max.min(band + 1.0));
                (a.min(b), a.max(b))
            };
            let first_col = (x_lo - Self::EPS).floor().max(self.cols.start as f64);
            let last_col = (x_hi + Self::EPS).floor().min(self.cols.end as f64 - 1.0);
            if first_col <= last_col {
                let row = band as usize - self.rows.start;
                let stride = self.cols.len();
                for col in first_col as usize..=last_col as usize {
                    self.hit[row * stride + col - self.cols.start] = true;
                }
            }
            band += 1.0;
        }
    }

    fn contains(&self, row: usize, col: usize) -> bool {
        self.rows.contains(&row)
            && self.cols.contains(&col)
            && self.hit[(row - self.rows.start) * self.cols.len() + col - self.cols.start]
    }
}

/// Hectares of `pixel_area_m2` over cells where both masks are true.
///
/// Summation runs in row-major order in f64.
pub fn zonal_area_ha(class_mask: &Mask, pixel_area_m2: &Grid<f64>, zone_mask: &Mask) -> Result<f64> {
    class_mask.ensure_same_shape(pixel_area_m2, "class mask vs pixel area")?;
    class_mask.ensure_same_shape(zone_mask, "class mask vs zone mask")?;

    let area_m2: f64 = class_mask
        .iter()
        .zip(zone_mask.iter())
        .zip(pixel_area_m2.iter())
        .filter(|((in_class, in_zone), _)| **in_class && **in_zone)
        .map(|(_, area)| *area)
        .sum();

    Ok(area_m2 / M2_PER_HA)
}

/// Row/column ranges of the pixels overlapping `envelope`, `None` if disjoint
fn pixel_window(
    envelope: &BoundingBox,
    transform: &Affine,
    shape: (usize, usize),
) -> Option<(Range<usize>, Range<usize>)> {
    let (height, width) = shape;
    if height == 0 || width == 0 {
        return None;
    }

    let corners = [
        (envelope.min_x, envelope.min_y),
        (envelope.min_x, envelope.max_y),
        (envelope.max_x, envelope.min_y),
        (envelope.max_x, envelope.max_y),
    ];
    let mut min_col = f64::INFINITY;
    let mut max_col = f64::NEG_INFINITY;
    let mut min_row = f64::INFINITY;
    let mut max_row = f64::NEG_INFINITY;
    for (x, y) in corners {
        let (col, row) = transform.invert(x, y)?;
        min_col = min_col.min(col);
        max_col = max_col.max(col);
        min_row = min_row.min(row);
        max_row = max_row.max(row);
    }

    // One pixel of slack on each side for edge pixels
    let first_row = (min_row.floor() - 1.0).max(0.0);
    let last_row = (max_row.ceil() + 1.0).min(height as f64);
    let first_col = (min_col.floor() - 1.0).max(0.0);
    let last_col = (max_col.ceil() + 1.0).min(width as f64);
    if first_row >= last_row || first_col >= last_col {
        return None;
    }

    Some((
        first_row as usize..last_row as usize,
        first_col as usize..last_col as usize,
    ))
}

fn geometry_type_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn unit_transform() -> Affine {
        // 1x1 pixels, origin at (0, 4): a 4x4 grid covering [0,4]x[0,4]
        Affine::north_up(0.0, 4.0, 1.0, 1.0)
    }

    #[test]
    fn test_absent_geometry_fails() {
        let err = rasterize_zone(None, (4, 4), &unit_transform(), true).unwrap_err();
        assert!(matches!(err, ForestError::Geometry(_)));
    }

    #[test]
    fn test_point_geometry_rejected() {
        let g = Geometry::Point(Point::new(1.0, 1.0));
        assert!(rasterize_zone(Some(&g), (4, 4), &unit_transform(), true).is_err());
    }

    #[test]
    fn test_center_vs_all_touched() {
        // Covers x in [0.6, 2.4], y in [1.6, 3.4]
        let g = Geometry::Polygon(polygon![
            (x: 0.6, y: 1.6),
            (x: 2.4, y: 1.6),
            (x: 2.4, y: 3.4),
            (x: 0.6, y: 3.4),
        ]);
        let centers = rasterize_zone(Some(&g), (4, 4), &unit_transform(), false).unwrap();
        // Pixel centers at x = 0.5, 1.5, 2.5 and y = 3.5, 2.5, 1.5, 0.5
        assert_eq!(centers.count(), 1);
        assert_eq!(centers.get(1, 1), Some(&true));

        let touched = rasterize_zone(Some(&g), (4, 4), &unit_transform(), true).unwrap();
        assert_eq!(touched.count(), 9);
        for row in 0..3 {
            for col in 0..3 {
                assert_eq!(touched.get(row, col), Some(&true));
            }
        }
        assert_eq!(touched.get(3, 0), Some(&false));
    }

    /// Exact footprint test on every pixel of the grid
    fn all_touched_reference(g: &Geometry<f64>, shape: (usize, usize), transform: &Affine) -> Mask {
        let polygons = zone_polygons(Some(g)).unwrap();
        let (height, width) = shape;
        let mut data = vec![false; height * width];
        for row in 0..height {
            for col in 0..width {
                let (c, r) = (col as f64, row as f64);
                let (cx, cy) = transform.apply(c + 0.5, r + 0.5);
                data[row * width + col] = polygons.contains(&Point::new(cx, cy))
                    || footprint_overlaps(&polygons, transform, c, r);
            }
        }
        Grid::from_vec(height, width, data).unwrap()
    }

    #[test]
    fn test_all_touched_matches_exact_footprint_test() {
        let transform = Affine::north_up(0.0, 12.0, 1.0, 1.0);
        let shapes = [
            // Shallow and steep slanted edges
            Geometry::Polygon(polygon![
                (x: 0.3, y: 0.7),
                (x: 11.6, y: 1.9),
                (x: 6.2, y: 11.4),
            ]),
            // Concave with a hole and a vertex on a pixel corner
            Geometry::Polygon(Polygon::new(
                LineString::from(vec![
                    (1.5, 1.5),
                    (10.5, 1.2),
                    (10.8, 10.7),
                    (6.0, 4.0),
                    (1.2, 10.9),
                    (1.5, 1.5),
                ]),
                vec![LineString::from(vec![
                    (3.3, 2.6),
                    (7.7, 2.4),
                    (5.1, 3.6),
                    (3.3, 2.6),
                ])],
            )),
            // Partly outside the grid
            Geometry::Polygon(polygon![
                (x: -3.0, y: 5.5),
                (x: 4.4, y: -2.0),
                (x: 15.0, y: 9.3),
            ]),
        ];
        for g in &shapes {
            let fast = rasterize_zone(Some(g), (12, 12), &transform, true).unwrap();
            assert_eq!(fast, all_touched_reference(g, (12, 12), &transform));
        }
    }

    #[test]
    fn test_all_touched_thin_sliver() {
        // Narrower than a pixel and between pixel centres
        let g = Geometry::Polygon(polygon![
            (x: 0.1, y: 1.2),
            (x: 3.9, y: 1.2),
            (x: 3.9, y: 1.3),
            (x: 0.1, y: 1.3),
        ]);
        let centers = rasterize_zone(Some(&g), (4, 4), &unit_transform(), false).unwrap();
        assert!(!centers.any());
        let touched = rasterize_zone(Some(&g), (4, 4), &unit_transform(), true).unwrap();
        assert_eq!(touched.count(), 4);
        for col in 0..4 {
            assert_eq!(touched.get(2, col), Some(&true));
        }
    }

    #[test]
    fn test_aligned_edges_do_not_leak() {
        // Exactly pixels (row 0..2, col 0..2)
        let g = Geometry::Polygon(polygon![
            (x: 0.0, y: 2.0),
            (x: 2.0, y: 2.0),
            (x: 2.0, y: 4.0),
            (x: 0.0, y: 4.0),
        ]);
        let touched = rasterize_zone(Some(&g), (4, 4), &unit_transform(), true).unwrap();
        assert_eq!(touched.count(), 4);
    }

    #[test]
    fn test_geometry_outside_grid() {
        let g = Geometry::Polygon(polygon![
            (x: 10.0, y: 10.0),
            (x: 11.0, y: 10.0),
            (x: 11.0, y: 11.0),
        ]);
        let m = rasterize_zone(Some(&g), (4, 4), &unit_transform(), true).unwrap();
        assert!(!m.any());
    }

    #[test]
    fn test_zonal_area_ha() {
        let class = Grid::from_rows(vec![vec![true, true], vec![false, true]]).unwrap();
        let zone = Grid::from_rows(vec![vec![true, false], vec![true, true]]).unwrap();
        let area = Grid::filled(2, 2, 900.0);
        let ha = zonal_area_ha(&class, &area, &zone).unwrap();
        assert_eq!(ha, 0.18);
    }

    #[test]
    fn test_zonal_area_shape_mismatch() {
        let class = Grid::filled(2, 2, true);
        let zone = Grid::filled(2, 3, true);
        let area = Grid::filled(2, 2, 1.0);
        assert!(zonal_area_ha(&class, &area, &zone).is_err());
        assert!(zonal_area_ha(&class, &Grid::filled(3, 2, 1.0), &class).is_err());
    }

    #[test]
    fn test_zonal_area_additive_over_disjoint_zones() {
        let class = Grid::from_rows(vec![
            vec![true, false, true, true],
            vec![true, true, false, true],
        ])
        .unwrap();
        let area = Grid::filled(2, 4, 900.0);
        let left = Grid::from_rows(vec![
            vec![true, true, false, false],
            vec![true, true, false, false],
        ])
        .unwrap();
        let right = left.map(|v| !*v);
        let union = Grid::filled(2, 4, true);

        let sum = zonal_area_ha(&class, &area, &left).unwrap()
            + zonal_area_ha(&class, &area, &right).unwrap();
        assert_eq!(sum, zonal_area_ha(&class, &area, &union).unwrap());
    }
}
