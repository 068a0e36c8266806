//! Hansen 10°x10° tile identifiers and AOI-to-tile resolution.
//!
//! Tiles are named after their north-west corner: `N50_E020` spans
//! latitudes 40..50 and longitudes 20..30. The source distribution uses
//! the same corner in the `50N_020E` form.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::{ForestError, Result};
use crate::geo_core::BoundingBox;
use crate::geometric::aoi::Aoi;

pub const TILE_SIZE_DEG: i32 = 10;

/// Northernmost tile top edge of the product
pub const MAX_TILE_TOP: i32 = 80;
/// Southernmost tile top edge of the product
pub const MIN_TILE_TOP: i32 = -50;
pub const MIN_TILE_LEFT: i32 = -180;
pub const MAX_TILE_LEFT: i32 = 170;

/// North-west corner of a Hansen tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileId {
    pub lat_top: i32,
    pub lon_left: i32,
}

impl TileId {
    pub fn new(lat_top: i32, lon_left: i32) -> Result<Self> {
        let tile = TileId { lat_top, lon_left };
        if lat_top % TILE_SIZE_DEG != 0 || lon_left % TILE_SIZE_DEG != 0 {
            return Err(ForestError::Input(format!(
                "tile corner ({}, {}) is not on the 10 degree grid",
                lat_top, lon_left
            )));
        }
        if !(MIN_TILE_TOP..=MAX_TILE_TOP).contains(&lat_top)
            || !(MIN_TILE_LEFT..=MAX_TILE_LEFT).contains(&lon_left)
        {
            return Err(ForestError::Input(format!(
                "tile {} is outside the Hansen coverage",
                tile
            )));
        }
        Ok(tile)
    }

    /// Canonical id, e.g. `N50_E020`
    pub fn id(&self) -> String {
        self.to_string()
    }

    /// Label used in source file names, e.g. `50N_020E`
    pub fn hansen_label(&self) -> String {
        let ns = if self.lat_top >= 0 { 'N' } else { 'S' };
        let ew = if self.lon_left >= 0 { 'E' } else { 'W' };
        format!(
            "{:02}{}_{:03}{}",
            self.lat_top.abs(),
            ns,
            self.lon_left.abs(),
            ew
        )
    }

    /// Geographic extent of the tile
    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::new(
            self.lon_left as f64,
            (self.lat_top - TILE_SIZE_DEG) as f64,
            (self.lon_left + TILE_SIZE_DEG) as f64,
            self.lat_top as f64,
        )
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ns = if self.lat_top >= 0 { 'N' } else { 'S' };
        let ew = if self.lon_left >= 0 { 'E' } else { 'W' };
        write!(
            f,
            "{}{:02}_{}{:03}",
            ns,
            self.lat_top.abs(),
            ew,
            self.lon_left.abs()
        )
    }
}

/// North rows first, then west to east
impl Ord for TileId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .lat_top
            .cmp(&self.lat_top)
            .then(self.lon_left.cmp(&other.lon_left))
    }
}

impl PartialOrd for TileId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for TileId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn parse_component(part: &str, pos: char, neg: char, digits: usize) -> Option<i32> {
    let mut chars = part.chars();
    let hemi = chars.next()?;
    let number = chars.as_str();
    if number.len() != digits || !number.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let value: i32 = number.parse().ok()?;
    if hemi == pos {
        Some(value)
    } else if hemi == neg {
        Some(-value)
    } else {
        None
    }
}

impl FromStr for TileId {
    type Err = ForestError;

    /// Parse the canonical `N50_E020` form
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ForestError::Input(format!("invalid tile id: {:?}", s));
        let (lat, lon) = s.trim().split_once('_').ok_or_else(invalid)?;
        let lat_top = parse_component(lat, 'N', 'S', 2).ok_or_else(invalid)?;
        let lon_left = parse_component(lon, 'E', 'W', 3).ok_or_else(invalid)?;
        TileId::new(lat_top, lon_left)
    }
}

/// Tiles intersecting a lon/lat bounding box, north to south then west to east.
///
/// A box edge lying exactly on a tile boundary does not pull in the
/// neighbouring tile; a degenerate box still selects the tile containing it.
pub fn hansen_tile_ids_for_bbox(bbox: &BoundingBox) -> Result<Vec<TileId>> {
    if !bbox.is_valid() {
        return Err(ForestError::Input(format!(
            "invalid AOI bounding box: {:?}",
            bbox
        )));
    }
    let size = TILE_SIZE_DEG as f64;

    // Cell index i covers latitudes [10i, 10i + 10), its top edge is 10i + 10
    let mut lat_lo = (bbox.min_y / size).floor() as i32;
    let mut lon_lo = (bbox.min_x / size).floor() as i32;
    // A box starting on the north or east coverage edge belongs to the last tile there
    if bbox.min_y == MAX_TILE_TOP as f64 {
        lat_lo -= 1;
    }
    if bbox.min_x == (MAX_TILE_LEFT + TILE_SIZE_DEG) as f64 {
        lon_lo -= 1;
    }
    let lat_hi = ((bbox.max_y / size).ceil() as i32 - 1).max(lat_lo);
    let lon_hi = ((bbox.max_x / size).ceil() as i32 - 1).max(lon_lo);

    let lat_lo = lat_lo.max(MIN_TILE_TOP / TILE_SIZE_DEG - 1);
    let lat_hi = lat_hi.min(MAX_TILE_TOP / TILE_SIZE_DEG - 1);
    let lon_lo = lon_lo.max(MIN_TILE_LEFT / TILE_SIZE_DEG);
    let lon_hi = lon_hi.min(MAX_TILE_LEFT / TILE_SIZE_DEG);

    let mut tiles = Vec::new();
    for i in (lat_lo..=lat_hi).rev() {
        for j in lon_lo..=lon_hi {
            tiles.push(TileId {
                lat_top: i * TILE_SIZE_DEG + TILE_SIZE_DEG,
                lon_left: j * TILE_SIZE_DEG,
            });
        }
    }

    if tiles.is_empty() {
        return Err(ForestError::Input(format!(
            "no Hansen tiles intersect AOI bounding box {:?}",
            bbox
        )));
    }
    Ok(tiles)
}

/// Tiles covering an AOI's bounding box
pub fn resolve_tile_ids(aoi: &Aoi) -> Result<Vec<TileId>> {
    let tiles = hansen_tile_ids_for_bbox(&aoi.bbox()?)?;
    tracing::debug!(
        count = tiles.len(),
        tiles = ?tiles.iter().map(TileId::id).collect::<Vec<_>>(),
        "resolved Hansen tiles"
    );
    Ok(tiles)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(bbox: BoundingBox) -> Vec<String> {
        hansen_tile_ids_for_bbox(&bbox)
            .unwrap()
            .iter()
            .map(TileId::id)
            .collect()
    }

    #[test]
    fn test_single_tile() {
        assert_eq!(ids(BoundingBox::new(20.1, 45.1, 20.9, 45.9)), vec!["N50_E020"]);
    }

    #[test]
    fn test_labels() {
        let tile = TileId::new(50, 20).unwrap();
        assert_eq!(tile.id(), "N50_E020");
        assert_eq!(tile.hansen_label(), "50N_020E");
        let tile = TileId::new(-10, -60).unwrap();
        assert_eq!(tile.id(), "S10_W060");
        assert_eq!(tile.hansen_label(), "10S_060W");
        let tile = TileId::new(0, 0).unwrap();
        assert_eq!(tile.id(), "N00_E000");
        assert_eq!(tile.hansen_label(), "00N_000E");
    }

    #[test]
    fn test_parse_round_trip() {
        for id in ["N50_E020", "S10_W060", "N00_E000", "N80_W180"] {
            assert_eq!(id.parse::<TileId>().unwrap().id(), id);
        }
        for bad in ["50N_020E", "N5_E020", "N50E020", "X50_E020", "N55_E020", "N90_E020"] {
            assert!(bad.parse::<TileId>().is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_multi_tile_order() {
        // Crosses 50N and 30E
        assert_eq!(
            ids(BoundingBox::new(25.0, 45.0, 35.0, 55.0)),
            vec!["N60_E020", "N60_E030", "N50_E020", "N50_E030"]
        );
    }

    #[test]
    fn test_boundary_edges_do_not_add_neighbours() {
        assert_eq!(ids(BoundingBox::new(20.0, 40.0, 30.0, 50.0)), vec!["N50_E020"]);
    }

    #[test]
    fn test_southern_western_hemisphere() {
        assert_eq!(
            ids(BoundingBox::new(-55.5, -12.0, -54.5, -11.0)),
            vec!["S10_W060"]
        );
        assert_eq!(
            ids(BoundingBox::new(-0.5, -0.5, 0.5, 0.5)),
            vec!["N10_W010", "N10_E000", "N00_W010", "N00_E000"]
        );
    }

    #[test]
    fn test_point_bbox() {
        assert_eq!(ids(BoundingBox::new(21.0, 41.0, 21.0, 41.0)), vec!["N50_E020"]);
    }

    #[test]
    fn test_outside_coverage() {
        assert!(matches!(
            hansen_tile_ids_for_bbox(&BoundingBox::new(10.0, 82.0, 11.0, 85.0)),
            Err(ForestError::Input(_))
        ));
        assert!(hansen_tile_ids_for_bbox(&BoundingBox::new(10.0, -70.0, 11.0, -65.0)).is_err());
    }

    #[test]
    fn test_clamped_to_coverage() {
        assert_eq!(
            ids(BoundingBox::new(0.5, 75.0, 1.0, 85.0)),
            vec!["N80_E000"]
        );
    }

    #[test]
    fn test_north_east_coverage_edges() {
        assert_eq!(ids(BoundingBox::new(180.0, 45.0, 180.0, 46.0)), vec!["N50_E170"]);
        assert_eq!(ids(BoundingBox::new(21.0, 80.0, 22.0, 80.0)), vec!["N80_E020"]);
        assert_eq!(ids(BoundingBox::new(180.0, 80.0, 180.0, 80.0)), vec!["N80_E170"]);
        assert_eq!(ids(BoundingBox::new(175.0, 45.0, 180.0, 46.0)), vec!["N50_E170"]);
    }

    #[test]
    fn test_invalid_bbox() {
        assert!(hansen_tile_ids_for_bbox(&BoundingBox::new(1.0, 0.0, 0.0, 1.0)).is_err());
        assert!(hansen_tile_ids_for_bbox(&BoundingBox::new(f64::NAN, 0.0, 1.0, 1.0)).is_err());
    }

    #[test]
    fn test_ordering() {
        let mut tiles = vec![
            TileId::new(40, 30).unwrap(),
            TileId::new(50, 30).unwrap(),
            TileId::new(50, 20).unwrap(),
        ];
        tiles.sort();
        let ids: Vec<String> = tiles.iter().map(TileId::id).collect();
        assert_eq!(ids, vec!["N50_E020", "N50_E030", "N40_E030"]);
    }
}
