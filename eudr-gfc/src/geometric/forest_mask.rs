//! Forest masks over Hansen `treecover2000` and `lossyear` bands.
//!
//! Loss-year codes: `0` means no recorded loss, `1..=N` means loss in
//! calendar year `2000 + code`. Code `0` never falls inside a loss range.

use crate::error::Result;
use crate::geometric::grid::{Grid, Mask};

/// Calendar year that loss-year code 0 is relative to
pub const LOSS_YEAR_CODE_BASIS: i32 = 2000;

/// Loss-year code for a calendar year
pub fn loss_year_code(year: i32) -> i32 {
    year - LOSS_YEAR_CODE_BASIS
}

/// Reference forest mask (RFM): tree cover at baseline >= threshold
pub fn reference_forest_mask(treecover2000: &Grid<u8>, canopy_threshold: i32) -> Mask {
    treecover2000.map(|tc| i32::from(*tc) >= canopy_threshold)
}

/// Loss between `start_year` and `end_year` (inclusive) within the RFM
pub fn loss_mask(
    treecover2000: &Grid<u8>,
    lossyear: &Grid<u8>,
    canopy_threshold: i32,
    start_year: i32,
    end_year: i32,
) -> Result<Mask> {
    // Code 0 is excluded even when the range reaches back to 2000
    let start = loss_year_code(start_year).max(1);
    let end = loss_year_code(end_year);
    treecover2000.zip_map(lossyear, "treecover2000 vs lossyear", |tc, ly| {
        let ly = i32::from(*ly);
        i32::from(*tc) >= canopy_threshold && ly >= start && ly <= end
    })
}

/// Forest remaining as of `end_year`: RFM and no loss up to and including it
pub fn remaining_forest_mask(
    treecover2000: &Grid<u8>,
    lossyear: &Grid<u8>,
    canopy_threshold: i32,
    end_year: i32,
) -> Result<Mask> {
    let end = loss_year_code(end_year);
    treecover2000.zip_map(lossyear, "treecover2000 vs lossyear", |tc, ly| {
        i32::from(*tc) >= canopy_threshold && (*ly == 0 || i32::from(*ly) > end)
    })
}

/// Any recorded loss (code > 0) within the RFM
pub fn total_loss_mask(
    treecover2000: &Grid<u8>,
    lossyear: &Grid<u8>,
    canopy_threshold: i32,
) -> Result<Mask> {
    treecover2000.zip_map(lossyear, "treecover2000 vs lossyear", |tc, ly| {
        i32::from(*tc) >= canopy_threshold && *ly > 0
    })
}
