pub mod aoi;
pub mod forest_mask;
pub mod forest_stats;
pub mod grid;
pub mod pixel_area;
pub mod zonal;
