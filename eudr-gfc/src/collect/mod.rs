pub mod global_variables;
pub mod hansen;
pub mod raster;
