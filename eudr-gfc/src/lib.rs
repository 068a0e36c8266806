//! Forest-cover and forest-loss statistics over Hansen Global Forest Change
//! tiles, plus the bootstrap that makes those tiles available locally.

pub mod collect;
pub mod commons;
pub mod config;
pub mod error;
pub mod geo_core;
pub mod geometric;

pub use collect::hansen::{
    ensure_hansen_for_aoi, HansenBootstrap, HansenLayerEntry, LayerStatus, TileId, TilesManifest,
};
pub use config::{BootstrapConfig, ObjectCacheConfig};
pub use error::{ForestError, Result};
pub use geometric::aoi::{compute_aoi_geodesic_area_ha, load_aoi, Aoi};
pub use geometric::forest_stats::{
    compute_aoi_forest_stats, compute_parcel_forest_stats, ForestAreaStats, ForestParams, Parcel,
};
