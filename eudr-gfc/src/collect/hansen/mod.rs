//! Hansen GFC tile resolution, acquisition and caching.

pub mod acquire;
pub mod bootstrap;
pub mod cache;
pub mod tiles;

pub use acquire::{HansenLayerEntry, HttpFetchConfig, HttpFetcher, LayerStatus, TileFetcher};
pub use bootstrap::{ensure_hansen_for_aoi, HansenBootstrap, TilesManifest};
pub use cache::{DirectoryCache, ObjectCache};
#[cfg(feature = "s3")]
pub use cache::S3Cache;
pub use tiles::{hansen_tile_ids_for_bbox, resolve_tile_ids, TileId};
