use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the forest statistics and tile acquisition core.
///
/// Every variant is fatal for the call that produced it: nothing in this
/// crate retries beyond the single download retry, and nothing persists a
/// partial manifest or partial statistics after one of these is returned.
#[derive(Debug, Error)]
pub enum ForestError {
    /// Missing or invalid configuration, detected before any I/O.
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed or unusable input (AOI, tile set, raster content).
    #[error("invalid input: {0}")]
    Input(String),

    /// Two grids that must be co-registered have different shapes.
    #[error("shape mismatch ({context}): {left:?} vs {right:?}")]
    ShapeMismatch {
        context: &'static str,
        left: (usize, usize),
        right: (usize, usize),
    },

    /// A geometry was absent or empty where one is required.
    #[error("geometry error: {0}")]
    Geometry(String),

    /// A tile layer could not be made available locally.
    #[error("acquisition failed for tile {tile_id} layer {layer}: {reason}")]
    Acquisition {
        tile_id: String,
        layer: String,
        reason: String,
    },

    /// The object cache rejected or failed an operation.
    #[error("object cache error: {0}")]
    Cache(String),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("GET {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[cfg(feature = "gdal")]
    #[error(transparent)]
    Gdal(#[from] gdal::errors::GdalError),
}

impl ForestError {
    /// Wrap an `std::io::Error` together with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ForestError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ForestError>;
