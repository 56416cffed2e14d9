//! Error types for raster persistence.

use std::path::{Path, PathBuf};

use swath_common::SwathError;
use thiserror::Error;

/// Errors that can occur while reading or writing rasters.
#[derive(Error, Debug)]
pub enum RasterIoError {
    /// Filesystem error on a specific path.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TIFF encode/decode error.
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// Zarr store or codec error.
    #[error("Zarr error: {0}")]
    Zarr(String),

    /// NetCDF read error.
    #[error("NetCDF error: {0}")]
    Netcdf(String),

    /// Unreadable vector file (Shapefile).
    #[error("vector error in {path}: {message}")]
    Vector { path: PathBuf, message: String },

    /// Missing or malformed georeferencing metadata.
    #[error("invalid raster metadata: {0}")]
    InvalidMetadata(String),

    /// The raster cannot be represented in the target format.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Domain error from rebuilding grids, frames or stacks.
    #[error(transparent)]
    Swath(#[from] SwathError),
}

impl RasterIoError {
    /// Create an Io error for `path`.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create a Zarr error.
    pub fn zarr(msg: impl ToString) -> Self {
        Self::Zarr(msg.to_string())
    }

    /// Create a Vector error for `path`.
    pub fn vector(path: impl AsRef<Path>, msg: impl ToString) -> Self {
        Self::Vector {
            path: path.as_ref().to_path_buf(),
            message: msg.to_string(),
        }
    }

    /// Create an InvalidMetadata error.
    pub fn invalid_metadata(msg: impl Into<String>) -> Self {
        Self::InvalidMetadata(msg.into())
    }
}

/// Result type alias for raster persistence.
pub type Result<T> = std::result::Result<T, RasterIoError>;
