//! Swath Regridding and Time Stacking
//!
//! Turns irregularly geolocated satellite swaths into a regular
//! `(time, lat, lon)` series:
//!
//! - **Resampling**: nearest or Gaussian-weighted neighbour search over an
//!   R-tree of valid samples
//! - **Per-granule processing**: timestamp parsing and isolated failures
//! - **Stacking**: stable time ordering and daily means
//! - **Clipping**: polygon masks and crops in any supported CRS
//!
//! # Architecture
//!
//! ```text
//! GranuleSource (loader)
//!      │
//!      ▼
//! GranuleProcessor::process ──► GranuleStatus::Skipped (logged, batch continues)
//!      │
//!      ├─► parse_acquisition_time(id)
//!      ├─► NeighborResampler::resample(swath, grid)
//!      │
//!      ▼
//! ResampledFrame
//!      │
//!      ▼
//! TimeStacker::push / finish ──► TimeSeriesStack
//!      │                              │
//!      │                              ├─► daily_mean()
//!      │                              └─► SpatialClipper::clip()
//!      ▼
//! RasterSink (GeoTIFF / Zarr)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use swath_processor::{BatchRunner, GranuleProcessor, ProcessorConfig};
//!
//! let config = ProcessorConfig::from_env()?;
//! let runner = BatchRunner::new(GranuleProcessor::from_config(&config)?);
//! let report = runner.run(&granules);
//! let stack = report.stack?;
//! let daily = stack.daily_mean()?;
//! ```

pub mod batch;
pub mod clip;
pub mod config;
pub mod granule;
pub mod raster;
pub mod resample;
pub mod stack;
pub mod types;

// Re-export commonly used types at crate root
pub use batch::{BatchReport, BatchRunner};
pub use clip::{ClipMode, ClipPolygon, SpatialClipper};
pub use config::{ProcessorConfig, ResampleAlgorithm, ResampleParams};
pub use granule::{GranuleInput, GranuleProcessor, GranuleSource, GranuleStatus};
pub use raster::{RasterSink, RasterSource, SpatialRaster};
pub use resample::NeighborResampler;
pub use stack::{SharedStacker, TimeSeriesStack, TimeStacker};
pub use types::{ResampledFrame, SpatialDims};

pub use swath_common::{
    BoundingBox, CrsCode, GridAxes, GridDefinition, SwathDataset, SwathError, SwathResult,
};
