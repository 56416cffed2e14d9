//! Raster persistence for gridded TSM data.
//!
//! - [`GeoTiffWriter`] / [`GeoTiffReader`]: one float32 GeoTIFF per time slice
//! - [`ZarrStackWriter`] / [`ZarrStackReader`]: whole `(time, lat, lon)` stacks
//!   as Zarr V3 stores
//! - [`ZarrGranuleSource`], [`discover_granules`]: file-backed granule loaders
//!   for the batch runner (MERIS NetCDF folders with the `netcdf` feature)
//! - [`read_clip_polygon`]: clip polygons from Shapefile, GeoJSON or WKT files
//!
//! Writers implement [`swath_processor::RasterSink`] and readers
//! [`swath_processor::RasterSource`], so they plug into
//! [`swath_processor::SpatialRaster::export_raster`].

pub mod error;
pub mod geotiff;
pub mod granule_source;
#[cfg(feature = "netcdf")]
pub mod netcdf_source;
pub mod vector;
pub mod zarr_stack;

pub use error::{RasterIoError, Result};
pub use geotiff::{GeoTiffReader, GeoTiffWriter};
pub use granule_source::{discover_granules, write_zarr_granule, DirectoryGranule, ZarrGranuleSource};
#[cfg(feature = "netcdf")]
pub use netcdf_source::NetcdfGranuleSource;
pub use vector::{crs_from_prj, read_clip_polygon};
pub use zarr_stack::{ZarrCompression, ZarrStackConfig, ZarrStackReader, ZarrStackWriter};
