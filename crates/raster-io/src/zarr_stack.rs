//! Zarr V3 persistence for time stacks.
//!
//! Layout of a stack store:
//!
//! ```text
//! stacked_tsm.zarr/
//!   zarr.json        group
//!   TSM/             float32 (time, lat, lon), fill value = stack sentinel
//!   time/            int64 seconds since the Unix epoch
//!   lat/             float64
//!   lon/             float64
//! ```
//!
//! Every array carries an `_ARRAY_DIMENSIONS` attribute so xarray can open
//! the store directly. Coordinates are written as float64 and read back
//! unchanged, so reloaded axes are bit-identical to the written ones.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use swath_common::{time, BoundingBox, CrsCode, GridAxes, GridDefinition};
use swath_processor::{
    RasterSink, RasterSource, ResampledFrame, SpatialRaster, TimeSeriesStack, TimeStacker,
};
use tracing::{debug, info};
use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::{Array, ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::GroupBuilder;
use zarrs_filesystem::FilesystemStore;

use crate::error::{RasterIoError, Result};

/// Compression applied to the data variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ZarrCompression {
    /// No compression.
    None,
    /// Blosc with LZ4.
    BloscLz4,
    /// Blosc with Zstd.
    #[default]
    BloscZstd,
}

impl std::str::FromStr for ZarrCompression {
    type Err = RasterIoError;

    /// Case-insensitive; `lz4` and `zstd` are accepted for the blosc variants.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "lz4" | "blosc_lz4" => Ok(Self::BloscLz4),
            "zstd" | "blosc_zstd" => Ok(Self::BloscZstd),
            other => Err(RasterIoError::ConfigError(format!(
                "unknown compression '{}' (expected none, blosc_lz4 or blosc_zstd)",
                other
            ))),
        }
    }
}

impl ZarrCompression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::BloscLz4 => "blosc_lz4",
            Self::BloscZstd => "blosc_zstd",
        }
    }
}

/// Settings for writing stack stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZarrStackConfig {
    /// Name of the data variable.
    pub variable: String,
    /// Spatial chunk edge; each chunk holds one time slice.
    pub chunk_size: usize,
    pub compression: ZarrCompression,
    pub compression_level: u8,
    pub shuffle: bool,
}

impl Default for ZarrStackConfig {
    fn default() -> Self {
        Self {
            variable: "TSM".to_string(),
            chunk_size: 512,
            compression: ZarrCompression::default(),
            compression_level: 5,
            shuffle: true,
        }
    }
}

impl ZarrStackConfig {
    pub fn validate(&self) -> Result<()> {
        if self.variable.is_empty() || self.variable.contains('/') {
            return Err(RasterIoError::ConfigError(format!(
                "invalid variable name '{}'",
                self.variable
            )));
        }
        if self.chunk_size == 0 {
            return Err(RasterIoError::ConfigError(
                "chunk_size must be positive".to_string(),
            ));
        }
        if self.compression_level > 9 {
            return Err(RasterIoError::ConfigError(format!(
                "compression_level must be 0-9, got {}",
                self.compression_level
            )));
        }
        Ok(())
    }
}

/// Writes a stack to a Zarr store at a fixed path.
#[derive(Debug, Clone)]
pub struct ZarrStackWriter {
    store_path: PathBuf,
    config: ZarrStackConfig,
}

impl ZarrStackWriter {
    pub fn new(store_path: impl Into<PathBuf>, config: ZarrStackConfig) -> Self {
        Self {
            store_path: store_path.into(),
            config,
        }
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Write `stack`, replacing any store already at the path.
    pub fn write(&self, stack: &TimeSeriesStack) -> Result<PathBuf> {
        self.config.validate()?;
        let path = &self.store_path;
        if path.exists() {
            debug!(path = %path.display(), "Replacing existing store");
            std::fs::remove_dir_all(path).map_err(|e| RasterIoError::io(path, e))?;
        }
        std::fs::create_dir_all(path).map_err(|e| RasterIoError::io(path, e))?;
        let store = Arc::new(FilesystemStore::new(path).map_err(RasterIoError::zarr)?);

        let (t, h, w) = stack.shape();
        let dims = stack.spatial_dims().clone();
        let axes = stack.axes();

        let mut group_attrs = Map::new();
        group_attrs.insert("title".to_string(), json!("Total suspended matter time stack"));
        group_attrs.insert("crs".to_string(), json!(stack.crs().to_string()));
        GroupBuilder::new()
            .attributes(group_attrs)
            .build(store.clone(), "/")
            .map_err(RasterIoError::zarr)?
            .store_metadata()
            .map_err(RasterIoError::zarr)?;

        // Data variable
        let mut attrs = Map::new();
        attrs.insert(
            "_ARRAY_DIMENSIONS".to_string(),
            json!(["time", dims.y, dims.x]),
        );
        attrs.insert("units".to_string(), json!("g m-3"));
        attrs.insert("crs".to_string(), json!(stack.crs().to_string()));
        attrs.insert("crs_wkt".to_string(), json!(stack.crs().wkt()));
        attrs.insert("fill_value".to_string(), fill_to_json(stack.fill_value()));
        attrs.insert("resolution".to_string(), json!(axes.resolution()));
        attrs.insert("geotransform".to_string(), json!(geotransform(stack)));
        attrs.insert("labels".to_string(), json!(stack.labels()));
        if let Some(grid) = stack.grid() {
            attrs.insert("grid_bbox".to_string(), json!(grid.bbox().to_array()));
        }

        let chunk = self.config.chunk_size;
        let chunk_grid: zarrs::array::ChunkGrid =
            vec![1, h.clamp(1, chunk) as u64, w.clamp(1, chunk) as u64]
                .try_into()
                .map_err(|e| RasterIoError::ConfigError(format!("{:?}", e)))?;
        let mut binding = ArrayBuilder::new(
            vec![t as u64, h as u64, w as u64],
            DataType::Float32,
            chunk_grid,
            FillValue::from(stack.fill_value()),
        );
        let mut builder = binding.attributes(attrs);
        if self.config.compression != ZarrCompression::None {
            builder = builder.bytes_to_bytes_codecs(vec![self.compression_codec()?]);
        }
        let array = builder
            .build(store.clone(), &format!("/{}", self.config.variable))
            .map_err(RasterIoError::zarr)?;
        array.store_metadata().map_err(RasterIoError::zarr)?;
        if h * w > 0 {
            let subset = ArraySubset::new_with_start_shape(
                vec![0, 0, 0],
                vec![t as u64, h as u64, w as u64],
            )
            .map_err(RasterIoError::zarr)?;
            array
                .store_array_subset_elements(&subset, &stack.to_contiguous())
                .map_err(RasterIoError::zarr)?;
        }

        // Coordinates
        let seconds: Vec<i64> = stack.timestamps().iter().map(DateTime::timestamp).collect();
        let mut time_attrs = Map::new();
        time_attrs.insert("_ARRAY_DIMENSIONS".to_string(), json!(["time"]));
        time_attrs.insert("units".to_string(), json!("seconds since 1970-01-01T00:00:00Z"));
        time_attrs.insert("calendar".to_string(), json!("proleptic_gregorian"));
        write_vector(&store, "/time", DataType::Int64, FillValue::from(0i64), time_attrs, &seconds)?;

        let mut lat_attrs = Map::new();
        lat_attrs.insert("_ARRAY_DIMENSIONS".to_string(), json!([dims.y]));
        lat_attrs.insert("units".to_string(), json!("degrees_north"));
        write_vector(
            &store,
            &format!("/{}", dims.y),
            DataType::Float64,
            FillValue::from(f64::NAN),
            lat_attrs,
            axes.lats(),
        )?;

        let mut lon_attrs = Map::new();
        lon_attrs.insert("_ARRAY_DIMENSIONS".to_string(), json!([dims.x]));
        lon_attrs.insert("units".to_string(), json!("degrees_east"));
        write_vector(
            &store,
            &format!("/{}", dims.x),
            DataType::Float64,
            FillValue::from(f64::NAN),
            lon_attrs,
            axes.lons(),
        )?;

        info!(
            path = %path.display(),
            variable = %self.config.variable,
            layers = t,
            height = h,
            width = w,
            compression = self.config.compression.as_str(),
            "Wrote Zarr stack"
        );
        Ok(path.clone())
    }

    fn compression_codec(&self) -> Result<Arc<dyn zarrs::array::codec::BytesToBytesCodecTraits>> {
        let level = BloscCompressionLevel::try_from(self.config.compression_level)
            .map_err(|_| RasterIoError::ConfigError("Invalid compression level".to_string()))?;
        let (shuffle, typesize) = if self.config.shuffle {
            (BloscShuffleMode::Shuffle, Some(std::mem::size_of::<f32>()))
        } else {
            (BloscShuffleMode::NoShuffle, None)
        };
        let compressor = match self.config.compression {
            ZarrCompression::None => {
                return Err(RasterIoError::ConfigError(
                    "No compression configured".to_string(),
                ))
            }
            ZarrCompression::BloscLz4 => BloscCompressor::LZ4,
            ZarrCompression::BloscZstd => BloscCompressor::Zstd,
        };
        let codec = BloscCodec::new(compressor, level, None, shuffle, typesize)
            .map_err(|e| RasterIoError::ConfigError(e.to_string()))?;
        Ok(Arc::new(codec))
    }
}

impl RasterSink for ZarrStackWriter {
    type Error = RasterIoError;

    /// A single frame is stored as a one-layer stack.
    fn write_frame(&self, frame: &ResampledFrame) -> Result<PathBuf> {
        let stack = TimeStacker::from_frames([frame.clone()]).finish()?;
        self.write(&stack)
    }

    fn write_stack(&self, stack: &TimeSeriesStack) -> Result<Vec<PathBuf>> {
        self.write(stack).map(|path| vec![path])
    }
}

/// Reads stores written by [`ZarrStackWriter`].
#[derive(Debug, Clone)]
pub struct ZarrStackReader {
    variable: String,
}

impl Default for ZarrStackReader {
    fn default() -> Self {
        Self::new(ZarrStackConfig::default().variable)
    }
}

impl ZarrStackReader {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
        }
    }

    pub fn read(&self, store_path: &Path) -> Result<TimeSeriesStack> {
        let store = Arc::new(FilesystemStore::new(store_path).map_err(RasterIoError::zarr)?);
        let array = Array::open(store.clone(), &format!("/{}", self.variable))
            .map_err(RasterIoError::zarr)?;
        let shape = array.shape().to_vec();
        let [t, h, w] = shape[..] else {
            return Err(RasterIoError::invalid_metadata(format!(
                "'{}' has {} dimensions, expected 3",
                self.variable,
                shape.len()
            )));
        };
        let (t, h, w) = (t as usize, h as usize, w as usize);
        let attrs = array.attributes();

        let dims: Vec<String> = attrs
            .get("_ARRAY_DIMENSIONS")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_else(|| vec!["time".into(), "lat".into(), "lon".into()]);
        let [_, y_dim, x_dim] = &dims[..] else {
            return Err(RasterIoError::invalid_metadata("_ARRAY_DIMENSIONS must name 3 dimensions"));
        };

        let resolution = attrs
            .get("resolution")
            .and_then(Value::as_f64)
            .ok_or_else(|| RasterIoError::invalid_metadata("missing resolution attribute"))?;
        let fill_value = attrs.get("fill_value").map(fill_from_json).unwrap_or(f32::NAN);
        let crs = match attrs.get("crs").and_then(Value::as_str) {
            Some(code) => CrsCode::parse(code)?,
            None => CrsCode::Epsg4326,
        };

        let lats: Vec<f64> = read_vector(&store, &format!("/{}", y_dim), h)?;
        let lons: Vec<f64> = read_vector(&store, &format!("/{}", x_dim), w)?;
        let seconds: Vec<i64> = read_vector(&store, "/time", t)?;
        let timestamps = seconds
            .iter()
            .map(|s| {
                Utc.timestamp_opt(*s, 0)
                    .single()
                    .ok_or_else(|| RasterIoError::invalid_metadata(format!("bad time value {}", s)))
            })
            .collect::<Result<Vec<_>>>()?;
        let labels: Vec<String> = attrs
            .get("labels")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .filter(|l: &Vec<String>| l.len() == t)
            .unwrap_or_else(|| timestamps.iter().map(time::timestamp_token).collect());

        let cells = h * w;
        let data: Vec<f32> = if cells == 0 {
            Vec::new()
        } else {
            let subset = ArraySubset::new_with_shape(shape.clone());
            array
                .retrieve_array_subset_elements(&subset)
                .map_err(RasterIoError::zarr)?
        };
        let layers: Vec<Vec<f32>> = if cells == 0 {
            vec![Vec::new(); t]
        } else {
            data.chunks(cells).map(<[f32]>::to_vec).collect()
        };

        let axes = GridAxes::new(lats, lons, resolution);
        let mut stack =
            TimeSeriesStack::from_parts(axes, crs, fill_value, timestamps, labels, layers)?;
        if let Some(bbox) = attrs
            .get("grid_bbox")
            .and_then(|v| serde_json::from_value::<[f64; 4]>(v.clone()).ok())
        {
            let bbox = BoundingBox::new(bbox[0], bbox[1], bbox[2], bbox[3]);
            if let Ok(grid) = GridDefinition::build(bbox, resolution) {
                stack = stack.with_grid(grid);
            }
        }
        stack.set_spatial_dims(x_dim, y_dim);

        debug!(path = %store_path.display(), layers = t, height = h, width = w, "Read Zarr stack");
        Ok(stack)
    }
}

impl RasterSource for ZarrStackReader {
    type Error = RasterIoError;

    /// Read a store holding exactly one layer.
    fn read_frame(&self, path: &Path) -> Result<ResampledFrame> {
        let stack = self.read(path)?;
        if stack.len() != 1 {
            return Err(RasterIoError::Unsupported(format!(
                "{} holds {} layers, expected 1",
                path.display(),
                stack.len()
            )));
        }
        stack.frame(0).ok_or_else(|| {
            RasterIoError::Unsupported("cropped store has no full grid".to_string())
        })
    }

    fn read_stack(&self, path: &Path) -> Result<TimeSeriesStack> {
        self.read(path)
    }
}

/// `(x0, res, 0, y_top, 0, -res)` for the stack's axes. Uncropped stacks use
/// the configured bbox corner.
fn geotransform(stack: &TimeSeriesStack) -> [f64; 6] {
    if let Some(grid) = stack.grid() {
        return grid.geotransform();
    }
    let axes = stack.axes();
    let res = axes.resolution();
    match axes.extent() {
        Some(extent) => [extent.min_lon, res, 0.0, extent.max_lat, 0.0, -res],
        None => [0.0, res, 0.0, 0.0, 0.0, -res],
    }
}

fn fill_to_json(fill: f32) -> Value {
    if fill.is_nan() {
        json!("nan")
    } else {
        json!(fill)
    }
}

fn fill_from_json(value: &Value) -> f32 {
    match value {
        Value::Number(n) => n.as_f64().map(|v| v as f32).unwrap_or(f32::NAN),
        _ => f32::NAN,
    }
}

fn write_vector<T: zarrs::array::Element>(
    store: &Arc<FilesystemStore>,
    path: &str,
    data_type: DataType,
    fill_value: FillValue,
    attrs: Map<String, Value>,
    values: &[T],
) -> Result<()> {
    let chunk_grid: zarrs::array::ChunkGrid = vec![values.len().max(1) as u64]
        .try_into()
        .map_err(|e| RasterIoError::ConfigError(format!("{:?}", e)))?;
    let array = ArrayBuilder::new(vec![values.len() as u64], data_type, chunk_grid, fill_value)
        .attributes(attrs)
        .build(store.clone(), path)
        .map_err(RasterIoError::zarr)?;
    array.store_metadata().map_err(RasterIoError::zarr)?;
    if !values.is_empty() {
        let subset = ArraySubset::new_with_shape(vec![values.len() as u64]);
        array
            .store_array_subset_elements(&subset, values)
            .map_err(RasterIoError::zarr)?;
    }
    Ok(())
}

fn read_vector<T: zarrs::array::ElementOwned>(
    store: &Arc<FilesystemStore>,
    path: &str,
    expected_len: usize,
) -> Result<Vec<T>> {
    let array = Array::open(store.clone(), path).map_err(RasterIoError::zarr)?;
    let len = array.shape().first().copied().unwrap_or(0) as usize;
    if array.shape().len() != 1 || len != expected_len {
        return Err(RasterIoError::invalid_metadata(format!(
            "'{}' has shape {:?}, expected [{}]",
            path,
            array.shape(),
            expected_len
        )));
    }
    if len == 0 {
        return Ok(Vec::new());
    }
    let subset = ArraySubset::new_with_shape(vec![len as u64]);
    array
        .retrieve_array_subset_elements(&subset)
        .map_err(RasterIoError::zarr)
}
