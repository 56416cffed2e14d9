//! Single-band float32 GeoTIFF slices.
//!
//! One file per time slice, named `{prefix}_{YYYYMMDDTHHMMSS}.tif`; a slice
//! whose timestamp is already taken in the same stack gets its label
//! appended instead of overwriting the earlier file. Rows are
//! written north-up, so row 0 of the file is the northernmost grid row.
//! Georeferencing is carried in the standard GeoTIFF tags; the grid
//! definition itself (bbox, resolution) and the acquisition time go into a
//! GDAL_METADATA block so a reader can rebuild bit-identical axes.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use swath_common::{BoundingBox, CrsCode, GridDefinition};
use swath_processor::{RasterSink, RasterSource, ResampledFrame, TimeSeriesStack, TimeStacker};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{RasterIoError, Result};

/// ModelPixelScaleTag.
const MODEL_PIXEL_SCALE: u16 = 33550;
/// ModelTiepointTag.
const MODEL_TIEPOINT: u16 = 33922;
/// GeoKeyDirectoryTag.
const GEO_KEY_DIRECTORY: u16 = 34735;
/// GDAL's XML metadata block.
pub const GDAL_METADATA: u16 = 42112;
/// GDAL's no-data sentinel, as ASCII.
pub const GDAL_NODATA: u16 = 42113;

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Writes frames as GeoTIFF slices into one directory.
#[derive(Debug, Clone)]
pub struct GeoTiffWriter {
    output_dir: PathBuf,
    prefix: String,
}

impl GeoTiffWriter {
    pub fn new(output_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Where `frame` will be written.
    pub fn path_for(&self, frame: &ResampledFrame) -> PathBuf {
        self.output_dir
            .join(format!("{}_{}.tif", self.prefix, frame.timestamp_token()))
    }

    /// [`path_for`](Self::path_for), unless that name is already in `taken`;
    /// then `{prefix}_{timestamp}_{label}.tif`, with the layer index added
    /// if the label repeats too.
    fn unique_path_for(&self, frame: &ResampledFrame, t: usize, taken: &HashSet<PathBuf>) -> PathBuf {
        let path = self.path_for(frame);
        if !taken.contains(&path) {
            return path;
        }
        let base = format!(
            "{}_{}_{}",
            self.prefix,
            frame.timestamp_token(),
            file_safe(&frame.granule_id)
        );
        let labelled = self.output_dir.join(format!("{}.tif", base));
        let path = if taken.contains(&labelled) {
            self.output_dir.join(format!("{}_{}.tif", base, t))
        } else {
            labelled
        };
        warn!(
            granule_id = %frame.granule_id,
            timestamp = %frame.timestamp,
            path = %path.display(),
            "Duplicate slice timestamp, writing under a distinct name"
        );
        path
    }

    fn encode(&self, frame: &ResampledFrame, path: &Path) -> Result<()> {
        let (height, width) = frame.shape();
        if width == 0 || height == 0 {
            return Err(RasterIoError::Unsupported(
                "GeoTIFF cannot hold a zero-extent raster".to_string(),
            ));
        }
        let geo_keys = geo_key_directory(frame.crs)?;
        let gt = frame.grid.geotransform();
        let metadata = metadata_xml(&frame.grid.bbox(), frame.grid.resolution(), frame);

        let file = File::create(path).map_err(|e| RasterIoError::io(path, e))?;
        let mut encoder = TiffEncoder::new(BufWriter::new(file))?;
        let mut image = encoder.new_image::<colortype::Gray32Float>(width as u32, height as u32)?;
        {
            let dir = image.encoder();
            dir.write_tag(tag(MODEL_PIXEL_SCALE), &[gt[1], -gt[5], 0.0][..])?;
            dir.write_tag(tag(MODEL_TIEPOINT), &[0.0, 0.0, 0.0, gt[0], gt[3], 0.0][..])?;
            dir.write_tag(tag(GEO_KEY_DIRECTORY), &geo_keys[..])?;
            dir.write_tag(tag(GDAL_NODATA), nodata_string(frame.fill_value).as_str())?;
            dir.write_tag(tag(GDAL_METADATA), metadata.as_str())?;
        }
        image.write_data(&flip_rows(&frame.values, width))?;
        Ok(())
    }
}

impl RasterSink for GeoTiffWriter {
    type Error = RasterIoError;

    fn write_frame(&self, frame: &ResampledFrame) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir).map_err(|e| RasterIoError::io(&self.output_dir, e))?;
        let path = self.path_for(frame);
        self.encode(frame, &path)?;
        debug!(path = %path.display(), granule_id = %frame.granule_id, "Wrote GeoTIFF slice");
        Ok(path)
    }

    /// One file per layer. Only stacks still covering their full grid can be
    /// written, since each slice records the grid it was produced on.
    fn write_stack(&self, stack: &TimeSeriesStack) -> Result<Vec<PathBuf>> {
        if stack.grid().is_none() {
            return Err(RasterIoError::Unsupported(
                "per-slice GeoTIFF export needs an uncropped stack".to_string(),
            ));
        }
        fs::create_dir_all(&self.output_dir).map_err(|e| RasterIoError::io(&self.output_dir, e))?;
        let mut taken = HashSet::new();
        let mut paths = Vec::with_capacity(stack.len());
        for t in 0..stack.len() {
            let Some(frame) = stack.frame(t) else {
                continue;
            };
            let path = self.unique_path_for(&frame, t, &taken);
            self.encode(&frame, &path)?;
            debug!(path = %path.display(), granule_id = %frame.granule_id, "Wrote GeoTIFF slice");
            taken.insert(path.clone());
            paths.push(path);
        }
        info!(
            slices = paths.len(),
            dir = %self.output_dir.display(),
            "Wrote GeoTIFF slices"
        );
        Ok(paths)
    }
}

/// Reads slices written by [`GeoTiffWriter`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoTiffReader;

impl GeoTiffReader {
    pub fn new() -> Self {
        Self
    }

    /// All `.tif` files directly inside `dir`, sorted by name.
    pub fn list_slices(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| {
                let io = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory loop"));
                RasterIoError::io(dir, io)
            })?;
            let is_tif = entry
                .path()
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("tif") || ext.eq_ignore_ascii_case("tiff"))
                .unwrap_or(false);
            if entry.file_type().is_file() && is_tif {
                paths.push(entry.into_path());
            }
        }
        paths.sort();
        Ok(paths)
    }
}

impl RasterSource for GeoTiffReader {
    type Error = RasterIoError;

    fn read_frame(&self, path: &Path) -> Result<ResampledFrame> {
        let file = File::open(path).map_err(|e| RasterIoError::io(path, e))?;
        let mut decoder = Decoder::new(BufReader::new(file))?.with_limits(Limits::unlimited());
        let (width, height) = decoder.dimensions()?;
        let (width, height) = (width as usize, height as usize);

        let metadata = decoder
            .find_tag(tag(GDAL_METADATA))?
            .ok_or_else(|| RasterIoError::invalid_metadata("missing GDAL_METADATA tag"))?
            .into_string()?;
        let fill_value = match decoder.find_tag(tag(GDAL_NODATA))? {
            Some(value) => parse_nodata(&value.into_string()?)?,
            None => f32::NAN,
        };

        let bbox = parse_bbox(&metadata_item(&metadata, "bbox")?)?;
        let resolution: f64 = metadata_item(&metadata, "resolution")?
            .parse()
            .map_err(|e| RasterIoError::invalid_metadata(format!("resolution: {}", e)))?;
        let timestamp = DateTime::parse_from_rfc3339(&metadata_item(&metadata, "acquisition_time")?)
            .map_err(|e| RasterIoError::invalid_metadata(format!("acquisition_time: {}", e)))?
            .with_timezone(&Utc);
        let granule_id = match metadata_item(&metadata, "granule_id") {
            Ok(id) => id,
            Err(_) => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        let crs = match metadata_item(&metadata, "crs") {
            Ok(code) => CrsCode::parse(&code)?,
            Err(_) => CrsCode::Epsg4326,
        };

        let grid = GridDefinition::build(bbox, resolution)?;
        if grid.shape() != (height, width) {
            return Err(RasterIoError::invalid_metadata(format!(
                "image is {}x{} but recorded grid is {}x{}",
                height,
                width,
                grid.height(),
                grid.width()
            )));
        }

        let north_up = match decoder.read_image()? {
            DecodingResult::F32(data) => data,
            _ => {
                return Err(RasterIoError::Unsupported(format!(
                    "{} is not a float32 raster",
                    path.display()
                )))
            }
        };

        let mut frame = ResampledFrame::new(
            grid,
            flip_rows(&north_up, width),
            timestamp,
            granule_id,
            fill_value,
        )?;
        frame.crs = crs;
        Ok(frame)
    }

    /// Every slice in the directory `path`, stacked by acquisition time.
    fn read_stack(&self, path: &Path) -> Result<TimeSeriesStack> {
        let mut stacker = TimeStacker::new();
        for slice in Self::list_slices(path)? {
            stacker.push(self.read_frame(&slice)?)?;
        }
        Ok(stacker.finish()?)
    }
}

/// Label reduced to characters safe in a file name.
fn file_safe(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Reverse row order; south-up grid rows to north-up image rows and back.
fn flip_rows(values: &[f32], width: usize) -> Vec<f32> {
    if width == 0 {
        return Vec::new();
    }
    values.rchunks(width).flatten().copied().collect()
}

/// GeoKey directory declaring a geographic model with the given EPSG code.
fn geo_key_directory(crs: CrsCode) -> Result<Vec<u16>> {
    if !crs.is_geographic() {
        return Err(RasterIoError::Unsupported(format!(
            "{} cannot georeference a lat/lon raster",
            crs
        )));
    }
    Ok(vec![
        1, 1, 0, 3, // header: version, revision, minor, key count
        1024, 0, 1, 2, // GTModelTypeGeoKey = ModelTypeGeographic
        1025, 0, 1, 1, // GTRasterTypeGeoKey = RasterPixelIsArea
        2048, 0, 1, crs.epsg(), // GeographicTypeGeoKey
    ])
}

fn nodata_string(fill: f32) -> String {
    if fill.is_nan() {
        "nan".to_string()
    } else {
        fill.to_string()
    }
}

fn parse_nodata(text: &str) -> Result<f32> {
    let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    if text.eq_ignore_ascii_case("nan") {
        return Ok(f32::NAN);
    }
    text.parse()
        .map_err(|e| RasterIoError::invalid_metadata(format!("GDAL_NODATA '{}': {}", text, e)))
}

fn metadata_xml(bbox: &BoundingBox, resolution: f64, frame: &ResampledFrame) -> String {
    let items = [
        (
            "bbox",
            format!(
                "{},{},{},{}",
                bbox.min_lon, bbox.min_lat, bbox.max_lon, bbox.max_lat
            ),
        ),
        ("resolution", resolution.to_string()),
        (
            "acquisition_time",
            frame.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        ),
        ("granule_id", frame.granule_id.clone()),
        ("crs", frame.crs.to_string()),
    ];
    let mut xml = String::from("<GDALMetadata>");
    for (name, value) in items {
        xml.push_str(&format!("<Item name=\"{}\">{}</Item>", name, escape_xml(&value)));
    }
    xml.push_str("</GDALMetadata>");
    xml
}

fn metadata_item(xml: &str, name: &str) -> Result<String> {
    let open = format!("<Item name=\"{}\">", name);
    let start = xml
        .find(&open)
        .map(|i| i + open.len())
        .ok_or_else(|| RasterIoError::invalid_metadata(format!("missing metadata item '{}'", name)))?;
    let len = xml[start..]
        .find("</Item>")
        .ok_or_else(|| RasterIoError::invalid_metadata(format!("unterminated item '{}'", name)))?;
    Ok(unescape_xml(&xml[start..start + len]))
}

fn parse_bbox(text: &str) -> Result<BoundingBox> {
    BoundingBox::from_bbox_string(text)
        .map_err(|e| RasterIoError::invalid_metadata(format!("bbox '{}': {}", text, e)))
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn unescape_xml(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&gt;", ">")
        .replace("&lt;", "<")
        .replace("&amp;", "&")
}
