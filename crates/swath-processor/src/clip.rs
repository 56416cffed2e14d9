//! Region-of-interest clipping.
//!
//! Clipping only masks (and optionally crops) cells; values are never
//! resampled and axis spacing is never changed.

use rayon::prelude::*;
use serde::Deserialize;
use swath_common::{is_fill, BoundingBox, CrsCode, SwathError, SwathResult};
use tracing::{debug, info};

use crate::stack::TimeSeriesStack;
use crate::types::ResampledFrame;

/// Closed ring of `(x, y)` vertices.
pub type Ring = Vec<(f64, f64)>;

/// One polygon: exterior ring followed by zero or more holes.
pub type Polygon = Vec<Ring>;

/// Union of polygons in a known CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipPolygon {
    polygons: Vec<Polygon>,
    crs: CrsCode,
}

impl ClipPolygon {
    /// Build from explicit polygons. Rings need at least three distinct
    /// vertices; a repeated closing vertex is optional.
    pub fn new(polygons: Vec<Polygon>, crs: CrsCode) -> SwathResult<Self> {
        if polygons.is_empty() {
            return Err(clip_error("no polygons"));
        }
        for ring in polygons.iter().flatten() {
            let distinct = if ring.first() == ring.last() {
                ring.len().saturating_sub(1)
            } else {
                ring.len()
            };
            if distinct < 3 {
                return Err(clip_error(format!(
                    "ring has {} distinct vertices, need at least 3",
                    distinct
                )));
            }
            if ring.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
                return Err(clip_error("non-finite vertex"));
            }
        }
        Ok(Self { polygons, crs })
    }

    /// Axis-aligned rectangle as a polygon.
    pub fn from_bbox(bbox: BoundingBox, crs: CrsCode) -> Self {
        let ring = vec![
            (bbox.min_lon, bbox.min_lat),
            (bbox.max_lon, bbox.min_lat),
            (bbox.max_lon, bbox.max_lat),
            (bbox.min_lon, bbox.max_lat),
            (bbox.min_lon, bbox.min_lat),
        ];
        Self {
            polygons: vec![vec![ring]],
            crs,
        }
    }

    /// Parse GeoJSON: a `Polygon`, `MultiPolygon`, `Feature`,
    /// `FeatureCollection`, or `GeometryCollection`. All polygonal parts are
    /// unioned; other geometry types are ignored.
    ///
    /// A legacy named `crs` member (`{"type":"name","properties":{"name":..}}`)
    /// overrides `default_crs`.
    pub fn from_geojson(text: &str, default_crs: CrsCode) -> SwathResult<Self> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| clip_error(format!("invalid GeoJSON: {}", e)))?;

        let crs = match value
            .pointer("/crs/properties/name")
            .and_then(|name| name.as_str())
        {
            Some(name) => CrsCode::parse(name)?,
            None => default_crs,
        };

        let object: GeoJsonObject = serde_json::from_value(value)
            .map_err(|e| clip_error(format!("unsupported GeoJSON: {}", e)))?;

        let mut polygons = Vec::new();
        object.collect_polygons(&mut polygons)?;
        debug!(polygons = polygons.len(), crs = %crs, "Parsed GeoJSON clip geometry");
        Self::new(polygons, crs)
    }

    /// Parse WKT `POLYGON` or `MULTIPOLYGON`, holes included.
    pub fn from_wkt(text: &str, crs: CrsCode) -> SwathResult<Self> {
        let text = text.trim();

        let (is_multi, body) = if let Some(rest) = strip_keyword(text, "MULTIPOLYGON") {
            (true, rest)
        } else if let Some(rest) = strip_keyword(text, "POLYGON") {
            (false, rest)
        } else {
            return Err(clip_error("expected POLYGON or MULTIPOLYGON"));
        };

        let body = strip_dimension_tag(body.trim_start()).trim();
        if body.eq_ignore_ascii_case("EMPTY") {
            return Err(clip_error("empty geometry"));
        }

        let mut parser = WktParser::new(body);
        let tree = parser.parse_list()?;
        parser.expect_end()?;

        let polygons = if is_multi {
            tree.into_list()?
                .into_iter()
                .map(WktNode::into_polygon)
                .collect::<SwathResult<Vec<_>>>()?
        } else {
            vec![tree.into_polygon()?]
        };
        Self::new(polygons, crs)
    }

    /// Either GeoJSON or WKT, sniffed from the first character.
    pub fn parse(text: &str, default_crs: CrsCode) -> SwathResult<Self> {
        if text.trim_start().starts_with('{') {
            Self::from_geojson(text, default_crs)
        } else {
            Self::from_wkt(text, default_crs)
        }
    }

    pub fn crs(&self) -> CrsCode {
        self.crs
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    /// Transform every vertex into `target`.
    pub fn reproject(&self, target: CrsCode) -> ClipPolygon {
        if target == self.crs {
            return self.clone();
        }
        let polygons = self
            .polygons
            .iter()
            .map(|polygon| {
                polygon
                    .iter()
                    .map(|ring| {
                        ring.iter()
                            .map(|(x, y)| self.crs.transform_to(target, *x, *y))
                            .collect()
                    })
                    .collect()
            })
            .collect();
        ClipPolygon {
            polygons,
            crs: target,
        }
    }

    /// Point-in-polygon by the even-odd rule over each polygon's rings, so
    /// holes are excluded. Inside any polygon counts as inside.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.polygons
            .iter()
            .any(|polygon| polygon.iter().filter(|ring| ring_crosses(ring, x, y)).count() % 2 == 1)
    }

    /// Extent of all vertices.
    pub fn bounds(&self) -> Option<BoundingBox> {
        self.polygons
            .iter()
            .flatten()
            .flatten()
            .fold(None, |acc: Option<BoundingBox>, (x, y)| {
                Some(match acc {
                    None => BoundingBox::new(*x, *y, *x, *y),
                    Some(b) => BoundingBox::new(
                        b.min_lon.min(*x),
                        b.min_lat.min(*y),
                        b.max_lon.max(*x),
                        b.max_lat.max(*y),
                    ),
                })
            })
    }
}

/// Ray casting against one ring: `true` if a ray from the point crosses the
/// ring an odd number of times.
fn ring_crosses(ring: &[(f64, f64)], x: f64, y: f64) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];
        if ((yi > y) != (yj > y)) && (x < (xj - xi) * (y - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Case-insensitive keyword prefix strip.
fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    text.get(..keyword.len())
        .filter(|head| head.eq_ignore_ascii_case(keyword))
        .map(|_| &text[keyword.len()..])
}

/// Drop a `Z`, `M` or `ZM` tag; the extra ordinates are ignored.
fn strip_dimension_tag(text: &str) -> &str {
    for tag in ["ZM", "Z", "M"] {
        if let Some(rest) = strip_keyword(text, tag) {
            if !rest.starts_with(|c: char| c.is_ascii_alphabetic()) {
                return rest;
            }
        }
    }
    text
}

fn clip_error(message: impl Into<String>) -> SwathError {
    SwathError::invalid_parameter("clip_polygon", message)
}

// ============================================================================
// GeoJSON
// ============================================================================

type Position = Vec<f64>;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum GeoJsonObject {
    Polygon {
        coordinates: Vec<Vec<Position>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<Position>>>,
    },
    GeometryCollection {
        geometries: Vec<GeoJsonObject>,
    },
    Feature {
        geometry: Option<Box<GeoJsonObject>>,
    },
    FeatureCollection {
        features: Vec<GeoJsonObject>,
    },
    #[serde(other)]
    Unsupported,
}

impl GeoJsonObject {
    fn collect_polygons(self, out: &mut Vec<Polygon>) -> SwathResult<()> {
        match self {
            GeoJsonObject::Polygon { coordinates } => out.push(rings_from_positions(coordinates)?),
            GeoJsonObject::MultiPolygon { coordinates } => {
                for polygon in coordinates {
                    out.push(rings_from_positions(polygon)?);
                }
            }
            GeoJsonObject::GeometryCollection { geometries } => {
                for geometry in geometries {
                    geometry.collect_polygons(out)?;
                }
            }
            GeoJsonObject::Feature { geometry } => {
                if let Some(geometry) = geometry {
                    geometry.collect_polygons(out)?;
                }
            }
            GeoJsonObject::FeatureCollection { features } => {
                for feature in features {
                    feature.collect_polygons(out)?;
                }
            }
            GeoJsonObject::Unsupported => {}
        }
        Ok(())
    }
}

fn rings_from_positions(rings: Vec<Vec<Position>>) -> SwathResult<Polygon> {
    rings
        .into_iter()
        .map(|ring| {
            ring.into_iter()
                .map(|pos| match pos.as_slice() {
                    [x, y, ..] => Ok((*x, *y)),
                    _ => Err(clip_error("position needs at least two coordinates")),
                })
                .collect()
        })
        .collect()
}

// ============================================================================
// WKT
// ============================================================================

#[derive(Debug)]
enum WktNode {
    Coord(f64, f64),
    List(Vec<WktNode>),
}

impl WktNode {
    fn into_list(self) -> SwathResult<Vec<WktNode>> {
        match self {
            WktNode::List(items) => Ok(items),
            WktNode::Coord(..) => Err(clip_error("expected '(' in WKT")),
        }
    }

    fn into_ring(self) -> SwathResult<Ring> {
        self.into_list()?
            .into_iter()
            .map(|node| match node {
                WktNode::Coord(x, y) => Ok((x, y)),
                WktNode::List(_) => Err(clip_error("unexpected nesting in WKT ring")),
            })
            .collect()
    }

    fn into_polygon(self) -> SwathResult<Polygon> {
        self.into_list()?.into_iter().map(WktNode::into_ring).collect()
    }
}

struct WktParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> WktParser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn skip_ws(&mut self) {
        let rest = &self.input[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self, expected: char) -> SwathResult<()> {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            Ok(())
        } else {
            Err(clip_error(format!(
                "expected '{}' at offset {} in WKT",
                expected, self.pos
            )))
        }
    }

    fn expect_end(&mut self) -> SwathResult<()> {
        match self.peek() {
            None => Ok(()),
            Some(c) => Err(clip_error(format!("trailing '{}' in WKT", c))),
        }
    }

    /// `( item, item, ... )` where each item is a nested list or a coordinate.
    fn parse_list(&mut self) -> SwathResult<WktNode> {
        self.bump('(')?;
        let mut items = Vec::new();
        loop {
            let item = if self.peek() == Some('(') {
                self.parse_list()?
            } else {
                self.parse_coord()?
            };
            items.push(item);
            match self.peek() {
                Some(',') => self.bump(',')?,
                Some(')') => {
                    self.bump(')')?;
                    return Ok(WktNode::List(items));
                }
                _ => return Err(clip_error("unterminated WKT list")),
            }
        }
    }

    /// `x y [z [m]]`; extra ordinates are dropped.
    fn parse_coord(&mut self) -> SwathResult<WktNode> {
        self.skip_ws();
        let rest = &self.input[self.pos..];
        let len = rest.find([',', ')']).unwrap_or(rest.len());
        let token = &rest[..len];
        self.pos += len;

        let mut parts = token.split_whitespace().map(|p| {
            p.parse::<f64>()
                .map_err(|_| clip_error(format!("invalid WKT number '{}'", p)))
        });
        match (parts.next(), parts.next()) {
            (Some(x), Some(y)) => Ok(WktNode::Coord(x?, y?)),
            _ => Err(clip_error(format!("expected 'x y', got '{}'", token.trim()))),
        }
    }
}

// ============================================================================
// Clipper
// ============================================================================

/// What to do with cells outside the polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClipMode {
    /// Set them to the fill value; keep the full extent.
    #[default]
    Mask,
    /// Mask, then crop to the smallest rectangle holding every cell that is
    /// inside the polygon and non-fill in at least one layer.
    Drop,
}

/// Masks or crops rasters to a region of interest.
#[derive(Debug, Clone)]
pub struct SpatialClipper {
    polygon: ClipPolygon,
    mode: ClipMode,
}

impl SpatialClipper {
    pub fn new(polygon: ClipPolygon, mode: ClipMode) -> Self {
        Self { polygon, mode }
    }

    pub fn mode(&self) -> ClipMode {
        self.mode
    }

    pub fn polygon(&self) -> &ClipPolygon {
        &self.polygon
    }

    /// `true` for every cell whose centre is inside the polygon, row-major.
    fn inside_mask(&self, lats: &[f64], lons: &[f64], crs: CrsCode) -> Vec<bool> {
        let polygon = self.polygon.reproject(crs);
        let bounds = polygon.bounds();
        let width = lons.len();
        let mut mask = vec![false; lats.len() * width];
        if width == 0 {
            return mask;
        }

        mask.par_chunks_mut(width)
            .zip(lats.par_iter())
            .for_each(|(row, lat)| {
                if let Some(b) = bounds {
                    if *lat < b.min_lat || *lat > b.max_lat {
                        return;
                    }
                }
                for (cell, lon) in row.iter_mut().zip(lons) {
                    *cell = polygon.contains(*lon, *lat);
                }
            });
        mask
    }

    /// Mask one frame. The frame keeps its full grid whatever the mode;
    /// cropping applies to stacks.
    pub fn clip_frame(&self, frame: &ResampledFrame) -> SwathResult<ResampledFrame> {
        let mask = self.inside_mask(frame.grid.lats(), frame.grid.lons(), frame.crs);
        let mut clipped = frame.clone();
        apply_mask(&mut clipped.values, &mask, frame.fill_value);
        Ok(clipped)
    }

    /// Clip every layer of a stack.
    pub fn clip(&self, stack: &TimeSeriesStack) -> SwathResult<TimeSeriesStack> {
        let axes = stack.axes();
        let mask = self.inside_mask(axes.lats(), axes.lons(), stack.crs());
        let fill = stack.fill_value();
        let inside = mask.iter().filter(|m| **m).count();

        let layers: Vec<Vec<f32>> = stack
            .layers()
            .par_iter()
            .map(|layer| {
                let mut out = layer.clone();
                apply_mask(&mut out, &mask, fill);
                out
            })
            .collect();

        let clipped = match self.mode {
            ClipMode::Mask => stack.derive(
                axes.clone(),
                stack.timestamps().to_vec(),
                stack.labels().to_vec(),
                layers,
            ),
            ClipMode::Drop => {
                let (rows, cols) = data_window(&layers, axes.width(), axes.height(), fill);
                let width = axes.width();
                let cropped = layers
                    .into_iter()
                    .map(|layer| {
                        rows.clone()
                            .flat_map(|row| {
                                let start = row * width;
                                layer[start + cols.start..start + cols.end].to_vec()
                            })
                            .collect()
                    })
                    .collect();
                stack.derive(
                    axes.crop(rows, cols),
                    stack.timestamps().to_vec(),
                    stack.labels().to_vec(),
                    cropped,
                )
            }
        };

        let (t, h, w) = clipped.shape();
        info!(
            mode = ?self.mode,
            inside_cells = inside,
            layers = t,
            height = h,
            width = w,
            "Clipped stack"
        );
        Ok(clipped)
    }
}

fn apply_mask(values: &mut [f32], mask: &[bool], fill: f32) {
    for (v, inside) in values.iter_mut().zip(mask) {
        if !inside {
            *v = fill;
        }
    }
}

/// Minimal row/col ranges holding a non-fill cell in any layer. Empty ranges
/// when there is none.
fn data_window(
    layers: &[Vec<f32>],
    width: usize,
    height: usize,
    fill: f32,
) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
    let mut row_lo = usize::MAX;
    let mut row_hi = 0;
    let mut col_lo = usize::MAX;
    let mut col_hi = 0;

    for row in 0..height {
        for col in 0..width {
            let idx = row * width + col;
            if layers.iter().any(|layer| !is_fill(layer[idx], fill)) {
                row_lo = row_lo.min(row);
                row_hi = row_hi.max(row + 1);
                col_lo = col_lo.min(col);
                col_hi = col_hi.max(col + 1);
            }
        }
    }

    if row_lo == usize::MAX {
        (0..0, 0..0)
    } else {
        (row_lo..row_hi, col_lo..col_hi)
    }
}
