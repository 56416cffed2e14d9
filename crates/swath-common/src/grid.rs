//! Regular lat/lon target grid.

use std::ops::Range;
use std::sync::Arc;

use crate::bbox::BoundingBox;
use crate::crs::CrsCode;
use crate::error::SwathError;

/// GDAL-style affine geotransform:
/// `(origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height)`.
pub type Geotransform = [f64; 6];

/// Upper bound on cells per grid; a guard against resolutions that would
/// allocate absurd amounts of memory.
const MAX_GRID_CELLS: usize = 1 << 31;

/// Immutable regular lat/lon grid derived from a bounding box and resolution.
///
/// Coordinates follow `arange` semantics: `lats[i] = lat_min + i * resolution`
/// for every `i` with `lats[i] < lat_max`, and likewise for longitudes. Each
/// coordinate is computed directly from its index rather than accumulated, so
/// two builds from the same inputs yield bit-identical axes. Frames produced
/// against the same definition can therefore be stacked without re-checking
/// their coordinates.
///
/// Value arrays on this grid are row-major `[height, width]` with row 0 at
/// `lats[0]` (the southern edge).
#[derive(Debug, Clone, PartialEq)]
pub struct GridDefinition {
    bbox: BoundingBox,
    resolution: f64,
    lats: Arc<[f64]>,
    lons: Arc<[f64]>,
}

impl GridDefinition {
    /// Build a grid from a bounding box and a resolution in degrees.
    ///
    /// Fails with `InvalidBounds` unless `lat_min < lat_max` and
    /// `lon_min < lon_max`, and with `InvalidParameter` unless
    /// `resolution > 0`.
    pub fn build(bbox: BoundingBox, resolution: f64) -> Result<Self, SwathError> {
        bbox.validate()?;
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(SwathError::invalid_parameter(
                "resolution",
                format!("must be a positive finite number of degrees, got {}", resolution),
            ));
        }

        let lats = arange(bbox.min_lat, bbox.max_lat, resolution);
        let lons = arange(bbox.min_lon, bbox.max_lon, resolution);

        let cells = lats.len().saturating_mul(lons.len());
        if cells > MAX_GRID_CELLS {
            return Err(SwathError::invalid_parameter(
                "resolution",
                format!(
                    "{} x {} grid exceeds the {} cell limit",
                    lons.len(),
                    lats.len(),
                    MAX_GRID_CELLS
                ),
            ));
        }

        Ok(Self {
            bbox,
            resolution,
            lats: lats.into(),
            lons: lons.into(),
        })
    }

    /// The bounding box this grid was built from.
    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    /// Grid spacing in degrees (both axes).
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Grid CRS. Only geographic WGS84 grids are supported.
    pub fn crs(&self) -> CrsCode {
        CrsCode::Epsg4326
    }

    /// Latitude axis, ascending.
    pub fn lats(&self) -> &[f64] {
        &self.lats
    }

    /// Longitude axis, ascending.
    pub fn lons(&self) -> &[f64] {
        &self.lons
    }

    /// Number of columns (longitudes).
    pub fn width(&self) -> usize {
        self.lons.len()
    }

    /// Number of rows (latitudes).
    pub fn height(&self) -> usize {
        self.lats.len()
    }

    /// `(height, width)` of value arrays on this grid.
    pub fn shape(&self) -> (usize, usize) {
        (self.height(), self.width())
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        self.width() * self.height()
    }

    /// Check if grid has no cells.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Geotransform for export: `(lon_min, res, 0, lat_max, 0, -res)`.
    ///
    /// Exported rasters are written north-up, so the origin is the
    /// north-west corner of the configured bounding box.
    pub fn geotransform(&self) -> Geotransform {
        [
            self.bbox.min_lon,
            self.resolution,
            0.0,
            self.bbox.max_lat,
            0.0,
            -self.resolution,
        ]
    }

    /// `(lon, lat)` coordinate of a cell.
    pub fn cell_center(&self, row: usize, col: usize) -> Option<(f64, f64)> {
        Some((*self.lons.get(col)?, *self.lats.get(row)?))
    }

    /// Flat index of `(row, col)` in a row-major value array.
    #[inline]
    pub fn flat_index(&self, row: usize, col: usize) -> usize {
        row * self.width() + col
    }

    /// Nearest `(row, col)` to a coordinate, if it lies within half a cell
    /// of the axis range.
    pub fn nearest_cell(&self, lon: f64, lat: f64) -> Option<(usize, usize)> {
        let row = nearest_axis_index(&self.lats, self.resolution, lat)?;
        let col = nearest_axis_index(&self.lons, self.resolution, lon)?;
        Some((row, col))
    }

    /// Shared view of both axes.
    pub fn axes(&self) -> GridAxes {
        GridAxes {
            lats: Arc::clone(&self.lats),
            lons: Arc::clone(&self.lons),
            resolution: self.resolution,
        }
    }
}

/// Cheaply clonable lat/lon axes, possibly a crop of a full grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridAxes {
    lats: Arc<[f64]>,
    lons: Arc<[f64]>,
    resolution: f64,
}

impl GridAxes {
    /// Assemble axes from explicit coordinate arrays.
    pub fn new(lats: Vec<f64>, lons: Vec<f64>, resolution: f64) -> Self {
        Self {
            lats: lats.into(),
            lons: lons.into(),
            resolution,
        }
    }

    pub fn lats(&self) -> &[f64] {
        &self.lats
    }

    pub fn lons(&self) -> &[f64] {
        &self.lons
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn width(&self) -> usize {
        self.lons.len()
    }

    pub fn height(&self) -> usize {
        self.lats.len()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.height(), self.width())
    }

    /// Sub-axes covering `rows` x `cols`. Coordinates are copied, never
    /// recomputed, so they stay bit-identical to the parent grid.
    pub fn crop(&self, rows: Range<usize>, cols: Range<usize>) -> GridAxes {
        let rows = rows.start.min(self.height())..rows.end.min(self.height());
        let cols = cols.start.min(self.width())..cols.end.min(self.width());
        GridAxes {
            lats: self.lats[rows].into(),
            lons: self.lons[cols].into(),
            resolution: self.resolution,
        }
    }

    /// Bounding box spanned by the axis coordinates (no half-cell padding).
    pub fn extent(&self) -> Option<BoundingBox> {
        Some(BoundingBox::new(
            *self.lons.first()?,
            *self.lats.first()?,
            *self.lons.last()?,
            *self.lats.last()?,
        ))
    }
}

/// `start + i * step` for every `i` with the value below `stop`.
fn arange(start: f64, stop: f64, step: f64) -> Vec<f64> {
    let mut n = ((stop - start) / step).ceil().max(0.0) as usize;
    // Guard against ceil landing one past the end through rounding.
    while n > 0 && start + (n - 1) as f64 * step >= stop {
        n -= 1;
    }
    (0..n).map(|i| start + i as f64 * step).collect()
}

fn nearest_axis_index(axis: &[f64], step: f64, value: f64) -> Option<usize> {
    let first = *axis.first()?;
    let last = *axis.last()?;
    if !value.is_finite() || value < first - step / 2.0 || value > last + step / 2.0 {
        return None;
    }
    let idx = ((value - first) / step).round().max(0.0) as usize;
    Some(idx.min(axis.len() - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_bbox() -> BoundingBox {
        BoundingBox::new(-130.0, 30.0, -110.0, 50.0)
    }

    #[test]
    fn test_build_dimensions() {
        let grid = GridDefinition::build(BoundingBox::new(0.0, 0.0, 10.0, 5.0), 1.0).unwrap();
        assert_eq!(grid.width(), 10);
        assert_eq!(grid.height(), 5);
        assert_eq!(grid.lons()[0], 0.0);
        assert_eq!(grid.lons()[9], 9.0);
        assert_eq!(grid.lats()[4], 4.0);
    }

    #[test]
    fn test_build_fractional_resolution() {
        let grid = GridDefinition::build(scenario_bbox(), 0.0027).unwrap();
        // ceil(20 / 0.0027) = 7408
        assert_eq!(grid.width(), 7408);
        assert_eq!(grid.height(), 7408);
        assert!(*grid.lats().last().unwrap() < 50.0);
        assert!(*grid.lons().last().unwrap() < -110.0);
    }

    #[test]
    fn test_build_is_deterministic() {
        let a = GridDefinition::build(scenario_bbox(), 0.0027).unwrap();
        let b = GridDefinition::build(scenario_bbox(), 0.0027).unwrap();
        let bits = |v: &[f64]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(a.lats()), bits(b.lats()));
        assert_eq!(bits(a.lons()), bits(b.lons()));
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_bounds() {
        let err = GridDefinition::build(BoundingBox::new(-110.0, 30.0, -130.0, 50.0), 0.1);
        assert!(matches!(err, Err(SwathError::InvalidBounds(_))));

        let err = GridDefinition::build(BoundingBox::new(-130.0, 50.0, -110.0, 50.0), 0.1);
        assert!(matches!(err, Err(SwathError::InvalidBounds(_))));
    }

    #[test]
    fn test_invalid_resolution() {
        for res in [0.0, -0.1, f64::NAN] {
            let err = GridDefinition::build(scenario_bbox(), res);
            assert!(matches!(err, Err(SwathError::InvalidParameter { .. })));
        }
    }

    #[test]
    fn test_geotransform() {
        let grid = GridDefinition::build(scenario_bbox(), 0.0027).unwrap();
        assert_eq!(grid.geotransform(), [-130.0, 0.0027, 0.0, 50.0, 0.0, -0.0027]);
    }

    #[test]
    fn test_nearest_cell() {
        let grid = GridDefinition::build(BoundingBox::new(0.0, 0.0, 10.0, 10.0), 1.0).unwrap();
        assert_eq!(grid.nearest_cell(3.2, 7.6), Some((8, 3)));
        assert_eq!(grid.nearest_cell(-0.4, 0.0), Some((0, 0)));
        assert_eq!(grid.nearest_cell(-0.6, 0.0), None);
        assert_eq!(grid.nearest_cell(9.4, 9.4), Some((9, 9)));
        assert_eq!(grid.nearest_cell(f64::NAN, 1.0), None);
    }

    #[test]
    fn test_axes_crop_is_bit_identical() {
        let grid = GridDefinition::build(scenario_bbox(), 0.0027).unwrap();
        let axes = grid.axes();
        let cropped = axes.crop(100..110, 2000..2005);
        assert_eq!(cropped.shape(), (10, 5));
        assert_eq!(cropped.lats()[0].to_bits(), grid.lats()[100].to_bits());
        assert_eq!(cropped.lons()[4].to_bits(), grid.lons()[2004].to_bits());
    }
}
