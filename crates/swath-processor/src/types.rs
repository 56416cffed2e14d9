//! Core data types for gridded frames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use swath_common::{is_fill, time, CrsCode, GridDefinition, SwathError, SwathResult};

/// Names of the horizontal dimensions used when a raster is exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpatialDims {
    pub x: String,
    pub y: String,
}

impl Default for SpatialDims {
    fn default() -> Self {
        Self {
            x: "lon".to_string(),
            y: "lat".to_string(),
        }
    }
}

/// One granule regridded onto a [`GridDefinition`].
///
/// `values` is row-major `[height, width]`, row 0 at the southern edge.
#[derive(Debug, Clone)]
pub struct ResampledFrame {
    pub grid: GridDefinition,
    pub values: Vec<f32>,
    pub timestamp: DateTime<Utc>,
    pub granule_id: String,
    pub fill_value: f32,
    pub crs: CrsCode,
    pub dims: SpatialDims,
}

impl ResampledFrame {
    /// Wrap a value array, checking it matches the grid shape.
    pub fn new(
        grid: GridDefinition,
        values: Vec<f32>,
        timestamp: DateTime<Utc>,
        granule_id: impl Into<String>,
        fill_value: f32,
    ) -> SwathResult<Self> {
        if values.len() != grid.len() {
            return Err(SwathError::ShapeMismatch {
                expected: grid.shape(),
                actual: (values.len() / grid.width().max(1), grid.width()),
            });
        }
        let crs = grid.crs();
        Ok(Self {
            grid,
            values,
            timestamp,
            granule_id: granule_id.into(),
            fill_value,
            crs,
            dims: SpatialDims::default(),
        })
    }

    /// `(height, width)`.
    pub fn shape(&self) -> (usize, usize) {
        self.grid.shape()
    }

    pub fn value_at(&self, row: usize, col: usize) -> Option<f32> {
        if row >= self.grid.height() || col >= self.grid.width() {
            return None;
        }
        self.values.get(self.grid.flat_index(row, col)).copied()
    }

    /// Number of cells holding data.
    pub fn valid_count(&self) -> usize {
        self.values
            .iter()
            .filter(|v| !is_fill(**v, self.fill_value))
            .count()
    }

    /// Acquisition time as `YYYYMMDDTHHMMSS`.
    pub fn timestamp_token(&self) -> String {
        time::timestamp_token(&self.timestamp)
    }
}

/// Bit-level equality, so NaN fill cells compare equal to themselves.
impl PartialEq for ResampledFrame {
    fn eq(&self, other: &Self) -> bool {
        self.grid == other.grid
            && self.timestamp == other.timestamp
            && self.granule_id == other.granule_id
            && self.fill_value.to_bits() == other.fill_value.to_bits()
            && self.crs == other.crs
            && self.dims == other.dims
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use swath_common::BoundingBox;

    fn grid() -> GridDefinition {
        GridDefinition::build(BoundingBox::new(0.0, 0.0, 3.0, 2.0), 1.0).unwrap()
    }

    #[test]
    fn test_frame_shape_checked() {
        let ts = Utc.with_ymd_and_hms(2010, 4, 1, 0, 0, 0).unwrap();
        assert!(ResampledFrame::new(grid(), vec![0.0; 6], ts, "g", f32::NAN).is_ok());
        assert!(matches!(
            ResampledFrame::new(grid(), vec![0.0; 5], ts, "g", f32::NAN),
            Err(SwathError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_value_at_and_valid_count() {
        let ts = Utc.with_ymd_and_hms(2010, 4, 1, 0, 0, 0).unwrap();
        let mut values = vec![f32::NAN; 6];
        values[4] = 2.5;
        let frame = ResampledFrame::new(grid(), values, ts, "g", f32::NAN).unwrap();
        assert_eq!(frame.value_at(1, 1), Some(2.5));
        assert_eq!(frame.value_at(2, 0), None);
        assert_eq!(frame.valid_count(), 1);
        assert_eq!(frame.timestamp_token(), "20100401T000000");
    }

    #[test]
    fn test_nan_frames_compare_equal() {
        let ts = Utc.with_ymd_and_hms(2010, 4, 1, 0, 0, 0).unwrap();
        let a = ResampledFrame::new(grid(), vec![f32::NAN; 6], ts, "g", f32::NAN).unwrap();
        assert_eq!(a, a.clone());
    }
}
