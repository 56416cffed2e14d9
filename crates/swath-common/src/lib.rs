//! Common types shared across the TSM stacking workspace.
//!
//! Everything here is a plain value type: bounding boxes, CRS codes, the
//! regular target grid, swath input arrays, and acquisition-time helpers.
//! None of it performs I/O.

pub mod bbox;
pub mod crs;
pub mod error;
pub mod grid;
pub mod swath;
pub mod time;

pub use bbox::BoundingBox;
pub use crs::CrsCode;
pub use error::{SwathError, SwathResult};
pub use grid::{GridAxes, GridDefinition, Geotransform};
pub use swath::{SwathDataset, SwathSample};
pub use time::{day_floor, parse_acquisition_time, timestamp_token};

/// Default no-data sentinel for resampled grids.
pub const DEFAULT_FILL_VALUE: f32 = f32::NAN;

/// Returns `true` if `value` represents a fill (no-data) cell.
///
/// NaN is always treated as fill, regardless of the configured sentinel.
#[inline]
pub fn is_fill(value: f32, fill_value: f32) -> bool {
    value.is_nan() || value == fill_value
}
