//! Swath-to-grid neighbour resampling.
//!
//! Valid swath samples go into an R-tree; each grid cell centre then looks up
//! its neighbours within the radius of influence. Only cells whose centres
//! fall inside the sample extent (padded by the radius) are queried, so a
//! granule covering a small corner of a large grid costs little.

pub mod index;
pub mod kernel;

use rayon::prelude::*;
use std::time::Instant;
use swath_common::{BoundingBox, GridDefinition, SwathDataset, SwathResult};
use tracing::debug;

use crate::config::{ResampleAlgorithm, ResampleParams};
pub use index::{angular_radius_deg, to_ecef, SampleIndex, EARTH_RADIUS_M};
pub use kernel::Kernel;

/// Maps swath samples onto a grid. Holds no per-call state, so one instance
/// can serve any number of concurrent calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighborResampler {
    radius_m: f64,
    kernel: Kernel,
    fill_value: f32,
}

impl NeighborResampler {
    /// Validate parameters and build a resampler.
    ///
    /// Fails with `InvalidParameter` if the radius is not positive or a
    /// Gaussian kernel has no usable sigma.
    pub fn new(params: ResampleParams) -> SwathResult<Self> {
        params.validate()?;
        let kernel = match params.algorithm {
            ResampleAlgorithm::Nearest => Kernel::Nearest,
            ResampleAlgorithm::Gaussian { sigma_m } => Kernel::Gaussian {
                // validate() guarantees Some
                sigma_m: sigma_m.unwrap_or_default(),
            },
        };
        Ok(Self {
            radius_m: params.radius_of_influence_m,
            kernel,
            fill_value: params.fill_value,
        })
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    pub fn kernel(&self) -> Kernel {
        self.kernel
    }

    pub fn fill_value(&self) -> f32 {
        self.fill_value
    }

    /// Resample one swath onto `grid`.
    ///
    /// Returns a row-major `[height, width]` array; cells with no sample in
    /// range hold the fill value. A swath without valid samples yields an
    /// all-fill array.
    pub fn resample(&self, swath: &SwathDataset, grid: &GridDefinition) -> Vec<f32> {
        let start = Instant::now();
        let width = grid.width();
        let mut output = vec![self.fill_value; grid.len()];

        let index = SampleIndex::build(swath);
        let Some(extent) = index.extent() else {
            debug!(cells = grid.len(), "No valid samples, returning fill grid");
            return output;
        };
        if width == 0 {
            return output;
        }

        let window = self.search_window(&extent, grid);
        let (rows, cols) = match window {
            Some(w) => w,
            None => {
                debug!(samples = index.len(), "Swath footprint does not reach the grid");
                return output;
            }
        };

        let radius_2 = self.radius_m * self.radius_m;
        let lons = &grid.lons()[cols.clone()];
        let lats = grid.lats();

        output
            .par_chunks_mut(width)
            .enumerate()
            .filter(|(row, _)| rows.contains(row))
            .for_each(|(row, out_row)| {
                let lat = lats[row];
                for (offset, lon) in lons.iter().enumerate() {
                    if let Some(v) = self.kernel.evaluate(&index, to_ecef(*lon, lat), radius_2) {
                        out_row[cols.start + offset] = v;
                    }
                }
            });

        debug!(
            samples = index.len(),
            rows = rows.len(),
            cols = cols.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Resampled swath"
        );

        output
    }

    /// Row and column ranges of cells that may have a sample within range.
    fn search_window(
        &self,
        extent: &BoundingBox,
        grid: &GridDefinition,
    ) -> Option<(std::ops::Range<usize>, std::ops::Range<usize>)> {
        let pad_lat = angular_radius_deg(self.radius_m);
        let lat_lo = extent.min_lat - pad_lat;
        let lat_hi = extent.max_lat + pad_lat;

        // Longitude degrees shrink towards the poles; near them every
        // longitude may be in range.
        let max_abs_lat = lat_lo.abs().max(lat_hi.abs());
        let (lon_lo, lon_hi) = if max_abs_lat >= 89.0 {
            (f64::NEG_INFINITY, f64::INFINITY)
        } else {
            let pad_lon = pad_lat / max_abs_lat.to_radians().cos();
            (extent.min_lon - pad_lon, extent.max_lon + pad_lon)
        };

        let rows = axis_window(grid.lats(), lat_lo, lat_hi);
        let cols = axis_window(grid.lons(), lon_lo, lon_hi);
        (!rows.is_empty() && !cols.is_empty()).then_some((rows, cols))
    }
}

/// Indices of an ascending axis with values in `[lo, hi]`.
fn axis_window(axis: &[f64], lo: f64, hi: f64) -> std::ops::Range<usize> {
    let start = axis.partition_point(|v| *v < lo);
    let end = axis.partition_point(|v| *v <= hi);
    start..end.max(start)
}
