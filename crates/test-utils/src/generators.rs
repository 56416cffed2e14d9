//! Synthetic swath generators.
//!
//! These produce predictable inputs so tests can check exactly where values
//! land after resampling, stacking and export.

use swath_common::{BoundingBox, SwathDataset};

/// Raw swath arrays, row-major `[rows, cols]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticSwath {
    pub values: Vec<f32>,
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    pub rows: usize,
    pub cols: usize,
}

impl SyntheticSwath {
    /// Validate into a [`SwathDataset`].
    pub fn to_dataset(&self) -> SwathDataset {
        SwathDataset::new(
            self.values.clone(),
            self.lat.clone(),
            self.lon.clone(),
            self.rows,
            self.cols,
        )
        .expect("synthetic swath arrays always agree in shape")
    }
}

/// A 1x1 swath holding a single valid sample.
pub fn single_sample_swath(lon: f64, lat: f64, value: f32) -> SyntheticSwath {
    SyntheticSwath {
        values: vec![value],
        lat: vec![lat],
        lon: vec![lon],
        rows: 1,
        cols: 1,
    }
}

/// A swath of `rows x cols` samples with no valid sample at all.
///
/// Cycles through the ways a sample can be invalid: NaN value, NaN latitude,
/// infinite longitude.
pub fn invalid_swath(rows: usize, cols: usize) -> SyntheticSwath {
    let n = rows * cols;
    let mut values = vec![1.0; n];
    let mut lat = vec![40.0; n];
    let mut lon = vec![-120.0; n];
    for i in 0..n {
        match i % 3 {
            0 => values[i] = f32::NAN,
            1 => lat[i] = f64::NAN,
            _ => lon[i] = f64::INFINITY,
        }
    }
    SyntheticSwath {
        values,
        lat,
        lon,
        rows,
        cols,
    }
}

/// A scan-like swath covering `bbox`.
///
/// Samples sit on a lattice tilted by `tilt_deg` (satellite tracks are not
/// north-aligned) and carry `value_fn(lon, lat)`. Samples that fall outside
/// `bbox` keep their value but get NaN geolocation, mimicking the fill
/// border of real products.
pub fn tilted_swath<F>(
    bbox: (f64, f64, f64, f64),
    rows: usize,
    cols: usize,
    tilt_deg: f64,
    value_fn: F,
) -> SyntheticSwath
where
    F: Fn(f64, f64) -> f32,
{
    let bbox = BoundingBox::new(bbox.0, bbox.1, bbox.2, bbox.3);
    let (cx, cy) = (
        (bbox.min_lon + bbox.max_lon) / 2.0,
        (bbox.min_lat + bbox.max_lat) / 2.0,
    );
    let (sin_t, cos_t) = tilt_deg.to_radians().sin_cos();
    let dx = bbox.width() / cols.max(1) as f64;
    let dy = bbox.height() / rows.max(1) as f64;

    let n = rows * cols;
    let mut values = Vec::with_capacity(n);
    let mut lat = Vec::with_capacity(n);
    let mut lon = Vec::with_capacity(n);

    for row in 0..rows {
        for col in 0..cols {
            let u = (col as f64 + 0.5) * dx - bbox.width() / 2.0;
            let v = (row as f64 + 0.5) * dy - bbox.height() / 2.0;
            let x = cx + u * cos_t - v * sin_t;
            let y = cy + u * sin_t + v * cos_t;
            values.push(value_fn(x, y));
            if bbox.contains_point(x, y) {
                lon.push(x);
                lat.push(y);
            } else {
                lon.push(f64::NAN);
                lat.push(f64::NAN);
            }
        }
    }

    SyntheticSwath {
        values,
        lat,
        lon,
        rows,
        cols,
    }
}

/// TSM-like field in g/m³: high near the coast (east edge), decaying
/// offshore, with a NaN cloud band across the middle rows.
pub fn tsm_like_swath(bbox: (f64, f64, f64, f64), rows: usize, cols: usize) -> SyntheticSwath {
    let coast = bbox.2;
    let mut swath = tilted_swath(bbox, rows, cols, 12.0, |lon, _lat| {
        let offshore = (coast - lon).max(0.0) as f32;
        0.2 + 40.0 * (-offshore * 0.8).exp()
    });

    let band = rows / 3..rows / 3 + (rows / 10).max(1);
    for row in band {
        for col in 0..cols {
            swath.values[row * cols + col] = f32::NAN;
        }
    }
    swath
}
