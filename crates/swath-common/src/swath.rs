//! Irregularly geolocated swath input.

use crate::bbox::BoundingBox;
use crate::error::SwathError;

/// One sensor acquisition: values plus per-pixel geolocation.
///
/// All three arrays are row-major `[rows, cols]`. Non-finite entries are
/// allowed; they simply make the sample invalid.
#[derive(Debug, Clone, PartialEq)]
pub struct SwathDataset {
    values: Vec<f32>,
    lat: Vec<f64>,
    lon: Vec<f64>,
    rows: usize,
    cols: usize,
}

/// A single valid swath sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwathSample {
    /// Flat row-major index in the source swath.
    pub index: usize,
    pub lon: f64,
    pub lat: f64,
    pub value: f32,
}

impl SwathDataset {
    /// Assemble a swath, checking that every array has `rows * cols` entries.
    ///
    /// Shape disagreement is reported as [`SwathError::InvalidSwath`] with an
    /// empty granule id; callers that know the granule fill it in with
    /// [`SwathError::for_granule`].
    pub fn new(
        values: Vec<f32>,
        lat: Vec<f64>,
        lon: Vec<f64>,
        rows: usize,
        cols: usize,
    ) -> Result<Self, SwathError> {
        let expected = rows.checked_mul(cols).ok_or_else(|| SwathError::InvalidSwath {
            granule_id: String::new(),
            message: format!("shape {}x{} overflows", rows, cols),
        })?;

        for (name, len) in [("values", values.len()), ("lat", lat.len()), ("lon", lon.len())] {
            if len != expected {
                return Err(SwathError::InvalidSwath {
                    granule_id: String::new(),
                    message: format!(
                        "{} has {} elements, expected {} ({}x{})",
                        name, len, expected, rows, cols
                    ),
                });
            }
        }

        Ok(Self {
            values,
            lat,
            lon,
            rows,
            cols,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn lat(&self) -> &[f64] {
        &self.lat
    }

    pub fn lon(&self) -> &[f64] {
        &self.lon
    }

    /// A sample is valid iff its value, latitude and longitude are all finite.
    #[inline]
    pub fn is_valid(&self, idx: usize) -> bool {
        self.values[idx].is_finite() && self.lat[idx].is_finite() && self.lon[idx].is_finite()
    }

    pub fn valid_count(&self) -> usize {
        (0..self.len()).filter(|&i| self.is_valid(i)).count()
    }

    /// Valid samples in row-major order.
    pub fn valid_samples(&self) -> impl Iterator<Item = SwathSample> + '_ {
        (0..self.len())
            .filter(move |&i| self.is_valid(i))
            .map(move |i| SwathSample {
                index: i,
                lon: self.lon[i],
                lat: self.lat[i],
                value: self.values[i],
            })
    }

    /// Lon/lat extent of the valid samples, `None` if there are none.
    pub fn valid_extent(&self) -> Option<BoundingBox> {
        self.valid_samples().fold(None, |acc, s| {
            Some(match acc {
                None => BoundingBox::new(s.lon, s.lat, s.lon, s.lat),
                Some(b) => BoundingBox::new(
                    b.min_lon.min(s.lon),
                    b.min_lat.min(s.lat),
                    b.max_lon.max(s.lon),
                    b.max_lat.max(s.lat),
                ),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_rejected() {
        let err = SwathDataset::new(vec![1.0; 4], vec![0.0; 4], vec![0.0; 3], 2, 2).unwrap_err();
        assert!(matches!(err, SwathError::InvalidSwath { .. }));
        assert!(err.to_string().contains("lon has 3 elements"));
    }

    #[test]
    fn test_validity_requires_all_finite() {
        let swath = SwathDataset::new(
            vec![1.0, f32::NAN, 3.0, 4.0],
            vec![10.0, 10.0, f64::INFINITY, 11.0],
            vec![20.0, 20.0, 21.0, f64::NAN],
            2,
            2,
        )
        .unwrap();

        assert!(swath.is_valid(0));
        assert!(!swath.is_valid(1));
        assert!(!swath.is_valid(2));
        assert!(!swath.is_valid(3));
        assert_eq!(swath.valid_count(), 1);

        let samples: Vec<_> = swath.valid_samples().collect();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].index, 0);
        assert_eq!(samples[0].value, 1.0);
    }

    #[test]
    fn test_valid_extent() {
        let swath = SwathDataset::new(
            vec![1.0, 2.0, f32::NAN],
            vec![40.0, 41.5, 60.0],
            vec![-121.0, -119.0, -100.0],
            1,
            3,
        )
        .unwrap();
        let extent = swath.valid_extent().unwrap();
        assert_eq!(extent.to_array(), [-121.0, 40.0, -119.0, 41.5]);

        let empty = SwathDataset::new(vec![f32::NAN], vec![0.0], vec![0.0], 1, 1).unwrap();
        assert!(empty.valid_extent().is_none());
    }
}
