//! Bounding box types and operations.

use serde::{Deserialize, Serialize};

use crate::error::SwathError;

/// A geographic bounding box in degrees (EPSG:4326 axis order lon, lat).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Parse a bbox string: "lon_min,lat_min,lon_max,lat_max"
    pub fn from_bbox_string(s: &str) -> Result<Self, BboxParseError> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(BboxParseError::InvalidFormat(s.to_string()));
        }

        let parse = |p: &str| {
            p.parse::<f64>()
                .map_err(|_| BboxParseError::InvalidNumber(p.to_string()))
        };

        Ok(Self {
            min_lon: parse(parts[0])?,
            min_lat: parse(parts[1])?,
            max_lon: parse(parts[2])?,
            max_lat: parse(parts[3])?,
        })
    }

    /// Check that min < max on both axes and that all corners are finite.
    pub fn validate(&self) -> Result<(), SwathError> {
        let corners = [self.min_lon, self.min_lat, self.max_lon, self.max_lat];
        if corners.iter().any(|c| !c.is_finite()) {
            return Err(SwathError::InvalidBounds(format!(
                "non-finite corner in {:?}",
                corners
            )));
        }
        if self.min_lat >= self.max_lat {
            return Err(SwathError::InvalidBounds(format!(
                "lat_min ({}) must be < lat_max ({})",
                self.min_lat, self.max_lat
            )));
        }
        if self.min_lon >= self.max_lon {
            return Err(SwathError::InvalidBounds(format!(
                "lon_min ({}) must be < lon_max ({})",
                self.min_lon, self.max_lon
            )));
        }
        Ok(())
    }

    /// Width of the bounding box in degrees.
    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// Height of the bounding box in degrees.
    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Check if this bbox intersects another.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lon < other.max_lon
            && self.max_lon > other.min_lon
            && self.min_lat < other.max_lat
            && self.max_lat > other.min_lat
    }

    /// Compute the intersection of two bounding boxes.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        if !self.intersects(other) {
            return None;
        }

        Some(BoundingBox {
            min_lon: self.min_lon.max(other.min_lon),
            min_lat: self.min_lat.max(other.min_lat),
            max_lon: self.max_lon.min(other.max_lon),
            max_lat: self.max_lat.min(other.max_lat),
        })
    }

    /// Check if a point is contained within this bbox (edges inclusive).
    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }

    /// Corners as `[lon_min, lat_min, lon_max, lat_max]`.
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BboxParseError {
    #[error("Invalid bbox format: {0}. Expected 'lon_min,lat_min,lon_max,lat_max'")]
    InvalidFormat(String),

    #[error("Invalid number in bbox: {0}")]
    InvalidNumber(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bbox_string() {
        let bbox = BoundingBox::from_bbox_string("-130, 30, -110, 50").unwrap();
        assert_eq!(bbox.min_lon, -130.0);
        assert_eq!(bbox.min_lat, 30.0);
        assert_eq!(bbox.max_lon, -110.0);
        assert_eq!(bbox.max_lat, 50.0);
    }

    #[test]
    fn test_validate() {
        assert!(BoundingBox::new(-130.0, 30.0, -110.0, 50.0).validate().is_ok());
        assert!(matches!(
            BoundingBox::new(-130.0, 50.0, -110.0, 30.0).validate(),
            Err(SwathError::InvalidBounds(_))
        ));
        assert!(matches!(
            BoundingBox::new(-110.0, 30.0, -110.0, 50.0).validate(),
            Err(SwathError::InvalidBounds(_))
        ));
        assert!(BoundingBox::new(f64::NAN, 30.0, -110.0, 50.0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_intersection() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 5.0, 15.0, 15.0);
        let c = BoundingBox::new(20.0, 20.0, 30.0, 30.0);

        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));

        let intersection = a.intersection(&b).unwrap();
        assert_eq!(intersection.min_lon, 5.0);
        assert_eq!(intersection.min_lat, 5.0);
        assert_eq!(intersection.max_lon, 10.0);
        assert_eq!(intersection.max_lat, 10.0);
    }
}
