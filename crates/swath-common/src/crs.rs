//! Coordinate Reference System codes and point transforms.
//!
//! Grids are always geographic WGS84. The other codes exist so that clip
//! polygons delivered in a different CRS can be brought onto the grid.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SwathError;

/// Semi-major axis used by spherical Web Mercator (metres).
const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Latitude limit of the Web Mercator square (degrees).
const WEB_MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// Well-known CRS codes understood by the workspace.
///
/// Serialized as its `EPSG:xxxx` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "String", into = "String")]
pub enum CrsCode {
    /// WGS84 Geographic (lon/lat in degrees)
    #[default]
    Epsg4326,
    /// NAD83 Geographic
    Epsg4269,
    /// Web Mercator (metres)
    Epsg3857,
}

impl CrsCode {
    /// Parse a CRS identifier.
    ///
    /// Accepts formats like:
    /// - "EPSG:4326"
    /// - "epsg:4326"
    /// - "CRS:84" (equivalent to EPSG:4326 with lon/lat axis order)
    /// - "urn:ogc:def:crs:EPSG::3857"
    pub fn parse(s: &str) -> Result<Self, SwathError> {
        let normalized = s.trim().to_uppercase();
        let normalized = normalized
            .strip_prefix("URN:OGC:DEF:CRS:")
            .map(|rest| rest.replace("::", ":"))
            .unwrap_or(normalized);

        match normalized.as_str() {
            "EPSG:4326" | "CRS:84" | "OGC:CRS84" | "WGS84" => Ok(CrsCode::Epsg4326),
            "EPSG:4269" => Ok(CrsCode::Epsg4269),
            "EPSG:3857" | "EPSG:900913" => Ok(CrsCode::Epsg3857),
            _ => Err(SwathError::UnsupportedCrs(s.to_string())),
        }
    }

    /// Check if this is a geographic (lat/lon) CRS.
    pub fn is_geographic(&self) -> bool {
        matches!(self, CrsCode::Epsg4326 | CrsCode::Epsg4269)
    }

    /// Numeric EPSG code.
    pub fn epsg(&self) -> u16 {
        match self {
            CrsCode::Epsg4326 => 4326,
            CrsCode::Epsg4269 => 4269,
            CrsCode::Epsg3857 => 3857,
        }
    }

    /// Transform a point in this CRS to WGS84 `(lon, lat)` degrees.
    ///
    /// NAD83 and WGS84 differ by less than two metres, well under any grid
    /// resolution used here, so NAD83 coordinates pass through unchanged.
    pub fn to_geographic(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            CrsCode::Epsg4326 | CrsCode::Epsg4269 => (x, y),
            CrsCode::Epsg3857 => {
                let lon = (x / WEB_MERCATOR_RADIUS).to_degrees();
                let lat = (2.0 * (y / WEB_MERCATOR_RADIUS).exp().atan()
                    - std::f64::consts::FRAC_PI_2)
                    .to_degrees();
                (lon, lat)
            }
        }
    }

    /// Transform a WGS84 `(lon, lat)` point into this CRS.
    pub fn from_geographic(&self, lon: f64, lat: f64) -> (f64, f64) {
        match self {
            CrsCode::Epsg4326 | CrsCode::Epsg4269 => (lon, lat),
            CrsCode::Epsg3857 => {
                let lat = lat.clamp(-WEB_MERCATOR_MAX_LAT, WEB_MERCATOR_MAX_LAT);
                let x = WEB_MERCATOR_RADIUS * lon.to_radians();
                let y = WEB_MERCATOR_RADIUS
                    * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0)
                        .tan()
                        .ln();
                (x, y)
            }
        }
    }

    /// Transform a point from this CRS into `target`.
    pub fn transform_to(&self, target: CrsCode, x: f64, y: f64) -> (f64, f64) {
        if *self == target {
            return (x, y);
        }
        let (lon, lat) = self.to_geographic(x, y);
        target.from_geographic(lon, lat)
    }

    /// OGC WKT for the geographic codes, used in raster metadata.
    pub fn wkt(&self) -> &'static str {
        match self {
            CrsCode::Epsg4326 => {
                "GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\",SPHEROID[\"WGS 84\",6378137,298.257223563]],\
                 PRIMEM[\"Greenwich\",0],UNIT[\"degree\",0.0174532925199433],AUTHORITY[\"EPSG\",\"4326\"]]"
            }
            CrsCode::Epsg4269 => {
                "GEOGCS[\"NAD83\",DATUM[\"North_American_Datum_1983\",SPHEROID[\"GRS 1980\",6378137,298.257222101]],\
                 PRIMEM[\"Greenwich\",0],UNIT[\"degree\",0.0174532925199433],AUTHORITY[\"EPSG\",\"4269\"]]"
            }
            CrsCode::Epsg3857 => {
                "PROJCS[\"WGS 84 / Pseudo-Mercator\",GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\",\
                 SPHEROID[\"WGS 84\",6378137,298.257223563]],PRIMEM[\"Greenwich\",0],\
                 UNIT[\"degree\",0.0174532925199433]],PROJECTION[\"Mercator_1SP\"],\
                 UNIT[\"metre\",1],AUTHORITY[\"EPSG\",\"3857\"]]"
            }
        }
    }
}

impl fmt::Display for CrsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl TryFrom<String> for CrsCode {
    type Error = SwathError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<CrsCode> for String {
    fn from(crs: CrsCode) -> Self {
        crs.to_string()
    }
}

impl FromStr for CrsCode {
    type Err = SwathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
