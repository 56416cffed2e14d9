//! Common test fixtures for TSM stacking tests.
//!
//! This module provides pre-defined inputs for the scenarios the pipeline
//! is expected to handle.

/// Common bounding box definitions as `(lon_min, lat_min, lon_max, lat_max)`.
pub mod bbox {
    /// US west coast study area used by the reference pipeline.
    pub const WEST_COAST: (f64, f64, f64, f64) = (-130.0, 30.0, -110.0, 50.0);

    /// Small 2x2 degree box around the scenario sample point.
    pub const SMALL: (f64, f64, f64, f64) = (-121.0, 39.0, -119.0, 41.0);
}

/// End-to-end scenario: three granules with one valid sample each.
pub mod scenario {
    use chrono::{DateTime, TimeZone, Utc};

    /// Study area.
    pub const BBOX: (f64, f64, f64, f64) = super::bbox::WEST_COAST;

    /// Full production resolution (degrees).
    pub const RESOLUTION: f64 = 0.0027;

    /// Coarser resolution for fast tests (degrees).
    pub const COARSE_RESOLUTION: f64 = 0.05;

    /// The sample every granule carries.
    pub const SAMPLE_LON: f64 = -120.0;
    pub const SAMPLE_LAT: f64 = 40.0;
    pub const SAMPLE_VALUE: f32 = 2.5;

    /// Granule identifiers, in acquisition order. The first two share a UTC day.
    pub const GRANULE_IDS: [&str; 3] = [
        "EN1_MDSI_MER_RR__2P_20100401T185204_20100401T185934_042173_0058_20180710T023325_0100",
        "EN1_MDSI_MER_RR__2P_20100401T190059_20100401T190859_042173_0058_20180710T023410_0100",
        "EN1_MDSI_MER_RR__2P_20100402T050000_20100402T050800_042179_0064_20180710T031502_0100",
    ];

    /// Acquisition times matching [`GRANULE_IDS`].
    pub fn timestamps() -> [DateTime<Utc>; 3] {
        [
            Utc.with_ymd_and_hms(2010, 4, 1, 18, 52, 4).unwrap(),
            Utc.with_ymd_and_hms(2010, 4, 1, 19, 0, 59).unwrap(),
            Utc.with_ymd_and_hms(2010, 4, 2, 5, 0, 0).unwrap(),
        ]
    }
}

/// Clip geometries in several encodings.
pub mod polygons {
    /// Triangle around the scenario sample point, as GeoJSON.
    pub const TRIANGLE_GEOJSON: &str = r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": {"name": "roi"},
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[-121.0, 39.0], [-119.0, 39.0], [-120.0, 41.0], [-121.0, 39.0]]]
            }
        }]
    }"#;

    /// Square with a hole, as WKT.
    pub const SQUARE_WITH_HOLE_WKT: &str =
        "POLYGON ((-125 35, -115 35, -115 45, -125 45, -125 35), (-121 39, -119 39, -119 41, -121 41, -121 39))";

    /// Polygon far from the study area.
    pub const DISJOINT_WKT: &str = "POLYGON ((10 10, 20 10, 20 20, 10 20, 10 10))";
}
