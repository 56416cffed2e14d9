//! Spatial index over valid swath samples.
//!
//! Samples are placed on a sphere in Earth-centred Cartesian coordinates so
//! that straight-line (chord) distances stand in for ground distances. At the
//! radii used for regridding (a few kilometres) chord and arc length differ by
//! well under a millimetre.

use rstar::primitives::GeomWithData;
use rstar::RTree;
use swath_common::{BoundingBox, SwathDataset};

/// Earth radius of the spherical model, in metres.
pub const EARTH_RADIUS_M: f64 = 6_370_997.0;

/// Indexed sample: ECEF position, carrying the source index and value.
pub type IndexedSample = GeomWithData<[f64; 3], (usize, f32)>;

/// Convert `(lon, lat)` degrees to ECEF metres on the model sphere.
#[inline]
pub fn to_ecef(lon: f64, lat: f64) -> [f64; 3] {
    let (sin_lat, cos_lat) = lat.to_radians().sin_cos();
    let (sin_lon, cos_lon) = lon.to_radians().sin_cos();
    [
        EARTH_RADIUS_M * cos_lat * cos_lon,
        EARTH_RADIUS_M * cos_lat * sin_lon,
        EARTH_RADIUS_M * sin_lat,
    ]
}

/// Central angle, in degrees, subtended by a chord of `radius_m`.
pub fn angular_radius_deg(radius_m: f64) -> f64 {
    let half = (radius_m / (2.0 * EARTH_RADIUS_M)).min(1.0);
    (2.0 * half.asin()).to_degrees()
}

/// R-tree over the valid samples of one swath.
pub struct SampleIndex {
    tree: RTree<IndexedSample>,
    extent: Option<BoundingBox>,
}

impl SampleIndex {
    /// Index every valid sample. Invalid samples never enter the tree.
    pub fn build(swath: &SwathDataset) -> Self {
        let samples: Vec<IndexedSample> = swath
            .valid_samples()
            .map(|s| GeomWithData::new(to_ecef(s.lon, s.lat), (s.index, s.value)))
            .collect();

        Self {
            tree: RTree::bulk_load(samples),
            extent: swath.valid_extent(),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Lon/lat extent of the indexed samples.
    pub fn extent(&self) -> Option<BoundingBox> {
        self.extent
    }

    /// Closest sample within `max_distance_2` (squared metres).
    ///
    /// Returns `(value, distance²)`.
    pub fn nearest_within(&self, point: [f64; 3], max_distance_2: f64) -> Option<(f32, f64)> {
        let nearest = self.tree.nearest_neighbor(&point)?;
        let d2 = squared_distance(nearest.geom(), &point);
        (d2 <= max_distance_2).then_some((nearest.data.1, d2))
    }

    /// Every sample within `max_distance_2` as `(value, distance²)`.
    pub fn within(
        &self,
        point: [f64; 3],
        max_distance_2: f64,
    ) -> impl Iterator<Item = (f32, f64)> + '_ {
        self.tree
            .locate_within_distance(point, max_distance_2)
            .map(move |s| (s.data.1, squared_distance(s.geom(), &point)))
    }
}

#[inline]
fn squared_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}
