//! Raster capability and persistence boundary.
//!
//! [`SpatialRaster`] is the one interface shared by single frames and
//! stacks. [`RasterSink`] and [`RasterSource`] are implemented by storage
//! backends; see the `raster-io` crate.

use std::path::{Path, PathBuf};

use swath_common::{CrsCode, SwathError, SwathResult};

use crate::clip::SpatialClipper;
use crate::stack::{TimeSeriesStack, TimeStacker};
use crate::types::{ResampledFrame, SpatialDims};

/// Writes frames or stacks, each with explicit geotransform, CRS and no-data
/// sentinel.
pub trait RasterSink {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Persist one time slice.
    fn write_frame(&self, frame: &ResampledFrame) -> Result<PathBuf, Self::Error>;

    /// Persist a stack. Slice-oriented formats write one file per layer.
    fn write_stack(&self, stack: &TimeSeriesStack) -> Result<Vec<PathBuf>, Self::Error>;
}

/// Reads back what a [`RasterSink`] wrote. Axes must come back bit-identical
/// to those used at write time.
pub trait RasterSource {
    type Error: std::error::Error + Send + Sync + 'static;

    fn read_frame(&self, path: &Path) -> Result<ResampledFrame, Self::Error>;

    fn read_stack(&self, path: &Path) -> Result<TimeSeriesStack, Self::Error>;
}

/// Spatial operations common to frames and stacks.
pub trait SpatialRaster {
    /// Names of the `(x, y)` dimensions.
    fn spatial_dims(&self) -> &SpatialDims;

    /// Rename the `(x, y)` dimensions used on export.
    fn set_spatial_dims(&mut self, x: &str, y: &str);

    fn crs(&self) -> CrsCode;

    /// Label the raster with a CRS. Only geographic codes apply to lat/lon
    /// axes.
    fn write_crs(&mut self, crs: CrsCode) -> SwathResult<()>;

    /// Clip to a region of interest.
    fn clip(&self, clipper: &SpatialClipper) -> SwathResult<TimeSeriesStack>;

    /// Hand the raster to a sink.
    fn export_raster<S: RasterSink>(&self, sink: &S) -> Result<Vec<PathBuf>, S::Error>
    where
        Self: Sized;
}

fn check_geographic(crs: CrsCode) -> SwathResult<()> {
    if crs.is_geographic() {
        Ok(())
    } else {
        Err(SwathError::UnsupportedCrs(format!(
            "{} cannot label a lat/lon raster",
            crs
        )))
    }
}

impl SpatialRaster for ResampledFrame {
    fn spatial_dims(&self) -> &SpatialDims {
        &self.dims
    }

    fn set_spatial_dims(&mut self, x: &str, y: &str) {
        self.dims = SpatialDims {
            x: x.to_string(),
            y: y.to_string(),
        };
    }

    fn crs(&self) -> CrsCode {
        self.crs
    }

    fn write_crs(&mut self, crs: CrsCode) -> SwathResult<()> {
        check_geographic(crs)?;
        self.crs = crs;
        Ok(())
    }

    fn clip(&self, clipper: &SpatialClipper) -> SwathResult<TimeSeriesStack> {
        let stack = TimeStacker::from_frames([self.clone()]).finish()?;
        clipper.clip(&stack)
    }

    fn export_raster<S: RasterSink>(&self, sink: &S) -> Result<Vec<PathBuf>, S::Error> {
        sink.write_frame(self).map(|path| vec![path])
    }
}

impl SpatialRaster for TimeSeriesStack {
    fn spatial_dims(&self) -> &SpatialDims {
        self.dims()
    }

    fn set_spatial_dims(&mut self, x: &str, y: &str) {
        *self.dims_mut() = SpatialDims {
            x: x.to_string(),
            y: y.to_string(),
        };
    }

    fn crs(&self) -> CrsCode {
        TimeSeriesStack::crs(self)
    }

    fn write_crs(&mut self, crs: CrsCode) -> SwathResult<()> {
        check_geographic(crs)?;
        self.set_crs(crs);
        Ok(())
    }

    fn clip(&self, clipper: &SpatialClipper) -> SwathResult<TimeSeriesStack> {
        clipper.clip(self)
    }

    fn export_raster<S: RasterSink>(&self, sink: &S) -> Result<Vec<PathBuf>, S::Error> {
        sink.write_stack(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::{ClipMode, ClipPolygon};
    use chrono::{TimeZone, Utc};
    use std::cell::RefCell;
    use swath_common::{BoundingBox, GridDefinition};

    fn frame() -> ResampledFrame {
        let grid = GridDefinition::build(BoundingBox::new(0.0, 0.0, 2.0, 2.0), 1.0).unwrap();
        let ts = Utc.with_ymd_and_hms(2010, 4, 1, 18, 52, 4).unwrap();
        ResampledFrame::new(grid, vec![1.0, 2.0, 3.0, 4.0], ts, "g", f32::NAN).unwrap()
    }

    /// Records what it was asked to write.
    #[derive(Default)]
    struct RecordingSink {
        written: RefCell<Vec<String>>,
    }

    impl RasterSink for RecordingSink {
        type Error = std::io::Error;

        fn write_frame(&self, frame: &ResampledFrame) -> Result<PathBuf, Self::Error> {
            let name = format!("TSM_{}.tif", frame.timestamp_token());
            self.written.borrow_mut().push(name.clone());
            Ok(PathBuf::from(name))
        }

        fn write_stack(&self, stack: &TimeSeriesStack) -> Result<Vec<PathBuf>, Self::Error> {
            let name = format!("stack_{}.zarr", stack.len());
            self.written.borrow_mut().push(name.clone());
            Ok(vec![PathBuf::from(name)])
        }
    }

    /// Generic over the capability, the way callers use it.
    fn export_all<R: SpatialRaster>(raster: &R, sink: &RecordingSink) -> usize {
        raster.export_raster(sink).unwrap().len()
    }

    #[test]
    fn test_export_frame_and_stack() {
        let sink = RecordingSink::default();
        let frame = frame();
        let stack = TimeStacker::from_frames([frame.clone()]).finish().unwrap();

        assert_eq!(export_all(&frame, &sink), 1);
        assert_eq!(export_all(&stack, &sink), 1);
        assert_eq!(
            sink.written.borrow().as_slice(),
            &["TSM_20100401T185204.tif", "stack_1.zarr"]
        );
    }

    #[test]
    fn test_set_spatial_dims() {
        let mut frame = frame();
        assert_eq!(frame.spatial_dims().x, "lon");
        frame.set_spatial_dims("x", "y");
        assert_eq!(frame.spatial_dims(), &SpatialDims { x: "x".into(), y: "y".into() });

        let mut stack = TimeStacker::from_frames([frame]).finish().unwrap();
        assert_eq!(stack.spatial_dims().y, "y");
        stack.set_spatial_dims("longitude", "latitude");
        assert_eq!(stack.spatial_dims().x, "longitude");
    }

    #[test]
    fn test_write_crs_rejects_projected() {
        let mut frame = frame();
        assert!(frame.write_crs(CrsCode::Epsg4269).is_ok());
        assert_eq!(SpatialRaster::crs(&frame), CrsCode::Epsg4269);
        assert!(matches!(
            frame.write_crs(CrsCode::Epsg3857),
            Err(SwathError::UnsupportedCrs(_))
        ));
    }

    #[test]
    fn test_clip_via_capability() {
        let poly = ClipPolygon::from_bbox(BoundingBox::new(-0.5, -0.5, 0.5, 0.5), CrsCode::Epsg4326);
        let clipper = SpatialClipper::new(poly, ClipMode::Drop);
        let clipped = SpatialRaster::clip(&frame(), &clipper).unwrap();
        assert_eq!(clipped.shape(), (1, 1, 1));
        assert_eq!(clipped.value_at(0, 0, 0), Some(1.0));
    }
}
