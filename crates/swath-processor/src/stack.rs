//! Temporal stacking of resampled frames.
//!
//! Frames are collected in arrival order and sorted once on
//! [`TimeStacker::finish`]. The sort is stable, so frames sharing a timestamp
//! keep their insertion order.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use swath_common::{
    day_floor, is_fill, CrsCode, GridAxes, GridDefinition, SwathError, SwathResult,
};
use tracing::{debug, info, warn};

use crate::types::{ResampledFrame, SpatialDims};

/// Ordered `(time, lat, lon)` series of frames sharing one set of axes.
#[derive(Debug, Clone)]
pub struct TimeSeriesStack {
    /// Full grid the layers were produced on; `None` once cropped.
    grid: Option<GridDefinition>,
    axes: GridAxes,
    crs: CrsCode,
    fill_value: f32,
    dims: SpatialDims,
    timestamps: Vec<DateTime<Utc>>,
    labels: Vec<String>,
    layers: Vec<Vec<f32>>,
}

impl TimeSeriesStack {
    /// Assemble a stack from raw layers, e.g. when reading one back from disk.
    ///
    /// Layers are sorted by timestamp (stable). Fails with `EmptyStack` for
    /// zero layers and `ShapeMismatch` if any layer disagrees with `axes`.
    pub fn from_parts(
        axes: GridAxes,
        crs: CrsCode,
        fill_value: f32,
        timestamps: Vec<DateTime<Utc>>,
        labels: Vec<String>,
        layers: Vec<Vec<f32>>,
    ) -> SwathResult<Self> {
        if layers.is_empty() {
            return Err(SwathError::EmptyStack);
        }
        if timestamps.len() != layers.len() || labels.len() != layers.len() {
            return Err(SwathError::invalid_parameter(
                "timestamps",
                format!(
                    "{} timestamps and {} labels for {} layers",
                    timestamps.len(),
                    labels.len(),
                    layers.len()
                ),
            ));
        }
        let (h, w) = axes.shape();
        if let Some(bad) = layers.iter().find(|l| l.len() != h * w) {
            return Err(SwathError::ShapeMismatch {
                expected: (h, w),
                actual: (bad.len() / w.max(1), w),
            });
        }

        let mut entries: Vec<_> = timestamps
            .into_iter()
            .zip(labels)
            .zip(layers)
            .map(|((t, l), v)| (t, l, v))
            .collect();
        entries.sort_by_key(|(t, _, _)| *t);

        let mut stack = Self {
            grid: None,
            axes,
            crs,
            fill_value,
            dims: SpatialDims::default(),
            timestamps: Vec::with_capacity(entries.len()),
            labels: Vec::with_capacity(entries.len()),
            layers: Vec::with_capacity(entries.len()),
        };
        for (t, l, v) in entries {
            stack.timestamps.push(t);
            stack.labels.push(l);
            stack.layers.push(v);
        }
        Ok(stack)
    }

    /// Attach the full grid the axes came from, enabling per-slice export.
    /// Ignored if the axes do not match the grid.
    pub fn with_grid(mut self, grid: GridDefinition) -> Self {
        if grid.axes() == self.axes {
            self.grid = Some(grid);
        }
        self
    }

    /// Same metadata, new axes and layers. Used for crops and aggregates.
    pub(crate) fn derive(
        &self,
        axes: GridAxes,
        timestamps: Vec<DateTime<Utc>>,
        labels: Vec<String>,
        layers: Vec<Vec<f32>>,
    ) -> Self {
        let grid = self.grid.clone().filter(|g| g.axes() == axes);
        Self {
            grid,
            axes,
            crs: self.crs,
            fill_value: self.fill_value,
            dims: self.dims.clone(),
            timestamps,
            labels,
            layers,
        }
    }

    pub fn axes(&self) -> &GridAxes {
        &self.axes
    }

    pub fn grid(&self) -> Option<&GridDefinition> {
        self.grid.as_ref()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    /// Per-layer labels: granule ids, or the day for daily aggregates.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn layer(&self, t: usize) -> Option<&[f32]> {
        self.layers.get(t).map(Vec::as_slice)
    }

    pub fn layers(&self) -> &[Vec<f32>] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// `(time, height, width)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        let (h, w) = self.axes.shape();
        (self.len(), h, w)
    }

    pub fn crs(&self) -> CrsCode {
        self.crs
    }

    pub(crate) fn set_crs(&mut self, crs: CrsCode) {
        self.crs = crs;
    }

    pub fn fill_value(&self) -> f32 {
        self.fill_value
    }

    pub fn dims(&self) -> &SpatialDims {
        &self.dims
    }

    pub(crate) fn dims_mut(&mut self) -> &mut SpatialDims {
        &mut self.dims
    }

    pub fn value_at(&self, t: usize, row: usize, col: usize) -> Option<f32> {
        let (_, h, w) = self.shape();
        if row >= h || col >= w {
            return None;
        }
        self.layers.get(t)?.get(row * w + col).copied()
    }

    /// All layers as one time-major buffer.
    pub fn to_contiguous(&self) -> Vec<f32> {
        let (t, h, w) = self.shape();
        let mut out = Vec::with_capacity(t * h * w);
        for layer in &self.layers {
            out.extend_from_slice(layer);
        }
        out
    }

    /// Layer `t` as a standalone frame. Only available while the stack still
    /// covers its full grid.
    pub fn frame(&self, t: usize) -> Option<ResampledFrame> {
        let grid = self.grid.clone()?;
        Some(ResampledFrame {
            grid,
            values: self.layers.get(t)?.clone(),
            timestamp: self.timestamps[t],
            granule_id: self.labels[t].clone(),
            fill_value: self.fill_value,
            crs: self.crs,
            dims: self.dims.clone(),
        })
    }

    /// Mean per UTC day.
    ///
    /// Layers are bucketed by the day of their timestamp. Each cell of a
    /// bucket is the mean of its non-fill members; a cell that is fill in
    /// every member stays fill. Bucket timestamps are midnight UTC.
    pub fn daily_mean(&self) -> SwathResult<TimeSeriesStack> {
        let mut buckets: BTreeMap<DateTime<Utc>, Vec<usize>> = BTreeMap::new();
        for (i, t) in self.timestamps.iter().enumerate() {
            buckets.entry(day_floor(t)).or_default().push(i);
        }

        let fill = self.fill_value;
        let cells = self.axes.width() * self.axes.height();
        let mut timestamps = Vec::with_capacity(buckets.len());
        let mut labels = Vec::with_capacity(buckets.len());
        let mut layers = Vec::with_capacity(buckets.len());

        for (day, members) in buckets {
            let sources: Vec<&[f32]> = members.iter().map(|&i| self.layers[i].as_slice()).collect();
            let mut mean = vec![fill; cells];
            mean.par_iter_mut().enumerate().for_each(|(cell, out)| {
                let (sum, count) = sources.iter().fold((0.0_f64, 0u32), |(sum, count), layer| {
                    let v = layer[cell];
                    if is_fill(v, fill) {
                        (sum, count)
                    } else {
                        (sum + v as f64, count + 1)
                    }
                });
                if count > 0 {
                    *out = (sum / count as f64) as f32;
                }
            });

            debug!(day = %day.date_naive(), members = members.len(), "Aggregated daily bucket");
            timestamps.push(day);
            labels.push(day.format("%Y-%m-%d").to_string());
            layers.push(mean);
        }

        if layers.is_empty() {
            return Err(SwathError::EmptyStack);
        }

        info!(
            input_layers = self.len(),
            days = layers.len(),
            "Computed daily mean"
        );

        Ok(self.derive(self.axes.clone(), timestamps, labels, layers))
    }
}

/// Shape, CRS and fill value every frame of one stack must share.
#[derive(Debug, Clone, Copy)]
struct FrameLayout {
    shape: (usize, usize),
    crs: CrsCode,
    fill_value: f32,
}

impl FrameLayout {
    fn of(frame: &ResampledFrame) -> Self {
        Self {
            shape: frame.shape(),
            crs: frame.crs,
            fill_value: frame.fill_value,
        }
    }

    fn check(&self, frame: &ResampledFrame) -> SwathResult<()> {
        let shape = frame.shape();
        if shape != self.shape {
            return Err(SwathError::ShapeMismatch {
                expected: self.shape,
                actual: shape,
            });
        }
        if frame.crs != self.crs {
            return Err(SwathError::MetadataMismatch {
                field: "crs",
                expected: self.crs.to_string(),
                actual: frame.crs.to_string(),
            });
        }
        if !same_fill(frame.fill_value, self.fill_value) {
            return Err(SwathError::MetadataMismatch {
                field: "fill_value",
                expected: self.fill_value.to_string(),
                actual: frame.fill_value.to_string(),
            });
        }
        Ok(())
    }
}

/// NaN matches any NaN; other sentinels must be equal.
fn same_fill(a: f32, b: f32) -> bool {
    (a.is_nan() && b.is_nan()) || a == b
}

/// Incremental single-producer stack builder.
#[derive(Debug, Default)]
pub struct TimeStacker {
    frames: Vec<ResampledFrame>,
    layout: Option<FrameLayout>,
    rejected: Vec<(String, SwathError)>,
}

impl TimeStacker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect a pre-gathered batch. Sorting is deferred to [`finish`].
    ///
    /// [`finish`]: TimeStacker::finish
    pub fn from_frames(frames: impl IntoIterator<Item = ResampledFrame>) -> Self {
        let mut stacker = Self::new();
        for frame in frames {
            // Rejections are recorded on the stacker.
            let _ = stacker.push(frame);
        }
        stacker
    }

    /// Append a frame.
    ///
    /// The first frame fixes the shape, CRS and fill value of the stack. A
    /// frame of another shape is dropped with `ShapeMismatch`, one with
    /// another CRS or fill value with `MetadataMismatch`; the stacker stays
    /// usable.
    pub fn push(&mut self, frame: ResampledFrame) -> SwathResult<()> {
        match &self.layout {
            None => self.layout = Some(FrameLayout::of(&frame)),
            Some(layout) => {
                if let Err(error) = layout.check(&frame) {
                    warn!(
                        granule_id = %frame.granule_id,
                        error = %error,
                        kind = error.kind(),
                        "Dropping frame"
                    );
                    self.rejected.push((frame.granule_id, error.clone()));
                    return Err(error);
                }
            }
        }
        self.frames.push(frame);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames dropped so far, with the reason.
    pub fn rejected(&self) -> &[(String, SwathError)] {
        &self.rejected
    }

    /// Sort and seal the stack. Fails with `EmptyStack` if nothing was
    /// accepted.
    pub fn finish(self) -> SwathResult<TimeSeriesStack> {
        self.finish_with_rejections().0
    }

    /// Like [`finish`](Self::finish), also handing back the rejections.
    pub fn finish_with_rejections(
        self,
    ) -> (SwathResult<TimeSeriesStack>, Vec<(String, SwathError)>) {
        let mut frames = self.frames;
        let rejected = self.rejected;
        if frames.is_empty() {
            return (Err(SwathError::EmptyStack), rejected);
        }

        // Stable: ties keep insertion order.
        frames.sort_by_key(|f| f.timestamp);

        let first = &frames[0];
        let grid = first.grid.clone();
        let crs = first.crs;
        let fill_value = first.fill_value;
        let dims = first.dims.clone();

        let mut timestamps = Vec::with_capacity(frames.len());
        let mut labels = Vec::with_capacity(frames.len());
        let mut layers = Vec::with_capacity(frames.len());
        for frame in frames {
            timestamps.push(frame.timestamp);
            labels.push(frame.granule_id);
            layers.push(frame.values);
        }

        info!(
            layers = layers.len(),
            rejected = rejected.len(),
            first = %timestamps[0],
            last = %timestamps[timestamps.len() - 1],
            "Stacked frames"
        );

        let stack = TimeSeriesStack {
            axes: grid.axes(),
            grid: Some(grid),
            crs,
            fill_value,
            dims,
            timestamps,
            labels,
            layers,
        };
        (Ok(stack), rejected)
    }
}

/// Mutex-guarded [`TimeStacker`] for producers on many threads.
#[derive(Debug, Default)]
pub struct SharedStacker {
    inner: Mutex<TimeStacker>,
}

impl SharedStacker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, frame: ResampledFrame) -> SwathResult<()> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(frame)
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_inner(self) -> TimeStacker {
        self.inner
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use swath_common::BoundingBox;

    fn grid(res: f64) -> GridDefinition {
        GridDefinition::build(BoundingBox::new(0.0, 0.0, 2.0, 2.0), res).unwrap()
    }

    fn ts(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2010, 4, day, hour, 0, 0).unwrap()
    }

    fn frame(id: &str, t: DateTime<Utc>, values: Vec<f32>) -> ResampledFrame {
        ResampledFrame::new(grid(1.0), values, t, id, f32::NAN).unwrap()
    }

    #[test]
    fn test_sorted_by_timestamp() {
        let stack = TimeStacker::from_frames(vec![
            frame("t2", ts(2, 0), vec![2.0; 4]),
            frame("t1", ts(1, 0), vec![1.0; 4]),
            frame("t3", ts(3, 0), vec![3.0; 4]),
        ])
        .finish()
        .unwrap();
        assert_eq!(stack.labels(), &["t1", "t2", "t3"]);
        assert_eq!(stack.layer(0).unwrap()[0], 1.0);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let mut stacker = TimeStacker::new();
        stacker.push(frame("b", ts(1, 0), vec![0.0; 4])).unwrap();
        stacker.push(frame("a", ts(1, 0), vec![0.0; 4])).unwrap();
        stacker.push(frame("early", ts(1, 0) - chrono::Duration::hours(1), vec![0.0; 4])).unwrap();
        let stack = stacker.finish().unwrap();
        assert_eq!(stack.labels(), &["early", "b", "a"]);
    }

    #[test]
    fn test_shape_mismatch_dropped() {
        let mut stacker = TimeStacker::new();
        stacker.push(frame("ok", ts(1, 0), vec![0.0; 4])).unwrap();

        let odd = ResampledFrame::new(grid(0.5), vec![0.0; 16], ts(2, 0), "odd", f32::NAN).unwrap();
        let err = stacker.push(odd).unwrap_err();
        assert_eq!(
            err,
            SwathError::ShapeMismatch {
                expected: (2, 2),
                actual: (4, 4)
            }
        );

        stacker.push(frame("ok2", ts(3, 0), vec![0.0; 4])).unwrap();
        assert_eq!(stacker.rejected().len(), 1);
        assert_eq!(stacker.finish().unwrap().len(), 2);
    }

    #[test]
    fn test_fill_value_mismatch_dropped() {
        let nan = f32::NAN;
        let mut stacker = TimeStacker::new();
        stacker.push(frame("a", ts(1, 18), vec![nan; 4])).unwrap();

        let sentinel = ResampledFrame::new(
            grid(1.0),
            vec![2.0, -9999.0, -9999.0, -9999.0],
            ts(1, 19),
            "b",
            -9999.0,
        )
        .unwrap();
        let err = stacker.push(sentinel).unwrap_err();
        assert!(matches!(
            err,
            SwathError::MetadataMismatch { field: "fill_value", .. }
        ));
        assert!(err.is_per_item());
        assert_eq!(stacker.rejected()[0].0, "b");

        let stack = stacker.finish().unwrap();
        assert_eq!(stack.len(), 1);
        let daily = stack.daily_mean().unwrap();
        assert!(daily.layer(0).unwrap().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_crs_mismatch_dropped() {
        let mut stacker = TimeStacker::new();
        stacker.push(frame("wgs84", ts(1, 0), vec![1.0; 4])).unwrap();

        let mut nad83 = frame("nad83", ts(2, 0), vec![2.0; 4]);
        nad83.crs = CrsCode::Epsg4269;
        assert_eq!(
            stacker.push(nad83).unwrap_err(),
            SwathError::MetadataMismatch {
                field: "crs",
                expected: "EPSG:4326".to_string(),
                actual: "EPSG:4269".to_string(),
            }
        );

        stacker.push(frame("nan_fill_again", ts(3, 0), vec![3.0; 4])).unwrap();
        let stack = stacker.finish().unwrap();
        assert_eq!(stack.labels(), &["wgs84", "nan_fill_again"]);
        assert_eq!(stack.crs(), CrsCode::Epsg4326);
    }

    #[test]
    fn test_empty_stack() {
        assert_eq!(TimeStacker::new().finish().unwrap_err(), SwathError::EmptyStack);
    }

    #[test]
    fn test_daily_mean_ignores_fill() {
        let nan = f32::NAN;
        let stack = TimeStacker::from_frames(vec![
            frame("a", ts(1, 18), vec![1.0, nan, nan, 4.0]),
            frame("b", ts(1, 19), vec![3.0, 2.0, nan, nan]),
            frame("c", ts(2, 5), vec![5.0, nan, nan, nan]),
        ])
        .finish()
        .unwrap();

        let daily = stack.daily_mean().unwrap();
        assert_eq!(daily.len(), 2);
        assert_eq!(daily.timestamps()[0], ts(1, 0));
        assert_eq!(daily.labels()[1], "2010-04-02");

        let day1 = daily.layer(0).unwrap();
        assert_eq!(day1[0], 2.0);
        assert_eq!(day1[1], 2.0);
        assert!(day1[2].is_nan());
        assert_eq!(day1[3], 4.0);

        let day2 = daily.layer(1).unwrap();
        assert_eq!(day2[0], 5.0);
        assert!(day2[1].is_nan());
    }

    #[test]
    fn test_contiguous_and_value_at() {
        let stack = TimeStacker::from_frames(vec![
            frame("a", ts(1, 0), vec![1.0, 2.0, 3.0, 4.0]),
            frame("b", ts(2, 0), vec![5.0, 6.0, 7.0, 8.0]),
        ])
        .finish()
        .unwrap();
        assert_eq!(stack.shape(), (2, 2, 2));
        assert_eq!(stack.to_contiguous(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(stack.value_at(1, 1, 0), Some(7.0));
        assert_eq!(stack.value_at(2, 0, 0), None);
        assert_eq!(stack.frame(1).unwrap().granule_id, "b");
    }

    #[test]
    fn test_shared_stacker_across_threads() {
        let shared = SharedStacker::new();
        std::thread::scope(|s| {
            for day in 1..=4 {
                let shared = &shared;
                s.spawn(move || {
                    shared
                        .push(frame(&format!("d{}", day), ts(day, 0), vec![day as f32; 4]))
                        .unwrap();
                });
            }
        });
        let stack = shared.into_inner().finish().unwrap();
        assert_eq!(stack.labels(), &["d1", "d2", "d3", "d4"]);
    }

    #[test]
    fn test_from_parts_sorts_and_checks_shape() {
        let axes = grid(1.0).axes();
        let stack = TimeSeriesStack::from_parts(
            axes.clone(),
            CrsCode::Epsg4326,
            f32::NAN,
            vec![ts(2, 0), ts(1, 0)],
            vec!["late".into(), "early".into()],
            vec![vec![2.0; 4], vec![1.0; 4]],
        )
        .unwrap();
        assert_eq!(stack.labels(), &["early", "late"]);
        assert!(stack.grid().is_none());

        let err = TimeSeriesStack::from_parts(
            axes,
            CrsCode::Epsg4326,
            f32::NAN,
            vec![ts(1, 0)],
            vec!["x".into()],
            vec![vec![0.0; 3]],
        );
        assert!(matches!(err, Err(SwathError::ShapeMismatch { .. })));
    }
}
