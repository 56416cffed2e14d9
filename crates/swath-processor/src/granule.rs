//! Per-granule pipeline: inputs, timestamp, resampling, one frame out.

use std::time::Instant;

use chrono::{DateTime, Utc};
use swath_common::{
    parse_acquisition_time, CrsCode, GridDefinition, SwathDataset, SwathError, SwathResult,
};
use tracing::{debug, info, warn};

use crate::config::ProcessorConfig;
use crate::resample::NeighborResampler;
use crate::types::ResampledFrame;

/// Raw arrays for one granule as delivered by a loader.
///
/// Any array may be absent; the processor reports which.
#[derive(Debug, Clone, Default)]
pub struct GranuleInput {
    pub id: String,
    pub values: Option<Vec<f32>>,
    pub lat: Option<Vec<f64>>,
    pub lon: Option<Vec<f64>>,
    pub rows: usize,
    pub cols: usize,
}

impl GranuleInput {
    /// Input with all three arrays present.
    pub fn complete(
        id: impl Into<String>,
        values: Vec<f32>,
        lat: Vec<f64>,
        lon: Vec<f64>,
        rows: usize,
        cols: usize,
    ) -> Self {
        Self {
            id: id.into(),
            values: Some(values),
            lat: Some(lat),
            lon: Some(lon),
            rows,
            cols,
        }
    }

    /// Names of the arrays that are missing.
    pub fn missing_arrays(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.values.is_none() {
            missing.push("values");
        }
        if self.lat.is_none() {
            missing.push("latitude");
        }
        if self.lon.is_none() {
            missing.push("longitude");
        }
        missing
    }

    /// Split into a validated swath, or the per-item error explaining why not.
    pub fn into_swath(self) -> SwathResult<(String, SwathDataset)> {
        let missing = self.missing_arrays();
        let id = self.id;
        match (self.values, self.lat, self.lon) {
            (Some(values), Some(lat), Some(lon)) => {
                let swath = SwathDataset::new(values, lat, lon, self.rows, self.cols)
                    .map_err(|e| e.for_granule(&id))?;
                Ok((id, swath))
            }
            _ => Err(SwathError::missing_input(id, missing.join(", "))),
        }
    }
}

/// Something that can produce a [`GranuleInput`] on demand, typically a
/// file-backed loader. Loading is deferred so batches only hold the arrays
/// of granules currently being processed.
pub trait GranuleSource: Send + Sync {
    /// Identifier used for timestamp parsing and reporting.
    fn granule_id(&self) -> &str;

    /// Load the granule's arrays. Unreadable inputs should surface as
    /// [`SwathError::MissingInput`] so the batch can skip them.
    fn load(&self) -> SwathResult<GranuleInput>;
}

impl GranuleSource for GranuleInput {
    fn granule_id(&self) -> &str {
        &self.id
    }

    fn load(&self) -> SwathResult<GranuleInput> {
        Ok(self.clone())
    }
}

/// Outcome of processing one granule.
#[derive(Debug, Clone)]
pub enum GranuleStatus {
    Processed(ResampledFrame),
    Skipped {
        granule_id: String,
        error: SwathError,
    },
}

impl GranuleStatus {
    pub fn is_processed(&self) -> bool {
        matches!(self, GranuleStatus::Processed(_))
    }

    pub fn granule_id(&self) -> &str {
        match self {
            GranuleStatus::Processed(frame) => &frame.granule_id,
            GranuleStatus::Skipped { granule_id, .. } => granule_id,
        }
    }

    pub fn into_result(self) -> SwathResult<ResampledFrame> {
        match self {
            GranuleStatus::Processed(frame) => Ok(frame),
            GranuleStatus::Skipped { error, .. } => Err(error),
        }
    }

    pub fn frame(&self) -> Option<&ResampledFrame> {
        match self {
            GranuleStatus::Processed(frame) => Some(frame),
            GranuleStatus::Skipped { .. } => None,
        }
    }
}

/// Regrids individual granules onto one shared grid.
#[derive(Debug, Clone)]
pub struct GranuleProcessor {
    grid: GridDefinition,
    crs: CrsCode,
    resampler: NeighborResampler,
}

impl GranuleProcessor {
    /// Fails if the resampler parameters in `config` are invalid or its CRS
    /// is not geographic.
    pub fn new(grid: GridDefinition, config: &ProcessorConfig) -> SwathResult<Self> {
        if !config.crs.is_geographic() {
            return Err(SwathError::UnsupportedCrs(format!(
                "{} (grids must be geographic)",
                config.crs
            )));
        }
        let resampler = NeighborResampler::new(config.resample_params())?;
        Ok(Self {
            grid,
            crs: config.crs,
            resampler,
        })
    }

    /// Validate `config` and build its grid.
    pub fn from_config(config: &ProcessorConfig) -> SwathResult<Self> {
        config.validate()?;
        let grid = GridDefinition::build(config.bbox, config.resolution)?;
        Self::new(grid, config)
    }

    pub fn grid(&self) -> &GridDefinition {
        &self.grid
    }

    pub fn resampler(&self) -> &NeighborResampler {
        &self.resampler
    }

    /// CRS every produced frame is labelled with.
    pub fn crs(&self) -> CrsCode {
        self.crs
    }

    /// Regrid one granule.
    ///
    /// Never fails outright: missing arrays, malformed swaths, and
    /// identifiers without a timestamp come back as
    /// [`GranuleStatus::Skipped`].
    pub fn process(&self, input: GranuleInput) -> GranuleStatus {
        let granule_id = input.id.clone();
        match self.try_process(input) {
            Ok(frame) => GranuleStatus::Processed(frame),
            Err(error) => {
                warn!(
                    granule_id = %granule_id,
                    error = %error,
                    kind = error.kind(),
                    "Skipping granule"
                );
                GranuleStatus::Skipped { granule_id, error }
            }
        }
    }

    /// Load from `source`, then [`process`](Self::process).
    pub fn process_source<S: GranuleSource + ?Sized>(&self, source: &S) -> GranuleStatus {
        match source.load() {
            Ok(input) => self.process(input),
            Err(error) => {
                let granule_id = source.granule_id().to_string();
                let error = error.for_granule(&granule_id);
                warn!(
                    granule_id = %granule_id,
                    error = %error,
                    kind = error.kind(),
                    "Failed to load granule"
                );
                GranuleStatus::Skipped { granule_id, error }
            }
        }
    }

    fn try_process(&self, input: GranuleInput) -> SwathResult<ResampledFrame> {
        let start = Instant::now();
        let (granule_id, swath) = input.into_swath()?;
        let timestamp: DateTime<Utc> = parse_acquisition_time(&granule_id)?;

        debug!(
            granule_id = %granule_id,
            rows = swath.rows(),
            cols = swath.cols(),
            "Resampling granule"
        );

        let values = self.resampler.resample(&swath, &self.grid);
        let mut frame = ResampledFrame::new(
            self.grid.clone(),
            values,
            timestamp,
            granule_id,
            self.resampler.fill_value(),
        )?;
        frame.crs = self.crs;

        info!(
            granule_id = %frame.granule_id,
            timestamp = %frame.timestamp,
            valid_samples = swath.valid_count(),
            filled_cells = frame.valid_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Processed granule"
        );

        Ok(frame)
    }
}
