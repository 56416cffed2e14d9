//! Discover, regrid, stack, export.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use raster_io::{discover_granules, read_clip_polygon, GeoTiffWriter, ZarrStackWriter};
use swath_processor::{
    BatchRunner, ClipMode, GranuleProcessor, SpatialClipper, SpatialRaster, TimeSeriesStack,
};
use tracing::{info, warn};

use crate::config::{StackerConfig, CLIPPED_STORE, DAILY_STORE, STACK_STORE};

/// What a run produced.
#[derive(Debug, Default)]
pub struct PipelineSummary {
    pub processed: usize,
    pub skipped: usize,
    pub rejected: usize,
    /// `(t, h, w)` of the full stack.
    pub shape: (usize, usize, usize),
    pub geotiffs: Vec<PathBuf>,
    pub stack_store: PathBuf,
    pub clipped_store: Option<PathBuf>,
    pub daily_store: Option<PathBuf>,
}

pub fn run(config: &StackerConfig) -> Result<PipelineSummary> {
    let start = Instant::now();
    config.validate()?;

    let granules = discover_granules(&config.input_dir)
        .with_context(|| format!("Failed to list granules in {:?}", config.input_dir))?;
    info!(
        input_dir = %config.input_dir.display(),
        granules = granules.len(),
        algorithm = %config.processor.algorithm,
        resolution = config.processor.resolution,
        "Discovered granules"
    );

    let processor = GranuleProcessor::from_config(&config.processor)
        .context("Failed to build granule processor")?;
    let runner = BatchRunner::new(processor);
    let report = if config.streaming {
        runner.run_streaming(&granules)
    } else {
        runner.run(&granules)
    };

    let mut summary = PipelineSummary {
        processed: report.processed,
        skipped: report.skipped.len(),
        rejected: report.rejected.len(),
        ..Default::default()
    };
    let stack = report
        .stack
        .with_context(|| format!("No granule in {:?} could be stacked", config.input_dir))?;
    summary.shape = stack.shape();

    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("Failed to create {:?}", config.output_dir))?;

    if config.geotiff.enabled {
        let writer = GeoTiffWriter::new(config.geotiff_dir(), &config.processor.output_prefix);
        summary.geotiffs = stack
            .export_raster(&writer)
            .context("Failed to write GeoTIFF slices")?;
        info!(count = summary.geotiffs.len(), dir = %config.geotiff_dir().display(), "Wrote GeoTIFF slices");
    }

    summary.stack_store = write_store(config, &stack, STACK_STORE)?;

    if let Some(path) = config.clip.polygon_path() {
        let polygon = read_clip_polygon(path, config.clip.crs)
            .with_context(|| format!("Failed to load clip polygon {:?}", path))?;
        let mode = if config.clip.drop {
            ClipMode::Drop
        } else {
            ClipMode::Mask
        };
        let clipped = stack
            .clip(&SpatialClipper::new(polygon, mode))
            .context("Failed to clip stack")?;
        let (_, h, w) = clipped.shape();
        if h * w == 0 {
            warn!(polygon = %path.display(), "Clip polygon covers no data");
        }
        summary.clipped_store = Some(write_store(config, &clipped, CLIPPED_STORE)?);
    }

    if config.daily_mean {
        let daily = stack.daily_mean().context("Failed to compute daily means")?;
        summary.daily_store = Some(write_store(config, &daily, DAILY_STORE)?);
    }

    let (t, h, w) = summary.shape;
    info!(
        processed = summary.processed,
        skipped = summary.skipped,
        rejected = summary.rejected,
        layers = t,
        height = h,
        width = w,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Pipeline complete"
    );
    Ok(summary)
}

fn write_store(config: &StackerConfig, stack: &TimeSeriesStack, name: &str) -> Result<PathBuf> {
    let path = config.output_dir.join(name);
    let writer = ZarrStackWriter::new(&path, config.zarr.clone());
    let written = writer
        .write(stack)
        .with_context(|| format!("Failed to write {:?}", path))?;
    let (t, h, w) = stack.shape();
    info!(store = %written.display(), layers = t, height = h, width = w, "Wrote Zarr stack");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use raster_io::{write_zarr_granule, ZarrStackReader};
    use swath_processor::{BoundingBox, GranuleInput};
    use test_utils::{fixtures::polygons, fixtures::scenario, single_sample_swath, temp_test_dir};

    fn scenario_config(root: &std::path::Path) -> StackerConfig {
        let input_dir = root.join("granules");
        for id in scenario::GRANULE_IDS {
            let swath = single_sample_swath(scenario::SAMPLE_LON, scenario::SAMPLE_LAT, scenario::SAMPLE_VALUE);
            let input = GranuleInput::complete(id, swath.values, swath.lat, swath.lon, 1, 1);
            write_zarr_granule(&input_dir, &input).unwrap();
        }

        let (x0, y0, x1, y1) = scenario::BBOX;
        let mut config = StackerConfig {
            input_dir,
            output_dir: root.join("output"),
            ..Default::default()
        };
        config.processor.bbox = BoundingBox::new(x0, y0, x1, y1);
        config.processor.resolution = scenario::COARSE_RESOLUTION;
        config.processor.radius_of_influence_m = 1000.0;
        config
    }

    #[test]
    fn test_run_writes_all_outputs() {
        let dir = temp_test_dir();
        let config = scenario_config(dir.path());

        let summary = run(&config).unwrap();
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.shape, (3, 400, 400));
        assert_eq!(summary.geotiffs.len(), 3);
        assert!(summary.clipped_store.is_none());

        let stack = ZarrStackReader::default().read(&summary.stack_store).unwrap();
        assert_eq!(stack.shape(), (3, 400, 400));

        let daily_store = summary.daily_store.unwrap();
        let daily = ZarrStackReader::default().read(&daily_store).unwrap();
        assert_eq!(daily.labels(), &["2010-04-01", "2010-04-02"]);
    }

    #[test]
    fn test_run_with_clip_drop() {
        let dir = temp_test_dir();
        let mut config = scenario_config(dir.path());
        let polygon = dir.path().join("roi.geojson");
        std::fs::write(&polygon, polygons::TRIANGLE_GEOJSON).unwrap();
        config.clip.path = Some(polygon);
        config.clip.drop = true;
        config.geotiff.enabled = false;
        config.daily_mean = false;
        config.streaming = true;

        let summary = run(&config).unwrap();
        assert!(summary.geotiffs.is_empty());
        assert!(summary.daily_store.is_none());

        let clipped = ZarrStackReader::default()
            .read(&summary.clipped_store.unwrap())
            .unwrap();
        assert_eq!(clipped.shape(), (3, 1, 1));
        assert_eq!(clipped.value_at(0, 0, 0), Some(scenario::SAMPLE_VALUE));
    }

    #[test]
    fn test_run_fails_without_granules() {
        let dir = temp_test_dir();
        let mut config = scenario_config(dir.path());
        config.input_dir = dir.path().join("empty");
        std::fs::create_dir_all(&config.input_dir).unwrap();
        assert!(run(&config).is_err());
        assert!(!config.output_dir.join(STACK_STORE).exists());
    }

    #[test]
    fn test_run_fails_on_unreadable_polygon() {
        let dir = temp_test_dir();
        let mut config = scenario_config(dir.path());
        config.clip.path = Some(dir.path().join("missing.geojson"));
        config.geotiff.enabled = false;
        assert!(run(&config).is_err());
    }
}
