//! TSM stacker.
//!
//! Regrids every MERIS granule under the input directory onto a regular
//! lat/lon grid, stacks the frames by acquisition time and writes GeoTIFF
//! slices plus Zarr stores (full, clipped, daily mean).

mod config;
mod pipeline;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use swath_common::CrsCode;
use swath_processor::ResampleAlgorithm;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use config::{load_config, StackerConfig};

#[derive(Parser, Debug)]
#[command(name = "tsm-stacker")]
#[command(about = "Regrid MERIS TSM swaths and build time stacks")]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "TSM_CONFIG")]
    config: Option<PathBuf>,

    /// Directory of granule folders
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Grid resolution in degrees
    #[arg(long)]
    resolution: Option<f64>,

    /// Resampling method (nearest, gaussian)
    #[arg(long)]
    method: Option<String>,

    /// Gaussian sigma in metres
    #[arg(long)]
    sigma: Option<f64>,

    /// Search radius in metres
    #[arg(long)]
    radius: Option<f64>,

    /// Shapefile, GeoJSON or WKT polygon to clip the stack to
    #[arg(long)]
    clip: Option<PathBuf>,

    /// CRS of the clip polygon when the file does not name one
    #[arg(long)]
    clip_crs: Option<String>,

    /// Crop the clipped stack to the polygon's data extent
    #[arg(long)]
    drop: bool,

    /// Skip the daily mean store
    #[arg(long)]
    no_daily: bool,

    /// Skip GeoTIFF slices
    #[arg(long)]
    no_geotiff: bool,

    /// Stack frames as they complete
    #[arg(long)]
    streaming: bool,

    /// Number of rayon worker threads
    #[arg(long, env = "TSM_WORKER_THREADS")]
    threads: Option<usize>,

    /// Log level
    #[arg(long, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config);

    if let Some(threads) = args.threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
        {
            error!(error = %e, "Failed to configure worker threads");
            return ExitCode::FAILURE;
        }
    }

    info!(
        input_dir = %config.input_dir.display(),
        output_dir = %config.output_dir.display(),
        "Starting TSM stacker"
    );

    match pipeline::run(&config) {
        Ok(summary) => {
            info!(
                store = %summary.stack_store.display(),
                processed = summary.processed,
                skipped = summary.skipped,
                "Done"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "Pipeline failed");
            ExitCode::FAILURE
        }
    }
}

/// File (or environment) configuration with command-line overrides.
fn build_config(args: &Args) -> Result<StackerConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => StackerConfig::from_env()?,
    };

    if let Some(input) = &args.input {
        config.input_dir = input.clone();
    }
    if let Some(output) = &args.output {
        config.output_dir = output.clone();
    }
    if let Some(resolution) = args.resolution {
        config.processor.resolution = resolution;
    }
    config.processor.algorithm =
        resolve_algorithm(config.processor.algorithm, args.method.as_deref(), args.sigma)?;
    if let Some(radius) = args.radius {
        config.processor.radius_of_influence_m = radius;
    }
    if let Some(clip) = &args.clip {
        config.clip.path = Some(clip.clone());
    }
    if let Some(crs) = &args.clip_crs {
        config.clip.crs = CrsCode::parse(crs).context("Invalid --clip-crs")?;
    }
    if args.drop {
        config.clip.drop = true;
    }
    if args.no_daily {
        config.daily_mean = false;
    }
    if args.no_geotiff {
        config.geotiff.enabled = false;
    }
    if args.streaming {
        config.streaming = true;
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json = true;
    }

    config.validate()?;
    Ok(config)
}

/// Apply `--method` and `--sigma` to the configured algorithm.
///
/// `--method gaussian` keeps a sigma the file already set. `--sigma` alone
/// selects the gaussian kernel; together with `--method nearest` it is an
/// error.
fn resolve_algorithm(
    configured: ResampleAlgorithm,
    method: Option<&str>,
    sigma: Option<f64>,
) -> Result<ResampleAlgorithm> {
    let algorithm = match method {
        Some(name) => {
            let requested: ResampleAlgorithm = name.parse().context("Invalid --method")?;
            match (requested, configured) {
                (ResampleAlgorithm::Gaussian { .. }, ResampleAlgorithm::Gaussian { sigma_m }) => {
                    ResampleAlgorithm::Gaussian { sigma_m }
                }
                (requested, _) => requested,
            }
        }
        None => configured,
    };

    match (sigma, algorithm) {
        (None, algorithm) => Ok(algorithm),
        (Some(sigma), ResampleAlgorithm::Gaussian { .. }) => Ok(ResampleAlgorithm::gaussian(sigma)),
        (Some(_), ResampleAlgorithm::Nearest) if method.is_some() => {
            anyhow::bail!("--sigma requires --method gaussian")
        }
        (Some(sigma), ResampleAlgorithm::Nearest) => Ok(ResampleAlgorithm::gaussian(sigma)),
    }
}

fn init_tracing(config: &StackerConfig) {
    let filter = EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true);

    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides() {
        let args = Args::parse_from([
            "tsm-stacker",
            "--input",
            "/data/in",
            "--output",
            "/data/out",
            "--sigma",
            "2000",
            "--clip",
            "roi.wkt",
            "--clip-crs",
            "EPSG:3857",
            "--drop",
            "--no-daily",
        ]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.input_dir, PathBuf::from("/data/in"));
        assert_eq!(config.processor.algorithm, ResampleAlgorithm::gaussian(2000.0));
        assert_eq!(config.clip.crs, CrsCode::Epsg3857);
        assert!(config.clip.drop);
        assert!(!config.daily_mean);
        assert!(config.geotiff.enabled);
    }

    #[test]
    fn test_gaussian_without_sigma_is_rejected() {
        let args = Args::parse_from([
            "tsm-stacker",
            "--input",
            "/data/in",
            "--output",
            "/data/out",
            "--method",
            "gaussian",
        ]);
        assert!(build_config(&args).is_err());
    }

    fn dirs<'a>(extra: &[&'a str]) -> Vec<&'a str> {
        let mut argv = vec!["tsm-stacker", "--input", "/data/in", "--output", "/data/out"];
        argv.extend_from_slice(extra);
        argv
    }

    #[test]
    fn test_method_and_sigma_in_either_order() {
        for extra in [
            ["--method", "gaussian", "--sigma", "1200"],
            ["--sigma", "1200", "--method", "gaussian"],
        ] {
            let config = build_config(&Args::parse_from(dirs(&extra))).unwrap();
            assert_eq!(config.processor.algorithm, ResampleAlgorithm::gaussian(1200.0));
        }
    }

    #[test]
    fn test_sigma_with_nearest_is_rejected() {
        for extra in [
            ["--method", "nearest", "--sigma", "1200"],
            ["--sigma", "1200", "--method", "nearest"],
        ] {
            let err = build_config(&Args::parse_from(dirs(&extra))).unwrap_err();
            assert!(format!("{:#}", err).contains("--sigma requires --method gaussian"));
        }
    }

    #[test]
    fn test_method_gaussian_keeps_file_sigma() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stacker.yaml");
        std::fs::write(
            &path,
            "processor:\n  algorithm:\n    method: gaussian\n    sigma_m: 1500.0\n",
        )
        .unwrap();
        let config_arg = path.to_string_lossy().into_owned();

        let args = Args::parse_from(dirs(&["--config", &config_arg, "--method", "gaussian"]));
        let config = build_config(&args).unwrap();
        assert_eq!(config.processor.algorithm, ResampleAlgorithm::gaussian(1500.0));

        let args = Args::parse_from(dirs(&["--config", &config_arg, "--sigma", "900"]));
        let config = build_config(&args).unwrap();
        assert_eq!(config.processor.algorithm, ResampleAlgorithm::gaussian(900.0));

        let args = Args::parse_from(dirs(&["--config", &config_arg, "--method", "nearest"]));
        let config = build_config(&args).unwrap();
        assert_eq!(config.processor.algorithm, ResampleAlgorithm::Nearest);
    }

    #[test]
    fn test_unknown_method_is_rejected() {
        let err = build_config(&Args::parse_from(dirs(&["--method", "bilinear"]))).unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid --method"));
    }

    #[test]
    fn test_unknown_clip_crs_is_rejected() {
        let args = Args::parse_from(["tsm-stacker", "--clip-crs", "EPSG:32633"]);
        assert!(build_config(&args).is_err());
    }
}
