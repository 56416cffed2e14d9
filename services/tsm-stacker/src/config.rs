//! Configuration for the TSM stacker.
//!
//! Loaded from a YAML file with `${VAR}` / `${VAR:-default}` environment
//! substitution, or from `SWATH_*` / `TSM_*` environment variables alone.
//! Command-line flags are applied on top by `main`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use raster_io::{ZarrCompression, ZarrStackConfig};
use serde::{Deserialize, Serialize};
use swath_common::CrsCode;
use swath_processor::ProcessorConfig;

/// Store names inside the output directory.
pub const STACK_STORE: &str = "stacked_tsm.zarr";
pub const CLIPPED_STORE: &str = "stacked_tsm_clipped.zarr";
pub const DAILY_STORE: &str = "tsm_daily.zarr";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StackerConfig {
    /// Directory holding one sub-directory per granule.
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub processor: ProcessorConfig,
    pub geotiff: GeoTiffConfig,
    pub zarr: ZarrStackConfig,
    pub clip: ClipConfig,
    /// Also write per-day means.
    pub daily_mean: bool,
    /// Stack frames as they complete instead of after the whole batch.
    pub streaming: bool,
    pub logging: LoggingConfig,
}

impl Default for StackerConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("./MERIS_downloads/processed"),
            output_dir: PathBuf::from("./output"),
            processor: ProcessorConfig::default(),
            geotiff: GeoTiffConfig::default(),
            zarr: ZarrStackConfig::default(),
            clip: ClipConfig::default(),
            daily_mean: true,
            streaming: false,
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoTiffConfig {
    pub enabled: bool,
    /// Sub-directory of the output directory.
    pub subdir: String,
}

impl Default for GeoTiffConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            subdir: "geotiffs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipConfig {
    /// Shapefile, GeoJSON or WKT file. No clipping when unset or empty.
    pub path: Option<PathBuf>,
    /// CRS of the polygon when the file does not name one.
    pub crs: CrsCode,
    /// Crop to the data extent instead of only masking.
    pub drop: bool,
}

impl ClipConfig {
    /// The polygon file, if clipping is enabled.
    pub fn polygon_path(&self) -> Option<&Path> {
        self.path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl StackerConfig {
    /// Defaults, with the processor section, directories and Zarr
    /// compression taken from the environment.
    pub fn from_env() -> Result<Self> {
        let mut config = Self {
            processor: ProcessorConfig::from_env()
                .context("Invalid processor settings in the environment")?,
            ..Self::default()
        };
        if let Ok(dir) = std::env::var("TSM_INPUT_DIR") {
            config.input_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("TSM_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Ok(name) = std::env::var("TSM_ZARR_COMPRESSION") {
            config.zarr.compression = name
                .parse::<ZarrCompression>()
                .context("Invalid TSM_ZARR_COMPRESSION")?;
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.processor
            .validate()
            .context("Invalid processor configuration")?;
        self.zarr.validate().context("Invalid zarr configuration")?;
        anyhow::ensure!(
            !self.geotiff.subdir.is_empty(),
            "geotiff.subdir cannot be empty"
        );
        anyhow::ensure!(
            self.input_dir != self.output_dir,
            "input_dir and output_dir must differ"
        );
        Ok(())
    }

    pub fn geotiff_dir(&self) -> PathBuf {
        self.output_dir.join(&self.geotiff.subdir)
    }
}

/// Load and validate a YAML configuration file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<StackerConfig> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config from {:?}", path.as_ref()))?;

    let expanded = expand_env_vars(&content)?;

    let config: StackerConfig = serde_yaml::from_str(&expanded)
        .with_context(|| format!("Failed to parse config YAML from {:?}", path.as_ref()))?;

    Ok(config)
}

/// Expand `${VAR}` and `${VAR:-default}` references.
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::new();
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'

            let mut var_expr = String::new();
            let mut brace_count = 1;

            while brace_count > 0 {
                match chars.next() {
                    Some('{') => {
                        brace_count += 1;
                        var_expr.push('{');
                    }
                    Some('}') => {
                        brace_count -= 1;
                        if brace_count > 0 {
                            var_expr.push('}');
                        }
                    }
                    Some(c) => var_expr.push(c),
                    None => anyhow::bail!("Unclosed variable substitution: ${{{}", var_expr),
                }
            }

            result.push_str(&resolve_var_expr(&var_expr)?);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

/// Resolve `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> Result<String> {
    if let Some((var_name, default)) = expr.split_once(":-") {
        match std::env::var(var_name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        }
    } else {
        std::env::var(expr.trim())
            .with_context(|| format!("Environment variable {} not set", expr))
    }
}
