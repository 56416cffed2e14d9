//! Configuration for the swath processor.

use serde::{Deserialize, Serialize};
use swath_common::{BoundingBox, CrsCode, SwathError, SwathResult, DEFAULT_FILL_VALUE};

/// Default target resolution in degrees (~300 m at the equator).
pub const DEFAULT_RESOLUTION: f64 = 0.0027;

/// Default search radius for nearest-neighbour resampling, in metres.
pub const DEFAULT_RADIUS_OF_INFLUENCE_M: f64 = 5000.0;

/// Sigma used when `gaussian` is requested from the environment without an
/// explicit `SWATH_SIGMA_M`.
pub const DEFAULT_GAUSSIAN_SIGMA_M: f64 = 1500.0;

/// Configuration for gridding a batch of granules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Target extent `(lon_min, lat_min, lon_max, lat_max)`.
    pub bbox: BoundingBox,

    /// Grid spacing in degrees.
    pub resolution: f64,

    /// CRS frames are labelled with. Only geographic codes are accepted;
    /// the grid axes are degrees either way.
    pub crs: CrsCode,

    /// Maximum distance between a cell centre and a contributing sample.
    pub radius_of_influence_m: f64,

    /// Neighbour weighting scheme.
    pub algorithm: ResampleAlgorithm,

    /// Value written to unresolved cells.
    pub fill_value: f32,

    /// File name prefix for exported slices.
    pub output_prefix: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            bbox: BoundingBox::new(-130.0, 30.0, -110.0, 50.0),
            resolution: DEFAULT_RESOLUTION,
            crs: CrsCode::Epsg4326,
            radius_of_influence_m: DEFAULT_RADIUS_OF_INFLUENCE_M,
            algorithm: ResampleAlgorithm::Nearest,
            fill_value: DEFAULT_FILL_VALUE,
            output_prefix: "TSM".to_string(),
        }
    }
}

impl ProcessorConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset variables keep their defaults. A variable that is set but does
    /// not parse is an `InvalidParameter` (or `UnsupportedCrs`) error;
    /// [`validate`] reports values that parse but make no sense.
    ///
    /// [`validate`]: ProcessorConfig::validate
    pub fn from_env() -> SwathResult<Self> {
        let mut config = Self::default();

        if let Some(val) = env_var("SWATH_BBOX") {
            config.bbox = BoundingBox::from_bbox_string(&val)
                .map_err(|e| SwathError::invalid_parameter("SWATH_BBOX", e.to_string()))?;
        }

        if let Some(res) = parse_env("SWATH_RESOLUTION")? {
            config.resolution = res;
        }

        if let Some(val) = env_var("SWATH_CRS") {
            config.crs = CrsCode::parse(&val)?;
        }

        if let Some(radius) = parse_env("SWATH_RADIUS_M")? {
            config.radius_of_influence_m = radius;
        }

        if let Some(val) = env_var("SWATH_ALGORITHM") {
            config.algorithm = val.parse()?;
        }

        let sigma: Option<f64> = parse_env("SWATH_SIGMA_M")?;
        if let ResampleAlgorithm::Gaussian { sigma_m } = &mut config.algorithm {
            *sigma_m = Some(sigma.unwrap_or(DEFAULT_GAUSSIAN_SIGMA_M));
        }

        if let Some(fill) = parse_env("SWATH_FILL_VALUE")? {
            config.fill_value = fill;
        }

        if let Some(val) = env_var("SWATH_OUTPUT_PREFIX") {
            config.output_prefix = val;
        }

        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Every failure here is a configuration error that invalidates the
    /// whole run.
    pub fn validate(&self) -> SwathResult<()> {
        self.bbox.validate()?;

        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(SwathError::invalid_parameter(
                "resolution",
                format!("must be > 0, got {}", self.resolution),
            ));
        }

        if !self.crs.is_geographic() {
            return Err(SwathError::UnsupportedCrs(format!(
                "{} (grids must be geographic)",
                self.crs
            )));
        }

        self.resample_params().validate()?;

        if self.output_prefix.is_empty() {
            return Err(SwathError::invalid_parameter(
                "output_prefix",
                "must not be empty",
            ));
        }

        Ok(())
    }

    /// Resampler parameters carried by this configuration.
    pub fn resample_params(&self) -> ResampleParams {
        ResampleParams {
            radius_of_influence_m: self.radius_of_influence_m,
            algorithm: self.algorithm,
            fill_value: self.fill_value,
        }
    }
}

/// A non-empty environment variable.
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|val| !val.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str) -> SwathResult<Option<T>> {
    env_var(name)
        .map(|val| {
            val.trim().parse().map_err(|_| {
                SwathError::invalid_parameter(name, format!("cannot parse '{}'", val))
            })
        })
        .transpose()
}

/// Neighbour weighting used when mapping swath samples onto grid cells.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum ResampleAlgorithm {
    /// Value of the single closest valid sample.
    #[default]
    Nearest,
    /// Mean of all valid samples in range, weighted by `exp(-d²/2σ²)`.
    Gaussian {
        /// Kernel width in metres. Required.
        sigma_m: Option<f64>,
    },
}

impl ResampleAlgorithm {
    /// Gaussian kernel with the given sigma.
    pub fn gaussian(sigma_m: f64) -> Self {
        Self::Gaussian {
            sigma_m: Some(sigma_m),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nearest => "nearest",
            Self::Gaussian { .. } => "gaussian",
        }
    }
}

impl std::fmt::Display for ResampleAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gaussian {
                sigma_m: Some(sigma),
            } => write!(f, "gaussian(sigma={}m)", sigma),
            _ => write!(f, "{}", self.as_str()),
        }
    }
}

/// Case-insensitive method name. `gaussian` comes back without a sigma.
impl std::str::FromStr for ResampleAlgorithm {
    type Err = SwathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nearest" => Ok(Self::Nearest),
            "gaussian" | "gauss" => Ok(Self::Gaussian { sigma_m: None }),
            other => Err(SwathError::invalid_parameter(
                "algorithm",
                format!("unknown resampling method '{}' (expected nearest or gaussian)", other),
            )),
        }
    }
}

/// Parameters for a [`NeighborResampler`](crate::resample::NeighborResampler).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResampleParams {
    pub radius_of_influence_m: f64,
    pub algorithm: ResampleAlgorithm,
    pub fill_value: f32,
}

impl Default for ResampleParams {
    fn default() -> Self {
        ProcessorConfig::default().resample_params()
    }
}

impl ResampleParams {
    pub fn validate(&self) -> SwathResult<()> {
        if !(self.radius_of_influence_m.is_finite() && self.radius_of_influence_m > 0.0) {
            return Err(SwathError::invalid_parameter(
                "radius_of_influence",
                format!("must be > 0, got {}", self.radius_of_influence_m),
            ));
        }

        match self.algorithm {
            ResampleAlgorithm::Nearest => Ok(()),
            ResampleAlgorithm::Gaussian { sigma_m: None } => Err(SwathError::invalid_parameter(
                "sigma",
                "gaussian resampling requires sigma",
            )),
            ResampleAlgorithm::Gaussian {
                sigma_m: Some(sigma),
            } if !(sigma.is_finite() && sigma > 0.0) => Err(SwathError::invalid_parameter(
                "sigma",
                format!("must be > 0, got {}", sigma),
            )),
            ResampleAlgorithm::Gaussian { .. } => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProcessorConfig::default();
        assert_eq!(config.resolution, 0.0027);
        assert_eq!(config.crs, CrsCode::Epsg4326);
        assert_eq!(config.radius_of_influence_m, 5000.0);
        assert_eq!(config.algorithm, ResampleAlgorithm::Nearest);
        assert!(config.fill_value.is_nan());
        assert_eq!(config.output_prefix, "TSM");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ProcessorConfig::default();
        config.resolution = 0.0;
        assert!(matches!(
            config.validate(),
            Err(SwathError::InvalidParameter { .. })
        ));

        config = ProcessorConfig::default();
        config.bbox = BoundingBox::new(-110.0, 30.0, -130.0, 50.0);
        assert!(matches!(config.validate(), Err(SwathError::InvalidBounds(_))));

        config = ProcessorConfig::default();
        config.crs = CrsCode::Epsg3857;
        assert!(matches!(config.validate(), Err(SwathError::UnsupportedCrs(_))));

        config = ProcessorConfig::default();
        config.radius_of_influence_m = -1.0;
        assert!(matches!(
            config.validate(),
            Err(SwathError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_gaussian_requires_sigma() {
        let mut params = ResampleParams::default();
        params.algorithm = ResampleAlgorithm::Gaussian { sigma_m: None };
        let err = params.validate().unwrap_err();
        assert!(err.to_string().contains("sigma"));

        params.algorithm = ResampleAlgorithm::gaussian(0.0);
        assert!(params.validate().is_err());

        params.algorithm = ResampleAlgorithm::gaussian(1500.0);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_algorithm_from_str() {
        assert_eq!("NEAREST".parse::<ResampleAlgorithm>().unwrap(), ResampleAlgorithm::Nearest);
        assert_eq!(
            " Gaussian ".parse::<ResampleAlgorithm>().unwrap(),
            ResampleAlgorithm::Gaussian { sigma_m: None }
        );
    }

    #[test]
    fn test_algorithm_typo_rejected() {
        let err = "gausian".parse::<ResampleAlgorithm>().unwrap_err();
        assert!(matches!(err, SwathError::InvalidParameter { ref param, .. } if param == "algorithm"));
        assert!(err.to_string().contains("gausian"));
        assert!("".parse::<ResampleAlgorithm>().is_err());
    }

    #[test]
    fn test_algorithm_yaml_typo_rejected() {
        let parsed: Result<ProcessorConfig, _> =
            serde_yaml::from_str("algorithm:\n  method: gausian\n  sigma_m: 1500.0\n");
        assert!(parsed.is_err());
    }

    /// All `SWATH_*` variables live in one test; the process environment is
    /// shared between test threads.
    #[test]
    fn test_from_env() {
        let vars = [
            ("SWATH_BBOX", "-121,39,-119,41"),
            ("SWATH_RESOLUTION", "0.01"),
            ("SWATH_CRS", "EPSG:4269"),
            ("SWATH_ALGORITHM", "gaussian"),
            ("SWATH_SIGMA_M", "2000"),
        ];
        for (name, val) in vars {
            std::env::set_var(name, val);
        }

        let config = ProcessorConfig::from_env().unwrap();
        assert_eq!(config.bbox, BoundingBox::new(-121.0, 39.0, -119.0, 41.0));
        assert_eq!(config.resolution, 0.01);
        assert_eq!(config.crs, CrsCode::Epsg4269);
        assert_eq!(config.algorithm, ResampleAlgorithm::gaussian(2000.0));

        std::env::set_var("SWATH_ALGORITHM", "gausian");
        assert!(matches!(
            ProcessorConfig::from_env(),
            Err(SwathError::InvalidParameter { .. })
        ));
        std::env::set_var("SWATH_ALGORITHM", "nearest");
        std::env::set_var("SWATH_RESOLUTION", "fine");
        assert!(ProcessorConfig::from_env().is_err());

        for (name, _) in vars {
            std::env::remove_var(name);
        }
        std::env::remove_var("SWATH_ALGORITHM");
        assert_eq!(ProcessorConfig::from_env().unwrap().algorithm, ResampleAlgorithm::Nearest);
    }

    #[test]
    fn test_algorithm_serde_tagged() {
        let json = serde_json::to_string(&ResampleAlgorithm::gaussian(1500.0)).unwrap();
        assert_eq!(json, r#"{"method":"gaussian","sigma_m":1500.0}"#);
        let back: ResampleAlgorithm = serde_json::from_str(r#"{"method":"nearest"}"#).unwrap();
        assert_eq!(back, ResampleAlgorithm::Nearest);
    }
}
