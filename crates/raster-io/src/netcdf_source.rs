//! MERIS Level-2 granule folders read with the NetCDF C library.
//!
//! Only two files of the unpacked product are used: `tsm_nn.nc` (variable
//! `TSM_NN`) and `geo_coordinates.nc` (`latitude`, `longitude`). Packed
//! values are decoded with `scale_factor` / `add_offset` and `_FillValue`
//! becomes NaN.

use std::path::{Path, PathBuf};

use swath_common::{SwathError, SwathResult};
use swath_processor::{GranuleInput, GranuleSource};
use tracing::debug;

pub const TSM_FILE: &str = "tsm_nn.nc";
pub const TSM_VARIABLE: &str = "TSM_NN";
pub const GEO_FILE: &str = "geo_coordinates.nc";

/// Granule stored as an unpacked MERIS product directory.
#[derive(Debug, Clone)]
pub struct NetcdfGranuleSource {
    dir: PathBuf,
    id: String,
}

impl NetcdfGranuleSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let id = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { dir, id }
    }

    /// `true` if either MERIS file is present.
    pub fn detect(dir: &Path) -> bool {
        dir.join(TSM_FILE).is_file() || dir.join(GEO_FILE).is_file()
    }

    /// Read `variable` from `file`. `Ok(None)` when the file or variable is
    /// absent; other failures are reported as missing input with the cause.
    fn read_variable(&self, file: &str, variable: &str) -> SwathResult<Option<(Vec<f64>, usize, usize)>> {
        let path = self.dir.join(file);
        if !path.is_file() {
            return Ok(None);
        }
        let nc = netcdf::open(&path).map_err(|e| {
            SwathError::missing_input(&self.id, format!("{} ({})", file, e))
        })?;
        let Some(var) = nc.variable(variable) else {
            return Ok(None);
        };

        let shape: Vec<usize> = var
            .dimensions()
            .iter()
            .map(|d| d.len())
            .filter(|len| *len != 1)
            .collect();
        let (rows, cols) = match shape[..] {
            [rows, cols] => (rows, cols),
            [n] => (1, n),
            _ => {
                return Err(SwathError::InvalidSwath {
                    granule_id: self.id.clone(),
                    message: format!("'{}' has shape {:?}, expected 2D", variable, shape),
                })
            }
        };

        let raw: Vec<f64> = var.get_values(..).map_err(|e| {
            SwathError::missing_input(&self.id, format!("{}:{} ({})", file, variable, e))
        })?;

        let scale = get_f64_attr(&var, "scale_factor").unwrap_or(1.0);
        let offset = get_f64_attr(&var, "add_offset").unwrap_or(0.0);
        let fill = get_f64_attr(&var, "_FillValue");
        let values = raw
            .into_iter()
            .map(|v| match fill {
                Some(fill) if v == fill => f64::NAN,
                _ => v * scale + offset,
            })
            .collect();

        debug!(granule_id = %self.id, file, variable, rows, cols, "Read NetCDF variable");
        Ok(Some((values, rows, cols)))
    }
}

impl GranuleSource for NetcdfGranuleSource {
    fn granule_id(&self) -> &str {
        &self.id
    }

    fn load(&self) -> SwathResult<GranuleInput> {
        let values = self.read_variable(TSM_FILE, TSM_VARIABLE)?;
        let lat = self.read_variable(GEO_FILE, "latitude")?;
        let lon = self.read_variable(GEO_FILE, "longitude")?;

        let (rows, cols) = values
            .as_ref()
            .or(lat.as_ref())
            .or(lon.as_ref())
            .map(|(_, r, c)| (*r, *c))
            .unwrap_or((0, 0));

        Ok(GranuleInput {
            id: self.id.clone(),
            values: values.map(|(v, _, _)| v.into_iter().map(|x| x as f32).collect()),
            lat: lat.map(|(v, _, _)| v),
            lon: lon.map(|(v, _, _)| v),
            rows,
            cols,
        })
    }
}

/// Check if a variable has an attribute with the given name, without
/// provoking HDF5 error output for absent ones.
fn has_attr(var: &netcdf::Variable, name: &str) -> bool {
    var.attributes().any(|attr| attr.name() == name)
}

fn get_f64_attr(var: &netcdf::Variable, name: &str) -> Option<f64> {
    if !has_attr(var, name) {
        return None;
    }
    let value = var.attribute_value(name)?.ok()?;
    f64::try_from(value).ok()
}
