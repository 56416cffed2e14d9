//! File-backed granule loaders.
//!
//! A granule is a directory named after the product identifier. Two layouts
//! are understood:
//!
//! - Zarr: `values/`, `latitude/`, `longitude/` arrays, each `[rows, cols]`
//! - MERIS NetCDF (feature `netcdf`): `tsm_nn.nc` holding `TSM_NN` and
//!   `geo_coordinates.nc` holding `latitude` / `longitude`
//!
//! Loading is deferred until [`GranuleSource::load`], so a batch only holds
//! the arrays of granules currently being processed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use swath_common::{SwathError, SwathResult};
use swath_processor::{GranuleInput, GranuleSource};
use tracing::{debug, warn};
use walkdir::WalkDir;
use zarrs::array::{Array, ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs_filesystem::FilesystemStore;

use crate::error::{RasterIoError, Result};

pub const VALUES_ARRAY: &str = "values";
pub const LATITUDE_ARRAY: &str = "latitude";
pub const LONGITUDE_ARRAY: &str = "longitude";

fn granule_id_of(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Granule stored as a directory of Zarr arrays.
#[derive(Debug, Clone)]
pub struct ZarrGranuleSource {
    dir: PathBuf,
    id: String,
}

impl ZarrGranuleSource {
    /// The granule id is the directory name.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let id = granule_id_of(&dir);
        Self { dir, id }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `true` if `dir` holds at least one of the expected arrays.
    pub fn detect(dir: &Path) -> bool {
        [VALUES_ARRAY, LATITUDE_ARRAY, LONGITUDE_ARRAY]
            .iter()
            .any(|name| dir.join(name).join("zarr.json").is_file())
    }

    /// Read a 2D array as f64, whatever its float width. `None` if absent.
    fn read_2d(
        &self,
        store: &Arc<FilesystemStore>,
        name: &str,
    ) -> SwathResult<Option<(Vec<f64>, usize, usize)>> {
        if !self.dir.join(name).join("zarr.json").is_file() {
            return Ok(None);
        }
        let unreadable = |e: &dyn std::fmt::Display| {
            SwathError::missing_input(&self.id, format!("{} ({})", name, e))
        };

        let array = Array::open(store.clone(), &format!("/{}", name)).map_err(|e| unreadable(&e))?;
        let shape = array.shape().to_vec();
        let &[rows, cols] = shape.as_slice() else {
            return Err(SwathError::InvalidSwath {
                granule_id: self.id.clone(),
                message: format!("'{}' has {} dimensions, expected 2", name, shape.len()),
            });
        };
        let subset = ArraySubset::new_with_shape(shape.clone());
        let values: Vec<f64> = match array.data_type() {
            DataType::Float64 => array
                .retrieve_array_subset_elements::<f64>(&subset)
                .map_err(|e| unreadable(&e))?,
            DataType::Float32 => array
                .retrieve_array_subset_elements::<f32>(&subset)
                .map_err(|e| unreadable(&e))?
                .into_iter()
                .map(f64::from)
                .collect(),
            other => {
                return Err(SwathError::InvalidSwath {
                    granule_id: self.id.clone(),
                    message: format!("'{}' has unsupported data type {:?}", name, other),
                })
            }
        };
        Ok(Some((values, rows as usize, cols as usize)))
    }
}

impl GranuleSource for ZarrGranuleSource {
    fn granule_id(&self) -> &str {
        &self.id
    }

    fn load(&self) -> SwathResult<GranuleInput> {
        let store = FilesystemStore::new(&self.dir)
            .map_err(|e| SwathError::missing_input(&self.id, format!("store ({})", e)))?;
        let store = Arc::new(store);

        let values = self.read_2d(&store, VALUES_ARRAY)?;
        let lat = self.read_2d(&store, LATITUDE_ARRAY)?;
        let lon = self.read_2d(&store, LONGITUDE_ARRAY)?;

        let (rows, cols) = values
            .as_ref()
            .or(lat.as_ref())
            .or(lon.as_ref())
            .map(|(_, r, c)| (*r, *c))
            .unwrap_or((0, 0));

        debug!(granule_id = %self.id, rows, cols, "Loaded Zarr granule");
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

/// Write `input` as a Zarr granule directory under `root`, named by its id.
/// Absent arrays are simply not written.
pub fn write_zarr_granule(root: &Path, input: &GranuleInput) -> Result<PathBuf> {
    let dir = root.join(&input.id);
    std::fs::create_dir_all(&dir).map_err(|e| RasterIoError::io(&dir, e))?;
    let store = Arc::new(FilesystemStore::new(&dir).map_err(RasterIoError::zarr)?);
    let shape = vec![input.rows as u64, input.cols as u64];

    fn write<T: zarrs::array::Element>(
        store: &Arc<FilesystemStore>,
        name: &str,
        shape: &[u64],
        data_type: DataType,
        fill: FillValue,
        values: &[T],
    ) -> Result<()> {
        let chunk_grid: zarrs::array::ChunkGrid = shape
            .iter()
            .map(|d| (*d).max(1))
            .collect::<Vec<u64>>()
            .try_into()
            .map_err(|e| RasterIoError::ConfigError(format!("{:?}", e)))?;
        let array = ArrayBuilder::new(shape.to_vec(), data_type, chunk_grid, fill)
            .build(store.clone(), &format!("/{}", name))
            .map_err(RasterIoError::zarr)?;
        array.store_metadata().map_err(RasterIoError::zarr)?;
        if !values.is_empty() {
            let subset = ArraySubset::new_with_shape(shape.to_vec());
            array
                .store_array_subset_elements(&subset, values)
                .map_err(RasterIoError::zarr)?;
        }
        Ok(())
    }

    if let Some(values) = &input.values {
        write(&store, VALUES_ARRAY, &shape, DataType::Float32, FillValue::from(f32::NAN), values)?;
    }
    if let Some(lat) = &input.lat {
        write(&store, LATITUDE_ARRAY, &shape, DataType::Float64, FillValue::from(f64::NAN), lat)?;
    }
    if let Some(lon) = &input.lon {
        write(&store, LONGITUDE_ARRAY, &shape, DataType::Float64, FillValue::from(f64::NAN), lon)?;
    }
    Ok(dir)
}

/// A granule directory in any supported layout.
#[derive(Debug, Clone)]
pub enum DirectoryGranule {
    Zarr(ZarrGranuleSource),
    #[cfg(feature = "netcdf")]
    Netcdf(crate::netcdf_source::NetcdfGranuleSource),
}

impl DirectoryGranule {
    /// Pick a loader for `dir`. Directories in no known layout are treated
    /// as Zarr so that loading reports exactly which arrays are missing.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        match Self::open_netcdf(&dir) {
            Some(granule) => granule,
            None => Self::Zarr(ZarrGranuleSource::new(dir)),
        }
    }

    #[cfg(feature = "netcdf")]
    fn open_netcdf(dir: &Path) -> Option<Self> {
        use crate::netcdf_source::NetcdfGranuleSource;
        NetcdfGranuleSource::detect(dir).then(|| Self::Netcdf(NetcdfGranuleSource::new(dir)))
    }

    #[cfg(not(feature = "netcdf"))]
    fn open_netcdf(_dir: &Path) -> Option<Self> {
        None
    }
}

impl GranuleSource for DirectoryGranule {
    fn granule_id(&self) -> &str {
        match self {
            Self::Zarr(source) => source.granule_id(),
            #[cfg(feature = "netcdf")]
            Self::Netcdf(source) => source.granule_id(),
        }
    }

    fn load(&self) -> SwathResult<GranuleInput> {
        match self {
            Self::Zarr(source) => source.load(),
            #[cfg(feature = "netcdf")]
            Self::Netcdf(source) => source.load(),
        }
    }
}

/// Granule directories directly under `root`, sorted by name.
///
/// Hidden directories and directories that are themselves Zarr stores
/// (`*.zarr`) are skipped.
pub fn discover_granules(root: &Path) -> Result<Vec<DirectoryGranule>> {
    if !root.is_dir() {
        return Err(RasterIoError::io(
            root,
            std::io::Error::new(std::io::ErrorKind::NotFound, "input directory not found"),
        ));
    }

    let mut dirs = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') || name.ends_with(".zarr") {
            continue;
        }
        dirs.push(entry.into_path());
    }
    dirs.sort();

    debug!(root = %root.display(), granules = dirs.len(), "Discovered granules");
    Ok(dirs.into_iter().map(DirectoryGranule::open).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_granule_id_from_dir() {
        let source = ZarrGranuleSource::new("/data/EN1_MDSI_MER_RR__2P_20100401T185204");
        assert_eq!(source.granule_id(), "EN1_MDSI_MER_RR__2P_20100401T185204");
    }

    #[test]
    fn test_write_and_load() {
        let root = tempfile::tempdir().unwrap();
        let input = GranuleInput::complete(
            "G_20100401T185204",
            vec![1.0, f32::NAN, 3.0, 4.0],
            vec![40.0, 40.0, 40.1, 40.1],
            vec![-120.0, -119.9, -120.0, -119.9],
            2,
            2,
        );
        let dir = write_zarr_granule(root.path(), &input).unwrap();
        assert!(ZarrGranuleSource::detect(&dir));

        let loaded = ZarrGranuleSource::new(dir).load().unwrap();
        assert_eq!((loaded.rows, loaded.cols), (2, 2));
        assert_eq!(loaded.lat, input.lat);
        assert_eq!(loaded.lon, input.lon);
        let values = loaded.values.unwrap();
        assert_eq!(values[0], 1.0);
        assert!(values[1].is_nan());
    }

    #[test]
    fn test_missing_array_is_none() {
        let root = tempfile::tempdir().unwrap();
        let mut input = GranuleInput::complete("G_20100401T185204", vec![1.0], vec![40.0], vec![-120.0], 1, 1);
        input.lon = None;
        let dir = write_zarr_granule(root.path(), &input).unwrap();

        let loaded = ZarrGranuleSource::new(dir).load().unwrap();
        assert!(loaded.lon.is_none());
        assert_eq!(loaded.missing_arrays(), vec!["longitude"]);
    }

    #[test]
    fn test_discover_sorts_and_skips() {
        let root = tempfile::tempdir().unwrap();
        for name in ["b_20100402T000000", "a_20100401T000000", ".hidden", "stacked_tsm.zarr"] {
            std::fs::create_dir_all(root.path().join(name)).unwrap();
        }
        std::fs::write(root.path().join("notes.txt"), "x").unwrap();

        let found = discover_granules(root.path()).unwrap();
        let ids: Vec<&str> = found.iter().map(|g| g.granule_id()).collect();
        assert_eq!(ids, vec!["a_20100401T000000", "b_20100402T000000"]);
    }

    #[test]
    fn test_discover_missing_root() {
        assert!(discover_granules(Path::new("/definitely/not/here")).is_err());
    }
}
