//! Clip polygons from disk.
//!
//! ESRI Shapefiles (`.shp`) are read with the `shapefile` crate and take
//! their CRS from the sibling `.prj`. Any other file is read as text and
//! sniffed as GeoJSON or WKT.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use shapefile::{PolygonRing, Shape, ShapeReader};
use swath_common::{CrsCode, SwathError};
use swath_processor::clip::{Polygon, Ring};
use swath_processor::ClipPolygon;
use tracing::{debug, warn};

use crate::error::{RasterIoError, Result};

/// Load a clip polygon from a Shapefile, GeoJSON or WKT file.
///
/// `default_crs` applies when the file does not name its CRS: a Shapefile
/// without `.prj`, or GeoJSON without a `crs` member. WKT never names one.
pub fn read_clip_polygon(path: &Path, default_crs: CrsCode) -> Result<ClipPolygon> {
    let is_shapefile = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("shp"));

    let polygon = if is_shapefile {
        read_shapefile(path, default_crs)?
    } else {
        let text = fs::read_to_string(path).map_err(|e| RasterIoError::io(path, e))?;
        ClipPolygon::parse(&text, default_crs)?
    };

    debug!(
        path = %path.display(),
        polygons = polygon.polygons().len(),
        crs = %polygon.crs(),
        "Loaded clip polygon"
    );
    Ok(polygon)
}

fn read_shapefile(path: &Path, default_crs: CrsCode) -> Result<ClipPolygon> {
    let prj = path.with_extension("prj");
    let crs = match fs::read_to_string(&prj) {
        Ok(wkt) => crs_from_prj(&wkt)?,
        Err(e) if e.kind() == ErrorKind::NotFound => default_crs,
        Err(e) => return Err(RasterIoError::io(&prj, e)),
    };

    let mut reader = ShapeReader::from_path(path).map_err(|e| RasterIoError::vector(path, e))?;
    let mut polygons = Vec::new();
    let mut skipped = 0usize;
    for shape in reader.iter_shapes() {
        match shape.map_err(|e| RasterIoError::vector(path, e))? {
            Shape::Polygon(p) => collect_rings(p.rings(), |pt| (pt.x, pt.y), &mut polygons),
            Shape::PolygonM(p) => collect_rings(p.rings(), |pt| (pt.x, pt.y), &mut polygons),
            Shape::PolygonZ(p) => collect_rings(p.rings(), |pt| (pt.x, pt.y), &mut polygons),
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(path = %path.display(), skipped, "Ignoring non-polygon shapes");
    }

    Ok(ClipPolygon::new(polygons, crs)?)
}

/// Outer rings start a polygon; inner rings become holes of the last one.
fn collect_rings<P>(rings: &[PolygonRing<P>], xy: impl Fn(&P) -> (f64, f64), polygons: &mut Vec<Polygon>) {
    for ring in rings {
        let points: Ring = ring.points().iter().map(&xy).collect();
        match ring {
            PolygonRing::Outer(_) => polygons.push(vec![points]),
            PolygonRing::Inner(_) => {
                if let Some(polygon) = polygons.last_mut() {
                    polygon.push(points);
                } else {
                    warn!("Inner ring before any outer ring, treating it as a shell");
                    polygons.push(vec![points]);
                }
            }
        }
    }
}

/// CRS of an ESRI `.prj` (OGC WKT1).
///
/// A trailing `AUTHORITY["EPSG","nnnn"]` wins; ESRI files usually lack one,
/// so datum and projection names are matched next.
pub fn crs_from_prj(wkt: &str) -> Result<CrsCode> {
    let upper = wkt.trim().to_uppercase();

    if let Some(code) = outer_epsg_authority(&upper) {
        return Ok(CrsCode::parse(&format!("EPSG:{}", code))?);
    }

    let crs = if upper.starts_with("PROJCS") {
        ["WEB_MERCATOR", "PSEUDO-MERCATOR", "MERCATOR_AUXILIARY_SPHERE"]
            .iter()
            .any(|name| upper.contains(name))
            .then_some(CrsCode::Epsg3857)
    } else if upper.contains("NORTH_AMERICAN_1983") || upper.contains("NAD83") {
        Some(CrsCode::Epsg4269)
    } else if upper.contains("WGS_1984") || upper.contains("WGS 84") || upper.contains("WGS84") {
        Some(CrsCode::Epsg4326)
    } else {
        None
    };

    crs.ok_or_else(|| {
        let name: String = wkt.trim().chars().take(80).collect();
        SwathError::UnsupportedCrs(name).into()
    })
}

/// EPSG code of the last `AUTHORITY` clause, if it closes the outermost
/// node.
fn outer_epsg_authority(upper: &str) -> Option<String> {
    let start = upper.rfind("AUTHORITY[")?;
    let tail = &upper[start..];
    let close = tail.find(']')?;
    let rest = tail[close + 1..].trim();
    if rest != "]" {
        return None;
    }
    let mut fields = tail["AUTHORITY[".len()..close]
        .split(',')
        .map(|f| f.trim().trim_matches('"'));
    match (fields.next(), fields.next()) {
        (Some("EPSG"), Some(code)) => Some(code.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shapefile::{Point, PointZ, ShapeWriter};
    use test_utils::{fixtures::polygons, temp_test_dir};

    const WGS84_PRJ: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;
    const NAD83_PRJ: &str = r#"GEOGCS["GCS_North_American_1983",DATUM["D_North_American_1983",SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;
    const WEB_MERCATOR_PRJ: &str = r#"PROJCS["WGS_1984_Web_Mercator_Auxiliary_Sphere",GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Mercator_Auxiliary_Sphere"],UNIT["Meter",1.0]]"#;
    const UTM_PRJ: &str = r#"PROJCS["WGS_1984_UTM_Zone_10N",GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Transverse_Mercator"],UNIT["Meter",1.0]]"#;

    fn xy(points: &[(f64, f64)]) -> Vec<Point> {
        points.iter().map(|&(x, y)| Point::new(x, y)).collect()
    }

    /// Square around (-120, 40) with a hole, plus a separate square to the
    /// west. Outer rings clockwise, inner counter-clockwise.
    fn write_squares(path: &Path) {
        let with_hole = shapefile::Polygon::with_rings(vec![
            PolygonRing::Outer(xy(&[(-121.0, 39.0), (-121.0, 41.0), (-119.0, 41.0), (-119.0, 39.0), (-121.0, 39.0)])),
            PolygonRing::Inner(xy(&[(-120.2, 39.8), (-119.8, 39.8), (-119.8, 40.2), (-120.2, 40.2), (-120.2, 39.8)])),
        ]);
        let west = shapefile::Polygon::new(PolygonRing::Outer(xy(&[
            (-125.0, 39.0),
            (-125.0, 40.0),
            (-124.0, 40.0),
            (-124.0, 39.0),
            (-125.0, 39.0),
        ])));
        let mut writer = ShapeWriter::from_path(path).unwrap();
        writer.write_shape(&with_hole).unwrap();
        writer.write_shape(&west).unwrap();
    }

    #[test]
    fn test_shapefile_with_prj() {
        let dir = temp_test_dir();
        let path = dir.path().join("roi.shp");
        write_squares(&path);
        fs::write(dir.path().join("roi.prj"), WGS84_PRJ).unwrap();

        let roi = read_clip_polygon(&path, CrsCode::Epsg3857).unwrap();
        assert_eq!(roi.crs(), CrsCode::Epsg4326);
        assert_eq!(roi.polygons().len(), 2);
        assert_eq!(roi.polygons()[0].len(), 2);
        assert!(roi.contains(-120.5, 40.5));
        assert!(!roi.contains(-120.0, 40.0));
        assert!(roi.contains(-124.5, 39.5));
        assert!(!roi.contains(-122.5, 40.0));
    }

    #[test]
    fn test_shapefile_without_prj_uses_default() {
        let dir = temp_test_dir();
        let path = dir.path().join("roi.shp");
        write_squares(&path);

        let roi = read_clip_polygon(&path, CrsCode::Epsg4269).unwrap();
        assert_eq!(roi.crs(), CrsCode::Epsg4269);
    }

    #[test]
    fn test_shapefile_polygon_z() {
        let dir = temp_test_dir();
        let path = dir.path().join("roi_z.shp");
        let ring: Vec<PointZ> = [(-121.0, 39.0), (-121.0, 41.0), (-119.0, 41.0), (-119.0, 39.0), (-121.0, 39.0)]
            .iter()
            .map(|&(x, y)| PointZ::new(x, y, 12.0, shapefile::NO_DATA))
            .collect();
        {
            let mut writer = ShapeWriter::from_path(&path).unwrap();
            writer
                .write_shape(&shapefile::PolygonZ::new(PolygonRing::Outer(ring)))
                .unwrap();
        }
        fs::write(dir.path().join("roi_z.prj"), NAD83_PRJ).unwrap();

        let roi = read_clip_polygon(&path, CrsCode::Epsg4326).unwrap();
        assert_eq!(roi.crs(), CrsCode::Epsg4269);
        assert_eq!(roi.bounds().unwrap().to_array(), [-121.0, 39.0, -119.0, 41.0]);
    }

    #[test]
    fn test_text_formats() {
        let dir = temp_test_dir();
        let geojson = dir.path().join("roi.geojson");
        fs::write(&geojson, polygons::TRIANGLE_GEOJSON).unwrap();
        let roi = read_clip_polygon(&geojson, CrsCode::Epsg4326).unwrap();
        assert!(roi.contains(-120.0, 40.0));

        let wkt = dir.path().join("roi.wkt");
        fs::write(&wkt, polygons::SQUARE_WITH_HOLE_WKT).unwrap();
        let roi = read_clip_polygon(&wkt, CrsCode::Epsg3857).unwrap();
        assert_eq!(roi.crs(), CrsCode::Epsg3857);
        assert!(!roi.contains(-120.0, 40.0));

        assert!(matches!(
            read_clip_polygon(&dir.path().join("absent.geojson"), CrsCode::Epsg4326),
            Err(RasterIoError::Io { .. })
        ));
    }

    #[test]
    fn test_crs_from_prj() {
        assert_eq!(crs_from_prj(WGS84_PRJ).unwrap(), CrsCode::Epsg4326);
        assert_eq!(crs_from_prj(NAD83_PRJ).unwrap(), CrsCode::Epsg4269);
        assert_eq!(crs_from_prj(WEB_MERCATOR_PRJ).unwrap(), CrsCode::Epsg3857);
        assert_eq!(crs_from_prj(CrsCode::Epsg3857.wkt()).unwrap(), CrsCode::Epsg3857);
        assert_eq!(crs_from_prj(CrsCode::Epsg4269.wkt()).unwrap(), CrsCode::Epsg4269);
        assert!(matches!(
            crs_from_prj(UTM_PRJ),
            Err(RasterIoError::Swath(SwathError::UnsupportedCrs(_)))
        ));
        assert!(crs_from_prj("LOCAL_CS[\"arbitrary\"]").is_err());
    }
}
