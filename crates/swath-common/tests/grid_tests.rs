//! Integration tests for grid construction and the shared value types.

use swath_common::bbox::{BboxParseError, BoundingBox};
use swath_common::{CrsCode, GridDefinition, SwathDataset, SwathError};

// ============================================================================
// BoundingBox parsing
// ============================================================================

#[test]
fn test_parse_bbox_rejects_wrong_arity() {
    assert!(matches!(
        BoundingBox::from_bbox_string("-130,30,-110"),
        Err(BboxParseError::InvalidFormat(_))
    ));
}

#[test]
fn test_parse_bbox_rejects_garbage() {
    assert!(matches!(
        BoundingBox::from_bbox_string("-130,thirty,-110,50"),
        Err(BboxParseError::InvalidNumber(_))
    ));
}

#[test]
fn test_bbox_serde_roundtrip() {
    let bbox = BoundingBox::new(-130.0, 30.0, -110.0, 50.0);
    let json = serde_json::to_string(&bbox).unwrap();
    let back: BoundingBox = serde_json::from_str(&json).unwrap();
    assert_eq!(bbox, back);
}

// ============================================================================
// GridDefinition
// ============================================================================

#[test]
fn test_grid_axes_ascending_with_fixed_step() {
    let grid = GridDefinition::build(BoundingBox::new(-130.0, 30.0, -110.0, 50.0), 0.1).unwrap();

    for w in grid.lats().windows(2) {
        assert!(w[1] > w[0]);
    }
    for (i, lon) in grid.lons().iter().enumerate() {
        assert_eq!(*lon, -130.0 + i as f64 * 0.1);
    }
    assert_eq!(grid.len(), grid.width() * grid.height());
}

#[test]
fn test_grid_excludes_upper_bound() {
    // 30 + 4 * 0.5 = 32 must not appear.
    let grid = GridDefinition::build(BoundingBox::new(0.0, 30.0, 1.0, 32.0), 0.5).unwrap();
    assert_eq!(grid.lats(), &[30.0, 30.5, 31.0, 31.5]);
    assert_eq!(grid.lons(), &[0.0, 0.5]);
}

#[test]
fn test_grid_resolution_larger_than_extent() {
    let grid = GridDefinition::build(BoundingBox::new(0.0, 0.0, 1.0, 1.0), 5.0).unwrap();
    assert_eq!(grid.shape(), (1, 1));
    assert_eq!(grid.cell_center(0, 0), Some((0.0, 0.0)));
    assert_eq!(grid.cell_center(1, 0), None);
}

#[test]
fn test_grid_is_always_geographic() {
    let grid = GridDefinition::build(BoundingBox::new(0.0, 0.0, 1.0, 1.0), 0.25).unwrap();
    assert_eq!(grid.crs(), CrsCode::Epsg4326);
}

#[test]
fn test_grid_rejects_degenerate_box() {
    let err = GridDefinition::build(BoundingBox::new(5.0, 5.0, 5.0, 6.0), 0.1).unwrap_err();
    assert!(matches!(err, SwathError::InvalidBounds(_)));
    assert!(!err.is_per_item());
}

#[test]
fn test_nearest_cell_scenario_point() {
    let grid = GridDefinition::build(BoundingBox::new(-130.0, 30.0, -110.0, 50.0), 0.0027).unwrap();
    let (row, col) = grid.nearest_cell(-120.0, 40.0).unwrap();
    let (lon, lat) = grid.cell_center(row, col).unwrap();
    assert!((lon - (-120.0)).abs() <= 0.0027 / 2.0);
    assert!((lat - 40.0).abs() <= 0.0027 / 2.0);
}

// ============================================================================
// SwathDataset
// ============================================================================

#[test]
fn test_swath_error_gets_granule_id() {
    let err = SwathDataset::new(vec![1.0], vec![1.0, 2.0], vec![1.0], 1, 1)
        .unwrap_err()
        .for_granule("EN1_20100401T185204");
    match err {
        SwathError::InvalidSwath { granule_id, .. } => {
            assert_eq!(granule_id, "EN1_20100401T185204")
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_crs_serializes_as_code() {
    let json = serde_json::to_string(&CrsCode::Epsg3857).unwrap();
    assert_eq!(json, r#""EPSG:3857""#);
    let back: CrsCode = serde_json::from_str(r#""CRS:84""#).unwrap();
    assert_eq!(back, CrsCode::Epsg4326);
    assert!(serde_json::from_str::<CrsCode>(r#""EPSG:32633""#).is_err());
}
