//! Shared test utilities for the TSM stacking workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Synthetic swath generators
//! - Scenario fixtures (granule ids, timestamps, clip polygons)
//! - Scratch output directories and raster assertion macros
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! ```ignore
//! use test_utils::{fixtures::scenario, single_sample_swath};
//! ```

pub mod fixtures;
pub mod generators;
pub mod paths;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;
pub use paths::*;

/// Approximate floating-point equality.
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(2.5_f32, 2.5000001_f32, 1e-5);
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if !(diff <= epsilon) {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Assert that every value is fill except the listed flat indices.
///
/// ```ignore
/// use test_utils::assert_only_filled;
///
/// assert_only_filled!(&values, f32::NAN, [42]);
/// ```
#[macro_export]
macro_rules! assert_only_filled {
    ($values:expr, $fill:expr, [$($idx:expr),* $(,)?]) => {{
        let keep: Vec<usize> = vec![$($idx),*];
        let fill: f32 = $fill;
        for (i, v) in $values.iter().enumerate() {
            let is_fill = v.is_nan() || *v == fill;
            if keep.contains(&i) {
                assert!(!is_fill, "cell {} should hold data, found fill", i);
            } else {
                assert!(is_fill, "cell {} should be fill, found {}", i, v);
            }
        }
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_assert_approx_eq_passes() {
        assert_approx_eq!(1.0001, 1.0, 0.001);
        assert_approx_eq!(-5.5, -5.500001, 0.0001);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn test_assert_approx_eq_fails() {
        assert_approx_eq!(1.1, 1.0, 0.001);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn test_assert_approx_eq_rejects_nan() {
        assert_approx_eq!(f64::NAN, 1.0, 0.001);
    }

    #[test]
    fn test_assert_only_filled() {
        let values = [f32::NAN, 2.5, f32::NAN];
        assert_only_filled!(&values, f32::NAN, [1]);
    }
}
