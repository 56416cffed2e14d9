//! Per-cell weighting kernels.

use super::index::SampleIndex;

/// Resolved weighting kernel. Unlike the config enum, parameters are
/// guaranteed present and positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kernel {
    Nearest,
    Gaussian { sigma_m: f64 },
}

impl Kernel {
    /// Value for one cell centre, or `None` when no sample is in range.
    pub fn evaluate(&self, index: &SampleIndex, point: [f64; 3], radius_2: f64) -> Option<f32> {
        match *self {
            Kernel::Nearest => index.nearest_within(point, radius_2).map(|(v, _)| v),
            Kernel::Gaussian { sigma_m } => {
                let denom = 2.0 * sigma_m * sigma_m;
                let (weighted, total) = index.within(point, radius_2).fold(
                    (0.0_f64, 0.0_f64),
                    |(weighted, total), (value, d2)| {
                        let w = gaussian_weight(d2, denom);
                        (weighted + w * value as f64, total + w)
                    },
                );
                (total > 0.0).then(|| (weighted / total) as f32)
            }
        }
    }
}

/// `exp(-d² / 2σ²)` with `denom = 2σ²`.
#[inline]
pub fn gaussian_weight(d2: f64, denom: f64) -> f64 {
    (-d2 / denom).exp()
}

#[cfg(test)]
mod tests {
    use super::super::index::to_ecef;
    use super::*;
    use swath_common::SwathDataset;

    fn two_point_index() -> SampleIndex {
        SampleIndex::build(
            &SwathDataset::new(
                vec![1.0, 3.0],
                vec![40.0, 40.0],
                vec![-120.01, -119.99],
                1,
                2,
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_gaussian_weight() {
        assert_eq!(gaussian_weight(0.0, 2.0), 1.0);
        let sigma: f64 = 1500.0;
        let w = gaussian_weight(sigma * sigma, 2.0 * sigma * sigma);
        assert!((w - (-0.5_f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_gaussian_symmetric_mean() {
        // Equidistant samples get equal weight.
        let index = two_point_index();
        let v = Kernel::Gaussian { sigma_m: 1500.0 }
            .evaluate(&index, to_ecef(-120.0, 40.0), 3000.0 * 3000.0)
            .unwrap();
        assert!((v - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_gaussian_favours_closer_sample() {
        let index = two_point_index();
        let v = Kernel::Gaussian { sigma_m: 500.0 }
            .evaluate(&index, to_ecef(-120.005, 40.0), 3000.0 * 3000.0)
            .unwrap();
        assert!(v < 2.0);
        assert!(v >= 1.0);
    }

    #[test]
    fn test_out_of_range_is_none() {
        let index = two_point_index();
        let far = to_ecef(-100.0, 10.0);
        assert!(Kernel::Nearest.evaluate(&index, far, 5000.0 * 5000.0).is_none());
        assert!(Kernel::Gaussian { sigma_m: 1500.0 }
            .evaluate(&index, far, 5000.0 * 5000.0)
            .is_none());
    }
}
