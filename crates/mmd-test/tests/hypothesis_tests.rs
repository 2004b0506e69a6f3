//! Test driver behaviour: clamping, p-values and thresholds

mod common;

use common::ScriptedEstimator;
use mmd_core::{Error, GaussianKernel};
use mmd_test::{
    finalize_variance, gaussian_p_value, Diagnostics, MmdEstimator, NullApproximation,
    TwoSampleTest,
};
use proptest::prelude::*;

fn scripted(script: fn(f64) -> (f64, f64)) -> ScriptedEstimator {
    let mut estimator = ScriptedEstimator::new(script);
    estimator
        .set_kernel(Box::new(GaussianKernel::new(1.0).unwrap()))
        .unwrap();
    estimator
}

proptest! {
    #[test]
    fn prop_finalized_variance_is_non_negative(raw in -1e6f64..1e6) {
        let v = finalize_variance(raw).unwrap();
        prop_assert!(v.value >= 0.0);
        prop_assert_eq!(v.diagnostics.contains(Diagnostics::VARIANCE_CLAMPED), raw < 0.0);
        prop_assert!(gaussian_p_value(1.0, v.value).is_ok());
    }
}

#[test]
fn test_negative_variance_is_clamped_in_test() {
    let mut estimator = scripted(|_| (0.3, -0.01));
    let result = estimator.perform_test(0.05).unwrap();
    assert_eq!(result.variance, 0.0);
    assert!(result.diagnostics.contains(Diagnostics::VARIANCE_CLAMPED));
    assert!(result.diagnostics.is_unstable());
    // zero spread: any positive statistic is significant
    assert_eq!(result.p_value, 0.0);
    assert_eq!(result.threshold, 0.0);
    assert!(result.reject);
}

#[test]
fn test_gaussian_test_values() {
    let mut estimator = scripted(|_| (1.959963984540054, 1.0));
    let result = estimator.perform_test(0.05).unwrap();
    assert!((result.p_value - 0.025).abs() < 1e-9);
    assert!((result.threshold - 1.6448536269514722).abs() < 1e-7);
    assert!(result.reject);
    assert_eq!(result.null_approximation, NullApproximation::Mmd1Gaussian);
}

#[test]
fn test_permutation_fallback() {
    let mut estimator = scripted(|_| (0.35, 1.0));
    estimator.method = NullApproximation::Permutation;
    estimator.null = vec![0.4, 0.1, 0.3, 0.2, 0.5];

    let result = estimator.perform_test(0.2).unwrap();
    assert!((result.p_value - 0.4).abs() < 1e-12);
    // floor(5 * 0.8) = 4
    assert_eq!(result.threshold, 0.5);
    assert!(!result.reject);

    estimator.cleanup();
    assert!((estimator.compute_p_value(0.05).unwrap() - 1.0).abs() < 1e-12);
    assert_eq!(estimator.compute_threshold(0.5).unwrap(), 0.3);
}

#[test]
fn test_alpha_outside_unit_interval() {
    let mut estimator = scripted(|_| (1.0, 1.0));
    for alpha in [0.0, 1.0, -0.1, 2.0, f64::NAN] {
        assert!(matches!(
            estimator.compute_threshold(alpha),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            estimator.perform_test(alpha),
            Err(Error::InvalidArgument(_))
        ));
    }
}
