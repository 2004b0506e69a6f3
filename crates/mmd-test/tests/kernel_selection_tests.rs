//! Kernel selection against scripted and real estimators

mod common;

use common::{normal_features, ScriptedEstimator};
use mmd_core::{Error, GaussianKernel, KernelManager, LinearKernel};
use mmd_test::{BTestMmd, KernelSelection, MaxMmd, MaxTestPower, MedianHeuristic};

fn candidates(widths: &[f64]) -> KernelManager {
    let mut kernels = KernelManager::new();
    for &w in widths {
        kernels.push_kernel(Box::new(GaussianKernel::new(w).unwrap()));
    }
    kernels
}

#[test]
fn test_max_test_power_picks_argmax() {
    // power = w / sqrt(1 + ridge) peaks at the unique width 4
    let kernels = candidates(&[1.0, 2.0, 4.0, 3.0]);
    let mut estimator = ScriptedEstimator::new(|w| (w, 1.0));
    let mut selection = MaxTestPower::new();

    let selected = selection.select_kernel(&kernels, &mut estimator).unwrap();
    assert_eq!(selected.index, 2);
    assert_eq!(selected.kernel.width(), Some(4.0));
    assert_eq!(estimator.cleanups, 4);
    assert_eq!(selection.measures().len(), 4);
}

#[test]
fn test_max_test_power_penalizes_variance() {
    // statistic grows with width but variance grows faster past 2
    let kernels = candidates(&[1.0, 2.0, 8.0]);
    let mut estimator = ScriptedEstimator::new(|w| (w, if w > 2.0 { w.powi(4) } else { 1.0 }));
    let selected = MaxTestPower::new()
        .select_kernel(&kernels, &mut estimator)
        .unwrap();
    assert_eq!(selected.index, 1);
}

#[test]
fn test_ties_go_left() {
    let kernels = candidates(&[1.0, 2.0, 3.0]);
    let mut estimator = ScriptedEstimator::new(|_| (1.0, 1.0));
    let selected = MaxTestPower::new()
        .select_kernel(&kernels, &mut estimator)
        .unwrap();
    assert_eq!(selected.index, 0);
}

#[test]
fn test_zero_ridge_and_zero_variance_is_domain_error() {
    let kernels = candidates(&[1.0]);
    let mut estimator = ScriptedEstimator::new(|_| (1.0, 0.0));
    let mut selection = MaxTestPower::new().with_ridge(0.0).unwrap();
    assert!(matches!(
        selection.compute_measures(&kernels, &mut estimator),
        Err(Error::Domain(_))
    ));
    // the failed candidate was still cleaned up
    assert_eq!(estimator.cleanups, 1);
}

#[test]
fn test_empty_candidates() {
    let kernels = KernelManager::new();
    let mut estimator = ScriptedEstimator::new(|w| (w, 1.0));
    assert!(matches!(
        MaxTestPower::new().select_kernel(&kernels, &mut estimator),
        Err(Error::Precondition(_))
    ));
    assert!(matches!(
        MedianHeuristic::new().select_kernel(&kernels, &mut estimator),
        Err(Error::Precondition(_))
    ));
}

#[test]
fn test_max_mmd() {
    let kernels = candidates(&[5.0, 1.0, 3.0]);
    let mut estimator = ScriptedEstimator::new(|w| (-(w - 3.0).abs(), 1.0));
    let selected = MaxMmd::new().select_kernel(&kernels, &mut estimator).unwrap();
    assert_eq!(selected.index, 2);
    assert_eq!(selected.measure, 0.0);
}

#[test]
fn test_median_heuristic_scripted() {
    // pooled samples 0..4 have median squared distance 2.5
    let kernels = candidates(&[0.5, 2.0, 3.5, 10.0]);
    let mut estimator = ScriptedEstimator::new(|w| (w, 1.0));
    let mut selection = MedianHeuristic::new();
    let selected = selection.select_kernel(&kernels, &mut estimator).unwrap();
    assert_eq!(selected.index, 1);
    assert_eq!(selection.median(), Some(2.5));
}

#[test]
fn test_median_heuristic_needs_width() {
    let mut kernels = KernelManager::new();
    kernels.push_kernel(Box::new(LinearKernel::new()));
    let mut estimator = ScriptedEstimator::new(|w| (w, 1.0));
    assert!(matches!(
        MedianHeuristic::new().select_kernel(&kernels, &mut estimator),
        Err(Error::Precondition(_))
    ));
}

#[test]
fn test_selection_on_btest() {
    // 2-d standard normals against a copy shifted by 1; a tiny width sees
    // almost nothing but the diagonal, a huge one is nearly constant
    let p = normal_features(200, 2, 0.0, 1);
    let q = normal_features(200, 2, 1.0, 2);
    let kernels = candidates(&[1e-4, 4.0, 1e6]);
    let mut estimator = BTestMmd::new(p, q).unwrap().with_blocksize(40);

    let selected = MaxTestPower::new()
        .select_kernel(&kernels, &mut estimator)
        .unwrap();
    assert_eq!(selected.index, 1);
    assert!(selected.measure > 0.0);
    assert!(!estimator.kernel_manager().is_precomputed_at(0).unwrap());
}
