//! Kernel two-sample tests based on the maximum mean discrepancy
//!
//! Three estimators share the [`MmdEstimator`] interface:
//!
//! - [`BTestMmd`] averages block statistics over a stream of blocks of a
//!   chosen size
//! - [`LinearTimeMmd`] does the same with the smallest admissible blocks
//! - [`QuadraticTimeMmd`] uses every pair of samples at once
//!
//! [`TwoSampleTest`] turns an estimator into a test with p-values and
//! thresholds. [`KernelSelection`] strategies pick a kernel from the
//! candidates in a [`mmd_core::KernelManager`] before testing.
//!
//! # Example
//!
//! ```rust
//! use mmd_core::{DenseFeatures, GaussianKernel};
//! use mmd_test::{BTestMmd, NullApproximation, TwoSampleTest};
//!
//! let p: Vec<[f64; 1]> = (0..16).map(|i| [f64::from(i) / 16.0]).collect();
//! let q: Vec<[f64; 1]> = (0..16).map(|i| [f64::from(i) / 16.0 + 3.0]).collect();
//! let p = DenseFeatures::from_vectors(&p).unwrap().into_shared();
//! let q = DenseFeatures::from_vectors(&q).unwrap().into_shared();
//!
//! let mut test = BTestMmd::new(p, q)
//!     .unwrap()
//!     .with_blocksize(8)
//!     .with_null_approximation(NullApproximation::Mmd1Gaussian)
//!     .with_kernel(Box::new(GaussianKernel::new(1.0).unwrap()))
//!     .unwrap();
//! let result = test.perform_test(0.05).unwrap();
//! assert!(result.statistic > 0.0);
//! ```

pub mod config;
pub mod estimator;
pub mod hypothesis;
pub mod normalization;
pub mod permutation;
pub mod quadratic;
pub mod selection;
pub mod statistic;
pub mod streaming;
pub mod types;

pub use config::TestConfig;
pub use estimator::MmdEstimator;
pub use hypothesis::{
    finalize_variance, gaussian_p_value, gaussian_threshold, FinalizedVariance, TwoSampleTest,
};
pub use normalization::BlockLayout;
pub use quadratic::QuadraticTimeMmd;
pub use selection::{
    KernelSelection, MaxMmd, MaxTestPower, MedianHeuristic, SelectedKernel, SelectionDirection,
};
pub use statistic::ComputeMmd;
pub use streaming::{BTest, BTestMmd, BlockScheme, LinearTime, LinearTimeMmd, StreamingMmd};
pub use types::{
    Diagnostics, NullApproximation, StatisticType, StatisticVariance, TestResult,
    VarianceEstimation,
};
