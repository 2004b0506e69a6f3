//! Kernel two-sample testing with maximum mean discrepancy statistics
//!
//! This crate re-exports the workspace crates:
//!
//! - [`mmd_core`]: errors, features, kernels, the kernel manager and execution engines
//! - [`mmd_data`]: blocks, data sources and the streaming data manager
//! - [`mmd_test`]: MMD estimators, kernel selection and the test driver
//!
//! # Example
//!
//! ```rust
//! use mmd_stats::prelude::*;
//!
//! let p: Vec<[f64; 2]> = (0..32).map(|i| [f64::from(i).sin(), f64::from(i).cos()]).collect();
//! let q: Vec<[f64; 2]> = p.iter().map(|x| [x[0] + 2.0, x[1] + 2.0]).collect();
//! let p = DenseFeatures::from_vectors(&p).unwrap().into_shared();
//! let q = DenseFeatures::from_vectors(&q).unwrap().into_shared();
//!
//! let mut kernels = KernelManager::new();
//! for width in [0.5, 2.0, 8.0] {
//!     kernels.push_kernel(Box::new(GaussianKernel::new(width).unwrap()));
//! }
//!
//! let mut test = BTestMmd::new(p, q)
//!     .unwrap()
//!     .with_blocksize(16)
//!     .with_null_approximation(NullApproximation::Mmd1Gaussian);
//!
//! // pick the kernel on the first half of each sample, test on the second half
//! test.set_train_test_mode(true).unwrap();
//! let selected = MaxTestPower::new().select_kernel(&kernels, &mut test).unwrap();
//! test.set_train_mode(false).unwrap();
//! test.set_kernel(selected.kernel.box_clone()).unwrap();
//!
//! let result = test.perform_test(0.05).unwrap();
//! assert!(result.statistic > 0.0);
//! ```

pub use mmd_core;
pub use mmd_data;
pub use mmd_test;

pub use mmd_core::{Error, Result};

pub mod prelude {
    pub use mmd_core::{
        DenseFeatures, Error, Features, GaussianKernel, Kernel, KernelManager, LinearKernel,
        PrecomputedKernel, Result,
    };
    pub use mmd_data::{
        CsvSource, DataManager, DataSource, InMemorySource, MeanShiftGenerator, SampleSplit,
        TrainTestSplit,
    };
    pub use mmd_test::{
        BTestMmd, Diagnostics, KernelSelection, LinearTimeMmd, MaxMmd, MaxTestPower,
        MedianHeuristic, MmdEstimator, NullApproximation, QuadraticTimeMmd, StatisticType,
        TestConfig, TestResult, TwoSampleTest, VarianceEstimation,
    };
}
