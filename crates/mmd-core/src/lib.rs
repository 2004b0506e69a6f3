//! Core types for kernel two-sample testing
//!
//! This crate provides the pieces every MMD test is built from:
//!
//! - [`Error`] and [`Result`], shared by all mmd-stats crates
//! - [`Features`] collections of fixed-dimension sample vectors
//! - [`Kernel`] implementations and Gram-matrix evaluation
//! - [`KernelManager`], which owns kernels and caches their Gram matrices
//! - execution engines that run independent work sequentially or on rayon
//!
//! # Example
//!
//! ```rust
//! use mmd_core::{DenseFeatures, GaussianKernel, Kernel, KernelManager};
//!
//! let data = DenseFeatures::from_vectors(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]])
//!     .unwrap()
//!     .into_shared();
//! let mut kernel = GaussianKernel::new(2.0).unwrap();
//! kernel.init(data.clone(), data).unwrap();
//!
//! let mut kernels = KernelManager::new();
//! let slot = kernels.push_kernel(Box::new(kernel));
//! let direct = kernels.kernel_at(slot).unwrap().compute(0, 1).unwrap();
//!
//! kernels.precompute_kernel_at(slot).unwrap();
//! let cached = kernels.kernel_at(slot).unwrap().compute(0, 1).unwrap();
//! assert_eq!(direct, cached);
//! ```

pub mod error;
pub mod execution;
pub mod features;
pub mod kernel;
pub mod kernel_manager;
pub mod math;

// Re-export core types
pub use error::{Error, Result};

pub use execution::{auto_engine, sequential, AutoEngine, ExecutionEngine, ExecutionStrategy, SequentialEngine};
#[cfg(feature = "parallel")]
pub use execution::{parallel, ParallelEngine};

pub use features::{DenseFeatures, Features};
pub use kernel::{
    kernel_matrix, FeatureKernel, Gaussian, GaussianKernel, Kernel, KernelFunction, Linear,
    LinearKernel, PrecomputedKernel,
};
pub use kernel_manager::{KernelManager, KernelSlotMut};
pub use math::RunningMoments;
