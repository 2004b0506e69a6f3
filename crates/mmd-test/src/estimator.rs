//! The estimator interface shared by every MMD variant

use crate::types::StatisticVariance;
use mmd_core::{Features, Kernel, Result};
use std::sync::Arc;

/// An MMD estimator producing a normalized statistic and its variance
///
/// Kernel selection drives estimators through this trait alone: it installs
/// each candidate with `set_kernel`, runs `compute_statistic_variance`, and
/// calls `cleanup` before moving to the next candidate.
pub trait MmdEstimator {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Make `kernel` the active kernel
    fn set_kernel(&mut self, kernel: Box<dyn Kernel>) -> Result<()>;

    /// The active kernel
    fn kernel(&self) -> Result<&dyn Kernel>;

    /// One pass over the data: normalized statistic and finalized variance
    fn compute_statistic_variance(&mut self) -> Result<StatisticVariance>;

    /// Scale a raw statistic with the current sample and block sizes
    fn normalize_statistic(&self, statistic: f64) -> Result<f64>;

    /// Scale a raw variance with the current sample and block sizes
    fn normalize_variance(&self, variance: f64) -> Result<f64>;

    /// Up to `max_per_distribution` samples of each distribution, pooled
    fn pooled_samples(&mut self, max_per_distribution: usize) -> Result<Arc<dyn Features>>;

    /// Drop kernel caches and other per-kernel state
    fn cleanup(&mut self);
}
