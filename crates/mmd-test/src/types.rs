//! Common types for MMD estimators and tests

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which MMD² estimator a block statistic uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticType {
    /// Within-sample means exclude the diagonal, cross mean is over all pairs
    #[default]
    UnbiasedFull,
    /// Like `UnbiasedFull`, but the cross mean also excludes `i == j`; needs equal sizes
    UnbiasedIncomplete,
    /// Every mean includes the diagonal (V-statistic)
    BiasedFull,
}

/// How the variance of the statistic is estimated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarianceEstimation {
    /// Variance of the statistic itself, from the spread of independent block
    /// statistics (or a first-order U-statistic estimate for a single block)
    #[default]
    Direct,
    /// Variance under the null, from statistics of permuted samples
    Permutation,
}

/// How the null distribution of the statistic is approximated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullApproximation {
    /// Permutation resampling of the pooled samples
    #[default]
    Permutation,
    /// Zero-mean Gaussian with the estimated variance
    Mmd1Gaussian,
}

impl fmt::Display for NullApproximation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permutation => write!(f, "permutation"),
            Self::Mmd1Gaussian => write!(f, "mmd1-gaussian"),
        }
    }
}

bitflags! {
    /// Non-fatal numerical conditions observed while estimating
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Diagnostics: u32 {
        /// A negative variance estimate was clamped to zero
        const VARIANCE_CLAMPED = 1 << 0;
        /// The variance estimate is zero or negligibly small
        const VARIANCE_NEAR_ZERO = 1 << 1;
        /// Only one block was available, so no spread could be measured
        const SINGLE_BLOCK = 1 << 2;
    }
}

impl Diagnostics {
    /// Whether any numerical instability was flagged
    pub fn is_unstable(&self) -> bool {
        !self.is_empty()
    }
}

/// Normalized statistic and variance from one estimation pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatisticVariance {
    pub statistic: f64,
    /// Never negative; see `diagnostics` for clamping
    pub variance: f64,
    /// Number of blocks aggregated
    pub num_blocks: usize,
    pub diagnostics: Diagnostics,
}

/// Outcome of a two-sample test at a given significance level
#[derive(Debug, Clone, PartialEq)]
pub struct TestResult {
    pub statistic: f64,
    pub variance: f64,
    pub p_value: f64,
    pub threshold: f64,
    pub alpha: f64,
    /// Whether the null hypothesis `p == q` is rejected
    pub reject: bool,
    pub null_approximation: NullApproximation,
    pub diagnostics: Diagnostics,
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "statistic={:.6} p={:.4} threshold={:.6} ({}, alpha={}) -> {}",
            self.statistic,
            self.p_value,
            self.threshold,
            self.null_approximation,
            self.alpha,
            if self.reject { "reject" } else { "accept" }
        )?;
        if self.diagnostics.is_unstable() {
            write!(f, " [{:?}]", self.diagnostics)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(StatisticType::default(), StatisticType::UnbiasedFull);
        assert_eq!(VarianceEstimation::default(), VarianceEstimation::Direct);
        assert_eq!(NullApproximation::default(), NullApproximation::Permutation);
        assert!(!Diagnostics::default().is_unstable());
    }

    #[test]
    fn test_diagnostics_flags() {
        let mut d = Diagnostics::empty();
        d |= Diagnostics::VARIANCE_CLAMPED;
        assert!(d.is_unstable());
        assert!(d.contains(Diagnostics::VARIANCE_CLAMPED));
        assert!(!d.contains(Diagnostics::SINGLE_BLOCK));
    }

    #[test]
    fn test_result_display() {
        let r = TestResult {
            statistic: 1.5,
            variance: 0.25,
            p_value: 0.001,
            threshold: 0.8,
            alpha: 0.05,
            reject: true,
            null_approximation: NullApproximation::Mmd1Gaussian,
            diagnostics: Diagnostics::empty(),
        };
        let s = r.to_string();
        assert!(s.contains("reject"));
        assert!(s.contains("mmd1-gaussian"));
    }
}
