//! Hypothesis testing on top of an MMD estimator
//!
//! A test runs in a fixed order: configure the estimator, run one or more
//! passes over the data, then turn the normalized statistic into a p-value and
//! a rejection threshold. Under [`NullApproximation::Mmd1Gaussian`] the null
//! is a zero-mean normal with the estimated variance. Under
//! [`NullApproximation::Permutation`] it is the empirical distribution of
//! statistics of permuted samples.

use crate::estimator::MmdEstimator;
use crate::permutation::{check_alpha, permutation_p_value, permutation_threshold};
use crate::types::{Diagnostics, NullApproximation, TestResult};
use mmd_core::math::distributions::normal;
use mmd_core::{Error, Result};
use tracing::{debug, info, warn};

/// Variances below this are flagged as near zero
pub const NEAR_ZERO_VARIANCE: f64 = 1e-12;

/// A variance safe to take the square root of, with what was done to it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinalizedVariance {
    pub value: f64,
    pub diagnostics: Diagnostics,
}

/// Clamp a raw variance estimate to be non-negative
///
/// Finite-sample estimates can come out negative. They are reported as zero
/// with [`Diagnostics::VARIANCE_CLAMPED`] set and a warning logged. NaN is an
/// error.
pub fn finalize_variance(raw: f64) -> Result<FinalizedVariance> {
    if raw.is_nan() {
        return Err(Error::non_finite("variance estimate"));
    }
    let mut diagnostics = Diagnostics::empty();
    let value = if raw < 0.0 {
        warn!(raw, "negative variance estimate clamped to zero");
        diagnostics |= Diagnostics::VARIANCE_CLAMPED | Diagnostics::VARIANCE_NEAR_ZERO;
        0.0
    } else {
        if raw < NEAR_ZERO_VARIANCE {
            debug!(raw, "variance estimate is near zero");
            diagnostics |= Diagnostics::VARIANCE_NEAR_ZERO;
        }
        raw
    };
    Ok(FinalizedVariance { value, diagnostics })
}

fn standard_deviation(variance: f64) -> Result<f64> {
    if variance < 0.0 || variance.is_nan() {
        return Err(Error::Domain(format!(
            "standard deviation of variance {variance}"
        )));
    }
    Ok(variance.sqrt())
}

/// `P(Z >= statistic)` for `Z ~ N(0, variance)`
///
/// A zero variance gives a point mass at zero: 0 for positive statistics, 1
/// for negative ones and 0.5 at zero.
pub fn gaussian_p_value(statistic: f64, variance: f64) -> Result<f64> {
    let sd = standard_deviation(variance)?;
    if sd == 0.0 {
        return Ok(match statistic.partial_cmp(&0.0) {
            Some(std::cmp::Ordering::Greater) => 0.0,
            Some(std::cmp::Ordering::Less) => 1.0,
            _ => 0.5,
        });
    }
    Ok(1.0 - normal::cdf(statistic / sd))
}

/// The `1 - alpha` quantile of `N(0, variance)`
pub fn gaussian_threshold(variance: f64, alpha: f64) -> Result<f64> {
    check_alpha(alpha)?;
    let sd = standard_deviation(variance)?;
    Ok(normal::ppf(1.0 - alpha) * sd)
}

/// A two-sample test deciding whether `p` and `q` differ
pub trait TwoSampleTest: MmdEstimator {
    fn null_approximation(&self) -> NullApproximation;

    /// Normalized statistics under the null, one per permutation
    fn sample_null(&mut self) -> Result<Vec<f64>>;

    fn compute_statistic(&mut self) -> Result<f64> {
        Ok(self.compute_statistic_variance()?.statistic)
    }

    fn compute_variance(&mut self) -> Result<f64> {
        Ok(self.compute_statistic_variance()?.variance)
    }

    fn compute_p_value(&mut self, statistic: f64) -> Result<f64> {
        match self.null_approximation() {
            NullApproximation::Mmd1Gaussian => {
                let variance = self.compute_variance()?;
                gaussian_p_value(statistic, variance)
            }
            NullApproximation::Permutation => {
                let null = self.sample_null()?;
                permutation_p_value(statistic, &null)
            }
        }
    }

    fn compute_threshold(&mut self, alpha: f64) -> Result<f64> {
        check_alpha(alpha)?;
        match self.null_approximation() {
            NullApproximation::Mmd1Gaussian => {
                let variance = self.compute_variance()?;
                gaussian_threshold(variance, alpha)
            }
            NullApproximation::Permutation => {
                let null = self.sample_null()?;
                permutation_threshold(&null, alpha)
            }
        }
    }

    /// Run the whole test at level `alpha`
    ///
    /// The statistic, p-value and threshold all come from the same estimation
    /// pass and, for permutation, the same null sample.
    fn perform_test(&mut self, alpha: f64) -> Result<TestResult> {
        check_alpha(alpha)?;
        let estimate = self.compute_statistic_variance()?;
        let method = self.null_approximation();
        let (p_value, threshold) = match method {
            NullApproximation::Mmd1Gaussian => (
                gaussian_p_value(estimate.statistic, estimate.variance)?,
                gaussian_threshold(estimate.variance, alpha)?,
            ),
            NullApproximation::Permutation => {
                let null = self.sample_null()?;
                (
                    permutation_p_value(estimate.statistic, &null)?,
                    permutation_threshold(&null, alpha)?,
                )
            }
        };

        let result = TestResult {
            statistic: estimate.statistic,
            variance: estimate.variance,
            p_value,
            threshold,
            alpha,
            reject: p_value < alpha,
            null_approximation: method,
            diagnostics: estimate.diagnostics,
        };
        info!(test = self.name(), %result, "two-sample test finished");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_finalize_variance() {
        let v = finalize_variance(-1e-3).unwrap();
        assert_eq!(v.value, 0.0);
        assert!(v.diagnostics.contains(Diagnostics::VARIANCE_CLAMPED));

        let v = finalize_variance(0.25).unwrap();
        assert_eq!(v.value, 0.25);
        assert!(v.diagnostics.is_empty());

        let v = finalize_variance(0.0).unwrap();
        assert!(v.diagnostics.contains(Diagnostics::VARIANCE_NEAR_ZERO));
        assert!(!v.diagnostics.contains(Diagnostics::VARIANCE_CLAMPED));

        assert!(finalize_variance(f64::NAN).is_err());
    }

    #[test]
    fn test_gaussian_p_value() {
        assert_relative_eq!(gaussian_p_value(0.0, 4.0).unwrap(), 0.5, epsilon = 1e-12);
        assert_relative_eq!(
            gaussian_p_value(2.0 * 1.959963984540054, 4.0).unwrap(),
            0.025,
            epsilon = 1e-9
        );
        assert_eq!(gaussian_p_value(1.0, 0.0).unwrap(), 0.0);
        assert_eq!(gaussian_p_value(-1.0, 0.0).unwrap(), 1.0);
        assert_eq!(gaussian_p_value(0.0, 0.0).unwrap(), 0.5);
        assert!(matches!(gaussian_p_value(1.0, -1.0), Err(Error::Domain(_))));
    }

    #[test]
    fn test_gaussian_threshold() {
        assert_relative_eq!(
            gaussian_threshold(9.0, 0.025).unwrap(),
            3.0 * 1.959963984540054,
            epsilon = 1e-7
        );
        assert_eq!(gaussian_threshold(0.0, 0.05).unwrap(), 0.0);
        assert!(gaussian_threshold(1.0, 1.5).is_err());
        assert!(gaussian_threshold(-1.0, 0.05).is_err());
    }
}
