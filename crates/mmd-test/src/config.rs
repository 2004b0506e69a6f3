//! Configuration for MMD two-sample tests

use crate::permutation::check_alpha;
use crate::selection::DEFAULT_RIDGE;
use crate::streaming::{DEFAULT_NUM_BLOCKS_PER_BURST, DEFAULT_NUM_NULL_SAMPLES};
use crate::types::{NullApproximation, StatisticType, VarianceEstimation};
use mmd_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Settings shared by the MMD estimators and the test driver
///
/// Missing fields take their defaults when deserializing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    pub statistic_type: StatisticType,
    pub variance_estimation: VarianceEstimation,
    pub null_approximation: NullApproximation,
    pub num_null_samples: usize,
    /// Total block size for the block test; unused by the other estimators
    pub blocksize: Option<usize>,
    pub num_blocks_per_burst: usize,
    /// Significance level
    pub alpha: f64,
    /// Variance regularizer for test-power kernel selection
    pub ridge: f64,
    /// Seed for permutations; drawn from the thread RNG when absent
    pub seed: Option<u64>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            statistic_type: StatisticType::default(),
            variance_estimation: VarianceEstimation::default(),
            null_approximation: NullApproximation::default(),
            num_null_samples: DEFAULT_NUM_NULL_SAMPLES,
            blocksize: None,
            num_blocks_per_burst: DEFAULT_NUM_BLOCKS_PER_BURST,
            alpha: 0.05,
            ridge: DEFAULT_RIDGE,
            seed: None,
        }
    }
}

impl TestConfig {
    pub fn validate(&self) -> Result<()> {
        check_alpha(self.alpha)?;
        if self.num_null_samples == 0 {
            return Err(Error::InvalidArgument(
                "num_null_samples must be positive".to_string(),
            ));
        }
        if self.num_blocks_per_burst == 0 {
            return Err(Error::InvalidArgument(
                "num_blocks_per_burst must be positive".to_string(),
            ));
        }
        if self.blocksize == Some(0) {
            return Err(Error::InvalidArgument("blocksize must be positive".to_string()));
        }
        if !(self.ridge.is_finite() && self.ridge >= 0.0) {
            return Err(Error::InvalidArgument(format!(
                "ridge must be finite and non-negative, got {}",
                self.ridge
            )));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Parse(format!("test config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Parse(format!("test config: {e}")))
    }
}
