//! Train/test partition of every distribution's samples
//!
//! With the partition enabled, the first `ratio / (ratio + 1)` share of each
//! distribution (rounded down) forms the training part and the rest the test
//! part. Kernel selection reads the training part and the test reads the held
//! out rest, so no sample informs both.

use mmd_core::{Error, Result};
use std::ops::Range;

pub const DEFAULT_TRAIN_TEST_RATIO: f64 = 1.0;

/// Which samples of each distribution a pass reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleSplit {
    /// Every sample
    #[default]
    Full,
    /// The leading training share
    Train,
    /// The trailing held-out share
    Test,
}

/// Train/test mode and ratio
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainTestSplit {
    mode: SampleSplit,
    ratio: f64,
}

impl Default for TrainTestSplit {
    fn default() -> Self {
        Self {
            mode: SampleSplit::Full,
            ratio: DEFAULT_TRAIN_TEST_RATIO,
        }
    }
}

impl TrainTestSplit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> SampleSplit {
        self.mode
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn is_train_test_mode(&self) -> bool {
        self.mode != SampleSplit::Full
    }

    pub fn is_train_mode(&self) -> bool {
        self.mode == SampleSplit::Train
    }

    /// Turn the partition on in train mode, or off with the default ratio
    pub fn set_train_test_mode(&mut self, on: bool) {
        *self = if on {
            Self {
                mode: SampleSplit::Train,
                ratio: self.ratio,
            }
        } else {
            Self::default()
        };
    }

    /// Read the training part (`true`) or the held-out part (`false`)
    pub fn set_train_mode(&mut self, on: bool) -> Result<()> {
        self.require_enabled("train mode")?;
        self.mode = if on {
            SampleSplit::Train
        } else {
            SampleSplit::Test
        };
        Ok(())
    }

    /// Training samples per held-out sample
    pub fn set_train_test_ratio(&mut self, ratio: f64) -> Result<()> {
        self.require_enabled("train/test ratio")?;
        if !(ratio.is_finite() && ratio > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "train/test ratio must be finite and positive, got {ratio}"
            )));
        }
        self.ratio = ratio;
        Ok(())
    }

    fn require_enabled(&self, what: &str) -> Result<()> {
        if !self.is_train_test_mode() {
            return Err(Error::Precondition(format!(
                "{what} needs train/test mode; call set_train_test_mode(true) first"
            )));
        }
        Ok(())
    }

    /// Size of the training part of `total` samples
    pub fn num_train_samples(&self, total: usize) -> usize {
        let share = self.ratio / (self.ratio + 1.0);
        ((total as f64 * share).floor() as usize).min(total)
    }

    /// Indices of the samples a pass reads out of `total`
    pub fn range(&self, total: usize) -> Range<usize> {
        match self.mode {
            SampleSplit::Full => 0..total,
            SampleSplit::Train => 0..self.num_train_samples(total),
            SampleSplit::Test => self.num_train_samples(total)..total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_reads_everything() {
        let split = TrainTestSplit::new();
        assert!(!split.is_train_test_mode());
        assert_eq!(split.range(10), 0..10);
    }

    #[test]
    fn test_ratio_partitions() {
        let mut split = TrainTestSplit::new();
        split.set_train_test_mode(true);
        assert!(split.is_train_mode());
        assert_eq!(split.range(10), 0..5);

        split.set_train_test_ratio(3.0).unwrap();
        assert_eq!(split.range(10), 0..7);
        split.set_train_mode(false).unwrap();
        assert_eq!(split.range(10), 7..10);
    }

    #[test]
    fn test_settings_need_train_test_mode() {
        let mut split = TrainTestSplit::new();
        assert!(matches!(split.set_train_mode(true), Err(Error::Precondition(_))));
        assert!(matches!(
            split.set_train_test_ratio(2.0),
            Err(Error::Precondition(_))
        ));

        split.set_train_test_mode(true);
        assert!(split.set_train_test_ratio(0.0).is_err());
        assert!(split.set_train_test_ratio(f64::INFINITY).is_err());

        split.set_train_test_ratio(2.0).unwrap();
        split.set_train_test_mode(false);
        assert_eq!(split, TrainTestSplit::default());
    }
}
