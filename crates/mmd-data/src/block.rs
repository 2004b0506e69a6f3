//! Index-range views over shared feature collections

use mmd_core::{Error, Features, Result};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// A contiguous run of samples `[offset, offset + size)` of a shared collection
///
/// A block never copies sample data. Any number of blocks may view the same
/// collection at once.
#[derive(Clone)]
pub struct Block {
    features: Arc<dyn Features>,
    offset: usize,
    size: usize,
}

impl Block {
    /// View `size` samples of `features` starting at `offset`
    pub fn new(features: Arc<dyn Features>, offset: usize, size: usize) -> Result<Self> {
        let n = features.num_vectors();
        match offset.checked_add(size) {
            Some(end) if end <= n => Ok(Self {
                features,
                offset,
                size,
            }),
            _ => Err(Error::InvalidArgument(format!(
                "block [{offset}, {offset}+{size}) exceeds {n} samples"
            ))),
        }
    }

    /// Split the head of `features` into `num_blocks` consecutive blocks of `size`
    ///
    /// Block `i` covers `[i * size, (i + 1) * size)`. Samples past
    /// `num_blocks * size` are not covered.
    pub fn create_blocks(
        features: &Arc<dyn Features>,
        num_blocks: usize,
        size: usize,
    ) -> Result<Vec<Block>> {
        if size == 0 && num_blocks > 0 {
            return Err(Error::InvalidArgument("block size must be positive".to_string()));
        }
        let n = features.num_vectors();
        let required = num_blocks.checked_mul(size).ok_or_else(|| {
            Error::InvalidArgument(format!("{num_blocks} blocks of size {size} overflow"))
        })?;
        if required > n {
            return Err(Error::InvalidArgument(format!(
                "{num_blocks} blocks of size {size} need {required} samples, only {n} available"
            )));
        }
        Ok((0..num_blocks)
            .map(|i| Block {
                features: Arc::clone(features),
                offset: i * size,
                size,
            })
            .collect())
    }

    /// Indices of the underlying collection covered by this block
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.size
    }

    pub fn underlying(&self) -> &Arc<dyn Features> {
        &self.features
    }

    pub fn into_shared(self) -> Arc<dyn Features> {
        Arc::new(self)
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("range", &self.range())
            .field("dim", &self.features.dim())
            .finish()
    }
}

impl Features for Block {
    fn num_vectors(&self) -> usize {
        self.size
    }

    fn dim(&self) -> usize {
        self.features.dim()
    }

    fn get_vector(&self, index: usize) -> Option<&[f64]> {
        if index < self.size {
            self.features.get_vector(self.offset + index)
        } else {
            None
        }
    }
}
