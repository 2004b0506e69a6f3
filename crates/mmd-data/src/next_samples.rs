//! Per-burst result of a data fetch

use crate::block::Block;
use mmd_core::{Error, Result};

/// Blocks fetched in one burst, grouped by distribution
///
/// Every distribution holds the same number of blocks. A burst in which any
/// distribution produced no block is empty, which marks the end of a pass.
#[derive(Debug, Clone, Default)]
pub struct NextSamples {
    blocks: Vec<Vec<Block>>,
    num_blocks: usize,
}

impl NextSamples {
    /// Group per-distribution block lists, truncating to the shortest one
    pub fn from_blocks(mut blocks: Vec<Vec<Block>>) -> Self {
        let num_blocks = blocks.iter().map(Vec::len).min().unwrap_or(0);
        for b in &mut blocks {
            b.truncate(num_blocks);
        }
        Self { blocks, num_blocks }
    }

    /// Blocks of distribution `index`
    pub fn at(&self, index: usize) -> Result<&[Block]> {
        self.blocks
            .get(index)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::index(index, self.blocks.len(), "distributions"))
    }

    pub fn num_distributions(&self) -> usize {
        self.blocks.len()
    }

    /// Blocks per distribution in this burst
    pub fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    pub fn is_empty(&self) -> bool {
        self.num_blocks == 0
    }

    /// Release every block, leaving an empty burst
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.num_blocks = 0;
    }
}
