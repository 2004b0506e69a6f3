//! Sample sources feeding the [`DataManager`](crate::DataManager)
//!
//! A source hands out its samples in order, a chunk at a time, between a
//! `start()` and an `end()`. `start()` begins a pass from the first sample.
//! `reset()` additionally returns the source to its construction state, which
//! only differs from `start()` for sources that generate data.

use crate::block::Block;
use mmd_core::{Error, Features, Result};
use std::fmt;
use std::sync::Arc;

/// A sequential supplier of samples from one distribution
pub trait DataSource: Send + fmt::Debug {
    /// Total number of samples one pass yields
    fn num_samples(&self) -> usize;

    /// Dimension of every sample
    fn dim(&self) -> usize;

    /// Begin a pass from the first sample, acquiring any resources it needs
    fn start(&mut self) -> Result<()>;

    /// Up to `max_samples` further samples, or `None` once the pass is exhausted
    ///
    /// A chunk shorter than requested does not end the pass; the caller
    /// asks again until it sees `None` or an empty chunk.
    fn next_chunk(&mut self, max_samples: usize) -> Result<Option<Arc<dyn Features>>>;

    /// Finish the pass and release any resources. Calling it twice is harmless.
    fn end(&mut self) -> Result<()>;

    /// End any pass and return to the initial state
    fn reset(&mut self) -> Result<()> {
        self.end()
    }

    /// Whether a pass is in progress
    fn is_active(&self) -> bool;
}

/// Source over a collection already in memory
///
/// Chunks are [`Block`] views, so no sample is copied.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    features: Arc<dyn Features>,
    cursor: usize,
    active: bool,
}

impl InMemorySource {
    pub fn new(features: Arc<dyn Features>) -> Self {
        Self {
            features,
            cursor: 0,
            active: false,
        }
    }

    pub fn features(&self) -> &Arc<dyn Features> {
        &self.features
    }
}

impl DataSource for InMemorySource {
    fn num_samples(&self) -> usize {
        self.features.num_vectors()
    }

    fn dim(&self) -> usize {
        self.features.dim()
    }

    fn start(&mut self) -> Result<()> {
        self.cursor = 0;
        self.active = true;
        Ok(())
    }

    fn next_chunk(&mut self, max_samples: usize) -> Result<Option<Arc<dyn Features>>> {
        if !self.active {
            return Err(Error::State("in-memory source read before start()".to_string()));
        }
        let take = max_samples.min(self.num_samples() - self.cursor);
        if take == 0 {
            return Ok(None);
        }
        let chunk = Block::new(Arc::clone(&self.features), self.cursor, take)?;
        self.cursor += take;
        Ok(Some(chunk.into_shared()))
    }

    fn end(&mut self) -> Result<()> {
        self.active = false;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.cursor = 0;
        self.active = false;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mmd_core::DenseFeatures;

    fn source(n: usize) -> InMemorySource {
        let data: Vec<f64> = (0..n).map(|i| i as f64).collect();
        InMemorySource::new(DenseFeatures::new(1, data).unwrap().into_shared())
    }

    #[test]
    fn test_chunks_in_order() {
        let mut s = source(5);
        s.start().unwrap();
        let a = s.next_chunk(2).unwrap().unwrap();
        let b = s.next_chunk(2).unwrap().unwrap();
        let c = s.next_chunk(2).unwrap().unwrap();
        assert_eq!(a.vector(0).unwrap(), &[0.0]);
        assert_eq!(b.vector(1).unwrap(), &[3.0]);
        assert_eq!(c.num_vectors(), 1);
        assert!(s.next_chunk(2).unwrap().is_none());
        s.end().unwrap();
        assert!(!s.is_active());
    }

    #[test]
    fn test_start_rewinds() {
        let mut s = source(3);
        s.start().unwrap();
        s.next_chunk(3).unwrap();
        s.start().unwrap();
        assert_eq!(s.next_chunk(1).unwrap().unwrap().vector(0).unwrap(), &[0.0]);
    }

    #[test]
    fn test_read_without_start() {
        let mut s = source(3);
        assert!(matches!(s.next_chunk(1), Err(Error::State(_))));
    }
}
