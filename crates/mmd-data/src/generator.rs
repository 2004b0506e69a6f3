//! Synthetic Gaussian source with a mean shift in the first dimension

use crate::source::DataSource;
use mmd_core::{DenseFeatures, Error, Features, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use std::sync::Arc;

/// Streams `N(mu, I)` samples where `mu = (mean_shift, 0, ..., 0)`
///
/// Each pass draws fresh samples. `reset()` reseeds, so the pass after a reset
/// repeats the first pass exactly.
#[derive(Debug, Clone)]
pub struct MeanShiftGenerator {
    num_samples: usize,
    dim: usize,
    mean_shift: f64,
    seed: u64,
    rng: ChaCha8Rng,
    emitted: usize,
    active: bool,
}

impl MeanShiftGenerator {
    pub fn new(num_samples: usize, dim: usize, mean_shift: f64, seed: u64) -> Result<Self> {
        if dim == 0 {
            return Err(Error::InvalidArgument(
                "generator dimension must be positive".to_string(),
            ));
        }
        if !mean_shift.is_finite() {
            return Err(Error::InvalidArgument(format!(
                "mean shift must be finite, got {mean_shift}"
            )));
        }
        Ok(Self {
            num_samples,
            dim,
            mean_shift,
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
            emitted: 0,
            active: false,
        })
    }

    pub fn mean_shift(&self) -> f64 {
        self.mean_shift
    }
}

impl DataSource for MeanShiftGenerator {
    fn num_samples(&self) -> usize {
        self.num_samples
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn start(&mut self) -> Result<()> {
        self.emitted = 0;
        self.active = true;
        Ok(())
    }

    fn next_chunk(&mut self, max_samples: usize) -> Result<Option<Arc<dyn Features>>> {
        if !self.active {
            return Err(Error::State("generator read before start()".to_string()));
        }
        let take = max_samples.min(self.num_samples - self.emitted);
        if take == 0 {
            return Ok(None);
        }
        let mut data: Vec<f64> = (0..take * self.dim)
            .map(|_| StandardNormal.sample(&mut self.rng))
            .collect();
        for sample in data.chunks_exact_mut(self.dim) {
            sample[0] += self.mean_shift;
        }
        self.emitted += take;
        Ok(Some(DenseFeatures::new(self.dim, data)?.into_shared()))
    }

    fn end(&mut self) -> Result<()> {
        self.active = false;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.rng = ChaCha8Rng::seed_from_u64(self.seed);
        self.emitted = 0;
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

    fn drain(g: &mut MeanShiftGenerator) -> Vec<f64> {
        g.start().unwrap();
        let mut out = Vec::new();
        while let Some(chunk) = g.next_chunk(7).unwrap() {
            for i in 0..chunk.num_vectors() {
                out.extend_from_slice(chunk.vector(i).unwrap());
            }
        }
        g.end().unwrap();
        out
    }

    #[test]
    fn test_shift_moves_first_dimension() {
        let mut g = MeanShiftGenerator::new(2000, 2, 5.0, 42).unwrap();
        let data = drain(&mut g);
        assert_eq!(data.len(), 4000);
        let mean0: f64 = data.iter().step_by(2).sum::<f64>() / 2000.0;
        let mean1: f64 = data.iter().skip(1).step_by(2).sum::<f64>() / 2000.0;
        assert!((mean0 - 5.0).abs() < 0.2, "mean0 = {mean0}");
        assert!(mean1.abs() < 0.2, "mean1 = {mean1}");
    }

    #[test]
    fn test_passes_differ_until_reset() {
        let mut g = MeanShiftGenerator::new(10, 1, 0.0, 7).unwrap();
        let first = drain(&mut g);
        let second = drain(&mut g);
        assert_ne!(first, second);
        g.reset().unwrap();
        assert_eq!(drain(&mut g), first);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(MeanShiftGenerator::new(10, 0, 1.0, 0).is_err());
        assert!(MeanShiftGenerator::new(10, 1, f64::NAN, 0).is_err());
    }
}
