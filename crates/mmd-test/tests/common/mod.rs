//! Shared utilities for integration tests

#![allow(dead_code)]

use mmd_core::{DenseFeatures, Error, Features, Kernel, Result};
use mmd_test::{finalize_variance, MmdEstimator, NullApproximation, StatisticVariance, TwoSampleTest};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use std::sync::Arc;

/// Seeded standard normal samples, shifted by `shift` in every dimension
pub fn normal_features(n: usize, dim: usize, shift: f64, seed: u64) -> Arc<dyn Features> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let data: Vec<f64> = (0..n * dim)
        .map(|_| {
            let z: f64 = StandardNormal.sample(&mut rng);
            z + shift
        })
        .collect();
    DenseFeatures::new(dim, data).unwrap().into_shared()
}

/// Estimator whose raw statistic and variance are functions of the kernel width
///
/// Refuses a new kernel until `cleanup()` has run after the last estimate.
#[derive(Debug)]
pub struct ScriptedEstimator {
    pub script: fn(f64) -> (f64, f64),
    pub kernel: Option<Box<dyn Kernel>>,
    pub dirty: bool,
    pub cleanups: usize,
    pub null: Vec<f64>,
    pub method: NullApproximation,
}

impl ScriptedEstimator {
    pub fn new(script: fn(f64) -> (f64, f64)) -> Self {
        Self {
            script,
            kernel: None,
            dirty: false,
            cleanups: 0,
            null: vec![0.0],
            method: NullApproximation::Mmd1Gaussian,
        }
    }
}

impl MmdEstimator for ScriptedEstimator {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn set_kernel(&mut self, kernel: Box<dyn Kernel>) -> Result<()> {
        if self.dirty {
            return Err(Error::State("estimator was not cleaned up".to_string()));
        }
        self.kernel = Some(kernel);
        Ok(())
    }

    fn kernel(&self) -> Result<&dyn Kernel> {
        self.kernel
            .as_deref()
            .ok_or_else(|| Error::Precondition("no kernel".to_string()))
    }

    fn compute_statistic_variance(&mut self) -> Result<StatisticVariance> {
        let width = self.kernel()?.width().unwrap_or(1.0);
        let (statistic, raw) = (self.script)(width);
        let variance = finalize_variance(raw)?;
        self.dirty = true;
        Ok(StatisticVariance {
            statistic,
            variance: variance.value,
            num_blocks: 1,
            diagnostics: variance.diagnostics,
        })
    }

    fn normalize_statistic(&self, statistic: f64) -> Result<f64> {
        Ok(statistic)
    }

    fn normalize_variance(&self, variance: f64) -> Result<f64> {
        Ok(variance)
    }

    fn pooled_samples(&mut self, _max_per_distribution: usize) -> Result<Arc<dyn Features>> {
        Ok(DenseFeatures::from_vectors(&[[0.0], [1.0], [2.0], [3.0]])?.into_shared())
    }

    fn cleanup(&mut self) {
        self.dirty = false;
        self.cleanups += 1;
    }
}

impl TwoSampleTest for ScriptedEstimator {
    fn null_approximation(&self) -> NullApproximation {
        self.method
    }

    fn sample_null(&mut self) -> Result<Vec<f64>> {
        Ok(self.null.clone())
    }
}
