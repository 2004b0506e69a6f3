//! Shared utilities for integration tests

#![allow(dead_code)]

use mmd_core::{DenseFeatures, Features};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

pub const EPSILON: f64 = 1e-10;

/// Seeded uniform samples in `[-scale, scale]^dim`
pub fn uniform_features(n: usize, dim: usize, scale: f64, seed: u64) -> Arc<dyn Features> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let data: Vec<f64> = (0..n * dim).map(|_| rng.gen_range(-scale..=scale)).collect();
    DenseFeatures::new(dim, data).unwrap().into_shared()
}
