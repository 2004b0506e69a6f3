//! Quadratic-time MMD over the full samples
//!
//! The whole sample is one block. Its kernel matrix is precomputed through
//! the [`KernelManager`] once per kernel and shared by the statistic, the
//! variance estimate and every null permutation.
//!
//! In train/test mode the estimator works on the training or the held-out
//! part of both samples, split the same way as the streaming estimators.

use crate::config::TestConfig;
use crate::estimator::MmdEstimator;
use crate::hypothesis::{finalize_variance, TwoSampleTest};
use crate::normalization::{normalize_quadratic_statistic, normalize_quadratic_variance};
use crate::permutation::random_permutation;
use crate::statistic::{first_order_variance, ComputeMmd};
use crate::streaming::DEFAULT_NUM_NULL_SAMPLES;
use crate::types::{
    NullApproximation, StatisticType, StatisticVariance, VarianceEstimation,
};
use mmd_core::math::RunningMoments;
use mmd_data::{Block, TrainTestSplit};
use mmd_core::{
    auto_engine, AutoEngine, DenseFeatures, Error, ExecutionEngine, Features,
    Kernel, KernelManager, Result,
};
use nalgebra::DMatrix;
use rand::{thread_rng, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use tracing::{debug, instrument};

/// MMD of two in-memory samples using every pair of samples
#[derive(Debug)]
pub struct QuadraticTimeMmd {
    full_p: Arc<dyn Features>,
    full_q: Arc<dyn Features>,
    split: TrainTestSplit,
    /// Active parts of `full_p` and `full_q` under `split`
    p: Arc<dyn Features>,
    q: Arc<dyn Features>,
    merged: Arc<dyn Features>,
    kernels: KernelManager,
    statistic_type: StatisticType,
    variance_estimation: VarianceEstimation,
    num_null_samples: usize,
    rng: ChaCha8Rng,
    engine: AutoEngine,
}

impl QuadraticTimeMmd {
    pub fn new(p: Arc<dyn Features>, q: Arc<dyn Features>) -> Result<Self> {
        let merged = DenseFeatures::merged(p.as_ref(), q.as_ref())?.into_shared();
        Ok(Self {
            full_p: Arc::clone(&p),
            full_q: Arc::clone(&q),
            split: TrainTestSplit::default(),
            p,
            q,
            merged,
            kernels: KernelManager::with_num_kernels(1),
            statistic_type: StatisticType::default(),
            variance_estimation: VarianceEstimation::default(),
            num_null_samples: DEFAULT_NUM_NULL_SAMPLES,
            rng: ChaCha8Rng::seed_from_u64(thread_rng().gen()),
            engine: auto_engine(),
        })
    }

    /// Estimator configured from `config`
    ///
    /// Block settings are ignored. A Gaussian null is rejected.
    pub fn from_config(
        p: Arc<dyn Features>,
        q: Arc<dyn Features>,
        config: &TestConfig,
    ) -> Result<Self> {
        config.validate()?;
        let mut estimator = Self::new(p, q)?
            .with_statistic_type(config.statistic_type)
            .with_variance_estimation(config.variance_estimation)
            .with_null_approximation(config.null_approximation)?
            .with_num_null_samples(config.num_null_samples);
        if let Some(seed) = config.seed {
            estimator = estimator.with_seed(seed);
        }
        Ok(estimator)
    }

    pub fn with_statistic_type(mut self, statistic_type: StatisticType) -> Self {
        self.statistic_type = statistic_type;
        self
    }

    pub fn with_variance_estimation(mut self, method: VarianceEstimation) -> Self {
        self.variance_estimation = method;
        self
    }

    /// Only the permutation null is available here
    pub fn with_null_approximation(self, method: NullApproximation) -> Result<Self> {
        match method {
            NullApproximation::Permutation => Ok(self),
            other => Err(Error::InvalidArgument(format!(
                "quadratic-time MMD supports only the permutation null, got {other}"
            ))),
        }
    }

    pub fn with_num_null_samples(mut self, num_null_samples: usize) -> Self {
        self.num_null_samples = num_null_samples;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    pub fn with_kernel(mut self, kernel: Box<dyn Kernel>) -> Result<Self> {
        self.set_kernel(kernel)?;
        Ok(self)
    }

    pub fn kernel_manager(&self) -> &KernelManager {
        &self.kernels
    }

    pub fn train_test_split(&self) -> &TrainTestSplit {
        &self.split
    }

    /// Enable the train/test partition in train mode, or disable it
    pub fn set_train_test_mode(&mut self, on: bool) -> Result<()> {
        let mut split = self.split;
        split.set_train_test_mode(on);
        self.apply_split(split)
    }

    /// Work on the training part (`true`) or the held-out part (`false`)
    pub fn set_train_mode(&mut self, on: bool) -> Result<()> {
        let mut split = self.split;
        split.set_train_mode(on)?;
        self.apply_split(split)
    }

    pub fn set_train_test_ratio(&mut self, ratio: f64) -> Result<()> {
        let mut split = self.split;
        split.set_train_test_ratio(ratio)?;
        self.apply_split(split)
    }

    /// Switch the active samples and rebind the kernel to them
    ///
    /// Nothing changes if the kernel cannot be bound to the new samples.
    fn apply_split(&mut self, split: TrainTestSplit) -> Result<()> {
        let p = split_view(&self.full_p, &split)?;
        let q = split_view(&self.full_q, &split)?;
        let merged = DenseFeatures::merged(p.as_ref(), q.as_ref())?.into_shared();
        let rebound = match self.kernels.raw_kernel_at(0) {
            Ok(kernel) => {
                let mut kernel = kernel.box_clone();
                kernel.init(Arc::clone(&merged), Arc::clone(&merged))?;
                Some(kernel)
            }
            Err(_) => None,
        };
        if let Some(kernel) = rebound {
            self.kernels.set_kernel_at(0, kernel)?;
        }
        debug!(split = ?split.mode(), nx = p.num_vectors(), ny = q.num_vectors(), "active samples");
        self.split = split;
        self.p = p;
        self.q = q;
        self.merged = merged;
        Ok(())
    }

    fn sizes(&self) -> (usize, usize) {
        (self.p.num_vectors(), self.q.num_vectors())
    }

    /// Kernel matrix of the merged sample, shared with the slot cache
    fn gram(&mut self) -> Result<Arc<DMatrix<f64>>> {
        self.kernels.precompute_kernel_at_with(0, &self.engine)?;
        self.kernels.precomputed_matrix_at(0)?.ok_or_else(|| {
            Error::Computation("kernel slot 0 holds no Gram matrix after precompute".to_string())
        })
    }

    fn permuted_statistics(
        &mut self,
        compute: &ComputeMmd,
        km: &DMatrix<f64>,
        count: usize,
    ) -> Result<Vec<f64>> {
        let n = compute.num_samples();
        let permutations: Vec<Vec<usize>> = (0..count)
            .map(|_| random_permutation(&mut self.rng, n))
            .collect();
        self.engine
            .execute_batch(count, |i| compute.compute_permuted(km, &permutations[i]))
            .into_iter()
            .collect()
    }
}

fn split_view(features: &Arc<dyn Features>, split: &TrainTestSplit) -> Result<Arc<dyn Features>> {
    let range = split.range(features.num_vectors());
    if range.is_empty() {
        return Err(Error::InsufficientData {
            expected: 1,
            actual: 0,
        });
    }
    Ok(Block::new(Arc::clone(features), range.start, range.len())?.into_shared())
}

impl MmdEstimator for QuadraticTimeMmd {
    fn name(&self) -> &'static str {
        "quadratic-time-mmd"
    }

    /// Binds the kernel to the merged sample
    ///
    /// A precomputed kernel is taken as is, provided its Gram matrix covers
    /// the merged sample.
    fn set_kernel(&mut self, mut kernel: Box<dyn Kernel>) -> Result<()> {
        kernel.init(Arc::clone(&self.merged), Arc::clone(&self.merged))?;
        self.kernels.set_kernel_at(0, kernel)
    }

    fn kernel(&self) -> Result<&dyn Kernel> {
        self.kernels.kernel_at(0)
    }

    #[instrument(skip(self), fields(variance = ?self.variance_estimation))]
    fn compute_statistic_variance(&mut self) -> Result<StatisticVariance> {
        let (nx, ny) = self.sizes();
        let compute = ComputeMmd::new(nx, ny, self.statistic_type)?;
        let km = self.gram()?;
        let statistic = normalize_quadratic_statistic(compute.compute(&km)?, nx, ny)?;

        let raw = match self.variance_estimation {
            VarianceEstimation::Direct => {
                if nx != ny {
                    return Err(Error::Precondition(format!(
                        "direct variance needs equal sample sizes, got {nx} and {ny}"
                    )));
                }
                first_order_variance(&km, nx)?
            }
            VarianceEstimation::Permutation => {
                let count = self.num_null_samples;
                let mut moments = RunningMoments::new();
                moments.extend(self.permuted_statistics(&compute, &km, count)?);
                moments.sample_variance().ok_or(Error::InsufficientData {
                    expected: 2,
                    actual: moments.count(),
                })?
            }
        };
        let variance = finalize_variance(normalize_quadratic_variance(raw, nx, ny)?)?;
        debug!(statistic, variance = variance.value, "quadratic-time estimate");
        Ok(StatisticVariance {
            statistic,
            variance: variance.value,
            num_blocks: 1,
            diagnostics: variance.diagnostics,
        })
    }

    fn normalize_statistic(&self, statistic: f64) -> Result<f64> {
        let (nx, ny) = self.sizes();
        normalize_quadratic_statistic(statistic, nx, ny)
    }

    fn normalize_variance(&self, variance: f64) -> Result<f64> {
        let (nx, ny) = self.sizes();
        normalize_quadratic_variance(variance, nx, ny)
    }

    fn pooled_samples(&mut self, max_per_distribution: usize) -> Result<Arc<dyn Features>> {
        let mut pooled = Vec::new();
        for side in [&self.p, &self.q] {
            for i in 0..side.num_vectors().min(max_per_distribution) {
                pooled.push(side.vector(i)?.to_vec());
            }
        }
        Ok(DenseFeatures::from_vectors(&pooled)?.into_shared())
    }

    fn cleanup(&mut self) {
        self.kernels.restore_all();
    }
}

impl TwoSampleTest for QuadraticTimeMmd {
    fn null_approximation(&self) -> NullApproximation {
        NullApproximation::Permutation
    }

    #[instrument(skip(self), fields(num_null_samples = self.num_null_samples))]
    fn sample_null(&mut self) -> Result<Vec<f64>> {
        if self.num_null_samples == 0 {
            return Err(Error::Precondition(
                "number of null samples must be positive".to_string(),
            ));
        }
        let (nx, ny) = self.sizes();
        let compute = ComputeMmd::new(nx, ny, self.statistic_type)?;
        let km = self.gram()?;
        self.permuted_statistics(&compute, &km, self.num_null_samples)?
            .into_iter()
            .map(|s| normalize_quadratic_statistic(s, nx, ny))
            .collect()
    }
}
