//! Block-streaming MMD estimators
//!
//! [`StreamingMmd`] walks the data block by block through its
//! [`DataManager`]. Each block pairs `Bx` samples of `p` with `By` samples of
//! `q`. Its kernel matrix is computed once and shared by the block statistic
//! and any permuted statistics. Block statistics are averaged with running
//! moments, so a pass holds at most one burst of kernel matrices in memory.
//!
//! The block scheme decides the block size:
//!
//! - [`BTest`] uses the size the caller configured.
//! - [`LinearTime`] uses twice the smallest admissible block, which keeps two
//!   samples of every distribution in a block.
//!
//! In train/test mode every pass reads only the training or only the held-out
//! part of the data, and block sizes are recomputed for that part.

use crate::config::TestConfig;
use crate::estimator::MmdEstimator;
use crate::hypothesis::{finalize_variance, TwoSampleTest};
use crate::normalization::{normalize_btest_statistic, normalize_btest_variance, BlockLayout};
use crate::permutation::random_permutation;
use crate::statistic::ComputeMmd;
use crate::types::{
    Diagnostics, NullApproximation, StatisticType, StatisticVariance, VarianceEstimation,
};
use mmd_core::math::RunningMoments;
use mmd_core::{
    auto_engine, kernel_matrix, AutoEngine, DenseFeatures, Error, ExecutionEngine, Features,
    Kernel, KernelManager, Result, SequentialEngine,
};
use mmd_data::{DataManager, DataSource, NextSamples};
use nalgebra::DMatrix;
use rand::{thread_rng, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, instrument};

/// How a streaming estimator picks its total block size
pub trait BlockScheme: Send + Sync + 'static {
    const NAME: &'static str;

    /// Total block size for `data`, given the size the caller asked for
    fn blocksize(data: &DataManager, requested: Option<usize>) -> Result<usize>;
}

/// Block test with a caller-chosen block size
#[derive(Debug, Clone, Copy, Default)]
pub struct BTest;

impl BlockScheme for BTest {
    const NAME: &'static str = "btest-mmd";

    fn blocksize(_data: &DataManager, requested: Option<usize>) -> Result<usize> {
        requested.ok_or_else(|| {
            Error::Precondition("block test needs a blocksize; call with_blocksize()".to_string())
        })
    }
}

/// Linear-time MMD: the smallest blocks holding two samples per distribution
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearTime;

impl BlockScheme for LinearTime {
    const NAME: &'static str = "linear-time-mmd";

    fn blocksize(data: &DataManager, _requested: Option<usize>) -> Result<usize> {
        Ok(2 * data.min_blocksize()?)
    }
}

pub type BTestMmd = StreamingMmd<BTest>;
pub type LinearTimeMmd = StreamingMmd<LinearTime>;

pub const DEFAULT_NUM_NULL_SAMPLES: usize = 250;
pub const DEFAULT_NUM_BLOCKS_PER_BURST: usize = 1000;

/// MMD estimator over streamed blocks of two distributions
#[derive(Debug)]
pub struct StreamingMmd<S: BlockScheme> {
    data: DataManager,
    kernels: KernelManager,
    statistic_type: StatisticType,
    variance_estimation: VarianceEstimation,
    null_approximation: NullApproximation,
    num_null_samples: usize,
    blocksize: Option<usize>,
    num_blocks_per_burst: usize,
    rng: ChaCha8Rng,
    engine: AutoEngine,
    scheme: PhantomData<S>,
}

impl<S: BlockScheme> StreamingMmd<S> {
    /// Estimator over in-memory samples of `p` and `q`
    pub fn new(p: Arc<dyn Features>, q: Arc<dyn Features>) -> Result<Self> {
        Self::from_data_manager(DataManager::from_features(p, q)?)
    }

    /// Estimator over two streaming sources
    pub fn from_sources(p: Box<dyn DataSource>, q: Box<dyn DataSource>) -> Result<Self> {
        let mut data = DataManager::new(2);
        data.set_source(0, p)?;
        data.set_source(1, q)?;
        Self::from_data_manager(data)
    }

    pub fn from_data_manager(data: DataManager) -> Result<Self> {
        if data.num_distributions() != 2 {
            return Err(Error::InvalidArgument(format!(
                "two-sample estimators need 2 distributions, got {}",
                data.num_distributions()
            )));
        }
        Ok(Self {
            data,
            kernels: KernelManager::with_num_kernels(1),
            statistic_type: StatisticType::default(),
            variance_estimation: VarianceEstimation::default(),
            null_approximation: NullApproximation::default(),
            num_null_samples: DEFAULT_NUM_NULL_SAMPLES,
            blocksize: None,
            num_blocks_per_burst: DEFAULT_NUM_BLOCKS_PER_BURST,
            rng: ChaCha8Rng::seed_from_u64(thread_rng().gen()),
            engine: auto_engine(),
            scheme: PhantomData,
        })
    }

    /// Estimator over in-memory samples, configured from `config`
    pub fn from_config(
        p: Arc<dyn Features>,
        q: Arc<dyn Features>,
        config: &TestConfig,
    ) -> Result<Self> {
        config.validate()?;
        let mut estimator = Self::new(p, q)?
            .with_statistic_type(config.statistic_type)
            .with_variance_estimation(config.variance_estimation)
            .with_null_approximation(config.null_approximation)
            .with_num_null_samples(config.num_null_samples)
            .with_num_blocks_per_burst(config.num_blocks_per_burst);
        if let Some(blocksize) = config.blocksize {
            estimator = estimator.with_blocksize(blocksize);
        }
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

    pub fn with_null_approximation(mut self, method: NullApproximation) -> Self {
        self.null_approximation = method;
        self
    }

    pub fn with_num_null_samples(mut self, num_null_samples: usize) -> Self {
        self.num_null_samples = num_null_samples;
        self
    }

    /// Total block size; distributions share it in proportion to their sizes
    pub fn with_blocksize(mut self, blocksize: usize) -> Self {
        self.blocksize = Some(blocksize);
        self
    }

    pub fn with_num_blocks_per_burst(mut self, num_blocks_per_burst: usize) -> Self {
        self.num_blocks_per_burst = num_blocks_per_burst;
        self
    }

    /// Seed the permutation generator
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    pub fn with_kernel(mut self, kernel: Box<dyn Kernel>) -> Result<Self> {
        self.set_kernel(kernel)?;
        Ok(self)
    }

    /// Change the block size of later passes
    pub fn set_blocksize(&mut self, blocksize: usize) -> Result<()> {
        if self.data.is_streaming() {
            return Err(Error::State(
                "cannot change the blocksize while a streaming pass is in progress".to_string(),
            ));
        }
        self.blocksize = Some(blocksize);
        Ok(())
    }

    pub fn statistic_type(&self) -> StatisticType {
        self.statistic_type
    }

    pub fn variance_estimation(&self) -> VarianceEstimation {
        self.variance_estimation
    }

    pub fn num_null_samples(&self) -> usize {
        self.num_null_samples
    }

    pub fn data_manager(&self) -> &DataManager {
        &self.data
    }

    pub fn data_manager_mut(&mut self) -> &mut DataManager {
        &mut self.data
    }

    pub fn kernel_manager(&self) -> &KernelManager {
        &self.kernels
    }

    /// Enable the train/test partition in train mode, or disable it
    pub fn set_train_test_mode(&mut self, on: bool) -> Result<()> {
        self.data.set_train_test_mode(on)
    }

    /// Stream the training part (`true`) or the held-out part (`false`)
    pub fn set_train_mode(&mut self, on: bool) -> Result<()> {
        self.data.set_train_mode(on)
    }

    pub fn set_train_test_ratio(&mut self, ratio: f64) -> Result<()> {
        self.data.set_train_test_ratio(ratio)
    }

    /// Push the block and burst sizes down to the data manager
    fn configure(&mut self) -> Result<ComputeMmd> {
        if self.data.is_streaming() {
            return Err(Error::State(
                "cannot reconfigure while a streaming pass is in progress".to_string(),
            ));
        }
        let blocksize = S::blocksize(&self.data, self.blocksize)?;
        self.data.set_blocksize(blocksize)?;
        self.data.set_num_blocks_per_burst(self.num_blocks_per_burst)?;
        let (bx, by) = (self.data.blocksize_at(0)?, self.data.blocksize_at(1)?);
        debug!(estimator = S::NAME, bx, by, "configured block layout");
        ComputeMmd::new(bx, by, self.statistic_type)
    }

    fn configured_layout(&self) -> Result<BlockLayout> {
        Ok(BlockLayout::new(
            self.data.num_samples_at(0)?,
            self.data.num_samples_at(1)?,
            self.data.blocksize_at(0)?,
            self.data.blocksize_at(1)?,
        ))
    }
}

/// The layout of the blocks a pass actually consumed
fn consumed_layout(num_blocks: usize, compute: &ComputeMmd, data: &DataManager) -> Result<BlockLayout> {
    if num_blocks == 0 {
        return Err(Error::InsufficientData {
            expected: compute.num_samples(),
            actual: 0,
        });
    }
    let (bx, by) = (data.blocksize_at(0)?, data.blocksize_at(1)?);
    Ok(BlockLayout::new(num_blocks * bx, num_blocks * by, bx, by))
}

fn streaming_kernel(kernels: &KernelManager) -> Result<&dyn Kernel> {
    let kernel = kernels.raw_kernel_at(0)?;
    if kernel.is_precomputed() {
        return Err(Error::Precondition(
            "a precomputed kernel cannot be rebound to streamed blocks".to_string(),
        ));
    }
    Ok(kernel)
}

/// Kernel matrix of every merged block pair in a burst
fn block_kernel_matrices<E: ExecutionEngine>(
    engine: &E,
    prototype: &dyn Kernel,
    burst: &NextSamples,
) -> Result<Vec<DMatrix<f64>>> {
    let (p, q) = (burst.at(0)?, burst.at(1)?);
    engine
        .execute_batch(burst.num_blocks(), |i| {
            let merged = DenseFeatures::merged(&p[i], &q[i])?.into_shared();
            let mut kernel = prototype.box_clone();
            kernel.init(Arc::clone(&merged), merged)?;
            kernel_matrix(kernel.as_ref(), &SequentialEngine)
        })
        .into_iter()
        .collect()
}

/// One permuted statistic per block, with permutations drawn in block order
fn permuted_statistics<E: ExecutionEngine>(
    engine: &E,
    rng: &mut ChaCha8Rng,
    compute: &ComputeMmd,
    matrices: &[DMatrix<f64>],
) -> Result<Vec<f64>> {
    let permutations: Vec<Vec<usize>> = matrices
        .iter()
        .map(|_| random_permutation(rng, compute.num_samples()))
        .collect();
    engine
        .execute_batch(matrices.len(), |i| {
            compute.compute_permuted(&matrices[i], &permutations[i])
        })
        .into_iter()
        .collect()
}

impl<S: BlockScheme> MmdEstimator for StreamingMmd<S> {
    fn name(&self) -> &'static str {
        S::NAME
    }

    fn set_kernel(&mut self, kernel: Box<dyn Kernel>) -> Result<()> {
        if kernel.is_precomputed() {
            return Err(Error::Precondition(
                "a precomputed kernel cannot be rebound to streamed blocks".to_string(),
            ));
        }
        self.kernels.set_kernel_at(0, kernel)
    }

    fn kernel(&self) -> Result<&dyn Kernel> {
        self.kernels.kernel_at(0)
    }

    #[instrument(skip(self), fields(estimator = S::NAME, variance = ?self.variance_estimation))]
    fn compute_statistic_variance(&mut self) -> Result<StatisticVariance> {
        let compute = self.configure()?;
        let Self {
            data,
            kernels,
            rng,
            engine,
            variance_estimation,
            ..
        } = self;
        let engine: &AutoEngine = engine;
        let prototype = streaming_kernel(kernels)?;

        let mut statistics = RunningMoments::new();
        let mut permuted = RunningMoments::new();
        let mut stream = data.stream()?;
        for burst in &mut stream {
            let matrices = block_kernel_matrices(engine, prototype, &burst?)?;
            let values = engine.execute_batch(matrices.len(), |i| compute.compute(&matrices[i]));
            for value in values {
                statistics.push(value?);
            }
            if *variance_estimation == VarianceEstimation::Permutation {
                permuted.extend(permuted_statistics(engine, rng, &compute, &matrices)?);
            }
        }
        stream.finish()?;

        let num_blocks = statistics.count();
        let layout = consumed_layout(num_blocks, &compute, data)?;
        let statistic = normalize_btest_statistic(statistics.mean(), &layout)?;

        let spread = match variance_estimation {
            VarianceEstimation::Direct => statistics.sample_variance(),
            VarianceEstimation::Permutation => permuted.sample_variance(),
        };
        let mut diagnostics = Diagnostics::empty();
        let raw = match spread {
            Some(v) => normalize_btest_variance(v, &layout)?,
            None => {
                debug!("single block, variance set to zero");
                diagnostics |= Diagnostics::SINGLE_BLOCK;
                0.0
            }
        };
        let variance = finalize_variance(raw)?;
        diagnostics |= variance.diagnostics;

        debug!(statistic, variance = variance.value, num_blocks, "streaming pass finished");
        Ok(StatisticVariance {
            statistic,
            variance: variance.value,
            num_blocks,
            diagnostics,
        })
    }

    fn normalize_statistic(&self, statistic: f64) -> Result<f64> {
        normalize_btest_statistic(statistic, &self.configured_layout()?)
    }

    fn normalize_variance(&self, variance: f64) -> Result<f64> {
        normalize_btest_variance(variance, &self.configured_layout()?)
    }

    fn pooled_samples(&mut self, max_per_distribution: usize) -> Result<Arc<dyn Features>> {
        self.configure()?;
        let mut taken = [Vec::new(), Vec::new()];
        let mut stream = self.data.stream()?;
        for burst in &mut stream {
            let burst = burst?;
            for (d, samples) in taken.iter_mut().enumerate() {
                for block in burst.at(d)? {
                    for i in 0..block.num_vectors() {
                        if samples.len() < max_per_distribution {
                            samples.push(block.vector(i)?.to_vec());
                        }
                    }
                }
            }
            if taken.iter().all(|s| s.len() >= max_per_distribution) {
                break;
            }
        }
        stream.finish()?;
        let [p, q] = taken;
        let pooled: Vec<Vec<f64>> = p.into_iter().chain(q).collect();
        Ok(DenseFeatures::from_vectors(&pooled)?.into_shared())
    }

    fn cleanup(&mut self) {
        self.kernels.restore_all();
    }
}

impl<S: BlockScheme> TwoSampleTest for StreamingMmd<S> {
    fn null_approximation(&self) -> NullApproximation {
        self.null_approximation
    }

    /// Each null sample averages one within-block permuted statistic per block
    #[instrument(skip(self), fields(estimator = S::NAME, num_null_samples = self.num_null_samples))]
    fn sample_null(&mut self) -> Result<Vec<f64>> {
        if self.num_null_samples == 0 {
            return Err(Error::Precondition(
                "number of null samples must be positive".to_string(),
            ));
        }
        let compute = self.configure()?;
        let Self {
            data,
            kernels,
            rng,
            engine,
            num_null_samples,
            ..
        } = self;
        let engine: &AutoEngine = engine;
        let prototype = streaming_kernel(kernels)?;

        let mut null = vec![RunningMoments::new(); *num_null_samples];
        let mut num_blocks = 0;
        let mut stream = data.stream()?;
        for burst in &mut stream {
            let matrices = block_kernel_matrices(engine, prototype, &burst?)?;
            num_blocks += matrices.len();
            for moments in null.iter_mut() {
                moments.extend(permuted_statistics(engine, rng, &compute, &matrices)?);
            }
        }
        stream.finish()?;

        let layout = consumed_layout(num_blocks, &compute, data)?;
        null.iter()
            .map(|moments| normalize_btest_statistic(moments.mean(), &layout))
            .collect()
    }
}
