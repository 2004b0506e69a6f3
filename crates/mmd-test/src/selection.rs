//! Kernel selection over the candidates in a [`KernelManager`]
//!
//! A strategy scores every candidate kernel with one number and picks the
//! best one. Ties go to the candidate with the smallest index. Estimator
//! state is cleaned up after each candidate so that no cache built for one
//! kernel is seen while scoring the next.

use crate::estimator::MmdEstimator;
use mmd_core::math::squared_distance;
use mmd_core::{Error, Features, Kernel, KernelManager, Result};
use ordered_float::OrderedFloat;
use tracing::{debug, info, instrument};

/// Whether a strategy prefers large or small measures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionDirection {
    Maximize,
    Minimize,
}

/// The kernel a strategy picked
#[derive(Debug, Clone, Copy)]
pub struct SelectedKernel<'k> {
    pub index: usize,
    pub measure: f64,
    pub kernel: &'k dyn Kernel,
}

/// Index of the best measure, leftmost on ties
pub fn select_index(measures: &[f64], direction: SelectionDirection) -> Result<usize> {
    if measures.is_empty() {
        return Err(Error::Precondition("no kernel measures computed".to_string()));
    }
    if let Some(i) = measures.iter().position(|m| m.is_nan()) {
        return Err(Error::Computation(format!("measure of kernel {i} is NaN")));
    }
    let mut best = 0;
    for (i, &m) in measures.iter().enumerate().skip(1) {
        let better = match direction {
            SelectionDirection::Maximize => m > measures[best],
            SelectionDirection::Minimize => m < measures[best],
        };
        if better {
            best = i;
        }
    }
    Ok(best)
}

/// Score each candidate with `measure`, cleaning the estimator in between
fn measure_kernels<F>(
    kernels: &KernelManager,
    estimator: &mut dyn MmdEstimator,
    measures: &mut Vec<f64>,
    mut measure: F,
) -> Result<()>
where
    F: FnMut(&dyn Kernel, &mut dyn MmdEstimator) -> Result<f64>,
{
    if kernels.is_empty() {
        return Err(Error::Precondition(
            "no candidate kernels registered".to_string(),
        ));
    }
    measures.clear();
    for i in 0..kernels.num_kernels() {
        let kernel = kernels.kernel_at(i)?;
        estimator.set_kernel(kernel.box_clone())?;
        let value = measure(kernel, &mut *estimator);
        estimator.cleanup();
        let value = value?;
        debug!(index = i, kernel = kernel.name(), measure = value, "kernel measured");
        measures.push(value);
    }
    Ok(())
}

/// A strategy choosing one kernel among several candidates
pub trait KernelSelection {
    fn name(&self) -> &'static str;

    fn direction(&self) -> SelectionDirection;

    /// One measure per candidate, in slot order
    fn compute_measures(
        &mut self,
        kernels: &KernelManager,
        estimator: &mut dyn MmdEstimator,
    ) -> Result<&[f64]>;

    /// The candidate with the best measure
    fn select_kernel<'k>(
        &mut self,
        kernels: &'k KernelManager,
        estimator: &mut dyn MmdEstimator,
    ) -> Result<SelectedKernel<'k>> {
        let direction = self.direction();
        let name = self.name();
        let measures = self.compute_measures(kernels, estimator)?;
        let index = select_index(measures, direction)?;
        let measure = measures[index];
        let kernel = kernels.kernel_at(index)?;
        info!(
            strategy = name,
            index,
            measure,
            kernel = kernel.name(),
            "kernel selected"
        );
        Ok(SelectedKernel {
            index,
            measure,
            kernel,
        })
    }
}

pub const DEFAULT_RIDGE: f64 = 1e-5;

/// Maximizes `statistic / sqrt(variance + ridge)`, a proxy for test power
#[derive(Debug, Clone)]
pub struct MaxTestPower {
    ridge: f64,
    measures: Vec<f64>,
}

impl Default for MaxTestPower {
    fn default() -> Self {
        Self {
            ridge: DEFAULT_RIDGE,
            measures: Vec::new(),
        }
    }
}

impl MaxTestPower {
    pub fn new() -> Self {
        Self::default()
    }

    /// Regularizer added to the variance before the square root
    pub fn with_ridge(mut self, ridge: f64) -> Result<Self> {
        if !(ridge.is_finite() && ridge >= 0.0) {
            return Err(Error::InvalidArgument(format!(
                "ridge must be finite and non-negative, got {ridge}"
            )));
        }
        self.ridge = ridge;
        Ok(self)
    }

    pub fn ridge(&self) -> f64 {
        self.ridge
    }

    /// Measures of the last `compute_measures` call
    pub fn measures(&self) -> &[f64] {
        &self.measures
    }
}

impl KernelSelection for MaxTestPower {
    fn name(&self) -> &'static str {
        "max-test-power"
    }

    fn direction(&self) -> SelectionDirection {
        SelectionDirection::Maximize
    }

    #[instrument(skip_all, fields(num_kernels = kernels.num_kernels(), ridge = self.ridge))]
    fn compute_measures(
        &mut self,
        kernels: &KernelManager,
        estimator: &mut dyn MmdEstimator,
    ) -> Result<&[f64]> {
        let ridge = self.ridge;
        measure_kernels(kernels, estimator, &mut self.measures, |_, estimator| {
            let estimate = estimator.compute_statistic_variance()?;
            let denominator = estimate.variance + ridge;
            if denominator <= 0.0 {
                return Err(Error::division_by_zero("test power (variance + ridge)"));
            }
            Ok(estimate.statistic / denominator.sqrt())
        })?;
        Ok(&self.measures)
    }
}

/// Maximizes the normalized statistic
#[derive(Debug, Clone, Default)]
pub struct MaxMmd {
    measures: Vec<f64>,
}

impl MaxMmd {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KernelSelection for MaxMmd {
    fn name(&self) -> &'static str {
        "max-mmd"
    }

    fn direction(&self) -> SelectionDirection {
        SelectionDirection::Maximize
    }

    #[instrument(skip_all, fields(num_kernels = kernels.num_kernels()))]
    fn compute_measures(
        &mut self,
        kernels: &KernelManager,
        estimator: &mut dyn MmdEstimator,
    ) -> Result<&[f64]> {
        measure_kernels(kernels, estimator, &mut self.measures, |_, estimator| {
            Ok(estimator.compute_statistic_variance()?.statistic)
        })?;
        Ok(&self.measures)
    }
}

pub const DEFAULT_MEDIAN_SAMPLES: usize = 1000;

/// Picks the kernel width closest to the median pairwise squared distance
///
/// Works on up to `max_samples` samples of each distribution. The measure is
/// the absolute gap between a kernel's width and the median, so smaller is
/// better. Every candidate must report a width.
#[derive(Debug, Clone)]
pub struct MedianHeuristic {
    max_samples: usize,
    median: Option<f64>,
    measures: Vec<f64>,
}

impl Default for MedianHeuristic {
    fn default() -> Self {
        Self {
            max_samples: DEFAULT_MEDIAN_SAMPLES,
            median: None,
            measures: Vec::new(),
        }
    }
}

impl MedianHeuristic {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_samples(mut self, max_samples: usize) -> Result<Self> {
        if max_samples == 0 {
            return Err(Error::InvalidArgument(
                "median heuristic needs at least one sample".to_string(),
            ));
        }
        self.max_samples = max_samples;
        Ok(self)
    }

    /// Median computed by the last `compute_measures` call
    pub fn median(&self) -> Option<f64> {
        self.median
    }
}

/// Median of the squared distances between distinct samples
pub fn median_squared_distance(samples: &dyn Features) -> Result<f64> {
    let n = samples.num_vectors();
    if n < 2 {
        return Err(Error::InsufficientData {
            expected: 2,
            actual: n,
        });
    }
    let mut distances = Vec::with_capacity(n * (n - 1) / 2);
    for i in 0..n {
        let x = samples.vector(i)?;
        for j in (i + 1)..n {
            distances.push(OrderedFloat(squared_distance(x, samples.vector(j)?)));
        }
    }
    distances.sort_unstable();
    let mid = distances.len() / 2;
    let median = if distances.len() % 2 == 0 {
        (distances[mid - 1].0 + distances[mid].0) / 2.0
    } else {
        distances[mid].0
    };
    Ok(median)
}

impl KernelSelection for MedianHeuristic {
    fn name(&self) -> &'static str {
        "median-heuristic"
    }

    fn direction(&self) -> SelectionDirection {
        SelectionDirection::Minimize
    }

    #[instrument(skip_all, fields(num_kernels = kernels.num_kernels(), max_samples = self.max_samples))]
    fn compute_measures(
        &mut self,
        kernels: &KernelManager,
        estimator: &mut dyn MmdEstimator,
    ) -> Result<&[f64]> {
        if kernels.is_empty() {
            return Err(Error::Precondition(
                "no candidate kernels registered".to_string(),
            ));
        }
        let pooled = estimator.pooled_samples(self.max_samples)?;
        let median = median_squared_distance(pooled.as_ref())?;
        debug!(median, samples = pooled.num_vectors(), "median squared distance");
        self.median = Some(median);

        self.measures.clear();
        for i in 0..kernels.num_kernels() {
            let kernel = kernels.kernel_at(i)?;
            let width = kernel.width().ok_or_else(|| {
                Error::Precondition(format!(
                    "kernel {i} ('{}') has no width for the median heuristic",
                    kernel.name()
                ))
            })?;
            self.measures.push((width - median).abs());
        }
        Ok(&self.measures)
    }
}
