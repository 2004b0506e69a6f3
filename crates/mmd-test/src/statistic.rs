//! MMD² of one block from its merged kernel matrix
//!
//! A block holds `nx` samples of `p` followed by `ny` samples of `q`. Its
//! kernel matrix over the merged samples has the `k(X,X)`, `k(Y,Y)` and
//! `k(X,Y)` sub-blocks the estimators are built from. Permuted statistics
//! read the same matrix through an index permutation, so permutation never
//! re-evaluates the kernel.

use crate::types::StatisticType;
use mmd_core::{Error, Result};
use nalgebra::DMatrix;

/// Block MMD² estimator for a fixed block shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputeMmd {
    nx: usize,
    ny: usize,
    statistic_type: StatisticType,
}

impl ComputeMmd {
    pub fn new(nx: usize, ny: usize, statistic_type: StatisticType) -> Result<Self> {
        if statistic_type != StatisticType::BiasedFull && (nx < 2 || ny < 2) {
            return Err(Error::InvalidArgument(format!(
                "unbiased MMD needs at least 2 samples per distribution, got {nx} and {ny}"
            )));
        }
        if nx == 0 || ny == 0 {
            return Err(Error::InsufficientData {
                expected: 1,
                actual: 0,
            });
        }
        if statistic_type == StatisticType::UnbiasedIncomplete && nx != ny {
            return Err(Error::InvalidArgument(format!(
                "incomplete MMD needs equal sample sizes, got {nx} and {ny}"
            )));
        }
        Ok(Self {
            nx,
            ny,
            statistic_type,
        })
    }

    pub fn num_samples(&self) -> usize {
        self.nx + self.ny
    }

    fn check_shape(&self, km: &DMatrix<f64>) -> Result<()> {
        let n = self.num_samples();
        if km.shape() != (n, n) {
            return Err(Error::InvalidArgument(format!(
                "kernel matrix is {}x{}, expected {n}x{n}",
                km.nrows(),
                km.ncols()
            )));
        }
        Ok(())
    }

    /// MMD² of the block
    pub fn compute(&self, km: &DMatrix<f64>) -> Result<f64> {
        self.check_shape(km)?;
        Ok(self.evaluate(|i, j| km[(i, j)]))
    }

    /// MMD² of the block after relabelling sample `i` as sample `permutation[i]`
    pub fn compute_permuted(&self, km: &DMatrix<f64>, permutation: &[usize]) -> Result<f64> {
        self.check_shape(km)?;
        if permutation.len() != self.num_samples() {
            return Err(Error::size_mismatch(
                self.num_samples(),
                permutation.len(),
                "permutation",
            ));
        }
        if let Some(&bad) = permutation.iter().find(|&&p| p >= self.num_samples()) {
            return Err(Error::index(bad, self.num_samples(), "permutation target"));
        }
        Ok(self.evaluate(|i, j| km[(permutation[i], permutation[j])]))
    }

    fn evaluate<K: Fn(usize, usize) -> f64>(&self, k: K) -> f64 {
        let (nx, ny) = (self.nx, self.ny);
        let include_diagonal = self.statistic_type == StatisticType::BiasedFull;

        let within = |offset: usize, n: usize| {
            let mut sum = 0.0;
            for i in 0..n {
                for j in 0..n {
                    if include_diagonal || i != j {
                        sum += k(offset + i, offset + j);
                    }
                }
            }
            let terms = if include_diagonal { n * n } else { n * (n - 1) };
            sum / terms as f64
        };
        let xx = within(0, nx);
        let yy = within(nx, ny);

        let skip_cross_diagonal = self.statistic_type == StatisticType::UnbiasedIncomplete;
        let mut xy_sum = 0.0;
        for i in 0..nx {
            for j in 0..ny {
                if !(skip_cross_diagonal && i == j) {
                    xy_sum += k(i, nx + j);
                }
            }
        }
        let xy_terms = if skip_cross_diagonal {
            nx * (ny - 1)
        } else {
            nx * ny
        };
        xx + yy - 2.0 * xy_sum / xy_terms as f64
    }
}

/// First-order estimate of the variance of the incomplete U-statistic MMD²
///
/// With `h_ij = k(x_i,x_j) + k(y_i,y_j) - k(x_i,y_j) - k(x_j,y_i)` for `i != j`
/// and `h_i` the row mean of `h`, the estimate is
/// `4/m * (mean(h_i^2) - mean(h)^2)`. Needs `m = nx = ny >= 2`. The value can
/// come out slightly negative through rounding.
pub fn first_order_variance(km: &DMatrix<f64>, m: usize) -> Result<f64> {
    if m < 2 {
        return Err(Error::InsufficientData {
            expected: 2,
            actual: m,
        });
    }
    if km.shape() != (2 * m, 2 * m) {
        return Err(Error::InvalidArgument(format!(
            "kernel matrix is {}x{}, expected {n}x{n}",
            km.nrows(),
            km.ncols(),
            n = 2 * m
        )));
    }
    let h = |i: usize, j: usize| {
        km[(i, j)] + km[(m + i, m + j)] - km[(i, m + j)] - km[(j, m + i)]
    };

    let mut total = 0.0;
    let mut squared_row_means = 0.0;
    for i in 0..m {
        let row: f64 = (0..m).filter(|&j| j != i).map(|j| h(i, j)).sum();
        total += row;
        let row_mean = row / (m - 1) as f64;
        squared_row_means += row_mean * row_mean;
    }
    let mean = total / (m * (m - 1)) as f64;
    Ok(4.0 / m as f64 * (squared_row_means / m as f64 - mean * mean))
}
