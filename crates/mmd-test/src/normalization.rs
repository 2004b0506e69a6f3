//! Scaling of raw block statistics to test statistics
//!
//! For the block test with `K` blocks of `Bx + By` samples, the mean block
//! statistic is scaled by `Nx*Ny*sqrt((Bx+By)/(Nx+Ny))/(Nx+Ny)`, which equals
//! `sqrt(K) * Bx*By/(Bx+By)`. The sample variance of the block statistics is
//! scaled by `(Bx*By/(Bx+By))^2`, so that it is the variance of the scaled
//! statistic. The quadratic-time test is the single-block case, scaled by
//! `Nx*Ny/(Nx+Ny)` and its square.

use mmd_core::{Error, Result};

/// Sample counts and block sizes of a block test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    /// Samples drawn from `p`
    pub nx: usize,
    /// Samples drawn from `q`
    pub ny: usize,
    /// Samples of `p` per block
    pub bx: usize,
    /// Samples of `q` per block
    pub by: usize,
}

impl BlockLayout {
    pub fn new(nx: usize, ny: usize, bx: usize, by: usize) -> Self {
        Self { nx, ny, bx, by }
    }
}

/// Scale a mean block statistic by `Nx*Ny*sqrt((Bx+By)/(Nx+Ny))/(Nx+Ny)`
pub fn normalize_btest_statistic(statistic: f64, layout: &BlockLayout) -> Result<f64> {
    let n = (layout.nx + layout.ny) as f64;
    let b = (layout.bx + layout.by) as f64;
    if n == 0.0 {
        return Err(Error::division_by_zero("normalize_statistic (Nx + Ny)"));
    }
    if b == 0.0 {
        return Err(Error::division_by_zero("normalize_statistic (Bx + By)"));
    }
    let (nx, ny) = (layout.nx as f64, layout.ny as f64);
    Ok(statistic * nx * ny * (b / n).sqrt() / n)
}

/// Scale a block-statistic variance by `(Bx*By/(Bx+By))^2`
pub fn normalize_btest_variance(variance: f64, layout: &BlockLayout) -> Result<f64> {
    let b = (layout.bx + layout.by) as f64;
    if layout.nx + layout.ny == 0 {
        return Err(Error::division_by_zero("normalize_variance (Nx + Ny)"));
    }
    if b == 0.0 {
        return Err(Error::division_by_zero("normalize_variance (Bx + By)"));
    }
    let factor = layout.bx as f64 * layout.by as f64 / b;
    Ok(variance * factor * factor)
}

/// Scale a full-sample statistic by `Nx*Ny/(Nx+Ny)`
pub fn normalize_quadratic_statistic(statistic: f64, nx: usize, ny: usize) -> Result<f64> {
    if nx + ny == 0 {
        return Err(Error::division_by_zero("normalize_statistic (Nx + Ny)"));
    }
    Ok(statistic * nx as f64 * ny as f64 / (nx + ny) as f64)
}

/// Scale a full-sample variance by `(Nx*Ny/(Nx+Ny))^2`
pub fn normalize_quadratic_variance(variance: f64, nx: usize, ny: usize) -> Result<f64> {
    if nx + ny == 0 {
        return Err(Error::division_by_zero("normalize_variance (Nx + Ny)"));
    }
    let factor = nx as f64 * ny as f64 / (nx + ny) as f64;
    Ok(variance * factor * factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_btest_values() {
        // 4 blocks of 2 + 2: sqrt(4) * 2*2/4 = 2
        let layout = BlockLayout::new(8, 8, 2, 2);
        assert_relative_eq!(normalize_btest_statistic(0.5, &layout).unwrap(), 1.0);
        assert_relative_eq!(normalize_btest_variance(0.5, &layout).unwrap(), 0.5);

        let layout = BlockLayout::new(10, 15, 2, 3);
        let expected = 0.3 * 150.0 * (5.0f64 / 25.0).sqrt() / 25.0;
        assert_relative_eq!(normalize_btest_statistic(0.3, &layout).unwrap(), expected);
        assert_relative_eq!(normalize_btest_variance(2.0, &layout).unwrap(), 2.0 * 1.44);
    }

    #[test]
    fn test_division_by_zero_is_domain_error() {
        let empty = BlockLayout::new(0, 0, 2, 2);
        assert!(matches!(normalize_btest_statistic(1.0, &empty), Err(Error::Domain(_))));
        assert!(matches!(normalize_btest_variance(1.0, &empty), Err(Error::Domain(_))));

        let no_blocks = BlockLayout::new(8, 8, 0, 0);
        assert!(matches!(normalize_btest_statistic(1.0, &no_blocks), Err(Error::Domain(_))));
        assert!(matches!(normalize_btest_variance(1.0, &no_blocks), Err(Error::Domain(_))));

        assert!(matches!(normalize_quadratic_statistic(1.0, 0, 0), Err(Error::Domain(_))));
        assert!(matches!(normalize_quadratic_variance(1.0, 0, 0), Err(Error::Domain(_))));
    }

    #[test]
    fn test_single_block_matches_quadratic() {
        let layout = BlockLayout::new(6, 6, 6, 6);
        assert_relative_eq!(
            normalize_btest_statistic(0.2, &layout).unwrap(),
            normalize_quadratic_statistic(0.2, 6, 6).unwrap()
        );
        assert_relative_eq!(
            normalize_btest_variance(0.2, &layout).unwrap(),
            normalize_quadratic_variance(0.2, 6, 6).unwrap()
        );
    }
}
