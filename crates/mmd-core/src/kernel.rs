//! Kernel functions evaluated over pairs of feature collections
//!
//! A [`Kernel`] is initialized on a left and a right feature collection and
//! then answers `compute(a, b)` for index `a` on the left and `b` on the right.
//! Two families exist:
//!
//! - [`FeatureKernel`], which evaluates a [`KernelFunction`] on the fly
//!   (see [`GaussianKernel`] and [`LinearKernel`])
//! - [`PrecomputedKernel`], which serves entries from a materialized Gram matrix
//!
//! Callers never need to know which one they hold. The only capability they
//! may query is [`Kernel::is_precomputed`].

use crate::execution::ExecutionEngine;
use crate::features::Features;
use crate::math::{dot, squared_distance};
use crate::{Error, Result};
use nalgebra::DMatrix;
use std::fmt;
use std::sync::Arc;

/// A positive-definite kernel bound to a left and right feature collection
pub trait Kernel: Send + Sync + fmt::Debug {
    /// Human-readable kernel name, stable across caching
    fn name(&self) -> &str;

    /// Bind the kernel to a left and right feature collection
    fn init(&mut self, lhs: Arc<dyn Features>, rhs: Arc<dyn Features>) -> Result<()>;

    /// Whether both sides are bound
    fn is_initialized(&self) -> bool;

    /// Number of vectors on the left side (0 when unbound)
    fn num_lhs(&self) -> usize;

    /// Number of vectors on the right side (0 when unbound)
    fn num_rhs(&self) -> usize;

    /// Evaluate `k(lhs[a], rhs[b])`
    fn compute(&self, a: usize, b: usize) -> Result<f64>;

    /// Drop the bound feature collections
    fn remove_lhs_and_rhs(&mut self);

    /// Whether evaluations are served from a materialized Gram matrix
    fn is_precomputed(&self) -> bool {
        false
    }

    /// Bandwidth parameter, for kernels that have one
    fn width(&self) -> Option<f64> {
        None
    }

    /// The materialized Gram matrix, for kernels served from one
    fn gram_matrix(&self) -> Option<Arc<DMatrix<f64>>> {
        None
    }

    /// Clone into a new boxed kernel sharing the same bound features
    fn box_clone(&self) -> Box<dyn Kernel>;
}

impl Clone for Box<dyn Kernel> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Evaluate the full `num_lhs x num_rhs` Gram matrix of an initialized kernel
///
/// Rows are computed as independent units on `engine`.
pub fn kernel_matrix<E: ExecutionEngine>(kernel: &dyn Kernel, engine: &E) -> Result<DMatrix<f64>> {
    if !kernel.is_initialized() {
        return Err(Error::Precondition(format!(
            "kernel '{}' has no features bound; call init() first",
            kernel.name()
        )));
    }
    let (rows, cols) = (kernel.num_lhs(), kernel.num_rhs());
    let computed = engine.execute_batch(rows, |a| {
        (0..cols)
            .map(|b| kernel.compute(a, b))
            .collect::<Result<Vec<f64>>>()
    });

    let mut matrix = DMatrix::zeros(rows, cols);
    for (a, row) in computed.into_iter().enumerate() {
        for (b, value) in row?.into_iter().enumerate() {
            matrix[(a, b)] = value;
        }
    }
    Ok(matrix)
}

/// A pointwise kernel function `k(x, y)` on raw vectors
pub trait KernelFunction: Clone + Send + Sync + fmt::Debug + 'static {
    /// Name reported by kernels built from this function
    const NAME: &'static str;

    fn evaluate(&self, x: &[f64], y: &[f64]) -> f64;

    fn width(&self) -> Option<f64> {
        None
    }
}

/// Gaussian RBF `exp(-||x - y||^2 / width)`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Gaussian {
    width: f64,
}

impl Gaussian {
    pub fn new(width: f64) -> Result<Self> {
        if !(width.is_finite() && width > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "Gaussian kernel width must be positive and finite, got {width}"
            )));
        }
        Ok(Self { width })
    }
}

impl KernelFunction for Gaussian {
    const NAME: &'static str = "GaussianKernel";

    #[inline]
    fn evaluate(&self, x: &[f64], y: &[f64]) -> f64 {
        (-squared_distance(x, y) / self.width).exp()
    }

    fn width(&self) -> Option<f64> {
        Some(self.width)
    }
}

/// Linear kernel `<x, y>`
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Linear;

impl KernelFunction for Linear {
    const NAME: &'static str = "LinearKernel";

    #[inline]
    fn evaluate(&self, x: &[f64], y: &[f64]) -> f64 {
        dot(x, y)
    }
}

/// Kernel evaluating a [`KernelFunction`] directly on the bound features
#[derive(Clone)]
pub struct FeatureKernel<K: KernelFunction> {
    function: K,
    lhs: Option<Arc<dyn Features>>,
    rhs: Option<Arc<dyn Features>>,
}

/// Gaussian RBF kernel
pub type GaussianKernel = FeatureKernel<Gaussian>;
/// Linear kernel
pub type LinearKernel = FeatureKernel<Linear>;

impl<K: KernelFunction> FeatureKernel<K> {
    pub fn from_function(function: K) -> Self {
        Self {
            function,
            lhs: None,
            rhs: None,
        }
    }

    pub fn function(&self) -> &K {
        &self.function
    }
}

impl GaussianKernel {
    /// Unbound Gaussian kernel with the given width
    pub fn new(width: f64) -> Result<Self> {
        Ok(Self::from_function(Gaussian::new(width)?))
    }
}

impl LinearKernel {
    pub fn new() -> Self {
        Self::from_function(Linear)
    }
}

impl Default for LinearKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: KernelFunction> fmt::Debug for FeatureKernel<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(K::NAME)
            .field("function", &self.function)
            .field("num_lhs", &self.num_lhs())
            .field("num_rhs", &self.num_rhs())
            .finish()
    }
}

impl<K: KernelFunction> Kernel for FeatureKernel<K> {
    fn name(&self) -> &str {
        K::NAME
    }

    fn init(&mut self, lhs: Arc<dyn Features>, rhs: Arc<dyn Features>) -> Result<()> {
        if lhs.dim() != rhs.dim() {
            return Err(Error::size_mismatch(lhs.dim(), rhs.dim(), "kernel feature dimension"));
        }
        self.lhs = Some(lhs);
        self.rhs = Some(rhs);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.lhs.is_some() && self.rhs.is_some()
    }

    fn num_lhs(&self) -> usize {
        self.lhs.as_ref().map_or(0, |f| f.num_vectors())
    }

    fn num_rhs(&self) -> usize {
        self.rhs.as_ref().map_or(0, |f| f.num_vectors())
    }

    #[inline]
    fn compute(&self, a: usize, b: usize) -> Result<f64> {
        match (&self.lhs, &self.rhs) {
            (Some(lhs), Some(rhs)) => Ok(self.function.evaluate(lhs.vector(a)?, rhs.vector(b)?)),
            _ => Err(Error::Precondition(format!(
                "kernel '{}' has no features bound",
                K::NAME
            ))),
        }
    }

    fn remove_lhs_and_rhs(&mut self) {
        self.lhs = None;
        self.rhs = None;
    }

    fn width(&self) -> Option<f64> {
        self.function.width()
    }

    fn box_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}

/// Kernel backed by a fully materialized Gram matrix
///
/// The matrix is shared, so clones are cheap. Name and width of the kernel it
/// was built from are kept so that selection strategies see the same kernel.
#[derive(Clone, Debug)]
pub struct PrecomputedKernel {
    matrix: Arc<DMatrix<f64>>,
    source_name: String,
    source_width: Option<f64>,
}

impl PrecomputedKernel {
    /// Wrap a user-supplied Gram matrix
    pub fn new(matrix: DMatrix<f64>) -> Self {
        Self {
            matrix: Arc::new(matrix),
            source_name: "PrecomputedKernel".to_string(),
            source_width: None,
        }
    }

    /// Materialize the Gram matrix of an initialized kernel
    pub fn from_kernel<E: ExecutionEngine>(kernel: &dyn Kernel, engine: &E) -> Result<Self> {
        let matrix = kernel_matrix(kernel, engine)?;
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(Error::non_finite("kernel matrix"));
        }
        Ok(Self {
            matrix: Arc::new(matrix),
            source_name: kernel.name().to_string(),
            source_width: kernel.width(),
        })
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }
}

impl Kernel for PrecomputedKernel {
    fn name(&self) -> &str {
        &self.source_name
    }

    /// The matrix is fixed; binding only checks that the sides fit it
    fn init(&mut self, lhs: Arc<dyn Features>, rhs: Arc<dyn Features>) -> Result<()> {
        if lhs.num_vectors() != self.matrix.nrows() {
            return Err(Error::size_mismatch(
                self.matrix.nrows(),
                lhs.num_vectors(),
                "precomputed kernel rows",
            ));
        }
        if rhs.num_vectors() != self.matrix.ncols() {
            return Err(Error::size_mismatch(
                self.matrix.ncols(),
                rhs.num_vectors(),
                "precomputed kernel columns",
            ));
        }
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        true
    }

    fn num_lhs(&self) -> usize {
        self.matrix.nrows()
    }

    fn num_rhs(&self) -> usize {
        self.matrix.ncols()
    }

    #[inline]
    fn compute(&self, a: usize, b: usize) -> Result<f64> {
        if a >= self.matrix.nrows() {
            return Err(Error::index(a, self.matrix.nrows(), "precomputed kernel rows"));
        }
        self.matrix
            .get((a, b))
            .copied()
            .ok_or_else(|| Error::index(b, self.matrix.ncols(), "precomputed kernel columns"))
    }

    fn remove_lhs_and_rhs(&mut self) {}

    fn is_precomputed(&self) -> bool {
        true
    }

    fn width(&self) -> Option<f64> {
        self.source_width
    }

    fn gram_matrix(&self) -> Option<Arc<DMatrix<f64>>> {
        Some(Arc::clone(&self.matrix))
    }

    fn box_clone(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::sequential;
    use crate::features::DenseFeatures;
    use approx::assert_relative_eq;

    fn points() -> Arc<dyn Features> {
        DenseFeatures::from_vectors(&[[0.0, 0.0], [1.0, 0.0], [0.0, 2.0]])
            .unwrap()
            .into_shared()
    }

    #[test]
    fn test_gaussian_values() {
        let mut k = GaussianKernel::new(2.0).unwrap();
        let f = points();
        k.init(f.clone(), f).unwrap();

        assert_relative_eq!(k.compute(0, 0).unwrap(), 1.0);
        assert_relative_eq!(k.compute(0, 1).unwrap(), (-0.5f64).exp());
        assert_relative_eq!(k.compute(1, 2).unwrap(), (-2.5f64).exp());
        assert_eq!(k.width(), Some(2.0));
        assert!(!k.is_precomputed());
    }

    #[test]
    fn test_invalid_width() {
        assert!(GaussianKernel::new(0.0).is_err());
        assert!(GaussianKernel::new(-1.0).is_err());
        assert!(GaussianKernel::new(f64::NAN).is_err());
    }

    #[test]
    fn test_uninitialized_kernel() {
        let k = LinearKernel::new();
        assert!(!k.is_initialized());
        assert!(matches!(k.compute(0, 0), Err(Error::Precondition(_))));
        assert!(kernel_matrix(&k, &sequential()).is_err());
    }

    #[test]
    fn test_linear_kernel_matrix() {
        let mut k = LinearKernel::new();
        let f = points();
        k.init(f.clone(), f).unwrap();
        let m = kernel_matrix(&k, &sequential()).unwrap();
        assert_eq!(m.shape(), (3, 3));
        assert_relative_eq!(m[(2, 2)], 4.0);
        assert_relative_eq!(m[(1, 2)], 0.0);
        assert_relative_eq!(m[(1, 1)], 1.0);
    }

    #[test]
    fn test_precomputed_matches_source() {
        let mut k = GaussianKernel::new(1.5).unwrap();
        let f = points();
        k.init(f.clone(), f.clone()).unwrap();
        let cached = PrecomputedKernel::from_kernel(&k, &sequential()).unwrap();

        assert!(cached.is_precomputed());
        assert_eq!(cached.name(), "GaussianKernel");
        assert_eq!(cached.width(), Some(1.5));
        for a in 0..3 {
            for b in 0..3 {
                assert_relative_eq!(
                    cached.compute(a, b).unwrap(),
                    k.compute(a, b).unwrap(),
                    epsilon = 1e-12
                );
            }
        }
        assert!(matches!(cached.compute(3, 0), Err(Error::Index { .. })));
        assert!(matches!(cached.compute(0, 7), Err(Error::Index { .. })));
    }

    #[test]
    fn test_precomputed_init_checks_shape() {
        let mut cached = PrecomputedKernel::new(DMatrix::identity(3, 3));
        assert!(cached.init(points(), points()).is_ok());
        let two = DenseFeatures::from_vectors(&[[0.0, 0.0], [1.0, 1.0]])
            .unwrap()
            .into_shared();
        assert!(cached.init(two, points()).is_err());
    }
}
