//! Feature collections consumed by kernels and blocks
//!
//! Samples are fixed-dimension real vectors addressed by index. Collections
//! are shared behind `Arc<dyn Features>` so that any number of blocks and
//! kernels can read the same data without copying it.

use crate::{Error, Result};
use nalgebra::DMatrix;
use std::fmt;
use std::sync::Arc;

/// An indexable collection of equally-sized real vectors
pub trait Features: Send + Sync + fmt::Debug {
    /// Number of sample vectors in the collection
    fn num_vectors(&self) -> usize;

    /// Dimension of every vector
    fn dim(&self) -> usize;

    /// Borrow the vector at `index`, or `None` when out of range
    fn get_vector(&self, index: usize) -> Option<&[f64]>;

    /// Borrow the vector at `index`, failing with an index error when out of range
    fn vector(&self, index: usize) -> Result<&[f64]> {
        self.get_vector(index)
            .ok_or_else(|| Error::index(index, self.num_vectors(), "feature vectors"))
    }

    fn is_empty(&self) -> bool {
        self.num_vectors() == 0
    }
}

/// Dense, owned feature storage with one contiguous vector per sample
#[derive(Clone, PartialEq)]
pub struct DenseFeatures {
    data: Vec<f64>,
    dim: usize,
}

impl DenseFeatures {
    /// Build from a flat buffer holding `data.len() / dim` consecutive vectors
    pub fn new(dim: usize, data: Vec<f64>) -> Result<Self> {
        if dim == 0 {
            return Err(Error::InvalidArgument(
                "feature dimension must be positive".to_string(),
            ));
        }
        if data.len() % dim != 0 {
            return Err(Error::InvalidArgument(format!(
                "buffer of length {} is not a whole number of {dim}-dimensional vectors",
                data.len()
            )));
        }
        Ok(Self { data, dim })
    }

    /// Build from a list of sample vectors, all of the same dimension
    pub fn from_vectors<V: AsRef<[f64]>>(vectors: &[V]) -> Result<Self> {
        let dim = vectors.first().map(|v| v.as_ref().len()).ok_or_else(|| {
            Error::InsufficientData {
                expected: 1,
                actual: 0,
            }
        })?;
        let mut data = Vec::with_capacity(dim * vectors.len());
        for v in vectors {
            let v = v.as_ref();
            if v.len() != dim {
                return Err(Error::size_mismatch(dim, v.len(), "sample vector"));
            }
            data.extend_from_slice(v);
        }
        Self::new(dim, data)
    }

    /// Build from a matrix whose columns are the samples
    pub fn from_matrix(matrix: &DMatrix<f64>) -> Result<Self> {
        Self::new(matrix.nrows(), matrix.as_slice().to_vec())
    }

    /// Copy every vector of `p` followed by every vector of `q` into one collection
    pub fn merged(p: &dyn Features, q: &dyn Features) -> Result<Self> {
        if p.dim() != q.dim() {
            return Err(Error::size_mismatch(p.dim(), q.dim(), "merged feature dimension"));
        }
        let mut data = Vec::with_capacity(p.dim() * (p.num_vectors() + q.num_vectors()));
        for source in [p, q] {
            for i in 0..source.num_vectors() {
                data.extend_from_slice(source.vector(i)?);
            }
        }
        Self::new(p.dim(), data)
    }

    /// Wrap into a shared handle
    pub fn into_shared(self) -> Arc<dyn Features> {
        Arc::new(self)
    }

    /// Flat view of the underlying buffer
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

impl fmt::Debug for DenseFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DenseFeatures")
            .field("num_vectors", &self.num_vectors())
            .field("dim", &self.dim)
            .finish()
    }
}

impl Features for DenseFeatures {
    fn num_vectors(&self) -> usize {
        self.data.len() / self.dim
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn get_vector(&self, index: usize) -> Option<&[f64]> {
        let start = index.checked_mul(self.dim)?;
        self.data.get(start..start + self.dim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_features_layout() {
        let f = DenseFeatures::new(2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(f.num_vectors(), 3);
        assert_eq!(f.dim(), 2);
        assert_eq!(f.vector(1).unwrap(), &[3.0, 4.0]);
        assert!(f.get_vector(3).is_none());
        assert!(matches!(f.vector(3), Err(Error::Index { index: 3, len: 3, .. })));
    }

    #[test]
    fn test_invalid_buffers() {
        assert!(DenseFeatures::new(0, vec![]).is_err());
        assert!(DenseFeatures::new(2, vec![1.0, 2.0, 3.0]).is_err());
        assert!(DenseFeatures::from_vectors(&[vec![1.0], vec![1.0, 2.0]]).is_err());
        let empty: Vec<Vec<f64>> = Vec::new();
        assert!(DenseFeatures::from_vectors(&empty).is_err());
    }

    #[test]
    fn test_from_matrix_uses_columns() {
        let m = DMatrix::from_column_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let f = DenseFeatures::from_matrix(&m).unwrap();
        assert_eq!(f.num_vectors(), 3);
        assert_eq!(f.vector(2).unwrap(), &[5.0, 6.0]);
    }

    #[test]
    fn test_merged_copy() {
        let p = DenseFeatures::from_vectors(&[[0.0, 0.0], [1.0, 1.0]]).unwrap();
        let q = DenseFeatures::from_vectors(&[[5.0, 5.0]]).unwrap();
        let m = DenseFeatures::merged(&p, &q).unwrap();
        assert_eq!(m.num_vectors(), 3);
        assert_eq!(m.vector(0).unwrap(), &[0.0, 0.0]);
        assert_eq!(m.vector(2).unwrap(), &[5.0, 5.0]);

        let r = DenseFeatures::from_vectors(&[[1.0, 2.0, 3.0]]).unwrap();
        assert!(DenseFeatures::merged(&p, &r).is_err());
    }
}
