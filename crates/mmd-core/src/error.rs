//! Error types for MMD two-sample testing
//!
//! Provides a unified error type for all mmd-stats crates.

use thiserror::Error;

/// Core error type for kernel two-sample operations
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed argument, e.g. a block layout that does not fit the data
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Setup is incomplete or inconsistent (no kernels, blocksize not set, ...)
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Out-of-range slot or distribution index
    #[error("Index {index} out of range for {context} of length {len}")]
    Index {
        index: usize,
        len: usize,
        context: &'static str,
    },

    /// Numeric operation outside its domain (division by zero, sqrt of a negative)
    #[error("Domain error: {0}")]
    Domain(String),

    /// Operation attempted in the wrong lifecycle phase
    #[error("State error: {0}")]
    State(String),

    /// Insufficient data for the requested operation
    #[error("Insufficient data: expected at least {expected} samples, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    /// Numerical computation error
    #[error("Computation error: {0}")]
    Computation(String),

    /// Malformed input while reading a data source
    #[error("Parse error: {0}")]
    Parse(String),

    /// IO error (for file-backed sources)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an error for an out-of-range index
    pub fn index(index: usize, len: usize, context: &'static str) -> Self {
        Self::Index {
            index,
            len,
            context,
        }
    }

    /// Create an error for a division by a zero denominator
    pub fn division_by_zero(context: &str) -> Self {
        Self::Domain(format!("{context}: denominator is zero"))
    }

    /// Create an error for size mismatch
    pub fn size_mismatch(expected: usize, actual: usize, context: &str) -> Self {
        Self::InvalidArgument(format!(
            "Size mismatch in {context}: expected {expected}, got {actual}"
        ))
    }

    /// Create an error for NaN/Inf values
    pub fn non_finite(context: &str) -> Self {
        Self::Computation(format!("{context} contains NaN or infinite values"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidArgument("3 blocks of 4 exceed 10 samples".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid argument: 3 blocks of 4 exceed 10 samples"
        );

        let err = Error::Precondition("no kernels registered".to_string());
        assert_eq!(err.to_string(), "Precondition failed: no kernels registered");

        let err = Error::index(5, 2, "kernel slots");
        assert_eq!(
            err.to_string(),
            "Index 5 out of range for kernel slots of length 2"
        );

        let err = Error::State("streaming already started".to_string());
        assert_eq!(err.to_string(), "State error: streaming already started");

        let err = Error::InsufficientData {
            expected: 2,
            actual: 1,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient data: expected at least 2 samples, got 1"
        );
    }

    #[test]
    fn test_error_helper_functions() {
        let err = Error::division_by_zero("normalize_statistic");
        assert!(matches!(err, Error::Domain(_)));
        assert_eq!(
            err.to_string(),
            "Domain error: normalize_statistic: denominator is zero"
        );

        let err = Error::size_mismatch(3, 2, "feature dimension");
        assert_eq!(
            err.to_string(),
            "Invalid argument: Size mismatch in feature dimension: expected 3, got 2"
        );

        let err = Error::non_finite("kernel matrix");
        assert_eq!(
            err.to_string(),
            "Computation error: kernel matrix contains NaN or infinite values"
        );
    }

    #[test]
    fn test_error_from_io_error() {
        use std::io;

        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();

        match err {
            Error::Io(_) => assert!(err.to_string().contains("file not found")),
            _ => panic!("Wrong error type"),
        }
    }

    #[test]
    fn test_error_from_anyhow() {
        let err: Error = anyhow::anyhow!("custom error message").into();
        assert!(matches!(err, Error::Other(_)));
        assert!(err.to_string().contains("custom error message"));
    }
}
