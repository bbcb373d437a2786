//! Error types for the neural-network quantum state engine.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VmcError>;

#[derive(Error, Debug)]
pub enum VmcError {
    /// Shapes of a, b and W (or of the group and the visible layer) disagree.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// A configuration does not match the visible layer of the ansatz.
    #[error("configuration has {found} sites, ansatz expects {expected}")]
    ConfigLength { expected: usize, found: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// `fire` was called before `set_state`.
    #[error("config generator is not bound to an ansatz, call set_state first")]
    NotBound,

    /// A sampling pass finished without recording a single measurement.
    #[error("no samples were recorded, nsample must be at least nmeasure")]
    NoSamples,

    #[error("unknown regularization method '{0}'")]
    UnknownRegularization(String),

    /// A numeric setting is out of its valid range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("unsupported dtype '{0}', expected complex128 or float64")]
    UnsupportedDtype(String),

    #[error("group index {index} out of range for group of order {order}")]
    InvalidGroupIndex { index: isize, order: usize },

    #[error("matrix is singular: {0}")]
    SingularMatrix(String),

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
