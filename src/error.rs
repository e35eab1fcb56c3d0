//! Error type shared by every fallible operation of the sampler.

use thiserror::Error;

/// Errors raised before or during a chain run.
///
/// Every variant aborts the run; nothing is retried internally.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SamplerError {
    #[error("{what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("observation maps to grid cell {index}, but there are only {n_cells} cells")]
    IndexOutOfRange { index: usize, n_cells: usize },
    #[error("invalid distance matrix: {0}")]
    InvalidDistanceMatrix(String),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("invalid sampler configuration: {0}")]
    InvalidConfig(String),
    #[error("covariance matrix is not positive definite (theta = {theta}, phi = {phi})")]
    NumericalInstability { theta: f64, phi: f64 },
    #[error("cannot continue chain: {0}")]
    InvalidCheckpoint(String),
    #[error("cannot trim {requested} draws from a chain holding {available}")]
    TrimExceedsDraws { requested: usize, available: usize },
}
