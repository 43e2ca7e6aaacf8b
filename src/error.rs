//! Error types in survhive
//!

use thiserror::Error;

use ndarray::ShapeError;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("invalid ndarray shape {0}")]
    NdShape(#[from] ShapeError),
    #[error("mismatched number of samples: {records} records but {targets} targets")]
    MismatchedShapes { records: usize, targets: usize },
    #[error("invalid survival target {0}")]
    InvalidTarget(String),
    #[error("invalid sample weights {0}")]
    InvalidWeights(String),
    #[error("cannot split {n_samples} samples into {n_splits} folds")]
    InvalidFolds { n_splits: usize, n_samples: usize },
    #[error("not enough samples")]
    NotEnoughSamples,
}
