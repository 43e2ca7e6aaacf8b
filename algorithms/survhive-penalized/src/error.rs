//! An error when fitting a penalized survival model
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SurvivalError>;

/// An error when fitting a penalized survival model
#[derive(Error, Debug, Clone)]
pub enum SurvivalError {
    /// The penalty strength has to be non-negative and finite
    #[error("invalid alpha {0}, has to be non-negative and finite")]
    InvalidAlpha(f32),
    /// The mixing between L1 and L2 penalty has to be in the unit range
    #[error("invalid l1 ratio {0}, has to be in [0, 1]")]
    InvalidL1Ratio(f32),
    #[error("invalid tolerance {0}, has to be positive")]
    InvalidTolerance(f32),
    #[error("maximum number of iterations has to be at least one")]
    InvalidMaxIterations,
    #[error("invalid line search reduction factor {0}, has to be in (0, 1)")]
    InvalidReductionFactor(f32),
    #[error("invalid penalty shape: {0}")]
    InvalidPenaltyShape(String),
    #[error("penalty {0} needs feature groups")]
    MissingGroups(&'static str),
    #[error("invalid feature groups: {0}")]
    InvalidGroups(String),
    #[error("optimiser does not support this configuration: {0}")]
    UnsupportedOptimiser(String),
    #[error("invalid path length, eps {0} has to be in (0, 1)")]
    InvalidEps(f32),
    #[error("the regularization path needs at least one alpha")]
    EmptyAlphas,
    #[error("at least one l1 ratio needed")]
    EmptyL1Ratios,
    #[error("invalid number of folds {0}, at least two needed")]
    InvalidFolds(usize),
    #[error("invalid custom split: {0}")]
    InvalidSplit(String),
    #[error("number of jobs has to be at least one")]
    InvalidJobs,
    #[error("expected {expected} features, found {found}")]
    FeatureMismatch { expected: usize, found: usize },
    #[error("dataset contains no samples")]
    NotEnoughSamples,
    /// Every sample has zero Hessian weight, the IRLS step is undefined
    #[error("all hessian weights vanished at alpha {0}")]
    EmptyHessianMask(f32),
    /// The active set refinement did not reach a KKT point
    #[error("KKT violations remain at alpha {alpha} after {rounds} working set expansions")]
    KktNotResolved { alpha: f32, rounds: usize },
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("cross validation produced no finite score")]
    NoFiniteCvScore,
    #[error("thread pool: {0}")]
    ThreadPool(String),
    #[error(transparent)]
    BaseCrate(#[from] survhive::Error),
}
