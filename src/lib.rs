//! `survhive` provides the building blocks for penalized survival analysis in Rust.
//!
//! Kin in spirit to `linfa` and Python's `scikit-survival`, the framework crate holds the pieces
//! every survival estimator shares:
//!
//! * [`SurvivalDataset`], a feature matrix paired with right-censored outcomes,
//! * the signed target encoding ([`transform_survival`], [`inverse_transform_survival`]),
//! * an event-stratified K-fold splitter ([`StratifiedKFold`]),
//! * the [`Fit`](traits::Fit) / [`Predict`](traits::Predict) traits and [`ParamGuard`] for
//!   checked hyper-parameters.
//!
//! The estimators themselves live in the algorithm crates, for example `survhive-penalized`
//! which fits sparse Cox, accelerated hazards and accelerated failure time models along an entire
//! regularization path.

pub mod dataset;
pub mod error;
mod param_guard;
pub mod prelude;
pub mod traits;

pub use dataset::{
    inverse_transform_survival, transform_survival, Float, StratifiedKFold, SurvivalDataset,
};
pub use error::Error;
pub use param_guard::ParamGuard;
