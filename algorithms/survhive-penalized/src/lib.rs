//! # Penalized survival regression
//!
//! `survhive-penalized` fits sparse survival models along a regularization path and selects the
//! penalty by cross-validation.
//!
//! ## Models
//!
//! * Cox proportional hazards with Breslow or Efron handling of tied event times
//! * accelerated failure time (AFT) and accelerated hazards (AH) models with a kernel-smoothed
//!   likelihood
//!
//! The Cox likelihoods are minimized with iteratively reweighted least squares, restricted to a
//! working set predicted by the sequential strong rule and verified by the KKT conditions. Every
//! model can also be fitted by proximal gradient descent, which supports the group and
//! non-convex penalties of [`Penalty`].
//!
//! ## Example
//!
//! ```rust
//! use survhive::prelude::*;
//! use survhive_penalized::{SurvivalError, SurvivalModel};
//! use ndarray::array;
//!
//! let ds = SurvivalDataset::new(
//!     array![[0.3, 1.0], [1.2, -0.4], [-0.8, 0.1], [0.5, 0.5], [-1.0, -1.0], [0.1, 0.9]],
//!     array![5.0, 1.0, 8.0, 3.0, 9.0, 2.0],
//!     array![true, true, false, true, true, false],
//! )?;
//!
//! let model = SurvivalModel::params().alpha(0.05).fit(&ds)?;
//! let survival = model.predict_survival_function(ds.records(), &array![1.0, 4.0, 10.0])?;
//! assert_eq!(survival.dim(), (6, 3));
//! # Ok::<(), SurvivalError>(())
//! ```

mod coordinate_descent;
mod cv;
mod error;
mod hyperparams;
mod irls;
mod loss;
mod model;
mod path;
mod proximal;
mod proximal_gradient;
mod screening;

pub use cv::SurvivalModelCv;
pub use error::{Result, SurvivalError};
pub use hyperparams::{
    CvScoreMethod, CvStrategy, Optimiser, SurvivalModelCvParams, SurvivalModelCvValidParams,
    SurvivalModelParams, SurvivalModelValidParams,
};
pub use loss::{
    breslow_likelihood, efron_likelihood, Bandwidth, BaselineHazard, KernelBaseline, LossKind,
};
pub use model::SurvivalModel;
pub use path::{alpha_grid, prepare_alphas, regularization_path, PathFit};
pub use proximal::{
    GroupExponentialLassoProximal, GroupLassoProximal, GroupMcpProximal, GroupScadProximal, Groups,
    LassoProximal, McpProximal, Penalty, Proximal, ProximalOperator, ScadProximal,
    SparseGroupLassoProximal,
};
pub use screening::ActiveSet;
