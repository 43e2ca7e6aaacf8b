#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use survhive::{Float, ParamGuard};

use crate::error::{Result, SurvivalError};
use crate::loss::LossKind;
use crate::proximal::{Groups, Penalty};

/// Optimisation backend of a penalized survival model
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Optimiser {
    /// Iteratively reweighted least squares with strong rule screening, only available for the
    /// partial likelihoods combined with the (elastic net) lasso penalty
    Irls,
    /// Proximal gradient descent, available for every loss and penalty
    ProximalGradient,
}

impl Default for Optimiser {
    fn default() -> Self {
        Optimiser::Irls
    }
}

#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct SurvivalModelValidParams<F> {
    pub(crate) loss: LossKind,
    pub(crate) optimiser: Optimiser,
    pub(crate) penalty: Penalty,
    pub(crate) groups: Option<Groups>,
    pub(crate) alpha: F,
    pub(crate) l1_ratio: F,
    pub(crate) line_search: bool,
    pub(crate) line_search_reduction_factor: F,
    pub(crate) warm_start: bool,
    pub(crate) max_iter: u32,
    pub(crate) tol: F,
    pub(crate) inner_max_iter: u32,
    pub(crate) inner_tol: F,
    pub(crate) max_kkt_rounds: usize,
}

impl<F: Float> SurvivalModelValidParams<F> {
    pub fn loss(&self) -> LossKind {
        self.loss
    }

    pub fn optimiser(&self) -> Optimiser {
        self.optimiser
    }

    pub fn penalty(&self) -> Penalty {
        self.penalty
    }

    pub fn groups(&self) -> Option<&Groups> {
        self.groups.as_ref()
    }

    pub fn alpha(&self) -> F {
        self.alpha
    }

    pub fn l1_ratio(&self) -> F {
        self.l1_ratio
    }

    pub fn line_search(&self) -> bool {
        self.line_search
    }

    pub fn line_search_reduction_factor(&self) -> F {
        self.line_search_reduction_factor
    }

    pub fn warm_start(&self) -> bool {
        self.warm_start
    }

    pub fn max_iter(&self) -> u32 {
        self.max_iter
    }

    pub fn tol(&self) -> F {
        self.tol
    }

    pub fn inner_max_iter(&self) -> u32 {
        self.inner_max_iter
    }

    pub fn inner_tol(&self) -> F {
        self.inner_tol
    }

    pub fn max_kkt_rounds(&self) -> usize {
        self.max_kkt_rounds
    }

    /// Same parameters with another penalty strength and mixing
    pub(crate) fn with_alpha(&self, alpha: F, l1_ratio: F) -> Self {
        SurvivalModelValidParams {
            alpha,
            l1_ratio,
            ..self.clone()
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !self.alpha.is_finite() || self.alpha.is_negative() {
            return Err(SurvivalError::InvalidAlpha(
                self.alpha.to_f32().unwrap_or(f32::NAN),
            ));
        }
        if !(F::zero()..=F::one()).contains(&self.l1_ratio) {
            return Err(SurvivalError::InvalidL1Ratio(
                self.l1_ratio.to_f32().unwrap_or(f32::NAN),
            ));
        }
        for tol in &[self.tol, self.inner_tol] {
            if !(*tol > F::zero()) {
                return Err(SurvivalError::InvalidTolerance(
                    tol.to_f32().unwrap_or(f32::NAN),
                ));
            }
        }
        if self.max_iter == 0 || self.inner_max_iter == 0 || self.max_kkt_rounds == 0 {
            return Err(SurvivalError::InvalidMaxIterations);
        }
        if !(self.line_search_reduction_factor > F::zero()
            && self.line_search_reduction_factor < F::one())
        {
            return Err(SurvivalError::InvalidReductionFactor(
                self.line_search_reduction_factor
                    .to_f32()
                    .unwrap_or(f32::NAN),
            ));
        }
        self.penalty.validate(self.groups.as_ref())?;

        if self.optimiser == Optimiser::Irls {
            if !self.loss.supports_irls() {
                return Err(SurvivalError::UnsupportedOptimiser(format!(
                    "IRLS needs a hessian, use the proximal gradient optimiser for {:?}",
                    self.loss
                )));
            }
            if self.penalty != Penalty::Lasso {
                return Err(SurvivalError::UnsupportedOptimiser(format!(
                    "IRLS only supports the lasso penalty, got {}",
                    self.penalty.name()
                )));
            }
        }

        Ok(())
    }
}

/// A hyper-parameter set for a penalized survival model
///
/// Configures and minimizes
/// ```ignore
/// loss(X beta) + alpha * l1_ratio * P(beta) + 0.5 * alpha * (1 - l1_ratio) * ||beta||^2_2
/// ```
/// where `loss` is the negative mean log likelihood of [`LossKind`] and `P` the sparsity
/// inducing [`Penalty`]. For the plain lasso penalty this is the elastic net.
///
/// # Parameters
/// | Name | Default | Purpose | Range |
/// | :--- | :--- | :---| :--- |
/// | [loss](Self::loss) | `Efron` | Likelihood of the survival model | |
/// | [optimiser](Self::optimiser) | `Irls` | Optimisation backend | |
/// | [penalty](Self::penalty) | `Lasso` | Sparsity inducing penalty | |
/// | [groups](Self::groups) | `None` | Feature partition of group penalties | |
/// | [alpha](Self::alpha) | `0.01` | Overall penalty strength | `[0, inf)` |
/// | [l1_ratio](Self::l1_ratio) | `1.0` | Share of the sparse penalty, the rest is ridge | `[0, 1]` |
/// | [line_search](Self::line_search) | `true` | Backtracking in proximal gradient steps | |
/// | [line_search_reduction_factor](Self::line_search_reduction_factor) | `0.5` | Step shrinkage of the line search | `(0, 1)` |
/// | [warm_start](Self::warm_start) | `true` | Start every path point from the previous solution | |
/// | [max_iter](Self::max_iter) | `1000` | Maximum number of outer iterations | `[1, inf)` |
/// | [tol](Self::tol) | `1e-3` | Largest coefficient change at convergence | `(0, inf)` |
/// | [inner_max_iter](Self::inner_max_iter) | `1000` | Maximum coordinate descent sweeps | `[1, inf)` |
/// | [inner_tol](Self::inner_tol) | `1e-7` | Tolerance of the coordinate descent | `(0, inf)` |
/// | [max_kkt_rounds](Self::max_kkt_rounds) | `100` | Working set expansions per IRLS step | `[1, inf)` |
///
/// # Errors
///
/// Returns [`InvalidAlpha`](SurvivalError::InvalidAlpha) if alpha is negative or not finite.
///
/// Returns [`InvalidL1Ratio`](SurvivalError::InvalidL1Ratio) if the l1 ratio is outside of the
/// unit range.
///
/// Returns [`UnsupportedOptimiser`](SurvivalError::UnsupportedOptimiser) if IRLS is combined
/// with a kernel-smoothed likelihood or a penalty other than the lasso.
///
/// Returns [`MissingGroups`](SurvivalError::MissingGroups) if a group penalty has no groups.
///
/// # Example
///
/// ```rust
/// use survhive_penalized::{SurvivalModelParams, SurvivalError, LossKind};
/// use survhive::prelude::*;
/// use ndarray::array;
///
/// let ds = SurvivalDataset::new(
///     array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0], [0.5, 0.2]],
///     array![1.0, 2.0, 3.0, 4.0],
///     array![true, true, false, true],
/// )?;
///
/// let unchecked_params = SurvivalModelParams::new().loss(LossKind::Breslow).alpha(0.05);
///
/// // fit model with unchecked parameter set
/// let model = unchecked_params.fit(&ds)?;
///
/// // transform into a verified parameter set
/// let checked_params = unchecked_params.check()?;
/// let model = checked_params.fit(&ds)?;
/// # Ok::<(), SurvivalError>(())
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct SurvivalModelParams<F>(pub(crate) SurvivalModelValidParams<F>);

impl<F: Float> Default for SurvivalModelParams<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> SurvivalModelParams<F> {
    pub fn new() -> Self {
        Self(SurvivalModelValidParams {
            loss: LossKind::default(),
            optimiser: Optimiser::default(),
            penalty: Penalty::default(),
            groups: None,
            alpha: F::cast(0.01),
            l1_ratio: F::one(),
            line_search: true,
            line_search_reduction_factor: F::cast(0.5),
            warm_start: true,
            max_iter: 1000,
            tol: F::cast(1e-3),
            inner_max_iter: 1000,
            inner_tol: F::cast(1e-7),
            max_kkt_rounds: 100,
        })
    }

    pub fn loss(mut self, loss: LossKind) -> Self {
        self.0.loss = loss;
        self
    }

    pub fn optimiser(mut self, optimiser: Optimiser) -> Self {
        self.0.optimiser = optimiser;
        self
    }

    /// Set the penalty, group penalties also need [`groups`](Self::groups)
    pub fn penalty(mut self, penalty: Penalty) -> Self {
        self.0.penalty = penalty;
        self
    }

    pub fn groups(mut self, groups: Groups) -> Self {
        self.0.groups = Some(groups);
        self
    }

    pub fn alpha(mut self, alpha: F) -> Self {
        self.0.alpha = alpha;
        self
    }

    /// Setting `l1_ratio` to 1.0 penalizes with the sparse penalty only, 0.0 is a ridge penalty
    pub fn l1_ratio(mut self, l1_ratio: F) -> Self {
        self.0.l1_ratio = l1_ratio;
        self
    }

    pub fn line_search(mut self, line_search: bool) -> Self {
        self.0.line_search = line_search;
        self
    }

    pub fn line_search_reduction_factor(mut self, factor: F) -> Self {
        self.0.line_search_reduction_factor = factor;
        self
    }

    pub fn warm_start(mut self, warm_start: bool) -> Self {
        self.0.warm_start = warm_start;
        self
    }

    pub fn max_iter(mut self, max_iter: u32) -> Self {
        self.0.max_iter = max_iter;
        self
    }

    pub fn tol(mut self, tol: F) -> Self {
        self.0.tol = tol;
        self
    }

    pub fn inner_max_iter(mut self, inner_max_iter: u32) -> Self {
        self.0.inner_max_iter = inner_max_iter;
        self
    }

    pub fn inner_tol(mut self, inner_tol: F) -> Self {
        self.0.inner_tol = inner_tol;
        self
    }

    pub fn max_kkt_rounds(mut self, max_kkt_rounds: usize) -> Self {
        self.0.max_kkt_rounds = max_kkt_rounds;
        self
    }
}

impl<F: Float> ParamGuard for SurvivalModelParams<F> {
    type Checked = SurvivalModelValidParams<F>;
    type Error = SurvivalError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        self.0.validate()?;
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

/// Score of a path point on the held out folds
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CvScoreMethod {
    /// Likelihood of the test predictions of all folds pooled into one sample
    LinearPredictor,
    /// Mean likelihood of the test samples of each fold
    Regular,
    /// Verweij and van Houwelingen: likelihood of the full sample minus that of the training
    /// sample, at the coefficients of each fold
    Vvh,
}

impl Default for CvScoreMethod {
    fn default() -> Self {
        CvScoreMethod::LinearPredictor
    }
}

/// How the samples are split into folds
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub enum CvStrategy {
    /// Event stratified K-fold
    KFold(usize),
    /// Given `(train, test)` index pairs
    Custom(Vec<(Vec<usize>, Vec<usize>)>),
}

impl Default for CvStrategy {
    fn default() -> Self {
        CvStrategy::KFold(5)
    }
}

#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct SurvivalModelCvValidParams<F> {
    pub(crate) model: SurvivalModelValidParams<F>,
    pub(crate) cv_score_method: CvScoreMethod,
    pub(crate) l1_ratios: Vec<F>,
    pub(crate) alphas: Option<Vec<F>>,
    pub(crate) eps: F,
    pub(crate) n_alphas: usize,
    pub(crate) cv: CvStrategy,
    pub(crate) n_jobs: Option<usize>,
    pub(crate) random_state: Option<u64>,
}

impl<F: Float> SurvivalModelCvValidParams<F> {
    pub fn model(&self) -> &SurvivalModelValidParams<F> {
        &self.model
    }

    pub fn cv_score_method(&self) -> CvScoreMethod {
        self.cv_score_method
    }

    pub fn l1_ratios(&self) -> &[F] {
        &self.l1_ratios
    }

    pub fn alphas(&self) -> Option<&[F]> {
        self.alphas.as_deref()
    }

    pub fn eps(&self) -> F {
        self.eps
    }

    pub fn n_alphas(&self) -> usize {
        self.n_alphas
    }

    pub fn cv(&self) -> &CvStrategy {
        &self.cv
    }

    pub fn n_jobs(&self) -> Option<usize> {
        self.n_jobs
    }

    pub fn random_state(&self) -> Option<u64> {
        self.random_state
    }
}

/// A hyper-parameter set for the cross-validated selection of `alpha` and `l1_ratio`
///
/// For every l1 ratio a regularization path is fitted on the training part of every fold, the
/// path points are scored on the held out parts and the best `(alpha, l1_ratio)` pair is refitted
/// on the complete dataset.
///
/// # Parameters
/// | Name | Default | Purpose | Range |
/// | :--- | :--- | :---| :--- |
/// | [model](Self::model) | [`SurvivalModelParams::new`] | Loss, optimiser and penalty of the fits | |
/// | [cv_score_method](Self::cv_score_method) | `LinearPredictor` | Scoring of path points | |
/// | [l1_ratios](Self::l1_ratios) | `[1.0]` | Candidate l1 ratios | `[0, 1]` each |
/// | [alphas](Self::alphas) | `None` | Fixed alpha grid, computed from the data if `None` | `[0, inf)` each |
/// | [eps](Self::eps) | `1e-3` | Ratio of the smallest to the largest computed alpha | `(0, 1)` |
/// | [n_alphas](Self::n_alphas) | `100` | Length of the computed alpha grid | `[1, inf)` |
/// | [cv](Self::cv) | `KFold(5)` | Fold construction | at least two folds |
/// | [n_jobs](Self::n_jobs) | `None` | Worker threads, the global pool if `None` | `[1, inf)` |
/// | [random_state](Self::random_state) | `None` | Seed for shuffling the folds | |
#[derive(Clone, Debug, PartialEq)]
pub struct SurvivalModelCvParams<F>(SurvivalModelCvValidParams<F>);

impl<F: Float> Default for SurvivalModelCvParams<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> SurvivalModelCvParams<F> {
    pub fn new() -> Self {
        Self(SurvivalModelCvValidParams {
            model: SurvivalModelParams::new().tol(F::cast(1e-4)).0,
            cv_score_method: CvScoreMethod::default(),
            l1_ratios: vec![F::one()],
            alphas: None,
            eps: F::cast(1e-3),
            n_alphas: 100,
            cv: CvStrategy::default(),
            n_jobs: None,
            random_state: None,
        })
    }

    /// Loss, optimiser, penalty and solver settings of every fit, `alpha` and `l1_ratio` are
    /// ignored
    pub fn model(mut self, model: SurvivalModelParams<F>) -> Self {
        self.0.model = model.0;
        self
    }

    pub fn cv_score_method(mut self, method: CvScoreMethod) -> Self {
        self.0.cv_score_method = method;
        self
    }

    pub fn l1_ratios(mut self, l1_ratios: Vec<F>) -> Self {
        self.0.l1_ratios = l1_ratios;
        self
    }

    pub fn alphas(mut self, alphas: Vec<F>) -> Self {
        self.0.alphas = Some(alphas);
        self
    }

    pub fn eps(mut self, eps: F) -> Self {
        self.0.eps = eps;
        self
    }

    pub fn n_alphas(mut self, n_alphas: usize) -> Self {
        self.0.n_alphas = n_alphas;
        self
    }

    pub fn cv(mut self, cv: CvStrategy) -> Self {
        self.0.cv = cv;
        self
    }

    pub fn n_jobs(mut self, n_jobs: usize) -> Self {
        self.0.n_jobs = Some(n_jobs);
        self
    }

    pub fn random_state(mut self, seed: u64) -> Self {
        self.0.random_state = Some(seed);
        self
    }
}

impl<F: Float> ParamGuard for SurvivalModelCvParams<F> {
    type Checked = SurvivalModelCvValidParams<F>;
    type Error = SurvivalError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        let params = &self.0;
        params.model.validate()?;

        if params.l1_ratios.is_empty() {
            return Err(SurvivalError::EmptyL1Ratios);
        }
        if let Some(bad) = params
            .l1_ratios
            .iter()
            .find(|r| !(F::zero()..=F::one()).contains(*r))
        {
            return Err(SurvivalError::InvalidL1Ratio(
                bad.to_f32().unwrap_or(f32::NAN),
            ));
        }
        match &params.alphas {
            Some(alphas) if alphas.is_empty() => return Err(SurvivalError::EmptyAlphas),
            Some(alphas) => {
                if let Some(bad) = alphas.iter().find(|a| !a.is_finite() || a.is_negative()) {
                    return Err(SurvivalError::InvalidAlpha(
                        bad.to_f32().unwrap_or(f32::NAN),
                    ));
                }
            }
            None => {
                if params.n_alphas == 0 {
                    return Err(SurvivalError::EmptyAlphas);
                }
                if !(params.eps > F::zero() && params.eps < F::one()) {
                    return Err(SurvivalError::InvalidEps(
                        params.eps.to_f32().unwrap_or(f32::NAN),
                    ));
                }
            }
        }
        match &params.cv {
            CvStrategy::KFold(k) if *k < 2 => return Err(SurvivalError::InvalidFolds(*k)),
            CvStrategy::Custom(splits) if splits.is_empty() => {
                return Err(SurvivalError::InvalidSplit("no splits given".into()))
            }
            _ => {}
        }
        if params.n_jobs == Some(0) {
            return Err(SurvivalError::InvalidJobs);
        }

        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::Bandwidth;

    #[test]
    fn default_params_are_valid() {
        assert!(SurvivalModelParams::<f64>::new().check().is_ok());
        assert!(SurvivalModelCvParams::<f64>::new().check().is_ok());
    }

    #[test]
    fn rejects_invalid_model_params() {
        let params = SurvivalModelParams::<f64>::new();
        assert!(matches!(
            params.clone().alpha(-1.0).check(),
            Err(SurvivalError::InvalidAlpha(_))
        ));
        assert!(matches!(
            params.clone().l1_ratio(1.5).check(),
            Err(SurvivalError::InvalidL1Ratio(_))
        ));
        assert!(matches!(
            params.clone().tol(0.0).check(),
            Err(SurvivalError::InvalidTolerance(_))
        ));
        assert!(matches!(
            params.clone().max_kkt_rounds(0).check(),
            Err(SurvivalError::InvalidMaxIterations)
        ));
        assert!(matches!(
            params.clone().line_search_reduction_factor(1.0).check(),
            Err(SurvivalError::InvalidReductionFactor(_))
        ));
    }

    #[test]
    fn irls_needs_partial_likelihood_and_lasso() {
        let params = SurvivalModelParams::<f64>::new();
        assert!(matches!(
            params.clone().loss(LossKind::Aft(Bandwidth::Jones1990)).check(),
            Err(SurvivalError::UnsupportedOptimiser(_))
        ));
        assert!(matches!(
            params.clone().penalty(Penalty::scad()).check(),
            Err(SurvivalError::UnsupportedOptimiser(_))
        ));
        assert!(params
            .penalty(Penalty::scad())
            .optimiser(Optimiser::ProximalGradient)
            .check()
            .is_ok());
    }

    #[test]
    fn rejects_invalid_cv_params() {
        let params = SurvivalModelCvParams::<f64>::new();
        assert!(matches!(
            params.clone().cv(CvStrategy::KFold(1)).check(),
            Err(SurvivalError::InvalidFolds(1))
        ));
        assert!(matches!(
            params.clone().alphas(vec![]).check(),
            Err(SurvivalError::EmptyAlphas)
        ));
        assert!(matches!(
            params.clone().l1_ratios(vec![0.5, 2.0]).check(),
            Err(SurvivalError::InvalidL1Ratio(_))
        ));
        assert!(matches!(
            params.clone().eps(1.0).check(),
            Err(SurvivalError::InvalidEps(_))
        ));
        assert!(matches!(
            params.n_jobs(0).check(),
            Err(SurvivalError::InvalidJobs)
        ));
    }
}
