//! Iteratively reweighted least squares for the penalized partial likelihood
//!
//! Every IRLS step replaces the loss by its second order expansion around the current linear
//! predictor, with the diagonal Hessian as sample weights. The resulting weighted elastic net
//! problem ([`WeightedSubproblem`]) is solved by coordinate descent on the working set, which is grown until the KKT
//! conditions of the subproblem hold for every feature.
use log::{debug, trace, warn};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};
use survhive::Float;

use crate::coordinate_descent::WeightedSubproblem;
use crate::error::{Result, SurvivalError};
use crate::hyperparams::SurvivalModelValidParams;
use crate::screening::ActiveSet;

/// Rows of the design with positive Hessian weight
///
/// The selection is kept between IRLS steps and only rebuilt when the set of samples with
/// positive weight changes.
#[derive(Clone, Debug, Default)]
pub(crate) struct WeightedDesign<F> {
    mask: Vec<bool>,
    rows: Vec<usize>,
    records: Array2<F>,
    rebuilds: usize,
}

impl<F: Float> WeightedDesign<F> {
    pub(crate) fn new() -> Self {
        WeightedDesign {
            mask: Vec::new(),
            rows: Vec::new(),
            records: Array2::zeros((0, 0)),
            rebuilds: 0,
        }
    }

    /// Update the mask for a new Hessian, returns `true` if the previous rows were reused
    pub(crate) fn update(&mut self, x: ArrayView2<F>, hessian: ArrayView1<F>) -> bool {
        let mask = hessian.iter().map(|h| *h > F::zero()).collect::<Vec<_>>();
        if mask == self.mask && self.records.ncols() == x.ncols() {
            return true;
        }

        self.rows = mask
            .iter()
            .enumerate()
            .filter(|(_, m)| **m)
            .map(|(i, _)| i)
            .collect();
        self.records = x.select(Axis(0), &self.rows);
        self.mask = mask;
        self.rebuilds += 1;
        false
    }

    pub(crate) fn rows(&self) -> &[usize] {
        &self.rows
    }

    /// Columns of the masked design, each row scaled by its square root weight
    pub(crate) fn weighted(&self, columns: &[usize], sqrt_weights: &Array1<F>) -> Array2<F> {
        let mut design = self.records.select(Axis(1), columns);
        Zip::from(design.rows_mut())
            .and(sqrt_weights)
            .for_each(|mut row, &w| row *= w);
        design
    }
}

/// Mutable state carried along the regularization path
pub(crate) struct SolverState<F> {
    pub(crate) coef: Array1<F>,
    pub(crate) eta: Array1<F>,
    pub(crate) active: ActiveSet,
    pub(crate) alpha_previous: Option<F>,
    design: WeightedDesign<F>,
}

impl<F: Float> SolverState<F> {
    pub(crate) fn new(n_samples: usize, n_features: usize) -> Self {
        SolverState {
            coef: Array1::zeros(n_features),
            eta: Array1::zeros(n_samples),
            active: ActiveSet::new(n_features),
            alpha_previous: None,
            design: WeightedDesign::new(),
        }
    }

    /// Forget the previous solution
    pub(crate) fn reset(&mut self) {
        self.coef.fill(F::zero());
        self.eta.fill(F::zero());
        self.active = ActiveSet::new(self.coef.len());
        self.alpha_previous = None;
    }
}

/// Samples of a time-sorted training set
#[derive(Clone, Copy)]
pub(crate) struct SortedSample<'a, F> {
    pub(crate) records: ArrayView2<'a, F>,
    pub(crate) time: ArrayView1<'a, F>,
    pub(crate) event: ArrayView1<'a, bool>,
    pub(crate) weights: Option<ArrayView1<'a, F>>,
}

/// Solve the penalized problem at `alpha`, starting from the state of the previous alpha
///
/// Returns the number of IRLS steps.
pub(crate) fn irls_alpha<F: Float>(
    sample: SortedSample<F>,
    params: &SurvivalModelValidParams<F>,
    alpha: F,
    state: &mut SolverState<F>,
) -> Result<u32> {
    let x = sample.records;
    let loss = params.loss();
    let l1_ratio = params.l1_ratio();
    let threshold = alpha * l1_ratio;
    let alpha_f32 = alpha.to_f32().unwrap_or(f32::NAN);

    // SCREEN
    let gradient = loss.gradient(state.eta.view(), sample.time, sample.event, sample.weights);
    let alpha_previous = state.alpha_previous.unwrap_or(alpha);
    state
        .active
        .compute_strong_set(x, gradient.view(), alpha, alpha_previous, l1_ratio);
    trace!(
        "alpha {}: strong set of {} features, working set of {}",
        alpha,
        state.active.strong().len(),
        state.active.working_len()
    );

    let mut converged = false;
    let mut n_iter = 0;
    while n_iter < params.max_iter() {
        n_iter += 1;

        // REWEIGHT
        let (gradient, hessian) =
            loss.gradient_hessian(state.eta.view(), sample.time, sample.event, sample.weights)?;
        let reused = state.design.update(x, hessian.view());
        let rows = state.design.rows().to_vec();
        if rows.is_empty() {
            return Err(SurvivalError::EmptyHessianMask(alpha_f32));
        }

        let subproblem =
            WeightedSubproblem::new(&rows, state.eta.view(), gradient.view(), hessian.view());
        debug!(
            "alpha {} step {}: {} weighted samples{}",
            alpha,
            n_iter,
            rows.len(),
            if reused { ", mask reused" } else { "" }
        );

        let previous = state.coef.clone();
        let mut rounds = 0;
        loop {
            // FIT
            let working = state.active.working();
            if !working.is_empty() {
                let start = state.coef.select(Axis(0), &working);
                let (coef, sweeps) = subproblem.solve(
                    &state.design,
                    &working,
                    start,
                    alpha,
                    l1_ratio,
                    params.inner_tol(),
                    params.inner_max_iter(),
                );
                trace!("alpha {}: {} coordinate descent sweeps", alpha, sweeps);
                for (k, &j) in working.iter().enumerate() {
                    state.coef[j] = coef[k];
                }
            }

            // VERIFY on the gradient of the quadratic model
            let eta = x.dot(&state.coef);
            let mut model_gradient = Array1::zeros(eta.len());
            for (&i, z) in rows.iter().zip(subproblem.response()) {
                model_gradient[i] = hessian[i] * (eta[i] - *z);
            }

            let violations =
                state
                    .active
                    .check_kkt_strong(x, model_gradient.view(), threshold);
            if !violations.is_empty() {
                debug!("alpha {}: {} strong set violations", alpha, violations.len());
                state
                    .active
                    .expand_working_set_with_kkt_violations(&violations);
            } else {
                let violations = state.active.check_kkt_all(x, model_gradient.view(), threshold);
                if violations.is_empty() {
                    state.eta = eta;
                    break;
                }
                debug!("alpha {}: {} violations outside the strong set", alpha, violations.len());
                state
                    .active
                    .expand_working_set_with_overall_violations(&violations);
            }

            rounds += 1;
            if rounds >= params.max_kkt_rounds() {
                return Err(SurvivalError::KktNotResolved {
                    alpha: alpha_f32,
                    rounds,
                });
            }
        }

        state.active.record_active(state.coef.view());
        let change = (&state.coef - &previous).fold(F::zero(), |m, d| m.max(d.abs()));
        if change < params.tol() {
            converged = true;
            break;
        }
    }

    if !converged {
        warn!(
            "IRLS did not converge at alpha {} within {} iterations",
            alpha,
            params.max_iter()
        );
    }
    state.alpha_previous = Some(alpha);

    Ok(n_iter)
}
