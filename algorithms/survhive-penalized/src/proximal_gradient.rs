//! Proximal gradient descent for any loss and penalty
//!
//! The smooth part of the objective is the loss plus the ridge share of the penalty, the sparse
//! share enters through the proximal operator of the configured [`Penalty`](crate::Penalty).
use log::{trace, warn};
use ndarray::Array1;
use survhive::Float;

use crate::error::Result;
use crate::hyperparams::SurvivalModelValidParams;
use crate::irls::SortedSample;
use crate::proximal::ProximalOperator;

/// Halvings of the step before a line search gives up and takes the last candidate
const MAX_BACKTRACKING: usize = 60;

struct Smooth<'a, 'b, F> {
    sample: SortedSample<'a, F>,
    params: &'b SurvivalModelValidParams<F>,
    ridge: F,
}

impl<'a, 'b, F: Float> Smooth<'a, 'b, F> {
    fn value(&self, coef: &Array1<F>) -> F {
        let eta = self.sample.records.dot(coef);
        let loss = self.params.loss().loss(
            eta.view(),
            self.sample.time,
            self.sample.event,
            self.sample.weights,
        );
        loss + F::cast(0.5) * self.ridge * coef.dot(coef)
    }

    fn gradient(&self, coef: &Array1<F>) -> Array1<F> {
        let eta = self.sample.records.dot(coef);
        let gradient = self.params.loss().gradient(
            eta.view(),
            self.sample.time,
            self.sample.event,
            self.sample.weights,
        );
        self.sample.records.t().dot(&gradient) + coef * self.ridge
    }
}

/// Minimize the penalized loss at `alpha` starting from `coef`
///
/// `step` is the step size to start the line search with and is updated to the last accepted
/// step. Without line search every step has length `step`. Returns the coefficients and the
/// number of iterations.
pub(crate) fn proximal_gradient<F: Float>(
    sample: SortedSample<F>,
    params: &SurvivalModelValidParams<F>,
    alpha: F,
    mut coef: Array1<F>,
    step: &mut F,
) -> Result<(Array1<F>, u32)> {
    let l1_ratio = params.l1_ratio();
    let smooth = Smooth {
        sample,
        params,
        ridge: alpha * (F::one() - l1_ratio),
    };
    let reduction = params.line_search_reduction_factor();

    let mut n_iter = 0;
    let mut converged = false;
    while n_iter < params.max_iter() {
        n_iter += 1;

        let value = smooth.value(&coef);
        let gradient = smooth.gradient(&coef);

        let mut s = *step;
        let mut candidate;
        let mut halvings = 0;
        loop {
            let proximal = params
                .penalty()
                .proximal(s * alpha * l1_ratio, params.groups())?;
            candidate = proximal.apply(&coef - &(&gradient * s));
            if !params.line_search() {
                break;
            }

            let diff = &candidate - &coef;
            let bound = value + gradient.dot(&diff) + diff.dot(&diff) / (F::cast(2.) * s);
            let next = smooth.value(&candidate);
            if next <= bound || halvings >= MAX_BACKTRACKING {
                break;
            }
            s *= reduction;
            halvings += 1;
        }
        if halvings > 0 {
            trace!("step reduced to {} after {} halvings", s, halvings);
        }
        *step = s;

        let change = (&candidate - &coef).fold(F::zero(), |m, d| m.max(d.abs()));
        coef = candidate;
        if change < params.tol() {
            converged = true;
            break;
        }
    }

    if !converged {
        warn!(
            "proximal gradient did not converge at alpha {} within {} iterations",
            alpha,
            params.max_iter()
        );
    }

    Ok((coef, n_iter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hyperparams::{Optimiser, SurvivalModelParams};
    use crate::loss::{Bandwidth, LossKind};
    use crate::proximal::{Groups, Penalty};
    use ndarray::array;
    use ndarray_rand::rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;
    use survhive::ParamGuard;
    use survhive_datasets::generate::sparse_cox;

    fn objective(
        sample: SortedSample<f64>,
        params: &SurvivalModelValidParams<f64>,
        alpha: f64,
        coef: &Array1<f64>,
    ) -> f64 {
        let smooth = Smooth {
            sample,
            params,
            ridge: alpha * (1.0 - params.l1_ratio()),
        };
        smooth.value(coef) + alpha * params.l1_ratio() * coef.mapv(f64::abs).sum()
    }

    #[test]
    fn lasso_steps_lower_the_objective() {
        let mut rng = Xoshiro256Plus::seed_from_u64(11);
        let (dataset, _) = sparse_cox(80, 4, 2, 1.0, 0.2, &mut rng);
        let dataset = dataset.sorted_by_time();
        let sample = SortedSample {
            records: dataset.records().view(),
            time: dataset.time().view(),
            event: dataset.event().view(),
            weights: None,
        };
        let params = SurvivalModelParams::new()
            .optimiser(Optimiser::ProximalGradient)
            .l1_ratio(0.7)
            .max_iter(5)
            .check()
            .unwrap();

        let start = Array1::zeros(4);
        let before = objective(sample, &params, 0.01, &start);
        let mut step = 1.0;
        let (coef, n_iter) = proximal_gradient(sample, &params, 0.01, start, &mut step).unwrap();
        assert!(n_iter <= 5);
        assert!(objective(sample, &params, 0.01, &coef) < before);
        assert!(step <= 1.0);
    }

    #[test]
    fn kernel_losses_fit_with_group_penalty() {
        let mut rng = Xoshiro256Plus::seed_from_u64(5);
        let (dataset, _) = sparse_cox(60, 4, 2, 1.0, 0.2, &mut rng);
        let dataset = dataset.sorted_by_time();
        let sample = SortedSample {
            records: dataset.records().view(),
            time: dataset.time().view(),
            event: dataset.event().view(),
            weights: None,
        };
        let groups = Groups::new(vec![vec![0, 1], vec![2, 3]], 4).unwrap();

        let kernels = [
            LossKind::Aft(Bandwidth::Jones1990),
            LossKind::Ah(Bandwidth::Jones1991),
        ];
        for loss in kernels.iter() {
            let params = SurvivalModelParams::new()
                .loss(*loss)
                .optimiser(Optimiser::ProximalGradient)
                .penalty(Penalty::GroupLasso)
                .groups(groups.clone())
                .max_iter(50)
                .check()
                .unwrap();
            let mut step = 1.0;
            let (coef, _) =
                proximal_gradient(sample, &params, 10.0, Array1::zeros(4), &mut step).unwrap();
            // strong penalty zeroes both groups completely
            assert_eq!(coef, array![0.0, 0.0, 0.0, 0.0]);
        }
    }
}
