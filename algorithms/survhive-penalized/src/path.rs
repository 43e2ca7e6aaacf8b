//! Regularization path
//!
//! Fits a sequence of descending penalty strengths, each warm started from the previous
//! solution.
use log::debug;
use ndarray::{Array1, Array2, ArrayBase, Data, Ix2};
use survhive::{Float, SurvivalDataset};

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use crate::error::Result;
use crate::hyperparams::{Optimiser, SurvivalModelValidParams};
use crate::irls::{irls_alpha, SolverState, SortedSample};
use crate::loss::LossKind;
use crate::proximal_gradient::proximal_gradient;

/// Grid of `n_alphas` penalty strengths from `alpha_max` down to `eps * alpha_max`
///
/// `alpha_max` is the smallest penalty of the lasso with all coefficients at zero,
/// `max_j |x_jᵀ ∇loss(0)| / l1_ratio`. The l1 ratio is bounded below by `1e-3` so ridge paths
/// still get a finite grid. If `alpha_max` vanishes the grid is constant.
pub fn alpha_grid<F: Float>(
    dataset: &SurvivalDataset<F>,
    loss: LossKind,
    l1_ratio: F,
    eps: F,
    n_alphas: usize,
) -> Array1<F> {
    let sorted = dataset.sorted_by_time();
    let eta = Array1::zeros(sorted.nsamples());
    let gradient = loss.gradient(
        eta.view(),
        sorted.time().view(),
        sorted.event().view(),
        sorted.weights().map(|w| w.view()),
    );
    let correlation = sorted.records().t().dot(&gradient);
    let alpha_max = correlation.fold(F::zero(), |m, c| m.max(c.abs()))
        / l1_ratio.max(F::cast(1e-3));

    let resolution = F::cast(1e-15);
    if !(alpha_max > resolution) {
        return Array1::from_elem(n_alphas, resolution);
    }
    if n_alphas == 1 {
        return Array1::from_elem(1, alpha_max);
    }

    let log_max = alpha_max.ln();
    let log_min = (alpha_max * eps).ln();
    let n = F::cast(n_alphas - 1);
    Array1::from_shape_fn(n_alphas, |k| {
        (log_max - (log_max - log_min) * F::cast(k) / n).exp()
    })
}

/// Sort a user supplied grid descending and drop duplicates
pub fn prepare_alphas<F: Float>(alphas: &[F]) -> Vec<F> {
    let mut alphas = alphas.to_vec();
    alphas.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    alphas.dedup();
    alphas
}

/// Fitted regularization path
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct PathFit<F> {
    alphas: Array1<F>,
    coefs: Array2<F>,
    train_eta: Array2<F>,
    working_set_sizes: Vec<usize>,
    n_iter: Vec<u32>,
}

impl<F: Float> PathFit<F> {
    /// Penalty strengths in descending order
    pub fn alphas(&self) -> &Array1<F> {
        &self.alphas
    }

    /// Coefficients, one column per alpha
    pub fn coefs(&self) -> &Array2<F> {
        &self.coefs
    }

    /// Linear predictors of the training samples in the order of the dataset, one column per
    /// alpha
    pub fn train_linear_predictors(&self) -> &Array2<F> {
        &self.train_eta
    }

    /// Linear predictors of other records, one column per alpha
    pub fn predict<D: Data<Elem = F>>(&self, records: &ArrayBase<D, Ix2>) -> Array2<F> {
        records.dot(&self.coefs)
    }

    /// Size of the working set (or the number of non-zero coefficients for proximal gradient)
    /// after each alpha
    pub fn working_set_sizes(&self) -> &[usize] {
        &self.working_set_sizes
    }

    pub fn n_iter(&self) -> &[u32] {
        &self.n_iter
    }
}

/// Fit the model at every alpha of a descending grid
///
/// The samples are sorted by time on an owned copy, the dataset itself is never modified.
pub fn regularization_path<F: Float>(
    dataset: &SurvivalDataset<F>,
    params: &SurvivalModelValidParams<F>,
    alphas: &[F],
) -> Result<PathFit<F>> {
    let sorted = dataset.sorted_by_time();
    let sample = SortedSample {
        records: sorted.records().view(),
        time: sorted.time().view(),
        event: sorted.event().view(),
        weights: sorted.weights().map(|w| w.view()),
    };
    let (n_samples, n_features) = (sorted.nsamples(), sorted.nfeatures());

    let mut coefs = Array2::zeros((n_features, alphas.len()));
    let mut working_set_sizes = Vec::with_capacity(alphas.len());
    let mut n_iter = Vec::with_capacity(alphas.len());

    match params.optimiser() {
        Optimiser::Irls => {
            let mut state = SolverState::new(n_samples, n_features);
            for (k, &alpha) in alphas.iter().enumerate() {
                if !params.warm_start() {
                    state.reset();
                }
                let iterations = irls_alpha(sample, params, alpha, &mut state)?;
                debug!(
                    "alpha {} fitted in {} IRLS steps, working set {}",
                    alpha,
                    iterations,
                    state.active.working_len()
                );
                coefs.column_mut(k).assign(&state.coef);
                working_set_sizes.push(state.active.working_len());
                n_iter.push(iterations);
            }
        }
        Optimiser::ProximalGradient => {
            let mut coef = Array1::zeros(n_features);
            let mut step = F::one();
            for (k, &alpha) in alphas.iter().enumerate() {
                if !params.warm_start() {
                    coef.fill(F::zero());
                    step = F::one();
                }
                let (fitted, iterations) = proximal_gradient(sample, params, alpha, coef, &mut step)?;
                debug!("alpha {} fitted in {} proximal gradient steps", alpha, iterations);
                coefs.column_mut(k).assign(&fitted);
                working_set_sizes.push(fitted.iter().filter(|c| **c != F::zero()).count());
                n_iter.push(iterations);
                coef = fitted;
            }
        }
    }

    Ok(PathFit {
        alphas: Array1::from(alphas.to_vec()),
        train_eta: dataset.records().dot(&coefs),
        coefs,
        working_set_sizes,
        n_iter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hyperparams::SurvivalModelParams;
    use approx::assert_abs_diff_eq;
    use ndarray_rand::rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;
    use survhive::ParamGuard;
    use survhive_datasets::generate::sparse_cox;

    #[test]
    fn alpha_grid_is_strictly_descending() {
        let mut rng = Xoshiro256Plus::seed_from_u64(1);
        let (dataset, _) = sparse_cox(100, 8, 3, 1.0, 0.3, &mut rng);
        let grid = alpha_grid(&dataset, LossKind::Efron, 1.0, 1e-2, 20);

        assert_eq!(grid.len(), 20);
        assert!(grid.windows(2).into_iter().all(|w| w[0] > w[1]));
        assert_abs_diff_eq!(grid[19] / grid[0], 1e-2, epsilon = 1e-10);
    }

    #[test]
    fn first_alpha_zeroes_everything() {
        let mut rng = Xoshiro256Plus::seed_from_u64(2);
        let (dataset, _) = sparse_cox(100, 5, 2, 1.0, 0.3, &mut rng);
        let grid = alpha_grid(&dataset, LossKind::Breslow, 1.0, 1e-2, 5);
        let params = SurvivalModelParams::new()
            .loss(LossKind::Breslow)
            .check()
            .unwrap();

        let path = regularization_path(&dataset, &params, grid.as_slice().unwrap()).unwrap();
        assert!(path.coefs().column(0).iter().all(|c| c.abs() < 1e-8));
        assert!(path.coefs().column(4).iter().any(|c| *c != 0.0));
    }

    #[test]
    fn working_sets_grow_along_the_path() {
        let mut rng = Xoshiro256Plus::seed_from_u64(3);
        let (dataset, _) = sparse_cox(120, 10, 4, 0.8, 0.3, &mut rng);
        let grid = alpha_grid(&dataset, LossKind::Efron, 1.0, 1e-2, 15);
        let params = SurvivalModelParams::new().check().unwrap();

        let path = regularization_path(&dataset, &params, grid.as_slice().unwrap()).unwrap();
        let sizes = path.working_set_sizes();
        assert!(sizes.windows(2).all(|w| w[0] <= w[1]));
        assert!(*sizes.last().unwrap() > 0);

        let predicted = path.predict(dataset.records());
        assert_abs_diff_eq!(predicted, path.train_linear_predictors().clone());
    }

    #[test]
    fn cold_start_matches_warm_start() {
        let mut rng = Xoshiro256Plus::seed_from_u64(4);
        let (dataset, _) = sparse_cox(100, 6, 2, 1.0, 0.3, &mut rng);
        let grid = alpha_grid(&dataset, LossKind::Efron, 1.0, 5e-2, 6);

        let optimisers = [Optimiser::Irls, Optimiser::ProximalGradient];
        for optimiser in optimisers.iter() {
            let params = SurvivalModelParams::new()
                .optimiser(*optimiser)
                .tol(1e-9)
                .inner_tol(1e-12)
                .max_iter(5000);
            let warm = params.clone().check().unwrap();
            let cold = params.warm_start(false).check().unwrap();

            let warm = regularization_path(&dataset, &warm, grid.as_slice().unwrap()).unwrap();
            let cold = regularization_path(&dataset, &cold, grid.as_slice().unwrap()).unwrap();
            assert_abs_diff_eq!(warm.coefs(), cold.coefs(), epsilon = 1e-5);
        }
    }

    #[test]
    fn fixed_step_lowers_the_objective() {
        let mut rng = Xoshiro256Plus::seed_from_u64(6);
        let (dataset, _) = sparse_cox(100, 4, 2, 1.0, 0.3, &mut rng);
        let sorted = dataset.sorted_by_time();
        let alpha = 0.02;
        let objective = |coef: ndarray::ArrayView1<f64>| {
            let eta = sorted.records().dot(&coef);
            LossKind::Efron.loss(
                eta.view(),
                sorted.time().view(),
                sorted.event().view(),
                None,
            ) + alpha * coef.mapv(f64::abs).sum()
        };

        let params = SurvivalModelParams::new()
            .optimiser(Optimiser::ProximalGradient)
            .line_search(false)
            .max_iter(200)
            .check()
            .unwrap();
        let path = regularization_path(&dataset, &params, &[alpha]).unwrap();
        let coef = path.coefs().column(0);

        assert!(objective(coef) < objective(Array1::zeros(4).view()));
        assert!(coef.iter().any(|c| *c != 0.0));
    }

    #[test]
    fn constant_grid_without_signal() {
        let dataset = SurvivalDataset::new(
            ndarray::array![[1.0], [1.0], [1.0]],
            ndarray::array![1.0, 2.0, 3.0],
            ndarray::array![false, false, false],
        )
        .unwrap();
        let grid = alpha_grid(&dataset, LossKind::Efron, 1.0, 1e-3, 4);
        assert_eq!(grid.len(), 4);
        assert!(grid.iter().all(|a| *a == grid[0]));
    }

    #[test]
    fn user_grid_is_sorted_and_deduplicated() {
        assert_eq!(prepare_alphas(&[0.1, 1.0, 0.5, 1.0]), vec![1.0, 0.5, 0.1]);
    }
}
