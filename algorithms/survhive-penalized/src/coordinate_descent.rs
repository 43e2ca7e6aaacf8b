//! Weighted least squares subproblem of an IRLS step
//!
//! With the diagonal Hessian `h` and the pseudo response `z = eta - gradient / h` of the samples
//! with positive Hessian, every IRLS step minimizes
//! ```ignore
//! 0.5 * sum_i h_i * (z_i - x_iᵀ beta)^2
//!     + alpha * l1_ratio * ||beta||_1
//!     + 0.5 * alpha * (1 - l1_ratio) * ||beta||^2_2
//! ```
//! over the working set, by cyclic coordinate descent on the square root weighted design.
use approx::abs_diff_ne;
use ndarray::{Array1, ArrayView1, Axis};
use survhive::Float;

use crate::irls::WeightedDesign;

fn soft_threshold<F: Float>(x: F, threshold: F) -> F {
    x.signum() * (x.abs() - threshold).max(F::zero())
}

/// Weights and pseudo response of the samples selected by a [`WeightedDesign`]
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct WeightedSubproblem<F> {
    sqrt_weights: Array1<F>,
    response: Array1<F>,
}

impl<F: Float> WeightedSubproblem<F> {
    /// Expand the loss around `eta`, restricted to `rows`
    ///
    /// Every row needs a positive Hessian entry.
    pub(crate) fn new(
        rows: &[usize],
        eta: ArrayView1<F>,
        gradient: ArrayView1<F>,
        hessian: ArrayView1<F>,
    ) -> Self {
        let sqrt_weights = rows.iter().map(|&i| hessian[i].sqrt()).collect();
        let response = rows
            .iter()
            .map(|&i| eta[i] - gradient[i] / hessian[i])
            .collect();
        WeightedSubproblem {
            sqrt_weights,
            response,
        }
    }

    /// Pseudo response of the selected rows
    pub(crate) fn response(&self) -> &Array1<F> {
        &self.response
    }

    /// Minimize over the `columns` of the design, starting from `coef`
    ///
    /// Sweeps stop once no coefficient moves by `tol` or more, the same test the IRLS loop
    /// applies to its steps. Returns the coefficients of `columns` and the number of sweeps.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn solve(
        &self,
        design: &WeightedDesign<F>,
        columns: &[usize],
        mut coef: Array1<F>,
        alpha: F,
        l1_ratio: F,
        tol: F,
        max_sweeps: u32,
    ) -> (Array1<F>, u32) {
        let x = design.weighted(columns, &self.sqrt_weights);
        let l1_reg = alpha * l1_ratio;
        let l2_reg = alpha * (F::one() - l1_ratio);
        let curvature = x.map_axis(Axis(0), |col| col.dot(&col));
        let mut residual = &self.response * &self.sqrt_weights - x.dot(&coef);

        let mut n_sweeps = 0;
        while n_sweeps < max_sweeps {
            n_sweeps += 1;
            let mut max_change = F::zero();
            for (j, col) in x.axis_iter(Axis(1)).enumerate() {
                let previous = coef[j];
                let denominator = curvature[j] + l2_reg;
                let next = if denominator > F::zero() {
                    let rho = col.dot(&residual) + curvature[j] * previous;
                    soft_threshold(rho, l1_reg) / denominator
                } else {
                    F::zero()
                };
                if abs_diff_ne!(next, previous) {
                    residual.scaled_add(previous - next, &col);
                    coef[j] = next;
                }
                max_change = max_change.max((next - previous).abs());
            }
            if max_change < tol {
                break;
            }
        }

        (coef, n_sweeps)
    }
}
