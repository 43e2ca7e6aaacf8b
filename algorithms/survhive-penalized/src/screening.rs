//! Sequential strong rule screening with KKT verification
//!
//! The path solver only updates the coordinates of the working set. Features outside of it are
//! predicted inactive by the strong rule and checked against the KKT conditions of the fitted
//! subproblem afterwards; violators are moved into the working set and the fit is repeated.
use std::collections::BTreeSet;

use ndarray::{ArrayView1, ArrayView2};
use survhive::Float;

/// Feature sets of the active set strategy
///
/// `working ⊆ strong` holds after every update and every non-zero coefficient belongs to
/// `working`. None of the sets loses members while the path is traversed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActiveSet {
    n_features: usize,
    working: BTreeSet<usize>,
    strong: BTreeSet<usize>,
    ever_active: BTreeSet<usize>,
}

impl ActiveSet {
    pub fn new(n_features: usize) -> Self {
        ActiveSet {
            n_features,
            ..Default::default()
        }
    }

    pub fn working(&self) -> Vec<usize> {
        self.working.iter().copied().collect()
    }

    pub fn strong(&self) -> Vec<usize> {
        self.strong.iter().copied().collect()
    }

    pub fn ever_active(&self) -> Vec<usize> {
        self.ever_active.iter().copied().collect()
    }

    pub fn working_len(&self) -> usize {
        self.working.len()
    }

    /// Sequential strong rule for the step from `alpha_previous` to `alpha`
    ///
    /// `gradient` is the gradient of the loss with respect to the linear predictor at the solution
    /// of `alpha_previous`. A feature is kept if `|x_jᵀ gradient| >= l1_ratio (2 alpha -
    /// alpha_previous)`. The features ever active and the current working set always stay.
    pub fn compute_strong_set<F: Float>(
        &mut self,
        x: ArrayView2<F>,
        gradient: ArrayView1<F>,
        alpha: F,
        alpha_previous: F,
        l1_ratio: F,
    ) {
        let cutoff = l1_ratio * (F::cast(2.) * alpha - alpha_previous);
        let correlation = x.t().dot(&gradient);
        self.strong = correlation
            .iter()
            .enumerate()
            .filter(|(_, c)| c.abs() >= cutoff)
            .map(|(j, _)| j)
            .collect();
        self.strong.extend(self.ever_active.iter().copied());
        self.strong.extend(self.working.iter().copied());
    }

    /// Features of the strong set outside the working set violating the KKT conditions
    ///
    /// `gradient` is the gradient of the smooth part of the objective with respect to the linear
    /// predictor at the current fit. A zero coefficient satisfies the conditions if
    /// `|x_jᵀ gradient| <= alpha l1_ratio`.
    pub fn check_kkt_strong<F: Float>(
        &self,
        x: ArrayView2<F>,
        gradient: ArrayView1<F>,
        threshold: F,
    ) -> Vec<usize> {
        let candidates = self.strong.difference(&self.working).copied();
        kkt_violations(x, gradient, threshold, candidates)
    }

    /// Features outside the strong set violating the KKT conditions
    pub fn check_kkt_all<F: Float>(
        &self,
        x: ArrayView2<F>,
        gradient: ArrayView1<F>,
        threshold: F,
    ) -> Vec<usize> {
        let candidates = (0..self.n_features).filter(|j| !self.strong.contains(j));
        kkt_violations(x, gradient, threshold, candidates)
    }

    pub fn expand_working_set_with_kkt_violations(&mut self, violations: &[usize]) {
        self.working.extend(violations.iter().copied());
    }

    /// Violators outside the strong set join both the strong and the working set
    pub fn expand_working_set_with_overall_violations(&mut self, violations: &[usize]) {
        self.strong.extend(violations.iter().copied());
        self.working.extend(violations.iter().copied());
    }

    /// Record the non-zero coefficients of the working set
    pub fn record_active<F: Float>(&mut self, coef: ArrayView1<F>) {
        for &j in &self.working {
            if coef[j] != F::zero() {
                self.ever_active.insert(j);
            }
        }
    }
}

fn kkt_violations<F: Float>(
    x: ArrayView2<F>,
    gradient: ArrayView1<F>,
    threshold: F,
    candidates: impl Iterator<Item = usize>,
) -> Vec<usize> {
    candidates
        .filter(|&j| x.column(j).dot(&gradient).abs() > threshold)
        .collect()
}
