//! Loss engine
//!
//! Every loss is the negative mean log likelihood of a right-censored sample given the linear
//! predictor `eta`. Samples have to be sorted by ascending time, ties are allowed.
use ndarray::{Array1, ArrayView1};
use survhive::Float;

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use crate::error::{Result, SurvivalError};

mod kernel;
mod partial;

pub use kernel::{Bandwidth, KernelBaseline};
pub use partial::{breslow_likelihood, efron_likelihood};

use kernel::{kernel_gradient, kernel_loss, KernelModel};
use partial::{RiskSets, Ties};

/// Rescale optional weights to mean one, uniform weights if none are given
pub(crate) fn unit_mean_weights<F: Float>(weights: Option<ArrayView1<F>>, n: usize) -> Array1<F> {
    match weights {
        Some(w) => {
            let total = w.sum();
            if total > F::zero() {
                w.mapv(|v| v * F::cast(n) / total)
            } else {
                Array1::ones(n)
            }
        }
        None => Array1::ones(n),
    }
}

/// Likelihood of the survival model
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LossKind {
    /// Cox partial likelihood with Efron's tie correction
    Efron,
    /// Cox partial likelihood with Breslow's tie handling
    Breslow,
    /// Kernel-smoothed accelerated failure time likelihood
    Aft(Bandwidth),
    /// Kernel-smoothed accelerated hazards likelihood
    Ah(Bandwidth),
}

impl Default for LossKind {
    fn default() -> Self {
        LossKind::Efron
    }
}

impl LossKind {
    /// Whether the loss provides the diagonal Hessian needed by IRLS
    pub fn supports_irls(&self) -> bool {
        matches!(self, LossKind::Efron | LossKind::Breslow)
    }

    /// Whether the loss needs strictly positive times
    pub fn needs_positive_time(&self) -> bool {
        matches!(self, LossKind::Aft(_) | LossKind::Ah(_))
    }

    fn family(&self) -> Family {
        match *self {
            LossKind::Efron => Family::Partial(Ties::Efron),
            LossKind::Breslow => Family::Partial(Ties::Breslow),
            LossKind::Aft(b) => Family::Kernel(KernelModel::Aft, b),
            LossKind::Ah(b) => Family::Kernel(KernelModel::Ah, b),
        }
    }

    /// Negative mean (weighted) log likelihood
    pub fn loss<F: Float>(
        &self,
        eta: ArrayView1<F>,
        time: ArrayView1<F>,
        event: ArrayView1<bool>,
        weights: Option<ArrayView1<F>>,
    ) -> F {
        match self.family() {
            Family::Partial(ties) => RiskSets::new(eta, time, event, weights, ties).loss(eta, event),
            Family::Kernel(model, bandwidth) => {
                kernel_loss(eta, time, event, weights, model, bandwidth)
            }
        }
    }

    /// Gradient of the loss with respect to the linear predictor
    pub fn gradient<F: Float>(
        &self,
        eta: ArrayView1<F>,
        time: ArrayView1<F>,
        event: ArrayView1<bool>,
        weights: Option<ArrayView1<F>>,
    ) -> Array1<F> {
        match self.family() {
            Family::Partial(ties) => {
                RiskSets::new(eta, time, event, weights, ties)
                    .gradient_hessian(event)
                    .0
            }
            Family::Kernel(model, bandwidth) => {
                kernel_gradient(eta, time, event, weights, model, bandwidth)
            }
        }
    }

    /// Gradient and diagonal Hessian with respect to the linear predictor
    ///
    /// Only the partial likelihoods provide a Hessian, the kernel-smoothed losses return
    /// [`SurvivalError::NotImplemented`].
    pub fn gradient_hessian<F: Float>(
        &self,
        eta: ArrayView1<F>,
        time: ArrayView1<F>,
        event: ArrayView1<bool>,
        weights: Option<ArrayView1<F>>,
    ) -> Result<(Array1<F>, Array1<F>)> {
        match self.family() {
            Family::Partial(ties) => {
                Ok(RiskSets::new(eta, time, event, weights, ties).gradient_hessian(event))
            }
            Family::Kernel(..) => Err(SurvivalError::NotImplemented(
                "hessian of kernel-smoothed likelihoods",
            )),
        }
    }

    /// Estimate the cumulative baseline hazard of a fitted sample
    pub(crate) fn baseline<F: Float>(
        &self,
        eta: ArrayView1<F>,
        time: ArrayView1<F>,
        event: ArrayView1<bool>,
        weights: Option<ArrayView1<F>>,
    ) -> BaselineHazard<F> {
        match self.family() {
            Family::Partial(ties) => {
                let (times, cumulative, shift) =
                    RiskSets::new(eta, time, event, weights, ties).baseline(time);
                BaselineHazard::Step {
                    times,
                    cumulative,
                    shift,
                }
            }
            Family::Kernel(model, bandwidth) => BaselineHazard::Kernel(KernelBaseline::new(
                eta, time, event, weights, model, bandwidth,
            )),
        }
    }
}

enum Family {
    Partial(Ties),
    Kernel(KernelModel, Bandwidth),
}

/// Cumulative baseline hazard estimated on the training sample
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub enum BaselineHazard<F> {
    /// Breslow step function, `cumulative` is relative to `exp(shift)`
    Step {
        times: Array1<F>,
        cumulative: Array1<F>,
        shift: F,
    },
    /// Kernel-smoothed estimate of the AFT and AH models
    Kernel(KernelBaseline<F>),
}

impl<F: Float> BaselineHazard<F> {
    /// Cumulative hazards of one sample at ascending `times`
    pub fn cumulative_hazard(&self, eta: F, times: &[F]) -> Vec<F> {
        match self {
            BaselineHazard::Step {
                times: steps,
                cumulative,
                shift,
            } => {
                let scale = (eta - *shift).exp();
                let mut pos = 0;
                let mut current = F::zero();
                times
                    .iter()
                    .map(|t| {
                        while pos < steps.len() && steps[pos] <= *t {
                            current = cumulative[pos];
                            pos += 1;
                        }
                        current * scale
                    })
                    .collect()
            }
            BaselineHazard::Kernel(kernel) => {
                times.iter().map(|t| kernel.cumulative_hazard(eta, *t)).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn kernel_losses_have_no_hessian() {
        let time = array![1.0, 2.0, 3.0];
        let event = array![true, true, false];
        let eta = array![0.0, 0.0, 0.0];

        let kernels = [
            LossKind::Aft(Bandwidth::Jones1990),
            LossKind::Ah(Bandwidth::Jones1991),
        ];
        for loss in kernels.iter() {
            assert!(!loss.supports_irls());
            let res = loss.gradient_hessian(eta.view(), time.view(), event.view(), None);
            assert!(matches!(res, Err(SurvivalError::NotImplemented(_))));
            assert_eq!(loss.gradient(eta.view(), time.view(), event.view(), None).len(), 3);
        }
    }

    #[test]
    fn breslow_step_baseline() {
        let time = array![1.0, 2.0, 2.0, 3.0];
        let event = array![true, false, true, false];
        let eta = array![0.0, 0.0, 0.0, 0.0];
        let baseline = LossKind::Breslow.baseline(eta.view(), time.view(), event.view(), None);

        let hazard = baseline.cumulative_hazard(0.0, &[0.5, 1.0, 1.5, 2.0, 10.0]);
        let expected = [0.0, 0.25, 0.25, 0.25 + 1.0 / 3.0, 0.25 + 1.0 / 3.0];
        for (h, e) in hazard.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*h, *e, epsilon = 1e-12);
        }

        let doubled = baseline.cumulative_hazard(2f64.ln(), &[10.0]);
        assert_abs_diff_eq!(doubled[0], 2.0 * expected[4], epsilon = 1e-12);
    }

    #[test]
    fn weights_enter_the_loss() {
        let time = array![1.0, 2.0, 3.0];
        let event = array![true, true, true];
        let eta = array![0.5, 0.0, -0.5];
        let weights = array![1.0, 0.0, 1.0];

        let plain: f64 = LossKind::Efron.loss(eta.view(), time.view(), event.view(), None);
        let weighted =
            LossKind::Efron.loss(eta.view(), time.view(), event.view(), Some(weights.view()));
        assert!((plain - weighted).abs() > 1e-6);
    }
}
