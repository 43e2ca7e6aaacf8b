//! Kernel-smoothed likelihoods of the accelerated failure time (AFT) and accelerated hazards
//! (AH) models
//!
//! Both models work on the residual log time `r = ln(t) + eta`. The density of the residuals is
//! estimated with a Gaussian kernel over the observed events, the survivor part with the
//! integrated kernel (the standard normal CDF) over all samples.

use ndarray::{Array1, ArrayView1};
use statrs::function::erf::erfc;
use survhive::Float;

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use super::unit_mean_weights;

/// Bandwidth selection rule of the Gaussian kernel
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bandwidth {
    /// `h = 1.587 σ n^(-1/3)`
    Jones1990,
    /// `h = 1.06 σ n^(-1/5)`
    Jones1991,
}

impl Default for Bandwidth {
    fn default() -> Self {
        Bandwidth::Jones1990
    }
}

impl Bandwidth {
    /// Estimate the bandwidth from the log event times of a sample
    ///
    /// `σ` is the standard deviation of the logarithm of the positive event times. It falls back
    /// to one when fewer than two distinct event times exist.
    pub fn estimate<F: Float>(&self, time: ArrayView1<F>, event: ArrayView1<bool>) -> F {
        let log_times = time
            .iter()
            .zip(event.iter())
            .filter(|(t, e)| **e && **t > F::zero())
            .map(|(t, _)| t.ln())
            .collect::<Vec<_>>();

        let sigma = if log_times.len() < 2 {
            F::one()
        } else {
            let m = F::cast(log_times.len());
            let mean = log_times.iter().copied().sum::<F>() / m;
            let var = log_times
                .iter()
                .map(|v| (*v - mean) * (*v - mean))
                .sum::<F>()
                / m;
            let sigma = var.sqrt();
            if sigma > F::zero() && sigma.is_finite() {
                sigma
            } else {
                F::one()
            }
        };

        let n = F::cast(time.len().max(1));
        match self {
            Bandwidth::Jones1990 => F::cast(1.587) * sigma * n.powf(F::cast(-1. / 3.)),
            Bandwidth::Jones1991 => F::cast(1.06) * sigma * n.powf(F::cast(-0.2)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum KernelModel {
    Aft,
    Ah,
}

fn normal_pdf<F: Float>(u: F) -> F {
    F::cast(std::f64::consts::FRAC_1_SQRT_2 * 0.5 * std::f64::consts::FRAC_2_SQRT_PI)
        * (-u * u / F::cast(2.)).exp()
}

fn normal_cdf<F: Float>(u: F) -> F {
    let u: f64 = u.to_f64().unwrap_or(f64::NAN);
    F::cast(0.5 * erfc(-u * std::f64::consts::FRAC_1_SQRT_2))
}

/// Pairwise kernel terms shared by the likelihood and its gradient
struct KernelTerms<F> {
    bandwidth: F,
    shift: F,
    weights: Array1<F>,
    /// `w_i` for AFT, `w_i exp(eta_i - shift)` for AH
    exposure: Array1<F>,
    residual: Array1<F>,
    events: Vec<usize>,
    /// `K_j = Σ_{i ∈ events} w_i φ((r_i - r_j) / h)`
    density: Vec<F>,
    /// `Q_j = Σ_i e_i Φ((r_i - r_j) / h)`
    survivor: Vec<F>,
}

impl<F: Float> KernelTerms<F> {
    fn new(
        eta: ArrayView1<F>,
        time: ArrayView1<F>,
        event: ArrayView1<bool>,
        weights: Option<ArrayView1<F>>,
        model: KernelModel,
        bandwidth: F,
    ) -> Self {
        let n = eta.len();
        let weights = unit_mean_weights(weights, n);
        let residual = Array1::from_shape_fn(n, |i| time[i].ln() + eta[i]);
        let shift = match model {
            KernelModel::Aft => F::zero(),
            KernelModel::Ah => {
                let m = eta.fold(F::neg_infinity(), |m, &v| m.max(v));
                if m.is_finite() {
                    m
                } else {
                    F::zero()
                }
            }
        };
        let exposure = match model {
            KernelModel::Aft => weights.clone(),
            KernelModel::Ah => Array1::from_shape_fn(n, |i| weights[i] * (eta[i] - shift).exp()),
        };
        let events = (0..n).filter(|&i| event[i]).collect::<Vec<_>>();

        let mut density = Vec::with_capacity(events.len());
        let mut survivor = Vec::with_capacity(events.len());
        for &j in &events {
            let k = events
                .iter()
                .map(|&i| weights[i] * normal_pdf((residual[i] - residual[j]) / bandwidth))
                .sum::<F>();
            let q = (0..n)
                .map(|i| exposure[i] * normal_cdf((residual[i] - residual[j]) / bandwidth))
                .sum::<F>();
            density.push(k);
            survivor.push(q);
        }

        KernelTerms {
            bandwidth,
            shift,
            weights,
            exposure,
            residual,
            events,
            density,
            survivor,
        }
    }

    fn nsamples(&self) -> usize {
        self.weights.len()
    }

    fn loss(&self, eta: ArrayView1<F>, model: KernelModel) -> F {
        let n = F::cast(self.nsamples().max(1));
        let mut likelihood = F::zero();
        for (pos, &j) in self.events.iter().enumerate() {
            let w = self.weights[j];
            if w == F::zero() {
                continue;
            }
            let base = match model {
                KernelModel::Aft => eta[j] - self.residual[j],
                KernelModel::Ah => -self.residual[j],
            };
            let log_density = (self.density[pos] / (n * self.bandwidth)).ln();
            let log_survivor = (self.survivor[pos] / n).ln() + self.shift;
            likelihood += w * (base + log_density - log_survivor);
        }

        -likelihood / n
    }

    fn gradient(&self, model: KernelModel) -> Array1<F> {
        let n = self.nsamples();
        let h = self.bandwidth;
        let u = |a: usize, b: usize| (self.residual[a] - self.residual[b]) / h;
        let mut grad = Array1::<F>::zeros(n);

        for (pos, &j) in self.events.iter().enumerate() {
            let wj = self.weights[j];
            if wj == F::zero() {
                continue;
            }
            let (k, q) = (self.density[pos], self.survivor[pos]);

            // derivative of ln Q_j with respect to every sample entering the survivor sum
            for m in 0..n {
                let umj = u(m, j);
                let mut dq = normal_pdf(umj) / h;
                if model == KernelModel::Ah {
                    dq += normal_cdf(umj);
                }
                grad[m] -= wj * self.exposure[m] * dq / q;
            }
            // derivative of ln K_j with respect to the other events
            for &m in &self.events {
                let umj = u(m, j);
                grad[m] += wj * self.weights[m] * (-umj * normal_pdf(umj)) / (h * k);
            }

            // derivative of ln K_j and ln Q_j through r_j itself
            let mut dk = F::zero();
            let mut dq = F::zero();
            for &i in &self.events {
                let uij = u(i, j);
                dk += self.weights[i] * (-uij * normal_pdf(uij));
            }
            for i in 0..n {
                dq += self.exposure[i] * normal_pdf(u(i, j));
            }
            grad[j] += wj * (dq / (h * q) - dk / (h * k));

            if model == KernelModel::Ah {
                grad[j] -= wj;
            }
        }

        grad.mapv(|g| -g / F::cast(n.max(1)))
    }
}

/// Negative mean log kernel-smoothed likelihood
pub(crate) fn kernel_loss<F: Float>(
    eta: ArrayView1<F>,
    time: ArrayView1<F>,
    event: ArrayView1<bool>,
    weights: Option<ArrayView1<F>>,
    model: KernelModel,
    bandwidth: Bandwidth,
) -> F {
    let h = bandwidth.estimate(time, event);
    KernelTerms::new(eta, time, event, weights, model, h).loss(eta, model)
}

/// Gradient of [`kernel_loss`] with respect to the linear predictor
pub(crate) fn kernel_gradient<F: Float>(
    eta: ArrayView1<F>,
    time: ArrayView1<F>,
    event: ArrayView1<bool>,
    weights: Option<ArrayView1<F>>,
    model: KernelModel,
    bandwidth: Bandwidth,
) -> Array1<F> {
    let h = bandwidth.estimate(time, event);
    KernelTerms::new(eta, time, event, weights, model, h).gradient(model)
}

/// Kernel-smoothed cumulative baseline hazard on the residual log time scale
///
/// `H0(s) = Σ_j c_j Φ((s - r_j) / h)` with one term per training event.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct KernelBaseline<F> {
    residual: Array1<F>,
    coefficient: Array1<F>,
    bandwidth: F,
    shift: F,
    accelerated_hazards: bool,
}

impl<F: Float> KernelBaseline<F> {
    pub(crate) fn new(
        eta: ArrayView1<F>,
        time: ArrayView1<F>,
        event: ArrayView1<bool>,
        weights: Option<ArrayView1<F>>,
        model: KernelModel,
        bandwidth: Bandwidth,
    ) -> Self {
        let h = bandwidth.estimate(time, event);
        let terms = KernelTerms::new(eta, time, event, weights, model, h);
        let residual = terms.events.iter().map(|&j| terms.residual[j]).collect();
        let coefficient = terms
            .events
            .iter()
            .zip(terms.survivor.iter())
            .map(|(&j, &q)| {
                if q > F::zero() {
                    terms.weights[j] / q
                } else {
                    F::zero()
                }
            })
            .collect();

        KernelBaseline {
            residual,
            coefficient,
            bandwidth: h,
            shift: terms.shift,
            accelerated_hazards: model == KernelModel::Ah,
        }
    }

    /// Cumulative hazard of a sample with linear predictor `eta` at time `t`
    pub fn cumulative_hazard(&self, eta: F, t: F) -> F {
        if t <= F::zero() {
            return F::zero();
        }
        let s = t.ln() + eta;
        let base = self
            .residual
            .iter()
            .zip(self.coefficient.iter())
            .map(|(r, c)| *c * normal_cdf((s - *r) / self.bandwidth))
            .sum::<F>();

        if self.accelerated_hazards {
            base * (eta - self.shift).exp()
        } else {
            base
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn toy() -> (Array1<f64>, Array1<bool>, Array1<f64>) {
        (
            array![0.4, 0.9, 1.3, 1.3, 2.2, 3.0, 4.5],
            array![true, false, true, true, false, true, true],
            array![0.3, -0.2, 0.5, -0.7, 0.1, 0.0, -0.4],
        )
    }

    #[test]
    fn bandwidth_rules() {
        let time = array![1.0f64, 1.0f64.exp(), 1.0, 1.0f64.exp()];
        let event = array![true, true, true, true];
        // log times 0, 1, 0, 1 have standard deviation 1/2
        assert_abs_diff_eq!(
            Bandwidth::Jones1990.estimate(time.view(), event.view()),
            1.587 * 0.5 * 4f64.powf(-1. / 3.),
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            Bandwidth::Jones1991.estimate(time.view(), event.view()),
            1.06 * 0.5 * 4f64.powf(-0.2),
            epsilon = 1e-12
        );
    }

    #[test]
    fn bandwidth_falls_back_without_spread() {
        let time = array![2.0, 2.0, 5.0];
        let event = array![true, true, false];
        assert_abs_diff_eq!(
            Bandwidth::Jones1991.estimate(time.view(), event.view()),
            1.06 * 3f64.powf(-0.2),
            epsilon = 1e-12
        );
    }

    #[test]
    fn normal_helpers() {
        assert_abs_diff_eq!(normal_cdf(0.0f64), 0.5, epsilon = 1e-15);
        assert_abs_diff_eq!(normal_cdf(1.959963984540054f64), 0.975, epsilon = 1e-9);
        assert_abs_diff_eq!(normal_pdf(0.0f64), 0.3989422804014327, epsilon = 1e-15);
    }

    #[test]
    fn gradients_match_finite_differences() {
        let (time, event, eta) = toy();
        let step = 1e-6;

        for model in [KernelModel::Aft, KernelModel::Ah].iter() {
            let grad = kernel_gradient(
                eta.view(),
                time.view(),
                event.view(),
                None,
                *model,
                Bandwidth::Jones1990,
            );
            for m in 0..eta.len() {
                let mut up = eta.clone();
                let mut down = eta.clone();
                up[m] += step;
                down[m] -= step;
                let loss = |eta: &Array1<f64>| {
                    kernel_loss(
                        eta.view(),
                        time.view(),
                        event.view(),
                        None,
                        *model,
                        Bandwidth::Jones1990,
                    )
                };
                let (lu, ld) = (loss(&up), loss(&down));
                assert_abs_diff_eq!(grad[m], (lu - ld) / (2.0 * step), epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn accelerated_hazards_is_shift_stable() {
        let (time, event, eta) = toy();
        let big = eta.mapv(|v| v + 500.0);
        let loss = kernel_loss(
            big.view(),
            time.view(),
            event.view(),
            None,
            KernelModel::Ah,
            Bandwidth::Jones1990,
        );
        assert!(loss.is_finite());
    }

    #[test]
    fn baseline_is_non_decreasing() {
        let (time, event, eta) = toy();
        for model in [KernelModel::Aft, KernelModel::Ah].iter() {
            let baseline = KernelBaseline::new(
                eta.view(),
                time.view(),
                event.view(),
                None,
                *model,
                Bandwidth::Jones1991,
            );
            let mut last = 0.0;
            for t in &[0.0, 0.1, 0.5, 1.0, 2.0, 5.0, 20.0] {
                let value = baseline.cumulative_hazard(0.2, *t);
                assert!(value >= last);
                last = value;
            }
        }
    }
}
