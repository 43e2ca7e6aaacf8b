//! Cox partial likelihood with Breslow and Efron handling of tied event times
//!
//! All routines expect the samples sorted by ascending time. Nothing is validated here, an
//! unsorted input silently yields a wrong result.

use ndarray::{Array1, ArrayView1};
use survhive::Float;

use super::unit_mean_weights;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Ties {
    Breslow,
    Efron,
}

/// Risk terms of a run of samples sharing the same time
///
/// With `den_l` the (tie corrected) risk set sum of the `l`-th tied death and `w` the mean
/// weight of the tied deaths:
/// * `log_risk = w Σ ln(den_l)`
/// * `first = w Σ 1 / den_l`, `second = w Σ 1 / den_l²`
/// * `first_death`/`second_death` the same sums with each term scaled by the fraction
///   `1 - l/d` of a tied death still at risk (Efron), equal to `first`/`second` for Breslow.
#[derive(Clone, Copy, Debug)]
struct BlockTerms<F> {
    log_risk: F,
    first: F,
    second: F,
    first_death: F,
    second_death: F,
}

impl<F: Float> BlockTerms<F> {
    fn empty() -> Self {
        BlockTerms {
            log_risk: F::zero(),
            first: F::zero(),
            second: F::zero(),
            first_death: F::zero(),
            second_death: F::zero(),
        }
    }

    fn new(risk: F, death_risk: F, n_deaths: usize, death_weight: F, ties: Ties) -> Self {
        if n_deaths == 0 {
            return Self::empty();
        }

        match ties {
            Ties::Breslow => {
                let first = death_weight / risk;
                let second = first / risk;
                BlockTerms {
                    log_risk: death_weight * risk.ln(),
                    first,
                    second,
                    first_death: first,
                    second_death: second,
                }
            }
            Ties::Efron => {
                let d = F::cast(n_deaths);
                let mut terms = Self::empty();
                for l in 0..n_deaths {
                    let frac = F::cast(l) / d;
                    let den = risk - frac * death_risk;
                    let keep = F::one() - frac;
                    terms.log_risk += den.ln();
                    terms.first += F::one() / den;
                    terms.second += F::one() / (den * den);
                    terms.first_death += keep / den;
                    terms.second_death += keep * keep / (den * den);
                }
                let mean_weight = death_weight / d;
                terms.log_risk *= mean_weight;
                terms.first *= mean_weight;
                terms.second *= mean_weight;
                terms.first_death *= mean_weight;
                terms.second_death *= mean_weight;
                terms
            }
        }
    }
}

/// Tie blocks of a time-sorted sample together with their risk terms
///
/// The partial hazards are stored relative to `shift = max(eta)`. Every quantity of the partial
/// likelihood is invariant under this shift, it only keeps `exp` from overflowing.
pub(crate) struct RiskSets<F> {
    shift: F,
    weights: Array1<F>,
    scaled_hazard: Array1<F>,
    blocks: Vec<(usize, usize, BlockTerms<F>)>,
}

impl<F: Float> RiskSets<F> {
    pub(crate) fn new(
        eta: ArrayView1<F>,
        time: ArrayView1<F>,
        event: ArrayView1<bool>,
        weights: Option<ArrayView1<F>>,
        ties: Ties,
    ) -> Self {
        let n = eta.len();
        let weights = unit_mean_weights(weights, n);
        let shift = eta.fold(F::neg_infinity(), |m, &v| m.max(v));
        let shift = if shift.is_finite() { shift } else { F::zero() };
        let scaled_hazard = Array1::from_shape_fn(n, |i| weights[i] * (eta[i] - shift).exp());

        // risk set sums of the current and all later samples
        let mut suffix = Array1::zeros(n + 1);
        for i in (0..n).rev() {
            suffix[i] = suffix[i + 1] + scaled_hazard[i];
        }

        let mut blocks = Vec::new();
        let mut start = 0;
        while start < n {
            let mut end = start + 1;
            while end < n && !(time[end - 1] < time[end]) {
                end += 1;
            }

            let (mut death_risk, mut death_weight, mut n_deaths) = (F::zero(), F::zero(), 0);
            for i in (start..end).filter(|&i| event[i]) {
                death_risk += scaled_hazard[i];
                death_weight += weights[i];
                n_deaths += 1;
            }
            let terms = BlockTerms::new(suffix[start], death_risk, n_deaths, death_weight, ties);
            blocks.push((start, end, terms));
            start = end;
        }

        RiskSets {
            shift,
            weights,
            scaled_hazard,
            blocks,
        }
    }

    fn nsamples(&self) -> usize {
        self.weights.len()
    }

    /// Negative mean log partial likelihood
    pub(crate) fn loss(&self, eta: ArrayView1<F>, event: ArrayView1<bool>) -> F {
        if self.nsamples() == 0 {
            return F::zero();
        }
        let mut likelihood = F::zero();
        for (i, e) in event.iter().enumerate() {
            if *e {
                likelihood += self.weights[i] * (eta[i] - self.shift);
            }
        }
        for (_, _, terms) in &self.blocks {
            likelihood -= terms.log_risk;
        }

        -likelihood / F::cast(self.nsamples())
    }

    /// Gradient and diagonal Hessian of the loss with respect to the linear predictor
    pub(crate) fn gradient_hessian(&self, event: ArrayView1<bool>) -> (Array1<F>, Array1<F>) {
        let n = self.nsamples();
        let norm = F::cast(n.max(1));
        let mut gradient = Array1::zeros(n);
        let mut hessian = Array1::zeros(n);

        let (mut cum_first, mut cum_second) = (F::zero(), F::zero());
        for (start, end, terms) in &self.blocks {
            for i in *start..*end {
                let (first, second) = if event[i] {
                    (cum_first + terms.first_death, cum_second + terms.second_death)
                } else {
                    (cum_first + terms.first, cum_second + terms.second)
                };
                let a = self.scaled_hazard[i];
                let observed = if event[i] { self.weights[i] } else { F::zero() };

                gradient[i] = (a * first - observed) / norm;
                hessian[i] = ((a * first - a * a * second) / norm).max(F::zero());
            }
            cum_first += terms.first;
            cum_second += terms.second;
        }

        (gradient, hessian)
    }

    /// Cumulative baseline hazard at every tie block containing an event
    ///
    /// Returns the block times, the cumulative hazard relative to `exp(shift)` and the shift.
    pub(crate) fn baseline(&self, time: ArrayView1<F>) -> (Array1<F>, Array1<F>, F) {
        let mut times = Vec::new();
        let mut cumulative = Vec::new();
        let mut total = F::zero();
        for (start, _, terms) in &self.blocks {
            if terms.first > F::zero() {
                total += terms.first;
                times.push(time[*start]);
                cumulative.push(total);
            }
        }

        (Array1::from(times), Array1::from(cumulative), self.shift)
    }
}

/// Negative mean log partial likelihood with Efron's tie correction
///
/// `time` has to be sorted ascending.
pub fn efron_likelihood<F: Float>(
    linear_predictor: ArrayView1<F>,
    time: ArrayView1<F>,
    event: ArrayView1<bool>,
) -> F {
    RiskSets::new(linear_predictor, time, event, None, Ties::Efron).loss(linear_predictor, event)
}

/// Negative mean log partial likelihood with Breslow's tie handling
///
/// `time` has to be sorted ascending.
pub fn breslow_likelihood<F: Float>(
    linear_predictor: ArrayView1<F>,
    time: ArrayView1<F>,
    event: ArrayView1<bool>,
) -> F {
    RiskSets::new(linear_predictor, time, event, None, Ties::Breslow)
        .loss(linear_predictor, event)
}
