//! Utility functions for randomly generating survival datasets

use ndarray::{Array, Array1, ArrayBase, Data, Ix1};
use ndarray_rand::{
    rand::Rng,
    rand_distr::{Distribution, Exp, StandardNormal},
    RandomExt,
};
use survhive::SurvivalDataset;

/// Draw a right-censored dataset from an exponential proportional hazards model
///
/// Features are standard normal, the event time of sample `i` is exponential with rate
/// `exp(x_i · coefficients)` and independent censoring times are exponential with rate
/// `censoring_rate`. A sample is an event if its event time precedes its censoring time.
///
/// A `censoring_rate` of zero disables censoring.
pub fn exponential_cox(
    n_samples: usize,
    coefficients: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    censoring_rate: f64,
    rng: &mut impl Rng,
) -> SurvivalDataset<f64> {
    let records = Array::random_using((n_samples, coefficients.len()), StandardNormal, rng);
    let eta = records.dot(coefficients);

    let mut time = Array1::zeros(n_samples);
    let mut event = Array1::from_elem(n_samples, true);
    for (i, eta_i) in eta.iter().enumerate() {
        let event_time: f64 = Exp::new(eta_i.exp()).unwrap().sample(rng);
        let censor_time = if censoring_rate > 0.0 {
            Exp::new(censoring_rate).unwrap().sample(rng)
        } else {
            f64::INFINITY
        };

        if censor_time < event_time {
            time[i] = censor_time;
            event[i] = false;
        } else {
            time[i] = event_time;
        }
    }

    // times are finite and positive by construction
    SurvivalDataset::new(records, time, event).unwrap()
}

/// Sparse variant of [`exponential_cox`]
///
/// The first `n_informative` coefficients alternate between `effect` and `-effect`, all others
/// are zero. Returns the dataset together with the true coefficients.
pub fn sparse_cox(
    n_samples: usize,
    n_features: usize,
    n_informative: usize,
    effect: f64,
    censoring_rate: f64,
    rng: &mut impl Rng,
) -> (SurvivalDataset<f64>, Array1<f64>) {
    let coefficients = Array1::from_shape_fn(n_features, |j| match j {
        j if j >= n_informative => 0.0,
        j if j % 2 == 0 => effect,
        _ => -effect,
    });

    (
        exponential_cox(n_samples, &coefficients, censoring_rate, rng),
        coefficients,
    )
}
