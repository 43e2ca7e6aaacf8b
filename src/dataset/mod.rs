//! Datasets
//!
//! This module implements the survival dataset struct, the signed target encoding and the
//! event-stratified fold splitter.
use ndarray::{Array1, Array2, ArrayBase, Data, Ix1, ScalarOperand};

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use num_traits::{AsPrimitive, FromPrimitive, NumAssignOps, NumCast, Signed};
use rand::distributions::uniform::SampleUniform;

use std::fmt;
use std::iter::Sum;
use std::ops::{AddAssign, DivAssign, MulAssign, SubAssign};

use crate::error::{Error, Result};

mod folds;
mod impl_dataset;

pub use folds::StratifiedKFold;
pub use impl_dataset::argsort_stable;

/// Floating point numbers
///
/// This trait bound multiplexes to the most common assumption of floating point number and
/// implement them for 32bit and 64bit floating points. They are used in the records, the survival
/// times and the sample weights of a dataset.
pub trait Float:
    FromPrimitive
    + num_traits::Float
    + PartialOrd
    + Sync
    + Send
    + Default
    + fmt::Display
    + fmt::Debug
    + Signed
    + Sum
    + NumAssignOps
    + AsPrimitive<usize>
    + for<'a> AddAssign<&'a Self>
    + for<'a> MulAssign<&'a Self>
    + for<'a> SubAssign<&'a Self>
    + for<'a> DivAssign<&'a Self>
    + num_traits::MulAdd<Output = Self>
    + SampleUniform
    + ScalarOperand
    + approx::AbsDiffEq
{
    fn cast<T: NumCast>(x: T) -> Self {
        NumCast::from(x).unwrap()
    }
}

impl Float for f32 {}

impl Float for f64 {}

/// Right-censored survival data
///
/// This is the fundamental structure handed to every survival estimator. It pairs a feature
/// matrix with the observed time and the event indicator of each sample, and may carry sample
/// weights.
///
/// # Fields
///
/// * `records`: a two-dimensional matrix with dimensionality (nsamples, nfeatures)
/// * `time`: time-to-event or time-to-censoring of each sample, finite and non-negative
/// * `event`: `true` if the event was observed, `false` if the sample is censored
/// * `weights`: optional non-negative weights for each sample
///
/// Samples are stored in the order they were given. Likelihood computations require ascending
/// time, use [`SurvivalDataset::sorted_by_time`] to obtain a sorted copy.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq)]
pub struct SurvivalDataset<F> {
    records: Array2<F>,
    time: Array1<F>,
    event: Array1<bool>,
    weights: Option<Array1<F>>,
}

/// Encode time and event indicator into a single signed target
///
/// Observed events keep their (non-negative) time, censored samples are stored with a negative
/// sign. A censored sample at time zero cannot be represented and is encoded as an event.
pub fn transform_survival<F: Float>(
    time: &ArrayBase<impl Data<Elem = F>, Ix1>,
    event: &ArrayBase<impl Data<Elem = bool>, Ix1>,
) -> Result<Array1<F>> {
    if time.len() != event.len() {
        return Err(Error::MismatchedShapes {
            records: time.len(),
            targets: event.len(),
        });
    }

    Ok(time
        .iter()
        .zip(event.iter())
        .map(|(&t, &e)| if e { t } else { -t })
        .collect())
}

/// Decode a signed target into time and event indicator
///
/// Non-negative values are observed events, negative values are censored at `|y|`.
pub fn inverse_transform_survival<F: Float>(
    y: &ArrayBase<impl Data<Elem = F>, Ix1>,
) -> Result<(Array1<F>, Array1<bool>)> {
    if let Some(bad) = y.iter().find(|v| !v.is_finite()) {
        return Err(Error::InvalidTarget(format!("non-finite encoded time {}", bad)));
    }
    let time = y.mapv(|v| v.abs());
    let event = y.mapv(|v| v >= F::zero());

    Ok((time, event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn encoding_round_trips_censoring() {
        let time = array![1.0, 2.5, 3.0];
        let event = array![true, false, true];

        let y = transform_survival(&time, &event).unwrap();
        assert_abs_diff_eq!(y, array![1.0, -2.5, 3.0]);

        let (t, e) = inverse_transform_survival(&y).unwrap();
        assert_abs_diff_eq!(t, time);
        assert_eq!(e, event);
    }

    #[test]
    fn zero_time_decodes_as_event() {
        let (time, event) = inverse_transform_survival(&array![0.0, -1.0]).unwrap();
        assert_abs_diff_eq!(time, array![0.0, 1.0]);
        assert_eq!(event, array![true, false]);
    }

    #[test]
    fn rejects_non_finite_targets() {
        assert!(inverse_transform_survival(&array![1.0, f64::NAN]).is_err());
        assert!(transform_survival(&array![1.0], &array![true, false]).is_err());
    }
}
