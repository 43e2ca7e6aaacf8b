//! Provide traits for different classes of algorithms
//!

use std::error::Error;

/// Fittable algorithms
///
/// A fittable algorithm takes a dataset and creates a concept of some kind about it. For example
/// in a penalized Cox regression the fitted object holds the coefficient vector together with the
/// baseline hazard estimated on the training samples.
pub trait Fit<D, E: Error + From<crate::error::Error>> {
    type Object;

    fn fit(&self, dataset: &D) -> Result<Self::Object, E>;
}

/// Predict with a fitted model
///
/// For survival models the prediction is the linear predictor of every record.
pub trait Predict<R, T> {
    fn predict(&self, x: R) -> T;
}
