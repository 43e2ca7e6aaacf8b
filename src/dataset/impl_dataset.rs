use std::cmp::Ordering;

use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1};

use super::{inverse_transform_survival, transform_survival, Float, SurvivalDataset};
use crate::error::{Error, Result};

impl<F: Float> SurvivalDataset<F> {
    /// Create a new dataset from records, times and event indicators
    ///
    /// Fails if the number of rows of `records` does not match the length of `time` and `event`,
    /// or if any time is negative or not finite.
    pub fn new(records: Array2<F>, time: Array1<F>, event: Array1<bool>) -> Result<Self> {
        if records.nrows() != time.len() {
            return Err(Error::MismatchedShapes {
                records: records.nrows(),
                targets: time.len(),
            });
        }
        if time.len() != event.len() {
            return Err(Error::MismatchedShapes {
                records: time.len(),
                targets: event.len(),
            });
        }
        if let Some(bad) = time.iter().find(|t| !t.is_finite() || **t < F::zero()) {
            return Err(Error::InvalidTarget(format!(
                "times have to be finite and non-negative, found {}",
                bad
            )));
        }

        Ok(SurvivalDataset {
            records,
            time,
            event,
            weights: None,
        })
    }

    /// Create a new dataset from records and a signed target
    ///
    /// See [`inverse_transform_survival`] for the encoding.
    pub fn from_encoded<D: Data<Elem = F>>(
        records: Array2<F>,
        y: &ArrayBase<D, Ix1>,
    ) -> Result<Self> {
        let (time, event) = inverse_transform_survival(y)?;
        Self::new(records, time, event)
    }

    /// Attach sample weights
    ///
    /// Weights have to be finite, non-negative and may not all be zero.
    pub fn with_weights(mut self, weights: Array1<F>) -> Result<Self> {
        if weights.len() != self.nsamples() {
            return Err(Error::MismatchedShapes {
                records: self.nsamples(),
                targets: weights.len(),
            });
        }
        if weights.iter().any(|w| !w.is_finite() || *w < F::zero()) {
            return Err(Error::InvalidWeights(
                "weights have to be finite and non-negative".into(),
            ));
        }
        if weights.sum() <= F::zero() {
            return Err(Error::InvalidWeights("weights sum to zero".into()));
        }
        self.weights = Some(weights);

        Ok(self)
    }

    pub fn records(&self) -> &Array2<F> {
        &self.records
    }

    pub fn time(&self) -> &Array1<F> {
        &self.time
    }

    pub fn event(&self) -> &Array1<bool> {
        &self.event
    }

    pub fn weights(&self) -> Option<&Array1<F>> {
        self.weights.as_ref()
    }

    pub fn nsamples(&self) -> usize {
        self.records.nrows()
    }

    pub fn nfeatures(&self) -> usize {
        self.records.ncols()
    }

    /// Number of samples with an observed event
    pub fn nevents(&self) -> usize {
        self.event.iter().filter(|e| **e).count()
    }

    /// Signed target, negative for censored samples
    pub fn encoded_targets(&self) -> Array1<F> {
        // lengths are checked on construction
        transform_survival(&self.time, &self.event).unwrap()
    }

    pub fn is_sorted_by_time(&self) -> bool {
        self.time
            .iter()
            .zip(self.time.iter().skip(1))
            .all(|(a, b)| a <= b)
    }

    /// Indices which sort the samples by ascending time
    ///
    /// The sort is stable, tied samples keep their relative order.
    pub fn argsort_by_time(&self) -> Vec<usize> {
        argsort_stable(&self.time)
    }

    /// Owned copy of the dataset with samples sorted by ascending time
    pub fn sorted_by_time(&self) -> Self {
        self.select(&self.argsort_by_time())
    }

    /// Owned copy of the samples at `indices`, in the order given
    ///
    /// The copy never aliases the records of `self`, so optimizers are free to rescale it.
    pub fn select(&self, indices: &[usize]) -> Self {
        SurvivalDataset {
            records: self.records.select(Axis(0), indices),
            time: self.time.select(Axis(0), indices),
            event: self.event.select(Axis(0), indices),
            weights: self.weights.as_ref().map(|w| w.select(Axis(0), indices)),
        }
    }
}

/// Stable argsort of a float array, non-comparable values are treated as equal
pub fn argsort_stable<F: Float>(values: &Array1<F>) -> Vec<usize> {
    let mut indices = (0..values.len()).collect::<Vec<_>>();
    indices.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(Ordering::Equal)
    });
    indices
}
