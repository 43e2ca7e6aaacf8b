use ndarray::{Array1, Array2, ArrayBase, Data, Ix1, Ix2};
use survhive::dataset::argsort_stable;
use survhive::traits::{Fit, Predict};
use survhive::{Float, SurvivalDataset};

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use crate::error::{Result, SurvivalError};
use crate::hyperparams::{SurvivalModelParams, SurvivalModelValidParams};
use crate::loss::{BaselineHazard, LossKind};
use crate::path::regularization_path;

/// Fitted penalized survival model
///
/// Holds the coefficients, the time-sorted training outcomes with their linear predictor and the
/// cumulative baseline hazard estimated from them. The model has no intercept, the baseline
/// hazard absorbs it.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct SurvivalModel<F> {
    coef: Array1<F>,
    loss: LossKind,
    alpha: F,
    l1_ratio: F,
    n_iter: u32,
    time: Array1<F>,
    event: Array1<bool>,
    linear_predictor: Array1<F>,
    baseline: BaselineHazard<F>,
}

impl<F: Float> SurvivalModel<F> {
    /// Create a default parameter set for construction of a penalized survival model
    pub fn params() -> SurvivalModelParams<F> {
        SurvivalModelParams::new()
    }

    /// Build the model for given coefficients, estimating the baseline hazard on `dataset`
    pub(crate) fn from_coef(
        params: &SurvivalModelValidParams<F>,
        dataset: &SurvivalDataset<F>,
        coef: Array1<F>,
        n_iter: u32,
    ) -> Self {
        let sorted = dataset.sorted_by_time();
        let linear_predictor = sorted.records().dot(&coef);
        let baseline = params.loss().baseline(
            linear_predictor.view(),
            sorted.time().view(),
            sorted.event().view(),
            sorted.weights().map(|w| w.view()),
        );

        SurvivalModel {
            coef,
            loss: params.loss(),
            alpha: params.alpha(),
            l1_ratio: params.l1_ratio(),
            n_iter,
            time: sorted.time().clone(),
            event: sorted.event().clone(),
            linear_predictor,
            baseline,
        }
    }

    pub fn coef(&self) -> &Array1<F> {
        &self.coef
    }

    /// Always zero
    pub fn intercept(&self) -> F {
        F::zero()
    }

    pub fn alpha(&self) -> F {
        self.alpha
    }

    pub fn l1_ratio(&self) -> F {
        self.l1_ratio
    }

    pub fn loss_kind(&self) -> LossKind {
        self.loss
    }

    pub fn n_iter(&self) -> u32 {
        self.n_iter
    }

    pub fn baseline(&self) -> &BaselineHazard<F> {
        &self.baseline
    }

    /// Training times in ascending order
    pub fn training_time(&self) -> &Array1<F> {
        &self.time
    }

    /// Training event indicators, ordered like [`training_time`](Self::training_time)
    pub fn training_event(&self) -> &Array1<bool> {
        &self.event
    }

    /// Training linear predictor, ordered like [`training_time`](Self::training_time)
    pub fn training_linear_predictor(&self) -> &Array1<F> {
        &self.linear_predictor
    }

    fn check_features(&self, n_features: usize) -> Result<()> {
        if n_features != self.coef.len() {
            return Err(SurvivalError::FeatureMismatch {
                expected: self.coef.len(),
                found: n_features,
            });
        }
        Ok(())
    }

    /// Cumulative hazard of every record at every time
    ///
    /// Returns an array of shape `(n_records, n_times)`. The times do not have to be sorted,
    /// column `k` always belongs to `time[k]`.
    pub fn predict_cumulative_hazard_function(
        &self,
        records: &ArrayBase<impl Data<Elem = F>, Ix2>,
        time: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<Array2<F>> {
        self.check_features(records.ncols())?;
        if let Some(bad) = time.iter().find(|t| !t.is_finite()) {
            return Err(survhive::Error::InvalidTarget(format!(
                "query times have to be finite, found {}",
                bad
            ))
            .into());
        }

        let order = argsort_stable(&time.to_owned());
        let sorted = order.iter().map(|&k| time[k]).collect::<Vec<_>>();
        let eta = records.dot(&self.coef);

        let mut hazard = Array2::zeros((records.nrows(), time.len()));
        for (i, eta_i) in eta.iter().enumerate() {
            let values = self.baseline.cumulative_hazard(*eta_i, &sorted);
            for (value, &k) in values.into_iter().zip(order.iter()) {
                hazard[[i, k]] = value;
            }
        }

        Ok(hazard)
    }

    /// Survival probability `exp(-H(t | x))` of every record at every time
    pub fn predict_survival_function(
        &self,
        records: &ArrayBase<impl Data<Elem = F>, Ix2>,
        time: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<Array2<F>> {
        Ok(self
            .predict_cumulative_hazard_function(records, time)?
            .mapv_into(|h| (-h).exp()))
    }

    /// Negated loss of the model on a dataset, larger is better
    ///
    /// The samples are sorted by time before evaluating, without weights every sample counts
    /// `1 / n`.
    pub fn score(&self, dataset: &SurvivalDataset<F>) -> Result<F> {
        self.check_features(dataset.nfeatures())?;
        if dataset.nsamples() == 0 {
            return Err(SurvivalError::NotEnoughSamples);
        }
        check_time(self.loss, dataset)?;

        let sorted = dataset.sorted_by_time();
        let eta = sorted.records().dot(&self.coef);
        let weights = match sorted.weights() {
            Some(w) => w.clone(),
            None => Array1::from_elem(sorted.nsamples(), F::one() / F::cast(sorted.nsamples())),
        };

        Ok(-self.loss.loss(
            eta.view(),
            sorted.time().view(),
            sorted.event().view(),
            Some(weights.view()),
        ))
    }
}

impl<F: Float, D: Data<Elem = F>> Predict<&ArrayBase<D, Ix2>, Array1<F>> for SurvivalModel<F> {
    /// Linear predictor of every record
    fn predict(&self, records: &ArrayBase<D, Ix2>) -> Array1<F> {
        records.dot(&self.coef)
    }
}

impl<F: Float> Predict<&SurvivalDataset<F>, Array1<F>> for SurvivalModel<F> {
    fn predict(&self, dataset: &SurvivalDataset<F>) -> Array1<F> {
        dataset.records().dot(&self.coef)
    }
}

/// Check that a dataset fits the configuration of a model
pub(crate) fn validate_dataset<F: Float>(
    params: &SurvivalModelValidParams<F>,
    dataset: &SurvivalDataset<F>,
) -> Result<()> {
    if dataset.nsamples() == 0 {
        return Err(SurvivalError::NotEnoughSamples);
    }
    if let Some(groups) = params.groups() {
        if groups.n_features() != dataset.nfeatures() {
            return Err(SurvivalError::FeatureMismatch {
                expected: groups.n_features(),
                found: dataset.nfeatures(),
            });
        }
    }
    check_time(params.loss(), dataset)
}

/// Accelerated models work on the log time scale
fn check_time<F: Float>(loss: LossKind, dataset: &SurvivalDataset<F>) -> Result<()> {
    if loss.needs_positive_time() && dataset.time().iter().any(|t| *t <= F::zero()) {
        return Err(survhive::Error::InvalidTarget(
            "accelerated models need strictly positive times".into(),
        )
        .into());
    }

    Ok(())
}

impl<F: Float> Fit<SurvivalDataset<F>, SurvivalError> for SurvivalModelValidParams<F> {
    type Object = SurvivalModel<F>;

    /// Fit the model at the configured `alpha`
    ///
    /// The dataset may be in any order, it is sorted by time on an owned copy.
    fn fit(&self, dataset: &SurvivalDataset<F>) -> Result<Self::Object> {
        validate_dataset(self, dataset)?;
        let path = regularization_path(dataset, self, &[self.alpha()])?;
        let coef = path.coefs().column(0).to_owned();
        let n_iter = path.n_iter().first().copied().unwrap_or(0);

        Ok(SurvivalModel::from_coef(self, dataset, coef, n_iter))
    }
}
