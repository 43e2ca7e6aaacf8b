//! Cross-validated selection of the penalty
//!
//! Every `(l1_ratio, fold)` pair fits an independent regularization path on the training part of
//! the fold. The tasks run on a rayon pool and are collected in task order, so the selected
//! `(alpha, l1_ratio)` only depends on the folds and the grids.
use log::{debug, info};
use ndarray::{concatenate, Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use survhive::traits::{Fit, Predict};
use survhive::{Float, StratifiedKFold, SurvivalDataset};

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use crate::error::{Result, SurvivalError};
use crate::hyperparams::{
    CvScoreMethod, CvStrategy, SurvivalModelCvParams, SurvivalModelCvValidParams,
};
use crate::loss::LossKind;
use crate::model::{validate_dataset, SurvivalModel};
use crate::path::{alpha_grid, prepare_alphas, regularization_path};

/// Cross-validated penalized survival model
///
/// Holds the alpha grids, the score of every grid point and the model refitted on the complete
/// dataset at the best scoring point.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct SurvivalModelCv<F> {
    alpha: F,
    l1_ratio: F,
    l1_ratios: Vec<F>,
    alphas: Array2<F>,
    cv_scores: Array2<F>,
    model: SurvivalModel<F>,
}

impl<F: Float> SurvivalModelCv<F> {
    /// Create a default parameter set for the cross-validated model
    pub fn params() -> SurvivalModelCvParams<F> {
        SurvivalModelCvParams::new()
    }

    /// Selected penalty strength
    pub fn alpha(&self) -> F {
        self.alpha
    }

    /// Selected l1 ratio
    pub fn l1_ratio(&self) -> F {
        self.l1_ratio
    }

    /// Candidate l1 ratios, in the order of the rows of [`alphas`](Self::alphas)
    pub fn l1_ratios(&self) -> &[F] {
        &self.l1_ratios
    }

    /// Alpha grid of every l1 ratio, shape `(n_l1_ratios, n_alphas)`
    pub fn alphas(&self) -> &Array2<F> {
        &self.alphas
    }

    /// Score of every grid point, larger is better
    pub fn cv_scores(&self) -> &Array2<F> {
        &self.cv_scores
    }

    /// Model refitted on the complete dataset
    pub fn model(&self) -> &SurvivalModel<F> {
        &self.model
    }

    pub fn coef(&self) -> &Array1<F> {
        self.model.coef()
    }

    pub fn intercept(&self) -> F {
        self.model.intercept()
    }

    pub fn predict_cumulative_hazard_function(
        &self,
        records: &ArrayBase<impl Data<Elem = F>, Ix2>,
        time: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<Array2<F>> {
        self.model.predict_cumulative_hazard_function(records, time)
    }

    pub fn predict_survival_function(
        &self,
        records: &ArrayBase<impl Data<Elem = F>, Ix2>,
        time: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<Array2<F>> {
        self.model.predict_survival_function(records, time)
    }

    pub fn score(&self, dataset: &SurvivalDataset<F>) -> Result<F> {
        self.model.score(dataset)
    }
}

impl<F: Float, D: Data<Elem = F>> Predict<&ArrayBase<D, Ix2>, Array1<F>> for SurvivalModelCv<F> {
    fn predict(&self, records: &ArrayBase<D, Ix2>) -> Array1<F> {
        self.model.predict(records)
    }
}

impl<F: Float> Predict<&SurvivalDataset<F>, Array1<F>> for SurvivalModelCv<F> {
    fn predict(&self, dataset: &SurvivalDataset<F>) -> Array1<F> {
        self.model.predict(dataset)
    }
}

/// Loss of a linear predictor on a dataset in any order
fn sorted_loss<F: Float>(
    loss: LossKind,
    eta: &ArrayBase<impl Data<Elem = F>, Ix1>,
    dataset: &SurvivalDataset<F>,
) -> F {
    let order = dataset.argsort_by_time();
    let eta = eta.select(Axis(0), &order);
    let sorted = dataset.select(&order);
    loss.loss(
        eta.view(),
        sorted.time().view(),
        sorted.event().view(),
        sorted.weights().map(|w| w.view()),
    )
}

/// Outcome of a single `(l1_ratio, fold)` task
struct FoldPath<F> {
    /// Linear predictor of the test samples, one column per alpha
    test_eta: Array2<F>,
    /// Per fold score of every alpha, only filled for the fold-wise scorers
    scores: Array1<F>,
}

fn fit_fold<F: Float>(
    params: &SurvivalModelCvValidParams<F>,
    dataset: &SurvivalDataset<F>,
    l1_ratio: F,
    alphas: &[F],
    (train, test): &(Vec<usize>, Vec<usize>),
) -> Result<FoldPath<F>> {
    let model = params.model().with_alpha(alphas[0], l1_ratio);
    let train = dataset.select(train);
    let test = dataset.select(test);

    let path = regularization_path(&train, &model, alphas)?;
    let test_eta = path.predict(test.records());
    let loss = model.loss();

    let scores = match params.cv_score_method() {
        CvScoreMethod::LinearPredictor => Array1::zeros(alphas.len()),
        CvScoreMethod::Regular => test_eta
            .axis_iter(Axis(1))
            .map(|eta| -sorted_loss(loss, &eta, &test))
            .collect(),
        CvScoreMethod::Vvh => {
            let full_eta = path.predict(dataset.records());
            let n_full = F::cast(dataset.nsamples());
            let n_train = F::cast(train.nsamples());
            full_eta
                .axis_iter(Axis(1))
                .zip(path.train_linear_predictors().axis_iter(Axis(1)))
                .map(|(full, fitted)| {
                    -n_full * sorted_loss(loss, &full, dataset)
                        + n_train * sorted_loss(loss, &fitted, &train)
                })
                .collect()
        }
    };

    Ok(FoldPath { test_eta, scores })
}

fn check_splits<F: Float>(
    splits: &[(Vec<usize>, Vec<usize>)],
    dataset: &SurvivalDataset<F>,
) -> Result<()> {
    let n = dataset.nsamples();
    for (k, (train, test)) in splits.iter().enumerate() {
        if train.is_empty() || test.is_empty() {
            return Err(SurvivalError::InvalidSplit(format!(
                "split {} has an empty train or test part",
                k
            )));
        }
        if let Some(i) = train.iter().chain(test.iter()).find(|i| **i >= n) {
            return Err(SurvivalError::InvalidSplit(format!(
                "split {} refers to sample {} of {}",
                k, i, n
            )));
        }
    }
    Ok(())
}

impl<F: Float> Fit<SurvivalDataset<F>, SurvivalError> for SurvivalModelCvValidParams<F> {
    type Object = SurvivalModelCv<F>;

    fn fit(&self, dataset: &SurvivalDataset<F>) -> Result<Self::Object> {
        validate_dataset(self.model(), dataset)?;

        let splits = match self.cv() {
            CvStrategy::KFold(k) => {
                let folds = StratifiedKFold::new(*k);
                let folds = match self.random_state() {
                    Some(seed) => folds.shuffle(seed),
                    None => folds,
                };
                folds.split(dataset.event())?
            }
            CvStrategy::Custom(splits) => {
                check_splits(splits, dataset)?;
                splits.clone()
            }
        };

        let loss = self.model().loss();
        let grids = self
            .l1_ratios()
            .iter()
            .map(|&ratio| match self.alphas() {
                Some(alphas) => prepare_alphas(alphas),
                None => alpha_grid(dataset, loss, ratio, self.eps(), self.n_alphas()).to_vec(),
            })
            .collect::<Vec<_>>();
        let n_alphas = grids[0].len();

        let tasks = (0..self.l1_ratios().len())
            .flat_map(|r| (0..splits.len()).map(move |f| (r, f)))
            .collect::<Vec<_>>();
        debug!(
            "cross validating {} l1 ratios on {} folds",
            self.l1_ratios().len(),
            splits.len()
        );

        let run = || {
            tasks
                .par_iter()
                .map(|&(r, f)| fit_fold(self, dataset, self.l1_ratios()[r], &grids[r], &splits[f]))
                .collect::<Result<Vec<_>>>()
        };
        let results = match self.n_jobs() {
            Some(n_jobs) => ThreadPoolBuilder::new()
                .num_threads(n_jobs)
                .build()
                .map_err(|e| SurvivalError::ThreadPool(e.to_string()))?
                .install(run)?,
            None => run()?,
        };

        let mut cv_scores = Array2::zeros((self.l1_ratios().len(), n_alphas));
        for (r, (fold_paths, mut row)) in results
            .chunks(splits.len())
            .zip(cv_scores.rows_mut())
            .enumerate()
        {
            match self.cv_score_method() {
                CvScoreMethod::LinearPredictor => {
                    let pooled = splits
                        .iter()
                        .flat_map(|(_, test)| test.iter().copied())
                        .collect::<Vec<_>>();
                    let pooled = dataset.select(&pooled);
                    let views = fold_paths.iter().map(|p| p.test_eta.view()).collect::<Vec<_>>();
                    let pooled_eta =
                        concatenate(Axis(0), &views).map_err(survhive::Error::from)?;
                    for (score, eta) in row.iter_mut().zip(pooled_eta.axis_iter(Axis(1))) {
                        *score = -sorted_loss(loss, &eta, &pooled);
                    }
                }
                CvScoreMethod::Regular | CvScoreMethod::Vvh => {
                    for path in fold_paths {
                        row += &path.scores;
                    }
                    row /= F::cast(splits.len());
                }
            }
            debug!(
                "l1 ratio {}: best score {}",
                self.l1_ratios()[r],
                row.fold(F::neg_infinity(), |m, s| m.max(*s))
            );
        }

        let mut best: Option<(usize, usize, F)> = None;
        for ((r, k), score) in cv_scores.indexed_iter() {
            if !score.is_finite() {
                continue;
            }
            if best.map_or(true, |(_, _, b)| *score > b) {
                best = Some((r, k, *score));
            }
        }
        let (r, k, score) = best.ok_or(SurvivalError::NoFiniteCvScore)?;
        let (alpha, l1_ratio) = (grids[r][k], self.l1_ratios()[r]);
        info!(
            "selected alpha {} and l1 ratio {} with score {}",
            alpha, l1_ratio, score
        );

        let model = self.model().with_alpha(alpha, l1_ratio).fit(dataset)?;
        let alphas = Array2::from_shape_fn((grids.len(), n_alphas), |(r, k)| grids[r][k]);

        Ok(SurvivalModelCv {
            alpha,
            l1_ratio,
            l1_ratios: self.l1_ratios().to_vec(),
            alphas,
            cv_scores,
            model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hyperparams::{Optimiser, SurvivalModelParams};
    use crate::loss::Bandwidth;
    use crate::proximal::Penalty;
    use approx::assert_abs_diff_eq;
    use ndarray_rand::rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;
    use survhive::ParamGuard;
    use survhive_datasets::generate::sparse_cox;

    fn dataset(seed: u64) -> SurvivalDataset<f64> {
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        sparse_cox(150, 6, 2, 1.0, 0.3, &mut rng).0
    }

    #[test]
    fn selection_is_deterministic() {
        let data = dataset(1);
        let params = SurvivalModelCv::params()
            .alphas(vec![0.2, 0.1, 0.05, 0.02, 0.01])
            .random_state(42)
            .check()
            .unwrap();

        let first = params.fit(&data).unwrap();
        let second = params.fit(&data).unwrap();
        assert_eq!(first.alpha(), second.alpha());
        assert_eq!(first.l1_ratio(), second.l1_ratio());
        assert_eq!(first.cv_scores(), second.cv_scores());
        assert_eq!(first.coef(), second.coef());
    }

    #[test]
    fn selected_point_has_best_score() {
        let data = dataset(2);
        let cv = SurvivalModelCv::params()
            .l1_ratios(vec![0.5, 1.0])
            .n_alphas(8)
            .eps(1e-2)
            .random_state(7)
            .fit(&data)
            .unwrap();

        assert_eq!(cv.alphas().dim(), (2, 8));
        assert_eq!(cv.cv_scores().dim(), (2, 8));
        let best = cv.cv_scores().fold(f64::NEG_INFINITY, |m, s| m.max(*s));
        let (r, k) = cv
            .cv_scores()
            .indexed_iter()
            .find(|(_, s)| **s == best)
            .map(|(idx, _)| idx)
            .unwrap();
        assert_eq!(cv.alpha(), cv.alphas()[[r, k]]);
        assert_eq!(cv.l1_ratio(), cv.l1_ratios()[r]);
        assert_eq!(cv.model().alpha(), cv.alpha());
        assert_eq!(cv.intercept(), 0.0);
    }

    #[test]
    fn every_scorer_gives_finite_scores() {
        let data = dataset(3);
        for method in [
            CvScoreMethod::LinearPredictor,
            CvScoreMethod::Regular,
            CvScoreMethod::Vvh,
        ]
        .iter()
        {
            let cv = SurvivalModelCv::params()
                .cv_score_method(*method)
                .alphas(vec![0.1, 0.03, 0.01])
                .cv(CvStrategy::KFold(3))
                .random_state(0)
                .fit(&data)
                .unwrap();
            assert!(cv.cv_scores().iter().all(|s| s.is_finite()));
        }
    }

    #[test]
    fn dedicated_pool_matches_global_pool() {
        let data = dataset(4);
        let params = SurvivalModelCv::params()
            .alphas(vec![0.1, 0.05, 0.02])
            .random_state(3);

        let global = params.clone().fit(&data).unwrap();
        let pooled = params.n_jobs(2).fit(&data).unwrap();
        assert_abs_diff_eq!(global.cv_scores(), pooled.cv_scores());
        assert_eq!(global.alpha(), pooled.alpha());
    }

    #[test]
    fn sample_weights_reach_folds_and_refit() {
        let data = dataset(8);
        let weights = Array1::from_shape_fn(data.nsamples(), |i| 0.5 + (i % 4) as f64 * 0.5);
        let weighted = data.clone().with_weights(weights).unwrap();
        let params = SurvivalModelCv::params()
            .cv_score_method(CvScoreMethod::Regular)
            .alphas(vec![0.1, 0.03, 0.01])
            .random_state(9)
            .check()
            .unwrap();

        let plain = params.fit(&data).unwrap();
        let cv = params.fit(&weighted).unwrap();
        assert!(cv.cv_scores().iter().all(|s| s.is_finite()));
        assert!(cv
            .cv_scores()
            .iter()
            .zip(plain.cv_scores().iter())
            .any(|(a, b)| (a - b).abs() > 1e-8));

        let refit = params
            .model()
            .with_alpha(cv.alpha(), cv.l1_ratio())
            .fit(&weighted)
            .unwrap();
        assert_abs_diff_eq!(cv.coef(), refit.coef());
    }

    #[test]
    fn custom_splits_are_checked() {
        let data = dataset(5);
        let params = SurvivalModelCv::params().alphas(vec![0.1]);

        let res = params
            .clone()
            .cv(CvStrategy::Custom(vec![((0..100).collect(), vec![150])]))
            .fit(&data);
        assert!(matches!(res, Err(SurvivalError::InvalidSplit(_))));

        let cv = params
            .cv(CvStrategy::Custom(vec![
                ((0..100).collect(), (100..150).collect()),
                ((50..150).collect(), (0..50).collect()),
            ]))
            .fit(&data)
            .unwrap();
        assert_eq!(cv.cv_scores().dim(), (1, 1));
    }

    #[test]
    fn kernel_losses_cross_validate_with_proximal_gradient() {
        let data = dataset(6);
        let model = SurvivalModelParams::new()
            .loss(LossKind::Aft(Bandwidth::Jones1990))
            .optimiser(Optimiser::ProximalGradient)
            .penalty(Penalty::Lasso)
            .max_iter(100);
        let cv = SurvivalModelCv::params()
            .model(model)
            .cv_score_method(CvScoreMethod::Regular)
            .alphas(vec![0.05, 0.01])
            .cv(CvStrategy::KFold(3))
            .random_state(1)
            .fit(&data)
            .unwrap();
        assert!(cv.cv_scores().iter().all(|s| s.is_finite()));
        assert_eq!(cv.predict(&data).len(), data.nsamples());
    }
}
