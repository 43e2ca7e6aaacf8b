use ndarray::{array, Axis};
use ndarray_rand::rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use survhive::prelude::*;
use survhive_datasets::generate::sparse_cox;
use survhive_penalized::{
    CvScoreMethod, CvStrategy, Optimiser, Penalty, SurvivalModel, SurvivalModelCv,
    SurvivalModelParams,
};

#[test]
fn cross_validated_cox_recovers_informative_features() {
    let mut rng = Xoshiro256Plus::seed_from_u64(42);
    let (dataset, truth) = sparse_cox(300, 10, 3, 1.0, 0.3, &mut rng);

    let cv = SurvivalModelCv::params()
        .n_alphas(20)
        .eps(1e-2)
        .random_state(42)
        .fit(&dataset)
        .expect("Cross validation failed");

    // informative features keep their sign
    for j in 0..3 {
        assert!(
            cv.coef()[j] * truth[j] > 0.0,
            "feature {} has coefficient {}",
            j,
            cv.coef()[j]
        );
    }
    let noise = cv.coef().iter().skip(3).filter(|c| **c != 0.0).count();
    assert!(noise < 7, "{} noise features selected", noise);
}

#[test]
fn encoded_targets_round_trip_through_fit() {
    let mut rng = Xoshiro256Plus::seed_from_u64(7);
    let (dataset, _) = sparse_cox(120, 4, 2, 1.0, 0.3, &mut rng);

    let encoded = dataset.encoded_targets();
    let decoded =
        SurvivalDataset::from_encoded(dataset.records().clone(), &encoded).expect("Decoding failed");

    let params = SurvivalModel::params().alpha(0.02);
    let first = params.fit(&dataset).expect("Training failed");
    let second = params.fit(&decoded).expect("Training failed");
    assert_eq!(first.coef(), second.coef());
}

#[test]
fn vvh_scoring_with_group_penalty() {
    let mut rng = Xoshiro256Plus::seed_from_u64(3);
    let (dataset, _) = sparse_cox(150, 6, 2, 1.0, 0.3, &mut rng);

    let model = SurvivalModelParams::new()
        .optimiser(Optimiser::ProximalGradient)
        .penalty(Penalty::GroupLasso)
        .groups(survhive_penalized::Groups::from_labels(&[0, 0, 1, 1, 2, 2]))
        .max_iter(300);
    let cv = SurvivalModelCv::params()
        .model(model)
        .cv_score_method(CvScoreMethod::Vvh)
        .cv(CvStrategy::KFold(3))
        .n_alphas(6)
        .eps(1e-2)
        .random_state(0)
        .fit(&dataset)
        .expect("Cross validation failed");

    // groups enter or leave as a whole
    for pair in cv.coef().exact_chunks(2) {
        assert_eq!(pair[0] == 0.0, pair[1] == 0.0);
    }

    let times = array![0.1, 0.5, 1.0, 2.0];
    let survival = cv
        .predict_survival_function(dataset.records(), &times)
        .expect("Prediction failed");
    for row in survival.axis_iter(Axis(0)) {
        assert!(row.iter().all(|s| (0.0..=1.0).contains(s)));
        assert!(row.windows(2).into_iter().all(|w| w[0] >= w[1]));
    }
}
