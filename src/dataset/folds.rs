use ndarray::{ArrayBase, Data, Ix1};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// K-fold splitter stratified by the event indicator
///
/// Events and censored samples are dealt round-robin over the folds separately, so every fold
/// sees (up to rounding) the same proportion of observed events. With a seed both strata are
/// shuffled before dealing; the same seed always produces the same folds.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq)]
pub struct StratifiedKFold {
    n_splits: usize,
    seed: Option<u64>,
}

impl StratifiedKFold {
    pub fn new(n_splits: usize) -> Self {
        StratifiedKFold {
            n_splits,
            seed: None,
        }
    }

    /// Shuffle both strata with a seeded random number generator before dealing
    pub fn shuffle(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Split the samples into `(train, test)` index pairs
    ///
    /// Indices within each pair are sorted ascending. Every sample appears in exactly one test
    /// fold.
    pub fn split<D: Data<Elem = bool>>(
        &self,
        event: &ArrayBase<D, Ix1>,
    ) -> Result<Vec<(Vec<usize>, Vec<usize>)>> {
        let n_samples = event.len();
        if self.n_splits < 2 || self.n_splits > n_samples {
            return Err(Error::InvalidFolds {
                n_splits: self.n_splits,
                n_samples,
            });
        }

        let (mut events, mut censored): (Vec<usize>, Vec<usize>) =
            (0..n_samples).partition(|&i| event[i]);

        if let Some(seed) = self.seed {
            let mut rng = SmallRng::seed_from_u64(seed);
            events.shuffle(&mut rng);
            censored.shuffle(&mut rng);
        }

        // censored samples continue where the events stopped, keeping fold sizes balanced
        let mut assignment = vec![0; n_samples];
        for (pos, &idx) in events.iter().chain(censored.iter()).enumerate() {
            assignment[idx] = pos % self.n_splits;
        }

        Ok((0..self.n_splits)
            .map(|fold| {
                let (test, train): (Vec<usize>, Vec<usize>) =
                    (0..n_samples).partition(|&i| assignment[i] == fold);
                (train, test)
            })
            .collect())
    }
}
