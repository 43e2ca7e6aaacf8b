//! `survhive-datasets` provides synthetic survival data ready to be used in tests, benchmarks and
//! examples.
//!
//! ## The Big Picture
//!
//! `survhive-datasets` is a crate in the `survhive` workspace. Real cohorts are loaded and
//! preprocessed by the application; the generators here draw right-censored samples from a known
//! proportional hazards model so that estimators can be checked against the true coefficients.
//!
//! ## Using a generator
//!
//! ```
//! use ndarray::array;
//! use ndarray_rand::rand::SeedableRng;
//! use rand_xoshiro::Xoshiro256Plus;
//! use survhive_datasets::generate;
//!
//! let mut rng = Xoshiro256Plus::seed_from_u64(42);
//! let dataset = generate::exponential_cox(100, &array![1.0, -0.5, 0.0], 0.3, &mut rng);
//! assert_eq!(dataset.nsamples(), 100);
//! ```

pub mod generate;
