//! Calibrate the free parameters of a surrogate model by minimizing its loss.
//!
//! A [`GlobalRegressor`](regression::GlobalRegressor) searches a bounded box
//! without derivatives, by differential evolution or basin hopping. A
//! [`LocalRegressor`](regression::LocalRegressor) descends from the model's
//! current parameters with BFGS, asking the model for its loss and gradient
//! together. Models plug in through the [`Model`](loss::Model) trait; the
//! minimizers underneath are usable on their own from [`global`] and
//! [`vector`].
#[macro_use]
extern crate derive_builder;

extern crate float_cmp;
extern crate ndarray;
extern crate num_traits;

pub mod bounds;
pub mod error;
pub mod global;
pub mod loss;
pub mod minimizer;
pub mod options;
pub mod regression;
pub mod utils;
pub mod vector;

pub use crate::error::{Error, Result};
pub use crate::loss::{LossFunction, Model};
pub use crate::minimizer::{OptimResult, Status};
pub use crate::options::{OptionValue, Options};
pub use crate::regression::{GlobalMethod, GlobalRegressor, LocalMethod, LocalRegressor};
