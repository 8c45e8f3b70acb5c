//! Recursive Bayesian state estimation for discrete time systems.
//!
//! Kalman, extended, iterated extended, unscented and bootstrap particle
//! filters share the [`filter::BayesianFilter`] predict / update cycle over
//! a [`models::DiscreteModel`]. Filtered sequences can be smoothed with the
//! Rauch-Tung-Striebel smoothers in [`smoothing`].

pub mod error;
pub mod filter;
pub mod kalman;
pub mod models;
pub mod noise;
pub mod particle;
pub mod random;
pub mod smoothing;
pub mod utils;

#[cfg(test)]
mod fixtures;

pub use error::{Error, Result};
pub use utils::state::{Estimate, InitCond};
