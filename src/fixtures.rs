//! Shared test setup: a falling ball sampled once per second.

use nalgebra::{DMatrix, DVector};

use crate::models::DiscreteSystem;
use crate::noise::{GaussianNoise, Noise};
use crate::utils::state::InitCond;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// x = [position, velocity], u = [acceleration], y = [position]
pub fn falling_ball() -> DiscreteSystem<f64> {
    DiscreteSystem::new(
        DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 0.0, 1.0]),
        Some(DMatrix::from_row_slice(2, 1, &[0.5, 1.0])),
        DMatrix::from_row_slice(1, 2, &[1.0, 0.0]),
        Some(DMatrix::zeros(1, 1)),
        None,
    )
    .unwrap()
}

pub fn init_cond() -> InitCond<f64> {
    InitCond::new(
        DVector::from_vec(vec![1.0, 3.0]),
        DMatrix::identity(2, 2) * 0.25,
    )
    .unwrap()
}

pub fn state_noise() -> Box<dyn Noise<f64>> {
    Box::new(GaussianNoise::with_seed(DVector::zeros(2), DMatrix::identity(2, 2) * 0.25, 1).unwrap())
}

pub fn output_noise() -> Box<dyn Noise<f64>> {
    Box::new(GaussianNoise::with_seed(DVector::zeros(1), DMatrix::identity(1, 1) * 0.25, 2).unwrap())
}
