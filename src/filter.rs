use nalgebra::{DMatrix, DVector, RealField};

use crate::error::{check_len, Error, Result};
use crate::models::SystemDims;
use crate::noise::Noise;
use crate::utils::state::{Estimate, InitCond};

/// Recursive Bayesian filter
pub trait BayesianFilter<T: RealField> {
    /// Propagates `x` through the model and returns the prior estimate
    fn predict(&mut self, x: &DVector<T>, u: Option<&DVector<T>>) -> Result<Estimate<T>>;

    /// Corrects `x` with the measurement `z` and returns the posterior estimate
    fn update(
        &mut self,
        x: &DVector<T>,
        u: Option<&DVector<T>>,
        z: &DVector<T>,
    ) -> Result<Estimate<T>>;

    /// Predict followed by update on the predicted state
    fn run(
        &mut self,
        x: &DVector<T>,
        u: Option<&DVector<T>>,
        z: &DVector<T>,
    ) -> Result<Estimate<T>> {
        let pred = self.predict(x, u)?;
        self.update(pred.val(), u, z)
    }
}

/// Filter tracking a Gaussian posterior.
///
/// Accessors return copies of the internal buffers.
pub trait GaussianFilter<T: RealField>: BayesianFilter<T> {
    /// Current (corrected) state covariance
    fn cov(&self) -> DMatrix<T>;

    fn set_cov(&mut self, cov: &DMatrix<T>) -> Result<()>;

    /// Kalman gain of the last update
    fn gain(&self) -> DMatrix<T>;

    /// Innovation `z - y` of the last update
    fn innovation(&self) -> DVector<T>;
}

/// Filter representing the posterior with weighted samples
pub trait ParticleFilter<T: RealField>: BayesianFilter<T> {
    /// Particles, one per column
    fn particles(&self) -> DMatrix<T>;

    fn weights(&self) -> DVector<T>;

    /// Draws a new particle set from the current weights
    fn resample(&mut self, alpha: T) -> Result<()>;
}

/// Fixed interval smoother over a sequence of filtered estimates
pub trait Smoother<T: RealField> {
    /// `u`, when given, holds the input applied after each estimate
    fn smooth(
        &self,
        est: &[Estimate<T>],
        u: Option<&[DVector<T>]>,
    ) -> Result<Vec<Estimate<T>>>;
}

pub(crate) fn validate_dims(dims: &SystemDims) -> Result<()> {
    if dims.nx == 0 || dims.ny == 0 {
        return Err(Error::InvalidModelDims {
            nx: dims.nx,
            ny: dims.ny,
        });
    }
    Ok(())
}

pub(crate) fn validate_noise<T: RealField>(
    noise: Option<&dyn Noise<T>>,
    kind: &'static str,
    expected: usize,
) -> Result<()> {
    match noise {
        Some(n) if n.dim() != expected => Err(Error::InvalidNoiseDim {
            kind,
            expected,
            got: n.dim(),
        }),
        _ => Ok(()),
    }
}

pub(crate) fn validate_init<T: RealField + Copy>(init: &InitCond<T>, nx: usize) -> Result<()> {
    check_len("initial state", nx, init.state().len())
}

pub(crate) fn check_input<T: RealField>(u: Option<&DVector<T>>, nu: usize) -> Result<()> {
    match u {
        Some(u) => check_len("input vector", nu, u.len()),
        None => Ok(()),
    }
}
