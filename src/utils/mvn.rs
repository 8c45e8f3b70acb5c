use nalgebra::{DMatrix, DVector, RealField};

use crate::error::{check_shape, Error, Result};

/// Multivariate normal density, typically used as the measurement error
/// density of a particle filter
#[derive(Debug, Clone)]
pub struct MultiVariateNormal<T: RealField> {
    mean: DVector<T>,
    precision: DMatrix<T>,
    ln_factor: T,
}

impl<T: RealField + Copy> MultiVariateNormal<T> {
    pub fn new(mean: &DVector<T>, covariance: &DMatrix<T>) -> Result<Self> {
        let n = mean.len();
        check_shape("covariance", (n, n), covariance.shape())?;
        let Some(covariance_cholesky) = covariance.clone().cholesky() else {
            return Err(Error::InvalidCovariance(
                "covariance is not positive definite".to_string(),
            ));
        };
        let det = covariance_cholesky.determinant();
        let precision = covariance_cholesky.inverse();
        let n: T = nalgebra::convert(n as f64);
        let half: T = nalgebra::convert(0.5);
        let ln_factor = -half * (n * T::two_pi().ln() + det.ln());
        Ok(MultiVariateNormal {
            mean: mean.clone(),
            precision,
            ln_factor,
        })
    }

    /// Probability density function
    pub fn pdf(&self, x: &DVector<T>) -> T {
        self.ln_pdf(x).exp()
    }

    /// Natural log of the probability density function
    pub fn ln_pdf(&self, x: &DVector<T>) -> T {
        let dx = &self.mean - x;
        let half: T = nalgebra::convert(0.5);
        let interior = dx.dot(&(&self.precision * &dx));
        self.ln_factor - half * interior
    }

    pub fn mean(&self) -> &DVector<T> {
        &self.mean
    }
}
