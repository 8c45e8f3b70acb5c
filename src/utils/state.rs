use nalgebra::{DMatrix, DVector, RealField};
use serde::{Deserialize, Serialize};

use crate::error::{check_shape, Result};
use crate::utils::matrix::check_symmetric;

/// Initial condition of an estimator: starting state and its covariance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitCond<T: RealField> {
    state: DVector<T>,
    cov: DMatrix<T>,
}

impl<T: RealField + Copy> InitCond<T> {
    pub fn new(state: DVector<T>, cov: DMatrix<T>) -> Result<Self> {
        let n = state.len();
        check_shape("initial covariance", (n, n), cov.shape())?;
        check_symmetric(&cov, "initial covariance")?;
        Ok(InitCond { state, cov })
    }

    pub fn state(&self) -> &DVector<T> {
        &self.state
    }

    pub fn cov(&self) -> &DMatrix<T> {
        &self.cov
    }
}

/// Snapshot of a filter step.
///
/// Estimates are never mutated by the filters; every step returns a new one.
/// The covariance is absent for estimators that do not track it (the
/// particle filter).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimate<T: RealField> {
    x: DVector<T>,
    cov: Option<DMatrix<T>>,
}

impl<T: RealField> Estimate<T> {
    pub fn new(x: DVector<T>) -> Self {
        Estimate { x, cov: None }
    }

    pub fn with_cov(x: DVector<T>, cov: DMatrix<T>) -> Self {
        Estimate { x, cov: Some(cov) }
    }

    /// State vector
    pub fn val(&self) -> &DVector<T> {
        &self.x
    }

    /// Covariance matrix, if the estimator provides one
    pub fn cov(&self) -> Option<&DMatrix<T>> {
        self.cov.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn init_cond_checks_dims() {
        let ok = InitCond::new(DVector::from_vec(vec![1.0, 3.0]), DMatrix::identity(2, 2) * 0.25);
        assert!(ok.is_ok());

        let bad = InitCond::new(DVector::from_vec(vec![1.0, 3.0]), DMatrix::<f64>::identity(3, 3));
        assert!(matches!(bad, Err(Error::InvalidMatrixDims { .. })));

        let asym = DMatrix::from_row_slice(2, 2, &[1.0, 0.5, 0.0, 1.0]);
        let bad = InitCond::new(DVector::from_vec(vec![1.0, 3.0]), asym);
        assert!(matches!(bad, Err(Error::InvalidCovariance(_))));
    }

    #[test]
    fn estimate_serde() {
        let est = Estimate::with_cov(DVector::from_vec(vec![1.0, 2.0]), DMatrix::identity(2, 2));
        let json = serde_json::to_string(&est).unwrap();
        let back: Estimate<f64> = serde_json::from_str(&json).unwrap();
        assert_eq!(est, back);
        assert!(Estimate::new(DVector::from_vec(vec![0.0])).cov().is_none());
    }
}
