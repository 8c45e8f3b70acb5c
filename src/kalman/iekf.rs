use log::trace;
use nalgebra::{DMatrix, DVector, RealField};

use super::{joseph_update, kalman_gain, ExtendedKalmanFilter};
use crate::error::{check_len, Error, Result};
use crate::filter::{BayesianFilter, GaussianFilter};
use crate::models::DiscreteModel;
use crate::noise::Noise;
use crate::utils::state::{Estimate, InitCond};

/// Iterated extended Kalman filter.
///
/// Prediction is the EKF one. The update relinearizes the observation model
/// `n` times around the current iterate (Gauss-Newton on the measurement
/// residual):
///
/// x(i+1) = x + K(i) (z - h(x(i)) - H(i) (x - x(i)))
///
/// With `n == 1` the update is exactly the EKF update.
pub struct IteratedExtendedKalmanFilter<T: RealField> {
    ekf: ExtendedKalmanFilter<T>,
    n: usize,
}

impl<T: RealField + Copy> IteratedExtendedKalmanFilter<T> {
    pub fn new(
        model: Box<dyn DiscreteModel<T>>,
        init: &InitCond<T>,
        q: Option<Box<dyn Noise<T>>>,
        r: Option<Box<dyn Noise<T>>>,
        n: usize,
    ) -> Result<Self> {
        if n == 0 {
            return Err(Error::InvalidIterations(n));
        }
        Ok(IteratedExtendedKalmanFilter {
            ekf: ExtendedKalmanFilter::new(model, init, q, r)?,
            n,
        })
    }

    pub fn iterations(&self) -> usize {
        self.n
    }

    pub fn model(&self) -> &dyn DiscreteModel<T> {
        self.ekf.model()
    }
}

impl<T: RealField + Copy> BayesianFilter<T> for IteratedExtendedKalmanFilter<T> {
    fn predict(&mut self, x: &DVector<T>, u: Option<&DVector<T>>) -> Result<Estimate<T>> {
        self.ekf.predict(x, u)
    }

    fn update(
        &mut self,
        x: &DVector<T>,
        u: Option<&DVector<T>>,
        z: &DVector<T>,
    ) -> Result<Estimate<T>> {
        self.ekf.check_update_args(x, u, z)?;

        // one measurement noise draw for the whole iteration
        let r = self.ekf.r.as_mut().map(|r| r.sample());
        let r_cov = self.ekf.r.as_ref().map(|r| r.cov());

        let mut xi = x.clone();
        let mut inn = DVector::zeros(z.len());
        let mut k = DMatrix::zeros(x.len(), z.len());
        let mut h = DMatrix::zeros(z.len(), x.len());
        for i in 0..self.n {
            let y = self
                .ekf
                .model
                .observe(&xi, u, r.as_ref())
                .map_err(Error::observation("system state"))?;
            check_len("observed output", z.len(), y.len())?;
            h = self.ekf.linearize_output(&xi, u)?;
            k = kalman_gain(&self.ekf.buf.p_next, &h, r_cov)?;
            inn = z - y;
            let residual = &inn - &h * (x - &xi);
            xi = x + &k * residual;
            trace!("iekf iteration {i}: innovation = {:?}", inn.as_slice());
        }

        let p_corr = joseph_update(&self.ekf.buf.p_next, &k, &h, r_cov);
        self.ekf.buf.store(&inn, &k, &p_corr);
        self.ekf.store_output_jacobian(&h);
        Ok(Estimate::with_cov(xi, p_corr))
    }
}

impl<T: RealField + Copy> GaussianFilter<T> for IteratedExtendedKalmanFilter<T> {
    fn cov(&self) -> DMatrix<T> {
        self.ekf.cov()
    }

    fn set_cov(&mut self, cov: &DMatrix<T>) -> Result<()> {
        self.ekf.set_cov(cov)
    }

    fn gain(&self) -> DMatrix<T> {
        self.ekf.gain()
    }

    fn innovation(&self) -> DVector<T> {
        self.ekf.innovation()
    }
}
