use log::trace;
use nalgebra::{DMatrix, DVector, RealField};

use super::{joseph_update, kalman_gain, KalmanBuffers};
use crate::error::{check_len, check_shape, Result};
use crate::filter::{
    check_input, validate_dims, validate_init, validate_noise, BayesianFilter, GaussianFilter,
};
use crate::models::DiscreteControlSystem;
use crate::noise::Noise;
use crate::utils::state::{Estimate, InitCond};

/// Linear Kalman filter
///
/// Prediction and correction use the model matrices directly:
///
/// x' = A x + B u + q,  P' = A P A^T + Q
///
/// y = C x + D u + r,   K = P' C^T (C P' C^T + R)^-1
pub struct KalmanFilter<T: RealField> {
    model: Box<dyn DiscreteControlSystem<T>>,
    q: Option<Box<dyn Noise<T>>>,
    r: Option<Box<dyn Noise<T>>>,
    buf: KalmanBuffers<T>,
}

impl<T: RealField + Copy> KalmanFilter<T> {
    /// `None` noise is treated as absent: no sample is added and no
    /// covariance term enters the equations.
    pub fn new(
        model: Box<dyn DiscreteControlSystem<T>>,
        init: &InitCond<T>,
        q: Option<Box<dyn Noise<T>>>,
        r: Option<Box<dyn Noise<T>>>,
    ) -> Result<Self> {
        let dims = model.dims();
        validate_dims(&dims)?;
        validate_noise(q.as_deref(), "state", dims.nx)?;
        validate_noise(r.as_deref(), "output", dims.ny)?;
        validate_init(init, dims.nx)?;

        check_shape("system", (dims.nx, dims.nx), model.system_matrix().shape())?;
        check_shape("output", (dims.ny, dims.nx), model.output_matrix().shape())?;
        if let Some(b) = model.control_matrix() {
            check_shape("control", (dims.nx, dims.nu), b.shape())?;
        }
        if let Some(d) = model.feedforward_matrix() {
            check_shape("feedforward", (dims.ny, dims.nu), d.shape())?;
        }

        Ok(KalmanFilter {
            buf: KalmanBuffers::new(init, dims.ny),
            model,
            q,
            r,
        })
    }

    pub fn model(&self) -> &dyn DiscreteControlSystem<T> {
        self.model.as_ref()
    }

    pub fn state_noise(&self) -> Option<&dyn Noise<T>> {
        self.q.as_deref()
    }

    pub fn output_noise(&self) -> Option<&dyn Noise<T>> {
        self.r.as_deref()
    }
}

impl<T: RealField + Copy> BayesianFilter<T> for KalmanFilter<T> {
    fn predict(&mut self, x: &DVector<T>, u: Option<&DVector<T>>) -> Result<Estimate<T>> {
        let dims = self.model.dims();
        check_len("state vector", dims.nx, x.len())?;
        check_input(u, dims.nu)?;

        let a = self.model.system_matrix();
        let mut x_next = a * x;
        if let (Some(b), Some(u)) = (self.model.control_matrix(), u) {
            x_next += b * u;
        }
        if let Some(q) = self.q.as_mut() {
            x_next += q.sample();
        }

        let mut p_next = a * &self.buf.p * a.transpose();
        if let Some(q) = self.q.as_ref() {
            p_next += q.cov();
        }
        p_next.fill_lower_triangle_with_upper_triangle();
        trace!("kf predict: x = {:?}", x_next.as_slice());

        self.buf.p_next.copy_from(&p_next);
        Ok(Estimate::with_cov(x_next, p_next))
    }

    fn update(
        &mut self,
        x: &DVector<T>,
        u: Option<&DVector<T>>,
        z: &DVector<T>,
    ) -> Result<Estimate<T>> {
        let dims = self.model.dims();
        check_len("measurement vector", dims.ny, z.len())?;
        check_len("state vector", dims.nx, x.len())?;
        check_input(u, dims.nu)?;

        let c = self.model.output_matrix();
        let mut y = c * x;
        if let (Some(d), Some(u)) = (self.model.feedforward_matrix(), u) {
            y += d * u;
        }
        if let Some(r) = self.r.as_mut() {
            y += r.sample();
        }

        let r_cov = self.r.as_ref().map(|r| r.cov());
        let k = kalman_gain(&self.buf.p_next, c, r_cov)?;
        let inn = z - y;
        let x_corr = x + &k * &inn;
        let p_corr = joseph_update(&self.buf.p_next, &k, c, r_cov);
        trace!("kf update: innovation = {:?}", inn.as_slice());

        self.buf.store(&inn, &k, &p_corr);
        Ok(Estimate::with_cov(x_corr, p_corr))
    }
}

impl<T: RealField + Copy> GaussianFilter<T> for KalmanFilter<T> {
    fn cov(&self) -> DMatrix<T> {
        self.buf.p.clone()
    }

    fn set_cov(&mut self, cov: &DMatrix<T>) -> Result<()> {
        self.buf.set_cov(cov)
    }

    fn gain(&self) -> DMatrix<T> {
        self.buf.k.clone()
    }

    fn innovation(&self) -> DVector<T> {
        self.buf.inn.clone()
    }
}
