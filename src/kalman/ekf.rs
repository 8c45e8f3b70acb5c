use log::trace;
use nalgebra::{DMatrix, DVector, RealField};

use super::{joseph_update, kalman_gain, KalmanBuffers};
use crate::error::{check_len, Error, Result};
use crate::filter::{
    check_input, validate_dims, validate_init, validate_noise, BayesianFilter, GaussianFilter,
};
use crate::models::DiscreteModel;
use crate::noise::Noise;
use crate::utils::jacobian::jacobian;
use crate::utils::state::{Estimate, InitCond};

/// Extended Kalman filter.
///
/// The model is linearized at every step with central difference Jacobians
/// of `propagate` and `observe` taken without noise.
pub struct ExtendedKalmanFilter<T: RealField> {
    pub(super) model: Box<dyn DiscreteModel<T>>,
    pub(super) q: Option<Box<dyn Noise<T>>>,
    pub(super) r: Option<Box<dyn Noise<T>>>,
    pub(super) buf: KalmanBuffers<T>,
    /// state transition Jacobian
    f: DMatrix<T>,
    /// observation Jacobian
    h: DMatrix<T>,
}

impl<T: RealField + Copy> ExtendedKalmanFilter<T> {
    pub fn new(
        model: Box<dyn DiscreteModel<T>>,
        init: &InitCond<T>,
        q: Option<Box<dyn Noise<T>>>,
        r: Option<Box<dyn Noise<T>>>,
    ) -> Result<Self> {
        let dims = model.dims();
        validate_dims(&dims)?;
        validate_noise(q.as_deref(), "state", dims.nx)?;
        validate_noise(r.as_deref(), "output", dims.ny)?;
        validate_init(init, dims.nx)?;

        Ok(ExtendedKalmanFilter {
            buf: KalmanBuffers::new(init, dims.ny),
            f: DMatrix::zeros(dims.nx, dims.nx),
            h: DMatrix::zeros(dims.ny, dims.nx),
            model,
            q,
            r,
        })
    }

    pub fn model(&self) -> &dyn DiscreteModel<T> {
        self.model.as_ref()
    }

    /// Jacobian of the last prediction
    pub fn state_jacobian(&self) -> DMatrix<T> {
        self.f.clone()
    }

    /// Jacobian of the last update
    pub fn output_jacobian(&self) -> DMatrix<T> {
        self.h.clone()
    }

    /// Observation Jacobian at `x`, noise free
    pub(super) fn linearize_output(
        &self,
        x: &DVector<T>,
        u: Option<&DVector<T>>,
    ) -> Result<DMatrix<T>> {
        let model = &self.model;
        let h = jacobian(|x| model.observe(x, u, None), x)
            .map_err(Error::observation("linearized output"))?;
        check_len("observation jacobian rows", self.buf.inn.len(), h.nrows())?;
        Ok(h)
    }

    pub(super) fn check_update_args(
        &self,
        x: &DVector<T>,
        u: Option<&DVector<T>>,
        z: &DVector<T>,
    ) -> Result<()> {
        let dims = self.model.dims();
        check_len("measurement vector", dims.ny, z.len())?;
        check_len("state vector", dims.nx, x.len())?;
        check_input(u, dims.nu)
    }

    pub(super) fn store_output_jacobian(&mut self, h: &DMatrix<T>) {
        self.h.copy_from(h);
    }
}

impl<T: RealField + Copy> BayesianFilter<T> for ExtendedKalmanFilter<T> {
    fn predict(&mut self, x: &DVector<T>, u: Option<&DVector<T>>) -> Result<Estimate<T>> {
        let dims = self.model.dims();
        check_len("state vector", dims.nx, x.len())?;
        check_input(u, dims.nu)?;

        let q = self.q.as_mut().map(|q| q.sample());
        let x_next = self
            .model
            .propagate(x, u, q.as_ref())
            .map_err(Error::propagation("system state"))?;
        check_len("propagated state", dims.nx, x_next.len())?;

        let model = &self.model;
        let f = jacobian(|x| model.propagate(x, u, None), x)
            .map_err(Error::propagation("linearized state"))?;

        let mut p_next = &f * &self.buf.p * f.transpose();
        if let Some(q) = self.q.as_ref() {
            p_next += q.cov();
        }
        p_next.fill_lower_triangle_with_upper_triangle();
        trace!("ekf predict: x = {:?}", x_next.as_slice());

        self.f.copy_from(&f);
        self.buf.p_next.copy_from(&p_next);
        Ok(Estimate::with_cov(x_next, p_next))
    }

    fn update(
        &mut self,
        x: &DVector<T>,
        u: Option<&DVector<T>>,
        z: &DVector<T>,
    ) -> Result<Estimate<T>> {
        self.check_update_args(x, u, z)?;

        let r = self.r.as_mut().map(|r| r.sample());
        let y = self
            .model
            .observe(x, u, r.as_ref())
            .map_err(Error::observation("system state"))?;
        check_len("observed output", z.len(), y.len())?;
        let h = self.linearize_output(x, u)?;

        let r_cov = self.r.as_ref().map(|r| r.cov());
        let k = kalman_gain(&self.buf.p_next, &h, r_cov)?;
        let inn = z - y;
        let x_corr = x + &k * &inn;
        let p_corr = joseph_update(&self.buf.p_next, &k, &h, r_cov);
        trace!("ekf update: innovation = {:?}", inn.as_slice());

        self.buf.store(&inn, &k, &p_corr);
        self.store_output_jacobian(&h);
        Ok(Estimate::with_cov(x_corr, p_corr))
    }
}

impl<T: RealField + Copy> GaussianFilter<T> for ExtendedKalmanFilter<T> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::kalman::KalmanFilter;
    use crate::models::Unicycle;
    use crate::noise::GaussianNoise;
    use crate::utils::deg2rad;
    use approx::assert_relative_eq;

    #[test]
    fn matches_kf_on_linear_model() {
        fixtures::init_logger();
        let init = fixtures::init_cond();
        let mut ekf =
            ExtendedKalmanFilter::new(Box::new(fixtures::falling_ball()), &init, None, None)
                .unwrap();
        let mut kf =
            KalmanFilter::new(Box::new(fixtures::falling_ball()), &init, None, None).unwrap();

        let x = DVector::from_vec(vec![1.0, 1.0]);
        let u = DVector::from_vec(vec![-1.0]);
        let z = DVector::from_vec(vec![-1.5]);
        let a = ekf.run(&x, Some(&u), &z).unwrap();
        let b = kf.run(&x, Some(&u), &z).unwrap();
        assert_relative_eq!(a.val(), b.val(), epsilon = 1e-6);
        assert_relative_eq!(a.cov().unwrap(), b.cov().unwrap(), epsilon = 1e-6);
        assert_relative_eq!(
            ekf.state_jacobian(),
            DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 0.0, 1.0]),
            epsilon = 1e-8
        );
    }

    #[test]
    fn falling_ball_with_noise() {
        let init = fixtures::init_cond();
        let mut ekf = ExtendedKalmanFilter::new(
            Box::new(fixtures::falling_ball()),
            &init,
            Some(fixtures::state_noise()),
            Some(fixtures::output_noise()),
        )
        .unwrap();
        let x = DVector::from_vec(vec![1.0, 1.0]);
        let u = DVector::from_vec(vec![-1.0]);
        let z = DVector::from_vec(vec![-1.5]);
        let est = ekf.run(&x, Some(&u), &z).unwrap();
        let cov = est.cov().unwrap();
        assert_eq!(cov, &cov.transpose());
        assert!(cov.clone().cholesky().is_some());

        let u3 = DVector::from_vec(vec![-1.0, 2.0, 3.0]);
        assert!(ekf.predict(&x, Some(&u3)).is_err());
        assert!(ekf.update(&x, Some(&u), &DVector::zeros(2)).is_err());
    }

    #[test]
    fn tracks_unicycle() {
        let dt: f64 = 0.1;
        let model = Unicycle::new(dt);
        let q = DMatrix::from_diagonal(&DVector::from_vec(vec![0.1, 0.1, deg2rad(1.0), 1.0]));
        let r = DMatrix::identity(2, 2);
        let init = InitCond::new(DVector::zeros(4), DMatrix::identity(4, 4)).unwrap();
        let mut ekf = ExtendedKalmanFilter::new(
            Box::new(model),
            &init,
            Some(Box::new(GaussianNoise::with_seed(DVector::zeros(4), q, 5).unwrap())),
            Some(Box::new(GaussianNoise::with_seed(DVector::zeros(2), r, 6).unwrap())),
        )
        .unwrap();

        let u = DVector::from_vec(vec![1.0, 0.1]);
        let mut truth = DVector::zeros(4);
        let mut x = DVector::zeros(4);
        for _ in 0..50 {
            truth = model.propagate(&truth, Some(&u), None).unwrap();
            let z = model.observe(&truth, None, None).unwrap();
            let est = ekf.run(&x, Some(&u), &z).unwrap();
            let cov = est.cov().unwrap();
            assert_eq!(cov, &cov.transpose());
            x = est.val().clone();
        }
        assert!((x.rows(0, 2) - truth.rows(0, 2)).norm() < 5.0);
    }
}
