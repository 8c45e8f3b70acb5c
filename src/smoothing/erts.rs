use nalgebra::{DVector, RealField};

use super::backward_pass;
use crate::error::{Error, Result};
use crate::filter::{validate_dims, validate_init, validate_noise, Smoother};
use crate::models::DiscreteModel;
use crate::noise::Noise;
use crate::utils::jacobian::jacobian;
use crate::utils::state::{Estimate, InitCond};

/// Rauch-Tung-Striebel smoother for nonlinear systems, linearized around
/// every filtered estimate
pub struct ExtendedRtsSmoother<T: RealField> {
    model: Box<dyn DiscreteModel<T>>,
    init: InitCond<T>,
    q: Option<Box<dyn Noise<T>>>,
}

impl<T: RealField + Copy> ExtendedRtsSmoother<T> {
    pub fn new(
        model: Box<dyn DiscreteModel<T>>,
        init: &InitCond<T>,
        q: Option<Box<dyn Noise<T>>>,
    ) -> Result<Self> {
        let dims = model.dims();
        validate_dims(&dims)?;
        validate_noise(q.as_deref(), "state", dims.nx)?;
        validate_init(init, dims.nx)?;
        Ok(ExtendedRtsSmoother {
            model,
            init: init.clone(),
            q,
        })
    }

    /// Not read by the backward recursion, see `RtsSmoother::init_cond`
    pub fn init_cond(&self) -> &InitCond<T> {
        &self.init
    }
}

impl<T: RealField + Copy> Smoother<T> for ExtendedRtsSmoother<T> {
    fn smooth(
        &self,
        est: &[Estimate<T>],
        u: Option<&[DVector<T>]>,
    ) -> Result<Vec<Estimate<T>>> {
        let dims = self.model.dims();
        let model = &self.model;
        backward_pass(
            est,
            u,
            (dims.nx, dims.nu),
            self.q.as_ref().map(|q| q.cov()),
            |x, u| {
                let x_pred = model
                    .propagate(x, u, None)
                    .map_err(Error::propagation("estimate"))?;
                let f = jacobian(|x| model.propagate(x, u, None), x)
                    .map_err(Error::propagation("linearized estimate"))?;
                Ok((x_pred, f))
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::BayesianFilter;
    use crate::fixtures;
    use crate::kalman::ExtendedKalmanFilter;
    use crate::models::Unicycle;
    use crate::noise::GaussianNoise;
    use crate::smoothing::RtsSmoother;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    #[test]
    fn matches_rts_on_linear_model() {
        let init = fixtures::init_cond();
        let filtered = vec![
            Estimate::with_cov(
                DVector::from_vec(vec![1.0, 3.0]),
                DMatrix::from_row_slice(2, 2, &[0.4, 0.1, 0.1, 0.3]),
            ),
            Estimate::with_cov(
                DVector::from_vec(vec![3.6, 2.1]),
                DMatrix::from_row_slice(2, 2, &[0.3, 0.05, 0.05, 0.35]),
            ),
            Estimate::with_cov(
                DVector::from_vec(vec![5.0, 1.2]),
                DMatrix::from_row_slice(2, 2, &[0.25, 0.1, 0.1, 0.3]),
            ),
        ];
        let u = vec![DVector::from_vec(vec![-1.0]); 3];

        let erts = ExtendedRtsSmoother::new(
            Box::new(fixtures::falling_ball()),
            &init,
            Some(fixtures::state_noise()),
        )
        .unwrap();
        let rts =
            RtsSmoother::new(Box::new(fixtures::falling_ball()), &init, Some(fixtures::state_noise()))
                .unwrap();

        let a = erts.smooth(&filtered, Some(u.as_slice())).unwrap();
        let b = rts.smooth(&filtered, Some(u.as_slice())).unwrap();
        for (a, b) in a.iter().zip(b.iter()) {
            assert_relative_eq!(a.val(), b.val(), epsilon = 1e-6);
            assert_relative_eq!(a.cov().unwrap(), b.cov().unwrap(), epsilon = 1e-6);
        }
    }

    #[test]
    fn smooths_unicycle_track() {
        let dt: f64 = 0.1;
        let model = Unicycle::new(dt);
        let q = DMatrix::from_diagonal(&DVector::from_vec(vec![0.01, 0.01, 0.001, 0.1]));
        let init = InitCond::new(DVector::zeros(4), DMatrix::identity(4, 4)).unwrap();
        let mut ekf = ExtendedKalmanFilter::new(
            Box::new(model),
            &init,
            Some(Box::new(GaussianNoise::with_seed(DVector::zeros(4), q.clone(), 1).unwrap())),
            Some(Box::new(
                GaussianNoise::with_seed(DVector::zeros(2), DMatrix::identity(2, 2) * 0.1, 2)
                    .unwrap(),
            )),
        )
        .unwrap();

        let u = vec![DVector::from_vec(vec![1.0, 0.2]); 30];
        let mut truth = DVector::zeros(4);
        let mut x = DVector::zeros(4);
        let mut filtered = Vec::new();
        for uk in &u {
            truth = model.propagate(&truth, Some(uk), None).unwrap();
            let z = model.observe(&truth, None, None).unwrap();
            let est = ekf.run(&x, Some(uk), &z).unwrap();
            x = est.val().clone();
            filtered.push(est);
        }

        let erts = ExtendedRtsSmoother::new(
            Box::new(model),
            &init,
            Some(Box::new(GaussianNoise::with_seed(DVector::zeros(4), q, 3).unwrap())),
        )
        .unwrap();
        let smoothed = erts.smooth(&filtered, Some(u.as_slice())).unwrap();
        assert_eq!(smoothed.len(), filtered.len());
        for s in &smoothed {
            let ps = s.cov().unwrap();
            assert_eq!(ps, &ps.transpose());
            assert!(s.val().iter().all(|v| v.is_finite()));
        }
        assert!(matches!(erts.smooth(&[], None), Err(Error::EmptyEstimates)));
    }
}
