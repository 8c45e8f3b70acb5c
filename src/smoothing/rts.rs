use nalgebra::{DVector, RealField};

use super::backward_pass;
use crate::error::{check_shape, Error, Result};
use crate::filter::{validate_dims, validate_init, validate_noise, Smoother};
use crate::models::DiscreteControlSystem;
use crate::noise::Noise;
use crate::utils::state::{Estimate, InitCond};

/// Rauch-Tung-Striebel smoother for linear systems
pub struct RtsSmoother<T: RealField> {
    model: Box<dyn DiscreteControlSystem<T>>,
    init: InitCond<T>,
    q: Option<Box<dyn Noise<T>>>,
}

impl<T: RealField + Copy> RtsSmoother<T> {
    pub fn new(
        model: Box<dyn DiscreteControlSystem<T>>,
        init: &InitCond<T>,
        q: Option<Box<dyn Noise<T>>>,
    ) -> Result<Self> {
        let dims = model.dims();
        validate_dims(&dims)?;
        validate_noise(q.as_deref(), "state", dims.nx)?;
        validate_init(init, dims.nx)?;
        check_shape("system", (dims.nx, dims.nx), model.system_matrix().shape())?;

        Ok(RtsSmoother {
            model,
            init: init.clone(),
            q,
        })
    }

    /// Initial condition of the filtered sequence.
    ///
    /// Only validated; the backward recursion starts from the last filtered
    /// estimate and does not read it.
    pub fn init_cond(&self) -> &InitCond<T> {
        &self.init
    }
}

impl<T: RealField + Copy> Smoother<T> for RtsSmoother<T> {
    fn smooth(
        &self,
        est: &[Estimate<T>],
        u: Option<&[DVector<T>]>,
    ) -> Result<Vec<Estimate<T>>> {
        let dims = self.model.dims();
        let model = &self.model;
        let a = model.system_matrix();
        backward_pass(
            est,
            u,
            (dims.nx, dims.nu),
            self.q.as_ref().map(|q| q.cov()),
            |x, u| {
                let x_pred = model
                    .propagate(x, u, None)
                    .map_err(Error::propagation("estimate"))?;
                Ok((x_pred, a.clone()))
            },
        )
    }
}
