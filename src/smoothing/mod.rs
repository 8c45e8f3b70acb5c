use log::debug;
use nalgebra::{DMatrix, DVector, RealField};

use crate::error::{check_len, check_shape, Error, Result};
use crate::utils::state::Estimate;

mod erts;
mod rts;

pub use erts::ExtendedRtsSmoother;
pub use rts::RtsSmoother;

/// Rauch-Tung-Striebel backward recursion.
///
/// The last filtered estimate is already smoothed. Going backwards, each
/// filtered estimate `k` is propagated to `k+1` by `linearize`, which returns
/// the predicted state and the state transition matrix used for the
/// covariance:
///
/// P(k+1|k) = F P(k) F^T + Q
/// C        = P(k) F^T P(k+1|k)^-1
/// xs(k)    = x(k) + C (xs(k+1) - x(k+1|k))
/// Ps(k)    = P(k) + C (Ps(k+1) - P(k+1|k)) C^T
///
/// `u[k]` is the input applied after estimate `k`.
pub(crate) fn backward_pass<T, F>(
    est: &[Estimate<T>],
    u: Option<&[DVector<T>]>,
    (nx, nu): (usize, usize),
    q: Option<&DMatrix<T>>,
    mut linearize: F,
) -> Result<Vec<Estimate<T>>>
where
    T: RealField + Copy,
    F: FnMut(&DVector<T>, Option<&DVector<T>>) -> Result<(DVector<T>, DMatrix<T>)>,
{
    if est.is_empty() {
        return Err(Error::EmptyEstimates);
    }
    if let Some(u) = u {
        check_len("input sequence", est.len(), u.len())?;
        for uk in u {
            check_len("input vector", nu, uk.len())?;
        }
    }
    let mut covs = Vec::with_capacity(est.len());
    for (k, e) in est.iter().enumerate() {
        check_len("estimate state", nx, e.val().len())?;
        let cov = e.cov().ok_or(Error::MissingCovariance(k))?;
        check_shape("estimate covariance", (nx, nx), cov.shape())?;
        covs.push(cov);
    }
    debug!("rts: smoothing {} estimates", est.len());

    let last = est.len() - 1;
    let mut xs = est[last].val().clone();
    let mut ps = covs[last].clone();
    let mut smoothed = Vec::with_capacity(est.len());
    smoothed.push(Estimate::with_cov(xs.clone(), ps.clone()));

    for k in (0..last).rev() {
        let x = est[k].val();
        let p = covs[k];
        let (x_pred, f) = linearize(x, u.map(|u| &u[k]))?;
        check_len("predicted state", nx, x_pred.len())?;

        let mut p_pred = &f * p * f.transpose();
        if let Some(q) = q {
            p_pred += q;
        }
        let p_pred_inv = p_pred
            .clone()
            .try_inverse()
            .ok_or(Error::SingularMatrix("predicted covariance"))?;
        let c = p * f.transpose() * p_pred_inv;

        xs = x + &c * (&xs - x_pred);
        ps = p + &c * (&ps - &p_pred) * c.transpose();
        ps.fill_lower_triangle_with_upper_triangle();
        smoothed.push(Estimate::with_cov(xs.clone(), ps.clone()));
    }

    smoothed.reverse();
    Ok(smoothed)
}
