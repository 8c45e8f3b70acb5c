use nalgebra::{DVector, RealField};

use super::{DiscreteModel, SystemDims};
use crate::error::{check_len, Result};

/// Constant velocity unicycle sampled every `dt`.
///
/// State = [x, y, yaw, v], input = [v, yaw_rate], output = [x, y]
///
/// x(k+1)   = x + cos(yaw) v dt
/// y(k+1)   = y + sin(yaw) v dt
/// yaw(k+1) = yaw + yaw_rate dt
/// v(k+1)   = v_cmd
///
/// Without input the speed is held and the heading does not change.
#[derive(Debug, Clone, Copy)]
pub struct Unicycle<T> {
    pub dt: T,
}

impl<T: RealField + Copy> Unicycle<T> {
    pub fn new(dt: T) -> Self {
        Unicycle { dt }
    }
}

impl<T: RealField + Copy> DiscreteModel<T> for Unicycle<T> {
    fn propagate(
        &self,
        x: &DVector<T>,
        u: Option<&DVector<T>>,
        q: Option<&DVector<T>>,
    ) -> Result<DVector<T>> {
        check_len("state vector", 4, x.len())?;
        let yaw = x[2];
        let v = x[3];
        let (v_cmd, yaw_rate) = match u {
            Some(u) => {
                check_len("input vector", 2, u.len())?;
                (u[0], u[1])
            }
            None => (v, T::zero()),
        };
        let mut out = DVector::from_vec(vec![
            x[0] + yaw.cos() * v * self.dt,
            x[1] + yaw.sin() * v * self.dt,
            yaw + yaw_rate * self.dt,
            v_cmd,
        ]);
        if let Some(q) = q {
            check_len("state noise", 4, q.len())?;
            out += q;
        }
        Ok(out)
    }

    fn observe(
        &self,
        x: &DVector<T>,
        _u: Option<&DVector<T>>,
        r: Option<&DVector<T>>,
    ) -> Result<DVector<T>> {
        check_len("state vector", 4, x.len())?;
        let mut out = x.rows(0, 2).clone_owned();
        if let Some(r) = r {
            check_len("output noise", 2, r.len())?;
            out += r;
        }
        Ok(out)
    }

    fn dims(&self) -> SystemDims {
        SystemDims {
            nx: 4,
            nu: 2,
            ny: 2,
            nz: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::jacobian::jacobian;
    use crate::utils::deg2rad;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    #[test]
    fn jacobian_matches_closed_form() {
        let dt: f64 = 0.1;
        let model = Unicycle::new(dt);
        let yaw = deg2rad(30.0);
        let v = 2.0;
        let x = DVector::from_vec(vec![1.0, 2.0, yaw, v]);
        let u = DVector::from_vec(vec![1.5, 0.1]);
        let jac = jacobian(|x| model.propagate(x, Some(&u), None), &x).unwrap();

        #[allow(clippy::deprecated_cfg_attr)]
        #[cfg_attr(rustfmt, rustfmt_skip)]
        let expected = DMatrix::from_row_slice(4, 4, &[
            1., 0., -dt * v * yaw.sin(), dt * yaw.cos(),
            0., 1., dt * v * yaw.cos(), dt * yaw.sin(),
            0., 0., 1., 0.,
            0., 0., 0., 0.,
        ]);
        assert_relative_eq!(jac, expected, epsilon = 1e-8);
    }

    #[test]
    fn observes_position() {
        let model = Unicycle::new(0.1);
        let x = DVector::from_vec(vec![1.0, 2.0, 0.3, 4.0]);
        assert_eq!(
            model.observe(&x, None, None).unwrap(),
            DVector::from_vec(vec![1.0, 2.0])
        );
        let u = DVector::from_vec(vec![1.0]);
        assert!(model.propagate(&x, Some(&u), None).is_err());
    }
}
