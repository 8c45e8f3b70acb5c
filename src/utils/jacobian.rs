use nalgebra::{DMatrix, DVector, RealField};

use crate::error::{Error, Result};

/// Central difference Jacobian of `f` at `x`.
///
/// Column `j` is `(f(x + h e_j) - f(x - h e_j)) / 2h` with
/// `h = cbrt(eps) * max(|x_j|, 1)`. Errors returned by `f` are propagated.
pub fn jacobian<T, F>(mut f: F, x: &DVector<T>) -> Result<DMatrix<T>>
where
    T: RealField + Copy,
    F: FnMut(&DVector<T>) -> Result<DVector<T>>,
{
    let step = T::default_epsilon().cbrt();
    let two: T = nalgebra::convert(2.0);

    let mut probe = x.clone();
    let mut jac: Option<DMatrix<T>> = None;
    for j in 0..x.len() {
        let h = step * T::one().max(x[j].abs());

        probe[j] = x[j] + h;
        let forward = f(&probe)?;
        probe[j] = x[j] - h;
        let backward = f(&probe)?;
        probe[j] = x[j];

        if forward.len() != backward.len() {
            return Err(Error::DimensionMismatch {
                what: "jacobian output",
                expected: forward.len(),
                got: backward.len(),
            });
        }
        let out = jac.get_or_insert_with(|| DMatrix::zeros(forward.len(), x.len()));
        if out.nrows() != forward.len() {
            return Err(Error::DimensionMismatch {
                what: "jacobian output",
                expected: out.nrows(),
                got: forward.len(),
            });
        }
        out.set_column(j, &((forward - backward) / (two * h)));
    }

    match jac {
        Some(jac) => Ok(jac),
        // nothing to differentiate against; the output size is still needed
        None => Ok(DMatrix::zeros(f(x)?.len(), 0)),
    }
}
