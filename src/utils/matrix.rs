use nalgebra::{DMatrix, RealField};

use crate::error::{Error, Result};

const SVD_MAX_ITER: usize = 1000;

/// Block diagonal matrix built from `blocks`, top-left to bottom-right
pub fn block_diag<T: RealField + Copy>(blocks: &[&DMatrix<T>]) -> DMatrix<T> {
    let rows = blocks.iter().map(|b| b.nrows()).sum();
    let cols = blocks.iter().map(|b| b.ncols()).sum();
    let mut m = DMatrix::zeros(rows, cols);
    let (mut r, mut c) = (0, 0);
    for b in blocks {
        m.view_mut((r, c), b.shape()).copy_from(*b);
        r += b.nrows();
        c += b.ncols();
    }
    m
}

/// Square root `U * sqrt(S)` of a symmetric positive semi-definite matrix.
///
/// `sqrt * sqrt^T` recovers `m`. Unlike the Cholesky factor it also exists
/// for singular matrices.
pub fn sqrt_svd<T: RealField + Copy>(m: &DMatrix<T>, name: &'static str) -> Result<DMatrix<T>> {
    if m.is_empty() {
        return Ok(m.clone());
    }
    let svd = m
        .clone()
        .try_svd(true, false, T::default_epsilon(), SVD_MAX_ITER)
        .ok_or(Error::SvdFailed(name))?;
    let u = svd.u.ok_or(Error::SvdFailed(name))?;
    let s = svd.singular_values.map(|s| s.sqrt());
    Ok(u * DMatrix::from_diagonal(&s))
}

/// Unbiased sample covariance of the columns of `data`
pub fn sample_cov<T: RealField + Copy>(data: &DMatrix<T>) -> Result<DMatrix<T>> {
    let n = data.ncols();
    if n < 2 {
        return Err(Error::InvalidSampleCount(n));
    }
    let mean = data.column_mean();
    let mut centered = data.clone();
    for mut col in centered.column_iter_mut() {
        col -= &mean;
    }
    let denom: T = nalgebra::convert((n - 1) as f64);
    let mut cov = &centered * centered.transpose() / denom;
    cov.fill_lower_triangle_with_upper_triangle();
    Ok(cov)
}

/// Fails unless `m` is square and symmetric up to rounding
pub fn check_symmetric<T: RealField + Copy>(m: &DMatrix<T>, name: &'static str) -> Result<()> {
    if !m.is_square() {
        return Err(Error::InvalidCovariance(format!(
            "{name} is not square: [{} x {}]",
            m.nrows(),
            m.ncols()
        )));
    }
    let tol = T::default_epsilon().sqrt();
    for i in 0..m.nrows() {
        for j in (i + 1)..m.ncols() {
            let (a, b) = (m[(i, j)], m[(j, i)]);
            let scale = T::one().max(a.abs()).max(b.abs());
            if (a - b).abs() > tol * scale {
                return Err(Error::InvalidCovariance(format!(
                    "{name} is not symmetric at ({i}, {j})"
                )));
            }
        }
    }
    Ok(())
}
