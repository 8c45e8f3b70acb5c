use nalgebra::{DMatrix, DVector, RealField};

use crate::error::{check_shape, Error, Result};
use crate::utils::matrix::check_symmetric;
use crate::utils::state::InitCond;

mod ekf;
mod iekf;
mod kf;
mod ukf;

pub use ekf::ExtendedKalmanFilter;
pub use iekf::IteratedExtendedKalmanFilter;
pub use kf::KalmanFilter;
pub use ukf::{SigmaPoints, UkfConfig, UnscentedKalmanFilter};

/// Covariance, gain and innovation buffers shared by the Kalman filters.
///
/// Allocated once at construction; every step overwrites them in place.
#[derive(Debug, Clone)]
pub(crate) struct KalmanBuffers<T: RealField> {
    /// corrected covariance
    pub p: DMatrix<T>,
    /// predicted covariance
    pub p_next: DMatrix<T>,
    pub inn: DVector<T>,
    pub k: DMatrix<T>,
}

impl<T: RealField + Copy> KalmanBuffers<T> {
    pub fn new(init: &InitCond<T>, ny: usize) -> Self {
        let nx = init.state().len();
        KalmanBuffers {
            p: init.cov().clone(),
            p_next: init.cov().clone(),
            inn: DVector::zeros(ny),
            k: DMatrix::zeros(nx, ny),
        }
    }

    pub fn set_cov(&mut self, cov: &DMatrix<T>) -> Result<()> {
        check_shape("covariance", self.p.shape(), cov.shape())?;
        check_symmetric(cov, "covariance")?;
        self.p.copy_from(cov);
        Ok(())
    }

    pub fn store(&mut self, inn: &DVector<T>, k: &DMatrix<T>, p: &DMatrix<T>) {
        self.inn.copy_from(inn);
        self.k.copy_from(k);
        self.p.copy_from(p);
    }
}

/// K = P H^T (H P H^T + R)^-1
pub(crate) fn kalman_gain<T: RealField + Copy>(
    p: &DMatrix<T>,
    h: &DMatrix<T>,
    r: Option<&DMatrix<T>>,
) -> Result<DMatrix<T>> {
    let pxy = p * h.transpose();
    let mut pyy = h * &pxy;
    if let Some(r) = r {
        pyy += r;
    }
    let pyy_inv = pyy
        .try_inverse()
        .ok_or(Error::SingularMatrix("innovation covariance"))?;
    Ok(pxy * pyy_inv)
}

/// Joseph form covariance correction
///
/// P+ = (I - K H) P (I - K H)^T + K R K^T
pub(crate) fn joseph_update<T: RealField + Copy>(
    p: &DMatrix<T>,
    k: &DMatrix<T>,
    h: &DMatrix<T>,
    r: Option<&DMatrix<T>>,
) -> DMatrix<T> {
    let n = p.nrows();
    let a = DMatrix::<T>::identity(n, n) - k * h;
    let mut p_corr = &a * p * a.transpose();
    if let Some(r) = r {
        p_corr += k * r * k.transpose();
    }
    p_corr.fill_lower_triangle_with_upper_triangle();
    p_corr
}
