use log::{debug, trace};
use nalgebra::{DMatrix, DVector, RealField};
use serde::{Deserialize, Serialize};

use super::KalmanBuffers;
use crate::error::{check_len, Error, Result};
use crate::filter::{
    check_input, validate_dims, validate_init, validate_noise, BayesianFilter, GaussianFilter,
};
use crate::models::DiscreteModel;
use crate::noise::Noise;
use crate::utils::matrix::{block_diag, sqrt_svd};
use crate::utils::state::{Estimate, InitCond};

/// Sigma point spread parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UkfConfig<T> {
    /// spread around the mean, in (0, 1]
    pub alpha: T,
    /// prior knowledge of the distribution, 2 is optimal for Gaussians
    pub beta: T,
    /// secondary scaling
    pub kappa: T,
}

impl<T: RealField + Copy> Default for UkfConfig<T> {
    fn default() -> Self {
        UkfConfig {
            alpha: T::one(),
            beta: nalgebra::convert(2.0),
            kappa: T::zero(),
        }
    }
}

/// Sigma points, one per column, and the augmented covariance they were
/// drawn from
#[derive(Debug, Clone, PartialEq)]
pub struct SigmaPoints<T: RealField> {
    pub x: DMatrix<T>,
    pub cov: DMatrix<T>,
}

/// Sigma points after propagation, kept between predict and update
struct Propagated<T: RealField> {
    /// propagated state part
    x: DMatrix<T>,
    mean: DVector<T>,
    /// measurement noise part, absent without output noise
    r: Option<DMatrix<T>>,
}

/// Augmented unscented Kalman filter.
///
/// Sigma points span [x; q; r]: each point is propagated and observed with
/// its own noise slice. Absent noise drops its block from the augmentation.
pub struct UnscentedKalmanFilter<T: RealField> {
    model: Box<dyn DiscreteModel<T>>,
    q: Option<Box<dyn Noise<T>>>,
    r: Option<Box<dyn Noise<T>>>,
    buf: KalmanBuffers<T>,
    gamma: T,
    mw: (T, T),
    cw: (T, T),
    sp_dim: usize,
    sp_next: Option<Propagated<T>>,
}

impl<T: RealField + Copy> UnscentedKalmanFilter<T> {
    pub fn new(
        model: Box<dyn DiscreteModel<T>>,
        init: &InitCond<T>,
        q: Option<Box<dyn Noise<T>>>,
        r: Option<Box<dyn Noise<T>>>,
        config: UkfConfig<T>,
    ) -> Result<Self> {
        let dims = model.dims();
        validate_dims(&dims)?;
        validate_noise(q.as_deref(), "state", dims.nx)?;
        validate_noise(r.as_deref(), "output", dims.ny)?;
        validate_init(init, dims.nx)?;

        let UkfConfig { alpha, beta, kappa } = config;
        if alpha <= T::zero() || beta < T::zero() || kappa < T::zero() {
            return Err(Error::InvalidConfig(format!(
                "sigma point parameters out of range: {config:?}"
            )));
        }

        let sp_dim = dims.nx
            + q.as_ref().map_or(0, |q| q.dim())
            + r.as_ref().map_or(0, |r| r.dim());
        let (mw, cw, gamma) = Self::sigma_weights(sp_dim, alpha, beta, kappa)?;
        debug!("ukf: {sp_dim} dimensional sigma points, gamma = {gamma:?}");

        Ok(UnscentedKalmanFilter {
            buf: KalmanBuffers::new(init, dims.ny),
            model,
            q,
            r,
            gamma,
            mw,
            cw,
            sp_dim,
            sp_next: None,
        })
    }

    /// Mean and covariance weights `(w0, wi)` and the spread `gamma`
    fn sigma_weights(sp_dim: usize, alpha: T, beta: T, kappa: T) -> Result<((T, T), (T, T), T)> {
        let n: T = nalgebra::convert(sp_dim as f64);
        let lambda = alpha.powi(2) * (n + kappa) - n;
        if n + lambda <= T::zero() {
            return Err(Error::InvalidConfig(
                "sigma point spread must be positive".to_string(),
            ));
        }

        let w = T::one() / ((T::one() + T::one()) * (n + lambda));
        let w0 = lambda / (n + lambda);
        let mw = (w0, w);
        let cw = (w0 + T::one() - alpha.powi(2) + beta, w);

        let gamma = (n + lambda).sqrt();
        Ok((mw, cw, gamma))
    }

    fn mean_weight(&self, i: usize) -> T {
        if i == 0 {
            self.mw.0
        } else {
            self.mw.1
        }
    }

    fn cov_weight(&self, i: usize) -> T {
        if i == 0 {
            self.cw.0
        } else {
            self.cw.1
        }
    }

    /// Sigma points around `x` from the current covariance and the noise
    /// covariances.
    ///
    /// Column 0 is the centre `[x; 0]`; columns `1..=n` and `n+1..=2n` are
    /// the centre plus and minus the columns of `gamma * sqrt(cov)`.
    pub fn gen_sigma_points(&self, x: &DVector<T>) -> Result<SigmaPoints<T>> {
        let nx = self.buf.p.nrows();
        check_len("state vector", nx, x.len())?;

        let mut blocks = vec![&self.buf.p];
        if let Some(q) = self.q.as_ref() {
            blocks.push(q.cov());
        }
        if let Some(r) = self.r.as_ref() {
            blocks.push(r.cov());
        }
        let cov = block_diag(&blocks);
        let sigma = sqrt_svd(&cov, "sigma point covariance")? * self.gamma;

        let mut center = DVector::zeros(self.sp_dim);
        center.rows_mut(0, nx).copy_from(x);

        let mut points = DMatrix::zeros(self.sp_dim, 2 * self.sp_dim + 1);
        points.set_column(0, &center);
        for i in 0..self.sp_dim {
            let sigma_column = sigma.column(i);
            points.set_column(i + 1, &(&center + sigma_column));
            points.set_column(i + 1 + self.sp_dim, &(&center - sigma_column));
        }
        Ok(SigmaPoints { x: points, cov })
    }

    /// Weighted cross covariance of two sets of sigma points
    fn weighted_cov(
        &self,
        a: &DMatrix<T>,
        a_mean: &DVector<T>,
        b: &DMatrix<T>,
        b_mean: &DVector<T>,
    ) -> DMatrix<T> {
        a.column_iter()
            .zip(b.column_iter())
            .enumerate()
            .map(|(i, (a, b))| (a - a_mean) * (b - b_mean).transpose() * self.cov_weight(i))
            .fold(DMatrix::zeros(a_mean.len(), b_mean.len()), |acc, m| acc + m)
    }

    pub fn model(&self) -> &dyn DiscreteModel<T> {
        self.model.as_ref()
    }
}

impl<T: RealField + Copy> BayesianFilter<T> for UnscentedKalmanFilter<T> {
    fn predict(&mut self, x: &DVector<T>, u: Option<&DVector<T>>) -> Result<Estimate<T>> {
        let dims = self.model.dims();
        check_input(u, dims.nu)?;
        let sp = self.gen_sigma_points(x)?;

        let q = self.q.as_mut().map(|q| q.sample());
        let x_next = self
            .model
            .propagate(x, u, q.as_ref())
            .map_err(Error::propagation("system state"))?;
        check_len("propagated state", dims.nx, x_next.len())?;

        let nx = dims.nx;
        let q_dim = self.q.as_ref().map_or(0, |q| q.dim());
        let r_dim = self.r.as_ref().map_or(0, |r| r.dim());

        let mut sp_x = DMatrix::zeros(nx, sp.x.ncols());
        let mut mean = DVector::zeros(nx);
        for (i, point) in sp.x.column_iter().enumerate() {
            let state = point.rows(0, nx).clone_owned();
            let noise = (q_dim > 0).then(|| point.rows(nx, q_dim).clone_owned());
            let next = self
                .model
                .propagate(&state, u, noise.as_ref())
                .map_err(Error::propagation("sigma point"))?;
            check_len("propagated sigma point", nx, next.len())?;
            mean += &next * self.mean_weight(i);
            sp_x.set_column(i, &next);
        }

        let mut p_next = self.weighted_cov(&sp_x, &mean, &sp_x, &mean);
        p_next.fill_lower_triangle_with_upper_triangle();
        trace!("ukf predict: sigma mean = {:?}", mean.as_slice());

        let r = (r_dim > 0).then(|| sp.x.rows(nx + q_dim, r_dim).clone_owned());
        self.buf.p_next.copy_from(&p_next);
        self.sp_next = Some(Propagated { x: sp_x, mean, r });
        Ok(Estimate::with_cov(x_next, p_next))
    }

    /// The corrected state is anchored at the propagated sigma point mean
    /// rather than at `x`.
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
        let sp = self.sp_next.as_ref().ok_or(Error::MissingPrediction)?;

        let mut sp_y = DMatrix::zeros(dims.ny, sp.x.ncols());
        let mut y_mean = DVector::zeros(dims.ny);
        for (i, point) in sp.x.column_iter().enumerate() {
            let state = point.clone_owned();
            let noise = sp.r.as_ref().map(|r| r.column(i).clone_owned());
            let y = self
                .model
                .observe(&state, u, noise.as_ref())
                .map_err(Error::observation("sigma point"))?;
            check_len("observed sigma point", dims.ny, y.len())?;
            y_mean += &y * self.mean_weight(i);
            sp_y.set_column(i, &y);
        }

        let pyy = self.weighted_cov(&sp_y, &y_mean, &sp_y, &y_mean);
        let pxy = self.weighted_cov(&sp.x, &sp.mean, &sp_y, &y_mean);
        let pyy_inv = pyy
            .clone()
            .try_inverse()
            .ok_or(Error::SingularMatrix("innovation covariance"))?;
        let k = pxy * pyy_inv;

        let inn = z - y_mean;
        let x_corr = &sp.mean + &k * &inn;
        let mut p_corr = &self.buf.p_next - &k * &pyy * k.transpose();
        p_corr.fill_lower_triangle_with_upper_triangle();
        trace!("ukf update: innovation = {:?}", inn.as_slice());

        self.buf.store(&inn, &k, &p_corr);
        // the propagated sigma points serve a single update
        self.sp_next = None;
        Ok(Estimate::with_cov(x_corr, p_corr))
    }
}

impl<T: RealField + Copy> GaussianFilter<T> for UnscentedKalmanFilter<T> {
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
