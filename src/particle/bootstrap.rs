use log::{debug, trace};
use nalgebra::{DMatrix, DVector, RealField};
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Standard, StandardNormal};

use crate::error::{check_len, Error, Result};
use crate::filter::{
    check_input, validate_dims, validate_init, validate_noise, BayesianFilter, ParticleFilter,
};
use crate::models::DiscreteModel;
use crate::noise::{Noise, ZeroNoise};
use crate::random::{roulette_draw_n, with_cov_n};
use crate::utils::matrix::sample_cov;
use crate::utils::state::{Estimate, InitCond};

/// Log density of the measurement error `z - y`
pub type ErrorLnPdf<T> = Box<dyn Fn(&DVector<T>) -> T>;

/// Bootstrap (sequential importance resampling) particle filter.
///
/// The proposal is the model itself: particles are propagated with sampled
/// process noise and weighted by the measurement error density.
pub struct BootstrapFilter<T: RealField> {
    model: Box<dyn DiscreteModel<T>>,
    q: Box<dyn Noise<T>>,
    r: Box<dyn Noise<T>>,
    /// particles, one per column
    x: DMatrix<T>,
    /// normalized weights
    w: DVector<T>,
    /// observed particles of the last update
    y: DMatrix<T>,
    err_ln_pdf: ErrorLnPdf<T>,
    rng: StdRng,
}

impl<T: RealField + Copy> BootstrapFilter<T>
where
    StandardNormal: Distribution<T>,
    Standard: Distribution<T>,
{
    /// Missing noise is replaced by a zero noise of the matching dimension.
    pub fn new(
        model: Box<dyn DiscreteModel<T>>,
        init: &InitCond<T>,
        q: Option<Box<dyn Noise<T>>>,
        r: Option<Box<dyn Noise<T>>>,
        particles: usize,
        err_ln_pdf: ErrorLnPdf<T>,
    ) -> Result<Self> {
        Self::with_rng(
            model,
            init,
            q,
            r,
            particles,
            err_ln_pdf,
            StdRng::from_entropy(),
        )
    }

    /// Same as `new` with an explicit random generator, for reproducible runs
    pub fn with_rng(
        model: Box<dyn DiscreteModel<T>>,
        init: &InitCond<T>,
        q: Option<Box<dyn Noise<T>>>,
        r: Option<Box<dyn Noise<T>>>,
        particles: usize,
        err_ln_pdf: ErrorLnPdf<T>,
        mut rng: StdRng,
    ) -> Result<Self> {
        let dims = model.dims();
        validate_dims(&dims)?;
        if particles == 0 {
            return Err(Error::InvalidParticleCount(particles));
        }
        validate_noise(q.as_deref(), "state", dims.nx)?;
        validate_noise(r.as_deref(), "output", dims.ny)?;
        validate_init(init, dims.nx)?;

        let q: Box<dyn Noise<T>> = match q {
            Some(q) => q,
            None => Box::new(ZeroNoise::new(dims.nx)),
        };
        let r: Box<dyn Noise<T>> = match r {
            Some(r) => r,
            None => Box::new(ZeroNoise::new(dims.ny)),
        };

        let mut x = with_cov_n(init.cov(), particles, &mut rng)?;
        for mut col in x.column_iter_mut() {
            col += init.state();
        }
        let n: T = nalgebra::convert(particles as f64);

        Ok(BootstrapFilter {
            model,
            q,
            r,
            x,
            w: DVector::from_element(particles, T::one() / n),
            y: DMatrix::zeros(dims.ny, particles),
            err_ln_pdf,
            rng,
        })
    }

    pub fn model(&self) -> &dyn DiscreteModel<T> {
        self.model.as_ref()
    }

    /// Observed particles of the last update, one per column
    pub fn observed(&self) -> DMatrix<T> {
        self.y.clone()
    }
}

impl<T: RealField + Copy> BayesianFilter<T> for BootstrapFilter<T>
where
    StandardNormal: Distribution<T>,
    Standard: Distribution<T>,
{
    /// Returns the propagated `x`; the estimate carries no covariance
    fn predict(&mut self, x: &DVector<T>, u: Option<&DVector<T>>) -> Result<Estimate<T>> {
        let dims = self.model.dims();
        check_len("state vector", dims.nx, x.len())?;
        check_input(u, dims.nu)?;

        let q = self.q.sample();
        let x_next = self
            .model
            .propagate(x, u, Some(&q))
            .map_err(Error::propagation("system state"))?;

        let mut particles = DMatrix::zeros(dims.nx, self.x.ncols());
        for (c, particle) in self.x.column_iter().enumerate() {
            let q = self.q.sample();
            let next = self
                .model
                .propagate(&particle.clone_owned(), u, Some(&q))
                .map_err(Error::propagation("particle"))?;
            check_len("propagated particle", dims.nx, next.len())?;
            particles.set_column(c, &next);
        }
        trace!("bf predict: {} particles", particles.ncols());

        self.x = particles;
        Ok(Estimate::new(x_next))
    }

    /// Reweights the particles with `z` and returns their weighted mean
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

        let mut observed = DMatrix::zeros(dims.ny, self.x.ncols());
        let mut ln_w = DVector::zeros(self.x.ncols());
        for (c, particle) in self.x.column_iter().enumerate() {
            let r = self.r.sample();
            let y = self
                .model
                .observe(&particle.clone_owned(), u, Some(&r))
                .map_err(Error::observation("particle"))?;
            check_len("observed particle", dims.ny, y.len())?;
            let inn = z - &y;
            ln_w[c] = self.w[c].ln() + (self.err_ln_pdf)(&inn);
            observed.set_column(c, &y);
        }

        // log-sum-exp, relative to the most likely particle
        #[allow(clippy::eq_op)]
        if ln_w.iter().any(|v| v != v) { // NaN check; RealField has no is_nan
            return Err(Error::InvalidWeights("NaN log weight".to_string()));
        }
        let ln_max = ln_w.max();
        if !ln_max.is_finite() {
            return Err(Error::InvalidWeights(format!(
                "largest log weight is {ln_max:?}"
            )));
        }
        let mut w = ln_w.map(|v| (v - ln_max).exp());
        let total = w.sum();
        w /= total;

        let estimate = &self.x * &w;
        self.y = observed;
        self.w = w;
        Ok(Estimate::new(estimate))
    }
}

impl<T: RealField + Copy> ParticleFilter<T> for BootstrapFilter<T>
where
    StandardNormal: Distribution<T>,
    Standard: Distribution<T>,
{
    fn particles(&self) -> DMatrix<T> {
        self.x.clone()
    }

    fn weights(&self) -> DVector<T> {
        self.w.clone()
    }

    /// Roulette wheel resampling followed by regularization: the new
    /// particles are jittered with noise drawn from their sample covariance
    /// scaled by `alpha`, or by `alpha_gauss` when `alpha <= 0`.
    fn resample(&mut self, alpha: T) -> Result<()> {
        let (rows, cols) = self.x.shape();
        let indices = roulette_draw_n(self.w.as_slice(), cols, &mut self.rng)?;
        let mut x = self.x.select_columns(&indices);

        // a single particle has no sample covariance
        if cols > 1 {
            let alpha = if alpha <= T::zero() {
                alpha_gauss(rows, cols)
            } else {
                alpha
            };
            debug!("bf resample: bandwidth {alpha:?}");
            let cov = sample_cov(&x)?;
            x += with_cov_n(&cov, cols, &mut self.rng)? * alpha;
        }

        let n: T = nalgebra::convert(cols as f64);
        self.x = x;
        self.w.fill(T::one() / n);
        Ok(())
    }
}

/// Optimal kernel bandwidth for a Gaussian kernel, `r` the state dimension
/// and `c` the number of particles:
///
/// (4 / (c (r + 2)))^(1 / (r + 4))
pub fn alpha_gauss<T: RealField + Copy>(r: usize, c: usize) -> T {
    let r: T = nalgebra::convert(r as f64);
    let c: T = nalgebra::convert(c as f64);
    let two: T = nalgebra::convert(2.0);
    let four: T = nalgebra::convert(4.0);
    (four / (c * (r + two))).powf(T::one() / (r + four))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::utils::mvn::MultiVariateNormal;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn error_pdf() -> ErrorLnPdf<f64> {
        let mvn = MultiVariateNormal::new(&DVector::zeros(1), &DMatrix::from_element(1, 1, 0.25))
            .unwrap();
        Box::new(move |e: &DVector<f64>| mvn.ln_pdf(e))
    }

    fn filter(particles: usize, seed: u64) -> BootstrapFilter<f64> {
        BootstrapFilter::with_rng(
            Box::new(fixtures::falling_ball()),
            &fixtures::init_cond(),
            Some(fixtures::state_noise()),
            Some(fixtures::output_noise()),
            particles,
            error_pdf(),
            StdRng::seed_from_u64(seed),
        )
        .unwrap()
    }

    #[test]
    fn alpha_gauss_value() {
        let expected = (4.0f64 / (2.0 * 3.0)).powf(1.0 / 5.0);
        assert_relative_eq!(alpha_gauss::<f64>(1, 2), expected, epsilon = 1e-12);
    }

    #[test]
    fn construction() {
        let bf = filter(10, 1);
        assert_eq!(bf.particles().shape(), (2, 10));
        assert_relative_eq!(bf.weights().sum(), 1.0, epsilon = 1e-12);

        let res = BootstrapFilter::with_rng(
            Box::new(fixtures::falling_ball()),
            &fixtures::init_cond(),
            None,
            None,
            0,
            error_pdf(),
            StdRng::seed_from_u64(1),
        );
        assert!(matches!(res, Err(Error::InvalidParticleCount(0))));
    }

    #[test]
    fn falling_ball() {
        fixtures::init_logger();
        let mut bf = filter(10, 3);
        let x = DVector::from_vec(vec![1.0, 1.0]);
        let u = DVector::from_vec(vec![-1.0]);
        let z = DVector::from_vec(vec![-1.5]);

        let pred = bf.predict(&x, Some(&u)).unwrap();
        assert!(pred.cov().is_none());
        let est = bf.update(pred.val(), Some(&u), &z).unwrap();
        assert!(est.val().iter().all(|v| v.is_finite()));
        assert_relative_eq!(bf.weights().sum(), 1.0, epsilon = 1e-12);
        assert_eq!(bf.observed().shape(), (1, 10));

        bf.resample(-1.0).unwrap();
        assert_relative_eq!(bf.weights().sum(), 1.0, epsilon = 1e-12);
        assert!(bf.weights().iter().all(|w| (*w - 0.1).abs() < 1e-12));

        let u3 = DVector::from_vec(vec![-1.0, 2.0, 3.0]);
        assert!(bf.predict(&x, Some(&u3)).is_err());
        assert!(bf.update(&x, Some(&u), &DVector::zeros(2)).is_err());
    }

    #[test]
    fn degenerate_weights_leave_state_untouched() {
        let mut bf = BootstrapFilter::with_rng(
            Box::new(fixtures::falling_ball()),
            &fixtures::init_cond(),
            None,
            None,
            5,
            Box::new(|_: &DVector<f64>| f64::NEG_INFINITY),
            StdRng::seed_from_u64(9),
        )
        .unwrap();
        let before = (bf.particles(), bf.weights(), bf.observed());
        let x = DVector::from_vec(vec![1.0, 3.0]);
        let z = DVector::from_vec(vec![1.0]);
        assert!(matches!(
            bf.update(&x, None, &z),
            Err(Error::InvalidWeights(_))
        ));
        assert_eq!((bf.particles(), bf.weights(), bf.observed()), before);
    }

    #[test]
    fn tiny_likelihoods_still_normalize() {
        let mut bf = BootstrapFilter::with_rng(
            Box::new(fixtures::falling_ball()),
            &fixtures::init_cond(),
            None,
            None,
            5,
            Box::new(|_: &DVector<f64>| -800.0),
            StdRng::seed_from_u64(9),
        )
        .unwrap();
        let x = DVector::from_vec(vec![1.0, 3.0]);
        let z = DVector::from_vec(vec![1.0]);
        let est = bf.update(&x, None, &z).unwrap();
        assert_abs_diff_eq!(bf.weights(), DVector::from_element(5, 0.2), epsilon = 1e-12);
        assert_abs_diff_eq!(est.val().clone(), bf.particles().column_mean(), epsilon = 1e-12);
    }

    #[test]
    fn likelihood_ratios_survive_underflow() {
        let mut bf = BootstrapFilter::with_rng(
            Box::new(fixtures::falling_ball()),
            &fixtures::init_cond(),
            None,
            None,
            2,
            Box::new(|e: &DVector<f64>| {
                if e[0] > 0.0 {
                    -1000.0
                } else {
                    -1000.0 - 2.0f64.ln()
                }
            }),
            StdRng::seed_from_u64(5),
        )
        .unwrap();
        let p = bf.particles();
        // z lies between the two particles
        let z = DVector::from_element(1, 0.5 * (p[(0, 0)] + p[(0, 1)]));
        bf.update(&DVector::from_vec(vec![1.0, 3.0]), None, &z).unwrap();
        let w = bf.weights();
        assert_relative_eq!(w.sum(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(w.max() / w.min(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn resampling_preserves_statistics() {
        let init = InitCond::new(
            DVector::from_vec(vec![1.0, 3.0]),
            DMatrix::from_row_slice(2, 2, &[1.0, 0.3, 0.3, 0.5]),
        )
        .unwrap();
        let mut means = DVector::zeros(2);
        let mut covs = DMatrix::zeros(2, 2);
        let trials = 50;
        for seed in 0..trials {
            let mut bf = BootstrapFilter::with_rng(
                Box::new(fixtures::falling_ball()),
                &init,
                None,
                None,
                500,
                error_pdf(),
                StdRng::seed_from_u64(seed),
            )
            .unwrap();
            bf.resample(0.1).unwrap();
            let x = bf.particles();
            means += x.column_mean();
            covs += sample_cov(&x).unwrap();
        }
        let n = trials as f64;
        assert_abs_diff_eq!(means / n, init.state().clone(), epsilon = 0.05);
        assert_abs_diff_eq!(covs / n, init.cov().clone(), epsilon = 0.1);
    }

    #[test]
    fn single_particle_resample() {
        let mut bf = filter(1, 4);
        let before = bf.particles();
        bf.resample(-1.0).unwrap();
        assert_eq!(bf.particles(), before);
        assert_eq!(bf.weights(), DVector::from_element(1, 1.0));
    }
}
