use nalgebra::{DMatrix, DVector, RealField};
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::error::{check_shape, Error, Result};
use crate::utils::matrix::{check_symmetric, sqrt_svd};

/// Additive noise source consumed by the filters.
///
/// Filters only read `mean` and `cov`; `sample` advances the internal
/// random stream.
pub trait Noise<T: RealField> {
    fn mean(&self) -> &DVector<T>;

    fn cov(&self) -> &DMatrix<T>;

    fn sample(&mut self) -> DVector<T>;

    /// Restarts the random stream
    fn reset(&mut self);

    fn dim(&self) -> usize {
        self.mean().len()
    }
}

/// Gaussian noise `N(mean, cov)`
pub struct GaussianNoise<T: RealField> {
    mean: DVector<T>,
    cov: DMatrix<T>,
    sqrt: DMatrix<T>,
    seed: Option<u64>,
    rng: StdRng,
}

impl<T: RealField + Copy> GaussianNoise<T>
where
    StandardNormal: Distribution<T>,
{
    /// Noise seeded from system entropy
    pub fn new(mean: DVector<T>, cov: DMatrix<T>) -> Result<Self> {
        Self::build(mean, cov, None)
    }

    /// Reproducible noise; `reset` replays the same stream
    pub fn with_seed(mean: DVector<T>, cov: DMatrix<T>, seed: u64) -> Result<Self> {
        Self::build(mean, cov, Some(seed))
    }

    fn build(mean: DVector<T>, cov: DMatrix<T>, seed: Option<u64>) -> Result<Self> {
        let n = mean.len();
        if n == 0 {
            return Err(Error::InvalidNoiseDim {
                kind: "gaussian",
                expected: 1,
                got: 0,
            });
        }
        check_shape("noise covariance", (n, n), cov.shape())?;
        check_symmetric(&cov, "noise covariance")?;
        let sqrt = sqrt_svd(&cov, "noise covariance")?;
        Ok(GaussianNoise {
            mean,
            cov,
            sqrt,
            seed,
            rng: new_rng(seed),
        })
    }
}

fn new_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

impl<T: RealField + Copy> Noise<T> for GaussianNoise<T>
where
    StandardNormal: Distribution<T>,
{
    fn mean(&self) -> &DVector<T> {
        &self.mean
    }

    fn cov(&self) -> &DMatrix<T> {
        &self.cov
    }

    fn sample(&mut self) -> DVector<T> {
        let rng = &mut self.rng;
        let z = DVector::from_fn(self.mean.len(), |_, _| rng.sample(StandardNormal));
        &self.mean + &self.sqrt * z
    }

    fn reset(&mut self) {
        self.rng = new_rng(self.seed);
    }
}

/// Noise of a given dimension which is always zero.
///
/// Unlike an absent noise (`None`), a zero noise still takes part in the
/// filter equations as a zero block.
#[derive(Debug, Clone)]
pub struct ZeroNoise<T: RealField> {
    mean: DVector<T>,
    cov: DMatrix<T>,
}

impl<T: RealField + Copy> ZeroNoise<T> {
    pub fn new(dim: usize) -> Self {
        ZeroNoise {
            mean: DVector::zeros(dim),
            cov: DMatrix::zeros(dim, dim),
        }
    }
}

impl<T: RealField + Copy> Noise<T> for ZeroNoise<T> {
    fn mean(&self) -> &DVector<T> {
        &self.mean
    }

    fn cov(&self) -> &DMatrix<T> {
        &self.cov
    }

    fn sample(&mut self) -> DVector<T> {
        self.mean.clone()
    }

    fn reset(&mut self) {}
}
