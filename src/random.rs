use nalgebra::{DMatrix, RealField};
use rand::distributions::Distribution;
use rand::Rng;
use rand_distr::{Standard, StandardNormal};

use crate::error::{Error, Result};
use crate::utils::matrix::sqrt_svd;

/// `rows x cols` matrix of independent standard normal draws
pub fn standard_normal<T, R>(rows: usize, cols: usize, rng: &mut R) -> DMatrix<T>
where
    T: RealField + Copy,
    R: Rng + ?Sized,
    StandardNormal: Distribution<T>,
{
    DMatrix::from_fn(rows, cols, |_, _| rng.sample(StandardNormal))
}

/// Draws `n` zero mean normal samples with covariance `cov`, one per column
pub fn with_cov_n<T, R>(cov: &DMatrix<T>, n: usize, rng: &mut R) -> Result<DMatrix<T>>
where
    T: RealField + Copy,
    R: Rng + ?Sized,
    StandardNormal: Distribution<T>,
{
    if n == 0 {
        return Err(Error::InvalidSampleCount(n));
    }
    let sqrt = sqrt_svd(cov, "sample covariance")?;
    Ok(sqrt * standard_normal(cov.nrows(), n, rng))
}

/// Roulette wheel selection: draws `n` indices with probability
/// proportional to `p`.
pub fn roulette_draw_n<T, R>(p: &[T], n: usize, rng: &mut R) -> Result<Vec<usize>>
where
    T: RealField + Copy,
    R: Rng + ?Sized,
    Standard: Distribution<T>,
{
    if p.is_empty() {
        return Err(Error::InvalidWeights("no weights to draw from".to_string()));
    }
    let mut total = T::zero();
    let mut cdf = Vec::with_capacity(p.len());
    for w in p {
        if *w < T::zero() || !w.is_finite() {
            return Err(Error::InvalidWeights(format!("weight {w:?} is not valid")));
        }
        total += *w;
        cdf.push(total);
    }
    if total <= T::zero() {
        return Err(Error::InvalidWeights("weights sum to zero".to_string()));
    }

    let last = p.len() - 1;
    let indices = (0..n)
        .map(|_| {
            let val = rng.gen::<T>() * total;
            cdf.partition_point(|c| *c <= val).min(last)
        })
        .collect();
    Ok(indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::matrix::sample_cov;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn with_cov_n_matches_covariance() {
        let mut rng = StdRng::seed_from_u64(7);
        let cov = DMatrix::from_row_slice(2, 2, &[2.0, 0.6, 0.6, 1.0]);
        let samples = with_cov_n(&cov, 20_000, &mut rng).unwrap();
        assert_eq!(samples.shape(), (2, 20_000));
        assert_abs_diff_eq!(sample_cov(&samples).unwrap(), cov, epsilon = 0.1);
        assert_abs_diff_eq!(samples.column_mean().norm(), 0.0, epsilon = 0.05);
    }

    #[test]
    fn with_cov_n_rejects_zero_samples() {
        let mut rng = StdRng::seed_from_u64(7);
        let cov = DMatrix::<f64>::identity(2, 2);
        assert!(matches!(
            with_cov_n(&cov, 0, &mut rng),
            Err(Error::InvalidSampleCount(0))
        ));
    }

    #[test]
    fn roulette_follows_weights() {
        let mut rng = StdRng::seed_from_u64(42);
        let draws = roulette_draw_n(&[0.0, 3.0, 1.0, 0.0], 10_000, &mut rng).unwrap();
        assert!(draws.iter().all(|i| *i == 1 || *i == 2));
        let ones = draws.iter().filter(|i| **i == 1).count() as f64;
        assert_abs_diff_eq!(ones / 10_000.0, 0.75, epsilon = 0.03);
    }

    #[test]
    fn roulette_rejects_bad_weights() {
        let mut rng = StdRng::seed_from_u64(42);
        let empty: [f64; 0] = [];
        assert!(roulette_draw_n(&empty, 3, &mut rng).is_err());
        assert!(roulette_draw_n(&[0.0, 0.0], 3, &mut rng).is_err());
        assert!(roulette_draw_n(&[0.5, -0.1], 3, &mut rng).is_err());
        assert!(roulette_draw_n(&[0.5, f64::NAN], 3, &mut rng).is_err());
    }
}
