use thiserror::Error;

/// Errors raised while building or running an estimator
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid model dimensions: [{nx} x {ny}]")]
    InvalidModelDims { nx: usize, ny: usize },

    #[error("invalid {name} matrix dimensions: expected [{rows} x {cols}], got [{got_rows} x {got_cols}]")]
    InvalidMatrixDims {
        name: &'static str,
        rows: usize,
        cols: usize,
        got_rows: usize,
        got_cols: usize,
    },

    #[error("invalid {kind} noise dimension: expected {expected}, got {got}")]
    InvalidNoiseDim {
        kind: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("invalid {what} length: expected {expected}, got {got}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("invalid number of particles: {0}")]
    InvalidParticleCount(usize),

    #[error("invalid number of update iterations: {0}")]
    InvalidIterations(usize),

    #[error("invalid number of samples: {0}")]
    InvalidSampleCount(usize),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid covariance matrix: {0}")]
    InvalidCovariance(String),

    #[error("invalid probability weights: {0}")]
    InvalidWeights(String),

    #[error("{0} is not invertible")]
    SingularMatrix(&'static str),

    #[error("SVD of {0} failed to converge")]
    SvdFailed(&'static str),

    #[error("{0} propagation failed: {1}")]
    Propagation(&'static str, #[source] Box<Error>),

    #[error("{0} observation failed: {1}")]
    Observation(&'static str, #[source] Box<Error>),

    #[error("model error: {0}")]
    Model(String),

    #[error("update called before predict")]
    MissingPrediction,

    #[error("no estimates to smooth")]
    EmptyEstimates,

    #[error("estimate {0} has no covariance")]
    MissingCovariance(usize),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn propagation(stage: &'static str) -> impl FnOnce(Error) -> Error {
        move |e| Error::Propagation(stage, Box::new(e))
    }

    pub(crate) fn observation(stage: &'static str) -> impl FnOnce(Error) -> Error {
        move |e| Error::Observation(stage, Box::new(e))
    }
}

pub(crate) fn check_len(what: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(Error::DimensionMismatch {
            what,
            expected,
            got,
        });
    }
    Ok(())
}

pub(crate) fn check_shape(
    name: &'static str,
    (rows, cols): (usize, usize),
    (got_rows, got_cols): (usize, usize),
) -> Result<()> {
    if (rows, cols) != (got_rows, got_cols) {
        return Err(Error::InvalidMatrixDims {
            name,
            rows,
            cols,
            got_rows,
            got_cols,
        });
    }
    Ok(())
}
