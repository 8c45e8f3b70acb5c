use nalgebra::{DMatrix, DVector, RealField};

use crate::error::Result;

mod linear;
mod unicycle;

pub use linear::{ContinuousSystem, DiscreteSystem};
pub use unicycle::Unicycle;

/// Dimensions of a dynamical system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemDims {
    /// state
    pub nx: usize,
    /// input
    pub nu: usize,
    /// output
    pub ny: usize,
    /// disturbance
    pub nz: usize,
}

/// Discrete time dynamical system.
///
/// `q` and `r` are additive noise samples. `None` means the noise is absent
/// and must not be added.
pub trait DiscreteModel<T: RealField> {
    /// x(k+1) = f(x(k), u(k), q(k))
    fn propagate(
        &self,
        x: &DVector<T>,
        u: Option<&DVector<T>>,
        q: Option<&DVector<T>>,
    ) -> Result<DVector<T>>;

    /// y(k) = h(x(k), u(k), r(k))
    fn observe(
        &self,
        x: &DVector<T>,
        u: Option<&DVector<T>>,
        r: Option<&DVector<T>>,
    ) -> Result<DVector<T>>;

    fn dims(&self) -> SystemDims;
}

/// Linear time invariant system exposing its matrices
pub trait DiscreteControlSystem<T: RealField>: DiscreteModel<T> {
    /// A
    fn system_matrix(&self) -> &DMatrix<T>;
    /// B
    fn control_matrix(&self) -> Option<&DMatrix<T>>;
    /// C
    fn output_matrix(&self) -> &DMatrix<T>;
    /// D
    fn feedforward_matrix(&self) -> Option<&DMatrix<T>>;
}
