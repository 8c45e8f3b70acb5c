use log::debug;
use nalgebra::{DMatrix, DVector, RealField};

use super::{DiscreteControlSystem, DiscreteModel, SystemDims};
use crate::error::{check_len, check_shape, Error, Result};

const INTEGRATION_STEPS: usize = 100;

/// Matrices of a linear state space model
///
/// x' = A x + B u + E z
/// y  = C x + D u
#[derive(Debug, Clone)]
struct StateSpace<T: RealField> {
    a: DMatrix<T>,
    b: Option<DMatrix<T>>,
    c: DMatrix<T>,
    d: Option<DMatrix<T>>,
    e: Option<DMatrix<T>>,
}

impl<T: RealField + Copy> StateSpace<T> {
    fn new(
        a: DMatrix<T>,
        b: Option<DMatrix<T>>,
        c: DMatrix<T>,
        d: Option<DMatrix<T>>,
        e: Option<DMatrix<T>>,
    ) -> Result<Self> {
        let nx = a.nrows();
        let ny = c.nrows();
        if nx == 0 || ny == 0 {
            return Err(Error::InvalidModelDims { nx, ny });
        }
        check_shape("system", (nx, nx), a.shape())?;
        check_shape("output", (ny, nx), c.shape())?;
        let nu = b.as_ref().map_or(0, |b| b.ncols());
        if let Some(b) = &b {
            check_shape("control", (nx, nu), b.shape())?;
        }
        if let Some(d) = &d {
            check_shape("feedforward", (ny, nu), d.shape())?;
        }
        if let Some(e) = &e {
            check_shape("disturbance", (nx, e.ncols()), e.shape())?;
        }
        Ok(StateSpace { a, b, c, d, e })
    }

    fn dims(&self) -> SystemDims {
        SystemDims {
            nx: self.a.nrows(),
            nu: self.b.as_ref().map_or(0, |b| b.ncols()),
            ny: self.c.nrows(),
            nz: self.e.as_ref().map_or(0, |e| e.ncols()),
        }
    }

    fn check_input(&self, u: Option<&DVector<T>>) -> Result<()> {
        match u {
            Some(u) => check_len("input vector", self.dims().nu, u.len()),
            None => Ok(()),
        }
    }

    /// A x + B u + q
    fn state_step(
        &self,
        x: &DVector<T>,
        u: Option<&DVector<T>>,
        q: Option<&DVector<T>>,
    ) -> Result<DVector<T>> {
        let dims = self.dims();
        check_len("state vector", dims.nx, x.len())?;
        self.check_input(u)?;
        let mut out = &self.a * x;
        if let (Some(b), Some(u)) = (&self.b, u) {
            out += b * u;
        }
        if let Some(q) = q {
            check_len("state noise", dims.nx, q.len())?;
            out += q;
        }
        Ok(out)
    }

    /// C x + D u + r
    fn output(
        &self,
        x: &DVector<T>,
        u: Option<&DVector<T>>,
        r: Option<&DVector<T>>,
    ) -> Result<DVector<T>> {
        let dims = self.dims();
        check_len("state vector", dims.nx, x.len())?;
        self.check_input(u)?;
        let mut out = &self.c * x;
        if let (Some(d), Some(u)) = (&self.d, u) {
            out += d * u;
        }
        if let Some(r) = r {
            check_len("output noise", dims.ny, r.len())?;
            out += r;
        }
        Ok(out)
    }
}

/// Discrete time linear time invariant system
#[derive(Debug, Clone)]
pub struct DiscreteSystem<T: RealField> {
    ss: StateSpace<T>,
}

impl<T: RealField + Copy> DiscreteSystem<T> {
    pub fn new(
        a: DMatrix<T>,
        b: Option<DMatrix<T>>,
        c: DMatrix<T>,
        d: Option<DMatrix<T>>,
        e: Option<DMatrix<T>>,
    ) -> Result<Self> {
        Ok(DiscreteSystem {
            ss: StateSpace::new(a, b, c, d, e)?,
        })
    }

    /// E
    pub fn disturbance_matrix(&self) -> Option<&DMatrix<T>> {
        self.ss.e.as_ref()
    }
}

impl<T: RealField + Copy> DiscreteModel<T> for DiscreteSystem<T> {
    fn propagate(
        &self,
        x: &DVector<T>,
        u: Option<&DVector<T>>,
        q: Option<&DVector<T>>,
    ) -> Result<DVector<T>> {
        self.ss.state_step(x, u, q)
    }

    fn observe(
        &self,
        x: &DVector<T>,
        u: Option<&DVector<T>>,
        r: Option<&DVector<T>>,
    ) -> Result<DVector<T>> {
        self.ss.output(x, u, r)
    }

    fn dims(&self) -> SystemDims {
        self.ss.dims()
    }
}

impl<T: RealField + Copy> DiscreteControlSystem<T> for DiscreteSystem<T> {
    fn system_matrix(&self) -> &DMatrix<T> {
        &self.ss.a
    }

    fn control_matrix(&self) -> Option<&DMatrix<T>> {
        self.ss.b.as_ref()
    }

    fn output_matrix(&self) -> &DMatrix<T> {
        &self.ss.c
    }

    fn feedforward_matrix(&self) -> Option<&DMatrix<T>> {
        self.ss.d.as_ref()
    }
}

/// Continuous time linear time invariant system
#[derive(Debug, Clone)]
pub struct ContinuousSystem<T: RealField> {
    ss: StateSpace<T>,
}

impl<T: RealField + Copy> ContinuousSystem<T> {
    pub fn new(
        a: DMatrix<T>,
        b: Option<DMatrix<T>>,
        c: DMatrix<T>,
        d: Option<DMatrix<T>>,
        e: Option<DMatrix<T>>,
    ) -> Result<Self> {
        Ok(ContinuousSystem {
            ss: StateSpace::new(a, b, c, d, e)?,
        })
    }

    pub fn dims(&self) -> SystemDims {
        self.ss.dims()
    }

    /// dx/dt = A x + B u + q
    pub fn derivative(
        &self,
        x: &DVector<T>,
        u: Option<&DVector<T>>,
        q: Option<&DVector<T>>,
    ) -> Result<DVector<T>> {
        self.ss.state_step(x, u, q)
    }

    /// One explicit Euler step of length `dt`
    pub fn propagate(
        &self,
        x: &DVector<T>,
        u: Option<&DVector<T>>,
        q: Option<&DVector<T>>,
        dt: T,
    ) -> Result<DVector<T>> {
        Ok(x + self.derivative(x, u, q)? * dt)
    }

    pub fn observe(
        &self,
        x: &DVector<T>,
        u: Option<&DVector<T>>,
        r: Option<&DVector<T>>,
    ) -> Result<DVector<T>> {
        self.ss.output(x, u, r)
    }

    /// Zero order hold discretization with sampling period `ts`.
    ///
    /// Ad = exp(A ts), Bd = G B and Ed = G E with G = ∫ exp(A s) ds over
    /// [0, ts]. G is `(Ad - I) A^-1` when A is invertible; otherwise it is
    /// integrated with the trapezoid rule.
    pub fn to_discrete(&self, ts: T) -> Result<DiscreteSystem<T>> {
        if ts <= T::zero() || !ts.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "sampling period must be positive: {ts:?}"
            )));
        }
        let nx = self.ss.a.nrows();
        let identity = DMatrix::<T>::identity(nx, nx);
        let ad = (&self.ss.a * ts).exp();

        let g = match self.ss.a.clone().try_inverse() {
            Some(a_inv) => (&ad - &identity) * a_inv,
            None => {
                debug!("singular system matrix, integrating input matrix numerically");
                let steps: T = nalgebra::convert(INTEGRATION_STEPS as f64);
                let h = ts / steps;
                let step = (&self.ss.a * h).exp();
                let half: T = nalgebra::convert(0.5);
                let mut sum = &identity * half;
                let mut term = identity.clone();
                for _ in 1..INTEGRATION_STEPS {
                    term = &term * &step;
                    sum += &term;
                }
                sum += &ad * half;
                sum * h
            }
        };

        DiscreteSystem::new(
            ad,
            self.ss.b.as_ref().map(|b| &g * b),
            self.ss.c.clone(),
            self.ss.d.clone(),
            self.ss.e.as_ref().map(|e| &g * e),
        )
    }
}
