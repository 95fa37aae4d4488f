//! Linear algebra layer.
//!
//! Dense matrix/vector primitives, the regularized LDLᵀ factorization, and the
//! KKT solver built on top of it. Everything is generic over the scalar type
//! so that a deployment can pick `f32` or `f64` once.

pub mod dense;
pub mod kkt;
pub mod ldl;

use nalgebra::RealField;

/// Scalar type accepted by the solver.
///
/// Any `nalgebra` real field that is `Copy` and widens losslessly to `f64`
/// (for logging and error reporting) qualifies; in practice `f32` and `f64`.
pub trait SolverFloat: RealField + Copy + Into<f64> {}

impl<T: RealField + Copy + Into<f64>> SolverFloat for T {}

/// Convert an `f64` constant into the working precision.
#[inline]
pub fn cast<T: SolverFloat>(v: f64) -> T {
    nalgebra::convert(v)
}

/// Widen a working-precision value to `f64`.
#[inline]
pub fn to_f64<T: SolverFloat>(v: T) -> f64 {
    v.into()
}

/// Machine epsilon of the working precision.
#[inline]
pub fn epsilon<T: SolverFloat>() -> T {
    T::default_epsilon()
}

/// Positive infinity in the working precision.
#[inline]
pub fn infinity<T: SolverFloat>() -> T {
    cast(f64::INFINITY)
}
