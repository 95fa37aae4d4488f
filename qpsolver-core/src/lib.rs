//! qpsolver: an embedded primal-dual interior-point solver for convex QPs
//!
//! Solves
//!
//! ```text
//! minimize    (1/2) xᵀ Q x + cᵀ x
//! subject to  lower ≤ x ≤ upper
//!             A x ≤ b
//!             E x = h
//! ```
//!
//! with every constraint family optional, using dense linear algebra and a
//! bounded amount of work per solve, for real-time use such as MPC loops.
//!
//! # Algorithm
//!
//! - **Phase-1** elastic auxiliary problem when the start is not strictly
//!   interior
//! - **Mehrotra predictor-corrector** with one factorization per iteration
//! - **Regularized LDLᵀ** of the quasi-definite KKT system with a single
//!   perturbation retry and iterative refinement
//! - **Constraint strategy units**: each enabled inequality family contributes
//!   its own rows; disabled families cost nothing
//!
//! The scalar type is a parameter. `f32` and `f64` are both supported and the
//! `single-precision` cargo feature switches [`DefaultFloat`] to `f32`.
//!
//! # Example
//!
//! ```
//! use nalgebra::{DMatrix, DVector};
//! use qpsolver_core::{solve, Problem, SolverSettings, SolveStatus};
//!
//! // min (x1 − 1)² + (x2 − 2.5)²  s.t. 0 ≤ x ≤ 1
//! let prob = Problem::<f64>::new(
//!     DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 2.0]),
//!     DVector::from_vec(vec![-2.0, -5.0]),
//! )
//! .with_lower_bounds(DVector::from_vec(vec![0.0, 0.0]))
//! .with_upper_bounds(DVector::from_vec(vec![1.0, 1.0]));
//!
//! let result = solve(&prob, &SolverSettings::default());
//! assert_eq!(result.status, SolveStatus::Converged);
//! assert!((result.x[1] - 1.0).abs() < 1e-6);
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::too_many_arguments)] // IPM kernels need many parameters

pub mod constraints;
pub mod ipm;
pub mod linalg;
pub mod problem;

use nalgebra::{DMatrix, DVector};

// Re-export main types
pub use constraints::{ConstraintBlock, ConstraintKind};
pub use linalg::SolverFloat;
pub use problem::{
    AffineSystem, DivergencePolicy, FeatureSet, Problem, ProblemError, SolveInfo, SolveResult,
    SolveStatus, SolverSettings, WarmStart,
};

/// Working precision selected at build time.
#[cfg(not(feature = "single-precision"))]
pub type DefaultFloat = f64;

/// Working precision selected at build time.
#[cfg(feature = "single-precision")]
pub type DefaultFloat = f32;

/// Main solve entry point.
///
/// Solves a convex QP from the origin (phase-1 repairs it when it is not
/// strictly interior). All failures are reported through
/// [`SolveResult::status`].
pub fn solve<T: SolverFloat>(problem: &Problem<T>, settings: &SolverSettings<T>) -> SolveResult<T> {
    ipm::solve_qp(problem, settings, None)
}

/// Solve starting from caller-provided iterates.
///
/// Useful for repeated solves of slowly changing problems: the previous
/// solution is usually strictly interior after a small perturbation, which
/// skips phase-1 entirely.
pub fn solve_with_warm_start<T: SolverFloat>(
    problem: &Problem<T>,
    settings: &SolverSettings<T>,
    warm: &WarmStart<T>,
) -> SolveResult<T> {
    ipm::solve_qp(problem, settings, Some(warm))
}

/// One-call convenience form.
///
/// `inequalities` is (A, b) for A x ≤ b and `equalities` is (E, h) for
/// E x = h; `lower`/`upper` are variable bounds with ±∞ for free entries.
#[allow(non_snake_case)]
pub fn quadprog<T: SolverFloat>(
    Q: DMatrix<T>,
    c: DVector<T>,
    inequalities: Option<(DMatrix<T>, DVector<T>)>,
    equalities: Option<(DMatrix<T>, DVector<T>)>,
    lower: Option<DVector<T>>,
    upper: Option<DVector<T>>,
    settings: &SolverSettings<T>,
) -> SolveResult<T> {
    let problem = Problem {
        Q,
        c,
        lower,
        upper,
        inequalities: inequalities.map(|(a, b)| AffineSystem::new(a, b)),
        equalities: equalities.map(|(e, h)| AffineSystem::new(e, h)),
    };
    solve(&problem, settings)
}
