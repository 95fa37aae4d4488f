//! Problem data structures and validation.
//!
//! This module defines the QP representation, the solver settings and
//! feature switches, and the result types returned by every solve.

use crate::constraints::ConstraintKind;
use crate::linalg::dense::is_symmetric;
use crate::linalg::{cast, epsilon, to_f64, SolverFloat};
use nalgebra::{DMatrix, DVector};
use std::fmt;
use thiserror::Error;

/// Linear system `matrix · x (op) rhs` used for both inequality and equality
/// constraints.
#[derive(Debug, Clone)]
pub struct AffineSystem<T: SolverFloat> {
    /// Constraint matrix (rows × n)
    pub matrix: DMatrix<T>,
    /// Right-hand side (rows)
    pub rhs: DVector<T>,
}

impl<T: SolverFloat> AffineSystem<T> {
    /// Bundle a matrix and right-hand side.
    pub fn new(matrix: DMatrix<T>, rhs: DVector<T>) -> Self {
        Self { matrix, rhs }
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rhs.len()
    }
}

/// Convex quadratic program.
///
/// ```text
/// minimize    (1/2) xᵀ Q x + cᵀ x
/// subject to  lower ≤ x ≤ upper
///             A x ≤ b
///             E x = h
/// ```
///
/// Every constraint family is optional. Bound entries of ±∞ mean "no bound"
/// for that variable.
///
/// # Dimensions
///
/// - `n`: number of primal variables (length of c)
/// - Q: n × n (symmetric PSD)
/// - lower, upper: n
/// - A: m_a × n, b: m_a
/// - E: p × n, h: p
#[derive(Debug, Clone)]
#[allow(non_snake_case)] // Q is standard mathematical notation
pub struct Problem<T: SolverFloat> {
    /// Quadratic cost matrix Q (n × n, symmetric PSD)
    pub Q: DMatrix<T>,

    /// Linear cost vector c (n)
    pub c: DVector<T>,

    /// Lower variable bounds (−∞ entries are unbounded)
    pub lower: Option<DVector<T>>,

    /// Upper variable bounds (+∞ entries are unbounded)
    pub upper: Option<DVector<T>>,

    /// Affine inequalities A x ≤ b
    pub inequalities: Option<AffineSystem<T>>,

    /// Affine equalities E x = h
    pub equalities: Option<AffineSystem<T>>,
}

/// Problem validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProblemError {
    /// Some array does not match the dimension implied by c
    #[error("{what} has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        /// Offending array
        what: &'static str,
        /// Expected dimension
        expected: usize,
        /// Actual dimension
        actual: usize,
    },

    /// Q is not symmetric
    #[error("Q is not symmetric")]
    NotSymmetric,

    /// NaN, or an infinity where only finite values are meaningful
    #[error("{what}[{index}] is not finite")]
    NonFinite {
        /// Offending array
        what: &'static str,
        /// Flat (column-major for matrices) index of the entry
        index: usize,
    },

    /// Lower bound of +∞ or upper bound of −∞
    #[error("{what}[{index}] is an impossible bound")]
    InvalidBound {
        /// "lower" or "upper"
        what: &'static str,
        /// Variable index
        index: usize,
    },

    /// Data was supplied for a constraint family that is switched off
    #[error("{0} constraints supplied but the feature is disabled")]
    FeatureDisabled(ConstraintKind),

    /// Start point is not strictly interior and phase-1 is disabled
    #[error("start point is not strictly interior (margin {margin:e}) and infeasible start is disabled")]
    InfeasibleWarmStart {
        /// min(g − G x) at the start point
        margin: f64,
    },

    /// Settings outside their admissible range
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

/// Constraint families and checks compiled into a solve.
///
/// Disabled inequality families are never instantiated, so they contribute
/// no rows to the Newton system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureSet {
    /// Honour `Problem::lower`
    pub lower_bound: bool,
    /// Honour `Problem::upper`
    pub upper_bound: bool,
    /// Honour `Problem::inequalities`
    pub affine_inequality: bool,
    /// Run phase-1 when the start point is not strictly interior
    pub infeasible_start: bool,
    /// Validate problem data at solve entry
    pub dimension_check: bool,
}

impl FeatureSet {
    /// Every family and check enabled.
    pub const ALL: FeatureSet = FeatureSet {
        lower_bound: true,
        upper_bound: true,
        affine_inequality: true,
        infeasible_start: true,
        dimension_check: true,
    };

    /// Box-constrained build: bounds and phase-1 on, affine inequalities off.
    pub const BOX_ONLY: FeatureSet = FeatureSet {
        lower_bound: true,
        upper_bound: true,
        affine_inequality: false,
        infeasible_start: true,
        dimension_check: true,
    };

    /// Whether the given family is enabled.
    pub fn enabled(&self, kind: ConstraintKind) -> bool {
        match kind {
            ConstraintKind::LowerBound => self.lower_bound,
            ConstraintKind::UpperBound => self.upper_bound,
            ConstraintKind::AffineInequality => self.affine_inequality,
        }
    }
}

impl Default for FeatureSet {
    fn default() -> Self {
        Self::ALL
    }
}

/// Thresholds of the divergence heuristics that report `Infeasible`.
#[derive(Debug, Clone, Copy)]
pub struct DivergencePolicy<T: SolverFloat> {
    /// μ must exceed this multiple of the smallest μ seen...
    pub mu_growth_factor: T,
    /// ...after growing this many consecutive iterations
    pub mu_growth_iters: usize,
    /// Step lengths below this count as stalled
    pub min_step: T,
    /// Consecutive stalled iterations without residual decrease
    pub stall_iters: usize,
    /// ‖x‖∞ beyond this is taken as an unbounded objective
    pub x_limit: T,
    /// Once μ is below tol_gap, an unconverged primal residual that keeps
    /// more than this fraction of its previous value counts as stalled...
    pub primal_stall_ratio: T,
    /// ...and this many consecutive stalled iterations report a primal
    /// infeasible problem
    pub primal_stall_iters: usize,
    /// Same as `primal_stall_ratio` for the dual residual...
    pub dual_stall_ratio: T,
    /// ...reporting an unbounded objective
    pub dual_stall_iters: usize,
}

impl<T: SolverFloat> Default for DivergencePolicy<T> {
    fn default() -> Self {
        Self {
            mu_growth_factor: cast(1e6),
            mu_growth_iters: 5,
            min_step: epsilon::<T>().sqrt() * cast(1e-3),
            stall_iters: 5,
            x_limit: cast(1e12),
            primal_stall_ratio: cast(0.9),
            primal_stall_iters: 5,
            dual_stall_ratio: cast(0.9),
            dual_stall_iters: 5,
        }
    }
}

/// Solver settings and parameters.
#[derive(Debug, Clone)]
pub struct SolverSettings<T: SolverFloat> {
    /// Maximum number of main IPM iterations
    pub max_iter: usize,

    /// Maximum number of phase-1 iterations
    pub phase1_max_iter: usize,

    /// Primal/dual feasibility tolerance (relative)
    pub tol_feas: T,

    /// Complementarity (μ) tolerance
    pub tol_gap: T,

    /// Static regularization for the KKT system
    pub static_reg: T,

    /// Extra perturbation applied on the single factorization retry
    pub retry_reg: T,

    /// Minimum accepted signed pivot
    pub min_pivot: T,

    /// Iterative refinement steps per KKT solve
    pub refine_iters: usize,

    /// Fraction-to-boundary damping, in (0, 1)
    pub step_damping: T,

    /// Proximal weight of the phase-1 objective
    pub phase1_rho: T,

    /// Phase-1 stops once min(g − G x) reaches this margin
    pub phase1_margin: T,

    /// Divergence heuristics
    pub divergence: DivergencePolicy<T>,

    /// Enabled constraint families and checks
    pub features: FeatureSet,

    /// Log an iteration table through `log::info!`
    pub verbose: bool,
}

impl<T: SolverFloat> Default for SolverSettings<T> {
    fn default() -> Self {
        let eps = epsilon::<T>();
        let sqrt_eps = eps.sqrt();

        let max_iter = std::env::var("QPSOLVER_MAX_ITER")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(100);
        let refine_iters = std::env::var("QPSOLVER_REFINE_ITERS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(3);

        Self {
            max_iter,
            phase1_max_iter: 50,
            tol_feas: sqrt_eps,
            tol_gap: sqrt_eps,
            static_reg: sqrt_eps * cast(0.1),
            retry_reg: sqrt_eps * cast(10.0),
            min_pivot: eps * cast(10.0),
            refine_iters,
            step_damping: cast(0.99),
            phase1_rho: cast(1e-2),
            phase1_margin: cast(1e-3),
            divergence: DivergencePolicy::default(),
            features: FeatureSet::default(),
            verbose: std::env::var("QPSOLVER_VERBOSE")
                .ok()
                .map(|s| s != "0" && s.to_lowercase() != "false")
                .unwrap_or(false),
        }
    }
}

impl<T: SolverFloat> SolverSettings<T> {
    /// Default settings with a different feature set.
    pub fn with_features(features: FeatureSet) -> Self {
        Self {
            features,
            ..Self::default()
        }
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<(), ProblemError> {
        let zero = T::zero();
        let one = T::one();
        if !(self.step_damping > zero && self.step_damping < one) {
            return Err(ProblemError::InvalidSettings(format!(
                "step_damping must lie in (0, 1), got {}",
                to_f64(self.step_damping)
            )));
        }
        if !(self.tol_feas > zero) || !(self.tol_gap > zero) {
            return Err(ProblemError::InvalidSettings(
                "tolerances must be positive".to_string(),
            ));
        }
        if !(self.phase1_rho > zero) || !(self.phase1_margin > zero) {
            return Err(ProblemError::InvalidSettings(
                "phase1_rho and phase1_margin must be positive".to_string(),
            ));
        }
        if !(self.static_reg >= zero) || !(self.retry_reg > zero) || !(self.min_pivot > zero) {
            return Err(ProblemError::InvalidSettings(
                "static_reg must be non-negative, retry_reg and min_pivot positive".to_string(),
            ));
        }
        let div = &self.divergence;
        let ratio_ok = |r: T| r > zero && r <= one;
        if !ratio_ok(div.primal_stall_ratio) || !ratio_ok(div.dual_stall_ratio) {
            return Err(ProblemError::InvalidSettings(
                "residual stall ratios must lie in (0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Optional warm-start data.
///
/// `x` seeds the start point (phase-1 starts from it when it is not strictly
/// interior). `z` is used when it has one strictly positive entry per
/// inequality row, `y` when it has one entry per equality row.
#[derive(Debug, Clone)]
pub struct WarmStart<T: SolverFloat> {
    /// Primal variables x (length n)
    pub x: Option<Vec<T>>,
    /// Inequality multipliers z (length m)
    pub z: Option<Vec<T>>,
    /// Equality multipliers y (length p)
    pub y: Option<Vec<T>>,
}

impl<T: SolverFloat> Default for WarmStart<T> {
    fn default() -> Self {
        Self {
            x: None,
            z: None,
            y: None,
        }
    }
}

/// Solution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// Optimal solution found within tolerance
    Converged,

    /// Iteration cap reached first
    MaxIter,

    /// Infeasible or unbounded (certificate or divergence heuristic)
    Infeasible,

    /// Factorization failed after the retry, or an iterate became non-finite
    NumericalError,

    /// Problem data or settings rejected before iterating
    SetupError,
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::Converged => write!(f, "Converged"),
            SolveStatus::MaxIter => write!(f, "MaxIter"),
            SolveStatus::Infeasible => write!(f, "Infeasible"),
            SolveStatus::NumericalError => write!(f, "Numerical Error"),
            SolveStatus::SetupError => write!(f, "Setup Error"),
        }
    }
}

/// Solve result with solution and diagnostics.
#[derive(Debug, Clone)]
pub struct SolveResult<T: SolverFloat> {
    /// Solution status
    pub status: SolveStatus,

    /// Primal solution x (length n)
    pub x: Vec<T>,

    /// Inequality multipliers z, stacked lower, upper, affine (length m)
    pub z: Vec<T>,

    /// Equality multipliers y (length p)
    pub y: Vec<T>,

    /// Objective value at x
    pub obj_val: T,

    /// Detailed solve information and diagnostics
    pub info: SolveInfo<T>,
}

/// Detailed solve information and diagnostics.
#[derive(Debug, Clone)]
pub struct SolveInfo<T: SolverFloat> {
    /// Number of main IPM iterations completed
    pub iters: usize,

    /// Number of phase-1 iterations completed
    pub phase1_iters: usize,

    /// Final primal residual max(‖Gx + s − g‖∞, ‖Ex − h‖∞)
    pub primal_res: T,

    /// Final dual residual ‖Qx + c + Gᵀz + Eᵀy‖∞
    pub dual_res: T,

    /// Final barrier parameter μ
    pub mu: T,

    /// Factorization perturbation retries over the whole solve
    pub reg_retries: u64,

    /// Total solve time (milliseconds)
    pub solve_time_ms: u64,

    /// μ after every main iteration (index 0 is the start point)
    pub mu_history: Vec<T>,

    /// Validation failure behind a `SetupError`
    pub setup_error: Option<ProblemError>,
}

impl<T: SolverFloat> Default for SolveInfo<T> {
    fn default() -> Self {
        Self {
            iters: 0,
            phase1_iters: 0,
            primal_res: T::zero(),
            dual_res: T::zero(),
            mu: T::zero(),
            reg_retries: 0,
            solve_time_ms: 0,
            mu_history: Vec::new(),
            setup_error: None,
        }
    }
}

#[allow(non_snake_case)]
impl<T: SolverFloat> Problem<T> {
    /// Unconstrained QP with cost (1/2) xᵀ Q x + cᵀ x.
    pub fn new(Q: DMatrix<T>, c: DVector<T>) -> Self {
        Self {
            Q,
            c,
            lower: None,
            upper: None,
            inequalities: None,
            equalities: None,
        }
    }

    /// Attach lower bounds.
    pub fn with_lower_bounds(mut self, lower: DVector<T>) -> Self {
        self.lower = Some(lower);
        self
    }

    /// Attach upper bounds.
    pub fn with_upper_bounds(mut self, upper: DVector<T>) -> Self {
        self.upper = Some(upper);
        self
    }

    /// Attach affine inequalities A x ≤ b.
    pub fn with_inequalities(mut self, a: DMatrix<T>, b: DVector<T>) -> Self {
        self.inequalities = Some(AffineSystem::new(a, b));
        self
    }

    /// Attach affine equalities E x = h.
    pub fn with_equalities(mut self, e: DMatrix<T>, h: DVector<T>) -> Self {
        self.equalities = Some(AffineSystem::new(e, h));
        self
    }

    /// Number of primal variables (n).
    pub fn num_vars(&self) -> usize {
        self.c.len()
    }

    /// Number of equality rows (p).
    pub fn num_equalities(&self) -> usize {
        self.equalities.as_ref().map_or(0, |e| e.rows())
    }

    /// First variable whose finite lower bound exceeds its finite upper bound.
    pub fn crossed_bound(&self) -> Option<usize> {
        let (lower, upper) = (self.lower.as_ref()?, self.upper.as_ref()?);
        lower
            .iter()
            .zip(upper.iter())
            .position(|(&l, &u)| l.is_finite() && u.is_finite() && l > u)
    }

    /// Validate dimensions, symmetry, finiteness and feature usage.
    pub fn validate(&self, features: &FeatureSet) -> Result<(), ProblemError> {
        let n = self.num_vars();

        check_dim("Q rows", n, self.Q.nrows())?;
        check_dim("Q cols", n, self.Q.ncols())?;
        check_finite("Q", self.Q.iter())?;
        check_finite("c", self.c.iter())?;

        let sym_tol = epsilon::<T>() * cast(100.0);
        if !is_symmetric(&self.Q, sym_tol) {
            return Err(ProblemError::NotSymmetric);
        }

        if let Some(lower) = &self.lower {
            if !features.lower_bound {
                return Err(ProblemError::FeatureDisabled(ConstraintKind::LowerBound));
            }
            check_bounds("lower", lower, n, T::one())?;
        }
        if let Some(upper) = &self.upper {
            if !features.upper_bound {
                return Err(ProblemError::FeatureDisabled(ConstraintKind::UpperBound));
            }
            check_bounds("upper", upper, n, -T::one())?;
        }

        if let Some(ineq) = &self.inequalities {
            if !features.affine_inequality {
                return Err(ProblemError::FeatureDisabled(
                    ConstraintKind::AffineInequality,
                ));
            }
            check_system("A", "b", ineq, n)?;
        }

        if let Some(eq) = &self.equalities {
            check_system("E", "h", eq, n)?;
        }

        Ok(())
    }

    /// Validate warm-start lengths against the problem.
    pub fn validate_warm_start(&self, warm: &WarmStart<T>) -> Result<(), ProblemError> {
        if let Some(x) = &warm.x {
            check_dim("warm-start x", self.num_vars(), x.len())?;
            check_finite("warm-start x", x.iter())?;
        }
        if let Some(y) = &warm.y {
            check_dim("warm-start y", self.num_equalities(), y.len())?;
        }
        Ok(())
    }
}

fn check_dim(what: &'static str, expected: usize, actual: usize) -> Result<(), ProblemError> {
    if expected != actual {
        return Err(ProblemError::DimensionMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

fn check_finite<'a, T: SolverFloat + 'a>(
    what: &'static str,
    values: impl Iterator<Item = &'a T>,
) -> Result<(), ProblemError> {
    for (index, v) in values.enumerate() {
        if !v.is_finite() {
            return Err(ProblemError::NonFinite { what, index });
        }
    }
    Ok(())
}

/// `forbidden_sign` is +1 for lower bounds (+∞ forbidden), −1 for upper.
fn check_bounds<T: SolverFloat>(
    what: &'static str,
    bounds: &DVector<T>,
    n: usize,
    forbidden_sign: T,
) -> Result<(), ProblemError> {
    check_dim(what, n, bounds.len())?;
    for (index, &v) in bounds.iter().enumerate() {
        if v.is_finite() {
            continue;
        }
        if v * forbidden_sign > T::zero() {
            return Err(ProblemError::InvalidBound { what, index });
        }
        if !(v * forbidden_sign < T::zero()) {
            // NaN
            return Err(ProblemError::NonFinite { what, index });
        }
    }
    Ok(())
}

fn check_system<T: SolverFloat>(
    matrix_name: &'static str,
    rhs_name: &'static str,
    system: &AffineSystem<T>,
    n: usize,
) -> Result<(), ProblemError> {
    check_dim(matrix_name, n, system.matrix.ncols())?;
    check_dim(rhs_name, system.matrix.nrows(), system.rhs.len())?;
    check_finite(matrix_name, system.matrix.iter())?;
    check_finite(rhs_name, system.rhs.iter())
}
