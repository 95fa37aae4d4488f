//! KKT system storage, factorization and solve.
//!
//! The reduced Newton system of the interior point method has the
//! quasi-definite form:
//!
//! ```text
//! K = [ Q + Gᵀ W G    Eᵀ ]
//!     [ E             0  ]
//! ```
//!
//! where:
//! - Q is the cost Hessian (n×n, PSD)
//! - G stacks the rows of every enabled inequality family
//! - W = diag(z / s) is the interior-point scaling (positive)
//! - E is the equality matrix (p×n)
//!
//! The constraint strategy units assemble K in place (see
//! `ipm::model::QpModel::assemble_kkt`); this module owns the buffer, the
//! regularized factorization, and the solve with iterative refinement.

use super::dense::{gemv, inf_norm};
use super::ldl::{LdlError, LdlSolver};
use super::SolverFloat;
use nalgebra::DMatrix;

/// Dense KKT solver.
///
/// Manages the KKT matrix, its LDLᵀ factorization and the right-hand side /
/// solution buffers. Everything is sized once from (n, p).
pub struct KktSolver<T: SolverFloat> {
    /// Assembled (unregularized) KKT matrix
    matrix: DMatrix<T>,

    /// LDL backend
    ldl: LdlSolver<T>,

    /// Right-hand side
    rhs: Vec<T>,

    /// Solution
    sol: Vec<T>,

    /// Refinement residual / correction
    resid: Vec<T>,

    /// Iterative refinement steps per solve
    refine_iters: usize,
}

impl<T: SolverFloat> KktSolver<T> {
    /// Create a new KKT solver.
    ///
    /// # Arguments
    ///
    /// * `n` - Number of primal variables
    /// * `p` - Number of equality constraints
    /// * `static_reg` - Static diagonal regularization
    /// * `retry_reg` - Perturbation applied on the single factorization retry
    /// * `min_pivot` - Minimum accepted signed pivot
    /// * `refine_iters` - Iterative refinement steps per solve
    pub fn new(
        n: usize,
        p: usize,
        static_reg: T,
        retry_reg: T,
        min_pivot: T,
        refine_iters: usize,
    ) -> Result<Self, LdlError> {
        let dim = n + p;
        let ldl = LdlSolver::new(dim, n, static_reg, retry_reg, min_pivot)?;

        Ok(Self {
            matrix: DMatrix::zeros(dim, dim),
            ldl,
            rhs: vec![T::zero(); dim],
            sol: vec![T::zero(); dim],
            resid: vec![T::zero(); dim],
            refine_iters,
        })
    }

    /// Mutable access to the KKT matrix for assembly.
    #[inline]
    pub fn matrix_mut(&mut self) -> &mut DMatrix<T> {
        &mut self.matrix
    }

    /// Factor the assembled matrix.
    pub fn factor(&mut self) -> Result<(), LdlError> {
        self.ldl.factor(&self.matrix)
    }

    /// Mutable right-hand side; the first n entries are the primal block.
    #[inline]
    pub fn rhs_mut(&mut self) -> &mut [T] {
        &mut self.rhs
    }

    /// Solve K sol = rhs with iterative refinement and return the solution.
    pub fn solve(&mut self) -> &[T] {
        self.sol.copy_from_slice(&self.rhs);
        self.ldl.solve_in_place(&mut self.sol);

        let rhs_norm = inf_norm(&self.rhs).max(T::one());
        let stop = T::default_epsilon() * rhs_norm;

        for _ in 0..self.refine_iters {
            // resid = rhs - K sol
            self.resid.copy_from_slice(&self.rhs);
            gemv(-T::one(), &self.matrix, &self.sol, T::one(), &mut self.resid);
            if inf_norm(&self.resid) <= stop {
                break;
            }
            self.ldl.solve_in_place(&mut self.resid);
            for (si, &ci) in self.sol.iter_mut().zip(self.resid.iter()) {
                *si += ci;
            }
        }

        &self.sol
    }

    /// Whether the last factorization needed the perturbation retry.
    #[inline]
    pub fn retried(&self) -> bool {
        self.ldl.retried()
    }

    /// Number of perturbation retries since construction.
    #[inline]
    pub fn total_retries(&self) -> u64 {
        self.ldl.total_retries()
    }
}
