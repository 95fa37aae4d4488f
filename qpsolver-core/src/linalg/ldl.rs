//! Dense LDLᵀ factorization for quasi-definite KKT matrices.
//!
//! The factorization computes L and D such that K + R = LDLᵀ, where:
//! - L is unit lower triangular (stored below the diagonal of a dense buffer)
//! - D is diagonal with a prescribed sign pattern: positive on the primal
//!   block, negative on the equality-multiplier block
//! - R is the static regularization (+δ on the primal block, −δ on the
//!   equality block)
//!
//! A pivot with the wrong sign (or smaller than `min_pivot` in magnitude)
//! means the matrix is not quasi-definite. The solver then perturbs the
//! diagonal once more and refactors; a second failure is an error.

use super::{to_f64, SolverFloat};
use nalgebra::DMatrix;
use thiserror::Error;

/// LDL solver errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LdlError {
    /// Pivot failed the sign/magnitude test even after the perturbation retry
    #[error("Factorization failed: pivot {index} = {pivot:e} after regularization retry")]
    NotQuasiDefinite {
        /// Row/column of the failing pivot
        index: usize,
        /// Value of the failing pivot (widened to f64)
        pivot: f64,
    },

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension
        expected: usize,
        /// Actual dimension
        actual: usize,
    },

    /// Invalid regularization parameter
    #[error("Invalid regularization parameter: {0}")]
    InvalidRegularization(String),
}

/// Dense LDLᵀ backend with static regularization and one perturbation retry.
///
/// All storage is allocated in [`LdlSolver::new`] and reused by every
/// factorization.
pub struct LdlSolver<T: SolverFloat> {
    /// Matrix dimension
    n: usize,

    /// Leading rows/columns expecting a positive pivot
    n_positive: usize,

    /// L below the diagonal; diagonal and upper part are scratch
    factor: DMatrix<T>,

    /// D diagonal
    d: Vec<T>,

    /// Static regularization (added with the pivot sign)
    static_reg: T,

    /// Extra perturbation applied on the single retry
    retry_reg: T,

    /// Minimum signed pivot accepted
    min_pivot: T,

    /// Whether the last factorization needed the retry
    retried: bool,

    /// Total retries over the solver's lifetime
    total_retries: u64,

    /// Whether `factor`/`d` hold a valid factorization
    factored: bool,
}

impl<T: SolverFloat> LdlSolver<T> {
    /// Create a new LDL solver.
    ///
    /// # Arguments
    ///
    /// * `n` - Dimension of the system
    /// * `n_positive` - Number of leading pivots expected to be positive
    /// * `static_reg` - Static diagonal regularization δ
    /// * `retry_reg` - Additional perturbation used on the retry
    /// * `min_pivot` - Minimum accepted signed pivot
    pub fn new(
        n: usize,
        n_positive: usize,
        static_reg: T,
        retry_reg: T,
        min_pivot: T,
    ) -> Result<Self, LdlError> {
        if n_positive > n {
            return Err(LdlError::DimensionMismatch {
                expected: n,
                actual: n_positive,
            });
        }
        if static_reg < T::zero() {
            return Err(LdlError::InvalidRegularization(format!(
                "static_reg must be non-negative, got {:e}",
                to_f64(static_reg)
            )));
        }
        if retry_reg <= T::zero() {
            return Err(LdlError::InvalidRegularization(format!(
                "retry_reg must be positive, got {:e}",
                to_f64(retry_reg)
            )));
        }
        if min_pivot <= T::zero() {
            return Err(LdlError::InvalidRegularization(format!(
                "min_pivot must be positive, got {:e}",
                to_f64(min_pivot)
            )));
        }

        Ok(Self {
            n,
            n_positive,
            factor: DMatrix::zeros(n, n),
            d: vec![T::zero(); n],
            static_reg,
            retry_reg,
            min_pivot,
            retried: false,
            total_retries: 0,
            factored: false,
        })
    }

    /// Whether the most recent factorization needed the perturbation retry.
    pub fn retried(&self) -> bool {
        self.retried
    }

    /// Number of perturbation retries since construction.
    pub fn total_retries(&self) -> u64 {
        self.total_retries
    }

    /// Diagonal D of the most recent successful factorization.
    pub fn d_values(&self) -> Option<&[T]> {
        self.factored.then_some(self.d.as_slice())
    }

    /// Factor a symmetric matrix (both triangles populated).
    pub fn factor(&mut self, k: &DMatrix<T>) -> Result<(), LdlError> {
        if k.nrows() != self.n || k.ncols() != self.n {
            return Err(LdlError::DimensionMismatch {
                expected: self.n,
                actual: k.nrows(),
            });
        }

        self.retried = false;
        self.factored = false;

        let first = match self.try_factor(k, self.static_reg) {
            Ok(()) => {
                self.factored = true;
                return Ok(());
            }
            Err(fail) => fail,
        };

        log::warn!(
            "LDL pivot {} = {:.3e} rejected, retrying with perturbation {:.3e}",
            first.0,
            to_f64(first.1),
            to_f64(self.retry_reg)
        );
        self.retried = true;
        self.total_retries += 1;

        match self.try_factor(k, self.static_reg + self.retry_reg) {
            Ok(()) => {
                self.factored = true;
                Ok(())
            }
            Err((index, pivot)) => Err(LdlError::NotQuasiDefinite {
                index,
                pivot: to_f64(pivot),
            }),
        }
    }

    /// Solve (LDLᵀ) x = b in place.
    ///
    /// # Panics
    ///
    /// Panics if no successful factorization is available or `rhs` has the
    /// wrong length.
    pub fn solve_in_place(&self, rhs: &mut [T]) {
        assert!(self.factored, "solve called without a valid factorization");
        assert_eq!(rhs.len(), self.n);

        let l = &self.factor;

        // Forward substitution: L y = b
        for i in 0..self.n {
            let mut acc = rhs[i];
            for k in 0..i {
                acc -= l[(i, k)] * rhs[k];
            }
            rhs[i] = acc;
        }

        // Diagonal: D w = y
        for (ri, &di) in rhs.iter_mut().zip(self.d.iter()) {
            *ri /= di;
        }

        // Backward substitution: Lᵀ x = w
        for i in (0..self.n).rev() {
            let mut acc = rhs[i];
            for k in (i + 1)..self.n {
                acc -= l[(k, i)] * rhs[k];
            }
            rhs[i] = acc;
        }
    }

    #[inline]
    fn pivot_sign(&self, j: usize) -> T {
        if j < self.n_positive {
            T::one()
        } else {
            -T::one()
        }
    }

    /// Column-by-column (Crout) LDLᵀ on a copy of `k` plus the signed shift `reg`.
    ///
    /// Returns the offending (index, pivot) on failure.
    fn try_factor(&mut self, k: &DMatrix<T>, reg: T) -> Result<(), (usize, T)> {
        self.factor.copy_from(k);
        for j in 0..self.n {
            let sign = self.pivot_sign(j);
            self.factor[(j, j)] += sign * reg;
        }

        for j in 0..self.n {
            let sign = self.pivot_sign(j);

            let mut dj = self.factor[(j, j)];
            for k in 0..j {
                let ljk = self.factor[(j, k)];
                dj -= ljk * ljk * self.d[k];
            }

            if !dj.is_finite() || sign * dj <= self.min_pivot {
                return Err((j, dj));
            }
            self.d[j] = dj;

            for i in (j + 1)..self.n {
                let mut v = self.factor[(i, j)];
                for k in 0..j {
                    v -= self.factor[(i, k)] * self.factor[(j, k)] * self.d[k];
                }
                self.factor[(i, j)] = v / dj;
            }
        }

        Ok(())
    }
}
