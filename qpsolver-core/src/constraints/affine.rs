//! General affine inequality block A x ≤ b.
//!
//! Rows are stored densely; the Newton contribution Aᵀ diag(w) A is the one
//! dense matrix-matrix product per iteration, so switching this family off
//! removes the O(m n²) term from the iteration cost.

use super::traits::{ConstraintBlock, ConstraintKind};
use crate::linalg::dense::{add_weighted_gram, gemv, gemv_t};
use crate::linalg::SolverFloat;
use nalgebra::{DMatrix, DVector};

/// Dense affine inequality rows.
#[derive(Debug, Clone)]
pub struct AffineBlock<T: SolverFloat> {
    a: DMatrix<T>,
    b: Vec<T>,
}

impl<T: SolverFloat> AffineBlock<T> {
    /// Copy A (m×n) and b (m) into a block.
    pub fn new(a: &DMatrix<T>, b: &DVector<T>) -> Self {
        assert_eq!(a.nrows(), b.len(), "A and b row counts differ");
        Self {
            a: a.clone(),
            b: b.iter().copied().collect(),
        }
    }
}

impl<T: SolverFloat> ConstraintBlock<T> for AffineBlock<T> {
    fn kind(&self) -> ConstraintKind {
        ConstraintKind::AffineInequality
    }

    fn dim(&self) -> usize {
        self.b.len()
    }

    fn rhs(&self) -> &[T] {
        &self.b
    }

    fn mul(&self, x: &[T], out: &mut [T]) {
        gemv(T::one(), &self.a, &x[..self.a.ncols()], T::zero(), out);
    }

    fn add_mul_transpose(&self, v: &[T], out: &mut [T]) {
        let n = self.a.ncols();
        gemv_t(T::one(), &self.a, v, T::one(), &mut out[..n]);
    }

    fn add_weighted_gram(&self, w: &[T], k: &mut DMatrix<T>) {
        add_weighted_gram(&self.a, w, k);
    }
}
