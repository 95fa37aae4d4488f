//! Variable bound blocks.
//!
//! A bound family only keeps rows for finite entries of its bound vector:
//!
//! - lower:  −x_i + s = −l_i   (s = x_i − l_i ≥ 0)
//! - upper:   x_i + s =  u_i   (s = u_i − x_i ≥ 0)
//!
//! Each row of G is ±e_i, so Gᵀ diag(w) G only touches the diagonal and the
//! block never materializes G.

use super::traits::{ConstraintBlock, ConstraintKind};
use crate::linalg::SolverFloat;
use nalgebra::{DMatrix, DVector};

/// Which side of the box a [`BoundBlock`] enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundSide {
    /// x ≥ l
    Lower,
    /// x ≤ u
    Upper,
}

/// Box-bound rows for one side.
#[derive(Debug, Clone)]
pub struct BoundBlock<T: SolverFloat> {
    side: BoundSide,
    /// Variable index of each row
    indices: Vec<usize>,
    /// g entries (−l_i or u_i)
    rhs: Vec<T>,
}

impl<T: SolverFloat> BoundBlock<T> {
    /// Lower-bound rows for every finite entry of `lower`.
    pub fn lower(lower: &DVector<T>) -> Self {
        Self::from_side(BoundSide::Lower, lower)
    }

    /// Upper-bound rows for every finite entry of `upper`.
    pub fn upper(upper: &DVector<T>) -> Self {
        Self::from_side(BoundSide::Upper, upper)
    }

    fn from_side(side: BoundSide, bounds: &DVector<T>) -> Self {
        let mut indices = Vec::with_capacity(bounds.len());
        let mut rhs = Vec::with_capacity(bounds.len());
        for (i, &v) in bounds.iter().enumerate() {
            if !v.is_finite() {
                continue;
            }
            indices.push(i);
            rhs.push(match side {
                BoundSide::Lower => -v,
                BoundSide::Upper => v,
            });
        }
        Self { side, indices, rhs }
    }

    #[inline]
    fn sign(&self) -> T {
        match self.side {
            BoundSide::Lower => -T::one(),
            BoundSide::Upper => T::one(),
        }
    }
}

impl<T: SolverFloat> ConstraintBlock<T> for BoundBlock<T> {
    fn kind(&self) -> ConstraintKind {
        match self.side {
            BoundSide::Lower => ConstraintKind::LowerBound,
            BoundSide::Upper => ConstraintKind::UpperBound,
        }
    }

    fn dim(&self) -> usize {
        self.indices.len()
    }

    fn rhs(&self) -> &[T] {
        &self.rhs
    }

    fn mul(&self, x: &[T], out: &mut [T]) {
        debug_assert_eq!(out.len(), self.indices.len());
        let sign = self.sign();
        for (o, &i) in out.iter_mut().zip(self.indices.iter()) {
            *o = sign * x[i];
        }
    }

    fn add_mul_transpose(&self, v: &[T], out: &mut [T]) {
        debug_assert_eq!(v.len(), self.indices.len());
        let sign = self.sign();
        for (&vk, &i) in v.iter().zip(self.indices.iter()) {
            out[i] += sign * vk;
        }
    }

    fn add_weighted_gram(&self, w: &[T], k: &mut DMatrix<T>) {
        // (±e_i)(±e_i)ᵀ = e_i e_iᵀ
        for (&wk, &i) in w.iter().zip(self.indices.iter()) {
            k[(i, i)] += wk;
        }
    }
}
