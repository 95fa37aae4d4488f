//! Constraint block trait definition.
//!
//! Every inequality family the solver understands (lower bounds, upper
//! bounds, affine inequalities) is a strategy unit implementing
//! [`ConstraintBlock`]. A block owns a contiguous range of rows of the
//! stacked inequality system
//!
//! ```text
//! G x + s = g,   s ≥ 0
//! ```
//!
//! and of the paired multipliers z. The engine never looks inside a block: it
//! asks for products with G and Gᵀ and for the block's contribution
//! Gᵀ diag(w) G to the Newton matrix. Families that are switched off are never
//! instantiated, so they cost nothing per iteration.

use crate::linalg::{infinity, SolverFloat};
use nalgebra::DMatrix;
use std::fmt;

/// Inequality family handled by a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    /// x_i ≥ l_i for every finite l_i
    LowerBound,
    /// x_i ≤ u_i for every finite u_i
    UpperBound,
    /// A x ≤ b
    AffineInequality,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintKind::LowerBound => write!(f, "lower bound"),
            ConstraintKind::UpperBound => write!(f, "upper bound"),
            ConstraintKind::AffineInequality => write!(f, "affine inequality"),
        }
    }
}

/// Core constraint block interface.
///
/// All methods operate on the block's own slice of the stacked row space
/// (length [`ConstraintBlock::dim`]) and on the full primal vector
/// (length n). Implementations must not allocate.
pub trait ConstraintBlock<T: SolverFloat>: Send + Sync {
    /// Family of this block.
    fn kind(&self) -> ConstraintKind;

    /// Number of rows (slack/multiplier pairs).
    fn dim(&self) -> usize;

    /// Right-hand side g of this block's rows.
    fn rhs(&self) -> &[T];

    /// out = G x
    fn mul(&self, x: &[T], out: &mut [T]);

    /// out += Gᵀ v
    fn add_mul_transpose(&self, v: &[T], out: &mut [T]);

    /// K[0..n, 0..n] += Gᵀ diag(w) G
    fn add_weighted_gram(&self, w: &[T], k: &mut DMatrix<T>);

    /// Maximum α ≥ 0 with v + α dv ≥ 0 (+∞ if dv never decreases v).
    ///
    /// Every family shipped here keeps its slacks in the nonnegative orthant,
    /// which is self-dual, so the same rule serves s and z.
    fn step_to_boundary(&self, v: &[T], dv: &[T]) -> T {
        debug_assert_eq!(v.len(), dv.len());
        let mut alpha = infinity::<T>();
        for (&vi, &dvi) in v.iter().zip(dv.iter()) {
            if dvi < T::zero() {
                alpha = alpha.min(-vi / dvi);
            }
        }
        alpha
    }

    /// True when every entry of v is strictly positive and finite.
    fn is_interior(&self, v: &[T]) -> bool {
        v.iter().all(|&vi| vi.is_finite() && vi > T::zero())
    }
}
