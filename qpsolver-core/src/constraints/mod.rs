//! Inequality constraint strategy units.
//!
//! Each enabled inequality family becomes one [`ConstraintBlock`]; the stacked
//! row space is laid out lower bounds, upper bounds, affine rows, in that
//! order. Families that are disabled or carry no finite rows produce no block.

pub mod affine;
pub mod bounds;
pub mod traits;

pub use affine::AffineBlock;
pub use bounds::{BoundBlock, BoundSide};
pub use traits::{ConstraintBlock, ConstraintKind};

use crate::linalg::SolverFloat;
use crate::problem::{FeatureSet, Problem};

/// Instantiate the blocks for every enabled family present in `prob`.
pub fn build_blocks<T: SolverFloat>(
    prob: &Problem<T>,
    features: &FeatureSet,
) -> Vec<Box<dyn ConstraintBlock<T>>> {
    let mut blocks: Vec<Box<dyn ConstraintBlock<T>>> = Vec::with_capacity(3);

    if features.lower_bound {
        if let Some(lower) = &prob.lower {
            blocks.push(Box::new(BoundBlock::lower(lower)));
        }
    }
    if features.upper_bound {
        if let Some(upper) = &prob.upper {
            blocks.push(Box::new(BoundBlock::upper(upper)));
        }
    }
    if features.affine_inequality {
        if let Some(ineq) = &prob.inequalities {
            blocks.push(Box::new(AffineBlock::new(&ineq.matrix, &ineq.rhs)));
        }
    }

    blocks.retain(|b| b.dim() > 0);
    blocks
}

/// Row offsets of each block plus the total row count as the last entry.
pub fn block_offsets<T: SolverFloat>(blocks: &[Box<dyn ConstraintBlock<T>>]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(blocks.len() + 1);
    let mut offset = 0;
    offsets.push(offset);
    for block in blocks {
        offset += block.dim();
        offsets.push(offset);
    }
    offsets
}
