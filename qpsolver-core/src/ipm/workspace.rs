//! Pre-allocated workspace for the predictor-corrector loop.
//!
//! Every buffer the iteration needs is sized once from (nv, m, p) so the
//! hot loop never allocates.

use super::iterate::{Iterate, Residuals};
use crate::linalg::kkt::KktSolver;
use crate::linalg::ldl::LdlError;
use crate::linalg::SolverFloat;
use crate::problem::SolverSettings;

/// Newton direction.
#[derive(Debug, Clone)]
pub struct Direction<T: SolverFloat> {
    /// Direction for x
    pub dx: Vec<T>,
    /// Direction for s
    pub ds: Vec<T>,
    /// Direction for z
    pub dz: Vec<T>,
    /// Direction for y
    pub dy: Vec<T>,
}

impl<T: SolverFloat> Direction<T> {
    fn new(nv: usize, m: usize, p: usize) -> Self {
        Self {
            dx: vec![T::zero(); nv],
            ds: vec![T::zero(); m],
            dz: vec![T::zero(); m],
            dy: vec![T::zero(); p],
        }
    }
}

/// Workspace for one engine run.
pub struct Workspace<T: SolverFloat> {
    /// Current iterate
    pub iterate: Iterate<T>,
    /// Residuals of `iterate`
    pub residuals: Residuals<T>,
    /// Affine (predictor) direction
    pub aff: Direction<T>,
    /// Combined (corrector) direction
    pub comb: Direction<T>,
    /// Scaling W = z / s
    pub w: Vec<T>,
    /// Complementarity right-hand side
    pub r_c: Vec<T>,
    /// Row-space scratch (m)
    pub tmp_m: Vec<T>,
    /// Variable-space scratch (nv)
    pub tmp_nv: Vec<T>,
    /// KKT matrix, factorization and solve buffers
    pub kkt: KktSolver<T>,
}

impl<T: SolverFloat> Workspace<T> {
    /// Allocate every buffer for a model with nv variables, m inequality
    /// rows and p equality rows.
    pub fn new(nv: usize, m: usize, p: usize, settings: &SolverSettings<T>) -> Result<Self, LdlError> {
        let kkt = KktSolver::new(
            nv,
            p,
            settings.static_reg,
            settings.retry_reg,
            settings.min_pivot,
            settings.refine_iters,
        )?;

        Ok(Self {
            iterate: Iterate::new(nv, m, p),
            residuals: Residuals::new(nv, m, p),
            aff: Direction::new(nv, m, p),
            comb: Direction::new(nv, m, p),
            w: vec![T::zero(); m],
            r_c: vec![T::zero(); m],
            tmp_m: vec![T::zero(); m],
            tmp_nv: vec![T::zero(); nv],
            kkt,
        })
    }
}
