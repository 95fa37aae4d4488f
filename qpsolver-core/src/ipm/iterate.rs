//! Primal-dual iterate and its residuals.

use super::model::QpModel;
use crate::linalg::dense::{all_finite, dot, inf_norm};
use crate::linalg::{cast, SolverFloat};

/// Primal-dual point (x, s, z, y).
#[derive(Debug, Clone)]
pub struct Iterate<T: SolverFloat> {
    /// Model variables (n, or n + 1 in phase-1)
    pub x: Vec<T>,
    /// Inequality slacks (m)
    pub s: Vec<T>,
    /// Inequality multipliers (m)
    pub z: Vec<T>,
    /// Equality multipliers (p)
    pub y: Vec<T>,
}

impl<T: SolverFloat> Iterate<T> {
    /// Zero iterate of the given dimensions.
    pub fn new(nv: usize, m: usize, p: usize) -> Self {
        Self {
            x: vec![T::zero(); nv],
            s: vec![T::zero(); m],
            z: vec![T::zero(); m],
            y: vec![T::zero(); p],
        }
    }

    /// Whether every component is finite.
    pub fn is_finite(&self) -> bool {
        all_finite(&self.x) && all_finite(&self.s) && all_finite(&self.z) && all_finite(&self.y)
    }
}

/// KKT residuals of an iterate.
#[derive(Debug, Clone)]
pub struct Residuals<T: SolverFloat> {
    /// r_d = H x + c + Gᵀ z + Eᵀ y
    pub r_d: Vec<T>,
    /// r_p = G x + s − g
    pub r_p: Vec<T>,
    /// r_e = E x − h
    pub r_e: Vec<T>,
    /// max(‖r_p‖∞, ‖r_e‖∞)
    pub primal_res: T,
    /// ‖r_d‖∞
    pub dual_res: T,
    /// sᵀz / m
    pub mu: T,
}

impl<T: SolverFloat> Residuals<T> {
    /// Zero residuals of the given dimensions.
    pub fn new(nv: usize, m: usize, p: usize) -> Self {
        Self {
            r_d: vec![T::zero(); nv],
            r_p: vec![T::zero(); m],
            r_e: vec![T::zero(); p],
            primal_res: T::zero(),
            dual_res: T::zero(),
            mu: T::zero(),
        }
    }
}

/// Complementarity measure sᵀz / m (zero without inequality rows).
pub fn compute_mu<T: SolverFloat>(s: &[T], z: &[T]) -> T {
    if s.is_empty() {
        return T::zero();
    }
    dot(s, z) / cast::<T>(s.len() as f64)
}

/// Evaluate every residual of `it` in place.
pub fn compute_residuals<T: SolverFloat>(model: &QpModel<T>, it: &Iterate<T>, res: &mut Residuals<T>) {
    model.mul_hessian(&it.x, &mut res.r_d);
    for (rd, &ci) in res.r_d.iter_mut().zip(model.c().iter()) {
        *rd += ci;
    }
    model.add_mul_gt(&it.z, &mut res.r_d);
    model.add_mul_et(&it.y, &mut res.r_d);

    model.mul_g(&it.x, &mut res.r_p);
    for ((rp, &si), &gi) in res.r_p.iter_mut().zip(it.s.iter()).zip(model.g().iter()) {
        *rp += si - gi;
    }

    model.equality_residual(&it.x, &mut res.r_e);

    res.primal_res = inf_norm(&res.r_p).max(inf_norm(&res.r_e));
    res.dual_res = inf_norm(&res.r_d);
    res.mu = compute_mu(&it.s, &it.z);
}
