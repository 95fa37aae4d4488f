//! Termination criteria and divergence detection.
//!
//! Convergence uses scaled residuals:
//!
//! ```text
//! primal_res ≤ tol_feas · (1 + max(‖g‖∞, ‖h‖∞))
//! dual_res   ≤ tol_feas · (1 + ‖c‖∞)
//! μ          ≤ tol_gap
//! ```
//!
//! Infeasibility is declared heuristically from the shape of the iteration:
//! runaway μ, a stalled step length, an unbounded primal iterate, or a
//! primal or dual residual that no longer moves once μ ≈ 0.

use super::iterate::Residuals;
use super::model::QpModel;
use crate::linalg::dense::inf_norm;
use crate::linalg::SolverFloat;
use crate::problem::{DivergencePolicy, SolverSettings};
use std::fmt;

/// Convergence thresholds for one model.
#[derive(Debug, Clone, Copy)]
pub struct TerminationCriteria<T: SolverFloat> {
    /// Feasibility tolerance
    pub tol_feas: T,

    /// Complementarity tolerance
    pub tol_gap: T,

    /// 1 + max(‖g‖∞, ‖h‖∞)
    pub primal_scale: T,

    /// 1 + ‖c‖∞
    pub dual_scale: T,
}

impl<T: SolverFloat> TerminationCriteria<T> {
    /// Thresholds for `model` under `settings`.
    pub fn new(model: &QpModel<T>, settings: &SolverSettings<T>) -> Self {
        Self {
            tol_feas: settings.tol_feas,
            tol_gap: settings.tol_gap,
            primal_scale: T::one() + model.rhs_norm(),
            dual_scale: T::one() + inf_norm(model.c()),
        }
    }

    /// Whether the residuals meet every tolerance.
    pub fn is_converged(&self, res: &Residuals<T>) -> bool {
        res.primal_res <= self.tol_feas * self.primal_scale
            && res.dual_res <= self.tol_feas * self.dual_scale
            && res.mu <= self.tol_gap
    }
}

/// Why the divergence monitor gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivergenceReason {
    /// μ kept growing far above its best value
    MuGrowth,
    /// Tiny steps without residual progress
    Stalled,
    /// Primal iterate left every reasonable box
    Unbounded,
    /// Complementarity vanished while the primal residual stayed put
    PrimalStalled,
    /// Complementarity vanished while the dual residual stayed put
    DualStalled,
}

impl fmt::Display for DivergenceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DivergenceReason::MuGrowth => write!(f, "mu growth"),
            DivergenceReason::Stalled => write!(f, "stalled steps"),
            DivergenceReason::Unbounded => write!(f, "unbounded iterate"),
            DivergenceReason::PrimalStalled => write!(f, "primal residual stalled at mu ~ 0"),
            DivergenceReason::DualStalled => write!(f, "dual residual stalled at mu ~ 0"),
        }
    }
}

/// Tracks the iteration history needed by the divergence heuristics.
#[derive(Debug, Clone)]
pub struct DivergenceMonitor<T: SolverFloat> {
    policy: DivergencePolicy<T>,
    /// Primal residual regarded as converged
    primal_tol: T,
    /// Dual residual regarded as converged
    dual_tol: T,
    tol_gap: T,
    mu_min: Option<T>,
    prev_mu: Option<T>,
    growth_count: usize,
    prev_res: Option<T>,
    stall_count: usize,
    primal_stall: ResidualStall<T>,
    dual_stall: ResidualStall<T>,
}

impl<T: SolverFloat> DivergenceMonitor<T> {
    /// Fresh monitor for a run judged by `criteria`.
    pub fn new(policy: DivergencePolicy<T>, criteria: &TerminationCriteria<T>) -> Self {
        Self {
            policy,
            primal_tol: criteria.tol_feas * criteria.primal_scale,
            dual_tol: criteria.tol_feas * criteria.dual_scale,
            tol_gap: criteria.tol_gap,
            mu_min: None,
            prev_mu: None,
            growth_count: 0,
            prev_res: None,
            stall_count: 0,
            primal_stall: ResidualStall::default(),
            dual_stall: ResidualStall::default(),
        }
    }

    /// Record one iteration and report divergence, if any.
    ///
    /// `res` describes the iterate after a step of length `alpha` and
    /// `x_norm` is its ‖x‖∞.
    pub fn observe(&mut self, res: &Residuals<T>, alpha: T, x_norm: T) -> Option<DivergenceReason> {
        let policy = self.policy;
        let mu = res.mu;
        if x_norm > policy.x_limit {
            return Some(DivergenceReason::Unbounded);
        }

        let mu_min = self.mu_min.map_or(mu, |m| m.min(mu));
        self.mu_min = Some(mu_min);
        match self.prev_mu {
            Some(prev) if mu > prev => self.growth_count += 1,
            _ => self.growth_count = 0,
        }
        self.prev_mu = Some(mu);
        if self.growth_count >= policy.mu_growth_iters && mu > policy.mu_growth_factor * mu_min {
            return Some(DivergenceReason::MuGrowth);
        }

        let res_norm = res.primal_res.max(res.dual_res);
        let progressed = self.prev_res.map_or(true, |prev| res_norm < prev);
        if alpha < policy.min_step && !progressed {
            self.stall_count += 1;
        } else {
            self.stall_count = 0;
        }
        self.prev_res = Some(res_norm);
        if self.stall_count >= policy.stall_iters {
            return Some(DivergenceReason::Stalled);
        }

        // Residual stuck above tolerance after μ has reached its target
        let settled = mu <= self.tol_gap;
        let primal = self.primal_stall.observe(
            res.primal_res,
            settled && res.primal_res > self.primal_tol,
            policy.primal_stall_ratio,
        );
        if primal >= policy.primal_stall_iters {
            return Some(DivergenceReason::PrimalStalled);
        }
        let dual = self.dual_stall.observe(
            res.dual_res,
            settled && res.dual_res > self.dual_tol,
            policy.dual_stall_ratio,
        );
        if dual >= policy.dual_stall_iters {
            return Some(DivergenceReason::DualStalled);
        }

        None
    }
}

/// Consecutive iterations in which one residual failed to shrink.
#[derive(Debug, Clone, Copy)]
struct ResidualStall<T: SolverFloat> {
    prev: Option<T>,
    count: usize,
}

impl<T: SolverFloat> Default for ResidualStall<T> {
    fn default() -> Self {
        Self {
            prev: None,
            count: 0,
        }
    }
}

impl<T: SolverFloat> ResidualStall<T> {
    /// Record `value`; it counts as stalled when `armed` and it kept more
    /// than `ratio` of the previous value. Returns the current run length.
    fn observe(&mut self, value: T, armed: bool, ratio: T) -> usize {
        let stuck = self.prev.map_or(false, |prev| value > ratio * prev);
        self.count = if armed && stuck { self.count + 1 } else { 0 };
        self.prev = Some(value);
        self.count
    }
}
