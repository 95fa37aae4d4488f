//! Phase-1: find a strictly interior start point.
//!
//! Solves the elastic auxiliary problem
//!
//! ```text
//! minimize    t + (ρ/2)(‖x − x₀‖² + t²)
//! subject to  G x − t·1 ≤ g
//!             E x = h
//! ```
//!
//! with the same predictor-corrector engine. Any point with t < 0 is strictly
//! interior for the problem rows, so the run stops as soon as
//! min(g − G x) reaches the requested margin and E x = h holds to tolerance.
//! A point that is interior but misses the equalities is not accepted.

use super::diagnostics::DiagnosticsConfig;
use super::model::QpModel;
use super::workspace::Workspace;
use super::run_loop;
use crate::constraints::ConstraintBlock;
use crate::linalg::dense::inf_norm;
use crate::linalg::{to_f64, SolverFloat};
use crate::problem::{Problem, SolveStatus, SolverSettings};

/// Outcome of phase-1.
#[derive(Debug, Clone, Copy)]
pub struct Phase1Result {
    /// `Converged` when an interior point was found, otherwise the failure
    pub status: SolveStatus,
    /// Iterations spent
    pub iters: usize,
    /// Factorization perturbation retries
    pub reg_retries: u64,
}

/// Move `x` to a strictly interior point of the inequality rows.
///
/// On success `x` satisfies min(g − G x) > 0 and ‖E x − h‖∞ ≤
/// tol_feas·(1 + max(‖g‖∞, ‖h‖∞)). On failure `x` holds the last phase-1
/// iterate and the status is `Infeasible` or `NumericalError`.
pub fn find_interior_point<T: SolverFloat>(
    prob: &Problem<T>,
    blocks: &[Box<dyn ConstraintBlock<T>>],
    settings: &SolverSettings<T>,
    diag: &DiagnosticsConfig,
    x: &mut [T],
) -> Phase1Result {
    let n = x.len();
    let model = QpModel::phase1(prob, blocks, x, settings.phase1_rho);
    let (m, p) = (model.m(), model.p());

    let mut ws = match Workspace::new(n + 1, m, p, settings) {
        Ok(ws) => ws,
        Err(e) => {
            log::warn!("phase-1 setup failed: {}", e);
            return Phase1Result {
                status: SolveStatus::NumericalError,
                iters: 0,
                reg_retries: 0,
            };
        }
    };

    // t₀ = 1 − min(g − G x₀) makes every relaxed slack at least 1
    let mut margin = vec![T::zero(); m];
    let margin0 = model.inequality_margin(x, &mut margin);
    let t0 = T::one() - margin0;
    {
        let it = &mut ws.iterate;
        it.x[..n].copy_from_slice(x);
        it.x[n] = t0;
        for (si, &mi) in it.s.iter_mut().zip(margin.iter()) {
            *si = mi + t0;
        }
        it.z.fill(T::one());
        it.y.fill(T::zero());
    }

    if settings.verbose {
        log::info!(
            "phase-1: start margin {:.3e}, elastic t0 = {:.3e}",
            to_f64(margin0),
            to_f64(t0)
        );
    }

    let target = settings.phase1_margin;
    let eq_tol = settings.tol_feas * (T::one() + model.rhs_norm());
    let mut eq_res = vec![T::zero(); p];
    let mut mu_history = Vec::with_capacity(settings.phase1_max_iter + 1);
    let outcome = run_loop(
        &model,
        &mut ws,
        settings,
        settings.phase1_max_iter,
        "phase-1",
        diag,
        &mut mu_history,
        |it| {
            model.inequality_margin(&it.x, &mut margin) >= target
                && equality_violation(&model, &it.x, &mut eq_res) <= eq_tol
        },
    );

    x.copy_from_slice(&ws.iterate.x[..n]);
    let final_margin = model.inequality_margin(x, &mut margin);
    let final_eq = equality_violation(&model, x, &mut eq_res);
    let reg_retries = ws.kkt.total_retries();

    let status = match outcome.status {
        SolveStatus::NumericalError => SolveStatus::NumericalError,
        _ if final_margin > T::zero() && final_eq <= eq_tol => SolveStatus::Converged,
        _ => SolveStatus::Infeasible,
    };

    if settings.verbose {
        log::info!(
            "phase-1: {} after {} iterations, margin {:.3e}, equality residual {:.3e}",
            if status == SolveStatus::Converged {
                "interior point found"
            } else {
                "no interior point"
            },
            outcome.iters,
            to_f64(final_margin),
            to_f64(final_eq)
        );
    }

    Phase1Result {
        status,
        iters: outcome.iters,
        reg_retries,
    }
}

/// ‖E x − h‖∞, using `out` (length p) as scratch.
fn equality_violation<T: SolverFloat>(model: &QpModel<T>, x: &[T], out: &mut [T]) -> T {
    model.equality_residual(x, out);
    inf_norm(out)
}
