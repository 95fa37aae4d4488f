//! Interior point method solver.
//!
//! Phase-1 initialization, the predictor-corrector loop, termination and
//! result extraction.

pub mod diagnostics;
pub mod iterate;
pub mod model;
pub mod phase1;
pub mod predcorr;
pub mod solution;
pub mod termination;
pub mod workspace;

use crate::constraints::build_blocks;
use crate::linalg::dense::{inf_norm, min_entry};
use crate::linalg::{to_f64, SolverFloat};
use crate::problem::{Problem, ProblemError, SolveInfo, SolveResult, SolveStatus, SolverSettings, WarmStart};
use diagnostics::DiagnosticsConfig;
use iterate::{compute_residuals, Iterate};
use model::QpModel;
use predcorr::predictor_corrector_step;
use solution::{early_result, extract_solution};
use std::time::Instant;
use termination::{DivergenceMonitor, TerminationCriteria};
use workspace::Workspace;

/// Engine state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Start point loaded, residuals not yet evaluated
    Initialized,
    /// Taking Newton steps
    Iterating,
    /// Finished with the given status
    Terminated(SolveStatus),
}

/// Outcome of one engine run.
#[derive(Debug, Clone, Copy)]
pub struct LoopOutcome {
    /// Final status
    pub status: SolveStatus,
    /// Newton steps taken
    pub iters: usize,
}

/// Run the predictor-corrector loop from `ws.iterate` until termination.
///
/// `early_stop` is checked after every step; returning true ends the run
/// with `Converged`. μ after every evaluation is appended to `mu_history`.
pub fn run_loop<T, F>(
    model: &QpModel<T>,
    ws: &mut Workspace<T>,
    settings: &SolverSettings<T>,
    max_iter: usize,
    label: &str,
    diag: &DiagnosticsConfig,
    mu_history: &mut Vec<T>,
    mut early_stop: F,
) -> LoopOutcome
where
    T: SolverFloat,
    F: FnMut(&Iterate<T>) -> bool,
{
    let criteria = TerminationCriteria::new(model, settings);
    let mut monitor = DivergenceMonitor::new(settings.divergence, &criteria);
    let mut state = EngineState::Initialized;
    let mut iter = 0;

    loop {
        state = match state {
            EngineState::Initialized => {
                compute_residuals(model, &ws.iterate, &mut ws.residuals);
                mu_history.push(ws.residuals.mu);

                if settings.verbose {
                    log::info!(
                        "{} {:>4} {:>12} {:>10} {:>10} {:>9} {:>9}",
                        label,
                        "iter",
                        "mu",
                        "pres",
                        "dres",
                        "alpha",
                        "sigma"
                    );
                    log::info!(
                        "{} {:>4} {:>12.4e} {:>10.3e} {:>10.3e} {:>9} {:>9}",
                        label,
                        0,
                        to_f64(ws.residuals.mu),
                        to_f64(ws.residuals.primal_res),
                        to_f64(ws.residuals.dual_res),
                        "-",
                        "-"
                    );
                }

                if !ws.iterate.is_finite() || !ws.residuals.mu.is_finite() {
                    EngineState::Terminated(SolveStatus::NumericalError)
                } else if early_stop(&ws.iterate) || criteria.is_converged(&ws.residuals) {
                    EngineState::Terminated(SolveStatus::Converged)
                } else {
                    EngineState::Iterating
                }
            }

            EngineState::Iterating => {
                if iter >= max_iter {
                    EngineState::Terminated(SolveStatus::MaxIter)
                } else {
                    match predictor_corrector_step(model, ws, settings) {
                        Err(e) => {
                            log::warn!("{}: iteration {} failed: {}", label, iter + 1, e);
                            EngineState::Terminated(SolveStatus::NumericalError)
                        }
                        Ok(step) => {
                            iter += 1;
                            compute_residuals(model, &ws.iterate, &mut ws.residuals);
                            mu_history.push(ws.residuals.mu);
                            let res = &ws.residuals;

                            if settings.verbose {
                                log::info!(
                                    "{} {:>4} {:>12.4e} {:>10.3e} {:>10.3e} {:>9.3e} {:>9.3e}",
                                    label,
                                    iter,
                                    to_f64(res.mu),
                                    to_f64(res.primal_res),
                                    to_f64(res.dual_res),
                                    to_f64(step.alpha),
                                    to_f64(step.sigma)
                                );
                            }
                            if diag.should_log(iter) {
                                log::debug!(
                                    "{} iter {}: alpha_aff={:.3e} mu_aff={:.3e} min_s={:.3e} min_z={:.3e} retried={}",
                                    label,
                                    iter,
                                    to_f64(step.alpha_aff),
                                    to_f64(step.mu_aff),
                                    to_f64(min_entry(&ws.iterate.s)),
                                    to_f64(min_entry(&ws.iterate.z)),
                                    step.retried
                                );
                            }

                            if !ws.iterate.is_finite() || !res.mu.is_finite() {
                                EngineState::Terminated(SolveStatus::NumericalError)
                            } else if early_stop(&ws.iterate) || criteria.is_converged(res) {
                                EngineState::Terminated(SolveStatus::Converged)
                            } else {
                                let x_norm = inf_norm(&ws.iterate.x);
                                match monitor.observe(res, step.alpha, x_norm) {
                                    Some(reason) => {
                                        if settings.verbose {
                                            log::info!("{}: stopping on {}", label, reason);
                                        }
                                        EngineState::Terminated(SolveStatus::Infeasible)
                                    }
                                    None => EngineState::Iterating,
                                }
                            }
                        }
                    }
                }
            }

            EngineState::Terminated(status) => {
                return LoopOutcome {
                    status,
                    iters: iter,
                };
            }
        };
    }
}

/// Solve a QP end to end.
///
/// Never panics on input that passed validation; every failure is reported
/// through the returned status.
pub fn solve_qp<T: SolverFloat>(
    prob: &Problem<T>,
    settings: &SolverSettings<T>,
    warm: Option<&WarmStart<T>>,
) -> SolveResult<T> {
    let start = Instant::now();
    let features = settings.features;
    let n = prob.num_vars();
    let p = prob.num_equalities();

    if features.dimension_check {
        let checked = settings
            .validate()
            .and_then(|_| prob.validate(&features))
            .and_then(|_| warm.map_or(Ok(()), |w| prob.validate_warm_start(w)));
        if let Err(e) = checked {
            return setup_failure(n, 0, p, e, &start);
        }
    }

    let blocks = build_blocks(prob, &features);
    let model = QpModel::new(prob, &blocks);
    let m = model.m();

    if settings.verbose {
        log::info!(
            "qpsolver: n={} inequality rows={} equality rows={} blocks={}",
            n,
            m,
            p,
            blocks.len()
        );
    }

    if n == 0 {
        return finish(
            early_result(0, m, p, SolveStatus::Converged, None, 0),
            &start,
            settings,
        );
    }

    if features.lower_bound && features.upper_bound {
        if let Some(i) = prob.crossed_bound() {
            if settings.verbose {
                log::info!("lower bound exceeds upper bound for variable {}", i);
            }
            return finish(
                early_result(n, m, p, SolveStatus::Infeasible, None, 0),
                &start,
                settings,
            );
        }
    }

    let mut ws = match Workspace::new(n, m, p, settings) {
        Ok(ws) => ws,
        Err(e) => {
            return setup_failure(n, m, p, ProblemError::InvalidSettings(e.to_string()), &start)
        }
    };

    if m == 0 {
        return solve_equality_constrained(&model, &mut ws, settings, &start);
    }

    let diag = DiagnosticsConfig::from_env();
    let mut info = SolveInfo::default();

    // ======================================================================
    // Start point: warm x or the origin, repaired by phase-1 if needed
    // ======================================================================
    let mut x0 = warm
        .and_then(|w| w.x.clone())
        .filter(|x| x.len() == n)
        .unwrap_or_else(|| vec![T::zero(); n]);

    let margin = model.inequality_margin(&x0, &mut ws.tmp_m);
    if !(margin > T::zero()) {
        if !features.infeasible_start {
            let err = ProblemError::InfeasibleWarmStart {
                margin: to_f64(margin),
            };
            return setup_failure(n, m, p, err, &start);
        }

        let p1 = phase1::find_interior_point(prob, &blocks, settings, &diag, &mut x0);
        info.phase1_iters = p1.iters;
        info.reg_retries += p1.reg_retries;
        if p1.status != SolveStatus::Converged {
            let mut result = early_result(n, m, p, p1.status, None, 0);
            result.x.copy_from_slice(&x0);
            result.obj_val = model.objective(&x0);
            result.info = info;
            return finish(result, &start, settings);
        }
        model.inequality_margin(&x0, &mut ws.tmp_m);
    }

    init_iterate(&mut ws, &x0, warm);

    // ======================================================================
    // Main predictor-corrector loop
    // ======================================================================
    let mut mu_history = Vec::with_capacity(settings.max_iter + 1);
    let outcome = run_loop(
        &model,
        &mut ws,
        settings,
        settings.max_iter,
        "ipm",
        &diag,
        &mut mu_history,
        |_| false,
    );

    info.iters = outcome.iters;
    info.reg_retries += ws.kkt.total_retries();
    info.mu_history = mu_history;

    let result = extract_solution(&model, &ws.iterate, &ws.residuals, outcome.status, info);
    finish(result, &start, settings)
}

/// s = g − G x0 (already in `ws.tmp_m`), z from the warm start when usable,
/// else ones, y from the warm start when usable, else zeros.
fn init_iterate<T: SolverFloat>(ws: &mut Workspace<T>, x0: &[T], warm: Option<&WarmStart<T>>) {
    let it = &mut ws.iterate;
    it.x.copy_from_slice(x0);
    it.s.copy_from_slice(&ws.tmp_m);

    let warm_z = warm
        .and_then(|w| w.z.as_ref())
        .filter(|z| z.len() == it.z.len() && z.iter().all(|&v| v.is_finite() && v > T::zero()));
    match warm_z {
        Some(z) => it.z.copy_from_slice(z),
        None => it.z.fill(T::one()),
    }

    let warm_y = warm
        .and_then(|w| w.y.as_ref())
        .filter(|y| y.len() == it.y.len() && y.iter().all(|v| v.is_finite()));
    match warm_y {
        Some(y) => it.y.copy_from_slice(y),
        None => it.y.fill(T::zero()),
    }
}

/// No inequality rows: one KKT solve gives the exact optimum.
fn solve_equality_constrained<T: SolverFloat>(
    model: &QpModel<T>,
    ws: &mut Workspace<T>,
    settings: &SolverSettings<T>,
    start: &Instant,
) -> SolveResult<T> {
    let n = model.n();
    let mut info = SolveInfo::default();

    model.assemble_kkt(&[], ws.kkt.matrix_mut(), &mut ws.tmp_nv);
    if let Err(e) = ws.kkt.factor() {
        log::warn!("equality-constrained solve failed: {}", e);
        let mut result = early_result(n, 0, model.p(), SolveStatus::NumericalError, None, 0);
        result.info.reg_retries = ws.kkt.total_retries();
        return finish(result, start, settings);
    }

    {
        // [−c; h], with h read off as −(E·0 − h)
        ws.tmp_nv.fill(T::zero());
        let rhs = ws.kkt.rhs_mut();
        for (ri, &ci) in rhs[..n].iter_mut().zip(model.c().iter()) {
            *ri = -ci;
        }
        model.equality_residual(&ws.tmp_nv, &mut rhs[n..]);
        for ri in rhs[n..].iter_mut() {
            *ri = -*ri;
        }
    }
    let sol = ws.kkt.solve();
    ws.iterate.x.copy_from_slice(&sol[..n]);
    ws.iterate.y.copy_from_slice(&sol[n..]);

    compute_residuals(model, &ws.iterate, &mut ws.residuals);
    let criteria = TerminationCriteria::new(model, settings);
    let status = if !ws.iterate.is_finite() {
        SolveStatus::NumericalError
    } else if criteria.is_converged(&ws.residuals) {
        SolveStatus::Converged
    } else {
        SolveStatus::Infeasible
    };

    info.reg_retries = ws.kkt.total_retries();
    info.mu_history.push(T::zero());
    let result = extract_solution(model, &ws.iterate, &ws.residuals, status, info);
    finish(result, start, settings)
}

fn setup_failure<T: SolverFloat>(
    n: usize,
    m: usize,
    p: usize,
    err: ProblemError,
    start: &Instant,
) -> SolveResult<T> {
    log::warn!("setup error: {}", err);
    let mut result = early_result(n, m, p, SolveStatus::SetupError, Some(err), 0);
    result.info.solve_time_ms = start.elapsed().as_millis() as u64;
    result
}

fn finish<T: SolverFloat>(
    mut result: SolveResult<T>,
    start: &Instant,
    settings: &SolverSettings<T>,
) -> SolveResult<T> {
    result.info.solve_time_ms = start.elapsed().as_millis() as u64;
    if settings.verbose {
        log::info!(
            "status: {} | iters: {} (+{} phase-1) | obj: {:.6e} | pres: {:.2e} | dres: {:.2e} | {} ms",
            result.status,
            result.info.iters,
            result.info.phase1_iters,
            to_f64(result.obj_val),
            to_f64(result.info.primal_res),
            to_f64(result.info.dual_res),
            result.info.solve_time_ms
        );
    }
    result
}
