//! Result extraction.

use super::iterate::{Iterate, Residuals};
use super::model::QpModel;
use crate::linalg::SolverFloat;
use crate::problem::{ProblemError, SolveInfo, SolveResult, SolveStatus};

/// Build the result for a finished engine run.
///
/// `info` arrives with the counters filled in; residual norms and μ are taken
/// from `res`. The returned x is the best-effort point for every status.
pub fn extract_solution<T: SolverFloat>(
    model: &QpModel<T>,
    it: &Iterate<T>,
    res: &Residuals<T>,
    status: SolveStatus,
    mut info: SolveInfo<T>,
) -> SolveResult<T> {
    let x = it.x[..model.n()].to_vec();
    let obj_val = model.objective(&x);

    info.primal_res = res.primal_res;
    info.dual_res = res.dual_res;
    info.mu = res.mu;

    SolveResult {
        status,
        x,
        z: it.z.clone(),
        y: it.y.clone(),
        obj_val,
        info,
    }
}

/// Result for a solve that stopped before iterating: x is zeros of length n.
pub fn early_result<T: SolverFloat>(
    n: usize,
    m: usize,
    p: usize,
    status: SolveStatus,
    setup_error: Option<ProblemError>,
    solve_time_ms: u64,
) -> SolveResult<T> {
    SolveResult {
        status,
        x: vec![T::zero(); n],
        z: vec![T::zero(); m],
        y: vec![T::zero(); p],
        obj_val: T::zero(),
        info: SolveInfo {
            solve_time_ms,
            setup_error,
            ..SolveInfo::default()
        },
    }
}
