//! Receding-horizon example for the QP solver.
//!
//! Tracks a reference with a double integrator over a short horizon:
//!   minimize    Σ (p_k − r)² + λ Σ u_k²
//!   subject to  −1 ≤ u_k ≤ 1
//!
//! Positions are affine in the inputs, so the whole problem is a box QP in u.
//! Each step re-solves with the previous plan as warm start.

use nalgebra::{DMatrix, DVector};
use qpsolver_core::{solve_with_warm_start, FeatureSet, Problem, SolverSettings, WarmStart};

const HORIZON: usize = 8;
const DT: f64 = 0.1;
const LAMBDA: f64 = 1e-2;

/// p = p0 + v0·t + M u with M lower-triangular.
fn prediction_matrix() -> DMatrix<f64> {
    DMatrix::from_fn(HORIZON, HORIZON, |k, j| {
        if j <= k {
            let steps = (k - j) as f64 + 1.0;
            DT * DT * steps
        } else {
            0.0
        }
    })
}

fn main() {
    println!("QP Solver - Receding Horizon Example");
    println!("====================================");

    let m = prediction_matrix();
    let q = (m.transpose() * &m + DMatrix::identity(HORIZON, HORIZON) * LAMBDA) * 2.0;
    let settings = SolverSettings {
        verbose: false,
        ..SolverSettings::with_features(FeatureSet::BOX_ONLY)
    };

    let reference = 1.0;
    let (mut pos, mut vel) = (0.0f64, 0.0f64);
    let mut warm = WarmStart::default();

    for step in 0..20 {
        // Free response of the plant over the horizon
        let free = DVector::from_fn(HORIZON, |k, _| pos + vel * DT * (k as f64 + 1.0) - reference);
        let c = m.transpose() * &free * 2.0;

        let prob = Problem::new(q.clone(), c)
            .with_lower_bounds(DVector::from_element(HORIZON, -1.0))
            .with_upper_bounds(DVector::from_element(HORIZON, 1.0));
        let result = solve_with_warm_start(&prob, &settings, &warm);

        let u = result.x[0];
        vel += u * DT;
        pos += vel * DT;
        println!(
            "step {:>2}: status={} iters={:>2} phase1={:>2} u={:+.3} pos={:.4}",
            step, result.status, result.info.iters, result.info.phase1_iters, u, pos
        );

        // Shift the plan and pull it slightly inside the box
        let mut next: Vec<f64> = result.x[1..].to_vec();
        next.push(*result.x.last().unwrap_or(&0.0));
        for v in next.iter_mut() {
            *v = v.clamp(-0.99, 0.99);
        }
        warm.x = Some(next);
    }
}
