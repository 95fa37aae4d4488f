//! End-to-end integration tests for the QP solver.
//!
//! These tests validate that the full pipeline (validation, phase-1, the
//! predictor-corrector loop and extraction) works on various problem types.

use approx::assert_abs_diff_eq;
use nalgebra::{DMatrix, DVector};
use qpsolver_core::{
    quadprog, solve, solve_with_warm_start, FeatureSet, Problem, ProblemError, SolveStatus,
    SolverSettings, WarmStart,
};

/// Deterministic uniform generator in [0, 1).
struct Lcg(u64);

impl Lcg {
    fn next_f64(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

fn scalar_problem(q: f64, c: f64) -> Problem<f64> {
    Problem::new(DMatrix::from_element(1, 1, q), DVector::from_element(1, c))
}

#[test]
fn test_scenario_a_centered_box() {
    // min x²  s.t. −1 ≤ x ≤ 1
    let prob = scalar_problem(2.0, 0.0)
        .with_lower_bounds(DVector::from_element(1, -1.0))
        .with_upper_bounds(DVector::from_element(1, 1.0));

    let result = solve(&prob, &SolverSettings::default());

    println!("status={} x={:?} iters={}", result.status, result.x, result.info.iters);
    assert_eq!(result.status, SolveStatus::Converged);
    assert_abs_diff_eq!(result.x[0], 0.0, epsilon = 1e-6);
    assert_eq!(result.info.phase1_iters, 0);
}

#[test]
fn test_scenario_b_active_upper_bound() {
    // min (x − 2)²  s.t. x ≤ 1
    let prob = scalar_problem(2.0, -4.0).with_upper_bounds(DVector::from_element(1, 1.0));

    let result = solve(&prob, &SolverSettings::default());

    assert_eq!(result.status, SolveStatus::Converged);
    assert_abs_diff_eq!(result.x[0], 1.0, epsilon = 1e-6);
    // Multiplier of the active bound: 2(x − 2) + z = 0
    assert_abs_diff_eq!(result.z[0], 2.0, epsilon = 1e-5);
    assert_abs_diff_eq!(result.obj_val, -3.0, epsilon = 1e-6);
}

#[test]
fn test_scenario_c_infeasible_affine_row() {
    // x1 + x2 ≤ −5 with 0 ≤ x ≤ 10
    let prob = Problem::new(DMatrix::identity(2, 2), DVector::zeros(2))
        .with_lower_bounds(DVector::from_vec(vec![0.0, 0.0]))
        .with_upper_bounds(DVector::from_vec(vec![10.0, 10.0]))
        .with_inequalities(
            DMatrix::from_row_slice(1, 2, &[1.0, 1.0]),
            DVector::from_vec(vec![-5.0]),
        );

    let result = solve(&prob, &SolverSettings::default());

    println!("status={} phase1 iters={}", result.status, result.info.phase1_iters);
    assert_eq!(result.status, SolveStatus::Infeasible);
}

#[test]
fn test_crossed_bounds_infeasible() {
    let prob = Problem::new(DMatrix::identity(2, 2), DVector::zeros(2))
        .with_lower_bounds(DVector::from_vec(vec![0.0, 2.0]))
        .with_upper_bounds(DVector::from_vec(vec![1.0, 1.0]));

    let result = solve(&prob, &SolverSettings::default());
    assert_eq!(result.status, SolveStatus::Infeasible);
    assert_eq!(result.info.iters, 0);
}

#[test]
fn test_zero_variables() {
    let prob = Problem::<f64>::new(DMatrix::zeros(0, 0), DVector::zeros(0));
    let result = solve(&prob, &SolverSettings::default());

    assert_eq!(result.status, SolveStatus::Converged);
    assert!(result.x.is_empty());
    assert_eq!(result.info.iters, 0);
}

#[test]
fn test_zero_constraints() {
    // min x1² + 2 x2² − 2 x1 − 4 x2  →  x = [1, 1]
    let prob = Problem::new(
        DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 4.0]),
        DVector::from_vec(vec![-2.0, -4.0]),
    );
    let result = solve(&prob, &SolverSettings::default());

    assert_eq!(result.status, SolveStatus::Converged);
    assert_eq!(result.info.iters, 0);
    assert_abs_diff_eq!(result.x[0], 1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(result.x[1], 1.0, epsilon = 1e-9);
    assert!(result.z.is_empty());
}

/// Projected gradient on the box, the reference for box-only solves.
fn projected_gradient(q: &DMatrix<f64>, c: &DVector<f64>, l: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
    let step = 1.0 / q.norm();
    let mut x = DVector::zeros(c.len());
    for _ in 0..20_000 {
        let grad = q * &x + c;
        x -= grad * step;
        for i in 0..x.len() {
            x[i] = x[i].max(l[i]).min(u[i]);
        }
    }
    x
}

#[test]
fn test_box_only_matches_projected_gradient() {
    let q = DMatrix::from_row_slice(3, 3, &[4.0, 1.0, 0.0, 1.0, 3.0, 0.5, 0.0, 0.5, 2.0]);
    let c = DVector::from_vec(vec![-8.0, 3.0, 1.0]);
    let l = DVector::from_vec(vec![-1.0, -1.0, -1.0]);
    let u = DVector::from_vec(vec![1.0, 1.0, 1.0]);

    let prob = Problem::new(q.clone(), c.clone())
        .with_lower_bounds(l.clone())
        .with_upper_bounds(u.clone());
    let settings = SolverSettings::with_features(FeatureSet::BOX_ONLY);
    let result = solve(&prob, &settings);

    let reference = projected_gradient(&q, &c, &l, &u);
    println!("ipm={:?} reference={:?}", result.x, reference.as_slice());

    assert_eq!(result.status, SolveStatus::Converged);
    for i in 0..3 {
        assert_abs_diff_eq!(result.x[i], reference[i], epsilon = 1e-5);
    }
}

/// Random well-posed 2-variable QP over the rows used by the legacy unit test.
fn random_2x2_problem(rng: &mut Lcg, max_val: f64, with_equality: bool) -> Problem<f64> {
    let m = DMatrix::from_fn(2, 2, |_, _| rng.next_f64());
    let p = (&m * m.transpose() + DMatrix::identity(2, 2) * 0.5) * max_val;
    let q = DVector::from_fn(2, |_, _| rng.next_f64() * max_val);

    let prob = Problem::new(p, q).with_inequalities(
        DMatrix::from_row_slice(3, 2, &[1.0, 1.0, -1.0, 2.0, 2.0, 1.0]),
        DVector::from_vec(vec![2.0, 2.0, 3.0]),
    );
    if with_equality {
        prob.with_equalities(
            DMatrix::from_row_slice(1, 2, &[1.0, 1.0]),
            DVector::from_vec(vec![0.0]),
        )
    } else {
        prob
    }
}

#[test]
fn test_random_2x2_kkt_certificate() {
    let mut rng = Lcg(0x5eed_1234);
    let settings = SolverSettings::default();

    for &max_val in &[100.0, 500.0, 1000.0] {
        for trial in 0..6 {
            let with_equality = trial % 2 == 1;
            let prob = random_2x2_problem(&mut rng, max_val, with_equality);
            let result = solve(&prob, &settings);
            assert_eq!(result.status, SolveStatus::Converged, "max_val={} trial={}", max_val, trial);

            let ineq = prob.inequalities.as_ref().unwrap();
            let x = DVector::from_column_slice(&result.x);
            let z = DVector::from_column_slice(&result.z);
            let scale = 1.0 + max_val;

            // Stationarity: P x + q + Aᵀ z + Eᵀ y = 0
            let mut grad = &prob.Q * &x + &prob.c + ineq.matrix.transpose() * &z;
            if let Some(eq) = &prob.equalities {
                grad += eq.matrix.transpose() * DVector::from_column_slice(&result.y);
                assert_abs_diff_eq!(result.x[0] + result.x[1], 0.0, epsilon = 1e-6);
            }
            assert!(grad.amax() < 1e-5 * scale, "stationarity {}", grad.amax());

            // Primal feasibility, dual sign and complementarity
            let slack = &ineq.rhs - &ineq.matrix * &x;
            for i in 0..3 {
                assert!(slack[i] > -1e-6);
                assert!(z[i] >= 0.0);
                assert!((slack[i] * z[i]).abs() < 1e-5 * scale);
            }
        }
    }
}

#[test]
fn test_converged_solution_is_feasible() {
    let mut rng = Lcg(42);
    let settings = SolverSettings::default();

    for _ in 0..10 {
        let n = 4;
        let m = DMatrix::from_fn(n, n, |_, _| rng.next_f64() - 0.5);
        let q = &m * m.transpose() + DMatrix::identity(n, n) * 0.1;
        let c = DVector::from_fn(n, |_, _| 4.0 * (rng.next_f64() - 0.5));
        let a = DMatrix::from_fn(2, n, |_, _| rng.next_f64() - 0.5);
        let b = DVector::from_fn(2, |_, _| 0.5 + rng.next_f64());
        let lower = DVector::from_element(n, -1.0);
        let upper = DVector::from_element(n, 1.0);

        let prob = Problem::new(q, c)
            .with_lower_bounds(lower.clone())
            .with_upper_bounds(upper.clone())
            .with_inequalities(a.clone(), b.clone());
        let result = solve(&prob, &settings);
        assert_eq!(result.status, SolveStatus::Converged);

        let x = DVector::from_column_slice(&result.x);
        let tol = 1e-6;
        for i in 0..n {
            assert!(x[i] >= lower[i] - tol && x[i] <= upper[i] + tol);
        }
        let ax = &a * &x;
        for i in 0..2 {
            assert!(ax[i] <= b[i] + tol);
        }
    }
}

#[test]
fn test_mu_decreases_near_convergence() {
    let prob = Problem::new(
        DMatrix::from_row_slice(2, 2, &[2.0, 0.5, 0.5, 1.0]),
        DVector::from_vec(vec![-1.0, -1.0]),
    )
    .with_lower_bounds(DVector::from_vec(vec![-2.0, -2.0]))
    .with_upper_bounds(DVector::from_vec(vec![2.0, 2.0]))
    .with_inequalities(
        DMatrix::from_row_slice(1, 2, &[1.0, 1.0]),
        DVector::from_vec(vec![0.5]),
    );
    let result = solve(&prob, &SolverSettings::default());
    assert_eq!(result.status, SolveStatus::Converged);

    let history = &result.info.mu_history;
    println!("mu history: {:?}", history);
    assert_eq!(history.len(), result.info.iters + 1);
    assert!(history.len() >= 4);
    for pair in history[history.len() - 4..].windows(2) {
        assert!(pair[1] <= pair[0]);
    }
    assert!(history[history.len() - 1] < history[0]);
}

#[test]
fn test_phase1_from_infeasible_origin() {
    // min ‖x‖²  s.t. 1 ≤ x ≤ 3: the origin violates every lower bound
    let prob = Problem::new(DMatrix::identity(2, 2) * 2.0, DVector::zeros(2))
        .with_lower_bounds(DVector::from_vec(vec![1.0, 1.0]))
        .with_upper_bounds(DVector::from_vec(vec![3.0, 3.0]));

    let result = solve(&prob, &SolverSettings::default());

    assert_eq!(result.status, SolveStatus::Converged);
    assert!(result.info.phase1_iters > 0);
    assert_abs_diff_eq!(result.x[0], 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(result.x[1], 1.0, epsilon = 1e-6);
}

#[test]
fn test_phase1_disabled_rejects_infeasible_warm_start() {
    let prob = scalar_problem(2.0, 0.0)
        .with_lower_bounds(DVector::from_element(1, 1.0))
        .with_upper_bounds(DVector::from_element(1, 3.0));
    let features = FeatureSet {
        infeasible_start: false,
        ..FeatureSet::ALL
    };
    let settings = SolverSettings::with_features(features);
    let warm = WarmStart {
        x: Some(vec![5.0]),
        ..WarmStart::default()
    };

    let result = solve_with_warm_start(&prob, &settings, &warm);

    assert_eq!(result.status, SolveStatus::SetupError);
    assert!(matches!(
        result.info.setup_error,
        Some(ProblemError::InfeasibleWarmStart { .. })
    ));
    assert_eq!(result.x, vec![0.0]);

    // An interior warm start needs no phase-1
    let warm = WarmStart {
        x: Some(vec![2.0]),
        ..WarmStart::default()
    };
    let result = solve_with_warm_start(&prob, &settings, &warm);
    assert_eq!(result.status, SolveStatus::Converged);
    assert_abs_diff_eq!(result.x[0], 1.0, epsilon = 1e-6);
}

#[test]
fn test_interior_warm_start_skips_phase1() {
    let prob = Problem::new(DMatrix::identity(2, 2), DVector::from_vec(vec![-3.0, 0.5]))
        .with_lower_bounds(DVector::from_vec(vec![0.0, 0.0]))
        .with_upper_bounds(DVector::from_vec(vec![1.0, 1.0]));
    let settings = SolverSettings::default();

    let cold = solve(&prob, &settings);
    assert!(cold.info.phase1_iters > 0);

    let warm = WarmStart {
        x: Some(vec![0.5, 0.5]),
        ..WarmStart::default()
    };
    let result = solve_with_warm_start(&prob, &settings, &warm);
    assert_eq!(result.status, SolveStatus::Converged);
    assert_eq!(result.info.phase1_iters, 0);
    assert_abs_diff_eq!(result.x[0], 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(result.x[1], 0.0, epsilon = 1e-6);
}

#[test]
fn test_disabled_family_data_is_setup_error() {
    let prob = scalar_problem(2.0, 0.0).with_inequalities(
        DMatrix::from_element(1, 1, 1.0),
        DVector::from_element(1, 1.0),
    );
    let result = solve(&prob, &SolverSettings::with_features(FeatureSet::BOX_ONLY));

    assert_eq!(result.status, SolveStatus::SetupError);
    assert!(matches!(
        result.info.setup_error,
        Some(ProblemError::FeatureDisabled(_))
    ));
}

#[test]
fn test_dimension_mismatch_is_setup_error() {
    let prob = scalar_problem(2.0, 0.0).with_upper_bounds(DVector::from_vec(vec![1.0, 1.0]));
    let result = solve(&prob, &SolverSettings::default());
    assert_eq!(result.status, SolveStatus::SetupError);
    assert_eq!(result.x.len(), 1);
}

#[test]
fn test_indefinite_q_is_numerical_error() {
    let prob = Problem::new(-DMatrix::<f64>::identity(2, 2), DVector::zeros(2));
    let result = solve(&prob, &SolverSettings::default());

    assert_eq!(result.status, SolveStatus::NumericalError);
    assert_eq!(result.info.reg_retries, 1);
}

#[test]
fn test_equality_and_bounds() {
    // min (1/2)‖x‖²  s.t. x1 − x2 = 1, 0 ≤ x ≤ 2  →  x = [1, 0]
    let prob = Problem::new(DMatrix::identity(2, 2), DVector::zeros(2))
        .with_lower_bounds(DVector::from_vec(vec![0.0, 0.0]))
        .with_upper_bounds(DVector::from_vec(vec![2.0, 2.0]))
        .with_equalities(
            DMatrix::from_row_slice(1, 2, &[1.0, -1.0]),
            DVector::from_vec(vec![1.0]),
        );
    let result = solve(&prob, &SolverSettings::default());

    assert_eq!(result.status, SolveStatus::Converged);
    assert_abs_diff_eq!(result.x[0], 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(result.x[1], 0.0, epsilon = 1e-6);
    assert_eq!(result.y.len(), 1);
}

#[test]
fn test_single_precision_scenario_a() {
    let prob = Problem::new(DMatrix::from_element(1, 1, 2.0f32), DVector::from_element(1, 0.0f32))
        .with_lower_bounds(DVector::from_element(1, -1.0f32))
        .with_upper_bounds(DVector::from_element(1, 1.0f32));

    let result = solve(&prob, &SolverSettings::<f32>::default());

    assert_eq!(result.status, SolveStatus::Converged);
    assert!(result.x[0].abs() < 1e-3);
}

#[test]
fn test_quadprog_entry_point() {
    let result = quadprog(
        DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 2.0]),
        DVector::from_vec(vec![-2.0, -5.0]),
        Some((
            DMatrix::from_row_slice(1, 2, &[1.0, 1.0]),
            DVector::from_vec(vec![1.0]),
        )),
        None,
        Some(DVector::from_vec(vec![0.0, 0.0])),
        None,
        &SolverSettings::default(),
    );

    // Projection of (1, 2.5) onto {x ≥ 0, x1 + x2 ≤ 1}: (0, 1)
    assert_eq!(result.status, SolveStatus::Converged);
    assert_abs_diff_eq!(result.x[0], 0.0, epsilon = 1e-6);
    assert_abs_diff_eq!(result.x[1], 1.0, epsilon = 1e-6);
}

#[test]
fn test_concurrent_solves_share_problem() {
    let prob = Problem::new(
        DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 2.0]),
        DVector::from_vec(vec![-2.0, -5.0]),
    )
    .with_lower_bounds(DVector::from_vec(vec![0.0, 0.0]))
    .with_upper_bounds(DVector::from_vec(vec![1.0, 1.0]));
    let settings = SolverSettings::default();
    let reference = solve(&prob, &settings);

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| solve(&prob, &settings)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for result in results {
        assert_eq!(result.status, SolveStatus::Converged);
        assert_eq!(result.x, reference.x);
        assert_eq!(result.info.iters, reference.info.iters);
    }
}

#[test]
fn test_conflicting_equality_with_interior_origin() {
    // −1 ≤ x ≤ 1 and x = 5: the origin is interior, so phase-1 never runs
    let prob = scalar_problem(1.0, 0.0)
        .with_lower_bounds(DVector::from_element(1, -1.0))
        .with_upper_bounds(DVector::from_element(1, 1.0))
        .with_equalities(DMatrix::from_element(1, 1, 1.0), DVector::from_element(1, 5.0));
    let settings = SolverSettings::default();

    let result = solve(&prob, &settings);

    println!(
        "status={} iters={} pres={:e}",
        result.status, result.info.iters, result.info.primal_res
    );
    assert_eq!(result.status, SolveStatus::Infeasible);
    assert_eq!(result.info.phase1_iters, 0);
    assert!(result.info.iters < settings.max_iter);
}

#[test]
fn test_conflicting_equality_found_by_phase1() {
    // 0 ≤ x ≤ 1 and x = 5: the origin sits on the lower bound
    let prob = scalar_problem(1.0, 0.0)
        .with_lower_bounds(DVector::from_element(1, 0.0))
        .with_upper_bounds(DVector::from_element(1, 1.0))
        .with_equalities(DMatrix::from_element(1, 1, 1.0), DVector::from_element(1, 5.0));

    let result = solve(&prob, &SolverSettings::default());

    assert_eq!(result.status, SolveStatus::Infeasible);
    assert!(result.info.phase1_iters > 0);
    assert_eq!(result.info.iters, 0);
}

#[test]
fn test_equality_conflicting_with_affine_rows() {
    // x ≥ −2, x1 + x2 ≤ 1 and x1 − x2 = 6 would need x2 ≤ −2.5
    let prob = Problem::<f64>::new(DMatrix::identity(2, 2), DVector::zeros(2))
        .with_lower_bounds(DVector::from_vec(vec![-2.0, -2.0]))
        .with_inequalities(
            DMatrix::from_row_slice(1, 2, &[1.0, 1.0]),
            DVector::from_vec(vec![1.0]),
        )
        .with_equalities(
            DMatrix::from_row_slice(1, 2, &[1.0, -1.0]),
            DVector::from_vec(vec![6.0]),
        );
    let settings = SolverSettings::default();

    let result = solve(&prob, &settings);

    assert_eq!(result.status, SolveStatus::Infeasible);
    assert!(result.info.iters < settings.max_iter);
}

fn unbounded_affine_problem() -> Problem<f64> {
    // min −x1 − x2  s.t. x1 − x2 ≤ 1: x = (t, t) drives the objective to −∞
    Problem::new(DMatrix::zeros(2, 2), DVector::from_vec(vec![-1.0, -1.0])).with_inequalities(
        DMatrix::from_row_slice(1, 2, &[1.0, -1.0]),
        DVector::from_vec(vec![1.0]),
    )
}

#[test]
fn test_unbounded_objective_reported_early() {
    let settings = SolverSettings::default();
    let result = solve(&unbounded_affine_problem(), &settings);

    println!("status={} x={:?} iters={}", result.status, result.x, result.info.iters);
    assert_eq!(result.status, SolveStatus::Infeasible);
    assert!(result.info.iters < settings.max_iter / 2);
}

#[test]
fn test_iterate_limit_from_settings() {
    let mut settings = SolverSettings::default();
    settings.divergence.x_limit = 1e3;
    settings.divergence.dual_stall_iters = usize::MAX;

    let result = solve(&unbounded_affine_problem(), &settings);

    assert_eq!(result.status, SolveStatus::Infeasible);
    assert!(result.x.iter().any(|v| v.abs() > 1e3));
}

#[test]
fn test_indefinite_q_with_bounds_is_numerical_error() {
    // −5‖x‖² on the box: the reduced KKT block is negative definite at the origin
    let q = -DMatrix::<f64>::identity(2, 2) * 10.0;
    let prob = Problem::new(q, DVector::from_vec(vec![1.0, 1.0]))
        .with_lower_bounds(DVector::from_vec(vec![-1.0, -1.0]))
        .with_upper_bounds(DVector::from_vec(vec![1.0, 1.0]));

    let result = solve(&prob, &SolverSettings::default());

    assert_eq!(result.status, SolveStatus::NumericalError);
    assert_eq!(result.info.phase1_iters, 0);
    assert_eq!(result.info.reg_retries, 1);
    assert_eq!(result.z.len(), 4);
}
