//! Mehrotra predictor-corrector step.
//!
//! The predictor-corrector algorithm has two phases per iteration:
//! 1. **Affine step**: solve the Newton system with σ = 0 (pure Newton step)
//! 2. **Combined step**: solve again with the Mehrotra second-order term and
//!    centering σμ, reusing the same factorization
//!
//! The Newton system is reduced to the primal/equality variables:
//!
//! ```text
//! [ H + GᵀWG   Eᵀ ] [Δx]   [ −r_d − Gᵀ S⁻¹ (r_c + Z r_p) ]
//! [ E          0  ] [Δy] = [ −r_e                        ]
//!
//! Δs = −r_p − G Δx
//! Δz = S⁻¹ (r_c − Z Δs)
//! ```

use super::iterate::{Iterate, Residuals};
use super::model::QpModel;
use super::workspace::{Direction, Workspace};
use crate::linalg::kkt::KktSolver;
use crate::linalg::ldl::LdlError;
use crate::linalg::{cast, SolverFloat};
use crate::problem::SolverSettings;

/// Predictor-corrector step result.
#[derive(Debug, Clone, Copy)]
pub struct StepResult<T: SolverFloat> {
    /// Step size taken
    pub alpha: T,

    /// Affine step size
    pub alpha_aff: T,

    /// Centering parameter used
    pub sigma: T,

    /// Complementarity at the affine trial point
    pub mu_aff: T,

    /// Whether the factorization needed the perturbation retry
    pub retried: bool,
}

/// Take one predictor-corrector step from `ws.iterate`.
///
/// `ws.residuals` must describe the current iterate. On success the iterate
/// is advanced in place; residuals are left for the caller to refresh.
pub fn predictor_corrector_step<T: SolverFloat>(
    model: &QpModel<T>,
    ws: &mut Workspace<T>,
    settings: &SolverSettings<T>,
) -> Result<StepResult<T>, LdlError> {
    let Workspace {
        iterate,
        residuals,
        aff,
        comb,
        w,
        r_c,
        tmp_m,
        tmp_nv,
        kkt,
    } = ws;

    // ======================================================================
    // Step 1: Scaling and factorization
    // ======================================================================
    for ((wi, &si), &zi) in w.iter_mut().zip(iterate.s.iter()).zip(iterate.z.iter()) {
        *wi = zi / si;
    }
    model.assemble_kkt(w, kkt.matrix_mut(), tmp_nv);
    kkt.factor()?;
    let retried = kkt.retried();

    // ======================================================================
    // Step 2: Affine (predictor) direction
    // ======================================================================
    for ((rc, &si), &zi) in r_c.iter_mut().zip(iterate.s.iter()).zip(iterate.z.iter()) {
        *rc = -si * zi;
    }
    solve_direction(model, iterate, residuals, r_c, kkt, tmp_m, aff);

    let alpha_aff = model
        .max_step(&iterate.s, &aff.ds)
        .min(model.max_step(&iterate.z, &aff.dz))
        .min(T::one());

    let mu = residuals.mu;
    let mu_aff = trial_mu(iterate, aff, alpha_aff);
    let sigma = centering(mu, mu_aff);

    // ======================================================================
    // Step 3: Combined (corrector) direction
    // ======================================================================
    let sigma_mu = sigma * mu;
    for (i, rc) in r_c.iter_mut().enumerate() {
        *rc = -iterate.s[i] * iterate.z[i] - aff.ds[i] * aff.dz[i] + sigma_mu;
    }
    solve_direction(model, iterate, residuals, r_c, kkt, tmp_m, comb);

    // ======================================================================
    // Step 4: Fraction-to-boundary step and update
    // ======================================================================
    let alpha_max = model
        .max_step(&iterate.s, &comb.ds)
        .min(model.max_step(&iterate.z, &comb.dz));
    let alpha = (settings.step_damping * alpha_max).min(T::one());

    apply_step(iterate, comb, alpha);
    debug_assert!(
        !iterate.is_finite() || (model.is_interior(&iterate.s) && model.is_interior(&iterate.z)),
        "step left the interior"
    );

    Ok(StepResult {
        alpha,
        alpha_aff,
        sigma,
        mu_aff,
        retried,
    })
}

/// Solve the reduced Newton system for complementarity target `r_c` with the
/// factorization currently held by `kkt`.
pub fn solve_direction<T: SolverFloat>(
    model: &QpModel<T>,
    it: &Iterate<T>,
    res: &Residuals<T>,
    r_c: &[T],
    kkt: &mut KktSolver<T>,
    tmp_m: &mut [T],
    dir: &mut Direction<T>,
) {
    let nv = model.nv();

    // tmp = −S⁻¹ (r_c + Z r_p)
    for i in 0..tmp_m.len() {
        tmp_m[i] = -(r_c[i] + it.z[i] * res.r_p[i]) / it.s[i];
    }

    {
        let rhs = kkt.rhs_mut();
        for (ri, &rd) in rhs[..nv].iter_mut().zip(res.r_d.iter()) {
            *ri = -rd;
        }
        model.add_mul_gt(tmp_m, &mut rhs[..nv]);
        for (ri, &re) in rhs[nv..].iter_mut().zip(res.r_e.iter()) {
            *ri = -re;
        }
    }

    let sol = kkt.solve();
    dir.dx.copy_from_slice(&sol[..nv]);
    dir.dy.copy_from_slice(&sol[nv..]);

    // Δs = −r_p − G Δx
    model.mul_g(&dir.dx, &mut dir.ds);
    for (dsi, &rp) in dir.ds.iter_mut().zip(res.r_p.iter()) {
        *dsi = -rp - *dsi;
    }

    // Δz = S⁻¹ (r_c − Z Δs)
    for i in 0..dir.dz.len() {
        dir.dz[i] = (r_c[i] - it.z[i] * dir.ds[i]) / it.s[i];
    }
}

/// Mehrotra centering σ = clamp((μ_aff / μ)³, 0, 1).
pub fn centering<T: SolverFloat>(mu: T, mu_aff: T) -> T {
    if !(mu > T::zero()) {
        return T::zero();
    }
    let ratio = mu_aff / mu;
    (ratio * ratio * ratio).max(T::zero()).min(T::one())
}

/// (s + α ds)ᵀ(z + α dz) / m
fn trial_mu<T: SolverFloat>(it: &Iterate<T>, dir: &Direction<T>, alpha: T) -> T {
    let m = it.s.len();
    if m == 0 {
        return T::zero();
    }
    let mut acc = T::zero();
    for i in 0..m {
        acc += (it.s[i] + alpha * dir.ds[i]) * (it.z[i] + alpha * dir.dz[i]);
    }
    acc / cast::<T>(m as f64)
}

fn apply_step<T: SolverFloat>(it: &mut Iterate<T>, dir: &Direction<T>, alpha: T) {
    axpy(alpha, &dir.dx, &mut it.x);
    axpy(alpha, &dir.ds, &mut it.s);
    axpy(alpha, &dir.dz, &mut it.z);
    axpy(alpha, &dir.dy, &mut it.y);
}

#[inline]
fn axpy<T: SolverFloat>(alpha: T, d: &[T], v: &mut [T]) {
    for (vi, &di) in v.iter_mut().zip(d.iter()) {
        *vi += alpha * di;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::build_blocks;
    use crate::ipm::iterate::compute_residuals;
    use crate::problem::{FeatureSet, Problem};
    use nalgebra::{DMatrix, DVector};

    #[test]
    fn test_centering_clamped() {
        assert_eq!(centering(1.0, 0.5), 0.125);
        assert_eq!(centering(1.0, 2.0), 1.0);
        assert_eq!(centering(1.0, -0.5), 0.0);
        assert_eq!(centering(0.0, 0.5), 0.0);
    }

    #[test]
    fn test_direction_satisfies_linearization() {
        let prob = Problem::<f64>::new(
            DMatrix::from_row_slice(2, 2, &[2.0, 0.5, 0.5, 1.0]),
            DVector::from_vec(vec![1.0, -1.0]),
        )
        .with_lower_bounds(DVector::from_vec(vec![-1.0, -1.0]))
        .with_inequalities(
            DMatrix::from_row_slice(1, 2, &[1.0, 1.0]),
            DVector::from_vec(vec![1.0]),
        )
        .with_equalities(
            DMatrix::from_row_slice(1, 2, &[1.0, -1.0]),
            DVector::from_vec(vec![0.25]),
        );
        let settings = SolverSettings::default();
        let blocks = build_blocks(&prob, &FeatureSet::ALL);
        let model = QpModel::new(&prob, &blocks);
        let mut ws = Workspace::new(2, 3, 1, &settings).unwrap();

        ws.iterate.x.copy_from_slice(&[0.2, -0.1]);
        ws.iterate.s.copy_from_slice(&[0.7, 1.3, 0.4]);
        ws.iterate.z.copy_from_slice(&[1.0, 0.5, 2.0]);
        ws.iterate.y[0] = 0.3;
        compute_residuals(&model, &ws.iterate, &mut ws.residuals);

        let Workspace {
            iterate,
            residuals,
            aff,
            w,
            r_c,
            tmp_m,
            tmp_nv,
            kkt,
            ..
        } = &mut ws;
        for i in 0..3 {
            w[i] = iterate.z[i] / iterate.s[i];
            r_c[i] = -iterate.s[i] * iterate.z[i];
        }
        model.assemble_kkt(w, kkt.matrix_mut(), tmp_nv);
        kkt.factor().unwrap();
        solve_direction(&model, iterate, residuals, r_c, kkt, tmp_m, aff);

        // Linearized complementarity: Z Δs + S Δz = r_c
        for i in 0..3 {
            let lhs = iterate.z[i] * aff.ds[i] + iterate.s[i] * aff.dz[i];
            assert!((lhs - r_c[i]).abs() < 1e-9);
        }

        // Linearized dual feasibility: Q Δx + Gᵀ Δz + Eᵀ Δy = −r_d
        let mut lin = vec![0.0; 2];
        model.mul_hessian(&aff.dx, &mut lin);
        model.add_mul_gt(&aff.dz, &mut lin);
        model.add_mul_et(&aff.dy, &mut lin);
        for i in 0..2 {
            assert!((lin[i] + residuals.r_d[i]).abs() < 1e-9);
        }

        // Linearized equality: E Δx = −r_e
        let e_dx = aff.dx[0] - aff.dx[1];
        assert!((e_dx + residuals.r_e[0]).abs() < 1e-9);
    }

    #[test]
    fn test_step_keeps_interior() {
        let prob =
            Problem::<f64>::new(DMatrix::identity(2, 2), DVector::from_vec(vec![-3.0, 1.0]))
                .with_lower_bounds(DVector::from_vec(vec![0.0, 0.0]))
                .with_upper_bounds(DVector::from_vec(vec![1.0, 1.0]));
        let settings = SolverSettings::default();
        let blocks = build_blocks(&prob, &FeatureSet::ALL);
        let model = QpModel::new(&prob, &blocks);
        let mut ws = Workspace::new(2, 4, 0, &settings).unwrap();

        ws.iterate.x.copy_from_slice(&[0.5, 0.5]);
        ws.iterate.s.copy_from_slice(&[0.5, 0.5, 0.5, 0.5]);
        ws.iterate.z.fill(1.0);
        compute_residuals(&model, &ws.iterate, &mut ws.residuals);
        let mu0 = ws.residuals.mu;

        let step = predictor_corrector_step(&model, &mut ws, &settings).unwrap();
        assert!(step.alpha > 0.0 && step.alpha <= 1.0);
        assert!((0.0..=1.0).contains(&step.sigma));
        assert!(!step.retried);
        assert!(ws.iterate.s.iter().all(|&v| v > 0.0));
        assert!(ws.iterate.z.iter().all(|&v| v > 0.0));

        compute_residuals(&model, &ws.iterate, &mut ws.residuals);
        assert!(ws.residuals.mu < mu0);
    }
}
