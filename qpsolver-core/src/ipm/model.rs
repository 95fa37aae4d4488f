//! Operator view of the QP seen by the iteration engine.
//!
//! The engine works on
//!
//! ```text
//! minimize    (1/2) vᵀ H v + cᵀ v
//! subject to  G v + s = g,  s ≥ 0
//!             E v = h
//! ```
//!
//! For the main solve v = x and H = Q. For phase-1 the model carries one
//! extra elastic column t (v = [x; t]) that relaxes every inequality row,
//! G_aug = [G, −1], and H = ρ I.

use crate::constraints::{block_offsets, ConstraintBlock};
use crate::linalg::dense::{dot, gemv, gemv_t, inf_norm, min_entry, quad_form};
use crate::linalg::SolverFloat;
use crate::problem::{AffineSystem, Problem};
use nalgebra::DMatrix;
use std::ops::Range;

/// Hessian of the model objective.
#[derive(Debug, Clone, Copy)]
pub enum Hessian<'a, T: SolverFloat> {
    /// Problem Q (n × n)
    Dense(&'a DMatrix<T>),
    /// ρ I over every model variable
    ScaledIdentity(T),
}

/// QP operators over the enabled constraint blocks.
pub struct QpModel<'a, T: SolverFloat> {
    /// Problem variables
    n: usize,
    /// Whether column n is the phase-1 elastic variable
    elastic: bool,
    hessian: Hessian<'a, T>,
    /// Linear cost over the model variables
    c: Vec<T>,
    blocks: &'a [Box<dyn ConstraintBlock<T>>],
    /// Row offsets of each block, total rows last
    offsets: Vec<usize>,
    /// Stacked right-hand side g
    g: Vec<T>,
    equalities: Option<&'a AffineSystem<T>>,
}

impl<'a, T: SolverFloat> QpModel<'a, T> {
    /// Model of the problem itself.
    pub fn new(prob: &'a Problem<T>, blocks: &'a [Box<dyn ConstraintBlock<T>>]) -> Self {
        Self::build(
            prob,
            blocks,
            false,
            Hessian::Dense(&prob.Q),
            prob.c.iter().copied().collect(),
        )
    }

    /// Phase-1 model: minimize t + (ρ/2)(‖x − x₀‖² + t²) subject to
    /// G x − t·1 ≤ g and E x = h.
    pub fn phase1(
        prob: &'a Problem<T>,
        blocks: &'a [Box<dyn ConstraintBlock<T>>],
        x0: &[T],
        rho: T,
    ) -> Self {
        let mut c: Vec<T> = x0.iter().map(|&xi| -rho * xi).collect();
        c.push(T::one());
        Self::build(prob, blocks, true, Hessian::ScaledIdentity(rho), c)
    }

    fn build(
        prob: &'a Problem<T>,
        blocks: &'a [Box<dyn ConstraintBlock<T>>],
        elastic: bool,
        hessian: Hessian<'a, T>,
        c: Vec<T>,
    ) -> Self {
        let offsets = block_offsets(blocks);
        let mut g = Vec::with_capacity(offsets.last().copied().unwrap_or(0));
        for block in blocks {
            g.extend_from_slice(block.rhs());
        }

        Self {
            n: prob.num_vars(),
            elastic,
            hessian,
            c,
            blocks,
            offsets,
            g,
            equalities: prob.equalities.as_ref(),
        }
    }

    /// Problem variables n.
    #[inline]
    pub fn n(&self) -> usize {
        self.n
    }

    /// Model variables (n, plus one for the elastic column).
    #[inline]
    pub fn nv(&self) -> usize {
        self.n + usize::from(self.elastic)
    }

    /// Stacked inequality rows m.
    #[inline]
    pub fn m(&self) -> usize {
        self.g.len()
    }

    /// Equality rows p.
    #[inline]
    pub fn p(&self) -> usize {
        self.equalities.map_or(0, |e| e.rows())
    }

    /// Whether the model carries the elastic column.
    #[inline]
    pub fn is_elastic(&self) -> bool {
        self.elastic
    }

    /// Stacked right-hand side g.
    #[inline]
    pub fn g(&self) -> &[T] {
        &self.g
    }

    /// Linear cost.
    #[inline]
    pub fn c(&self) -> &[T] {
        &self.c
    }

    /// max(‖g‖∞, ‖h‖∞)
    pub fn rhs_norm(&self) -> T {
        let h_norm = self
            .equalities
            .map_or(T::zero(), |e| e.rhs.iter().fold(T::zero(), |acc, &v| acc.max(v.abs())));
        inf_norm(&self.g).max(h_norm)
    }

    fn ranges(&self) -> impl Iterator<Item = (&dyn ConstraintBlock<T>, Range<usize>)> + '_ {
        self.blocks
            .iter()
            .zip(self.offsets.windows(2))
            .map(|(b, w)| (b.as_ref(), w[0]..w[1]))
    }

    /// out = G_model v
    pub fn mul_g(&self, v: &[T], out: &mut [T]) {
        for (block, range) in self.ranges() {
            block.mul(&v[..self.n], &mut out[range]);
        }
        if self.elastic {
            let t = v[self.n];
            for o in out.iter_mut() {
                *o -= t;
            }
        }
    }

    /// out += G_modelᵀ w
    pub fn add_mul_gt(&self, w: &[T], out: &mut [T]) {
        for (block, range) in self.ranges() {
            block.add_mul_transpose(&w[range], &mut out[..self.n]);
        }
        if self.elastic {
            let sum = w.iter().fold(T::zero(), |acc, &wi| acc + wi);
            out[self.n] -= sum;
        }
    }

    /// out = H v
    pub fn mul_hessian(&self, v: &[T], out: &mut [T]) {
        match self.hessian {
            Hessian::Dense(q) => gemv(T::one(), q, v, T::zero(), out),
            Hessian::ScaledIdentity(rho) => {
                for (o, &vi) in out.iter_mut().zip(v.iter()) {
                    *o = rho * vi;
                }
            }
        }
    }

    /// out = E v − h
    pub fn equality_residual(&self, v: &[T], out: &mut [T]) {
        if let Some(eq) = self.equalities {
            gemv(T::one(), &eq.matrix, &v[..self.n], T::zero(), out);
            for (o, &hi) in out.iter_mut().zip(eq.rhs.iter()) {
                *o -= hi;
            }
        }
    }

    /// out += Eᵀ y
    pub fn add_mul_et(&self, y: &[T], out: &mut [T]) {
        if let Some(eq) = self.equalities {
            gemv_t(T::one(), &eq.matrix, y, T::one(), &mut out[..self.n]);
        }
    }

    /// out = g − G x over the problem variables only; returns min(out).
    ///
    /// Positive means x is strictly interior to every inequality row.
    pub fn inequality_margin(&self, x: &[T], out: &mut [T]) -> T {
        for (block, range) in self.ranges() {
            block.mul(&x[..self.n], &mut out[range]);
        }
        for (o, &gi) in out.iter_mut().zip(self.g.iter()) {
            *o = gi - *o;
        }
        min_entry(out)
    }

    /// Largest α with v + α dv ≥ 0 over every block.
    pub fn max_step(&self, v: &[T], dv: &[T]) -> T {
        self.ranges()
            .map(|(block, range)| block.step_to_boundary(&v[range.clone()], &dv[range]))
            .fold(crate::linalg::infinity(), |acc: T, a| acc.min(a))
    }

    /// Whether v is strictly inside every block.
    pub fn is_interior(&self, v: &[T]) -> bool {
        self.ranges()
            .all(|(block, range)| block.is_interior(&v[range]))
    }

    /// Write K = [H + G_modelᵀ diag(w) G_model, Eᵀ; E, 0] into `k`.
    ///
    /// `tmp` must hold at least n entries.
    pub fn assemble_kkt(&self, w: &[T], k: &mut DMatrix<T>, tmp: &mut [T]) {
        let n = self.n;
        let nv = self.nv();
        k.fill(T::zero());

        match self.hessian {
            Hessian::Dense(q) => {
                for j in 0..n {
                    for i in 0..n {
                        k[(i, j)] = q[(i, j)];
                    }
                }
            }
            Hessian::ScaledIdentity(rho) => {
                for i in 0..nv {
                    k[(i, i)] = rho;
                }
            }
        }

        for (block, range) in self.ranges() {
            block.add_weighted_gram(&w[range], k);
        }

        if self.elastic {
            // Cross terms of [G, −1]ᵀ W [G, −1]
            let gtw = &mut tmp[..n];
            gtw.fill(T::zero());
            for (block, range) in self.ranges() {
                block.add_mul_transpose(&w[range], gtw);
            }
            for (i, &v) in gtw.iter().enumerate() {
                k[(i, n)] -= v;
                k[(n, i)] -= v;
            }
            k[(n, n)] += w.iter().fold(T::zero(), |acc, &wi| acc + wi);
        }

        if let Some(eq) = self.equalities {
            for r in 0..eq.rows() {
                for j in 0..n {
                    let v = eq.matrix[(r, j)];
                    k[(nv + r, j)] = v;
                    k[(j, nv + r)] = v;
                }
            }
        }
    }

    /// (1/2) vᵀ H v + cᵀ v
    pub fn objective(&self, v: &[T]) -> T {
        let half: T = crate::linalg::cast(0.5);
        let quad = match self.hessian {
            Hessian::Dense(q) => quad_form(q, v),
            Hessian::ScaledIdentity(rho) => rho * dot(v, v),
        };
        half * quad + dot(&self.c, v)
    }
}
