//! Dense vector and matrix primitives.
//!
//! These are written against plain slices and column-major `DMatrix` storage
//! so they never allocate; the IPM hot loop calls them with buffers owned by
//! the solve workspace.

use super::{infinity, SolverFloat};
use nalgebra::DMatrix;

/// Inner product aᵀb.
#[inline]
pub fn dot<T: SolverFloat>(a: &[T], b: &[T]) -> T {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .fold(T::zero(), |acc, (&ai, &bi)| acc + ai * bi)
}

/// Infinity norm ‖v‖∞ (zero for an empty slice).
#[inline]
pub fn inf_norm<T: SolverFloat>(v: &[T]) -> T {
    v.iter().fold(T::zero(), |acc, &x| acc.max(x.abs()))
}

/// Smallest entry (+∞ for an empty slice).
#[inline]
pub fn min_entry<T: SolverFloat>(v: &[T]) -> T {
    v.iter().fold(infinity(), |acc: T, &x| acc.min(x))
}

/// Returns true when every entry is finite.
#[inline]
pub fn all_finite<T: SolverFloat>(v: &[T]) -> bool {
    v.iter().all(|x| x.is_finite())
}

/// y = alpha * M x + beta * y
pub fn gemv<T: SolverFloat>(alpha: T, m: &DMatrix<T>, x: &[T], beta: T, y: &mut [T]) {
    assert_eq!(m.ncols(), x.len());
    assert_eq!(m.nrows(), y.len());

    scale_in_place(beta, y);
    if alpha == T::zero() {
        return;
    }
    for (j, &xj) in x.iter().enumerate() {
        let axj = alpha * xj;
        if axj == T::zero() {
            continue;
        }
        for (yi, &mij) in y.iter_mut().zip(m.column(j).iter()) {
            *yi += mij * axj;
        }
    }
}

/// y = alpha * Mᵀ x + beta * y
pub fn gemv_t<T: SolverFloat>(alpha: T, m: &DMatrix<T>, x: &[T], beta: T, y: &mut [T]) {
    assert_eq!(m.nrows(), x.len());
    assert_eq!(m.ncols(), y.len());

    scale_in_place(beta, y);
    if alpha == T::zero() {
        return;
    }
    for (j, yj) in y.iter_mut().enumerate() {
        let col = m.column(j);
        let mut acc = T::zero();
        for (&mij, &xi) in col.iter().zip(x.iter()) {
            acc += mij * xi;
        }
        *yj += alpha * acc;
    }
}

/// K[0..n, 0..n] += Mᵀ diag(w) M, where M is r×n.
///
/// `k` may be larger than n×n; only the leading block is touched. Both
/// triangles are written so `k` stays symmetric.
pub fn add_weighted_gram<T: SolverFloat>(m: &DMatrix<T>, w: &[T], k: &mut DMatrix<T>) {
    let n = m.ncols();
    assert_eq!(m.nrows(), w.len());
    assert!(k.nrows() >= n && k.ncols() >= n);

    for j in 0..n {
        let col_j = m.column(j);
        for i in j..n {
            let col_i = m.column(i);
            let mut acc = T::zero();
            for ((&wr, &mri), &mrj) in w.iter().zip(col_i.iter()).zip(col_j.iter()) {
                acc += wr * mri * mrj;
            }
            k[(i, j)] += acc;
            if i != j {
                k[(j, i)] += acc;
            }
        }
    }
}

/// Quadratic form xᵀ M x.
pub fn quad_form<T: SolverFloat>(m: &DMatrix<T>, x: &[T]) -> T {
    assert_eq!(m.nrows(), x.len());
    assert_eq!(m.ncols(), x.len());

    let mut acc = T::zero();
    for (j, &xj) in x.iter().enumerate() {
        let mut col_acc = T::zero();
        for (&mij, &xi) in m.column(j).iter().zip(x.iter()) {
            col_acc += mij * xi;
        }
        acc += col_acc * xj;
    }
    acc
}

/// Check symmetry up to a tolerance relative to the largest entry.
pub fn is_symmetric<T: SolverFloat>(m: &DMatrix<T>, rel_tol: T) -> bool {
    if m.nrows() != m.ncols() {
        return false;
    }
    let scale = m.iter().fold(T::one(), |acc, &v| acc.max(v.abs()));
    let tol = rel_tol * scale;
    let n = m.nrows();
    for j in 0..n {
        for i in (j + 1)..n {
            if (m[(i, j)] - m[(j, i)]).abs() > tol {
                return false;
            }
        }
    }
    true
}

#[inline]
fn scale_in_place<T: SolverFloat>(beta: T, y: &mut [T]) {
    if beta == T::zero() {
        y.fill(T::zero());
    } else if beta != T::one() {
        for yi in y.iter_mut() {
            *yi *= beta;
        }
    }
}
