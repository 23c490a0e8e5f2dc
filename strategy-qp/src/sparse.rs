//! Sparse matrix helpers.
//!
//! Problem data lives in CSC (Compressed Sparse Column) format. The solver
//! itself works on small dense systems, so most of this module is about
//! building CSC matrices and moving them into nalgebra.

use nalgebra::{DMatrix, DVector};
use sprs::{CsMat, TriMat};

/// Sparse matrix in CSC format (general, not necessarily symmetric).
pub type SparseCsc = CsMat<f64>;

/// Sparse symmetric matrix in CSC format (upper triangle only).
pub type SparseSymmetricCsc = CsMat<f64>;

/// Build a sparse CSC matrix from triplets (row, col, value).
///
/// Duplicate entries are summed.
pub fn from_triplets<I>(nrows: usize, ncols: usize, triplets: I) -> SparseCsc
where
    I: IntoIterator<Item = (usize, usize, f64)>,
{
    let mut tri = TriMat::new((nrows, ncols));
    for (i, j, v) in triplets {
        tri.add_triplet(i, j, v);
    }
    tri.to_csc()
}

/// Build a symmetric sparse CSC matrix from upper triangle triplets.
///
/// Entries below the diagonal are mirrored into the upper triangle.
pub fn from_triplets_symmetric<I>(n: usize, triplets: I) -> SparseSymmetricCsc
where
    I: IntoIterator<Item = (usize, usize, f64)>,
{
    let mut tri = TriMat::new((n, n));
    for (i, j, v) in triplets {
        if j >= i {
            tri.add_triplet(i, j, v);
        } else {
            tri.add_triplet(j, i, v);
        }
    }
    tri.to_csc()
}

/// All-zero matrix of the given shape.
pub fn zeros(nrows: usize, ncols: usize) -> SparseCsc {
    from_triplets(nrows, ncols, std::iter::empty())
}

/// Create an identity matrix in CSC format.
pub fn identity(n: usize) -> SparseCsc {
    from_triplets(n, n, (0..n).map(|i| (i, i, 1.0)))
}

/// Sparse matrix-vector product: y = alpha * A * x + beta * y
pub fn spmv(a: &SparseCsc, x: &[f64], y: &mut [f64], alpha: f64, beta: f64) {
    assert_eq!(a.cols(), x.len());
    assert_eq!(a.rows(), y.len());

    if beta == 0.0 {
        y.fill(0.0);
    } else if beta != 1.0 {
        for yi in y.iter_mut() {
            *yi *= beta;
        }
    }

    if alpha != 0.0 {
        for (val, (row, col)) in a.iter() {
            y[row] += alpha * (*val) * x[col];
        }
    }
}

/// Affine map `base + M θ`.
pub fn affine(base: &[f64], m: &SparseCsc, theta: &[f64]) -> Vec<f64> {
    let mut out = base.to_vec();
    spmv(m, theta, &mut out, 1.0, 1.0);
    out
}

/// Dense copy of a general sparse matrix.
pub fn to_dense(a: &SparseCsc) -> DMatrix<f64> {
    let mut out = DMatrix::zeros(a.rows(), a.cols());
    for (val, (row, col)) in a.iter() {
        out[(row, col)] += *val;
    }
    out
}

/// Dense copy of a symmetric matrix stored as its upper triangle.
pub fn sym_to_dense(p: &SparseSymmetricCsc) -> DMatrix<f64> {
    let mut out = DMatrix::zeros(p.rows(), p.cols());
    for (val, (row, col)) in p.iter() {
        out[(row, col)] += *val;
        if row != col {
            out[(col, row)] += *val;
        }
    }
    out
}

/// Stack dense row blocks `[top; bottom]`.
pub fn vstack_dense(top: &DMatrix<f64>, bottom: &DMatrix<f64>) -> DMatrix<f64> {
    assert_eq!(top.ncols(), bottom.ncols());
    let n = top.ncols();
    let mut out = DMatrix::zeros(top.nrows() + bottom.nrows(), n);
    out.view_mut((0, 0), (top.nrows(), n)).copy_from(top);
    out.view_mut((top.nrows(), 0), (bottom.nrows(), n))
        .copy_from(bottom);
    out
}

/// Infinity norm of a vector (0 for empty).
pub fn inf_norm(v: &DVector<f64>) -> f64 {
    v.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()))
}
