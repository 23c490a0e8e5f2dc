//! Reduced KKT solve under a fixed set of tight constraints.
//!
//! With the rows `G` tight the QP becomes equality constrained:
//!
//! ```text
//! [P + δI   G^T] [x]   [-q]
//! [G       -δI ] [ν] = [ h]
//! ```
//!
//! δ = 0 is tried first. If LU reports a singular matrix (or the solve
//! blows up) the system is retried with δ = `reg`, which makes it
//! quasi-definite.

use nalgebra::{DMatrix, DVector};

/// Solution of the reduced system.
#[derive(Debug, Clone)]
pub struct KktSolution {
    /// Primal point
    pub x: DVector<f64>,

    /// Multipliers of the tight rows
    pub nu: DVector<f64>,

    /// Whether regularization was needed
    pub regularized: bool,
}

/// Solve the reduced KKT system for `min ½ x'Px + q'x  s.t.  G x = h`.
///
/// Returns `None` if neither the exact nor the regularized system yields a
/// finite solution.
pub fn solve_reduced(
    p: &DMatrix<f64>,
    q: &DVector<f64>,
    g: &DMatrix<f64>,
    h: &DVector<f64>,
    reg: f64,
) -> Option<KktSolution> {
    let n = p.nrows();
    let r = g.nrows();
    assert_eq!(g.ncols(), n);
    assert_eq!(h.len(), r);

    let mut rhs = DVector::zeros(n + r);
    rhs.rows_mut(0, n).copy_from(&(-q));
    rhs.rows_mut(n, r).copy_from(h);

    let attempt = |delta: f64| -> Option<DVector<f64>> {
        let k = assemble(p, g, delta);
        let sol = k.lu().solve(&rhs)?;
        if sol.iter().all(|v| v.is_finite()) {
            Some(sol)
        } else {
            None
        }
    };

    let (sol, regularized) = match attempt(0.0) {
        Some(sol) => (sol, false),
        None if reg > 0.0 => (attempt(reg)?, true),
        None => return None,
    };

    Some(KktSolution {
        x: sol.rows(0, n).into_owned(),
        nu: sol.rows(n, r).into_owned(),
        regularized,
    })
}

fn assemble(p: &DMatrix<f64>, g: &DMatrix<f64>, delta: f64) -> DMatrix<f64> {
    let n = p.nrows();
    let r = g.nrows();
    let mut k = DMatrix::zeros(n + r, n + r);
    k.view_mut((0, 0), (n, n)).copy_from(p);
    k.view_mut((n, 0), (r, n)).copy_from(g);
    k.view_mut((0, n), (n, r)).copy_from(&g.transpose());
    for i in 0..n {
        k[(i, i)] += delta;
    }
    for i in n..n + r {
        k[(i, i)] -= delta;
    }
    k
}
