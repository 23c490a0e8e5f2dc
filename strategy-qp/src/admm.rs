//! Operator splitting solver for the exact solve.
//!
//! All constraints are written as `l <= C x <= u` with `C = [A; E]`. Each
//! iteration solves the reduced system
//!
//! ```text
//! (P + σI + C^T diag(ρ) C) x̃ = σ x - q + C^T (ρ z - y)
//! ```
//!
//! then projects `z` onto the box and updates the duals `y`. The system
//! matrix does not depend on θ, so one Cholesky factorization serves every
//! populated instance until ρ is adapted.

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};

use crate::error::{QpError, QpResult};
use crate::problem::QpSettings;
use crate::sparse::inf_norm;

/// Step size multiplier on equality rows.
const EQ_RHO_SCALE: f64 = 1e3;

const RHO_MIN: f64 = 1e-6;
const RHO_MAX: f64 = 1e6;

/// Minimum change in ρ that triggers a refactorization.
const RHO_UPDATE_FACTOR: f64 = 5.0;

/// Cached data for repeated ADMM solves over one problem structure.
#[derive(Debug, Clone)]
pub struct AdmmSystem {
    /// Dense P (full symmetric)
    p: DMatrix<f64>,

    /// Stacked constraint matrix [A; E]
    c: DMatrix<f64>,

    /// Per-row multiplier on ρ
    rho_scale: DVector<f64>,

    /// ρ the cached factor was built for
    rho: f64,

    sigma: f64,

    factor: Cholesky<f64, Dyn>,
}

/// ADMM iterates at termination.
#[derive(Debug, Clone)]
pub struct AdmmSolution {
    /// Primal solution
    pub x: DVector<f64>,

    /// Constraint values, projected onto `[l, u]`
    pub z: DVector<f64>,

    /// Constraint duals (positive on rows at their upper bound)
    pub y: DVector<f64>,

    /// Iterations used
    pub iters: usize,

    /// Final primal residual
    pub prim_res: f64,

    /// Final dual residual
    pub dual_res: f64,
}

impl AdmmSystem {
    /// Factor the system for `p` (dense, symmetric) and `c = [A; E]` where
    /// the last `n_eq` rows are equalities.
    pub fn new(
        p: DMatrix<f64>,
        c: DMatrix<f64>,
        n_eq: usize,
        settings: &QpSettings,
    ) -> QpResult<Self> {
        let m = c.nrows();
        let n_ineq = m - n_eq;
        let rho_scale = DVector::from_fn(m, |i, _| if i < n_ineq { 1.0 } else { EQ_RHO_SCALE });
        let factor = factor(&p, &c, &rho_scale, settings.rho, settings.sigma)?;

        Ok(Self {
            p,
            c,
            rho_scale,
            rho: settings.rho,
            sigma: settings.sigma,
            factor,
        })
    }

    /// Number of variables.
    pub fn n(&self) -> usize {
        self.p.nrows()
    }

    /// Number of constraint rows.
    pub fn m(&self) -> usize {
        self.c.nrows()
    }

    /// Dense P.
    pub fn p(&self) -> &DMatrix<f64> {
        &self.p
    }

    /// Solve `min ½ x'Px + q'x  s.t.  l <= Cx <= u`.
    pub fn solve(
        &self,
        q: &DVector<f64>,
        l: &DVector<f64>,
        u: &DVector<f64>,
        settings: &QpSettings,
    ) -> QpResult<AdmmSolution> {
        let n = self.n();
        let m = self.m();
        if q.len() != n || l.len() != m || u.len() != m {
            return Err(QpError::InvalidProblem(format!(
                "ADMM data has lengths q={}, l={}, u={}, expected n={}, m={}",
                q.len(),
                l.len(),
                u.len(),
                n,
                m
            )));
        }

        let alpha = settings.alpha;
        let sigma = self.sigma;
        let q_norm = inf_norm(q);

        let mut x = DVector::zeros(n);
        let mut z = DVector::zeros(m);
        let mut y = DVector::zeros(m);

        let mut rho = self.rho;
        let mut rho_vec = &self.rho_scale * rho;
        // Replaced only when ρ moves
        let mut local_factor: Option<Cholesky<f64, Dyn>> = None;

        let mut prim_res = f64::INFINITY;
        let mut dual_res = f64::INFINITY;

        for iter in 1..=settings.max_iter {
            let factor = local_factor.as_ref().unwrap_or(&self.factor);

            // x̃ from the reduced system
            let w = rho_vec.component_mul(&z) - &y;
            let rhs = &x * sigma - q + self.c.tr_mul(&w);
            let x_tilde = factor.solve(&rhs);
            let z_tilde = &self.c * &x_tilde;

            let x_next = &x_tilde * alpha + &x * (1.0 - alpha);
            let z_relax = &z_tilde * alpha + &z * (1.0 - alpha);

            let mut z_next = z_relax.clone();
            for i in 0..m {
                let v = z_relax[i] + y[i] / rho_vec[i];
                z_next[i] = v.max(l[i]).min(u[i]);
            }
            y += (z_relax - &z_next).component_mul(&rho_vec);
            x = x_next;
            z = z_next;

            // Residuals
            let cx = &self.c * &x;
            let px = &self.p * &x;
            let cty = self.c.tr_mul(&y);
            prim_res = inf_norm(&(&cx - &z));
            dual_res = inf_norm(&(&px + q + &cty));

            let prim_scale = inf_norm(&cx).max(inf_norm(&z));
            let dual_scale = inf_norm(&px).max(inf_norm(&cty)).max(q_norm);
            let eps_prim = settings.eps_abs + settings.eps_rel * prim_scale;
            let eps_dual = settings.eps_abs + settings.eps_rel * dual_scale;

            if prim_res <= eps_prim && dual_res <= eps_dual {
                if settings.verbose {
                    log::debug!(
                        "ADMM converged in {} iterations (rho = {:.2e}, prim {:.2e}, dual {:.2e})",
                        iter,
                        rho,
                        prim_res,
                        dual_res
                    );
                }
                return Ok(AdmmSolution {
                    x,
                    z,
                    y,
                    iters: iter,
                    prim_res,
                    dual_res,
                });
            }

            if settings.adaptive_rho_interval > 0 && iter % settings.adaptive_rho_interval == 0 {
                let prim_rel = prim_res / prim_scale.max(1e-10);
                let dual_rel = dual_res / dual_scale.max(1e-10);
                if dual_rel > 0.0 {
                    let new_rho = (rho * (prim_rel / dual_rel).sqrt()).clamp(RHO_MIN, RHO_MAX);
                    if new_rho > rho * RHO_UPDATE_FACTOR || new_rho < rho / RHO_UPDATE_FACTOR {
                        rho = new_rho;
                        rho_vec = &self.rho_scale * rho;
                        local_factor =
                            Some(factor_system(&self.p, &self.c, &rho_vec, sigma)?);
                    }
                }
            }
        }

        Err(QpError::NotConverged {
            iters: settings.max_iter,
            prim_res,
            dual_res,
        })
    }
}

fn factor(
    p: &DMatrix<f64>,
    c: &DMatrix<f64>,
    rho_scale: &DVector<f64>,
    rho: f64,
    sigma: f64,
) -> QpResult<Cholesky<f64, Dyn>> {
    factor_system(p, c, &(rho_scale * rho), sigma)
}

/// Cholesky of `P + σI + C^T diag(ρ) C`.
fn factor_system(
    p: &DMatrix<f64>,
    c: &DMatrix<f64>,
    rho_vec: &DVector<f64>,
    sigma: f64,
) -> QpResult<Cholesky<f64, Dyn>> {
    let n = p.nrows();
    let mut scaled = c.clone();
    for (i, mut row) in scaled.row_iter_mut().enumerate() {
        row *= rho_vec[i];
    }
    let mut k = p + c.tr_mul(&scaled);
    for i in 0..n {
        k[(i, i)] += sigma;
    }

    Cholesky::new(k).ok_or_else(|| {
        QpError::Factorization("ADMM system is not positive definite (is P PSD?)".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> QpSettings {
        QpSettings::default()
    }

    #[test]
    fn test_unconstrained() {
        // min x1^2 + x2^2 - 2 x1 - 4 x2  ->  x = (1, 2)
        let p = DMatrix::from_diagonal_element(2, 2, 2.0);
        let c = DMatrix::zeros(0, 2);
        let sys = AdmmSystem::new(p, c, 0, &settings()).unwrap();
        let q = DVector::from_vec(vec![-2.0, -4.0]);
        let empty = DVector::zeros(0);
        let sol = sys.solve(&q, &empty, &empty, &settings()).unwrap();
        assert!((sol.x[0] - 1.0).abs() < 1e-5);
        assert!((sol.x[1] - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_box_constraint_dual() {
        // min 1/2 |x|^2 - (2, 0.5)'x  s.t. x <= 1  ->  x = (1, 0.5), y = (1, 0)
        let p = DMatrix::identity(2, 2);
        let c = DMatrix::identity(2, 2);
        let sys = AdmmSystem::new(p, c, 0, &settings()).unwrap();
        let q = DVector::from_vec(vec![-2.0, -0.5]);
        let l = DVector::from_element(2, f64::NEG_INFINITY);
        let u = DVector::from_element(2, 1.0);
        let sol = sys.solve(&q, &l, &u, &settings()).unwrap();

        assert!((sol.x[0] - 1.0).abs() < 1e-5);
        assert!((sol.x[1] - 0.5).abs() < 1e-5);
        assert!((sol.y[0] - 1.0).abs() < 1e-4);
        assert!(sol.y[1].abs() < 1e-8);
    }

    #[test]
    fn test_equality_row() {
        // min |x|^2  s.t. x1 + x2 = 1  ->  x = (0.5, 0.5)
        let p = DMatrix::from_diagonal_element(2, 2, 2.0);
        let c = DMatrix::from_row_slice(1, 2, &[1.0, 1.0]);
        let sys = AdmmSystem::new(p, c, 1, &settings()).unwrap();
        let q = DVector::zeros(2);
        let b = DVector::from_element(1, 1.0);
        let sol = sys.solve(&q, &b, &b, &settings()).unwrap();
        assert!((sol.x[0] - 0.5).abs() < 1e-5);
        assert!((sol.x[1] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_iteration_limit() {
        let p = DMatrix::identity(2, 2);
        let c = DMatrix::identity(2, 2);
        let s = settings().with_max_iter(1);
        let sys = AdmmSystem::new(p, c, 0, &s).unwrap();
        let q = DVector::from_vec(vec![-2.0, -0.5]);
        let l = DVector::from_element(2, f64::NEG_INFINITY);
        let u = DVector::from_element(2, 1.0);
        assert!(matches!(
            sys.solve(&q, &l, &u, &s),
            Err(QpError::NotConverged { iters: 1, .. })
        ));
    }

    #[test]
    fn test_indefinite_p_rejected() {
        let p = DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, -1.0]));
        let c = DMatrix::zeros(0, 2);
        assert!(matches!(
            AdmmSystem::new(p, c, 0, &settings()),
            Err(QpError::Factorization(_))
        ));
    }
}
