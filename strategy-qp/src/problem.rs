//! Parametric QP data and solver settings.

use crate::error::{QpError, QpResult};
use crate::sparse::{self, SparseCsc, SparseSymmetricCsc};

/// Quadratic program whose linear data depends affinely on a parameter θ.
///
/// ```text
/// minimize    (1/2) x^T P x + (q + Q θ)^T x
/// subject to  A x <= b + B θ
///             E x  = f + F θ
/// ```
///
/// # Dimensions
///
/// - `n`: number of variables
/// - `m`: number of inequality rows (the rows a strategy may mark tight)
/// - `p`: number of equality rows (always tight)
/// - `k`: number of parameters
#[derive(Debug, Clone)]
#[allow(non_snake_case)]
pub struct ParametricQp {
    /// Quadratic cost (n × n, PSD, upper triangle).
    pub P: SparseSymmetricCsc,

    /// Linear cost at θ = 0 (length n)
    pub q: Vec<f64>,

    /// Parameter map into the linear cost (n × k)
    pub Q: SparseCsc,

    /// Inequality matrix (m × n)
    pub A: SparseCsc,

    /// Inequality right-hand side at θ = 0 (length m)
    pub b: Vec<f64>,

    /// Parameter map into the inequality rhs (m × k)
    pub B: SparseCsc,

    /// Equality matrix (p × n)
    pub E: SparseCsc,

    /// Equality right-hand side at θ = 0 (length p)
    pub f: Vec<f64>,

    /// Parameter map into the equality rhs (p × k)
    pub F: SparseCsc,
}

impl ParametricQp {
    /// Number of variables.
    pub fn num_vars(&self) -> usize {
        self.q.len()
    }

    /// Number of inequality rows.
    pub fn num_inequalities(&self) -> usize {
        self.b.len()
    }

    /// Number of equality rows.
    pub fn num_equalities(&self) -> usize {
        self.f.len()
    }

    /// Number of parameters.
    pub fn num_parameters(&self) -> usize {
        self.Q.cols()
    }

    /// Problem without equality rows.
    #[allow(non_snake_case)]
    pub fn inequality_only(
        P: SparseSymmetricCsc,
        q: Vec<f64>,
        Q: SparseCsc,
        A: SparseCsc,
        b: Vec<f64>,
        B: SparseCsc,
    ) -> Self {
        let n = q.len();
        let k = Q.cols();
        Self {
            P,
            q,
            Q,
            A,
            b,
            B,
            E: sparse::zeros(0, n),
            f: Vec::new(),
            F: sparse::zeros(0, k),
        }
    }

    /// Validate dimensions.
    pub fn validate(&self) -> QpResult<()> {
        let n = self.num_vars();
        let m = self.num_inequalities();
        let p = self.num_equalities();
        let k = self.num_parameters();

        if n == 0 {
            return Err(QpError::InvalidProblem("problem has no variables".to_string()));
        }

        let shapes = [
            ("P", &self.P, n, n),
            ("Q", &self.Q, n, k),
            ("A", &self.A, m, n),
            ("B", &self.B, m, k),
            ("E", &self.E, p, n),
            ("F", &self.F, p, k),
        ];
        for (name, mat, rows, cols) in shapes {
            if mat.rows() != rows || mat.cols() != cols {
                return Err(QpError::InvalidProblem(format!(
                    "{} has shape {}×{}, expected {}×{}",
                    name,
                    mat.rows(),
                    mat.cols(),
                    rows,
                    cols
                )));
            }
        }

        let finite = |v: &[f64]| v.iter().all(|x| x.is_finite());
        if !finite(&self.q) || !finite(&self.b) || !finite(&self.f) {
            return Err(QpError::InvalidProblem("non-finite problem data".to_string()));
        }

        Ok(())
    }

    /// Evaluate the linear data at `theta`, returning `(q, b, f)`.
    pub fn evaluate(&self, theta: &[f64]) -> QpResult<(Vec<f64>, Vec<f64>, Vec<f64>)> {
        if theta.len() != self.num_parameters() {
            return Err(QpError::ParameterLength {
                got: theta.len(),
                expected: self.num_parameters(),
            });
        }
        Ok((
            sparse::affine(&self.q, &self.Q, theta),
            sparse::affine(&self.b, &self.B, theta),
            sparse::affine(&self.f, &self.F, theta),
        ))
    }
}

/// ADMM and KKT settings.
#[derive(Debug, Clone)]
pub struct QpSettings {
    /// Initial ADMM step size
    pub rho: f64,

    /// Proximal term on x
    pub sigma: f64,

    /// Over-relaxation in (0, 2)
    pub alpha: f64,

    /// Absolute tolerance on primal and dual residuals
    pub eps_abs: f64,

    /// Relative tolerance on primal and dual residuals
    pub eps_rel: f64,

    /// Maximum number of ADMM iterations
    pub max_iter: usize,

    /// Iterations between step size updates (0 = fixed rho)
    pub adaptive_rho_interval: usize,

    /// Minimum dual value for an inequality row to count as tight
    pub active_tol: f64,

    /// Polish the ADMM solution with a reduced KKT solve
    pub polish: bool,

    /// Diagonal regularization used when the reduced KKT system is singular
    pub kkt_reg: f64,

    /// Enable verbose logging
    pub verbose: bool,
}

impl Default for QpSettings {
    fn default() -> Self {
        Self {
            rho: 0.1,
            sigma: 1e-6,
            alpha: 1.6,
            eps_abs: 1e-7,
            eps_rel: 1e-7,
            max_iter: 20_000,
            adaptive_rho_interval: 25,
            active_tol: 1e-8,
            polish: true,
            kkt_reg: 1e-9,
            verbose: false,
        }
    }
}

impl QpSettings {
    /// Enable verbose logging.
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    /// Set the iteration limit.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> QpResult<()> {
        if !(self.rho > 0.0) || !(self.sigma > 0.0) {
            return Err(QpError::InvalidProblem(
                "rho and sigma must be positive".to_string(),
            ));
        }
        if !(self.alpha > 0.0 && self.alpha < 2.0) {
            return Err(QpError::InvalidProblem(format!(
                "alpha must lie in (0, 2), got {}",
                self.alpha
            )));
        }
        if self.eps_abs < 0.0 || self.eps_rel < 0.0 || self.kkt_reg < 0.0 || self.active_tol < 0.0 {
            return Err(QpError::InvalidProblem(
                "tolerances must be nonnegative".to_string(),
            ));
        }
        Ok(())
    }
}
