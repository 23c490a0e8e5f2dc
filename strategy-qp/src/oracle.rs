//! Parametric QP oracle.
//!
//! The exact solve runs ADMM on the populated instance and reads the
//! strategy off the inequality duals. A strategy solve fixes those rows tight
//! and solves the reduced KKT system, reporting cost and primal infeasibility
//! of the resulting point.

use std::fmt;
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use strategy_core::{CoreResult, ExactSolve, ProblemOracle, StrategySolve};

use crate::admm::{AdmmSolution, AdmmSystem};
use crate::error::{QpError, QpResult};
use crate::kkt::solve_reduced;
use crate::problem::{ParametricQp, QpSettings};
use crate::sparse::{self, inf_norm};

/// Sorted set of tight inequality rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ActiveSet(Vec<usize>);

impl ActiveSet {
    /// Build from any row list; rows are sorted and deduplicated.
    pub fn new(mut rows: Vec<usize>) -> Self {
        rows.sort_unstable();
        rows.dedup();
        Self(rows)
    }

    /// Tight rows in ascending order.
    pub fn rows(&self) -> &[usize] {
        &self.0
    }

    /// Number of tight rows.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if no row is tight.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ActiveSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, r) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", r)?;
        }
        write!(f, "}}")
    }
}

/// Data shared by every clone of an oracle.
#[derive(Debug)]
struct Shared {
    problem: ParametricQp,
    settings: QpSettings,
    a: DMatrix<f64>,
    e: DMatrix<f64>,
    admm: AdmmSystem,
}

/// Linear data of the populated instance.
#[derive(Debug, Clone)]
struct Instance {
    q: DVector<f64>,
    b: DVector<f64>,
    f: DVector<f64>,
    /// Scale for infeasibility: max(1, |[b; f]|_inf)
    rhs_scale: f64,
}

/// Result of a solve under a strategy, with the primal point when the
/// reduced system had a finite solution.
#[derive(Debug, Clone)]
pub struct StrategyPoint {
    /// Cost and infeasibility
    pub solve: StrategySolve,

    /// Primal point
    pub x: Option<Vec<f64>>,
}

/// Oracle over a [`ParametricQp`].
///
/// Cloning is cheap: the problem and the ADMM factorization are shared, only
/// the populated instance is per clone.
#[derive(Debug, Clone)]
pub struct QpOracle {
    shared: Arc<Shared>,
    instance: Option<Instance>,
}

impl QpOracle {
    /// Validate `problem`, densify it and factor the ADMM system.
    pub fn new(problem: ParametricQp, settings: QpSettings) -> QpResult<Self> {
        problem.validate()?;
        settings.validate()?;

        let p = sparse::sym_to_dense(&problem.P);
        let a = sparse::to_dense(&problem.A);
        let e = sparse::to_dense(&problem.E);
        let c = sparse::vstack_dense(&a, &e);
        let admm = AdmmSystem::new(p, c, e.nrows(), &settings)?;

        if settings.verbose {
            log::info!(
                "QP oracle: {} variables, {} inequalities, {} equalities, {} parameters",
                problem.num_vars(),
                problem.num_inequalities(),
                problem.num_equalities(),
                problem.num_parameters()
            );
        }

        Ok(Self {
            shared: Arc::new(Shared {
                problem,
                settings,
                a,
                e,
                admm,
            }),
            instance: None,
        })
    }

    /// Underlying problem.
    pub fn problem(&self) -> &ParametricQp {
        &self.shared.problem
    }

    /// Solver settings.
    pub fn settings(&self) -> &QpSettings {
        &self.shared.settings
    }

    fn instance(&self) -> QpResult<&Instance> {
        self.instance.as_ref().ok_or(QpError::NotPopulated)
    }

    /// Objective value at `x` for the populated instance.
    pub fn cost(&self, x: &[f64]) -> QpResult<f64> {
        let inst = self.instance()?;
        let x = DVector::from_column_slice(x);
        Ok(self.cost_at(inst, &x))
    }

    /// Scaled max constraint violation at `x` for the populated instance.
    pub fn infeasibility(&self, x: &[f64]) -> QpResult<f64> {
        let inst = self.instance()?;
        let x = DVector::from_column_slice(x);
        Ok(self.infeasibility_at(inst, &x))
    }

    fn cost_at(&self, inst: &Instance, x: &DVector<f64>) -> f64 {
        let px = self.shared.admm.p() * x;
        0.5 * x.dot(&px) + inst.q.dot(x)
    }

    fn infeasibility_at(&self, inst: &Instance, x: &DVector<f64>) -> f64 {
        let ineq = (&self.shared.a * x - &inst.b)
            .iter()
            .fold(0.0_f64, |acc, v| acc.max(*v));
        let eq = inf_norm(&(&self.shared.e * x - &inst.f));
        ineq.max(eq) / inst.rhs_scale
    }

    /// Solve under `strategy`, keeping the primal point.
    pub fn solve_with_point(&self, strategy: &ActiveSet) -> QpResult<StrategyPoint> {
        let inst = self.instance()?;
        let m = self.problem().num_inequalities();
        if let Some(&row) = strategy.rows().iter().find(|&&r| r >= m) {
            return Err(QpError::InvalidStrategy { row, rows: m });
        }

        let n = self.problem().num_vars();
        let n_eq = self.problem().num_equalities();
        let r = strategy.len() + n_eq;
        let mut g = DMatrix::zeros(r, n);
        let mut h = DVector::zeros(r);
        for (k, &row) in strategy.rows().iter().enumerate() {
            g.row_mut(k).copy_from(&self.shared.a.row(row));
            h[k] = inst.b[row];
        }
        for j in 0..n_eq {
            g.row_mut(strategy.len() + j).copy_from(&self.shared.e.row(j));
            h[strategy.len() + j] = inst.f[j];
        }

        let settings = self.settings();
        match solve_reduced(self.shared.admm.p(), &inst.q, &g, &h, settings.kkt_reg) {
            Some(sol) => {
                let solve = StrategySolve {
                    cost: self.cost_at(inst, &sol.x),
                    infeasibility: self.infeasibility_at(inst, &sol.x),
                };
                Ok(StrategyPoint {
                    solve,
                    x: Some(sol.x.iter().copied().collect()),
                })
            }
            None => {
                if settings.verbose {
                    log::debug!("Reduced KKT system singular for strategy {}", strategy);
                }
                Ok(StrategyPoint {
                    solve: StrategySolve::failed(),
                    x: None,
                })
            }
        }
    }

    /// Run ADMM on the populated instance.
    pub fn solve_admm(&self) -> QpResult<AdmmSolution> {
        let inst = self.instance()?;
        let m = self.problem().num_inequalities();
        let n_eq = self.problem().num_equalities();

        let mut l = DVector::from_element(m + n_eq, f64::NEG_INFINITY);
        let mut u = DVector::zeros(m + n_eq);
        u.rows_mut(0, m).copy_from(&inst.b);
        l.rows_mut(m, n_eq).copy_from(&inst.f);
        u.rows_mut(m, n_eq).copy_from(&inst.f);

        self.shared.admm.solve(&inst.q, &l, &u, self.settings())
    }

    /// Tight inequality rows of an ADMM solution.
    pub fn active_set(&self, sol: &AdmmSolution) -> ActiveSet {
        let m = self.problem().num_inequalities();
        let tol = self.settings().active_tol;
        ActiveSet::new((0..m).filter(|&i| sol.y[i] > tol).collect())
    }

    fn exact(&self) -> QpResult<ExactSolve<ActiveSet>> {
        let inst = self.instance()?;
        let sol = self.solve_admm()?;
        let strategy = self.active_set(&sol);
        let admm_cost = self.cost_at(inst, &sol.x);

        if self.settings().polish {
            let polished = self.solve_with_point(&strategy)?;
            if let Some(x) = polished.x {
                let slack = 1e-6 * (1.0 + admm_cost.abs());
                let feasible = polished.solve.infeasibility <= self.settings().eps_abs.max(1e-7);
                if feasible && polished.solve.cost <= admm_cost + slack {
                    return Ok(ExactSolve {
                        cost: polished.solve.cost,
                        strategy,
                        x,
                    });
                }
            }
            if self.settings().verbose {
                log::debug!("Polish rejected for strategy {}", strategy);
            }
        }

        Ok(ExactSolve {
            cost: admm_cost,
            strategy,
            x: sol.x.iter().copied().collect(),
        })
    }
}

impl ProblemOracle for QpOracle {
    type Strategy = ActiveSet;

    fn num_parameters(&self) -> usize {
        self.problem().num_parameters()
    }

    fn populate(&mut self, theta: &[f64]) -> CoreResult<()> {
        let (q, b, f) = self.shared.problem.evaluate(theta)?;
        let rhs_scale = b
            .iter()
            .chain(f.iter())
            .fold(1.0_f64, |acc, v| acc.max(v.abs()));
        self.instance = Some(Instance {
            q: DVector::from_vec(q),
            b: DVector::from_vec(b),
            f: DVector::from_vec(f),
            rhs_scale,
        });
        Ok(())
    }

    fn solve(&self, strategy: &ActiveSet) -> CoreResult<StrategySolve> {
        Ok(self.solve_with_point(strategy)?.solve)
    }

    fn solve_exact(&self) -> CoreResult<ExactSolve<ActiveSet>> {
        Ok(self.exact()?)
    }
}
