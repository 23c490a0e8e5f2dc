//! Problem oracle interface.
//!
//! The oracle owns the parametric optimization problem. It is populated with
//! one parameter instance at a time and then solved either exactly or under
//! a fixed strategy.

use std::fmt::Debug;
use std::hash::Hash;

use crate::error::CoreResult;

/// Result of solving a populated problem under a fixed strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategySolve {
    /// Objective value of the reduced solve.
    pub cost: f64,

    /// Constraint violation of the reduced solution (0 when feasible).
    pub infeasibility: f64,
}

impl StrategySolve {
    /// Result for a strategy the oracle could not solve at all.
    pub fn failed() -> Self {
        Self {
            cost: f64::INFINITY,
            infeasibility: f64::INFINITY,
        }
    }

    /// Cost with infeasible solves mapped to `+inf`.
    pub fn effective_cost(&self, infeas_tol: f64) -> f64 {
        if self.infeasibility > infeas_tol || self.infeasibility.is_nan() {
            f64::INFINITY
        } else {
            self.cost
        }
    }
}

/// Result of solving a populated problem from scratch.
#[derive(Debug, Clone, PartialEq)]
pub struct ExactSolve<S> {
    /// Optimal objective value.
    pub cost: f64,

    /// Strategy identified at the optimum.
    pub strategy: S,

    /// Optimal primal solution.
    pub x: Vec<f64>,
}

/// Parametric optimization problem seen by the filter.
///
/// `populate` takes `&mut self`, so a populated oracle cannot be shared
/// between workers. Parallel callers clone one oracle per worker.
pub trait ProblemOracle: Clone + Send + Sync {
    /// Combinatorial strategy signature. Only equality and hashing are used.
    type Strategy: Clone + Eq + Hash + Debug + Send + Sync;

    /// Number of entries expected in a parameter vector.
    fn num_parameters(&self) -> usize;

    /// Load a parameter instance.
    fn populate(&mut self, theta: &[f64]) -> CoreResult<()>;

    /// Solve the populated instance with the structure fixed to `strategy`.
    fn solve(&self, strategy: &Self::Strategy) -> CoreResult<StrategySolve>;

    /// Solve the populated instance exactly.
    fn solve_exact(&self) -> CoreResult<ExactSolve<Self::Strategy>>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Table-driven oracle for unit tests.
    //!
    //! `theta[0]` is the sample index. `costs[sample][strategy]` holds the
    //! reduced solve result; `exact[sample]` holds the optimum.

    use std::sync::Arc;

    use super::*;
    use crate::error::CoreError;

    #[derive(Clone)]
    pub struct TableOracle {
        pub costs: Arc<Vec<Vec<StrategySolve>>>,
        pub exact: Arc<Vec<(f64, usize)>>,
        sample: Option<usize>,
    }

    impl TableOracle {
        pub fn new(costs: Vec<Vec<StrategySolve>>, exact: Vec<(f64, usize)>) -> Self {
            Self {
                costs: Arc::new(costs),
                exact: Arc::new(exact),
                sample: None,
            }
        }

        fn current(&self) -> CoreResult<usize> {
            self.sample
                .ok_or_else(|| CoreError::Oracle("oracle not populated".to_string()))
        }
    }

    impl ProblemOracle for TableOracle {
        type Strategy = usize;

        fn num_parameters(&self) -> usize {
            1
        }

        fn populate(&mut self, theta: &[f64]) -> CoreResult<()> {
            self.sample = Some(theta[0] as usize);
            Ok(())
        }

        fn solve(&self, strategy: &usize) -> CoreResult<StrategySolve> {
            let i = self.current()?;
            self.costs[i]
                .get(*strategy)
                .copied()
                .ok_or_else(|| CoreError::Oracle(format!("unknown strategy {}", strategy)))
        }

        fn solve_exact(&self) -> CoreResult<ExactSolve<usize>> {
            let i = self.current()?;
            let (cost, strategy) = self.exact[i];
            Ok(ExactSolve {
                cost,
                strategy,
                x: Vec::new(),
            })
        }
    }

    /// Feasible solve with the given cost.
    pub fn ok(cost: f64) -> StrategySolve {
        StrategySolve {
            cost,
            infeasibility: 0.0,
        }
    }
}
