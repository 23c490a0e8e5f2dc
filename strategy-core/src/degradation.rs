//! Cost degradation of reassigned samples.
//!
//! A sample whose strategy was discarded is re-solved under every surviving
//! strategy. It is reassigned to the one with least degradation:
//!
//! ```text
//! d = |cost - obj|            if |obj| <= division_tol
//! d = |cost - obj| / |obj|    otherwise
//! ```
//!
//! where `cost` is `+inf` for solves with infeasibility above `infeas_tol`.

use crate::dispatch::dispatch;
use crate::encoding::StrategyEncoding;
use crate::error::{CoreError, CoreResult};
use crate::oracle::ProblemOracle;
use crate::sample::SampleSet;
use crate::settings::FilterSettings;

/// Degradation of `cost` with respect to the exact optimum `obj`.
pub fn degradation(cost: f64, obj: f64, division_tol: f64) -> f64 {
    let diff = (cost - obj).abs();
    if obj.abs() > division_tol {
        diff / obj.abs()
    } else {
        diff
    }
}

/// Outcome of reassigning one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reassignment {
    /// Index into the working encoding.
    pub strategy: usize,

    /// Degradation of that strategy (`+inf` if no candidate was feasible).
    pub degradation: f64,
}

/// Pick the least-degrading strategy of `encoding` for the populated oracle.
///
/// The first minimum wins on ties. If every candidate is infeasible the
/// first strategy is returned with infinite degradation.
pub fn best_strategy<O: ProblemOracle>(
    oracle: &O,
    obj: f64,
    encoding: &StrategyEncoding<O::Strategy>,
    settings: &FilterSettings,
) -> CoreResult<Reassignment> {
    let mut best = Reassignment {
        strategy: 0,
        degradation: f64::INFINITY,
    };

    for (k, strategy) in encoding.iter().enumerate() {
        let result = oracle.solve(strategy)?;
        let cost = result.effective_cost(settings.infeas_tol);
        let d = degradation(cost, obj, settings.division_tol);
        if d < best.degradation {
            best = Reassignment {
                strategy: k,
                degradation: d,
            };
        }
    }

    Ok(best)
}

/// Summary of one evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DegradationStats {
    /// Number of reassigned samples.
    pub count: usize,

    /// Mean degradation (0 when nothing was reassigned).
    pub mean: f64,

    /// Max degradation (0 when nothing was reassigned).
    pub max: f64,

    /// Samples with no feasible candidate.
    pub infeasible: usize,
}

impl DegradationStats {
    /// Aggregate a batch of reassignments.
    pub fn from_reassignments<'a, I>(reassignments: I) -> Self
    where
        I: IntoIterator<Item = &'a Reassignment>,
    {
        let mut count = 0;
        let mut sum = 0.0;
        let mut max = 0.0_f64;
        let mut infeasible = 0;
        for r in reassignments {
            count += 1;
            sum += r.degradation;
            max = max.max(r.degradation);
            if r.degradation.is_infinite() {
                infeasible += 1;
            }
        }

        Self {
            count,
            mean: if count > 0 { sum / count as f64 } else { 0.0 },
            max,
            infeasible,
        }
    }
}

/// Reassigns discarded samples to surviving strategies.
pub struct DegradationEvaluator<'a, O: ProblemOracle> {
    oracle: &'a O,
    samples: &'a SampleSet,
    settings: &'a FilterSettings,
}

impl<'a, O: ProblemOracle> DegradationEvaluator<'a, O> {
    /// Create an evaluator over `samples`.
    pub fn new(oracle: &'a O, samples: &'a SampleSet, settings: &'a FilterSettings) -> Self {
        Self {
            oracle,
            samples,
            settings,
        }
    }

    /// Reassign each sample in `discarded` to its best strategy in `encoding`.
    ///
    /// Returns `(sample index, reassignment)` pairs in the order of
    /// `discarded`, regardless of which worker finished first.
    pub fn evaluate(
        &self,
        discarded: &[usize],
        encoding: &StrategyEncoding<O::Strategy>,
    ) -> CoreResult<Vec<(usize, Reassignment)>> {
        if encoding.is_empty() && !discarded.is_empty() {
            return Err(CoreError::Precondition(
                "cannot reassign samples to an empty encoding".to_string(),
            ));
        }

        if self.settings.verbose {
            log::info!(
                "Assigning {} samples to {} strategies (workers = {})",
                discarded.len(),
                encoding.len(),
                crate::dispatch::num_workers(self.settings)
            );
        }

        let samples = self.samples;
        let settings = self.settings;
        let results = dispatch(settings, self.oracle, discarded, |worker, i| {
            let sample = samples.get(i);
            worker.populate(sample.theta())?;
            best_strategy(worker, sample.obj(), encoding, settings)
        })?;

        for (i, r) in &results {
            if r.degradation.is_infinite() {
                log::warn!(
                    "Sample {} has no feasible surviving strategy (degradation = inf)",
                    i
                );
            }
        }

        Ok(results)
    }
}
