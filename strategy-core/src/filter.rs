//! Strategy filter controller.
//!
//! Each iteration runs `Selecting -> Reassigning -> Evaluating` and ends in
//! one of three ways:
//!
//! - **Accept**: nothing was discarded, or the mean degradation of the
//!   reassigned samples is within `subopt`. The working encoding is returned.
//! - **Relax**: the mean degradation is too high. Labels and encoding go back
//!   to the full backup, the coverage fraction moves halfway to 1 and the
//!   loop restarts.
//! - **Exhausted**: `max_iter` iterations without Accept. The full,
//!   unfiltered encoding and labels are returned with a warning.

use std::time::Instant;

use crate::degradation::{DegradationEvaluator, DegradationStats};
use crate::encoding::{LabelAssignment, StrategyEncoding};
use crate::error::{CoreError, CoreResult};
use crate::oracle::ProblemOracle;
use crate::sample::SampleSet;
use crate::select::select_strategies;
use crate::settings::FilterSettings;

/// Controller phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterPhase {
    /// Picking the most frequent strategies.
    Selecting,
    /// Building the working encoding and discarded set.
    Reassigning,
    /// Reassigning discarded samples.
    Evaluating,
    /// Working encoding committed.
    Accept,
    /// Coverage relaxed, retrying from the backup.
    Relax,
    /// Iteration budget spent.
    Exhausted,
}

/// How a filter run terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStatus {
    /// Mean degradation within tolerance at the given iteration (0-based).
    Accepted {
        /// Iteration that was accepted.
        iteration: usize,
    },

    /// Selected strategies already covered every sample.
    NothingDiscarded {
        /// Iteration that was accepted.
        iteration: usize,
    },

    /// No acceptable subset found; full encoding returned.
    Exhausted,
}

impl FilterStatus {
    /// Returns true if the encoding was actually reduced or kept by choice.
    pub fn is_accepted(&self) -> bool {
        !matches!(self, FilterStatus::Exhausted)
    }
}

/// Record of one filter iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterIteration {
    /// Coverage fraction used for selection.
    pub coverage_fraction: f64,

    /// Number of strategies kept.
    pub n_selected: usize,

    /// Degradation of the discarded samples.
    pub stats: DegradationStats,

    /// Terminal phase of the iteration (Accept or Relax).
    pub phase: FilterPhase,
}

/// Result of a filter run.
#[derive(Debug, Clone)]
pub struct FilterOutcome<S> {
    /// Final label per sample, every entry a valid index into `encoding`.
    pub labels: Vec<usize>,

    /// Final encoding.
    pub encoding: StrategyEncoding<S>,

    /// How the run ended.
    pub status: FilterStatus,

    /// Coverage fraction in force when the run ended.
    pub coverage_fraction: f64,

    /// Per-iteration history.
    pub history: Vec<FilterIteration>,

    /// Wall time in milliseconds.
    pub solve_time_ms: u64,
}

impl<S> FilterOutcome<S> {
    /// Number of iterations run.
    pub fn iterations(&self) -> usize {
        self.history.len()
    }
}

/// Iterative strategy filter.
///
/// Owns the full backup (`encoding_full`, `labels_full`) and the working
/// copy. Only the degradation evaluation runs concurrently; the working
/// state is mutated between iterations only.
pub struct StrategyFilter<'a, O: ProblemOracle> {
    samples: &'a SampleSet,
    oracle: &'a O,
    settings: FilterSettings,

    encoding_full: StrategyEncoding<O::Strategy>,
    labels_full: LabelAssignment,

    encoding: StrategyEncoding<O::Strategy>,
    labels: LabelAssignment,

    phase: FilterPhase,
    coverage_fraction: f64,
    history: Vec<FilterIteration>,
}

impl<'a, O: ProblemOracle> StrategyFilter<'a, O> {
    /// Create a filter over labeled samples.
    pub fn new(
        samples: &'a SampleSet,
        labels: LabelAssignment,
        encoding: StrategyEncoding<O::Strategy>,
        oracle: &'a O,
        settings: FilterSettings,
    ) -> CoreResult<Self> {
        settings.validate()?;
        if labels.len() != samples.len() {
            return Err(CoreError::InvalidSamples(format!(
                "{} labels for {} samples",
                labels.len(),
                samples.len()
            )));
        }

        Ok(Self {
            samples,
            oracle,
            coverage_fraction: settings.samples_fraction,
            settings,
            encoding_full: encoding.clone(),
            labels_full: labels.clone(),
            encoding,
            labels,
            phase: FilterPhase::Selecting,
            history: Vec::new(),
        })
    }

    /// Current phase.
    pub fn phase(&self) -> FilterPhase {
        self.phase
    }

    /// Run the filter to completion.
    pub fn run(mut self) -> CoreResult<FilterOutcome<O::Strategy>> {
        let start = Instant::now();
        let n_samples = self.samples.len();

        for k in 0..self.settings.max_iter {
            // Selecting
            self.phase = FilterPhase::Selecting;
            let selected =
                select_strategies(&self.labels, self.encoding.len(), self.coverage_fraction)?;
            if self.settings.verbose {
                log::info!(
                    "Iteration {}: samples fraction at least {:.3}%, selected {} of {} strategies",
                    k,
                    100.0 * self.coverage_fraction,
                    selected.len(),
                    self.encoding.len()
                );
            }

            // Reassigning
            self.phase = FilterPhase::Reassigning;
            let mut new_index = vec![None; self.encoding.len()];
            for (pos, &old) in selected.iter().enumerate() {
                new_index[old] = Some(pos);
            }
            self.encoding = self.encoding.subset(&selected);
            self.labels = self.labels.remap(&new_index);
            let discarded = self.labels.discarded();
            if self.settings.verbose {
                log::info!(
                    "Discarded strategies for {} samples ({:.2}%)",
                    discarded.len(),
                    100.0 * discarded.len() as f64 / n_samples.max(1) as f64
                );
            }

            // Evaluating
            self.phase = FilterPhase::Evaluating;
            let evaluator = DegradationEvaluator::new(self.oracle, self.samples, &self.settings);
            let results = evaluator.evaluate(&discarded, &self.encoding)?;
            for (i, r) in &results {
                self.labels.set(*i, Some(r.strategy));
            }
            let stats = DegradationStats::from_reassignments(results.iter().map(|(_, r)| r));

            if discarded.is_empty() {
                if self.settings.verbose {
                    log::info!("No more discarded points");
                }
                self.record(selected.len(), stats, FilterPhase::Accept);
                return self.finish(FilterStatus::NothingDiscarded { iteration: k }, start);
            }

            if self.settings.verbose {
                log::info!(
                    "Average cost degradation = {:.2e}%, max = {:.2e}%",
                    100.0 * stats.mean,
                    100.0 * stats.max
                );
            }

            // NaN never passes
            if stats.mean <= self.settings.subopt {
                if self.settings.verbose {
                    log::info!("Acceptable degradation found");
                }
                self.record(selected.len(), stats, FilterPhase::Accept);
                return self.finish(FilterStatus::Accepted { iteration: k }, start);
            }

            // Relax
            self.record(selected.len(), stats, FilterPhase::Relax);
            self.relax();
        }

        // Exhausted
        self.phase = FilterPhase::Exhausted;
        self.encoding = self.encoding_full.clone();
        self.labels = self.labels_full.clone();
        log::warn!(
            "No acceptable filtering found after {} iterations; keeping all {} strategies",
            self.settings.max_iter,
            self.encoding.len()
        );
        self.finish(FilterStatus::Exhausted, start)
    }

    /// Reset to the backup and move the coverage fraction halfway to 1.
    fn relax(&mut self) {
        self.phase = FilterPhase::Relax;
        self.coverage_fraction = 1.0 - (1.0 - self.coverage_fraction) / 2.0;
        self.encoding = self.encoding_full.clone();
        self.labels = self.labels_full.clone();
        if self.settings.verbose {
            log::info!(
                "Mean degradation too high, trying samples fraction = {:.4}",
                self.coverage_fraction
            );
        }
    }

    fn record(&mut self, n_selected: usize, stats: DegradationStats, phase: FilterPhase) {
        self.phase = phase;
        self.history.push(FilterIteration {
            coverage_fraction: self.coverage_fraction,
            n_selected,
            stats,
            phase,
        });
    }

    fn finish(
        self,
        status: FilterStatus,
        start: Instant,
    ) -> CoreResult<FilterOutcome<O::Strategy>> {
        Ok(FilterOutcome {
            labels: self.labels.to_indices()?,
            encoding: self.encoding,
            status,
            coverage_fraction: self.coverage_fraction,
            history: self.history,
            solve_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Filter labeled samples with the given settings.
pub fn filter_strategies<O: ProblemOracle>(
    samples: &SampleSet,
    labels: LabelAssignment,
    encoding: StrategyEncoding<O::Strategy>,
    oracle: &O,
    settings: &FilterSettings,
) -> CoreResult<FilterOutcome<O::Strategy>> {
    StrategyFilter::new(samples, labels, encoding, oracle, settings.clone())?.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::testing::{ok, TableOracle};
    use crate::oracle::StrategySolve;
    use crate::sample::ParameterSample;

    /// Samples with objective 1 and labels given by `freqs`; `cost(i, s)`
    /// fills the oracle table.
    fn setup(
        freqs: &[usize],
        cost: impl Fn(usize, usize) -> StrategySolve,
    ) -> (SampleSet, LabelAssignment, StrategyEncoding<usize>, TableOracle) {
        let mut labels = Vec::new();
        for (k, &f) in freqs.iter().enumerate() {
            labels.extend(std::iter::repeat(k).take(f));
        }
        let n = labels.len();
        let samples = SampleSet::new(
            (0..n).map(|i| ParameterSample::new(vec![i as f64], 1.0)).collect(),
        )
        .unwrap();
        let costs = (0..n)
            .map(|i| (0..freqs.len()).map(|s| cost(i, s)).collect())
            .collect();
        let exact = labels.iter().map(|&l| (1.0, l)).collect();
        let encoding = StrategyEncoding::from_unique((0..freqs.len()).collect()).unwrap();
        (
            samples,
            LabelAssignment::from_indices(labels),
            encoding,
            TableOracle::new(costs, exact),
        )
    }

    #[test]
    fn test_accept_first_iteration() {
        // Every strategy is nearly optimal for every sample
        let (samples, labels, enc, oracle) = setup(&[5, 3, 2], |_, _| ok(1.01));
        let settings = FilterSettings::builtin()
            .with_samples_fraction(0.5)
            .with_max_iter(5)
            .with_subopt(0.1);

        let out = filter_strategies(&samples, labels, enc, &oracle, &settings).unwrap();

        assert_eq!(out.status, FilterStatus::Accepted { iteration: 0 });
        assert_eq!(out.iterations(), 1);
        assert_eq!(out.history[0].phase, FilterPhase::Accept);
        // 5 > 5? no; 8 > 5 -> two strategies
        assert_eq!(out.encoding.len(), 2);
        assert_eq!(out.encoding.into_vec(), vec![0, 1]);
        assert!(out.labels.iter().all(|&l| l < 2));
    }

    #[test]
    fn test_nothing_discarded() {
        let (samples, labels, enc, oracle) = setup(&[4, 4], |_, _| ok(1.0));
        let settings = FilterSettings::builtin()
            .with_samples_fraction(1.0)
            .with_max_iter(5)
            .with_subopt(0.1);

        let out = filter_strategies(&samples, labels.clone(), enc, &oracle, &settings).unwrap();
        assert_eq!(out.status, FilterStatus::NothingDiscarded { iteration: 0 });
        assert_eq!(out.labels, labels.to_indices().unwrap());
    }

    #[test]
    fn test_exhausted_falls_back_to_full() {
        // Only a sample's own strategy is feasible
        let freqs = [6, 2, 1, 1];
        let (samples, labels, enc, oracle) = setup(&freqs, |_, _| ok(1.0));
        let own: Vec<usize> = labels.to_indices().unwrap();
        let costs = (0..own.len())
            .map(|i| {
                (0..freqs.len())
                    .map(|s| {
                        if s == own[i] {
                            ok(1.0)
                        } else {
                            StrategySolve { cost: 1.0, infeasibility: 1.0 }
                        }
                    })
                    .collect()
            })
            .collect();
        let oracle = TableOracle::new(costs, oracle.exact.to_vec());
        let settings = FilterSettings::builtin()
            .with_samples_fraction(0.3)
            .with_max_iter(2);

        let out = filter_strategies(&samples, labels.clone(), enc.clone(), &oracle, &settings)
            .unwrap();

        assert_eq!(out.status, FilterStatus::Exhausted);
        assert!(!out.status.is_accepted());
        assert_eq!(out.iterations(), 2);
        assert!(out.history.iter().all(|h| h.phase == FilterPhase::Relax));
        assert_eq!(out.encoding, enc);
        assert_eq!(out.labels, own);
        // 0.3 -> 0.65 -> 0.825
        assert!((out.history[0].coverage_fraction - 0.3).abs() < 1e-12);
        assert!((out.history[1].coverage_fraction - 0.65).abs() < 1e-12);
        assert!((out.coverage_fraction - 0.825).abs() < 1e-12);
    }

    #[test]
    fn test_accepted_on_last_iteration() {
        // Strategy 0 is poor for samples of strategies 2 and 3, strategy 1 is fine.
        // Iteration 0 keeps only {0} and fails; iteration 1 keeps {0, 1} and passes.
        let freqs = [6, 2, 1, 1];
        let (samples, labels, enc, _) = setup(&freqs, |_, _| ok(1.0));
        let own = labels.to_indices().unwrap();
        let costs = (0..own.len())
            .map(|i| {
                (0..freqs.len())
                    .map(|s| match (own[i], s) {
                        (a, b) if a == b => ok(1.0),
                        (_, 1) => ok(1.05),
                        _ => ok(3.0),
                    })
                    .collect()
            })
            .collect();
        let exact = own.iter().map(|&l| (1.0, l)).collect();
        let oracle = TableOracle::new(costs, exact);
        let settings = FilterSettings::builtin()
            .with_samples_fraction(0.5)
            .with_max_iter(2)
            .with_subopt(0.1);

        let out = filter_strategies(&samples, labels, enc, &oracle, &settings).unwrap();

        assert_eq!(out.status, FilterStatus::Accepted { iteration: 1 });
        assert_eq!(out.history[0].phase, FilterPhase::Relax);
        assert_eq!(out.encoding.into_vec(), vec![0, 1]);
        // Samples of strategies 2 and 3 moved to strategy 1
        assert_eq!(out.labels, vec![0, 0, 0, 0, 0, 0, 1, 1, 1, 1]);
    }

    #[test]
    fn test_zero_iterations_is_exhausted() {
        let (samples, labels, enc, oracle) = setup(&[3, 1], |_, _| ok(1.0));
        let settings = FilterSettings::builtin().with_max_iter(0);

        let out = filter_strategies(&samples, labels.clone(), enc, &oracle, &settings).unwrap();
        assert_eq!(out.status, FilterStatus::Exhausted);
        assert_eq!(out.iterations(), 0);
        assert_eq!(out.labels, labels.to_indices().unwrap());
    }

    #[test]
    fn test_label_mismatch_rejected() {
        let (samples, _, enc, oracle) = setup(&[3, 1], |_, _| ok(1.0));
        let labels = LabelAssignment::from_indices(vec![0, 1]);
        let result = StrategyFilter::new(&samples, labels, enc, &oracle, FilterSettings::builtin());
        assert!(matches!(result, Err(CoreError::InvalidSamples(_))));
    }
}
