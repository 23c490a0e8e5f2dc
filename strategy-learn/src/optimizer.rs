//! Train/predict pipeline.
//!
//! Training solves every sample exactly, encodes the strategies, optionally
//! filters them and fits a learner on the resulting labels. Solving a new
//! parameter asks the learner for its `n_best` candidates, solves under each
//! and keeps the best feasible one.

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strategy_core::dispatch::dispatch;
use strategy_core::{
    degradation, filter_strategies, CoreResult, FilterSettings, ProblemOracle, SampleSet,
    StrategyEncoding, StrategySolve,
};

use crate::config::{LearnerConfig, LearnerKind};
use crate::error::{LearnError, LearnResult};
use crate::learner::{build_learner, load_json, save_json, Learner};

/// Pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerSettings {
    /// Filter, tolerance and dispatch settings.
    pub filter: FilterSettings,

    /// Learner backend and its options.
    pub learner: LearnerConfig,

    /// Run the strategy filter before training.
    pub run_filter: bool,

    /// Suboptimality below which a feasible prediction counts as correct.
    pub accuracy_tol: f64,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            filter: FilterSettings::default(),
            learner: LearnerConfig::default(),
            run_filter: true,
            accuracy_tol: 1e-4,
        }
    }
}

impl OptimizerSettings {
    /// Use `learner` as the backend.
    pub fn with_learner(mut self, learner: LearnerConfig) -> Self {
        self.learner = learner;
        self
    }

    /// Use `filter` for filtering and dispatch.
    pub fn with_filter(mut self, filter: FilterSettings) -> Self {
        self.filter = filter;
        self
    }

    /// Skip the strategy filter.
    pub fn without_filter(mut self) -> Self {
        self.run_filter = false;
        self
    }
}

/// What training produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainSummary {
    /// Training samples.
    pub n_train: usize,

    /// Distinct strategies before filtering.
    pub n_strategies_full: usize,

    /// Strategies the learner predicts over.
    pub n_strategies: usize,

    /// Filter termination (`None` if the filter did not run).
    pub filter_status: Option<String>,

    /// Filter iterations run.
    pub filter_iterations: usize,

    /// Wall time of the exact solves.
    pub exact_time_ms: f64,

    /// Wall time of the filter.
    pub filter_time_ms: f64,

    /// Wall time of learner training.
    pub learn_time_ms: f64,
}

/// Solution obtained from the predicted strategies.
#[derive(Debug, Clone)]
pub struct PredictedSolve<S> {
    /// Chosen strategy.
    pub strategy: S,

    /// Position of the chosen strategy in the learner's ranking.
    pub rank: usize,

    /// Cost under the chosen strategy.
    pub cost: f64,

    /// Infeasibility under the chosen strategy.
    pub infeasibility: f64,

    /// Predict plus solve wall time.
    pub time_ms: f64,
}

/// Comparison of predicted solves against exact solves over a test set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    /// Learner backend.
    pub learner: LearnerKind,

    /// Training samples.
    pub n_train: usize,

    /// Test samples.
    pub n_test: usize,

    /// Strategies the learner predicts over.
    pub n_strategies: usize,

    /// Candidates tried per prediction.
    pub n_best: usize,

    /// Fraction feasible within `infeas_tol` and suboptimal within
    /// `accuracy_tol`.
    pub accuracy: f64,

    /// Fraction whose chosen strategy equals the exact one.
    pub strategy_accuracy: f64,

    /// Mean suboptimality over feasible predictions.
    pub mean_suboptimality: f64,

    /// Max suboptimality over feasible predictions.
    pub max_suboptimality: f64,

    /// Mean infeasibility.
    pub mean_infeasibility: f64,

    /// Max infeasibility.
    pub max_infeasibility: f64,

    /// Predictions with no feasible candidate.
    pub n_infeasible: usize,

    /// Mean predict plus solve time.
    pub mean_time_ms: f64,

    /// Mean exact solve time.
    pub mean_exact_time_ms: f64,
}

/// Strategy list persisted next to the learner.
#[derive(Serialize, Deserialize)]
struct SavedStrategies<S> {
    learner: LearnerKind,
    n_input: usize,
    strategies: Vec<S>,
}

/// Per-test-sample measurements.
struct TestRecord {
    exact_cost: f64,
    cost: f64,
    infeasibility: f64,
    same_strategy: bool,
    time_ms: f64,
    exact_time_ms: f64,
}

/// Index of the candidate to keep: the cheapest feasible one, or the least
/// infeasible one if none is feasible. Earlier candidates win ties.
pub fn choose_candidate(results: &[StrategySolve], infeas_tol: f64) -> Option<usize> {
    let feasible = results
        .iter()
        .enumerate()
        .filter(|(_, r)| r.infeasibility <= infeas_tol)
        .fold(None, |best: Option<(usize, f64)>, (i, r)| match best {
            Some((_, c)) if c <= r.cost => best,
            _ => Some((i, r.cost)),
        });
    if let Some((i, _)) = feasible {
        return Some(i);
    }

    results
        .iter()
        .enumerate()
        .filter(|(_, r)| !r.infeasibility.is_nan())
        .fold(None, |best: Option<(usize, f64)>, (i, r)| match best {
            Some((_, v)) if v <= r.infeasibility => best,
            _ => Some((i, r.infeasibility)),
        })
        .map(|(i, _)| i)
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Learns which strategy solves a parametric problem.
pub struct StrategyOptimizer<O: ProblemOracle> {
    oracle: O,
    settings: OptimizerSettings,
    encoding: Option<StrategyEncoding<O::Strategy>>,
    learner: Option<Box<dyn Learner>>,
}

impl<O: ProblemOracle> StrategyOptimizer<O> {
    /// Wrap `oracle`. Fails early if the learner backend is not installed
    /// or any setting is out of range.
    pub fn new(oracle: O, settings: OptimizerSettings) -> LearnResult<Self> {
        let kind = settings.learner.kind();
        if !kind.is_installed() {
            return Err(LearnError::NotInstalled(kind));
        }
        settings.learner.validate()?;
        settings.filter.validate()?;
        if settings.accuracy_tol.is_nan() || settings.accuracy_tol < 0.0 {
            return Err(LearnError::InvalidConfig(format!(
                "accuracy_tol must be nonnegative, got {}",
                settings.accuracy_tol
            )));
        }

        Ok(Self {
            oracle,
            settings,
            encoding: None,
            learner: None,
        })
    }

    /// Settings in use.
    pub fn settings(&self) -> &OptimizerSettings {
        &self.settings
    }

    /// Strategies the learner predicts over.
    pub fn encoding(&self) -> Option<&StrategyEncoding<O::Strategy>> {
        self.encoding.as_ref()
    }

    /// Trained learner.
    pub fn learner(&self) -> Option<&dyn Learner> {
        self.learner.as_deref()
    }

    fn trained(&self) -> LearnResult<(&StrategyEncoding<O::Strategy>, &dyn Learner)> {
        match (&self.encoding, &self.learner) {
            (Some(e), Some(l)) => Ok((e, l.as_ref())),
            _ => Err(LearnError::NotTrained),
        }
    }

    /// Solve `parameters` exactly and train on them.
    pub fn train(&mut self, parameters: &[Vec<f64>]) -> LearnResult<TrainSummary> {
        if parameters.is_empty() {
            return Err(LearnError::InvalidData("no training parameters".to_string()));
        }
        log::info!("Computing exact strategies for {} samples", parameters.len());

        let start = Instant::now();
        let (samples, strategies) = SampleSet::solve(&self.oracle, parameters, &self.settings.filter)?;
        let exact_time_ms = elapsed_ms(start);

        let mut summary = self.train_from_samples(&samples, &strategies)?;
        summary.exact_time_ms = exact_time_ms;
        Ok(summary)
    }

    /// Train on samples whose exact strategies are already known.
    pub fn train_from_samples(
        &mut self,
        samples: &SampleSet,
        strategies: &[O::Strategy],
    ) -> LearnResult<TrainSummary> {
        if samples.is_empty() || samples.len() != strategies.len() {
            return Err(LearnError::InvalidData(format!(
                "{} samples but {} strategies",
                samples.len(),
                strategies.len()
            )));
        }

        let (full, labels) = StrategyEncoding::encode(strategies);
        let n_strategies_full = full.len();
        log::info!(
            "{} samples, {} distinct strategies",
            samples.len(),
            n_strategies_full
        );

        let start = Instant::now();
        let (encoding, labels, filter_status, filter_iterations) =
            if self.settings.run_filter && n_strategies_full > 1 {
                let outcome =
                    filter_strategies(samples, labels, full, &self.oracle, &self.settings.filter)?;
                log::info!(
                    "Filter: {} -> {} strategies ({:?})",
                    n_strategies_full,
                    outcome.encoding.len(),
                    outcome.status
                );
                let status = format!("{:?}", outcome.status);
                let iterations = outcome.iterations();
                (outcome.encoding, outcome.labels, Some(status), iterations)
            } else {
                (full, labels.to_indices()?, None, 0)
            };
        let filter_time_ms = elapsed_ms(start);

        let start = Instant::now();
        let mut learner = build_learner(
            &self.settings.learner,
            self.oracle.num_parameters(),
            encoding.len(),
        )?;
        learner.train(&samples.features(), &labels)?;
        let learn_time_ms = elapsed_ms(start);

        let summary = TrainSummary {
            n_train: samples.len(),
            n_strategies_full,
            n_strategies: encoding.len(),
            filter_status,
            filter_iterations,
            exact_time_ms: 0.0,
            filter_time_ms,
            learn_time_ms,
        };
        self.encoding = Some(encoding);
        self.learner = Some(learner);
        Ok(summary)
    }

    /// Solve the candidates of one populated worker.
    fn solve_candidates(
        worker: &O,
        encoding: &StrategyEncoding<O::Strategy>,
        candidates: &[usize],
        infeas_tol: f64,
    ) -> CoreResult<Option<(usize, StrategySolve)>> {
        let results = candidates
            .iter()
            .map(|&c| worker.solve(&encoding[c]))
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(choose_candidate(&results, infeas_tol).map(|k| (k, results[k])))
    }

    /// Predict strategies for `theta`, solve under each and return the best.
    pub fn solve(&self, theta: &[f64]) -> LearnResult<PredictedSolve<O::Strategy>> {
        let (encoding, learner) = self.trained()?;
        let start = Instant::now();

        let candidates = learner
            .predict(&[theta.to_vec()])?
            .pop()
            .unwrap_or_default();
        let mut worker = self.oracle.clone();
        worker.populate(theta)?;

        let (rank, result) = Self::solve_candidates(
            &worker,
            encoding,
            &candidates,
            self.settings.filter.infeas_tol,
        )?
        .ok_or_else(|| LearnError::InvalidData("learner returned no candidates".to_string()))?;

        Ok(PredictedSolve {
            strategy: encoding[candidates[rank]].clone(),
            rank,
            cost: result.cost,
            infeasibility: result.infeasibility,
            time_ms: elapsed_ms(start),
        })
    }

    /// Compare predicted solves with exact solves on `parameters`.
    pub fn performance(&self, parameters: &[Vec<f64>]) -> LearnResult<PerformanceReport> {
        let (encoding, learner) = self.trained()?;
        if parameters.is_empty() {
            return Err(LearnError::InvalidData("no test parameters".to_string()));
        }
        let settings = &self.settings.filter;
        log::info!("Evaluating performance on {} samples", parameters.len());

        let start = Instant::now();
        let candidates = learner.predict(parameters)?;
        let predict_ms = elapsed_ms(start) / parameters.len() as f64;

        let indices: Vec<usize> = (0..parameters.len()).collect();
        let records = dispatch(settings, &self.oracle, &indices, |worker, i| {
            worker.populate(&parameters[i])?;

            let start = Instant::now();
            let exact = worker.solve_exact()?;
            let exact_time_ms = elapsed_ms(start);

            let start = Instant::now();
            let chosen =
                Self::solve_candidates(worker, encoding, &candidates[i], settings.infeas_tol)?;
            let time_ms = predict_ms + elapsed_ms(start);

            let (cost, infeasibility, same_strategy) = match chosen {
                Some((k, r)) => (
                    r.cost,
                    r.infeasibility,
                    encoding[candidates[i][k]] == exact.strategy,
                ),
                None => (f64::INFINITY, f64::INFINITY, false),
            };
            Ok(TestRecord {
                exact_cost: exact.cost,
                cost,
                infeasibility,
                same_strategy,
                time_ms,
                exact_time_ms,
            })
        })?;

        let n = records.len() as f64;
        let mut correct = 0usize;
        let mut same = 0usize;
        let mut n_infeasible = 0usize;
        let mut subopt_sum = 0.0;
        let mut subopt_max = 0.0_f64;
        let mut infeas_sum = 0.0;
        let mut infeas_max = 0.0_f64;
        let mut time_sum = 0.0;
        let mut exact_time_sum = 0.0;

        for (_, r) in &records {
            infeas_sum += r.infeasibility;
            infeas_max = infeas_max.max(r.infeasibility);
            time_sum += r.time_ms;
            exact_time_sum += r.exact_time_ms;
            if r.same_strategy {
                same += 1;
            }

            if r.infeasibility <= settings.infeas_tol {
                let s = degradation(r.cost, r.exact_cost, settings.division_tol);
                subopt_sum += s;
                subopt_max = subopt_max.max(s);
                if s <= self.settings.accuracy_tol {
                    correct += 1;
                }
            } else {
                n_infeasible += 1;
            }
        }

        let n_feasible = records.len() - n_infeasible;
        let report = PerformanceReport {
            learner: learner.kind(),
            n_train: learner.n_train(),
            n_test: records.len(),
            n_strategies: encoding.len(),
            n_best: learner.n_best(),
            accuracy: correct as f64 / n,
            strategy_accuracy: same as f64 / n,
            mean_suboptimality: if n_feasible > 0 {
                subopt_sum / n_feasible as f64
            } else {
                0.0
            },
            max_suboptimality: subopt_max,
            mean_infeasibility: infeas_sum / n,
            max_infeasibility: infeas_max,
            n_infeasible,
            mean_time_ms: time_sum / n,
            mean_exact_time_ms: exact_time_sum / n,
        };

        log::info!(
            "Accuracy {:.2}%, mean suboptimality {:.2e}, {} infeasible",
            100.0 * report.accuracy,
            report.mean_suboptimality,
            report.n_infeasible
        );
        Ok(report)
    }
}

/// `<path>_strategies`, stored next to the learner model.
fn strategies_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push("_strategies");
    PathBuf::from(os)
}

impl<O> StrategyOptimizer<O>
where
    O: ProblemOracle,
    O::Strategy: Serialize + DeserializeOwned,
{
    /// Write the learner to `<path>.json` and the strategies to
    /// `<path>_strategies.json`.
    pub fn save(&self, path: &Path) -> LearnResult<()> {
        let (encoding, learner) = self.trained()?;
        learner.save(path)?;
        save_json(
            &strategies_path(path),
            &SavedStrategies {
                learner: learner.kind(),
                n_input: self.oracle.num_parameters(),
                strategies: encoding.iter().cloned().collect(),
            },
        )
    }

    /// Restore an optimizer written by [`StrategyOptimizer::save`].
    ///
    /// The stored backend wins over the one in `settings`.
    pub fn load(oracle: O, settings: OptimizerSettings, path: &Path) -> LearnResult<Self> {
        let saved: SavedStrategies<O::Strategy> = load_json(&strategies_path(path))?;
        if saved.n_input != oracle.num_parameters() {
            return Err(LearnError::InvalidData(format!(
                "saved model expects {} parameters, oracle has {}",
                saved.n_input,
                oracle.num_parameters()
            )));
        }

        let mut settings = settings;
        if settings.learner.kind() != saved.learner {
            let n_best = settings.learner.n_best();
            settings.learner = LearnerConfig::for_kind(saved.learner).with_n_best(n_best);
        }
        let mut opt = Self::new(oracle, settings)?;

        let encoding = StrategyEncoding::from_unique(saved.strategies)?;
        let mut learner = build_learner(&opt.settings.learner, saved.n_input, encoding.len())?;
        learner.load(path)?;
        if learner.n_classes() != encoding.len() {
            return Err(LearnError::InvalidData(format!(
                "saved model scores {} strategies, strategy file holds {}",
                learner.n_classes(),
                encoding.len()
            )));
        }

        opt.encoding = Some(encoding);
        opt.learner = Some(learner);
        Ok(opt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(cost: f64, infeasibility: f64) -> StrategySolve {
        StrategySolve {
            cost,
            infeasibility,
        }
    }

    #[test]
    fn test_choose_cheapest_feasible() {
        let r = [s(1.0, 1.0), s(3.0, 0.0), s(2.0, 1e-6), s(2.0, 0.0)];
        assert_eq!(choose_candidate(&r, 1e-4), Some(2));
    }

    #[test]
    fn test_choose_least_infeasible() {
        let r = [s(1.0, 0.5), s(0.0, 0.2), s(5.0, 0.3)];
        assert_eq!(choose_candidate(&r, 1e-4), Some(1));
        assert_eq!(choose_candidate(&[], 1e-4), None);
        assert_eq!(choose_candidate(&[StrategySolve::failed()], 1e-4), Some(0));
    }

    #[test]
    fn test_settings_json() {
        let settings: OptimizerSettings = serde_json::from_str(
            r#"{ "learner": { "learner": "neural_net", "epochs": 5 }, "run_filter": false }"#,
        )
        .unwrap();
        assert!(!settings.run_filter);
        assert_eq!(settings.learner.kind(), LearnerKind::NeuralNet);
        assert_eq!(settings.filter.infeas_tol, 1e-4);
    }

    #[test]
    fn test_strategies_path() {
        assert_eq!(
            strategies_path(Path::new("dir/model")),
            PathBuf::from("dir/model_strategies")
        );
    }
}
