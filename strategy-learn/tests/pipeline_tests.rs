//! Train/predict pipeline on small portfolio problems.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use strategy_core::{FilterSettings, ProblemOracle};
use strategy_learn::{
    BoostedTreesConfig, DecisionTreeConfig, LearnError, LearnerConfig, LearnerKind,
    OptimizerSettings, StrategyOptimizer,
};
use strategy_qp::{portfolio, uniform_ball, QpOracle, QpSettings};

fn setup(seed: u64, n: usize) -> (QpOracle, Vec<Vec<f64>>) {
    let pf = portfolio(1, 1.0, seed);
    let oracle = QpOracle::new(pf.problem.clone(), QpSettings::default()).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(seed + 100);
    let thetas = uniform_ball(&pf.theta_bar, pf.radius, n, &mut rng);
    (oracle, thetas)
}

/// Unfiltered decision tree that tries every known strategy.
fn exhaustive_settings() -> OptimizerSettings {
    OptimizerSettings::default()
        .with_learner(LearnerConfig::DecisionTree(DecisionTreeConfig::default()).with_n_best(1000))
        .without_filter()
}

#[test]
fn test_exhaustive_candidates_match_exact() {
    let (oracle, thetas) = setup(31, 30);
    let mut opt = StrategyOptimizer::new(oracle.clone(), exhaustive_settings()).unwrap();
    let summary = opt.train(&thetas).unwrap();

    assert_eq!(summary.n_train, 30);
    assert_eq!(summary.n_strategies, summary.n_strategies_full);
    assert!(summary.filter_status.is_none());

    // Every training strategy is a candidate, so the exact one is among them
    let mut worker = oracle.clone();
    for theta in thetas.iter().take(10) {
        worker.populate(theta).unwrap();
        let exact = worker.solve_exact().unwrap();
        let pred = opt.solve(theta).unwrap();
        assert!(pred.infeasibility <= 1e-4);
        assert!(pred.cost <= exact.cost + 1e-5 * (1.0 + exact.cost.abs()));
    }

    let report = opt.performance(&thetas).unwrap();
    assert_eq!(report.learner, LearnerKind::DecisionTree);
    assert_eq!(report.n_test, 30);
    assert_eq!(report.n_train, 30);
    assert_eq!(report.n_best, report.n_strategies);
    assert_eq!(report.n_infeasible, 0);
    assert!((0.0..=1.0).contains(&report.accuracy));
    assert!(report.max_infeasibility <= 1e-4);
}

#[test]
fn test_filtered_boosted_pipeline() {
    let (oracle, thetas) = setup(37, 50);
    let (train, test) = thetas.split_at(40);
    let settings = OptimizerSettings::default()
        .with_learner(LearnerConfig::BoostedTrees(BoostedTreesConfig {
            n_rounds: 5,
            ..Default::default()
        }))
        .with_filter(
            FilterSettings::builtin()
                .with_samples_fraction(0.7)
                .with_max_iter(5)
                .with_subopt(0.1),
        );
    let mut opt = StrategyOptimizer::new(oracle, settings).unwrap();
    let summary = opt.train(train).unwrap();

    assert!(summary.n_strategies <= summary.n_strategies_full);
    assert!(summary.n_strategies >= 1);
    if summary.n_strategies_full > 1 {
        assert!(summary.filter_status.is_some());
    }

    let report = opt.performance(test).unwrap();
    assert_eq!(report.n_test, 10);
    assert!(report.n_best <= 3);
    assert!(report.mean_time_ms >= 0.0);

    // The report serializes for the bench output
    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains("\"learner\":\"boosted_trees\""));
}

#[test]
fn test_optimizer_save_load() {
    let (oracle, thetas) = setup(41, 25);
    let mut opt = StrategyOptimizer::new(oracle.clone(), exhaustive_settings()).unwrap();
    opt.train(&thetas).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("portfolio");
    opt.save(&path).unwrap();
    assert!(dir.path().join("portfolio.json").is_file());
    assert!(dir.path().join("portfolio_strategies.json").is_file());

    // Stored backend wins over the requested one
    let restored = StrategyOptimizer::load(oracle, OptimizerSettings::default(), &path).unwrap();
    assert_eq!(
        restored.learner().map(|l| l.kind()),
        Some(LearnerKind::DecisionTree)
    );
    assert_eq!(
        restored.encoding().map(|e| e.len()),
        opt.encoding().map(|e| e.len())
    );

    for theta in thetas.iter().take(5) {
        let a = opt.solve(theta).unwrap();
        let b = restored.solve(theta).unwrap();
        assert_eq!(a.strategy, b.strategy);
        assert!((a.cost - b.cost).abs() < 1e-9);
    }
}

#[test]
fn test_load_rejects_class_count_mismatch() {
    let (oracle, thetas) = setup(59, 20);
    let mut opt = StrategyOptimizer::new(oracle.clone(), exhaustive_settings()).unwrap();
    opt.train(&thetas).unwrap();
    let n_strategies = opt.encoding().map(|e| e.len()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("portfolio");
    opt.save(&path).unwrap();

    // Learner file from a run that kept one more strategy
    let model_file = dir.path().join("portfolio.json");
    let mut model: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&model_file).unwrap()).unwrap();
    model["n_classes"] = serde_json::json!(n_strategies + 1);
    std::fs::write(&model_file, serde_json::to_string(&model).unwrap()).unwrap();

    let loaded = StrategyOptimizer::load(oracle, exhaustive_settings(), &path);
    assert!(matches!(loaded, Err(LearnError::InvalidData(_))));
}

#[test]
fn test_untrained_and_missing() {
    let (oracle, thetas) = setup(43, 3);
    let opt = StrategyOptimizer::new(oracle.clone(), OptimizerSettings::default()).unwrap();
    assert!(matches!(opt.solve(&thetas[0]), Err(LearnError::NotTrained)));
    assert!(matches!(opt.performance(&thetas), Err(LearnError::NotTrained)));

    let dir = tempfile::tempdir().unwrap();
    let loaded = StrategyOptimizer::load(oracle, OptimizerSettings::default(), &dir.path().join("none"));
    assert!(matches!(loaded, Err(LearnError::MissingFile(_))));
}

#[test]
fn test_invalid_settings() {
    let (oracle, _) = setup(47, 1);
    let settings = OptimizerSettings {
        accuracy_tol: -1.0,
        ..Default::default()
    };
    assert!(matches!(
        StrategyOptimizer::new(oracle, settings),
        Err(LearnError::InvalidConfig(_))
    ));
}

#[cfg(not(feature = "neural-net"))]
#[test]
fn test_neural_net_not_installed() {
    let (oracle, _) = setup(53, 1);
    let settings = OptimizerSettings::default()
        .with_learner(LearnerConfig::for_kind(LearnerKind::NeuralNet));
    assert!(matches!(
        StrategyOptimizer::new(oracle, settings),
        Err(LearnError::NotInstalled(LearnerKind::NeuralNet))
    ));
}
