//! Every backend on a toy classification problem, plus persistence.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use strategy_learn::{
    build_learner, BoostedTreesConfig, DecisionTreeConfig, LearnError, LearnerConfig, LearnerKind,
    NeuralNetConfig,
};

/// Three well separated Gaussian blobs in the plane.
fn blobs(per_class: usize, seed: u64) -> (Vec<Vec<f64>>, Vec<usize>) {
    let centers = [(-4.0, 0.0), (4.0, 0.0), (0.0, 5.0)];
    let noise = Normal::new(0.0, 0.5).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let mut x = Vec::new();
    let mut y = Vec::new();
    for (label, &(cx, cy)) in centers.iter().enumerate() {
        for _ in 0..per_class {
            x.push(vec![cx + noise.sample(&mut rng), cy + noise.sample(&mut rng)]);
            y.push(label);
        }
    }
    (x, y)
}

fn configs() -> Vec<LearnerConfig> {
    vec![
        LearnerConfig::BoostedTrees(BoostedTreesConfig {
            n_rounds: 10,
            ..Default::default()
        }),
        LearnerConfig::NeuralNet(NeuralNetConfig {
            hidden_layers: vec![16],
            epochs: 100,
            batch_size: 16,
            learning_rate: 1e-2,
            ..Default::default()
        }),
        LearnerConfig::DecisionTree(DecisionTreeConfig::default()),
    ]
}

#[test]
fn test_learners_fit_blobs() {
    let (x, y) = blobs(20, 1);
    let (x_test, y_test) = blobs(10, 2);

    for config in configs() {
        let mut learner = build_learner(&config, 2, 3).unwrap();
        learner.train(&x, &y).unwrap();
        assert_eq!(learner.n_train(), 60);
        assert_eq!(learner.n_best(), 3);

        let ranked = learner.predict(&x_test).unwrap();
        let hits = ranked
            .iter()
            .zip(&y_test)
            .filter(|&(r, &label)| r[0] == label)
            .count();
        assert!(
            hits >= 27,
            "{} classified {} of 30 held-out points",
            learner.name(),
            hits
        );

        // Candidates are a permutation of the classes
        for r in &ranked {
            let mut sorted = r.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, vec![0, 1, 2]);
        }
    }
}

#[test]
fn test_learners_save_load() {
    let (x, y) = blobs(15, 3);
    let dir = tempfile::tempdir().unwrap();

    for config in configs() {
        let path = dir.path().join(config.kind().name());
        let mut learner = build_learner(&config, 2, 3).unwrap();
        learner.train(&x, &y).unwrap();
        learner.save(&path).unwrap();
        assert!(dir
            .path()
            .join(format!("{}.json", config.kind().name()))
            .is_file());

        let mut restored = build_learner(&config, 2, 3).unwrap();
        restored.load(&path).unwrap();
        assert_eq!(restored.n_train(), learner.n_train());

        let before = learner.predict_proba(&x).unwrap();
        let after = restored.predict_proba(&x).unwrap();
        for (p, q) in before.iter().zip(&after) {
            for (a, b) in p.iter().zip(q) {
                assert!((a - b).abs() < 1e-9);
            }
        }
    }
}

#[test]
fn test_load_wrong_backend() {
    let (x, y) = blobs(5, 4);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model");

    let tree_config = LearnerConfig::DecisionTree(DecisionTreeConfig::default());
    let mut tree = build_learner(&tree_config, 2, 3).unwrap();
    tree.train(&x, &y).unwrap();
    tree.save(&path).unwrap();

    let mut booster = build_learner(&LearnerConfig::default(), 2, 3).unwrap();
    match booster.load(&path) {
        Err(LearnError::WrongModel { expected, found }) => {
            assert_eq!(expected, LearnerKind::BoostedTrees);
            assert_eq!(found, LearnerKind::DecisionTree);
        }
        other => panic!("expected WrongModel, got {:?}", other.err()),
    }
}

#[test]
fn test_load_missing_model() {
    let dir = tempfile::tempdir().unwrap();
    let mut learner = build_learner(&LearnerConfig::default(), 2, 3).unwrap();
    assert!(matches!(
        learner.load(&dir.path().join("absent")),
        Err(LearnError::MissingFile(_))
    ));
}

#[test]
fn test_n_best_clamped_to_classes() {
    let config = LearnerConfig::DecisionTree(DecisionTreeConfig::default()).with_n_best(10);
    let learner = build_learner(&config, 2, 4).unwrap();
    assert_eq!(learner.n_best(), 4);

    let (x, y) = blobs(5, 5);
    let mut single = build_learner(&config.with_n_best(2), 2, 3).unwrap();
    single.train(&x, &y).unwrap();
    assert!(single.predict(&x).unwrap().iter().all(|r| r.len() == 2));
}
