//! Softmax gradient boosting.
//!
//! Each round fits one regression tree per class to the Newton step of the
//! multiclass log loss. Class scores start at the log prior and every tree
//! is shrunk by the learning rate:
//!
//! ```text
//! F_k(x) = log p_k + η Σ_t f_tk(x),    P(k | x) = softmax(F(x))_k
//! ```

use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::backends::tree::{Newton, Tree, TreeBuilder};
use crate::config::{BoostedTreesConfig, LearnerKind};
use crate::error::{LearnError, LearnResult};
use crate::learner::{check_features, check_training_data, load_model, save_json, softmax, Learner};

/// Floor on per-sample hessians.
const MIN_HESSIAN: f64 = 1e-6;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Model {
    kind: LearnerKind,
    n_input: usize,
    n_classes: usize,
    n_train: usize,
    learning_rate: f64,
    base_score: Vec<f64>,
    /// `rounds[t][k]` is the tree of class `k` in round `t`
    rounds: Vec<Vec<Tree>>,
}

impl Model {
    fn scores(&self, x: &[f64]) -> Vec<f64> {
        let mut f = self.base_score.clone();
        for round in &self.rounds {
            for (k, tree) in round.iter().enumerate() {
                f[k] += self.learning_rate * tree.predict(x)[0];
            }
        }
        f
    }
}

/// Gradient boosted trees with a softmax objective.
pub struct BoostedTrees {
    config: BoostedTreesConfig,
    n_input: usize,
    n_classes: usize,
    n_best: usize,
    model: Option<Model>,
}

impl BoostedTrees {
    /// Untrained booster for `n_input` features and `n_classes` labels.
    pub fn new(config: BoostedTreesConfig, n_input: usize, n_classes: usize, n_best: usize) -> Self {
        Self {
            config,
            n_input,
            n_classes,
            n_best,
            model: None,
        }
    }

    /// Number of boosting rounds in the trained model.
    pub fn n_rounds(&self) -> usize {
        self.model.as_ref().map_or(0, |m| m.rounds.len())
    }
}

impl Learner for BoostedTrees {
    fn kind(&self) -> LearnerKind {
        LearnerKind::BoostedTrees
    }

    fn train(&mut self, features: &[Vec<f64>], labels: &[usize]) -> LearnResult<()> {
        check_training_data(features, labels, self.n_input, self.n_classes)?;
        let n = features.len();
        let k = self.n_classes;
        let config = &self.config;
        log::info!(
            "Training boosted trees on {} samples, {} classes ({} rounds, depth {})",
            n,
            k,
            config.n_rounds,
            config.max_depth
        );

        // Log prior, with one pseudo-count per class
        let mut counts = vec![1.0; k];
        for &l in labels {
            counts[l] += 1.0;
        }
        let total: f64 = counts.iter().sum();
        let base_score: Vec<f64> = counts.iter().map(|c| (c / total).ln()).collect();

        let mut scores: Vec<Vec<f64>> = vec![base_score.clone(); n];
        let builder = TreeBuilder {
            max_depth: config.max_depth,
            min_gain: 1e-12,
        };

        let mut rounds = Vec::with_capacity(config.n_rounds);
        for t in 0..config.n_rounds {
            let probs: Vec<Vec<f64>> = scores
                .iter()
                .map(|s| {
                    let mut p = s.clone();
                    softmax(&mut p);
                    p
                })
                .collect();

            let trees: Vec<Tree> = (0..k)
                .into_par_iter()
                .map(|class| {
                    let grad: Vec<f64> = (0..n)
                        .map(|i| probs[i][class] - if labels[i] == class { 1.0 } else { 0.0 })
                        .collect();
                    let hess: Vec<f64> = (0..n)
                        .map(|i| (probs[i][class] * (1.0 - probs[i][class])).max(MIN_HESSIAN))
                        .collect();
                    let criterion = Newton {
                        grad: &grad,
                        hess: &hess,
                        lambda: config.lambda,
                        gamma: config.gamma,
                        min_child_weight: config.min_child_weight,
                    };
                    builder.build(features, (0..n).collect(), &criterion)
                })
                .collect();

            for (i, x) in features.iter().enumerate() {
                for (class, tree) in trees.iter().enumerate() {
                    scores[i][class] += config.learning_rate * tree.predict(x)[0];
                }
            }
            rounds.push(trees);

            if t % 10 == 9 {
                let loss = scores
                    .iter()
                    .zip(labels)
                    .map(|(s, &l)| {
                        let mut p = s.clone();
                        softmax(&mut p);
                        -p[l].max(1e-300).ln()
                    })
                    .sum::<f64>()
                    / n as f64;
                log::debug!("Round {:>4}: log loss {:.4e}", t + 1, loss);
            }
        }

        self.model = Some(Model {
            kind: LearnerKind::BoostedTrees,
            n_input: self.n_input,
            n_classes: k,
            n_train: n,
            learning_rate: config.learning_rate,
            base_score,
            rounds,
        });
        Ok(())
    }

    fn predict_proba(&self, features: &[Vec<f64>]) -> LearnResult<Vec<Vec<f64>>> {
        let model = self.model.as_ref().ok_or(LearnError::NotTrained)?;
        check_features(features, model.n_input)?;
        Ok(features
            .iter()
            .map(|x| {
                let mut p = model.scores(x);
                softmax(&mut p);
                p
            })
            .collect())
    }

    fn n_best(&self) -> usize {
        self.n_best
    }

    fn n_train(&self) -> usize {
        self.model.as_ref().map_or(0, |m| m.n_train)
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn save(&self, path: &Path) -> LearnResult<()> {
        let model = self.model.as_ref().ok_or(LearnError::NotTrained)?;
        save_json(path, model)
    }

    fn load(&mut self, path: &Path) -> LearnResult<()> {
        let model: Model = load_model(path, LearnerKind::BoostedTrees)?;
        self.n_input = model.n_input;
        self.n_classes = model.n_classes;
        self.n_best = self.n_best.min(model.n_classes);
        self.model = Some(model);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learner::argmax;

    /// Three bands along the first feature, second feature is noise.
    fn bands() -> (Vec<Vec<f64>>, Vec<usize>) {
        let x: Vec<Vec<f64>> = (0..60)
            .map(|i| vec![i as f64 / 10.0, ((i * 7) % 11) as f64])
            .collect();
        let y = x.iter().map(|r| (r[0] / 2.0) as usize).collect();
        (x, y)
    }

    #[test]
    fn test_fits_bands() {
        let (x, y) = bands();
        let config = BoostedTreesConfig {
            n_rounds: 20,
            ..Default::default()
        };
        let mut bt = BoostedTrees::new(config, 2, 3, 3);
        bt.train(&x, &y).unwrap();
        assert_eq!(bt.n_rounds(), 20);

        let probs = bt.predict_proba(&x).unwrap();
        for (p, &label) in probs.iter().zip(&y) {
            assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9);
            assert_eq!(argmax(p), label);
        }
    }

    #[test]
    fn test_single_class() {
        let x = vec![vec![0.0], vec![1.0]];
        let mut bt = BoostedTrees::new(BoostedTreesConfig::default(), 1, 1, 1);
        bt.train(&x, &[0, 0]).unwrap();
        assert_eq!(bt.predict(&x).unwrap(), vec![vec![0], vec![0]]);
    }

    #[test]
    fn test_feature_mismatch() {
        let (x, y) = bands();
        let mut bt = BoostedTrees::new(BoostedTreesConfig::default(), 3, 3, 1);
        assert!(matches!(bt.train(&x, &y), Err(LearnError::InvalidData(_))));
    }
}
