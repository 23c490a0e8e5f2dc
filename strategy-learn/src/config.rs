//! Learner selection and per-backend configuration.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{LearnError, LearnResult};

/// Default number of ranked candidates returned per prediction.
pub const DEFAULT_N_BEST: usize = 3;

/// Available learner backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearnerKind {
    /// Softmax gradient boosting over regression trees.
    BoostedTrees,

    /// Multilayer perceptron.
    NeuralNet,

    /// Single CART classification tree.
    DecisionTree,
}

impl LearnerKind {
    /// All backends, installed or not.
    pub const ALL: [LearnerKind; 3] = [
        LearnerKind::BoostedTrees,
        LearnerKind::NeuralNet,
        LearnerKind::DecisionTree,
    ];

    /// Whether this backend was compiled in.
    pub fn is_installed(self) -> bool {
        match self {
            LearnerKind::BoostedTrees => cfg!(feature = "boosted-trees"),
            LearnerKind::NeuralNet => cfg!(feature = "neural-net"),
            LearnerKind::DecisionTree => cfg!(feature = "decision-tree"),
        }
    }

    /// Cargo feature that enables the backend.
    pub fn feature(self) -> &'static str {
        match self {
            LearnerKind::BoostedTrees => "boosted-trees",
            LearnerKind::NeuralNet => "neural-net",
            LearnerKind::DecisionTree => "decision-tree",
        }
    }

    /// Short name.
    pub fn name(self) -> &'static str {
        match self {
            LearnerKind::BoostedTrees => "boosted_trees",
            LearnerKind::NeuralNet => "neural_net",
            LearnerKind::DecisionTree => "decision_tree",
        }
    }
}

impl fmt::Display for LearnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Gradient boosting settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostedTreesConfig {
    /// Boosting rounds (one tree per class per round)
    pub n_rounds: usize,

    /// Shrinkage applied to every tree
    pub learning_rate: f64,

    /// Maximum tree depth
    pub max_depth: usize,

    /// L2 penalty on leaf weights
    pub lambda: f64,

    /// Minimum loss reduction to split
    pub gamma: f64,

    /// Minimum hessian sum in a leaf
    pub min_child_weight: f64,

    /// Ranked candidates per prediction
    pub n_best: usize,
}

impl Default for BoostedTreesConfig {
    fn default() -> Self {
        Self {
            n_rounds: 50,
            learning_rate: 0.3,
            max_depth: 6,
            lambda: 1.0,
            gamma: 0.0,
            min_child_weight: 1e-3,
            n_best: DEFAULT_N_BEST,
        }
    }
}

/// Neural network settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeuralNetConfig {
    /// Width of each hidden layer
    pub hidden_layers: Vec<usize>,

    /// Passes over the training set
    pub epochs: usize,

    /// Mini-batch size
    pub batch_size: usize,

    /// AdamW step size
    pub learning_rate: f64,

    /// Seed for initialization and shuffling
    pub seed: u64,

    /// Ranked candidates per prediction
    pub n_best: usize,
}

impl Default for NeuralNetConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![64, 64],
            epochs: 200,
            batch_size: 32,
            learning_rate: 1e-3,
            seed: 0,
            n_best: DEFAULT_N_BEST,
        }
    }
}

/// Decision tree settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionTreeConfig {
    /// Maximum tree depth
    pub max_depth: usize,

    /// Minimum number of samples per leaf
    pub min_samples_leaf: usize,

    /// Ranked candidates per prediction
    pub n_best: usize,
}

impl Default for DecisionTreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            min_samples_leaf: 1,
            n_best: DEFAULT_N_BEST,
        }
    }
}

/// Learner configuration, tagged by backend.
///
/// ```json
/// { "learner": "decision_tree", "max_depth": 8 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "learner", rename_all = "snake_case")]
pub enum LearnerConfig {
    /// Gradient boosted trees
    BoostedTrees(BoostedTreesConfig),

    /// Multilayer perceptron
    NeuralNet(NeuralNetConfig),

    /// Single classification tree
    DecisionTree(DecisionTreeConfig),
}

impl Default for LearnerConfig {
    fn default() -> Self {
        LearnerConfig::BoostedTrees(BoostedTreesConfig::default())
    }
}

impl LearnerConfig {
    /// Default configuration for `kind`.
    pub fn for_kind(kind: LearnerKind) -> Self {
        match kind {
            LearnerKind::BoostedTrees => LearnerConfig::BoostedTrees(Default::default()),
            LearnerKind::NeuralNet => LearnerConfig::NeuralNet(Default::default()),
            LearnerKind::DecisionTree => LearnerConfig::DecisionTree(Default::default()),
        }
    }

    /// Backend this configuration selects.
    pub fn kind(&self) -> LearnerKind {
        match self {
            LearnerConfig::BoostedTrees(_) => LearnerKind::BoostedTrees,
            LearnerConfig::NeuralNet(_) => LearnerKind::NeuralNet,
            LearnerConfig::DecisionTree(_) => LearnerKind::DecisionTree,
        }
    }

    /// Requested number of ranked candidates.
    pub fn n_best(&self) -> usize {
        match self {
            LearnerConfig::BoostedTrees(c) => c.n_best,
            LearnerConfig::NeuralNet(c) => c.n_best,
            LearnerConfig::DecisionTree(c) => c.n_best,
        }
    }

    /// Set the number of ranked candidates.
    pub fn with_n_best(mut self, n_best: usize) -> Self {
        match &mut self {
            LearnerConfig::BoostedTrees(c) => c.n_best = n_best,
            LearnerConfig::NeuralNet(c) => c.n_best = n_best,
            LearnerConfig::DecisionTree(c) => c.n_best = n_best,
        }
        self
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> LearnResult<()> {
        let invalid = |msg: String| Err(LearnError::InvalidConfig(msg));

        if self.n_best() == 0 {
            return invalid("n_best must be at least 1".to_string());
        }

        match self {
            LearnerConfig::BoostedTrees(c) => {
                if c.n_rounds == 0 {
                    return invalid("n_rounds must be at least 1".to_string());
                }
                if !(c.learning_rate > 0.0 && c.learning_rate <= 1.0) {
                    return invalid(format!(
                        "learning_rate must lie in (0, 1], got {}",
                        c.learning_rate
                    ));
                }
                if !(c.lambda >= 0.0) || !(c.gamma >= 0.0) || !(c.min_child_weight >= 0.0) {
                    return invalid("lambda, gamma and min_child_weight must be nonnegative".to_string());
                }
            }
            LearnerConfig::NeuralNet(c) => {
                if c.epochs == 0 || c.batch_size == 0 {
                    return invalid("epochs and batch_size must be at least 1".to_string());
                }
                if c.hidden_layers.iter().any(|&w| w == 0) {
                    return invalid("hidden layers must have positive width".to_string());
                }
                if !(c.learning_rate > 0.0) {
                    return invalid(format!(
                        "learning_rate must be positive, got {}",
                        c.learning_rate
                    ));
                }
            }
            LearnerConfig::DecisionTree(c) => {
                if c.min_samples_leaf == 0 {
                    return invalid("min_samples_leaf must be at least 1".to_string());
                }
            }
        }

        Ok(())
    }
}
