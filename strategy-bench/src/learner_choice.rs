use clap::ValueEnum;
use strategy_learn::{LearnerConfig, LearnerKind};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LearnerChoice {
    BoostedTrees,
    NeuralNet,
    DecisionTree,
}

impl LearnerChoice {
    pub fn kind(self) -> LearnerKind {
        match self {
            LearnerChoice::BoostedTrees => LearnerKind::BoostedTrees,
            LearnerChoice::NeuralNet => LearnerKind::NeuralNet,
            LearnerChoice::DecisionTree => LearnerKind::DecisionTree,
        }
    }

    /// Default configuration of the chosen backend.
    pub fn config(self, n_best: usize) -> LearnerConfig {
        LearnerConfig::for_kind(self.kind()).with_n_best(n_best)
    }
}
