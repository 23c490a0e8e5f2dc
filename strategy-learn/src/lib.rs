//! Learning optimal strategies of parametric problems.
//!
//! A [`StrategyOptimizer`] solves training parameters exactly, filters the
//! resulting strategies and trains a classifier that maps a parameter to a
//! ranked list of candidate strategies. At prediction time each candidate is
//! solved and the cheapest feasible one wins.
//!
//! Backends are selected by [`LearnerConfig`] and compiled in by feature:
//!
//! | Feature         | Learner                               |
//! |-----------------|---------------------------------------|
//! | `boosted-trees` | softmax gradient boosting             |
//! | `neural-net`    | multilayer perceptron (candle, AdamW) |
//! | `decision-tree` | CART with Gini impurity               |

#![warn(missing_docs)]

pub mod backends;
pub mod config;
pub mod error;
pub mod learner;
pub mod optimizer;

pub use config::{
    BoostedTreesConfig, DecisionTreeConfig, LearnerConfig, LearnerKind, NeuralNetConfig,
    DEFAULT_N_BEST,
};
pub use error::{LearnError, LearnResult};
pub use learner::{build_learner, rank_top, Learner};
pub use optimizer::{
    choose_candidate, OptimizerSettings, PerformanceReport, PredictedSolve, StrategyOptimizer,
    TrainSummary,
};
