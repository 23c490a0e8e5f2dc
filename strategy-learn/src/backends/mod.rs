//! Learner backends, one per cargo feature.

#[cfg(any(feature = "boosted-trees", feature = "decision-tree"))]
pub mod tree;

#[cfg(feature = "boosted-trees")]
pub mod boosted;

#[cfg(feature = "decision-tree")]
pub mod decision_tree;

#[cfg(feature = "neural-net")]
pub mod neural_net;
