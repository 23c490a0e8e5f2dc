//! CART classification tree.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::backends::tree::{Gini, Tree, TreeBuilder};
use crate::config::{DecisionTreeConfig, LearnerKind};
use crate::error::{LearnError, LearnResult};
use crate::learner::{check_features, check_training_data, load_model, save_json, Learner};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Model {
    kind: LearnerKind,
    n_input: usize,
    n_classes: usize,
    n_train: usize,
    tree: Tree,
}

/// Single classification tree grown with the Gini criterion.
pub struct DecisionTree {
    config: DecisionTreeConfig,
    n_input: usize,
    n_classes: usize,
    n_best: usize,
    model: Option<Model>,
}

impl DecisionTree {
    /// Untrained tree for `n_input` features and `n_classes` labels.
    pub fn new(config: DecisionTreeConfig, n_input: usize, n_classes: usize, n_best: usize) -> Self {
        Self {
            config,
            n_input,
            n_classes,
            n_best,
            model: None,
        }
    }

    /// Trained tree, if any.
    pub fn tree(&self) -> Option<&Tree> {
        self.model.as_ref().map(|m| &m.tree)
    }
}

impl Learner for DecisionTree {
    fn kind(&self) -> LearnerKind {
        LearnerKind::DecisionTree
    }

    fn train(&mut self, features: &[Vec<f64>], labels: &[usize]) -> LearnResult<()> {
        check_training_data(features, labels, self.n_input, self.n_classes)?;
        log::info!(
            "Training decision tree on {} samples, {} classes (max depth {})",
            features.len(),
            self.n_classes,
            self.config.max_depth
        );

        let criterion = Gini {
            labels,
            n_classes: self.n_classes,
            min_samples_leaf: self.config.min_samples_leaf,
        };
        let builder = TreeBuilder {
            max_depth: self.config.max_depth,
            min_gain: 1e-12,
        };
        let tree = builder.build(features, (0..features.len()).collect(), &criterion);
        log::debug!("Tree depth {}, {} leaves", tree.depth(), tree.n_leaves());

        self.model = Some(Model {
            kind: LearnerKind::DecisionTree,
            n_input: self.n_input,
            n_classes: self.n_classes,
            n_train: features.len(),
            tree,
        });
        Ok(())
    }

    fn predict_proba(&self, features: &[Vec<f64>]) -> LearnResult<Vec<Vec<f64>>> {
        let model = self.model.as_ref().ok_or(LearnError::NotTrained)?;
        check_features(features, model.n_input)?;
        Ok(features
            .iter()
            .map(|x| model.tree.predict(x).to_vec())
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
        let model: Model = load_model(path, LearnerKind::DecisionTree)?;
        self.n_input = model.n_input;
        self.n_classes = model.n_classes;
        self.n_best = self.n_best.min(model.n_classes);
        self.model = Some(model);
        Ok(())
    }
}
