//! Learner trait, construction and shared helpers.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::{LearnerConfig, LearnerKind};
use crate::error::{LearnError, LearnResult};

/// Strategy classifier.
///
/// Labels are indices into the strategy encoding the learner was trained
/// on. Predictions rank the most likely labels per input row.
pub trait Learner: Send + Sync {
    /// Backend of this learner.
    fn kind(&self) -> LearnerKind;

    /// Short name.
    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Fit the model to `features` (one row per sample) and `labels`.
    fn train(&mut self, features: &[Vec<f64>], labels: &[usize]) -> LearnResult<()>;

    /// Class probabilities per row.
    fn predict_proba(&self, features: &[Vec<f64>]) -> LearnResult<Vec<Vec<f64>>>;

    /// Number of candidates returned per row by [`Learner::predict`].
    fn n_best(&self) -> usize;

    /// Number of samples the model was trained on.
    fn n_train(&self) -> usize;

    /// Number of labels the model scores.
    fn n_classes(&self) -> usize;

    /// Ranked candidate labels per row, most likely first.
    fn predict(&self, features: &[Vec<f64>]) -> LearnResult<Vec<Vec<usize>>> {
        let n_best = self.n_best();
        Ok(self
            .predict_proba(features)?
            .iter()
            .map(|p| rank_top(p, n_best))
            .collect())
    }

    /// Write the model to `<path>.json`.
    fn save(&self, path: &Path) -> LearnResult<()>;

    /// Replace the model with the one stored at `<path>.json`.
    fn load(&mut self, path: &Path) -> LearnResult<()>;
}

/// Build the learner selected by `config` for `n_input` features and
/// `n_classes` labels.
///
/// Fails with [`LearnError::NotInstalled`] if the backend was compiled out.
pub fn build_learner(
    config: &LearnerConfig,
    n_input: usize,
    n_classes: usize,
) -> LearnResult<Box<dyn Learner>> {
    let kind = config.kind();
    if !kind.is_installed() {
        return Err(LearnError::NotInstalled(kind));
    }
    config.validate()?;
    if n_classes == 0 {
        return Err(LearnError::InvalidData("no classes to learn".to_string()));
    }

    let n_best = config.n_best().min(n_classes);

    match config {
        #[cfg(feature = "boosted-trees")]
        LearnerConfig::BoostedTrees(c) => Ok(Box::new(crate::backends::boosted::BoostedTrees::new(
            c.clone(),
            n_input,
            n_classes,
            n_best,
        ))),
        #[cfg(feature = "neural-net")]
        LearnerConfig::NeuralNet(c) => Ok(Box::new(crate::backends::neural_net::NeuralNet::new(
            c.clone(),
            n_input,
            n_classes,
            n_best,
        ))),
        #[cfg(feature = "decision-tree")]
        LearnerConfig::DecisionTree(c) => Ok(Box::new(
            crate::backends::decision_tree::DecisionTree::new(c.clone(), n_input, n_classes, n_best),
        )),
        #[allow(unreachable_patterns)]
        _ => Err(LearnError::NotInstalled(kind)),
    }
}

/// Indices of the `n_best` largest probabilities, largest first.
///
/// Equal probabilities keep ascending index order.
pub fn rank_top(probs: &[f64], n_best: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]));
    order.truncate(n_best);
    order
}

/// Index of the largest probability.
pub fn argmax(probs: &[f64]) -> usize {
    rank_top(probs, 1).first().copied().unwrap_or(0)
}

/// Numerically stable softmax, in place.
pub fn softmax(scores: &mut [f64]) {
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for s in scores.iter_mut() {
        *s = (*s - max).exp();
        sum += *s;
    }
    for s in scores.iter_mut() {
        *s /= sum;
    }
}

/// Check shapes and label range of a training set.
pub fn check_training_data(
    features: &[Vec<f64>],
    labels: &[usize],
    n_input: usize,
    n_classes: usize,
) -> LearnResult<()> {
    if features.is_empty() {
        return Err(LearnError::InvalidData("empty training set".to_string()));
    }
    if features.len() != labels.len() {
        return Err(LearnError::InvalidData(format!(
            "{} feature rows but {} labels",
            features.len(),
            labels.len()
        )));
    }
    check_features(features, n_input)?;
    if let Some(&l) = labels.iter().find(|&&l| l >= n_classes) {
        return Err(LearnError::InvalidData(format!(
            "label {} out of range for {} classes",
            l, n_classes
        )));
    }
    Ok(())
}

/// Check that every row has `n_input` finite entries.
pub fn check_features(features: &[Vec<f64>], n_input: usize) -> LearnResult<()> {
    for (i, row) in features.iter().enumerate() {
        if row.len() != n_input {
            return Err(LearnError::InvalidData(format!(
                "row {} has {} features, expected {}",
                i,
                row.len(),
                n_input
            )));
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(LearnError::InvalidData(format!("row {} is not finite", i)));
        }
    }
    Ok(())
}

/// `<path>.json`.
pub fn json_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".json");
    PathBuf::from(os)
}

/// Serialize `value` to `<path>.json`.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> LearnResult<()> {
    let file = json_path(path);
    if let Some(dir) = file.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(&file, json)?;
    Ok(())
}

/// Deserialize `<path>.json`.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> LearnResult<T> {
    let file = json_path(path);
    if !file.is_file() {
        return Err(LearnError::MissingFile(file));
    }
    let json = fs::read_to_string(&file)?;
    Ok(serde_json::from_str(&json)?)
}

/// Backend tag every persisted model starts with.
#[derive(Deserialize)]
struct ModelHeader {
    kind: LearnerKind,
}

/// Deserialize a model of backend `expected` from `<path>.json`.
///
/// The backend tag is read first, so a file written by another backend
/// fails with [`LearnError::WrongModel`] rather than a missing field.
pub fn load_model<T: DeserializeOwned>(path: &Path, expected: LearnerKind) -> LearnResult<T> {
    let value: serde_json::Value = load_json(path)?;
    let header = ModelHeader::deserialize(&value)?;
    if header.kind != expected {
        return Err(LearnError::WrongModel {
            expected,
            found: header.kind,
        });
    }
    Ok(serde_json::from_value(value)?)
}
