//! Strategy encoding and label assignment.

use std::collections::HashMap;
use std::hash::Hash;

use crate::error::{CoreError, CoreResult};

/// Ordered set of unique strategies, addressed by index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyEncoding<S> {
    strategies: Vec<S>,
}

impl<S: Clone + Eq + Hash> StrategyEncoding<S> {
    /// Build an encoding from raw per-sample strategies.
    ///
    /// Strategies are numbered in order of first appearance. Returns the
    /// encoding and one label per input strategy.
    pub fn encode(strategies: &[S]) -> (Self, LabelAssignment) {
        let mut index: HashMap<&S, usize> = HashMap::new();
        let mut unique = Vec::new();
        let mut labels = Vec::with_capacity(strategies.len());

        for s in strategies {
            let idx = *index.entry(s).or_insert_with(|| {
                unique.push(s.clone());
                unique.len() - 1
            });
            labels.push(idx);
        }

        (Self { strategies: unique }, LabelAssignment::from_indices(labels))
    }

    /// Wrap an already-unique list of strategies.
    pub fn from_unique(strategies: Vec<S>) -> CoreResult<Self> {
        let mut seen = HashMap::with_capacity(strategies.len());
        for (i, s) in strategies.iter().enumerate() {
            if let Some(j) = seen.insert(s, i) {
                return Err(CoreError::Precondition(format!(
                    "strategies {} and {} are identical",
                    j, i
                )));
            }
        }
        Ok(Self { strategies })
    }

    /// Index of `strategy`, if present.
    pub fn index_of(&self, strategy: &S) -> Option<usize> {
        self.strategies.iter().position(|s| s == strategy)
    }

    /// New encoding with the given entries, re-indexed from 0 in the given order.
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            strategies: indices.iter().map(|&i| self.strategies[i].clone()).collect(),
        }
    }
}

impl<S> StrategyEncoding<S> {
    /// Number of strategies.
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// True if there are no strategies.
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Strategy at `index`.
    pub fn get(&self, index: usize) -> Option<&S> {
        self.strategies.get(index)
    }

    /// Iterate over strategies in index order.
    pub fn iter(&self) -> std::slice::Iter<'_, S> {
        self.strategies.iter()
    }

    /// Consume into the underlying list.
    pub fn into_vec(self) -> Vec<S> {
        self.strategies
    }
}

impl<S> std::ops::Index<usize> for StrategyEncoding<S> {
    type Output = S;

    fn index(&self, index: usize) -> &S {
        &self.strategies[index]
    }
}

/// Per-sample strategy index, or `None` while a sample is discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelAssignment {
    labels: Vec<Option<usize>>,
}

impl LabelAssignment {
    /// Fully assigned labels.
    pub fn from_indices(labels: Vec<usize>) -> Self {
        Self {
            labels: labels.into_iter().map(Some).collect(),
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// True if there are no samples.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Label of sample `i`.
    pub fn get(&self, i: usize) -> Option<usize> {
        self.labels[i]
    }

    /// Assign sample `i`.
    pub fn set(&mut self, i: usize, label: Option<usize>) {
        self.labels[i] = label;
    }

    /// Labels in sample order.
    pub fn as_slice(&self) -> &[Option<usize>] {
        &self.labels
    }

    /// Positions of unassigned samples, ascending.
    pub fn discarded(&self) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter_map(|(i, l)| l.is_none().then_some(i))
            .collect()
    }

    /// Relabel through `new_index` (old index → new index or discarded).
    pub fn remap(&self, new_index: &[Option<usize>]) -> Self {
        Self {
            labels: self
                .labels
                .iter()
                .map(|l| l.and_then(|old| new_index.get(old).copied().flatten()))
                .collect(),
        }
    }

    /// Sample count per strategy.
    ///
    /// Fails if a sample is unassigned, a label is out of range, or some
    /// strategy of the encoding has no sample.
    pub fn counts(&self, n_strategies: usize) -> CoreResult<Vec<usize>> {
        let mut counts = vec![0usize; n_strategies];
        for (i, label) in self.labels.iter().enumerate() {
            match label {
                Some(l) if *l < n_strategies => counts[*l] += 1,
                Some(l) => {
                    return Err(CoreError::Precondition(format!(
                        "sample {} has label {} outside encoding of size {}",
                        i, l, n_strategies
                    )))
                }
                None => {
                    return Err(CoreError::Precondition(format!(
                        "sample {} is unassigned",
                        i
                    )))
                }
            }
        }

        let distinct = counts.iter().filter(|&&c| c > 0).count();
        if distinct != n_strategies {
            return Err(CoreError::Precondition(format!(
                "labels contain {} distinct strategies, encoding has {}",
                distinct, n_strategies
            )));
        }

        Ok(counts)
    }

    /// Plain indices; fails if any sample is unassigned.
    pub fn to_indices(&self) -> CoreResult<Vec<usize>> {
        self.labels
            .iter()
            .enumerate()
            .map(|(i, l)| {
                l.ok_or_else(|| CoreError::Precondition(format!("sample {} is unassigned", i)))
            })
            .collect()
    }
}
