//! Axis-aligned binary trees shared by the tree backends.
//!
//! Growth is greedy: at each node every feature is scanned in sorted order
//! and the split with the largest criterion gain is taken. The criterion
//! decides what a node accumulates and what a leaf stores.

use serde::{Deserialize, Serialize};

/// One tree node. Children are indices into [`Tree::nodes`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Internal node: go left if `x[feature] <= threshold`.
    Split {
        /// Feature index
        feature: usize,
        /// Split point
        threshold: f64,
        /// Left child
        left: usize,
        /// Right child
        right: usize,
    },
    /// Terminal node.
    Leaf {
        /// Leaf payload (class distribution or boosting weight)
        value: Vec<f64>,
    },
}

/// Binary tree stored as a flat node list, root at index 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    /// Nodes in creation order
    pub nodes: Vec<Node>,
}

impl Tree {
    /// Payload of the leaf reached by `x`.
    pub fn predict(&self, x: &[f64]) -> &[f64] {
        let mut i = 0;
        loop {
            match &self.nodes[i] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    i = if x[*feature] <= *threshold { *left } else { *right };
                }
                Node::Leaf { value } => return value,
            }
        }
    }

    /// Depth of the deepest leaf (a single leaf has depth 0).
    pub fn depth(&self) -> usize {
        fn walk(tree: &Tree, i: usize) -> usize {
            match &tree.nodes[i] {
                Node::Split { left, right, .. } => 1 + walk(tree, *left).max(walk(tree, *right)),
                Node::Leaf { .. } => 0,
            }
        }
        walk(self, 0)
    }

    /// Number of leaves.
    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }
}

/// Split criterion.
///
/// `score` must be additive in the sense that the gain of a split is
/// `score(left) + score(right) - score(parent)`.
pub trait Criterion {
    /// Sufficient statistics of a node.
    type Stats: Clone;

    /// Statistics of an empty node.
    fn empty(&self) -> Self::Stats;

    /// Add sample `i`.
    fn add(&self, stats: &mut Self::Stats, i: usize);

    /// Remove sample `i`.
    fn remove(&self, stats: &mut Self::Stats, i: usize);

    /// Node score.
    fn score(&self, stats: &Self::Stats) -> f64;

    /// Whether a child with these statistics is allowed.
    fn admissible(&self, stats: &Self::Stats, count: usize) -> bool;

    /// Leaf payload.
    fn leaf(&self, stats: &Self::Stats) -> Vec<f64>;
}

/// Greedy tree growth.
#[derive(Debug, Clone, Copy)]
pub struct TreeBuilder {
    /// Maximum depth
    pub max_depth: usize,

    /// Minimum gain for a split to be kept
    pub min_gain: f64,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
    /// Samples going left, in the node's sorted order for `feature`
    n_left: usize,
}

impl TreeBuilder {
    /// Grow a tree on the samples in `rows`.
    pub fn build<C: Criterion>(&self, x: &[Vec<f64>], rows: Vec<usize>, criterion: &C) -> Tree {
        let mut tree = Tree { nodes: Vec::new() };
        self.grow(x, rows, criterion, 0, &mut tree);
        tree
    }

    fn grow<C: Criterion>(
        &self,
        x: &[Vec<f64>],
        mut rows: Vec<usize>,
        criterion: &C,
        depth: usize,
        tree: &mut Tree,
    ) -> usize {
        let mut stats = criterion.empty();
        for &i in &rows {
            criterion.add(&mut stats, i);
        }

        let id = tree.nodes.len();
        tree.nodes.push(Node::Leaf {
            value: criterion.leaf(&stats),
        });

        if depth >= self.max_depth || rows.len() < 2 {
            return id;
        }

        let split = match self.best_split(x, &mut rows, &stats, criterion) {
            Some(s) => s,
            None => return id,
        };

        rows.sort_by(|&a, &b| x[a][split.feature].total_cmp(&x[b][split.feature]));
        let right_rows = rows.split_off(split.n_left);
        let left = self.grow(x, rows, criterion, depth + 1, tree);
        let right = self.grow(x, right_rows, criterion, depth + 1, tree);

        tree.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        id
    }

    fn best_split<C: Criterion>(
        &self,
        x: &[Vec<f64>],
        rows: &mut [usize],
        parent: &C::Stats,
        criterion: &C,
    ) -> Option<BestSplit> {
        let n_features = x.get(rows[0]).map_or(0, |r| r.len());
        let parent_score = criterion.score(parent);
        let mut best: Option<BestSplit> = None;

        for f in 0..n_features {
            rows.sort_by(|&a, &b| x[a][f].total_cmp(&x[b][f]));

            let mut left = criterion.empty();
            let mut right = parent.clone();
            for p in 0..rows.len() - 1 {
                let i = rows[p];
                criterion.add(&mut left, i);
                criterion.remove(&mut right, i);

                let (lo, hi) = (x[i][f], x[rows[p + 1]][f]);
                if lo == hi {
                    continue;
                }
                let n_left = p + 1;
                if !criterion.admissible(&left, n_left)
                    || !criterion.admissible(&right, rows.len() - n_left)
                {
                    continue;
                }

                let gain = criterion.score(&left) + criterion.score(&right) - parent_score;
                if gain > self.min_gain && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(BestSplit {
                        feature: f,
                        threshold: 0.5 * (lo + hi),
                        gain,
                        n_left,
                    });
                }
            }
        }

        best
    }
}

/// Gini criterion for classification. Leaves hold class frequencies.
pub struct Gini<'a> {
    /// Label per sample
    pub labels: &'a [usize],
    /// Number of classes
    pub n_classes: usize,
    /// Minimum samples per leaf
    pub min_samples_leaf: usize,
}

impl Criterion for Gini<'_> {
    type Stats = (Vec<f64>, usize);

    fn empty(&self) -> Self::Stats {
        (vec![0.0; self.n_classes], 0)
    }

    fn add(&self, stats: &mut Self::Stats, i: usize) {
        stats.0[self.labels[i]] += 1.0;
        stats.1 += 1;
    }

    fn remove(&self, stats: &mut Self::Stats, i: usize) {
        stats.0[self.labels[i]] -= 1.0;
        stats.1 -= 1;
    }

    /// `sum(c_k^2) / n`, so the gain is the weighted impurity decrease.
    fn score(&self, stats: &Self::Stats) -> f64 {
        if stats.1 == 0 {
            return 0.0;
        }
        stats.0.iter().map(|c| c * c).sum::<f64>() / stats.1 as f64
    }

    fn admissible(&self, _stats: &Self::Stats, count: usize) -> bool {
        count >= self.min_samples_leaf
    }

    fn leaf(&self, stats: &Self::Stats) -> Vec<f64> {
        if stats.1 == 0 {
            return vec![1.0 / self.n_classes as f64; self.n_classes];
        }
        stats.0.iter().map(|c| c / stats.1 as f64).collect()
    }
}

/// Second-order boosting criterion. Leaves hold `-G / (H + λ)`.
pub struct Newton<'a> {
    /// Gradient per sample
    pub grad: &'a [f64],
    /// Hessian per sample
    pub hess: &'a [f64],
    /// L2 penalty on leaf weights
    pub lambda: f64,
    /// Split penalty, paid once per split
    pub gamma: f64,
    /// Minimum hessian sum per child
    pub min_child_weight: f64,
}

impl Criterion for Newton<'_> {
    type Stats = (f64, f64);

    fn empty(&self) -> Self::Stats {
        (0.0, 0.0)
    }

    fn add(&self, stats: &mut Self::Stats, i: usize) {
        stats.0 += self.grad[i];
        stats.1 += self.hess[i];
    }

    fn remove(&self, stats: &mut Self::Stats, i: usize) {
        stats.0 -= self.grad[i];
        stats.1 -= self.hess[i];
    }

    fn score(&self, stats: &Self::Stats) -> f64 {
        0.5 * stats.0 * stats.0 / (stats.1 + self.lambda) - self.gamma
    }

    fn admissible(&self, stats: &Self::Stats, count: usize) -> bool {
        count > 0 && stats.1 >= self.min_child_weight
    }

    fn leaf(&self, stats: &Self::Stats) -> Vec<f64> {
        vec![-stats.0 / (stats.1 + self.lambda)]
    }
}
