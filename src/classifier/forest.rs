//! Random forest of CART decision trees.

use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::svm::argmax;

/// Hyperparameters of [`RandomForest`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    /// Number of features considered per split. [`None`] means `sqrt(n_features)`.
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 300,
            max_features: None,
            seed: 42,
        }
    }
}

/// A forest of fully grown trees, each fitted on a bootstrap sample.
///
/// Predictions average the class probabilities of all trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    n_classes: usize,
    trees: Vec<Tree>,
}

impl RandomForest {
    /// Fits the forest on samples `x` with class indices `y` (`0..n_classes`).
    ///
    /// Trees are fitted in parallel; the result does not depend on the number of threads.
    pub fn fit(x: &Array2<f64>, y: &[usize], n_classes: usize, params: ForestParams) -> Self {
        let n_features = x.ncols();
        let max_features = params
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt() as usize)
            .clamp(1, n_features.max(1));

        let trees = (0..params.n_trees)
            .into_par_iter()
            .map(|i| {
                // Every tree gets its own deterministic stream.
                let mut rng = fastrand::Rng::with_seed(params.seed.wrapping_add(i as u64));
                let sample = (0..x.nrows())
                    .map(|_| rng.usize(..x.nrows()))
                    .collect::<Vec<_>>();
                TreeBuilder {
                    x,
                    y,
                    n_classes,
                    max_features,
                    rng,
                }
                .build(sample)
            })
            .collect::<Vec<_>>();

        log::debug!(
            "grew {} trees (max_features={max_features}, {} nodes total)",
            trees.len(),
            trees.iter().map(|t| t.nodes.len()).sum::<usize>(),
        );

        Self {
            params,
            n_classes,
            trees,
        }
    }

    pub fn params(&self) -> ForestParams {
        self.params
    }

    /// Returns the mean class probabilities of all trees.
    pub fn predict_proba(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let mut proba = Array1::zeros(self.n_classes);
        for tree in &self.trees {
            for (sum, p) in proba.iter_mut().zip(tree.leaf(x)) {
                *sum += p;
            }
        }
        if !self.trees.is_empty() {
            proba /= self.trees.len() as f64;
        }
        proba
    }

    pub fn predict(&self, x: ArrayView1<'_, f64>) -> usize {
        argmax(&self.predict_proba(x))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        proba: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A binary decision tree. The root is `nodes[0]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn leaf(&self, x: ArrayView1<'_, f64>) -> &[f64] {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { proba } => return proba,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if x[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

struct TreeBuilder<'a> {
    x: &'a Array2<f64>,
    y: &'a [usize],
    n_classes: usize,
    max_features: usize,
    rng: fastrand::Rng,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl TreeBuilder<'_> {
    fn build(mut self, sample: Vec<usize>) -> Tree {
        let mut nodes = vec![Node::Leaf { proba: Vec::new() }];
        // (node index, samples reaching the node)
        let mut pending = vec![(0, sample)];

        while let Some((index, samples)) = pending.pop() {
            let counts = self.class_counts(&samples);
            let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;

            let split = if pure { None } else { self.best_split(&samples) };
            match split {
                Some(split) => {
                    let (left, right): (Vec<_>, Vec<_>) = samples
                        .into_iter()
                        .partition(|&i| self.x[[i, split.feature]] <= split.threshold);

                    let (l, r) = (nodes.len(), nodes.len() + 1);
                    nodes.push(Node::Leaf { proba: Vec::new() });
                    nodes.push(Node::Leaf { proba: Vec::new() });
                    nodes[index] = Node::Split {
                        feature: split.feature,
                        threshold: split.threshold,
                        left: l,
                        right: r,
                    };
                    pending.push((l, left));
                    pending.push((r, right));
                }
                None => {
                    let total = samples.len().max(1) as f64;
                    nodes[index] = Node::Leaf {
                        proba: counts.iter().map(|&c| c as f64 / total).collect(),
                    };
                }
            }
        }

        Tree { nodes }
    }

    fn class_counts(&self, samples: &[usize]) -> Vec<usize> {
        let mut counts = vec![0; self.n_classes];
        for &i in samples {
            counts[self.y[i]] += 1;
        }
        counts
    }

    /// Looks for the split with the lowest weighted Gini impurity.
    ///
    /// Candidate features are drawn at random until `max_features` non-constant ones have been
    /// evaluated (or all features are exhausted).
    fn best_split(&mut self, samples: &[usize]) -> Option<BestSplit> {
        let mut features = (0..self.x.ncols()).collect::<Vec<_>>();
        self.rng.shuffle(&mut features);

        let mut best: Option<BestSplit> = None;
        let mut evaluated = 0;
        let mut sorted = samples.to_vec();
        for feature in features {
            if evaluated >= self.max_features {
                break;
            }

            sorted.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));
            let first = self.x[[sorted[0], feature]];
            let last = self.x[[sorted[sorted.len() - 1], feature]];
            if first == last {
                continue;
            }
            evaluated += 1;

            if let Some(candidate) = self.scan(&sorted, feature) {
                if best
                    .as_ref()
                    .map_or(true, |b| candidate.impurity < b.impurity)
                {
                    best = Some(candidate);
                }
            }
        }
        best
    }

    /// Sweeps all thresholds of `feature` over samples sorted by that feature.
    fn scan(&self, sorted: &[usize], feature: usize) -> Option<BestSplit> {
        let n = sorted.len();
        let mut left = vec![0usize; self.n_classes];
        let mut right = self.class_counts(sorted);

        let mut best: Option<BestSplit> = None;
        for pos in 1..n {
            let moved = self.y[sorted[pos - 1]];
            left[moved] += 1;
            right[moved] -= 1;

            let prev = self.x[[sorted[pos - 1], feature]];
            let next = self.x[[sorted[pos], feature]];
            if prev == next {
                continue;
            }

            let impurity = (pos as f64 * gini(&left, pos)
                + (n - pos) as f64 * gini(&right, n - pos))
                / n as f64;
            if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                let mut threshold = prev / 2.0 + next / 2.0;
                // Midpoints can round up to `next`, which would send it to the left.
                if threshold >= next {
                    threshold = prev;
                }
                best = Some(BestSplit {
                    feature,
                    threshold,
                    impurity,
                });
            }
        }
        best
    }
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / total;
            p * p
        })
        .sum::<f64>()
}
