//! CART (Classification and Regression Tree) builder
//!
//! Grows one regression tree by exact-greedy variance reduction. Candidate
//! thresholds are midpoints between consecutive distinct values of a
//! feature; each feature is scanned once after sorting, using running sums
//! of the targets.

use readiness_forest::{ForestError, Node, RegressionTree};

use crate::deterministic::{SeededRng, SplitTieBreaker};

/// Growth limits for a single tree
#[derive(Clone, Debug)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features examined per split; all features when >= the feature count
    pub max_features: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: usize::MAX,
        }
    }
}

/// Split candidate with score and tie-breaker
#[derive(Debug, Clone)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    /// Σ²_left / n_left + Σ²_right / n_right; larger means lower child variance
    score: f64,
    tie_breaker: SplitTieBreaker,
}

/// Build regression trees over a fixed feature matrix
pub struct CartBuilder<'a> {
    features: &'a [Vec<f64>],
    targets: &'a [f64],
    feature_count: usize,
    config: TreeConfig,
}

impl<'a> CartBuilder<'a> {
    pub fn new(
        features: &'a [Vec<f64>],
        targets: &'a [f64],
        config: TreeConfig,
    ) -> Result<Self, ForestError> {
        if features.len() != targets.len() {
            return Err(ForestError::InvalidInput(format!(
                "{} feature rows but {} targets",
                features.len(),
                targets.len()
            )));
        }
        let feature_count = features.first().map_or(0, Vec::len);

        Ok(Self {
            features,
            targets,
            feature_count,
            config,
        })
    }

    /// Grow a tree on `samples` (row indices, repeats allowed)
    pub fn build(&self, samples: &[usize], rng: &mut SeededRng) -> RegressionTree {
        let mut nodes = Vec::new();
        self.build_node(samples.to_vec(), 0, &mut nodes, rng);
        RegressionTree::new(nodes)
    }

    /// Recursively build tree nodes in pre-order; returns the node index
    fn build_node(
        &self,
        indices: Vec<usize>,
        depth: usize,
        nodes: &mut Vec<Node>,
        rng: &mut SeededRng,
    ) -> i32 {
        let current_idx = nodes.len() as i32;
        let n = indices.len();
        let leaf_value = self.mean_target(&indices);

        if depth >= self.config.max_depth
            || n < self.config.min_samples_split
            || n < 2 * self.config.min_samples_leaf
            || self.is_pure(&indices)
        {
            nodes.push(Node::leaf(current_idx, leaf_value, n as u32));
            return current_idx;
        }

        let split = match self.find_best_split(&indices, rng) {
            Some(s) => s,
            None => {
                nodes.push(Node::leaf(current_idx, leaf_value, n as u32));
                return current_idx;
            }
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| self.features[i][split.feature_idx] <= split.threshold);

        // Reserve the slot; children are patched in once built
        nodes.push(Node::internal(
            current_idx,
            split.feature_idx as i32,
            split.threshold,
            -1,
            -1,
            n as u32,
        ));

        let left_idx = self.build_node(left_indices, depth + 1, nodes, rng);
        let right_idx = self.build_node(right_indices, depth + 1, nodes, rng);

        nodes[current_idx as usize].left = left_idx;
        nodes[current_idx as usize].right = right_idx;

        current_idx
    }

    fn candidate_features(&self, rng: &mut SeededRng) -> Vec<usize> {
        let mut all: Vec<usize> = (0..self.feature_count).collect();
        if self.config.max_features >= self.feature_count {
            return all;
        }
        rng.shuffle(&mut all);
        all.truncate(self.config.max_features.max(1));
        all.sort_unstable();
        all
    }

    /// Find the split with the largest variance reduction
    fn find_best_split(&self, indices: &[usize], rng: &mut SeededRng) -> Option<SplitCandidate> {
        let n = indices.len();
        let min_leaf = self.config.min_samples_leaf;
        let total: f64 = indices.iter().map(|&i| self.targets[i]).sum();

        let mut best: Option<SplitCandidate> = None;
        let mut order = indices.to_vec();

        for feature_idx in self.candidate_features(rng) {
            let column = |row: usize| self.features[row][feature_idx];
            order.sort_by(|&a, &b| column(a).total_cmp(&column(b)));

            let mut left_sum = 0.0;
            for pos in 1..n {
                left_sum += self.targets[order[pos - 1]];

                let lo = column(order[pos - 1]);
                let hi = column(order[pos]);
                if hi <= lo {
                    continue;
                }
                if pos < min_leaf || n - pos < min_leaf {
                    continue;
                }

                let right_sum = total - left_sum;
                let score = left_sum * left_sum / pos as f64
                    + right_sum * right_sum / (n - pos) as f64;
                let tie_breaker = SplitTieBreaker::new(feature_idx, pos);

                let better = match &best {
                    None => true,
                    Some(current) => {
                        score > current.score
                            || (score == current.score && tie_breaker < current.tie_breaker)
                    }
                };
                if better {
                    best = Some(SplitCandidate {
                        feature_idx,
                        threshold: midpoint(lo, hi),
                        score,
                        tie_breaker,
                    });
                }
            }
        }

        best
    }

    fn mean_target(&self, indices: &[usize]) -> f64 {
        if indices.is_empty() {
            return 0.0;
        }
        let sum: f64 = indices.iter().map(|&i| self.targets[i]).sum();
        sum / indices.len() as f64
    }

    fn is_pure(&self, indices: &[usize]) -> bool {
        match indices.first() {
            Some(&first) => indices
                .iter()
                .all(|&i| self.targets[i] == self.targets[first]),
            None => true,
        }
    }
}

/// Threshold between two distinct sorted values; falls back to `lo` when
/// the midpoint rounds up to `hi`
fn midpoint(lo: f64, hi: f64) -> f64 {
    let mid = lo / 2.0 + hi / 2.0;
    if mid >= hi || !mid.is_finite() {
        lo
    } else {
        mid
    }
}
