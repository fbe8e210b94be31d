//! Regression tree structures and traversal
//!
//! Trees are stored as flat node arrays with node 0 as the root. Internal
//! nodes route a sample left when `features[feature_idx] <= threshold`.

use serde::{Deserialize, Serialize};

use crate::errors::{ForestError, Result};

/// A regression tree node (internal or leaf)
///
/// For internal nodes:
/// - `feature_idx >= 0`: index into the encoded feature vector
/// - `left` and `right` point to child node indices
/// - `leaf` is `None`
///
/// For leaf nodes:
/// - `feature_idx == -1`
/// - `leaf` holds the mean target of the training samples that reached it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// Node ID (position in the node array)
    pub id: i32,

    /// Left child index (-1 for leaf nodes)
    pub left: i32,

    /// Right child index (-1 for leaf nodes)
    pub right: i32,

    /// Feature index to split on (-1 for leaf nodes)
    pub feature_idx: i32,

    /// Split threshold
    pub threshold: f64,

    /// Leaf prediction (Some for leaf nodes)
    pub leaf: Option<f64>,

    /// Number of (bootstrapped) training samples that reached this node
    pub samples: u32,
}

impl Node {
    /// Create a new internal (split) node
    pub fn internal(
        id: i32,
        feature_idx: i32,
        threshold: f64,
        left: i32,
        right: i32,
        samples: u32,
    ) -> Self {
        Self {
            id,
            left,
            right,
            feature_idx,
            threshold,
            leaf: None,
            samples,
        }
    }

    /// Create a new leaf node
    pub fn leaf(id: i32, value: f64, samples: u32) -> Self {
        Self {
            id,
            left: -1,
            right: -1,
            feature_idx: -1,
            threshold: 0.0,
            leaf: Some(value),
            samples,
        }
    }

    /// Check if this node is a leaf
    pub fn is_leaf(&self) -> bool {
        self.feature_idx == -1 || self.leaf.is_some()
    }
}

/// A single fitted regression tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegressionTree {
    /// Tree nodes (node 0 is the root)
    pub nodes: Vec<Node>,
}

impl RegressionTree {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Evaluate this tree on an encoded feature vector.
    ///
    /// The tree must have passed [`RegressionTree::validate`]; malformed
    /// links fall back to 0.0 instead of panicking.
    pub fn evaluate(&self, features: &[f64]) -> f64 {
        let mut idx = 0usize;

        loop {
            let Some(node) = self.nodes.get(idx) else {
                return 0.0;
            };

            if node.is_leaf() {
                return node.leaf.unwrap_or(0.0);
            }

            let Some(&value) = features.get(node.feature_idx as usize) else {
                return 0.0;
            };

            let next = if value <= node.threshold {
                node.left
            } else {
                node.right
            };
            if next < 0 {
                return 0.0;
            }
            idx = next as usize;
        }
    }

    /// Depth of the deepest leaf (a lone root leaf has depth 0)
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes.get(idx) {
                Some(node) if !node.is_leaf() => {
                    let child = |link: i32| {
                        if link > idx as i32 {
                            walk(nodes, link as usize)
                        } else {
                            0
                        }
                    };
                    1 + child(node.left).max(child(node.right))
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|node| node.is_leaf()).count()
    }

    /// Validate node links, feature indices and leaf values
    pub fn validate(&self, n_features: usize) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(ForestError::ValidationFailed("tree has no nodes".into()));
        }

        let len = self.nodes.len() as i32;
        for (idx, node) in self.nodes.iter().enumerate() {
            if node.id != idx as i32 {
                return Err(ForestError::ValidationFailed(format!(
                    "node at position {} has id {}",
                    idx, node.id
                )));
            }

            if node.is_leaf() {
                match node.leaf {
                    Some(value) if value.is_finite() => {}
                    _ => {
                        return Err(ForestError::ValidationFailed(format!(
                            "leaf {} has no finite value",
                            idx
                        )))
                    }
                }
                continue;
            }

            if node.feature_idx < 0 || node.feature_idx as usize >= n_features {
                return Err(ForestError::ValidationFailed(format!(
                    "node {} splits on feature {} but model has {} features",
                    idx, node.feature_idx, n_features
                )));
            }
            // Children are always appended after their parent.
            for child in [node.left, node.right] {
                if child <= idx as i32 || child >= len {
                    return Err(ForestError::ValidationFailed(format!(
                        "node {} has invalid child index {}",
                        idx, child
                    )));
                }
            }
            if !node.threshold.is_finite() {
                return Err(ForestError::ValidationFailed(format!(
                    "node {} has a non-finite threshold",
                    idx
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump() -> RegressionTree {
        RegressionTree::new(vec![
            Node::internal(0, 0, 50.0, 1, 2, 4),
            Node::leaf(1, 10.0, 2),
            Node::leaf(2, 20.0, 2),
        ])
    }

    #[test]
    fn test_evaluate_routes_on_threshold() {
        let tree = stump();
        assert_eq!(tree.evaluate(&[49.0]), 10.0);
        assert_eq!(tree.evaluate(&[50.0]), 10.0);
        assert_eq!(tree.evaluate(&[50.5]), 20.0);
    }

    #[test]
    fn test_depth_and_leaves() {
        let tree = stump();
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.leaf_count(), 2);

        let single = RegressionTree::new(vec![Node::leaf(0, 3.0, 1)]);
        assert_eq!(single.depth(), 0);
        assert_eq!(single.evaluate(&[]), 3.0);
    }

    #[test]
    fn test_validate_rejects_bad_links() {
        assert!(stump().validate(1).is_ok());
        assert!(stump().validate(0).is_err());

        let mut cyclic = stump();
        cyclic.nodes[0].left = 0;
        assert!(cyclic.validate(1).is_err());

        let mut dangling = stump();
        dangling.nodes[0].right = 7;
        assert!(dangling.validate(1).is_err());

        let empty = RegressionTree::new(Vec::new());
        assert!(empty.validate(1).is_err());
    }

    #[test]
    fn test_validate_rejects_nan_leaf() {
        let tree = RegressionTree::new(vec![Node::leaf(0, f64::NAN, 1)]);
        assert!(tree.validate(1).is_err());
    }
}
