//! Random forest of CART regression trees.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::thread;
use tracing::debug;

use super::PipelineError;
use super::preprocess::mean;

/// Hyper-parameters for [`RandomForest::fit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    /// `None` grows every tree until its leaves are pure or too small to split.
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 200,
            max_depth: None,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

struct Split {
    feature: usize,
    threshold: f64,
    score: f64,
}

impl RegressionTree {
    /// Fits a tree on the rows listed in `sample` (duplicates allowed).
    fn fit(x: &[Vec<f64>], y: &[f64], sample: Vec<usize>, params: &ForestParams) -> Self {
        let min_leaf = params.min_samples_leaf.max(1);
        let mut nodes = vec![Node::Leaf { value: 0.0 }];
        let mut pending = vec![(0usize, sample, 0usize)];

        while let Some((slot, rows, depth)) = pending.pop() {
            let targets: Vec<f64> = rows.iter().map(|&i| y[i]).collect();
            let value = mean(&targets);

            let can_split = params.max_depth.is_none_or(|max| depth < max)
                && rows.len() >= 2 * min_leaf
                && targets.iter().any(|t| *t != targets[0]);

            let split = if can_split {
                best_split(x, y, &rows, min_leaf)
            } else {
                None
            };

            let Some(split) = split else {
                nodes[slot] = Node::Leaf { value };
                continue;
            };

            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
                .into_iter()
                .partition(|&i| x[i][split.feature] <= split.threshold);

            let left = nodes.len();
            let right = left + 1;
            nodes.push(Node::Leaf { value: 0.0 });
            nodes.push(Node::Leaf { value: 0.0 });
            nodes[slot] = Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
            };
            pending.push((left, left_rows, depth + 1));
            pending.push((right, right_rows, depth + 1));
        }

        Self { nodes }
    }

    fn predict(&self, features: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if features[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn max_feature(&self) -> Option<usize> {
        self.nodes
            .iter()
            .filter_map(|n| match n {
                Node::Split { feature, .. } => Some(*feature),
                Node::Leaf { .. } => None,
            })
            .max()
    }

    /// Children always come after their parent, which also rules out cycles.
    fn is_well_formed(&self) -> bool {
        let len = self.nodes.len();
        len > 0
            && self.nodes.iter().enumerate().all(|(i, n)| match n {
                Node::Split { left, right, .. } => {
                    *left > i && *right > i && *left < len && *right < len
                }
                Node::Leaf { value } => value.is_finite(),
            })
    }
}

/// Finds the split of `rows` that minimises the summed squared error of the
/// two children. Returns `None` when no split improves on the parent.
fn best_split(x: &[Vec<f64>], y: &[f64], rows: &[usize], min_leaf: usize) -> Option<Split> {
    let n = rows.len();
    let total: f64 = rows.iter().map(|&i| y[i]).sum();
    let parent_score = total * total / n as f64;
    let n_features = x[rows[0]].len();

    let mut best: Option<Split> = None;
    let mut order = rows.to_vec();

    for feature in 0..n_features {
        order.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));

        let mut left_sum = 0.0;
        for pos in 0..n - 1 {
            left_sum += y[order[pos]];

            let here = x[order[pos]][feature];
            let next = x[order[pos + 1]][feature];
            if here == next {
                continue;
            }

            let left_n = pos + 1;
            let right_n = n - left_n;
            if left_n < min_leaf || right_n < min_leaf {
                continue;
            }

            let right_sum = total - left_sum;
            let score = left_sum * left_sum / left_n as f64 + right_sum * right_sum / right_n as f64;

            let improves = best
                .as_ref()
                .map_or(score > parent_score + 1e-12, |b| score > b.score);
            if improves {
                let mid = here + (next - here) / 2.0;
                best = Some(Split {
                    feature,
                    threshold: if mid < next { mid } else { here },
                    score,
                });
            }
        }
    }

    best
}

/// Bagged ensemble of regression trees; predicts the mean over trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_features: usize,
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    pub fn fit(x: &[Vec<f64>], y: &[f64], params: &ForestParams) -> Result<Self, PipelineError> {
        if x.is_empty() {
            return Err(PipelineError::EmptyTrainingSet);
        }
        if x.len() != y.len() {
            return Err(PipelineError::Model(format!(
                "{} feature rows but {} targets",
                x.len(),
                y.len()
            )));
        }
        if params.n_trees == 0 {
            return Err(PipelineError::Model("n_trees must be at least 1".into()));
        }
        let n_features = x[0].len();
        if x.iter().any(|r| r.len() != n_features) {
            return Err(PipelineError::Model("ragged feature matrix".into()));
        }

        let workers = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(params.n_trees);

        // Each tree owns a seed derived from its index, so the result does not
        // depend on how trees are spread over threads.
        let mut trees: Vec<(usize, RegressionTree)> = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|w| {
                    scope.spawn(move || {
                        (w..params.n_trees)
                            .step_by(workers)
                            .map(|t| {
                                let mut rng =
                                    StdRng::seed_from_u64(params.seed.wrapping_add(t as u64));
                                let sample: Vec<usize> =
                                    (0..x.len()).map(|_| rng.gen_range(0..x.len())).collect();
                                let tree = RegressionTree::fit(x, y, sample, params);
                                debug!(tree = t, nodes = tree.node_count(), "Tree fitted");
                                (t, tree)
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap_or_default())
                .collect()
        });

        if trees.len() != params.n_trees {
            return Err(PipelineError::Model("a tree worker panicked".into()));
        }
        trees.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(Self {
            n_features,
            trees: trees.into_iter().map(|(_, t)| t).collect(),
        })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Checks internal consistency of a deserialized forest.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.trees.is_empty() {
            return Err(PipelineError::Model("forest has no trees".into()));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            let feature_ok = tree.max_feature().is_none_or(|f| f < self.n_features);
            if !tree.is_well_formed() || !feature_ok {
                return Err(PipelineError::Model(format!("tree {i} is malformed")));
            }
        }
        Ok(())
    }

    pub fn predict(&self, features: &[f64]) -> Result<f64, PipelineError> {
        if features.len() != self.n_features {
            return Err(PipelineError::Model(format!(
                "expected {} encoded features, got {}",
                self.n_features,
                features.len()
            )));
        }
        if self.trees.is_empty() {
            return Err(PipelineError::Model("forest has no trees".into()));
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict(features)).sum();
        Ok(sum / self.trees.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let y: Vec<f64> = (0..40).map(|i| if i < 20 { 1.0 } else { 5.0 }).collect();
        (x, y)
    }

    #[test]
    fn test_single_tree_learns_step() {
        let (x, y) = step_data();
        let tree = RegressionTree::fit(&x, &y, (0..x.len()).collect(), &ForestParams::default());

        assert_eq!(tree.predict(&[3.0, 0.0]), 1.0);
        assert_eq!(tree.predict(&[35.0, 2.0]), 5.0);
        // one split + two leaves
        assert_eq!(tree.node_count(), 3);
    }

    #[test]
    fn test_max_depth_zero_is_a_stump_of_the_mean() {
        let (x, y) = step_data();
        let params = ForestParams {
            max_depth: Some(0),
            ..Default::default()
        };
        let tree = RegressionTree::fit(&x, &y, (0..x.len()).collect(), &params);

        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.predict(&[0.0, 0.0]), 3.0);
    }

    #[test]
    fn test_min_samples_leaf_blocks_small_children() {
        let x = vec![vec![0.0], vec![1.0], vec![2.0]];
        let y = vec![0.0, 0.0, 9.0];
        let params = ForestParams {
            min_samples_leaf: 2,
            ..Default::default()
        };
        let tree = RegressionTree::fit(&x, &y, vec![0, 1, 2], &params);
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn test_forest_is_deterministic_for_a_seed() {
        let (x, y) = step_data();
        let params = ForestParams {
            n_trees: 8,
            ..Default::default()
        };
        let a = RandomForest::fit(&x, &y, &params).unwrap();
        let b = RandomForest::fit(&x, &y, &params).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.n_trees(), 8);
        assert!(a.validate().is_ok());
    }

    #[test]
    fn test_forest_prediction_tracks_step() {
        let (x, y) = step_data();
        let params = ForestParams {
            n_trees: 25,
            ..Default::default()
        };
        let forest = RandomForest::fit(&x, &y, &params).unwrap();

        assert!(forest.predict(&[2.0, 2.0]).unwrap() < 2.0);
        assert!(forest.predict(&[38.0, 2.0]).unwrap() > 4.0);
    }

    #[test]
    fn test_forest_rejects_wrong_width() {
        let (x, y) = step_data();
        let params = ForestParams {
            n_trees: 2,
            ..Default::default()
        };
        let forest = RandomForest::fit(&x, &y, &params).unwrap();
        let err = forest.predict(&[1.0]).unwrap_err();
        assert!(err.to_string().contains("expected 2 encoded features"));
    }

    #[test]
    fn test_fit_rejects_empty_input() {
        let err = RandomForest::fit(&[], &[], &ForestParams::default()).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyTrainingSet));
    }
}
