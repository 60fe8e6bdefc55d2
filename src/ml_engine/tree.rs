//! CART regression tree (squared-error criterion).
//!
//! Nodes are stored in a flat vector; each split sends `x[feature] <= threshold`
//! to the left child. Splits are searched exhaustively over every feature and
//! every midpoint between distinct sorted values. A leaf holds the mean target
//! of the rows that reached it.

use serde::{Deserialize, Serialize};

/// Growth limits for a single tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeParams {
    /// Maximum depth; the root is depth 0
    pub max_depth: usize,
    /// Nodes with fewer rows become leaves
    pub min_samples_split: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
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

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    /// Reduction in sum of squared errors
    gain: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    /// Fit on every row of `x`.
    pub fn fit(x: &[Vec<f64>], y: &[f64], params: TreeParams) -> Self {
        let indices: Vec<usize> = (0..y.len()).collect();
        Self::fit_on(x, y, &indices, params)
    }

    /// Fit on the rows listed in `indices` (repeats allowed, as in a bootstrap sample).
    pub fn fit_on(x: &[Vec<f64>], y: &[f64], indices: &[usize], params: TreeParams) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        if indices.is_empty() {
            tree.nodes.push(Node::Leaf { value: 0.0 });
        } else {
            tree.grow(x, y, indices, 0, params);
        }
        tree
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(Node::Leaf { value }) => return *value,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let v = row.get(*feature).copied().unwrap_or(0.0);
                    idx = if v <= *threshold { *left } else { *right };
                }
                None => return 0.0,
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        self.depth_from(0)
    }

    fn depth_from(&self, idx: usize) -> usize {
        match self.nodes.get(idx) {
            Some(Node::Split { left, right, .. }) => {
                1 + self.depth_from(*left).max(self.depth_from(*right))
            }
            _ => 0,
        }
    }

    fn grow(
        &mut self,
        x: &[Vec<f64>],
        y: &[f64],
        indices: &[usize],
        depth: usize,
        params: TreeParams,
    ) -> usize {
        let node_idx = self.nodes.len();
        let mean = indices.iter().map(|&i| y[i]).sum::<f64>() / indices.len() as f64;
        self.nodes.push(Node::Leaf { value: mean });

        if depth >= params.max_depth || indices.len() < params.min_samples_split.max(2) {
            return node_idx;
        }
        let Some(split) = Self::best_split(x, y, indices) else {
            return node_idx;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[i][split.feature] <= split.threshold);
        if left_rows.is_empty() || right_rows.is_empty() {
            return node_idx;
        }

        let left = self.grow(x, y, &left_rows, depth + 1, params);
        let right = self.grow(x, y, &right_rows, depth + 1, params);
        self.nodes[node_idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        node_idx
    }

    /// Best squared-error split, or `None` when no split reduces the error
    /// (constant target or constant features).
    fn best_split(x: &[Vec<f64>], y: &[f64], indices: &[usize]) -> Option<SplitCandidate> {
        let n = indices.len();
        let width = x.get(indices[0]).map_or(0, |r| r.len());
        let total_sum: f64 = indices.iter().map(|&i| y[i]).sum();
        let total_sq: f64 = indices.iter().map(|&i| y[i] * y[i]).sum();
        let parent_sse = total_sq - total_sum * total_sum / n as f64;
        if parent_sse <= 1e-12 {
            return None;
        }

        let mut best: Option<SplitCandidate> = None;
        let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(n);

        for feature in 0..width {
            pairs.clear();
            pairs.extend(indices.iter().map(|&i| (x[i][feature], y[i])));
            pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for k in 1..n {
                let (prev_x, prev_y) = pairs[k - 1];
                left_sum += prev_y;
                left_sq += prev_y * prev_y;
                if pairs[k].0 <= prev_x {
                    continue;
                }
                let left_n = k as f64;
                let right_n = (n - k) as f64;
                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let sse = (left_sq - left_sum * left_sum / left_n)
                    + (right_sq - right_sum * right_sum / right_n);
                let gain = parent_sse - sse;
                if gain > 1e-12 && best.map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: (prev_x + pairs[k].0) / 2.0,
                        gain,
                    });
                }
            }
        }

        best
    }
}
