//! Tree ensembles: bagged random forest and least-squares gradient boosting.
//!
//! ## Key Features
//! - Forest trees are fitted in parallel (rayon); tree `t` draws its bootstrap
//!   sample from `StdRng::seed_from_u64(seed + t)`, so the fitted forest does
//!   not depend on thread scheduling
//! - Boosting starts from the target mean and adds shrunken trees fitted to
//!   the current residuals
//! - Both models are plain serde values so they can be persisted inside a
//!   trained bundle

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::tree::{RegressionTree, TreeParams};
use crate::config::{BoostingParams, ForestParams};

/// A fitted regression model.
pub trait Regressor: Send + Sync {
    fn predict_row(&self, row: &[f64]) -> f64;

    fn predict(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|r| self.predict_row(r)).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    trees: Vec<RegressionTree>,
}

impl RandomForestRegressor {
    pub fn fit(x: &[Vec<f64>], y: &[f64], params: &ForestParams, seed: u64) -> Self {
        let n = y.len();
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
        };

        let trees = (0..params.n_estimators)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(t as u64));
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit_on(x, y, &sample, tree_params)
            })
            .collect();

        Self { trees }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Regressor for RandomForestRegressor {
    fn predict_row(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / self.trees.len() as f64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    init: f64,
    learning_rate: f64,
    stages: Vec<RegressionTree>,
}

impl GradientBoostingRegressor {
    pub fn fit(x: &[Vec<f64>], y: &[f64], params: &BoostingParams) -> Self {
        let init = if y.is_empty() {
            0.0
        } else {
            y.iter().sum::<f64>() / y.len() as f64
        };
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
        };

        let mut current = vec![init; y.len()];
        let mut stages = Vec::with_capacity(params.n_estimators);
        for _ in 0..params.n_estimators {
            let residuals: Vec<f64> = y.iter().zip(&current).map(|(t, p)| t - p).collect();
            let tree = RegressionTree::fit(x, &residuals, tree_params);
            for (pred, row) in current.iter_mut().zip(x) {
                *pred += params.learning_rate * tree.predict_row(row);
            }
            stages.push(tree);
        }

        Self {
            init,
            learning_rate: params.learning_rate,
            stages,
        }
    }
}

impl Regressor for GradientBoostingRegressor {
    fn predict_row(&self, row: &[f64]) -> f64 {
        self.init
            + self
                .stages
                .iter()
                .map(|t| self.learning_rate * t.predict_row(row))
                .sum::<f64>()
    }
}
