//! Feature standardization using Welford's algorithm.
//!
//! Each column is tracked with a running mean and variance; the fitted scaler
//! maps a value to `(x - mean) / std` using the population std, so a constant
//! column (std 0) is left unscaled (scale 1) rather than divided by zero.

use serde::{Deserialize, Serialize};

/// Column-wise zero-mean/unit-variance scaler, fit once on the training split.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandardScaler {
    count: u64,
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    /// Fit column statistics over `rows` (all rows must have the same width).
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let width = rows.first().map_or(0, |r| r.len());
        let mut mean = vec![0.0_f64; width];
        let mut m2 = vec![0.0_f64; width];
        let mut count = 0_u64;

        for row in rows {
            count += 1;
            let n = count as f64;
            for (i, &x) in row.iter().enumerate().take(width) {
                let delta = x - mean[i];
                mean[i] += delta / n;
                let delta2 = x - mean[i];
                m2[i] += delta * delta2;
            }
        }

        let scale = m2
            .iter()
            .map(|&m| {
                let std = if count > 0 { (m / count as f64).sqrt() } else { 0.0 };
                if std > 1e-12 { std } else { 1.0 }
            })
            .collect();

        Self { count, mean, scale }
    }

    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (m, s))| (x - m) / s)
            .collect()
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }

    /// Number of rows the scaler was fit on.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }
}
