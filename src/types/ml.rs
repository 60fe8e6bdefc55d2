//! Shared ML types: confidence labels, model state and training reports.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Three-level confidence label attached to every decision object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle of a trainable component.
///
/// There is no intermediate state: training either installs a complete
/// bundle or leaves the previous state untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelState {
    Untrained,
    Trained,
}

/// Metadata kept alongside a trained forecaster bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastTrainingReport {
    /// Mean absolute error of the blended ensemble on the held-out split
    pub mae: f64,
    /// Coefficient of determination of the blended ensemble on the held-out split
    pub r2: f64,
    pub train_rows: usize,
    pub test_rows: usize,
    pub feature_count: usize,
    pub trained_at: NaiveDateTime,
}

/// Held-out scores of the two speed-optimizer regressors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeedTrainingReport {
    pub production_score: f64,
    pub quality_score: f64,
    pub train_rows: usize,
    pub test_rows: usize,
    pub trained_at: NaiveDateTime,
}
