//! Speed sweet-spot decision objects.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ConfidenceLevel;

/// Predicted output at one grid speed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeedPoint {
    pub speed: f64,
    /// Pieces/hour (1 dp)
    pub production_rate: f64,
    /// Good pieces as % of produced (2 dp)
    pub quality_rate: f64,
    /// `100 - quality_rate` (2 dp)
    pub defect_rate: f64,
    /// `production_rate × quality_rate / 100` (1 dp)
    pub net_output: f64,
}

/// Direction to move the line speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedAction {
    Increase,
    Decrease,
    Maintain,
}

impl SpeedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Increase => "increase",
            Self::Decrease => "decrease",
            Self::Maintain => "maintain",
        }
    }
}

/// Result of a sweet-spot grid search for one line/product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimalSpeedResult {
    pub line_id: String,
    pub product_type: String,
    pub optimal_speed: f64,
    pub max_net_output: f64,
    pub current_speed: f64,
    pub current_net_output: f64,
    pub improvement_pct: f64,
    pub recommendation: String,
    pub action: SpeedAction,
    pub confidence: ConfidenceLevel,
    /// Every evaluated grid point in scan order
    pub curve_data: Vec<SpeedPoint>,
}

/// Per-line entry of a fleet-wide recommendation; a failing line does not
/// abort the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LineSpeedOutcome {
    Found(Box<OptimalSpeedResult>),
    Failed { error: String },
}

impl LineSpeedOutcome {
    pub fn result(&self) -> Option<&OptimalSpeedResult> {
        match self {
            Self::Found(r) => Some(r),
            Self::Failed { .. } => None,
        }
    }
}

/// Sweet-spot search across every configured line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetSpeedRecommendations {
    pub product_type: String,
    pub recommendations: BTreeMap<String, LineSpeedOutcome>,
    /// Line with the highest `max_net_output`, if any line succeeded
    pub best_line: Option<String>,
}
