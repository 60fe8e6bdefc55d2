//! Line recommendation decision objects.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ConfidenceLevel;

/// Scored candidate line for a production job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineScore {
    pub line_id: String,
    pub score: f64,
    pub predicted_oee: f64,
    pub production_time_hours: f64,
    /// Pieces to launch so that `quantity` good pieces come out
    pub estimated_pieces: u64,
    /// Static quality rate (%)
    pub quality_rate: f64,
    pub speed: f64,
    pub operators_needed: u32,
    pub maintenance_status: String,
}

/// Ranked lines for a job; `details` is the winner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineRecommendation {
    pub recommended_line: String,
    pub score: f64,
    pub details: LineScore,
    pub alternatives: Vec<LineScore>,
    pub estimated_completion: NaiveDateTime,
    pub confidence: ConfidenceLevel,
}

/// Recent-performance score for a line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinePerformanceScore {
    pub total_score: f64,
    pub oee: f64,
    pub availability: f64,
    pub quality: f64,
    pub performance: f64,
    pub stability: f64,
}

/// Best line by recent performance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BestLineReport {
    pub recommended_line: String,
    pub score: f64,
    pub details: LinePerformanceScore,
    pub all_scores: BTreeMap<String, LinePerformanceScore>,
    pub confidence: ConfidenceLevel,
    pub reason: String,
}

/// Production risk for a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub line_id: String,
    pub oee_predicted: f64,
    pub production_time: f64,
    pub risk_level: RiskLevel,
    pub quality_expected: f64,
    pub recommendation_rank: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioComparison {
    pub fastest: String,
    pub most_reliable: String,
    pub best_quality: String,
    /// Spread between slowest and fastest production time (hours)
    pub time_difference: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub scenarios: Vec<Scenario>,
    pub comparison: ScenarioComparison,
}
