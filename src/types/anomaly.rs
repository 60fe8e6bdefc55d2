//! Anomaly knowledge-base records and the decision objects derived from them.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::ConfidenceLevel;

/// Maintenance priority assigned when the anomaly was logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

/// One resolved (or open) historical anomaly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub anomaly_id: u64,
    pub timestamp: NaiveDateTime,
    pub line_id: String,
    pub machine_id: String,
    #[serde(default)]
    pub symptom: Option<String>,
    #[serde(default)]
    pub root_cause: Option<String>,
    #[serde(alias = "solution_applied")]
    pub solution: String,
    pub resolution_time_minutes: u32,
    /// Signed OEE impact in percentage points
    pub impact_oee: f64,
    pub recurrence_count: u32,
    pub priority: Priority,
    pub status: String,
}

impl AnomalyRecord {
    /// Text indexed for similarity search: symptom followed by root cause.
    pub fn index_text(&self) -> String {
        format!(
            "{} {}",
            self.symptom.as_deref().unwrap_or(""),
            self.root_cause.as_deref().unwrap_or("")
        )
    }
}

/// How well a past fix held, judged from its recurrence count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effectiveness {
    High,
    Medium,
}

/// A knowledge-base record matched by a similarity query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarCase {
    /// Cosine similarity as a percentage (1 dp)
    pub similarity: f64,
    pub anomaly_id: u64,
    pub line_id: String,
    pub machine_id: String,
    pub symptom: String,
    pub root_cause: String,
    pub solution: String,
    pub resolution_time_minutes: u32,
    pub impact_oee: f64,
    pub recurrence_count: u32,
    pub effectiveness: Effectiveness,
}

/// Best neighbour reported alongside a recommended solution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopMatch {
    pub similarity: f64,
    pub symptom: String,
    pub root_cause: String,
}

/// Remedy synthesized from the matched neighbourhood.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedSolution {
    pub confidence: ConfidenceLevel,
    pub recommended_solution: String,
    /// Mean resolution time (minutes) over the cases sharing the solution
    pub estimated_time_minutes: f64,
    /// Share of similar cases resolved with this solution (%)
    pub success_rate: f64,
    pub similar_cases_count: usize,
    pub top_match: TopMatch,
    pub detailed_steps: Vec<String>,
    /// Absolute mean OEE impact of the grouped cases
    pub expected_impact: f64,
}

/// Outcome of `suggest_solution`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SolutionSuggestion {
    Recommended(RecommendedSolution),
    /// No similar case; generic low-confidence guidance
    NoMatch {
        confidence: ConfidenceLevel,
        message: String,
        recommendation: String,
    },
}

impl SolutionSuggestion {
    pub fn confidence(&self) -> ConfidenceLevel {
        match self {
            Self::Recommended(s) => s.confidence,
            Self::NoMatch { confidence, .. } => *confidence,
        }
    }
}

/// Alert severity for the active-alert rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertSeverity {
    Critical,
    High,
    Medium,
}

/// Which rule raised an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertType {
    #[serde(rename = "Performance_Drop")]
    PerformanceDrop,
    #[serde(rename = "Low_OEE")]
    LowOee,
    #[serde(rename = "High_Variability")]
    HighVariability,
    #[serde(rename = "Low_Availability")]
    LowAvailability,
    #[serde(rename = "Quality_Issue")]
    QualityIssue,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PerformanceDrop => "Performance_Drop",
            Self::LowOee => "Low_OEE",
            Self::HighVariability => "High_Variability",
            Self::LowAvailability => "Low_Availability",
            Self::QualityIssue => "Quality_Issue",
        }
    }
}

/// An alert raised from the most recent observations of a line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveAlert {
    pub id: usize,
    pub line_id: String,
    pub severity: AlertSeverity,
    pub alert_type: AlertType,
    pub message: String,
    /// Value that triggered the rule (OEE, availability, quality or std)
    pub current_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deviation: Option<f64>,
    pub raised_at: NaiveDateTime,
    pub recommended_action: String,
}

/// Per-symptom aggregate used in trend analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymptomSummary {
    pub symptom: String,
    pub count: usize,
    pub avg_resolution_time: f64,
    pub avg_impact: f64,
}

/// Direction of anomaly frequency over recent months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnomalyTrend {
    Increasing,
    Stable,
}

/// Knowledge-base trend analysis over a trailing window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyTrendReport {
    pub total_anomalies: usize,
    pub avg_resolution_time: f64,
    pub total_impact_oee: f64,
    pub most_common: Vec<SymptomSummary>,
    pub most_problematic_machine: Option<String>,
    pub trend: AnomalyTrend,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_type_wire_names() {
        let json = serde_json::to_string(&AlertType::QualityIssue).unwrap();
        assert_eq!(json, "\"Quality_Issue\"");
        assert_eq!(AlertType::LowOee.as_str(), "Low_OEE");
    }

    #[test]
    fn test_index_text_falls_back_to_empty() {
        let record: AnomalyRecord = serde_json::from_str(
            r#"{
                "anomaly_id": 1,
                "timestamp": "2024-01-01T00:00:00",
                "line_id": "L1",
                "machine_id": "M1-1",
                "root_cause": "worn belts",
                "solution_applied": "Belt replacement",
                "resolution_time_minutes": 60,
                "impact_oee": -15.0,
                "recurrence_count": 1,
                "priority": "High",
                "status": "Resolved"
            }"#,
        )
        .unwrap();
        assert_eq!(record.index_text(), " worn belts");
        assert_eq!(record.solution, "Belt replacement");
    }
}
