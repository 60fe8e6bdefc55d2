//! Forecast decision objects returned by the ensemble forecaster.

use serde::{Deserialize, Serialize};

use super::ConfidenceLevel;

/// Intra-day direction of the predicted OEE curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

impl Trend {
    /// Classify a degree-1 slope against a symmetric threshold.
    pub fn from_slope(slope: f64, threshold: f64) -> Self {
        if slope > threshold {
            Self::Increasing
        } else if slope < -threshold {
            Self::Decreasing
        } else {
            Self::Stable
        }
    }
}

/// Spread label for a multi-day forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stability {
    Stable,
    Variable,
}

/// Mean predicted OEE for one future production day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyForecast {
    /// ISO date (`YYYY-MM-DD`)
    pub date: String,
    pub oee_predicted: f64,
    pub confidence: ConfidenceLevel,
    pub trend: Trend,
}

/// Summary statistics over a line's daily forecasts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastStatistics {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std: f64,
    pub stability: Stability,
}

/// Detailed multi-day forecast for a single line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineForecast {
    pub line_id: String,
    pub predictions: Vec<DailyForecast>,
    pub statistics: ForecastStatistics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trend_thresholds_are_exclusive() {
        assert_eq!(Trend::from_slope(0.51, 0.5), Trend::Increasing);
        assert_eq!(Trend::from_slope(0.5, 0.5), Trend::Stable);
        assert_eq!(Trend::from_slope(-0.5, 0.5), Trend::Stable);
        assert_eq!(Trend::from_slope(-0.51, 0.5), Trend::Decreasing);
    }
}
