//! Observation records: one row of historical line telemetry (hourly OEE
//! rollup) as handed over by the external loader.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// One historical observation for a production line.
///
/// Required fields are `timestamp`, `line_id`, `product_type` and
/// `machine_speed`. The OEE components and stop statistics form a closed set
/// of optional fields: a missing value never fails the feature builder, it
/// either drops the dependent feature group (OEE components, rolling OEE) or
/// defaults to `0` (stop statistics).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub timestamp: NaiveDateTime,
    pub line_id: String,
    #[serde(default)]
    pub product_type: String,
    /// Machine speed in pieces/hour
    pub machine_speed: f64,
    /// Availability (%)
    #[serde(default)]
    pub availability: Option<f64>,
    /// Performance (%)
    #[serde(default)]
    pub performance: Option<f64>,
    /// Quality (%)
    #[serde(default)]
    pub quality: Option<f64>,
    /// Overall equipment effectiveness (%), within [0, 100]
    #[serde(default)]
    pub oee: Option<f64>,
    #[serde(default)]
    pub good_pieces: u64,
    #[serde(default)]
    pub total_pieces: u64,
    /// Number of stops recorded for the line on that day
    #[serde(default)]
    pub stop_count: Option<f64>,
    /// Total stop duration (minutes) for the line on that day
    #[serde(default)]
    pub stop_duration: Option<f64>,
}

impl ObservationRecord {
    /// Minimal record carrying only the required fields.
    pub fn new(
        timestamp: NaiveDateTime,
        line_id: impl Into<String>,
        product_type: impl Into<String>,
        machine_speed: f64,
    ) -> Self {
        Self {
            timestamp,
            line_id: line_id.into(),
            product_type: product_type.into(),
            machine_speed,
            availability: None,
            performance: None,
            quality: None,
            oee: None,
            good_pieces: 0,
            total_pieces: 0,
            stop_count: None,
            stop_duration: None,
        }
    }

    /// Fraction of good pieces as a percentage, guarded to 0 when nothing was produced.
    pub fn quality_rate(&self) -> f64 {
        if self.total_pieces == 0 {
            0.0
        } else {
            self.good_pieces as f64 / self.total_pieces as f64 * 100.0
        }
    }

    /// Check the record invariants (`oee ∈ [0, 100]`, `good ≤ total`, finite speed).
    pub fn validate(&self, index: usize) -> Result<(), EngineError> {
        if !self.machine_speed.is_finite() || self.machine_speed < 0.0 {
            return Err(EngineError::InvalidRecord {
                index,
                reason: format!("machine_speed must be finite and >= 0, got {}", self.machine_speed),
            });
        }
        if let Some(oee) = self.oee {
            if !(0.0..=100.0).contains(&oee) {
                return Err(EngineError::InvalidRecord {
                    index,
                    reason: format!("oee must be within [0, 100], got {oee}"),
                });
            }
        }
        if self.good_pieces > self.total_pieces {
            return Err(EngineError::InvalidRecord {
                index,
                reason: format!(
                    "good_pieces ({}) exceeds total_pieces ({})",
                    self.good_pieces, self.total_pieces
                ),
            });
        }
        Ok(())
    }
}

/// Validate a whole batch, reporting the first offending row.
pub fn validate_batch(records: &[ObservationRecord]) -> Result<(), EngineError> {
    records
        .iter()
        .enumerate()
        .try_for_each(|(i, r)| r.validate(i))
}

/// Static operating envelope for a line (pieces/hour).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedRange {
    pub min_speed: f64,
    pub max_speed: f64,
    /// Reference speed the line is normally run at
    pub optimal_estimate: f64,
}

impl SpeedRange {
    pub fn contains(&self, speed: f64) -> bool {
        speed >= self.min_speed && speed <= self.max_speed
    }
}
