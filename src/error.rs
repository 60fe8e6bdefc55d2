//! Engine error taxonomy.
//!
//! Data-shape problems (missing optional columns, unknown categories) are
//! recovered locally and never surface here. Model-readiness problems are
//! returned as typed failures so the caller can choose between retraining and
//! serving a degraded "no recommendation" response.

use thiserror::Error;

use crate::ml_engine::storage::StorageError;

/// Which trained model an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Forecaster,
    SpeedOptimizer,
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelKind::Forecaster => write!(f, "OEE forecaster"),
            ModelKind::SpeedOptimizer => write!(f, "speed optimizer"),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Insufficient data for {stage}: {detail}")]
    InsufficientData { stage: &'static str, detail: String },

    #[error("{model} is not trained (train or load a bundle first)")]
    ModelNotTrained { model: ModelKind },

    #[error("Model rejected: R² {r2:.3} does not exceed {threshold:.2} (MAE {mae:.2})")]
    BelowQualityThreshold { r2: f64, threshold: f64, mae: f64 },

    #[error("Unknown line '{line_id}' during {stage}")]
    UnknownLine { line_id: String, stage: &'static str },

    #[error("Invalid record at row {index}: {reason}")]
    InvalidRecord { index: usize, reason: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl EngineError {
    /// True for failures that a retrain (or a bundle load) could resolve.
    pub fn is_model_readiness(&self) -> bool {
        matches!(
            self,
            EngineError::ModelNotTrained { .. } | EngineError::BelowQualityThreshold { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_context() {
        let err = EngineError::UnknownLine {
            line_id: "L9".to_string(),
            stage: "speed search",
        };
        assert_eq!(err.to_string(), "Unknown line 'L9' during speed search");

        let err = EngineError::ModelNotTrained {
            model: ModelKind::SpeedOptimizer,
        };
        assert!(err.to_string().contains("speed optimizer"));
        assert!(err.is_model_readiness());
    }
}
