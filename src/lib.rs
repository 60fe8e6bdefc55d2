//! OEE Engine: Predictive-optimization decisions for manufacturing lines
//!
//! Turns historical line telemetry and anomaly records into decisions: which
//! line to run a job on, what speed to run it at, and how to fix a recurring
//! fault.
//!
//! ## Architecture
//!
//! - **Feature Builder**: Calendar, one-hot, ratio and rolling-OEE features
//!   with explicit column alignment between training and inference
//! - **Ensemble Forecaster**: Random forest + gradient boosting OEE forecaster
//!   with an R² acceptance gate and clipped outputs
//! - **Speed Optimizer**: Grid search for the speed maximizing net good output
//! - **Anomaly Retrieval**: TF-IDF similarity over past anomalies, remedy
//!   synthesis and rule-based active alerts
//! - **Line Recommender**: Composes forecasts with static line metadata

pub mod config;
pub mod error;
pub mod types;
pub mod ml_engine;
pub mod anomaly;
pub mod recommender;

// Re-export configuration
pub use config::{ConfigError, EngineConfig};

// Re-export errors
pub use error::{EngineError, ModelKind};

// Re-export commonly used types
pub use types::{
    ActiveAlert, AnomalyRecord, ConfidenceLevel, DailyForecast, LineRecommendation,
    ModelState, ObservationRecord, OptimalSpeedResult, SimilarCase, SolutionSuggestion,
    SpeedRange,
};

// Re-export components
pub use anomaly::{derive_active_alerts, AnomalyExpert};
pub use ml_engine::{
    BundleStore, EnsembleForecaster, FeatureBuilder, ModelStorage, SpeedOptimizer,
};
pub use recommender::LineRecommender;
