//! ML Engine for line performance forecasting and speed optimization
//!
//! This module turns historical line telemetry into numeric feature tables and
//! trains the two regression components of the engine: the OEE ensemble
//! forecaster and the speed sweet-spot optimizer.
//!
//! ## Key Features
//! - Deterministic feature construction with explicit column alignment
//! - Random forest + gradient boosting ensemble with a quality gate on R²
//! - Grid search for the speed maximizing net good output
//! - Trained bundles are swapped in atomically and persisted to sled
//!
//! ## Architecture
//! - `features`: Calendar, one-hot, ratio and rolling features
//! - `scaler`: Standardization fitted on the training split
//! - `evaluation`: Seeded hold-out split, MAE and R²
//! - `tree` / `ensemble`: CART regression trees, forest and boosting
//! - `forecaster`: Ensemble OEE forecaster and multi-day horizons
//! - `speed_optimizer`: Production/quality regressors and sweet-spot search
//! - `storage`: Bundle persistence

pub mod features;
pub mod scaler;
pub mod evaluation;
pub mod tree;
pub mod ensemble;
pub mod forecaster;
pub mod speed_optimizer;
pub mod storage;

// Re-export public types
pub use features::{FeatureBuilder, FeatureTable};
pub use scaler::StandardScaler;
pub use ensemble::{GradientBoostingRegressor, RandomForestRegressor, Regressor};
pub use forecaster::{EnsembleForecaster, ForecastBundle};
pub use speed_optimizer::{SpeedBundle, SpeedOptimizer, SpeedResponse, SweetSpotSearch};
pub use storage::{BundleStore, ModelStorage, StorageError};
