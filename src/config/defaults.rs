//! System-wide default constants.
//!
//! Values that are not operator-tunable (they are part of the feature schema
//! or the storage layout) live here rather than in `EngineConfig`.

// ============================================================================
// Configuration discovery
// ============================================================================

/// Environment variable pointing at a TOML config file.
pub const CONFIG_ENV_VAR: &str = "OEE_ENGINE_CONFIG";

/// Config file looked up in the working directory when the env var is unset.
pub const LOCAL_CONFIG_FILE: &str = "oee_engine.toml";

// ============================================================================
// Feature schema
// ============================================================================

/// Short rolling OEE window (observations).
pub const ROLLING_SHORT_WINDOW: usize = 7;

/// Long rolling OEE window (observations).
pub const ROLLING_LONG_WINDOW: usize = 24;

/// Added to ratio denominators so that a zero component never divides by zero.
pub const RATIO_EPSILON: f64 = 0.01;

// ============================================================================
// Model storage
// ============================================================================

/// Storage key of the forecaster ensemble bundle.
pub const FORECASTER_BUNDLE_KEY: &str = "forecaster/oee_ensemble";

/// Storage key of the speed-optimizer bundle.
pub const SPEED_OPTIMIZER_BUNDLE_KEY: &str = "speed_optimizer/bundle";

// ============================================================================
// Decision defaults
// ============================================================================

/// Forecast horizon used when the caller does not specify one (days).
pub const DEFAULT_FORECAST_DAYS: usize = 7;

/// Job size used when the caller does not specify one (pieces).
pub const DEFAULT_JOB_QUANTITY: u64 = 1_000;

/// Longest forecast horizon accepted (days).
pub const MAX_FORECAST_DAYS: usize = 366;

/// Largest speed grid a single sweet-spot scan may evaluate.
pub const MAX_SPEED_GRID_POINTS: usize = 10_000;
