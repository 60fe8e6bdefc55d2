//! Engine Configuration - plant reference data and model thresholds as TOML values
//!
//! Each struct implements `Default` with the values the plant runs with, so an
//! empty (or absent) config file yields a working engine.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults::{CONFIG_ENV_VAR, LOCAL_CONFIG_FILE};
use crate::types::SpeedRange;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one plant deployment.
///
/// Load with `EngineConfig::load()` which searches:
/// 1. `$OEE_ENGINE_CONFIG` env var
/// 2. `./oee_engine.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Production lines, in the order they are reported
    #[serde(default = "default_lines")]
    pub lines: Vec<LineConfig>,

    /// Known product types (one-hot encoded by the speed optimizer)
    #[serde(default = "default_products")]
    pub products: Vec<ProductConfig>,

    #[serde(default)]
    pub forecaster: ForecasterConfig,

    #[serde(default)]
    pub speed_optimizer: SpeedOptimizerConfig,

    #[serde(default)]
    pub anomaly: AnomalyConfig,

    #[serde(default)]
    pub alerts: AlertThresholds,

    #[serde(default)]
    pub recommender: RecommenderConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lines: default_lines(),
            products: default_products(),
            forecaster: ForecasterConfig::default(),
            speed_optimizer: SpeedOptimizerConfig::default(),
            anomaly: AnomalyConfig::default(),
            alerts: AlertThresholds::default(),
            recommender: RecommenderConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration using the standard search order:
    /// 1. `$OEE_ENGINE_CONFIG` environment variable
    /// 2. `./oee_engine.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), lines = config.lines.len(), "Loaded engine config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        // 2. Check ./oee_engine.toml
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(lines = config.lines.len(), "Loaded engine config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        // 3. Defaults
        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path and validate it.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Engine config saved");
        Ok(())
    }

    /// Look up a line by identifier.
    pub fn line(&self, line_id: &str) -> Option<&LineConfig> {
        self.lines.iter().find(|l| l.id == line_id)
    }

    /// Line identifiers in configured order.
    pub fn line_ids(&self) -> Vec<String> {
        self.lines.iter().map(|l| l.id.clone()).collect()
    }

    /// Product identifiers in configured order.
    pub fn product_ids(&self) -> Vec<String> {
        self.products.iter().map(|p| p.id.clone()).collect()
    }

    /// Validate everything for internal consistency, reporting every problem at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.lines.is_empty() {
            errors.push("at least one line must be configured".to_string());
        }
        let mut seen = HashSet::new();
        for line in &self.lines {
            if !seen.insert(line.id.as_str()) {
                errors.push(format!("duplicate line id '{}'", line.id));
            }
            if line.min_speed >= line.max_speed {
                errors.push(format!(
                    "lines.{}: min_speed ({}) must be < max_speed ({})",
                    line.id, line.min_speed, line.max_speed
                ));
            }
            if !line.speed_range().contains(line.optimal_estimate) {
                errors.push(format!(
                    "lines.{}: optimal_estimate ({}) must lie within [{}, {}]",
                    line.id, line.optimal_estimate, line.min_speed, line.max_speed
                ));
            }
            if line.nominal_speed <= 0.0 {
                errors.push(format!("lines.{}: nominal_speed must be > 0", line.id));
            }
            if !(line.quality_rate > 0.0 && line.quality_rate <= 1.0) {
                errors.push(format!("lines.{}: quality_rate must be in (0, 1]", line.id));
            }
        }
        let mut seen = HashSet::new();
        for product in &self.products {
            if !seen.insert(product.id.as_str()) {
                errors.push(format!("duplicate product id '{}'", product.id));
            }
        }

        let f = &self.forecaster;
        if (f.forest_weight + f.boosting_weight - 1.0).abs() > 0.01 {
            errors.push(format!(
                "forecaster: blend weights sum to {:.3}, expected 1.0",
                f.forest_weight + f.boosting_weight
            ));
        }
        if f.clip_min >= f.clip_max {
            errors.push(format!(
                "forecaster: clip_min ({}) must be < clip_max ({})",
                f.clip_min, f.clip_max
            ));
        }
        if f.production_start_hour > f.production_end_hour || f.production_end_hour > 23 {
            errors.push(format!(
                "forecaster: production hours {}..={} must be ordered and < 24",
                f.production_start_hour, f.production_end_hour
            ));
        }
        Self::check_fraction(f.test_fraction, "forecaster.test_fraction", &mut errors);
        if f.recent_window_rows == 0 || f.carry_forward_rows == 0 {
            errors.push("forecaster: recent/carry-forward windows must be > 0".to_string());
        }
        if f.min_training_rows < 2 {
            errors.push("forecaster.min_training_rows must be >= 2".to_string());
        }
        Self::check_forest(&f.forest, "forecaster.forest", &mut errors);
        Self::check_boosting(&f.boosting, "forecaster.boosting", &mut errors);

        let s = &self.speed_optimizer;
        if s.default_step <= 0.0 {
            errors.push("speed_optimizer.default_step must be > 0".to_string());
        }
        if s.decrease_factor >= s.increase_factor {
            errors.push(format!(
                "speed_optimizer: decrease_factor ({}) must be < increase_factor ({})",
                s.decrease_factor, s.increase_factor
            ));
        }
        if s.medium_confidence_pct > s.high_confidence_pct {
            errors.push("speed_optimizer: medium_confidence_pct must be <= high_confidence_pct".to_string());
        }
        Self::check_fraction(s.test_fraction, "speed_optimizer.test_fraction", &mut errors);
        if s.min_training_rows < 2 {
            errors.push("speed_optimizer.min_training_rows must be >= 2".to_string());
        }
        Self::check_boosting(&s.boosting, "speed_optimizer.boosting", &mut errors);

        let a = &self.anomaly;
        if a.max_features == 0 || a.top_k == 0 {
            errors.push("anomaly: max_features and top_k must be > 0".to_string());
        }
        if !(0.0..1.0).contains(&a.min_similarity) {
            errors.push("anomaly.min_similarity must be in [0, 1)".to_string());
        }

        let t = &self.alerts;
        if t.critical_oee > t.low_oee {
            errors.push(format!(
                "alerts: critical_oee ({}) must be <= low_oee ({})",
                t.critical_oee, t.low_oee
            ));
        }
        if t.sigma <= 0.0 || t.window_hours == 0 {
            errors.push("alerts: sigma and window_hours must be > 0".to_string());
        }

        // Reject NaN/Inf in any value (sweep all f64 fields via serialization)
        if let Ok(tree) = toml::Value::try_from(self) {
            if Self::has_non_finite(&tree) {
                errors.push("Config contains NaN or Inf values, all thresholds must be finite numbers".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn has_non_finite(value: &toml::Value) -> bool {
        match value {
            toml::Value::Float(f) => !f.is_finite(),
            toml::Value::Array(items) => items.iter().any(Self::has_non_finite),
            toml::Value::Table(table) => table.values().any(Self::has_non_finite),
            _ => false,
        }
    }

    fn check_fraction(value: f64, name: &str, errors: &mut Vec<String>) {
        if !(value > 0.0 && value < 1.0) {
            errors.push(format!("{name} must be in (0, 1), got {value}"));
        }
    }

    fn check_forest(p: &ForestParams, name: &str, errors: &mut Vec<String>) {
        if p.n_estimators == 0 || p.max_depth == 0 || p.min_samples_split < 2 {
            errors.push(format!(
                "{name}: n_estimators and max_depth must be > 0, min_samples_split >= 2"
            ));
        }
    }

    fn check_boosting(p: &BoostingParams, name: &str, errors: &mut Vec<String>) {
        if p.n_estimators == 0 || p.max_depth == 0 || p.min_samples_split < 2 {
            errors.push(format!(
                "{name}: n_estimators and max_depth must be > 0, min_samples_split >= 2"
            ));
        }
        if !(p.learning_rate > 0.0 && p.learning_rate <= 1.0) {
            errors.push(format!("{name}.learning_rate must be in (0, 1]"));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Plant Reference Data
// ============================================================================

/// Static characteristics of one production line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineConfig {
    pub id: String,
    /// Lowest admissible machine speed (pieces/hour)
    pub min_speed: f64,
    /// Highest admissible machine speed (pieces/hour)
    pub max_speed: f64,
    /// Speed the line is normally run at; improvement reference
    pub optimal_estimate: f64,
    /// Nameplate throughput used for job duration estimates (pieces/hour)
    pub nominal_speed: f64,
    /// Long-run fraction of good pieces, in (0, 1]
    pub quality_rate: f64,
    /// Product changeover flexibility, in [0, 1]
    pub flexibility: f64,
    #[serde(default = "default_maintenance_level")]
    pub maintenance_level: String,
    pub operators_required: u32,
}

impl LineConfig {
    pub fn speed_range(&self) -> SpeedRange {
        SpeedRange {
            min_speed: self.min_speed,
            max_speed: self.max_speed,
            optimal_estimate: self.optimal_estimate,
        }
    }
}

fn default_maintenance_level() -> String {
    "Medium".to_string()
}

fn default_lines() -> Vec<LineConfig> {
    let line = |id: &str, min, max, est, nominal, quality, flex, maint: &str, ops| LineConfig {
        id: id.to_string(),
        min_speed: min,
        max_speed: max,
        optimal_estimate: est,
        nominal_speed: nominal,
        quality_rate: quality,
        flexibility: flex,
        maintenance_level: maint.to_string(),
        operators_required: ops,
    };
    vec![
        line("L1", 700.0, 1300.0, 1000.0, 1200.0, 0.97, 0.85, "Good", 3),
        line("L2", 800.0, 1400.0, 1100.0, 1400.0, 0.94, 0.90, "Medium", 4),
        line("L3", 600.0, 1200.0, 900.0, 1000.0, 0.92, 0.75, "Medium", 2),
    ]
}

/// A product type the plant manufactures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductConfig {
    pub id: String,
    /// Relative forming complexity, 1.0 = most complex
    #[serde(default = "default_complexity")]
    pub complexity: f64,
    /// Achievable speed relative to the line reference
    #[serde(default = "default_speed_factor")]
    pub speed_factor: f64,
}

fn default_complexity() -> f64 { 1.0 }
fn default_speed_factor() -> f64 { 1.0 }

fn default_products() -> Vec<ProductConfig> {
    [
        ("Fond_Plat", 0.7, 1.15),
        ("Fond_Carre_Sans_Poignees", 0.8, 1.10),
        ("Fond_Carre_Poignees_Plates", 0.9, 0.95),
        ("Fond_Carre_Poignees_Torsadees", 1.0, 0.85),
    ]
    .into_iter()
    .map(|(id, complexity, speed_factor)| ProductConfig {
        id: id.to_string(),
        complexity,
        speed_factor,
    })
    .collect()
}

// ============================================================================
// Regressor hyper-parameters
// ============================================================================

/// Bagged regression-tree forest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 15,
            min_samples_split: 10,
        }
    }
}

/// Least-squares gradient boosting over shallow trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_split: usize,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 7,
            min_samples_split: 2,
        }
    }
}

// ============================================================================
// Ensemble Forecaster
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecasterConfig {
    /// A trained ensemble is installed only if held-out R² exceeds this
    pub min_r2: f64,
    pub test_fraction: f64,
    pub seed: u64,
    pub forest_weight: f64,
    pub boosting_weight: f64,
    /// Physically plausible OEE band predictions are clipped to
    pub clip_min: f64,
    pub clip_max: f64,
    /// First hourly slot of a synthesized production day
    pub production_start_hour: u32,
    /// Last hourly slot (inclusive)
    pub production_end_hour: u32,
    /// History rows considered "recent" when forecasting
    pub recent_window_rows: usize,
    /// Rows averaged to carry availability/performance/quality forward
    pub carry_forward_rows: usize,
    /// Intra-day slope beyond which a day is Increasing/Decreasing
    pub trend_slope_threshold: f64,
    /// Daily-mean std below which a line forecast is Stable
    pub stability_std_threshold: f64,
    pub min_training_rows: usize,
    pub forest: ForestParams,
    pub boosting: BoostingParams,
}

impl Default for ForecasterConfig {
    fn default() -> Self {
        Self {
            min_r2: 0.75,
            test_fraction: 0.2,
            seed: 42,
            forest_weight: 0.6,
            boosting_weight: 0.4,
            clip_min: 40.0,
            clip_max: 95.0,
            production_start_hour: 8,
            production_end_hour: 20,
            recent_window_rows: 168,
            carry_forward_rows: 24,
            trend_slope_threshold: 0.5,
            stability_std_threshold: 3.0,
            min_training_rows: 10,
            forest: ForestParams::default(),
            boosting: BoostingParams::default(),
        }
    }
}

// ============================================================================
// Speed Sweet-Spot Optimizer
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedOptimizerConfig {
    /// Grid resolution when the caller passes no step (pieces/hour)
    pub default_step: f64,
    /// `optimal > increase_factor × current` ⇒ increase
    pub increase_factor: f64,
    /// `optimal < decrease_factor × current` ⇒ decrease
    pub decrease_factor: f64,
    /// `|improvement| > high_confidence_pct` ⇒ High confidence
    pub high_confidence_pct: f64,
    pub medium_confidence_pct: f64,
    pub test_fraction: f64,
    pub seed: u64,
    pub min_training_rows: usize,
    pub boosting: BoostingParams,
}

impl Default for SpeedOptimizerConfig {
    fn default() -> Self {
        Self {
            default_step: 25.0,
            increase_factor: 1.1,
            decrease_factor: 0.9,
            high_confidence_pct: 5.0,
            medium_confidence_pct: 2.0,
            test_fraction: 0.2,
            seed: 42,
            min_training_rows: 10,
            boosting: BoostingParams {
                max_depth: 5,
                ..BoostingParams::default()
            },
        }
    }
}

// ============================================================================
// Anomaly Retrieval
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyConfig {
    /// Vocabulary bound of the TF-IDF index
    #[serde(default = "default_max_features")]
    pub max_features: usize,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Cosine similarity (0..1) a match must strictly exceed
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,

    /// Cases sharing a solution needed for High confidence
    #[serde(default = "default_high_confidence_count")]
    pub high_confidence_count: usize,

    /// Recurrence count below which a past fix is rated High effectiveness
    #[serde(default = "default_recurrence_threshold")]
    pub recurrence_threshold: u32,
}

fn default_max_features() -> usize { 100 }
fn default_top_k() -> usize { 5 }
fn default_min_similarity() -> f64 { 0.1 }
fn default_high_confidence_count() -> usize { 3 }
fn default_recurrence_threshold() -> u32 { 2 }

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            max_features: default_max_features(),
            top_k: default_top_k(),
            min_similarity: default_min_similarity(),
            high_confidence_count: default_high_confidence_count(),
            recurrence_threshold: default_recurrence_threshold(),
        }
    }
}

/// Active-alert rule thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertThresholds {
    /// Standard deviations below the trailing mean for a performance drop
    #[serde(default = "default_alert_sigma")]
    pub sigma: f64,

    /// A performance drop is Critical only below this OEE (%)
    #[serde(default = "default_critical_oee")]
    pub critical_oee: f64,

    #[serde(default = "default_low_oee")]
    pub low_oee: f64,

    /// Trailing OEE std above which the line is flagged as unstable
    #[serde(default = "default_variability_std")]
    pub variability_std: f64,

    #[serde(default = "default_min_availability")]
    pub min_availability: f64,

    #[serde(default = "default_min_quality")]
    pub min_quality: f64,

    /// Trailing window of observations inspected (hours)
    #[serde(default = "default_alert_window_hours")]
    pub window_hours: u32,
}

fn default_alert_sigma() -> f64 { 2.0 }
fn default_critical_oee() -> f64 { 65.0 }
fn default_low_oee() -> f64 { 70.0 }
fn default_variability_std() -> f64 { 8.0 }
fn default_min_availability() -> f64 { 80.0 }
fn default_min_quality() -> f64 { 93.0 }
fn default_alert_window_hours() -> u32 { 24 }

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            sigma: default_alert_sigma(),
            critical_oee: default_critical_oee(),
            low_oee: default_low_oee(),
            variability_std: default_variability_std(),
            min_availability: default_min_availability(),
            min_quality: default_min_quality(),
            window_hours: default_alert_window_hours(),
        }
    }
}

// ============================================================================
// Line Recommender
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommenderConfig {
    /// OEE assumed for a line with neither forecast nor history (%)
    pub fallback_oee: f64,
    /// Trailing observations averaged when no forecast is available
    pub recent_rows: usize,
    /// Job recommendation is High confidence above this score
    pub high_confidence_score: f64,
    /// Days of history scored by `get_best_line`
    pub best_line_window_days: i64,
    pub best_line_high_confidence_score: f64,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            fallback_oee: 70.0,
            recent_rows: 24,
            high_confidence_score: 80.0,
            best_line_window_days: 7,
            best_line_high_confidence_score: 75.0,
        }
    }
}

// ============================================================================
// Storage
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// sled database directory for trained bundles
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/models"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
