//! Speed Sweet-Spot Optimizer
//!
//! Two gradient-boosting regressors predict production rate (pieces/hour) and
//! quality rate (% good) from speed, line and product. The sweet spot is the
//! speed that maximizes net good output `production × quality / 100`.
//!
//! ## Key Features
//! - Exhaustive scan of the line's closed speed interval at a fixed step; the
//!   objective combines two independently learned regressors, so it is neither
//!   convex nor differentiable and a grid scan is exact at grid resolution
//! - The first (lowest) speed reaching the maximum wins ties
//! - Improvement is reported against the line's reference speed and mapped to
//!   an increase / decrease / maintain action with a confidence label
//! - The scan is generic over `SpeedResponse`, so any response model can be
//!   searched

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::ensemble::{GradientBoostingRegressor, Regressor};
use super::evaluation::{r2_score, round_to, take_rows, train_test_split};
use super::features::FeatureBuilder;
use super::scaler::StandardScaler;
use super::storage::{load_bundle, save_bundle, BundleStore, StorageError};
use crate::config::defaults::{MAX_SPEED_GRID_POINTS, SPEED_OPTIMIZER_BUNDLE_KEY};
use crate::config::{EngineConfig, SpeedOptimizerConfig};
use crate::error::{EngineError, ModelKind};
use crate::types::{
    validate_batch, ConfidenceLevel, FleetSpeedRecommendations, LineSpeedOutcome, ModelState,
    ObservationRecord, OptimalSpeedResult, SpeedAction, SpeedPoint, SpeedRange,
    SpeedTrainingReport,
};

/// Predicted line response at a given speed.
pub trait SpeedResponse {
    /// `(production_rate, quality_rate)` for `line_id` running `product_type` at `speed`.
    fn respond(&self, line_id: &str, product_type: &str, speed: f64) -> (f64, f64);
}

/// Grid search over a speed range.
pub struct SweetSpotSearch;

impl SweetSpotSearch {
    /// `min, min + step, ...` up to and including `max` when it lies on the grid.
    pub fn speed_grid(range: &SpeedRange, step: f64) -> Result<Vec<f64>, EngineError> {
        if !(step.is_finite() && step > 0.0) {
            return Err(EngineError::InvalidArgument(format!(
                "speed step must be a positive number, got {step}"
            )));
        }
        if range.max_speed < range.min_speed {
            return Err(EngineError::InvalidArgument(format!(
                "empty speed range [{}, {}]",
                range.min_speed, range.max_speed
            )));
        }
        let span = ((range.max_speed - range.min_speed) / step + 1e-9).floor();
        if span >= MAX_SPEED_GRID_POINTS as f64 {
            return Err(EngineError::InvalidArgument(format!(
                "speed step {step} gives more than {MAX_SPEED_GRID_POINTS} grid points"
            )));
        }
        let count = span as usize;
        Ok((0..=count)
            .map(|i| range.min_speed + i as f64 * step)
            .collect())
    }

    /// Rounded curve point at one speed.
    pub fn evaluate(model: &dyn SpeedResponse, line_id: &str, product_type: &str, speed: f64) -> SpeedPoint {
        let (production, quality) = model.respond(line_id, product_type, speed);
        SpeedPoint {
            speed,
            production_rate: round_to(production, 1),
            quality_rate: round_to(quality, 2),
            defect_rate: round_to(100.0 - quality, 2),
            net_output: round_to(production * quality / 100.0, 1),
        }
    }

    /// Scan the whole grid and classify the best speed against `current_speed`.
    pub fn search(
        model: &dyn SpeedResponse,
        line_id: &str,
        product_type: &str,
        range: &SpeedRange,
        step: f64,
        current_speed: f64,
        policy: &SpeedOptimizerConfig,
    ) -> Result<OptimalSpeedResult, EngineError> {
        let grid = Self::speed_grid(range, step)?;

        // Ranked on the reported (rounded) net output, so the winner is the
        // lowest speed among the points that read as the maximum.
        let mut curve_data = Vec::with_capacity(grid.len());
        let mut best: Option<(f64, f64)> = None;
        for &speed in &grid {
            let point = Self::evaluate(model, line_id, product_type, speed);
            if best.map_or(true, |(_, best_net)| point.net_output > best_net) {
                best = Some((speed, point.net_output));
            }
            curve_data.push(point);
        }
        let (optimal_speed, max_net) = best.ok_or_else(|| {
            EngineError::InvalidArgument(format!("speed range for line '{line_id}' has no grid points"))
        })?;

        let current_net = Self::evaluate(model, line_id, product_type, current_speed).net_output;
        let improvement_pct = if current_net.abs() > f64::EPSILON {
            (max_net - current_net) / current_net * 100.0
        } else {
            0.0
        };

        let (action, recommendation) = if optimal_speed > current_speed * policy.increase_factor {
            (SpeedAction::Increase, format!("Increase speed to {optimal_speed:.0} pcs/h"))
        } else if optimal_speed < current_speed * policy.decrease_factor {
            (SpeedAction::Decrease, format!("Reduce speed to {optimal_speed:.0} pcs/h"))
        } else {
            (
                SpeedAction::Maintain,
                format!("Maintain current speed (~{current_speed:.0} pcs/h)"),
            )
        };

        let confidence = if improvement_pct.abs() > policy.high_confidence_pct {
            ConfidenceLevel::High
        } else if improvement_pct.abs() > policy.medium_confidence_pct {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        };

        debug!(
            line_id = %line_id,
            product_type = %product_type,
            optimal_speed,
            grid_points = grid.len(),
            "Sweet-spot search complete"
        );

        Ok(OptimalSpeedResult {
            line_id: line_id.to_string(),
            product_type: product_type.to_string(),
            optimal_speed,
            max_net_output: max_net,
            current_speed,
            current_net_output: current_net,
            improvement_pct: round_to(improvement_pct, 2),
            recommendation,
            action,
            confidence,
            curve_data,
        })
    }
}

/// Trained production/quality regressors with their feature contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeedBundle {
    production: GradientBoostingRegressor,
    quality: GradientBoostingRegressor,
    scaler: StandardScaler,
    feature_names: Vec<String>,
    report: SpeedTrainingReport,
}

/// A bundle paired with the feature builder that feeds it.
struct TrainedResponse<'a> {
    bundle: &'a SpeedBundle,
    features: &'a FeatureBuilder,
}

impl SpeedResponse for TrainedResponse<'_> {
    fn respond(&self, line_id: &str, product_type: &str, speed: f64) -> (f64, f64) {
        let table = self.features.speed_query(line_id, product_type, speed);
        let aligned = table.align(&self.bundle.feature_names);
        let Some(row) = aligned.first() else {
            return (0.0, 0.0);
        };
        let scaled = self.bundle.scaler.transform_row(row);
        (
            self.bundle.production.predict_row(&scaled),
            self.bundle.quality.predict_row(&scaled),
        )
    }
}

pub struct SpeedOptimizer {
    config: SpeedOptimizerConfig,
    /// Configured lines and their speed envelopes, in report order
    ranges: Vec<(String, SpeedRange)>,
    features: FeatureBuilder,
    bundle: ArcSwapOption<SpeedBundle>,
    store: Option<Arc<dyn BundleStore>>,
}

impl SpeedOptimizer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            config: config.speed_optimizer.clone(),
            ranges: config
                .lines
                .iter()
                .map(|l| (l.id.clone(), l.speed_range()))
                .collect(),
            features: FeatureBuilder::new(config),
            bundle: ArcSwapOption::empty(),
            store: None,
        }
    }

    /// Attach a store: trainings are saved to it and an untrained optimizer
    /// reloads from it on first use.
    pub fn with_store(mut self, store: Arc<dyn BundleStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn state(&self) -> ModelState {
        if self.bundle.load().is_some() {
            ModelState::Trained
        } else {
            ModelState::Untrained
        }
    }

    pub fn training_report(&self) -> Option<SpeedTrainingReport> {
        self.bundle.load_full().map(|b| b.report.clone())
    }

    pub fn speed_range(&self, line_id: &str) -> Option<SpeedRange> {
        self.ranges
            .iter()
            .find(|(id, _)| id == line_id)
            .map(|(_, r)| *r)
    }

    /// Fit the production and quality regressors and install them.
    ///
    /// Targets: production rate is `total_pieces` (pieces/hour); quality rate is
    /// `good / total × 100`, or 0 when nothing was produced.
    pub fn train(&self, records: &[ObservationRecord]) -> Result<SpeedTrainingReport, EngineError> {
        validate_batch(records)?;
        if records.len() < self.config.min_training_rows {
            return Err(EngineError::InsufficientData {
                stage: "speed optimizer training",
                detail: format!(
                    "{} rows, need at least {}",
                    records.len(),
                    self.config.min_training_rows
                ),
            });
        }

        info!(rows = records.len(), "Training speed optimizer");

        let table = self.features.speed_features(records);
        if table.unknown_lines > 0 || table.unknown_products > 0 {
            warn!(
                unknown_lines = table.unknown_lines,
                unknown_products = table.unknown_products,
                "Training rows with unknown categories encoded as zero vectors"
            );
        }
        let y_production: Vec<f64> = records.iter().map(|r| r.total_pieces as f64).collect();
        let y_quality: Vec<f64> = records.iter().map(|r| r.quality_rate()).collect();

        let (train_idx, test_idx) =
            train_test_split(table.len(), self.config.test_fraction, self.config.seed);
        let scaler = StandardScaler::fit(&take_rows(&table.rows, &train_idx));
        let x_train = scaler.transform(&take_rows(&table.rows, &train_idx));
        let x_test = scaler.transform(&take_rows(&table.rows, &test_idx));

        let prod_train = take_rows(&y_production, &train_idx);
        let qual_train = take_rows(&y_quality, &train_idx);
        let (production, quality) = rayon::join(
            || GradientBoostingRegressor::fit(&x_train, &prod_train, &self.config.boosting),
            || GradientBoostingRegressor::fit(&x_train, &qual_train, &self.config.boosting),
        );

        let production_score = r2_score(&take_rows(&y_production, &test_idx), &production.predict(&x_test));
        let quality_score = r2_score(&take_rows(&y_quality, &test_idx), &quality.predict(&x_test));
        info!(production_score, quality_score, "Speed optimizer evaluated on held-out split");

        let bundle = Arc::new(SpeedBundle {
            production,
            quality,
            scaler,
            feature_names: table.columns.clone(),
            report: SpeedTrainingReport {
                production_score,
                quality_score,
                train_rows: train_idx.len(),
                test_rows: test_idx.len(),
                trained_at: chrono::Utc::now().naive_utc(),
            },
        });
        let report = bundle.report.clone();
        self.bundle.store(Some(Arc::clone(&bundle)));
        info!("Speed optimizer bundle installed");

        if let Some(store) = &self.store {
            if let Err(e) = save_bundle(store.as_ref(), SPEED_OPTIMIZER_BUNDLE_KEY, bundle.as_ref()) {
                warn!(error = %e, "Failed to persist speed optimizer bundle");
            }
        }

        Ok(report)
    }

    /// Predicted production, quality, defect rate and net output at one speed.
    pub fn predict_at_speed(
        &self,
        line_id: &str,
        product_type: &str,
        speed: f64,
    ) -> Result<SpeedPoint, EngineError> {
        let bundle = self.snapshot()?;
        let response = TrainedResponse {
            bundle: &bundle,
            features: &self.features,
        };
        Ok(SweetSpotSearch::evaluate(&response, line_id, product_type, speed))
    }

    /// Sweet spot for a line/product, compared with the line's reference speed.
    ///
    /// `step` defaults to the configured grid resolution.
    pub fn find_optimal_speed(
        &self,
        line_id: &str,
        product_type: &str,
        step: Option<f64>,
    ) -> Result<OptimalSpeedResult, EngineError> {
        self.find_optimal_speed_from(line_id, product_type, step, None)
    }

    /// As `find_optimal_speed`, but compares against `current_speed` when given.
    pub fn find_optimal_speed_from(
        &self,
        line_id: &str,
        product_type: &str,
        step: Option<f64>,
        current_speed: Option<f64>,
    ) -> Result<OptimalSpeedResult, EngineError> {
        let range = self.speed_range(line_id).ok_or_else(|| EngineError::UnknownLine {
            line_id: line_id.to_string(),
            stage: "speed optimization",
        })?;
        let bundle = self.snapshot()?;
        let response = TrainedResponse {
            bundle: &bundle,
            features: &self.features,
        };
        SweetSpotSearch::search(
            &response,
            line_id,
            product_type,
            &range,
            step.unwrap_or(self.config.default_step),
            current_speed.unwrap_or(range.optimal_estimate),
            &self.config,
        )
    }

    /// Run the search on every configured line. A failing line is reported as
    /// an error entry and does not abort the others.
    pub fn get_speed_recommendations_all_lines(&self, product_type: &str) -> FleetSpeedRecommendations {
        let mut recommendations = BTreeMap::new();
        let mut best: Option<(String, f64)> = None;

        for (line_id, _) in &self.ranges {
            let outcome = match self.find_optimal_speed(line_id, product_type, None) {
                Ok(result) => {
                    if result.max_net_output > best.as_ref().map_or(0.0, |(_, v)| *v) {
                        best = Some((line_id.clone(), result.max_net_output));
                    }
                    LineSpeedOutcome::Found(Box::new(result))
                }
                Err(e) => {
                    warn!(line_id = %line_id, error = %e, "Speed recommendation failed for line");
                    LineSpeedOutcome::Failed { error: e.to_string() }
                }
            };
            recommendations.insert(line_id.clone(), outcome);
        }

        FleetSpeedRecommendations {
            product_type: product_type.to_string(),
            recommendations,
            best_line: best.map(|(line, _)| line),
        }
    }

    pub fn save(&self, store: &dyn BundleStore) -> Result<(), EngineError> {
        let bundle = self.bundle.load_full().ok_or(EngineError::ModelNotTrained {
            model: ModelKind::SpeedOptimizer,
        })?;
        save_bundle(store, SPEED_OPTIMIZER_BUNDLE_KEY, bundle.as_ref())?;
        info!("Speed optimizer bundle saved");
        Ok(())
    }

    /// Install a persisted bundle; `false` when absent or corrupt.
    pub fn load(&self, store: &dyn BundleStore) -> Result<bool, EngineError> {
        match load_bundle::<SpeedBundle>(store, SPEED_OPTIMIZER_BUNDLE_KEY) {
            Ok(Some(bundle)) => {
                info!(features = bundle.feature_names.len(), "Speed optimizer bundle loaded");
                self.bundle.store(Some(Arc::new(bundle)));
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(StorageError::Serialization(e)) => {
                warn!(error = %e, "Corrupt speed optimizer bundle ignored");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn snapshot(&self) -> Result<Arc<SpeedBundle>, EngineError> {
        if let Some(bundle) = self.bundle.load_full() {
            return Ok(bundle);
        }
        if let Some(store) = &self.store {
            if self.load(store.as_ref())? {
                if let Some(bundle) = self.bundle.load_full() {
                    return Ok(bundle);
                }
            }
        }
        Err(EngineError::ModelNotTrained {
            model: ModelKind::SpeedOptimizer,
        })
    }
}
