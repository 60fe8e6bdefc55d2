//! Ensemble OEE Forecaster
//!
//! Blends a random forest and a gradient-boosting regressor (0.6 / 0.4 by
//! default) trained on forecast features, and rolls single-slot predictions up
//! into daily forecasts per line.
//!
//! ## Lifecycle
//! `Untrained → Trained`, with nothing in between. `train` builds a complete
//! bundle off to the side and installs it with one atomic swap, and only when
//! the held-out R² clears the acceptance gate. A rejected or failed training
//! leaves whatever was installed before (possibly nothing) untouched. Readers
//! take a snapshot of the bundle per call, so they always see either the old
//! or the new model, never a mix.

use arc_swap::ArcSwapOption;
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::ensemble::{GradientBoostingRegressor, RandomForestRegressor, Regressor};
use super::evaluation::{
    linear_slope, mean_absolute_error, r2_score, round_to, take_rows, train_test_split,
};
use super::features::FeatureBuilder;
use super::scaler::StandardScaler;
use super::storage::{load_bundle, save_bundle, BundleStore, StorageError};
use crate::config::defaults::{FORECASTER_BUNDLE_KEY, MAX_FORECAST_DAYS};
use crate::config::{EngineConfig, ForecasterConfig};
use crate::error::{EngineError, ModelKind};
use crate::types::{
    validate_batch, ConfidenceLevel, DailyForecast, ForecastStatistics, ForecastTrainingReport,
    LineForecast, ModelState, ObservationRecord, Stability, Trend,
};

/// Everything needed to serve predictions; immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastBundle {
    forest: RandomForestRegressor,
    boosting: GradientBoostingRegressor,
    /// `[forest, boosting]` blend weights
    weights: [f64; 2],
    scaler: StandardScaler,
    /// Training-time column order, re-applied at inference
    feature_names: Vec<String>,
    report: ForecastTrainingReport,
}

impl ForecastBundle {
    fn predict_scaled(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter()
            .map(|r| self.weights[0] * self.forest.predict_row(r) + self.weights[1] * self.boosting.predict_row(r))
            .collect()
    }
}

pub struct EnsembleForecaster {
    config: ForecasterConfig,
    features: FeatureBuilder,
    bundle: ArcSwapOption<ForecastBundle>,
    store: Option<Arc<dyn BundleStore>>,
}

impl EnsembleForecaster {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            config: config.forecaster.clone(),
            features: FeatureBuilder::new(config),
            bundle: ArcSwapOption::empty(),
            store: None,
        }
    }

    /// Attach a store: successful trainings are saved to it and an untrained
    /// forecaster reloads from it on first use.
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

    /// Column order the installed bundle was trained on.
    pub fn feature_names(&self) -> Option<Vec<String>> {
        self.bundle.load_full().map(|b| b.feature_names.clone())
    }

    /// Metadata of the installed bundle, if any.
    pub fn training_report(&self) -> Option<ForecastTrainingReport> {
        self.bundle.load_full().map(|b| b.report.clone())
    }

    /// Train on labelled history (rows without an OEE value are skipped) and
    /// install the ensemble if it passes the acceptance gate.
    pub fn train(&self, records: &[ObservationRecord]) -> Result<ForecastTrainingReport, EngineError> {
        validate_batch(records)?;
        let labelled: Vec<ObservationRecord> =
            records.iter().filter(|r| r.oee.is_some()).cloned().collect();
        if labelled.len() < self.config.min_training_rows {
            return Err(EngineError::InsufficientData {
                stage: "forecaster training",
                detail: format!(
                    "{} labelled rows, need at least {}",
                    labelled.len(),
                    self.config.min_training_rows
                ),
            });
        }

        info!(rows = labelled.len(), "Training OEE forecaster");

        let table = self.features.forecast_features(&labelled);
        let y: Vec<f64> = labelled.iter().map(|r| r.oee.unwrap_or(0.0)).collect();

        let (train_idx, test_idx) =
            train_test_split(table.len(), self.config.test_fraction, self.config.seed);
        let x_train_raw = take_rows(&table.rows, &train_idx);
        let x_test_raw = take_rows(&table.rows, &test_idx);
        let y_train = take_rows(&y, &train_idx);
        let y_test = take_rows(&y, &test_idx);

        let scaler = StandardScaler::fit(&x_train_raw);
        let x_train = scaler.transform(&x_train_raw);
        let x_test = scaler.transform(&x_test_raw);

        let (forest, boosting) = rayon::join(
            || RandomForestRegressor::fit(&x_train, &y_train, &self.config.forest, self.config.seed),
            || GradientBoostingRegressor::fit(&x_train, &y_train, &self.config.boosting),
        );

        let candidate = ForecastBundle {
            forest,
            boosting,
            weights: [self.config.forest_weight, self.config.boosting_weight],
            scaler,
            feature_names: table.columns.clone(),
            report: ForecastTrainingReport {
                mae: 0.0,
                r2: 0.0,
                train_rows: train_idx.len(),
                test_rows: test_idx.len(),
                feature_count: table.columns.len(),
                trained_at: chrono::Utc::now().naive_utc(),
            },
        };

        let y_pred = candidate.predict_scaled(&x_test);
        let mae = mean_absolute_error(&y_test, &y_pred);
        let r2 = r2_score(&y_test, &y_pred);
        info!(mae, r2, "Forecaster evaluated on held-out split");

        if r2 <= self.config.min_r2 {
            warn!(
                r2,
                threshold = self.config.min_r2,
                state = ?self.state(),
                "Forecaster rejected by acceptance gate, keeping previous state"
            );
            return Err(EngineError::BelowQualityThreshold {
                r2,
                threshold: self.config.min_r2,
                mae,
            });
        }

        let mut bundle = candidate;
        bundle.report.mae = mae;
        bundle.report.r2 = r2;
        let report = bundle.report.clone();
        let bundle = Arc::new(bundle);
        self.bundle.store(Some(Arc::clone(&bundle)));
        info!(features = report.feature_count, "Forecaster bundle installed");

        if let Some(store) = &self.store {
            if let Err(e) = save_bundle(store.as_ref(), FORECASTER_BUNDLE_KEY, bundle.as_ref()) {
                warn!(error = %e, "Failed to persist forecaster bundle");
            }
        }

        Ok(report)
    }

    /// Blended OEE predictions for `records`, clipped to the plausible band.
    pub fn predict(&self, records: &[ObservationRecord]) -> Result<Vec<f64>, EngineError> {
        let bundle = self.snapshot()?;
        Ok(self.predict_with(&bundle, records))
    }

    fn predict_with(&self, bundle: &ForecastBundle, records: &[ObservationRecord]) -> Vec<f64> {
        let table = self.features.forecast_features(records);
        let aligned = table.align(&bundle.feature_names);
        let scaled = bundle.scaler.transform(&aligned);
        bundle
            .predict_scaled(&scaled)
            .into_iter()
            .map(|p| p.clamp(self.config.clip_min, self.config.clip_max))
            .collect()
    }

    /// Daily forecasts for the next `days` days, per configured line.
    ///
    /// Lines absent from the recent window of `history` are omitted.
    pub fn predict_next_days(
        &self,
        history: &[ObservationRecord],
        days: usize,
    ) -> Result<BTreeMap<String, Vec<DailyForecast>>, EngineError> {
        if days == 0 || days > MAX_FORECAST_DAYS {
            return Err(EngineError::InvalidArgument(format!(
                "forecast horizon must be between 1 and {MAX_FORECAST_DAYS} days, got {days}"
            )));
        }
        if history.is_empty() {
            return Err(EngineError::InsufficientData {
                stage: "forecast",
                detail: "no historical observations".to_string(),
            });
        }
        let bundle = self.snapshot()?;

        let recent = &history[history.len().saturating_sub(self.config.recent_window_rows)..];
        let mut forecasts = BTreeMap::new();

        for line in self.features.lines() {
            let line_rows: Vec<&ObservationRecord> =
                recent.iter().filter(|r| &r.line_id == line).collect();
            let Some(last_ts) = line_rows.iter().map(|r| r.timestamp).max() else {
                debug!(line_id = %line, "No recent history, line omitted from forecast");
                continue;
            };

            let slots = self.future_slots(line, last_ts, &line_rows, days);
            let per_day = slots.len() / days;
            let predictions = self.predict_with(&bundle, &slots);

            let daily: Vec<DailyForecast> = predictions
                .chunks(per_day.max(1))
                .take(days)
                .enumerate()
                .map(|(i, day)| DailyForecast {
                    date: (last_ts.date() + Duration::days(i as i64 + 1))
                        .format("%Y-%m-%d")
                        .to_string(),
                    oee_predicted: round_to(day.iter().mean(), 2),
                    confidence: ConfidenceLevel::High,
                    trend: Trend::from_slope(linear_slope(day), self.config.trend_slope_threshold),
                })
                .collect();

            debug!(line_id = %line, days = daily.len(), "Line forecast computed");
            forecasts.insert(line.clone(), daily);
        }

        Ok(forecasts)
    }

    /// Multi-day forecast for one line with summary statistics.
    ///
    /// `Ok(None)` when the line has no recent history.
    pub fn predict_line(
        &self,
        history: &[ObservationRecord],
        line_id: &str,
        horizon: usize,
    ) -> Result<Option<LineForecast>, EngineError> {
        let mut all = self.predict_next_days(history, horizon)?;
        let Some(predictions) = all.remove(line_id) else {
            return Ok(None);
        };

        let values: Vec<f64> = predictions.iter().map(|p| p.oee_predicted).collect();
        let std = values.iter().population_std_dev();
        let statistics = ForecastStatistics {
            mean: round_to(values.iter().mean(), 2),
            min: round_to(Statistics::min(values.iter()), 2),
            max: round_to(Statistics::max(values.iter()), 2),
            std: round_to(std, 2),
            stability: if std < self.config.stability_std_threshold {
                Stability::Stable
            } else {
                Stability::Variable
            },
        };

        Ok(Some(LineForecast {
            line_id: line_id.to_string(),
            predictions,
            statistics,
        }))
    }

    /// Persist the installed bundle.
    pub fn save(&self, store: &dyn BundleStore) -> Result<(), EngineError> {
        let bundle = self.bundle.load_full().ok_or(EngineError::ModelNotTrained {
            model: ModelKind::Forecaster,
        })?;
        save_bundle(store, FORECASTER_BUNDLE_KEY, bundle.as_ref())?;
        info!("Forecaster bundle saved");
        Ok(())
    }

    /// Install a persisted bundle. Returns `false` (and keeps the current
    /// state) when the store holds no bundle or a corrupt one.
    pub fn load(&self, store: &dyn BundleStore) -> Result<bool, EngineError> {
        match load_bundle::<ForecastBundle>(store, FORECASTER_BUNDLE_KEY) {
            Ok(Some(bundle)) => {
                info!(r2 = bundle.report.r2, features = bundle.feature_names.len(), "Forecaster bundle loaded");
                self.bundle.store(Some(Arc::new(bundle)));
                Ok(true)
            }
            Ok(None) => {
                debug!("No persisted forecaster bundle");
                Ok(false)
            }
            Err(StorageError::Serialization(e)) => {
                warn!(error = %e, "Corrupt forecaster bundle ignored");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Current bundle, reloading from the attached store if none is installed.
    fn snapshot(&self) -> Result<Arc<ForecastBundle>, EngineError> {
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
            model: ModelKind::Forecaster,
        })
    }

    /// Hourly production slots for the next `days` days, carrying the recent
    /// component means forward and assuming no stops.
    fn future_slots(
        &self,
        line: &str,
        last_ts: NaiveDateTime,
        line_rows: &[&ObservationRecord],
        days: usize,
    ) -> Vec<ObservationRecord> {
        let tail = &line_rows[line_rows.len().saturating_sub(self.config.carry_forward_rows)..];
        let carried = |field: fn(&ObservationRecord) -> Option<f64>| {
            let values: Vec<f64> = tail.iter().filter_map(|r| field(r)).collect();
            (!values.is_empty()).then(|| values.iter().mean())
        };
        let availability = carried(|r| r.availability);
        let performance = carried(|r| r.performance);
        let quality = carried(|r| r.quality);

        let mut slots = Vec::new();
        for day in 1..=days {
            let date = last_ts.date() + Duration::days(day as i64);
            for hour in self.config.production_start_hour..=self.config.production_end_hour {
                let Some(ts) = date.and_hms_opt(hour, 0, 0) else {
                    continue;
                };
                let mut slot = ObservationRecord::new(ts, line, "", 0.0);
                slot.availability = availability;
                slot.performance = performance;
                slot.quality = quality;
                slot.stop_count = Some(0.0);
                slot.stop_duration = Some(0.0);
                slots.push(slot);
            }
        }
        slots
    }
}
