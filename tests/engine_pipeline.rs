//! End-to-end pipeline tests
//!
//! Train both models against a sled store on disk, reopen the store in fresh
//! component instances and drive every decision operation from the restored
//! bundles.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::sync::Arc;

use oee_engine::config::EngineConfig;
use oee_engine::types::{ModelState, ObservationRecord, SpeedAction};
use oee_engine::{
    BundleStore, EngineError, EnsembleForecaster, LineRecommender, ModelStorage, SpeedOptimizer,
};

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 9, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Hourly plant history with consistent OEE components, piece counts and a
/// machine speed sweeping each line's envelope.
fn plant_history(days: i64) -> Vec<ObservationRecord> {
    let mut records = Vec::new();
    for h in 0..days * 24 {
        for (k, (line, min_speed)) in [("L1", 700.0), ("L2", 800.0), ("L3", 600.0)].iter().enumerate() {
            let speed = min_speed + ((h * 37 + k as i64 * 11) % 25) as f64 * 25.0;
            let a = 85.0 + 8.0 * (h as f64 * 0.37 + k as f64 * 1.3).sin();
            let p = 88.0 + 5.0 * (h as f64 * 0.11 + k as f64).cos();
            let q = 98.0 - (speed - min_speed) * 0.01;

            let mut r = ObservationRecord::new(start() + Duration::hours(h), *line, "Fond_Plat", speed);
            r.availability = Some(a);
            r.performance = Some(p);
            r.quality = Some(q);
            r.oee = Some(a * p * q / 10_000.0);
            r.total_pieces = (speed * 0.9) as u64;
            r.good_pieces = (r.total_pieces as f64 * q / 100.0) as u64;
            r.stop_count = Some((h % 3) as f64);
            r.stop_duration = Some((h % 3) as f64 * 12.0);
            records.push(r);
        }
    }
    records
}

fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.forecaster.forest.n_estimators = 20;
    config.forecaster.boosting.n_estimators = 40;
    config.speed_optimizer.boosting.n_estimators = 40;
    config
}

#[test]
fn trained_bundles_survive_a_store_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("models");
    let config = fast_config();
    let history = plant_history(10);

    {
        let store: Arc<dyn BundleStore> = Arc::new(ModelStorage::open(&path).unwrap());
        let forecaster = EnsembleForecaster::new(&config).with_store(Arc::clone(&store));
        let optimizer = SpeedOptimizer::new(&config).with_store(Arc::clone(&store));
        forecaster.train(&history).unwrap();
        optimizer.train(&history).unwrap();
    }

    let storage = ModelStorage::open(&path).unwrap();
    assert_eq!(storage.count(), 2);

    let forecaster = EnsembleForecaster::new(&config);
    assert_eq!(forecaster.state(), ModelState::Untrained);
    assert!(forecaster.load(&storage).unwrap());
    assert_eq!(forecaster.state(), ModelState::Trained);

    let optimizer = SpeedOptimizer::new(&config);
    assert!(optimizer.load(&storage).unwrap());
    let result = optimizer.find_optimal_speed("L1", "Fond_Plat", Some(100.0)).unwrap();
    assert_eq!(result.curve_data.len(), 7);
}

#[test]
fn forecast_feeds_line_recommendation() {
    let config = fast_config();
    let history = plant_history(10);
    let forecaster = EnsembleForecaster::new(&config);
    forecaster.train(&history).unwrap();

    let forecasts = forecaster.predict_next_days(&history, 3).unwrap();
    assert_eq!(forecasts.len(), 3);
    for days in forecasts.values() {
        assert_eq!(days.len(), 3);
        assert!(days.iter().all(|d| (40.0..=95.0).contains(&d.oee_predicted)));
    }

    let line = forecaster.predict_line(&history, "L2", 3).unwrap().unwrap();
    assert!(line.statistics.min <= line.statistics.mean);
    assert!(line.statistics.mean <= line.statistics.max);

    let recommender = LineRecommender::new(&config);
    let now = start() + Duration::days(10);
    let rec = recommender
        .recommend(&history, Some(&forecasts), "Fond_Plat", 5000, now)
        .unwrap();
    let forecast_l = &forecasts[&rec.recommended_line][0];
    assert_eq!(rec.details.predicted_oee, forecast_l.oee_predicted);
    assert!(rec.estimated_completion > now);

    let scenarios = recommender
        .simulate_scenarios(&history, Some(&forecasts), "Fond_Plat", 5000, now)
        .unwrap();
    assert_eq!(scenarios.scenarios.len(), 3);
    // L2 has the highest nominal speed
    assert_eq!(scenarios.comparison.fastest, "L2");

    let best = recommender.get_best_line(&history).unwrap();
    assert_eq!(best.all_scores.len(), 3);
}

#[test]
fn speed_recommendations_cover_every_line() {
    let config = fast_config();
    let optimizer = SpeedOptimizer::new(&config);
    optimizer.train(&plant_history(6)).unwrap();

    let fleet = optimizer.get_speed_recommendations_all_lines("Fond_Plat");
    assert_eq!(fleet.recommendations.len(), 3);
    let best = fleet.best_line.clone().unwrap();
    let best_net = fleet.recommendations[&best].result().unwrap().max_net_output;
    for outcome in fleet.recommendations.values() {
        let result = outcome.result().unwrap();
        assert!(result.max_net_output <= best_net);
        let range = config.line(&result.line_id).unwrap().speed_range();
        assert!(range.contains(result.optimal_speed));
        assert!(matches!(
            result.action,
            SpeedAction::Increase | SpeedAction::Decrease | SpeedAction::Maintain
        ));
    }

    // An unknown product degrades to a zero one-hot vector instead of failing
    let unknown = optimizer.predict_at_speed("L1", "Mystery_Cup", 1000.0).unwrap();
    assert!(unknown.production_rate > 0.0);
}

#[test]
fn corrupt_bundle_leaves_models_untrained() {
    let storage = ModelStorage::open_temporary().unwrap();
    storage
        .save_blob("speed_optimizer/bundle", b"not a bundle")
        .unwrap();

    let optimizer = SpeedOptimizer::new(&fast_config());
    assert!(!optimizer.load(&storage).unwrap());
    assert_eq!(optimizer.state(), ModelState::Untrained);

    let err = optimizer.find_optimal_speed("L1", "Fond_Plat", None).unwrap_err();
    assert!(err.is_model_readiness());
    assert!(matches!(err, EngineError::ModelNotTrained { .. }));
}
