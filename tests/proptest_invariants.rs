//! Property-based tests for the engine invariants.
//!
//! These tests verify properties that should hold for any valid input:
//! forecast bounds, feature alignment, similarity bounds and the exhaustive
//! speed scan.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use std::sync::OnceLock;

use oee_engine::config::{EngineConfig, SpeedOptimizerConfig};
use oee_engine::ml_engine::{SpeedResponse, SweetSpotSearch};
use oee_engine::types::{AnomalyRecord, ObservationRecord, Priority, SpeedRange};
use oee_engine::{AnomalyExpert, EnsembleForecaster, FeatureBuilder};

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 8)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// One forecaster shared by every case; training dominates the runtime.
fn trained_forecaster() -> &'static EnsembleForecaster {
    static FORECASTER: OnceLock<EnsembleForecaster> = OnceLock::new();
    FORECASTER.get_or_init(|| {
        let mut config = EngineConfig::default();
        config.forecaster.forest.n_estimators = 15;
        config.forecaster.boosting.n_estimators = 30;
        let forecaster = EnsembleForecaster::new(&config);

        let mut history = Vec::new();
        for h in 0..24 * 8 {
            for (k, line) in ["L1", "L2", "L3"].iter().enumerate() {
                let a = 85.0 + 8.0 * (h as f64 * 0.37 + k as f64).sin();
                let p = 88.0 + 5.0 * (h as f64 * 0.11).cos();
                let q = 95.0 + 2.0 * (h as f64 * 0.07 + k as f64).sin();
                let mut r = ObservationRecord::new(start() + Duration::hours(h), *line, "Fond_Plat", 1000.0);
                r.availability = Some(a);
                r.performance = Some(p);
                r.quality = Some(q);
                r.oee = Some(a * p * q / 10_000.0);
                history.push(r);
            }
        }
        forecaster.train(&history).expect("synthetic history trains");
        forecaster
    })
}

/// Strategy for observation records with any subset of optional fields present
fn observation() -> impl Strategy<Value = ObservationRecord> {
    (
        0..24 * 365i64,
        prop::sample::select(vec!["L1", "L2", "L3", "L9"]),
        prop::option::of(0.0..100.0f64),
        prop::option::of(0.0..100.0f64),
        prop::option::of(0.0..100.0f64),
        prop::option::of(0.0..100.0f64),
        prop::option::of(0.0..20.0f64),
    )
        .prop_map(|(h, line, a, p, q, oee, stops)| {
            let mut r = ObservationRecord::new(start() + Duration::hours(h), line, "Fond_Plat", 1000.0);
            r.availability = a;
            r.performance = p;
            r.quality = q;
            r.oee = oee;
            r.stop_count = stops;
            r
        })
}

const WORDS: &[&str] = &[
    "vibration", "belt", "sensor", "temperature", "jam", "roller", "bearing", "noise",
    "drift", "leak", "misalignment", "overheating",
];

/// Strategy for short phrases drawn from a small maintenance vocabulary
fn phrase() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(WORDS), 1..5).prop_map(|w| w.join(" "))
}

fn anomaly(id: u64, symptom: String, cause: String) -> AnomalyRecord {
    AnomalyRecord {
        anomaly_id: id,
        timestamp: start(),
        line_id: "L1".to_string(),
        machine_id: "M1-1".to_string(),
        symptom: Some(symptom),
        root_cause: Some(cause),
        solution: format!("Fix {}", id % 3),
        resolution_time_minutes: 45,
        impact_oee: -4.0,
        recurrence_count: (id % 4) as u32,
        priority: Priority::Medium,
        status: "Resolved".to_string(),
    }
}

/// Net output rises with speed until `peak` and stays flat beyond it.
struct Plateau {
    peak: f64,
}

impl SpeedResponse for Plateau {
    fn respond(&self, _line: &str, _product: &str, speed: f64) -> (f64, f64) {
        (speed.min(self.peak), 100.0)
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Property: forecasts always lie within the clip band
    #[test]
    fn forecasts_stay_in_band(records in prop::collection::vec(observation(), 1..30)) {
        let predictions = trained_forecaster().predict(&records).unwrap();
        prop_assert_eq!(predictions.len(), records.len());
        for p in predictions {
            prop_assert!((40.0..=95.0).contains(&p));
        }
    }

    /// Property: alignment reorders known columns and zero-fills unknown ones
    #[test]
    fn aligned_rows_follow_requested_columns(records in prop::collection::vec(observation(), 1..30)) {
        let builder = FeatureBuilder::new(&EngineConfig::default());
        let table = builder.forecast_features(&records);
        let width = table.columns.len();
        let mut names: Vec<String> = table.columns.iter().rev().cloned().collect();
        names.push("not_a_feature".to_string());

        let aligned = table.align(&names);
        prop_assert_eq!(aligned.len(), records.len());
        for (row, original) in aligned.iter().zip(&table.rows) {
            prop_assert_eq!(row.len(), width + 1);
            let reversed: Vec<f64> = original.iter().rev().copied().collect();
            prop_assert_eq!(&row[..width], reversed.as_slice());
            prop_assert_eq!(row[width], 0.0);
        }
    }

    /// Property: retrieval returns at most five cases above the similarity cut, best first
    #[test]
    fn similarity_results_are_bounded(
        kb in prop::collection::vec((phrase(), phrase()), 1..15),
        query in phrase(),
    ) {
        let mut expert = AnomalyExpert::new(&EngineConfig::default().anomaly);
        expert.load_knowledge_base(
            kb.into_iter()
                .enumerate()
                .map(|(i, (s, c))| anomaly(i as u64 + 1, s, c))
                .collect(),
        );

        let similar = expert.find_similar(&query, "");
        prop_assert!(similar.len() <= 5);
        for case in &similar {
            prop_assert!(case.similarity > 10.0 - 0.05);
            prop_assert!(case.similarity <= 100.0);
        }
        for pair in similar.windows(2) {
            prop_assert!(pair[0].similarity >= pair[1].similarity);
        }
    }

    /// Property: the scan covers the whole grid and the lowest maximizing speed wins
    #[test]
    fn sweet_spot_is_lowest_maximizer(step in 10u32..300, peak in 600u32..1400) {
        let range = SpeedRange { min_speed: 700.0, max_speed: 1300.0, optimal_estimate: 1000.0 };
        let step = f64::from(step);
        let peak = f64::from(peak);
        let result = SweetSpotSearch::search(
            &Plateau { peak },
            "L1",
            "Fond_Plat",
            &range,
            step,
            range.optimal_estimate,
            &SpeedOptimizerConfig::default(),
        )
        .unwrap();

        let grid = SweetSpotSearch::speed_grid(&range, step).unwrap();
        prop_assert_eq!(result.curve_data.len(), grid.len());
        prop_assert!(grid.iter().all(|s| range.contains(*s)));

        let expected = grid
            .iter()
            .copied()
            .find(|s| *s >= peak)
            .unwrap_or(grid[grid.len() - 1]);
        prop_assert_eq!(result.optimal_speed, expected);
    }
}
