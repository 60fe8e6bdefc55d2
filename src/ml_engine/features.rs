//! Feature Builder
//!
//! Turns observation records into a numeric table with an explicit, stable
//! column order. Two layouts are produced: one for the OEE forecaster and one
//! for the speed optimizer.
//!
//! ## Forecast layout
//! `hour, day_of_week, month, day_of_year, week_of_year, line_<id>...,
//! availability, performance, quality, avail_perf_ratio, perf_quality_ratio,
//! oee_ma_7, oee_ma_24, oee_std_7, oee_std_24, stop_count, stop_duration`
//!
//! The layout never depends on the batch. A missing component or stop field
//! reads as 0 for that record only. A record without an OEE value does not
//! enter its line's rolling history; its rolling columns describe the history
//! before it (all 0 when there is none).
//!
//! ## Speed layout
//! `machine_speed, speed_ratio, line_<id>..., product_<id>...`
//!
//! Unknown lines/products encode as an all-zero one-hot and are counted, never
//! rejected. `FeatureTable::align` is the only way model code reads a table:
//! it reorders columns to the trained list, fills absent ones with 0 and drops
//! extras.

use chrono::{Datelike, Timelike};
use statrs::statistics::Statistics;
use std::collections::HashMap;
use tracing::debug;

use crate::config::defaults::{RATIO_EPSILON, ROLLING_LONG_WINDOW, ROLLING_SHORT_WINDOW};
use crate::config::EngineConfig;
use crate::types::ObservationRecord;

/// Numeric feature matrix with named columns.
#[derive(Debug, Clone, Default)]
pub struct FeatureTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    /// Records whose line id matched no known line
    pub unknown_lines: usize,
    /// Records whose product type matched no known product
    pub unknown_products: usize,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Project the table onto `columns`, in that order.
    ///
    /// Columns absent from this table are synthesized as 0; columns not listed
    /// are dropped.
    pub fn align(&self, columns: &[String]) -> Vec<Vec<f64>> {
        let lookup: HashMap<&str, usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();
        let mapping: Vec<Option<usize>> =
            columns.iter().map(|c| lookup.get(c.as_str()).copied()).collect();

        let missing = mapping.iter().filter(|m| m.is_none()).count();
        if missing > 0 {
            debug!(missing, total = columns.len(), "Synthesizing absent feature columns as 0");
        }

        self.rows
            .iter()
            .map(|row| {
                mapping
                    .iter()
                    .map(|m| m.map_or(0.0, |i| row[i]))
                    .collect()
            })
            .collect()
    }
}

/// Builds forecaster and speed-optimizer feature tables from records.
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    lines: Vec<String>,
    products: Vec<String>,
    /// Per-line reference speed for `speed_ratio`
    optimal_estimates: HashMap<String, f64>,
}

impl FeatureBuilder {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            lines: config.line_ids(),
            products: config.product_ids(),
            optimal_estimates: config
                .lines
                .iter()
                .map(|l| (l.id.clone(), l.optimal_estimate))
                .collect(),
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Feature table for the OEE forecaster.
    pub fn forecast_features(&self, records: &[ObservationRecord]) -> FeatureTable {
        let mut columns: Vec<String> = ["hour", "day_of_week", "month", "day_of_year", "week_of_year"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        columns.extend(self.lines.iter().map(|l| format!("line_{l}")));
        columns.extend(
            [
                "availability",
                "performance",
                "quality",
                "avail_perf_ratio",
                "perf_quality_ratio",
                "oee_ma_7",
                "oee_ma_24",
                "oee_std_7",
                "oee_std_24",
                "stop_count",
                "stop_duration",
            ]
            .iter()
            .map(|s| s.to_string()),
        );

        let rolling = Self::rolling_oee(records);
        let mut table = FeatureTable {
            columns,
            rows: Vec::with_capacity(records.len()),
            ..Default::default()
        };

        for (record, rolling) in records.iter().zip(rolling) {
            let ts = record.timestamp;
            let mut row = vec![
                ts.hour() as f64,
                ts.weekday().num_days_from_monday() as f64,
                ts.month() as f64,
                ts.ordinal() as f64,
                ts.iso_week().week() as f64,
            ];
            if !Self::push_one_hot(&mut row, &self.lines, &record.line_id) {
                table.unknown_lines += 1;
                debug!(line_id = %record.line_id, "Unknown line encoded as zero vector");
            }
            let a = record.availability.unwrap_or(0.0);
            let p = record.performance.unwrap_or(0.0);
            let q = record.quality.unwrap_or(0.0);
            row.extend([a, p, q, a / (p + RATIO_EPSILON), p / (q + RATIO_EPSILON)]);
            row.extend(rolling);
            row.push(record.stop_count.unwrap_or(0.0));
            row.push(record.stop_duration.unwrap_or(0.0));
            table.rows.push(row);
        }

        table
    }

    /// Feature table for the speed optimizer.
    pub fn speed_features(&self, records: &[ObservationRecord]) -> FeatureTable {
        let mut table = self.empty_speed_table(records.len());
        for record in records {
            self.push_speed_row(&mut table, &record.line_id, &record.product_type, record.machine_speed);
        }
        table
    }

    /// Single-row speed table for a what-if query.
    pub fn speed_query(&self, line_id: &str, product_type: &str, speed: f64) -> FeatureTable {
        let mut table = self.empty_speed_table(1);
        self.push_speed_row(&mut table, line_id, product_type, speed);
        table
    }

    fn empty_speed_table(&self, capacity: usize) -> FeatureTable {
        let mut columns = vec!["machine_speed".to_string(), "speed_ratio".to_string()];
        columns.extend(self.lines.iter().map(|l| format!("line_{l}")));
        columns.extend(self.products.iter().map(|p| format!("product_{p}")));
        FeatureTable {
            columns,
            rows: Vec::with_capacity(capacity),
            ..Default::default()
        }
    }

    fn push_speed_row(&self, table: &mut FeatureTable, line_id: &str, product_type: &str, speed: f64) {
        let speed_ratio = self
            .optimal_estimates
            .get(line_id)
            .filter(|est| **est > 0.0)
            .map_or(0.0, |est| speed / est);
        let mut row = vec![speed, speed_ratio];
        if !Self::push_one_hot(&mut row, &self.lines, line_id) {
            table.unknown_lines += 1;
            debug!(line_id = %line_id, "Unknown line encoded as zero vector");
        }
        if !Self::push_one_hot(&mut row, &self.products, product_type) {
            table.unknown_products += 1;
            debug!(product_type = %product_type, "Unknown product encoded as zero vector");
        }
        table.rows.push(row);
    }

    /// Append a one-hot block; returns false when `value` is not a known category.
    fn push_one_hot(row: &mut Vec<f64>, categories: &[String], value: &str) -> bool {
        let mut matched = false;
        for c in categories {
            let hit = c == value;
            matched |= hit;
            row.push(if hit { 1.0 } else { 0.0 });
        }
        matched
    }

    /// Causal per-line rolling mean/std of OEE: `[ma_7, ma_24, std_7, std_24]`.
    ///
    /// The window ends at the current row. Rows without OEE are not part of
    /// any window. Sample std over fewer than two points is 0.
    fn rolling_oee(records: &[ObservationRecord]) -> Vec<[f64; 4]> {
        let mut per_line: HashMap<&str, Vec<f64>> = HashMap::new();
        records
            .iter()
            .map(|r| {
                let history = per_line.entry(r.line_id.as_str()).or_default();
                if let Some(oee) = r.oee {
                    history.push(oee);
                }
                if history.is_empty() {
                    return [0.0; 4];
                }
                let short = &history[history.len().saturating_sub(ROLLING_SHORT_WINDOW)..];
                let long = &history[history.len().saturating_sub(ROLLING_LONG_WINDOW)..];
                [
                    short.iter().mean(),
                    long.iter().mean(),
                    sample_std(short),
                    sample_std(long),
                ]
            })
            .collect()
    }
}

/// Sample standard deviation, 0 for fewer than two values.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        0.0
    } else {
        values.iter().std_dev()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(day: u32, hour: u32, line: &str, oee: Option<f64>) -> ObservationRecord {
        let ts = NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap();
        let mut r = ObservationRecord::new(ts, line, "Fond_Plat", 1000.0);
        r.oee = oee;
        r
    }

    fn builder() -> FeatureBuilder {
        FeatureBuilder::new(&EngineConfig::default())
    }

    #[test]
    fn test_temporal_and_one_hot() {
        // 2024-01-03 is a Wednesday
        let table = builder().forecast_features(&[record(3, 14, "L2", None)]);
        let row = &table.rows[0];
        assert_eq!(row[table.column_index("hour").unwrap()], 14.0);
        assert_eq!(row[table.column_index("day_of_week").unwrap()], 2.0);
        assert_eq!(row[table.column_index("day_of_year").unwrap()], 3.0);
        assert_eq!(row[table.column_index("line_L1").unwrap()], 0.0);
        assert_eq!(row[table.column_index("line_L2").unwrap()], 1.0);
        assert_eq!(row[table.column_index("stop_count").unwrap()], 0.0);
        assert_eq!(row[table.column_index("oee_ma_7").unwrap()], 0.0);
        assert_eq!(row[table.column_index("availability").unwrap()], 0.0);
    }

    #[test]
    fn test_layout_does_not_depend_on_the_batch() {
        let mut full = record(3, 14, "L1", None);
        full.availability = Some(92.0);
        full.performance = Some(92.0);
        full.quality = Some(96.5);
        let mut partial = record(3, 15, "L2", Some(70.0));
        partial.availability = Some(90.0);
        partial.performance = Some(85.0);

        let alone = builder().forecast_features(std::slice::from_ref(&full));
        let mixed = builder().forecast_features(&[full, partial]);
        assert_eq!(alone.columns, mixed.columns);
        assert_eq!(alone.rows[0], mixed.rows[0]);
        // The missing quality reads as 0 for the partial record only
        let q = mixed.column_index("quality").unwrap();
        assert_eq!(mixed.rows[0][q], 96.5);
        assert_eq!(mixed.rows[1][q], 0.0);
    }

    #[test]
    fn test_rows_without_oee_skip_the_rolling_window() {
        let records = vec![
            record(1, 8, "L1", Some(70.0)),
            record(1, 9, "L1", None),
            record(1, 10, "L1", Some(90.0)),
        ];
        let table = builder().forecast_features(&records);
        let ma7 = table.column_index("oee_ma_7").unwrap();
        assert_eq!(table.rows[1][ma7], 70.0);
        assert_eq!(table.rows[2][ma7], 80.0);
    }

    #[test]
    fn test_unknown_line_is_zero_vector() {
        let table = builder().forecast_features(&[record(3, 9, "L9", None)]);
        assert_eq!(table.unknown_lines, 1);
        for l in ["line_L1", "line_L2", "line_L3"] {
            assert_eq!(table.rows[0][table.column_index(l).unwrap()], 0.0);
        }
    }

    #[test]
    fn test_rolling_is_causal_and_per_line() {
        let records = vec![
            record(1, 8, "L1", Some(70.0)),
            record(1, 8, "L2", Some(10.0)),
            record(1, 9, "L1", Some(80.0)),
            record(1, 10, "L1", Some(90.0)),
        ];
        let table = builder().forecast_features(&records);
        let ma7 = table.column_index("oee_ma_7").unwrap();
        let std7 = table.column_index("oee_std_7").unwrap();

        assert_eq!(table.rows[0][ma7], 70.0);
        assert_eq!(table.rows[0][std7], 0.0);
        // L2 does not leak into L1
        assert_eq!(table.rows[2][ma7], 75.0);
        assert_eq!(table.rows[3][ma7], 80.0);
        assert!((table.rows[3][std7] - 10.0).abs() < 1e-9);
        assert!(table.rows.iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn test_ratio_features_guard_zero_denominator() {
        let mut r = record(2, 8, "L1", Some(0.0));
        r.availability = Some(90.0);
        r.performance = Some(0.0);
        r.quality = Some(0.0);
        let table = builder().forecast_features(&[r]);
        let apr = table.column_index("avail_perf_ratio").unwrap();
        assert!((table.rows[0][apr] - 9000.0).abs() < 1e-6);
    }

    #[test]
    fn test_align_fills_reorders_and_drops() {
        let table = builder().forecast_features(&[record(3, 14, "L1", None)]);
        let trained = vec![
            "line_L1".to_string(),
            "availability".to_string(),
            "hour".to_string(),
        ];
        let aligned = table.align(&trained);
        assert_eq!(aligned, vec![vec![1.0, 0.0, 14.0]]);
    }

    #[test]
    fn test_speed_features() {
        let mut r = record(3, 14, "L1", None);
        r.machine_speed = 1100.0;
        r.product_type = "Fond_Carre_Poignees_Plates".to_string();
        let mut unknown = record(3, 14, "L3", None);
        unknown.product_type = "Mystery".to_string();

        let table = builder().speed_features(&[r, unknown]);
        assert_eq!(table.columns.len(), 2 + 3 + 4);
        assert!((table.rows[0][1] - 1.1).abs() < 1e-9);
        assert_eq!(
            table.rows[0][table.column_index("product_Fond_Carre_Poignees_Plates").unwrap()],
            1.0
        );
        assert_eq!(table.unknown_products, 1);
        assert_eq!(table.unknown_lines, 0);
    }
}
