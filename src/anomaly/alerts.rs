//! Rule-based active alerts over the most recent observations of each line.

use chrono::{Duration, NaiveDateTime};
use statrs::statistics::Statistics;
use tracing::debug;

use crate::config::AlertThresholds;
use crate::ml_engine::evaluation::round_to;
use crate::types::{ActiveAlert, AlertSeverity, AlertType, ObservationRecord};

/// Evaluate every alert rule for each of `lines`.
///
/// The window covers `window_hours` back from the latest observation in
/// `records`. Current OEE, availability and quality all come from the
/// line's latest observation; a field it lacks raises nothing. Trailing
/// mean/std span every OEE value in the window. Rules fire independently, so
/// a line can carry several alerts; a line without observations in the window
/// is skipped. Alert ids are sequential from 1 in emission order and `now` is
/// stamped on every alert.
pub fn derive_active_alerts(
    records: &[ObservationRecord],
    lines: &[String],
    thresholds: &AlertThresholds,
    now: NaiveDateTime,
) -> Vec<ActiveAlert> {
    let Some(latest) = records.iter().map(|r| r.timestamp).max() else {
        return Vec::new();
    };
    let cutoff = latest - Duration::hours(i64::from(thresholds.window_hours));

    let mut alerts: Vec<ActiveAlert> = Vec::new();

    for line in lines {
        let mut window: Vec<&ObservationRecord> = records
            .iter()
            .filter(|r| r.line_id == *line && r.timestamp >= cutoff)
            .collect();
        if window.is_empty() {
            continue;
        }
        window.sort_by_key(|r| r.timestamp);
        let last = window[window.len() - 1];

        let oee: Vec<f64> = window.iter().filter_map(|r| r.oee).collect();
        let std = (oee.len() >= 2).then(|| oee.iter().std_dev());

        if let Some(current) = last.oee {
            let mean = oee.iter().mean();
            let dropped = std.is_some_and(|s| current < mean - thresholds.sigma * s);

            if dropped && current < thresholds.critical_oee {
                alerts.push(ActiveAlert {
                    expected_value: Some(round_to(mean, 2)),
                    deviation: Some(round_to(mean - current, 2)),
                    ..alert(
                        alerts.len() + 1,
                        line,
                        AlertSeverity::Critical,
                        AlertType::PerformanceDrop,
                        current,
                        format!("Critical performance drop on {line}"),
                        "Immediate inspection required",
                        now,
                    )
                });
            } else if current < thresholds.low_oee {
                alerts.push(ActiveAlert {
                    threshold: Some(thresholds.low_oee),
                    ..alert(
                        alerts.len() + 1,
                        line,
                        AlertSeverity::High,
                        AlertType::LowOee,
                        current,
                        format!("OEE below threshold on {line}"),
                        "Check the causes of under-performance",
                        now,
                    )
                });
            }
        }

        if let Some(s) = std.filter(|s| *s > thresholds.variability_std) {
            alerts.push(alert(
                alerts.len() + 1,
                line,
                AlertSeverity::Medium,
                AlertType::HighVariability,
                s,
                format!("High OEE variability detected on {line}"),
                "Analyze the sources of variability",
                now,
            ));
        }

        if let Some(availability) = last.availability.filter(|a| *a < thresholds.min_availability) {
            alerts.push(alert(
                alerts.len() + 1,
                line,
                AlertSeverity::High,
                AlertType::LowAvailability,
                availability,
                format!("Insufficient availability on {line}"),
                "Check unplanned stops",
                now,
            ));
        }
        if let Some(quality) = last.quality.filter(|q| *q < thresholds.min_quality) {
            alerts.push(alert(
                alerts.len() + 1,
                line,
                AlertSeverity::Medium,
                AlertType::QualityIssue,
                quality,
                format!("Quality rate falling on {line}"),
                "Reinforced quality control required",
                now,
            ));
        }
    }

    debug!(alerts = alerts.len(), lines = lines.len(), "Active alerts derived");
    alerts
}

#[allow(clippy::too_many_arguments)]
fn alert(
    id: usize,
    line_id: &str,
    severity: AlertSeverity,
    alert_type: AlertType,
    current_value: f64,
    message: String,
    recommended_action: &str,
    raised_at: NaiveDateTime,
) -> ActiveAlert {
    ActiveAlert {
        id,
        line_id: line_id.to_string(),
        severity,
        alert_type,
        message,
        current_value: round_to(current_value, 2),
        expected_value: None,
        threshold: None,
        deviation: None,
        raised_at,
        recommended_action: recommended_action.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn hour(h: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::hours(h)
    }

    fn obs(line: &str, h: i64, oee: f64, availability: f64, quality: f64) -> ObservationRecord {
        let mut r = ObservationRecord::new(hour(h), line, "Fond_Plat", 1000.0);
        r.oee = Some(oee);
        r.availability = Some(availability);
        r.quality = Some(quality);
        r
    }

    fn lines() -> Vec<String> {
        vec!["L1".to_string(), "L2".to_string(), "L3".to_string()]
    }

    #[test]
    fn test_only_quality_rule_fires() {
        let records: Vec<ObservationRecord> = [78.0, 82.0, 80.0, 82.0, 78.0]
            .iter()
            .enumerate()
            .map(|(i, &oee)| obs("L1", i as i64, oee, 95.0, if i == 4 { 90.0 } else { 97.0 }))
            .collect();
        let alerts = derive_active_alerts(&records, &lines(), &AlertThresholds::default(), hour(10));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::QualityIssue);
        assert_eq!(alerts[0].severity, AlertSeverity::Medium);
        assert_eq!(alerts[0].current_value, 90.0);
        assert_eq!(alerts[0].id, 1);
    }

    #[test]
    fn test_performance_drop_and_variability_co_occur() {
        let mut records: Vec<ObservationRecord> =
            (0..10).map(|h| obs("L2", h, 85.0, 95.0, 97.0)).collect();
        records.push(obs("L2", 10, 40.0, 70.0, 97.0));
        let alerts = derive_active_alerts(&records, &lines(), &AlertThresholds::default(), hour(11));

        let kinds: Vec<AlertType> = alerts.iter().map(|a| a.alert_type).collect();
        assert_eq!(
            kinds,
            vec![AlertType::PerformanceDrop, AlertType::HighVariability, AlertType::LowAvailability]
        );
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
        assert!(alerts[0].expected_value.is_some());
        assert_eq!(alerts.iter().map(|a| a.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_single_low_reading_is_low_oee() {
        let records = vec![obs("L3", 0, 66.0, 95.0, 97.0)];
        let alerts = derive_active_alerts(&records, &lines(), &AlertThresholds::default(), hour(1));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::LowOee);
        assert_eq!(alerts[0].threshold, Some(70.0));
    }

    #[test]
    fn test_current_values_come_from_the_latest_observation() {
        let mut records = vec![obs("L1", 0, 55.0, 95.0, 97.0)];
        let mut latest = ObservationRecord::new(hour(1), "L1", "Fond_Plat", 1000.0);
        latest.availability = Some(72.0);
        records.push(latest);

        let alerts = derive_active_alerts(&records, &lines(), &AlertThresholds::default(), hour(2));
        // The older 55% reading is not treated as current
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::LowAvailability);
        assert_eq!(alerts[0].current_value, 72.0);
    }

    #[test]
    fn test_stale_lines_are_skipped() {
        let records = vec![obs("L1", 0, 50.0, 50.0, 50.0), obs("L2", 48, 90.0, 95.0, 97.0)];
        let alerts = derive_active_alerts(&records, &lines(), &AlertThresholds::default(), hour(49));
        assert!(alerts.is_empty());
        assert!(derive_active_alerts(&[], &lines(), &AlertThresholds::default(), hour(0)).is_empty());
    }
}
