//! Line Recommender
//!
//! Composes OEE forecasts (or recent history) with the static line metadata
//! to rank lines for a production job.
//!
//! ## Scoring
//! - Job ranking: `0.35·OEE + 0.25·quality + 0.25·speed + 0.15·flexibility`,
//!   speed normalized to the fastest configured line
//! - Overall ranking: `0.4·OEE + 0.2·availability + 0.2·quality +
//!   0.1·performance + 0.1·stability` over the last week of observations,
//!   with `stability = 100 − 2·std(OEE)`

use chrono::{Duration, NaiveDateTime};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::{EngineConfig, LineConfig, RecommenderConfig};
use crate::error::EngineError;
use crate::ml_engine::evaluation::round_to;
use crate::types::{
    BestLineReport, ConfidenceLevel, DailyForecast, LinePerformanceScore, LineRecommendation,
    LineScore, ObservationRecord, RiskLevel, Scenario, ScenarioComparison, ScenarioReport,
};

const JOB_WEIGHTS: [f64; 4] = [0.35, 0.25, 0.25, 0.15];
const HEALTH_WEIGHTS: [f64; 5] = [0.4, 0.2, 0.2, 0.1, 0.1];

pub struct LineRecommender {
    lines: Vec<LineConfig>,
    config: RecommenderConfig,
}

impl LineRecommender {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            lines: config.lines.clone(),
            config: config.recommender.clone(),
        }
    }

    /// OEE expected on `line`: next-day forecast, else the mean of the line's
    /// most recent observations, else the configured fallback.
    fn expected_oee(
        &self,
        line: &str,
        history: &[ObservationRecord],
        forecasts: Option<&BTreeMap<String, Vec<DailyForecast>>>,
    ) -> f64 {
        if let Some(day) = forecasts.and_then(|f| f.get(line)).and_then(|days| days.first()) {
            return day.oee_predicted;
        }

        let mut rows: Vec<&ObservationRecord> = history.iter().filter(|r| r.line_id == line).collect();
        rows.sort_by_key(|r| r.timestamp);
        let start = rows.len().saturating_sub(self.config.recent_rows);
        let recent: Vec<f64> = rows[start..].iter().filter_map(|r| r.oee).collect();
        if recent.is_empty() {
            self.config.fallback_oee
        } else {
            recent.iter().mean()
        }
    }

    /// Rank every configured line for a job of `quantity` pieces.
    pub fn recommend(
        &self,
        history: &[ObservationRecord],
        forecasts: Option<&BTreeMap<String, Vec<DailyForecast>>>,
        product_type: &str,
        quantity: u64,
        now: NaiveDateTime,
    ) -> Result<LineRecommendation, EngineError> {
        if quantity == 0 {
            return Err(EngineError::InvalidArgument("job quantity must be positive".to_string()));
        }
        let fastest = self
            .lines
            .iter()
            .map(|l| l.nominal_speed)
            .fold(0.0_f64, f64::max);
        if self.lines.is_empty() || fastest <= 0.0 {
            return Err(EngineError::InsufficientData {
                stage: "line recommendation",
                detail: "no production line configured".to_string(),
            });
        }

        let mut scores: Vec<LineScore> = self
            .lines
            .iter()
            .map(|line| {
                let oee = self.expected_oee(&line.id, history, forecasts);
                let production_time = quantity as f64 / line.nominal_speed;
                let good_rate = line.quality_rate * oee / 100.0;
                let estimated_pieces = if good_rate > 0.0 {
                    (quantity as f64 / good_rate).floor() as u64
                } else {
                    0
                };

                let components = [
                    oee,
                    line.quality_rate * 100.0,
                    line.nominal_speed / fastest * 100.0,
                    line.flexibility * 100.0,
                ];
                let score: f64 = components.iter().zip(JOB_WEIGHTS).map(|(c, w)| c * w).sum();

                LineScore {
                    line_id: line.id.clone(),
                    score: round_to(score, 2),
                    predicted_oee: round_to(oee, 2),
                    production_time_hours: round_to(production_time, 2),
                    estimated_pieces,
                    quality_rate: round_to(line.quality_rate * 100.0, 1),
                    speed: line.nominal_speed,
                    operators_needed: line.operators_required,
                    maintenance_status: line.maintenance_level.clone(),
                }
            })
            .collect();

        scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        let best = scores.remove(0);

        info!(
            product_type = %product_type,
            quantity,
            line = %best.line_id,
            score = best.score,
            "Line recommended for job"
        );

        let completion = now + Duration::seconds((best.production_time_hours * 3600.0).round() as i64);
        Ok(LineRecommendation {
            recommended_line: best.line_id.clone(),
            score: best.score,
            confidence: if best.score > self.config.high_confidence_score {
                ConfidenceLevel::High
            } else {
                ConfidenceLevel::Medium
            },
            estimated_completion: completion,
            details: best,
            alternatives: scores,
        })
    }

    /// Best line overall from the last week of observations.
    pub fn get_best_line(&self, history: &[ObservationRecord]) -> Result<BestLineReport, EngineError> {
        let latest = history
            .iter()
            .map(|r| r.timestamp)
            .max()
            .ok_or(EngineError::InsufficientData {
                stage: "best line ranking",
                detail: "no observations".to_string(),
            })?;
        let cutoff = latest - Duration::days(self.config.best_line_window_days);

        let mut all_scores: BTreeMap<String, LinePerformanceScore> = BTreeMap::new();
        let mut best: Option<(&str, f64)> = None;

        for line in &self.lines {
            let window: Vec<&ObservationRecord> = history
                .iter()
                .filter(|r| r.line_id == line.id && r.timestamp >= cutoff)
                .collect();
            let oee: Vec<f64> = window.iter().filter_map(|r| r.oee).collect();
            if oee.is_empty() {
                debug!(line_id = %line.id, "No recent OEE, line not ranked");
                continue;
            }

            let mean_of = |pick: fn(&ObservationRecord) -> Option<f64>| -> f64 {
                let values: Vec<f64> = window.iter().filter_map(|r| pick(r)).collect();
                if values.is_empty() {
                    0.0
                } else {
                    values.iter().mean()
                }
            };
            let oee_mean = oee.iter().mean();
            let availability = mean_of(|r| r.availability);
            let quality = mean_of(|r| r.quality);
            let performance = mean_of(|r| r.performance);
            let std = if oee.len() >= 2 { oee.iter().std_dev() } else { 0.0 };
            let stability = 100.0 - std * 2.0;

            let components = [oee_mean, availability, quality, performance, stability];
            let total: f64 = components.iter().zip(HEALTH_WEIGHTS).map(|(c, w)| c * w).sum();

            if best.map_or(true, |(_, s)| total > s) {
                best = Some((line.id.as_str(), total));
            }
            all_scores.insert(
                line.id.clone(),
                LinePerformanceScore {
                    total_score: round_to(total, 2),
                    oee: round_to(oee_mean, 2),
                    availability: round_to(availability, 2),
                    quality: round_to(quality, 2),
                    performance: round_to(performance, 2),
                    stability: round_to(stability, 2),
                },
            );
        }

        let (line_id, _) = best.ok_or(EngineError::InsufficientData {
            stage: "best line ranking",
            detail: format!(
                "no line has OEE observations in the last {} days",
                self.config.best_line_window_days
            ),
        })?;
        let details = all_scores
            .get(line_id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownLine {
                line_id: line_id.to_string(),
                stage: "best line ranking",
            })?;

        Ok(BestLineReport {
            recommended_line: line_id.to_string(),
            score: details.total_score,
            confidence: if details.total_score > self.config.best_line_high_confidence_score {
                ConfidenceLevel::High
            } else {
                ConfidenceLevel::Medium
            },
            reason: Self::reason(&details),
            details,
            all_scores,
        })
    }

    fn reason(scores: &LinePerformanceScore) -> String {
        let mut reasons = Vec::new();
        if scores.oee > 75.0 {
            reasons.push(format!("Excellent OEE ({}%)", scores.oee));
        }
        if scores.quality > 95.0 {
            reasons.push(format!("Superior quality ({}%)", scores.quality));
        }
        if scores.stability > 90.0 {
            reasons.push("Very stable performance".to_string());
        }
        if scores.availability > 85.0 {
            reasons.push(format!("High availability ({}%)", scores.availability));
        }
        if reasons.is_empty() {
            reasons.push("Best balance of performance and reliability".to_string());
        }
        reasons.join(" - ")
    }

    /// Per-line risk and timing for a job, with fastest / most reliable /
    /// best quality picks. Scenarios follow configuration order and carry
    /// their rank in the job recommendation.
    pub fn simulate_scenarios(
        &self,
        history: &[ObservationRecord],
        forecasts: Option<&BTreeMap<String, Vec<DailyForecast>>>,
        product_type: &str,
        quantity: u64,
        now: NaiveDateTime,
    ) -> Result<ScenarioReport, EngineError> {
        let recommendation = self.recommend(history, forecasts, product_type, quantity, now)?;
        let ranked: Vec<&LineScore> = std::iter::once(&recommendation.details)
            .chain(&recommendation.alternatives)
            .collect();

        let scenarios: Vec<Scenario> = self
            .lines
            .iter()
            .filter_map(|line| {
                let rank = ranked.iter().position(|s| s.line_id == line.id)?;
                let score = ranked[rank];
                let risk_level = if score.predicted_oee < 70.0 {
                    RiskLevel::High
                } else if score.predicted_oee < 75.0 {
                    RiskLevel::Medium
                } else {
                    RiskLevel::Low
                };
                Some(Scenario {
                    line_id: line.id.clone(),
                    oee_predicted: score.predicted_oee,
                    production_time: score.production_time_hours,
                    risk_level,
                    quality_expected: score.quality_rate,
                    recommendation_rank: rank + 1,
                })
            })
            .collect();

        let pick = |better: fn(&Scenario, &Scenario) -> bool| -> String {
            let mut best = &scenarios[0];
            for s in &scenarios[1..] {
                if better(s, best) {
                    best = s;
                }
            }
            best.line_id.clone()
        };
        let times: Vec<f64> = scenarios.iter().map(|s| s.production_time).collect();
        let comparison = ScenarioComparison {
            fastest: pick(|a, b| a.production_time < b.production_time),
            most_reliable: pick(|a, b| a.oee_predicted > b.oee_predicted),
            best_quality: pick(|a, b| a.quality_expected > b.quality_expected),
            time_difference: round_to(
                Statistics::max(times.iter()) - Statistics::min(times.iter()),
                2,
            ),
        };

        Ok(ScenarioReport { scenarios, comparison })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Trend;
    use chrono::NaiveDate;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 4, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn history(oee: [f64; 3]) -> Vec<ObservationRecord> {
        let mut records = Vec::new();
        for h in 0..48 {
            for (line, base) in ["L1", "L2", "L3"].iter().zip(oee) {
                let mut r = ObservationRecord::new(start() + Duration::hours(h), *line, "Fond_Plat", 1000.0);
                let wobble = if h % 2 == 0 { 1.0 } else { -1.0 };
                r.oee = Some(base + wobble);
                r.availability = Some(90.0);
                r.performance = Some(92.0);
                r.quality = Some(97.0);
                records.push(r);
            }
        }
        records
    }

    #[test]
    fn test_recommend_from_history() {
        let recommender = LineRecommender::new(&EngineConfig::default());
        let rec = recommender
            .recommend(&history([85.0, 70.0, 60.0]), None, "Fond_Plat", 1200, start())
            .unwrap();

        assert_eq!(rec.recommended_line, "L1");
        assert_eq!(rec.alternatives.len(), 2);
        assert_eq!(rec.details.predicted_oee, 85.0);
        assert_eq!(rec.details.production_time_hours, 1.0);
        assert_eq!(rec.estimated_completion, start() + Duration::hours(1));
        // 0.35·85 + 0.25·97 + 0.25·(1200/1400·100) + 0.15·85
        assert!((rec.score - 88.18).abs() < 0.01);
        assert_eq!(rec.confidence, ConfidenceLevel::High);
    }

    #[test]
    fn test_forecast_overrides_history_and_fallback() {
        let recommender = LineRecommender::new(&EngineConfig::default());
        let mut forecasts = BTreeMap::new();
        forecasts.insert(
            "L3".to_string(),
            vec![DailyForecast {
                date: "2024-04-02".to_string(),
                oee_predicted: 90.0,
                confidence: ConfidenceLevel::High,
                trend: Trend::Stable,
            }],
        );
        let rec = recommender
            .recommend(&[], Some(&forecasts), "Fond_Plat", 1000, start())
            .unwrap();
        let l3 = std::iter::once(&rec.details)
            .chain(&rec.alternatives)
            .find(|s| s.line_id == "L3")
            .unwrap();
        assert_eq!(l3.predicted_oee, 90.0);
        let l1 = std::iter::once(&rec.details)
            .chain(&rec.alternatives)
            .find(|s| s.line_id == "L1")
            .unwrap();
        assert_eq!(l1.predicted_oee, 70.0);
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let recommender = LineRecommender::new(&EngineConfig::default());
        assert!(recommender.recommend(&[], None, "Fond_Plat", 0, start()).is_err());
    }

    #[test]
    fn test_best_line() {
        let recommender = LineRecommender::new(&EngineConfig::default());
        let report = recommender.get_best_line(&history([70.0, 88.0, 60.0])).unwrap();
        assert_eq!(report.recommended_line, "L2");
        assert_eq!(report.all_scores.len(), 3);
        assert!(report.reason.contains("Excellent OEE"));
        assert!(report.reason.contains("High availability"));
        assert_eq!(report.confidence, ConfidenceLevel::High);

        assert!(recommender.get_best_line(&[]).is_err());
    }

    #[test]
    fn test_scenarios() {
        let recommender = LineRecommender::new(&EngineConfig::default());
        let report = recommender
            .simulate_scenarios(&history([85.0, 72.0, 60.0]), None, "Fond_Plat", 1400, start())
            .unwrap();

        let ids: Vec<&str> = report.scenarios.iter().map(|s| s.line_id.as_str()).collect();
        assert_eq!(ids, vec!["L1", "L2", "L3"]);
        assert_eq!(report.scenarios[0].risk_level, RiskLevel::Low);
        assert_eq!(report.scenarios[1].risk_level, RiskLevel::Medium);
        assert_eq!(report.scenarios[2].risk_level, RiskLevel::High);
        assert_eq!(report.comparison.fastest, "L2");
        assert_eq!(report.comparison.most_reliable, "L1");
        assert_eq!(report.comparison.best_quality, "L1");
        // 1400/1000 - 1400/1400
        assert!((report.comparison.time_difference - 0.4).abs() < 1e-9);
    }
}
