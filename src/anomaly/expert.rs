//! Anomaly knowledge base with similarity retrieval and solution synthesis.

use chrono::{Datelike, Duration, NaiveDateTime};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use super::steps::solution_steps;
use super::tfidf::TfidfIndex;
use crate::config::AnomalyConfig;
use crate::error::EngineError;
use crate::ml_engine::evaluation::round_to;
use crate::types::{
    AnomalyRecord, AnomalyTrend, AnomalyTrendReport, ConfidenceLevel, Effectiveness,
    RecommendedSolution, SimilarCase, SolutionSuggestion, SymptomSummary, TopMatch,
};

/// Historical anomaly records and the text index derived from them.
///
/// The index is rebuilt in full on every change to the record set. Until a
/// knowledge base has been loaded there is no index and retrieval returns an
/// empty result.
pub struct AnomalyExpert {
    config: AnomalyConfig,
    records: Vec<AnomalyRecord>,
    index: Option<TfidfIndex>,
}

impl AnomalyExpert {
    pub fn new(config: &AnomalyConfig) -> Self {
        Self {
            config: config.clone(),
            records: Vec::new(),
            index: None,
        }
    }

    /// Replace the knowledge base and re-index it. Returns the record count.
    pub fn load_knowledge_base(&mut self, records: Vec<AnomalyRecord>) -> usize {
        self.records = records;
        self.rebuild_index();
        info!(records = self.records.len(), "Anomaly knowledge base loaded");
        self.records.len()
    }

    pub fn add_record(&mut self, record: AnomalyRecord) -> Result<(), EngineError> {
        if self.position(record.anomaly_id).is_some() {
            return Err(EngineError::InvalidArgument(format!(
                "anomaly {} already exists in the knowledge base",
                record.anomaly_id
            )));
        }
        self.records.push(record);
        self.rebuild_index();
        Ok(())
    }

    /// Replace the record carrying the same `anomaly_id`.
    pub fn update_record(&mut self, record: AnomalyRecord) -> Result<(), EngineError> {
        let pos = self.position(record.anomaly_id).ok_or_else(|| {
            EngineError::InvalidArgument(format!("anomaly {} not found", record.anomaly_id))
        })?;
        self.records[pos] = record;
        self.rebuild_index();
        Ok(())
    }

    pub fn remove_record(&mut self, anomaly_id: u64) -> Result<AnomalyRecord, EngineError> {
        let pos = self
            .position(anomaly_id)
            .ok_or_else(|| EngineError::InvalidArgument(format!("anomaly {anomaly_id} not found")))?;
        let removed = self.records.remove(pos);
        self.rebuild_index();
        Ok(removed)
    }

    pub fn records(&self) -> &[AnomalyRecord] {
        &self.records
    }

    pub fn is_indexed(&self) -> bool {
        self.index.is_some()
    }

    fn position(&self, anomaly_id: u64) -> Option<usize> {
        self.records.iter().position(|r| r.anomaly_id == anomaly_id)
    }

    fn rebuild_index(&mut self) {
        let documents: Vec<String> = self.records.iter().map(AnomalyRecord::index_text).collect();
        let index = TfidfIndex::fit(&documents, self.config.max_features);
        debug!(
            documents = index.len(),
            vocabulary = index.vocabulary_len(),
            "Anomaly index rebuilt"
        );
        self.index = Some(index);
    }

    /// Most similar historical anomalies, best first.
    ///
    /// At most `top_k` cases are returned and each one scores strictly above
    /// the minimum similarity. Similarity is reported as a percentage (1 dp).
    /// Equal scores keep knowledge-base order.
    pub fn find_similar(&self, description: &str, machine_id: &str) -> Vec<SimilarCase> {
        let Some(index) = &self.index else {
            debug!("Anomaly index not built yet, no similar cases");
            return Vec::new();
        };

        let query = format!("{description} {machine_id}");
        let scores = index.similarities(&query);

        let mut ranked: Vec<(usize, f64)> = scores.into_iter().enumerate().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        ranked
            .into_iter()
            .take(self.config.top_k)
            .filter(|(_, score)| *score > self.config.min_similarity)
            .map(|(i, score)| {
                let record = &self.records[i];
                SimilarCase {
                    similarity: round_to(score * 100.0, 1),
                    anomaly_id: record.anomaly_id,
                    line_id: record.line_id.clone(),
                    machine_id: record.machine_id.clone(),
                    symptom: record.symptom.clone().unwrap_or_default(),
                    root_cause: record.root_cause.clone().unwrap_or_default(),
                    solution: record.solution.clone(),
                    resolution_time_minutes: record.resolution_time_minutes,
                    impact_oee: record.impact_oee,
                    recurrence_count: record.recurrence_count,
                    effectiveness: if record.recurrence_count < self.config.recurrence_threshold {
                        Effectiveness::High
                    } else {
                        Effectiveness::Medium
                    },
                }
            })
            .collect()
    }

    /// Remedy backed by the most frequent solution among the similar cases.
    ///
    /// When two solutions are equally frequent the one whose first case ranks
    /// higher wins.
    pub fn suggest_solution(&self, symptom: &str, machine_id: &str) -> SolutionSuggestion {
        let similar = self.find_similar(symptom, machine_id);
        let Some(top) = similar.first() else {
            return SolutionSuggestion::NoMatch {
                confidence: ConfidenceLevel::Low,
                message: "No similar case found in the anomaly history".to_string(),
                recommendation: "Run a full diagnosis and document the solution".to_string(),
            };
        };

        // groups in first-appearance order
        let mut groups: Vec<(&str, Vec<&SimilarCase>)> = Vec::new();
        for case in &similar {
            match groups.iter_mut().find(|(solution, _)| *solution == case.solution) {
                Some((_, cases)) => cases.push(case),
                None => groups.push((case.solution.as_str(), vec![case])),
            }
        }
        let mut best = &groups[0];
        for group in &groups[1..] {
            if group.1.len() > best.1.len() {
                best = group;
            }
        }
        let (solution, cases) = best;
        let count = cases.len() as f64;

        let avg_time = cases
            .iter()
            .map(|c| f64::from(c.resolution_time_minutes))
            .sum::<f64>()
            / count;
        let avg_impact = cases.iter().map(|c| c.impact_oee).sum::<f64>() / count;

        let confidence = if cases.len() >= self.config.high_confidence_count {
            ConfidenceLevel::High
        } else {
            ConfidenceLevel::Medium
        };

        debug!(
            solution = %solution,
            group_size = cases.len(),
            similar = similar.len(),
            "Solution selected from similar cases"
        );

        SolutionSuggestion::Recommended(RecommendedSolution {
            confidence,
            recommended_solution: (*solution).to_string(),
            estimated_time_minutes: avg_time.round(),
            success_rate: round_to(count / similar.len() as f64 * 100.0, 1),
            similar_cases_count: similar.len(),
            top_match: TopMatch {
                similarity: top.similarity,
                symptom: top.symptom.clone(),
                root_cause: top.root_cause.clone(),
            },
            detailed_steps: solution_steps(solution),
            expected_impact: round_to(avg_impact.abs(), 2),
        })
    }

    /// Records at most `days` old relative to `now`, newest first.
    pub fn get_recent_anomalies(&self, days: i64, now: NaiveDateTime) -> Vec<AnomalyRecord> {
        let cutoff = now - Duration::days(days);
        let mut recent: Vec<AnomalyRecord> = self
            .records
            .iter()
            .filter(|r| r.timestamp >= cutoff)
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        recent
    }

    /// Summary of anomalies over the last `days`, optionally for a single line.
    pub fn analyze_trend(&self, line_id: Option<&str>, days: i64, now: NaiveDateTime) -> AnomalyTrendReport {
        let cutoff = now - Duration::days(days);
        let data: Vec<&AnomalyRecord> = self
            .records
            .iter()
            .filter(|r| r.timestamp >= cutoff)
            .filter(|r| line_id.map_or(true, |line| r.line_id == line))
            .collect();

        if data.is_empty() {
            return AnomalyTrendReport {
                total_anomalies: 0,
                avg_resolution_time: 0.0,
                total_impact_oee: 0.0,
                most_common: Vec::new(),
                most_problematic_machine: None,
                trend: AnomalyTrend::Stable,
            };
        }

        let total = data.len() as f64;
        let avg_resolution_time = data
            .iter()
            .map(|r| f64::from(r.resolution_time_minutes))
            .sum::<f64>()
            / total;
        let total_impact: f64 = data.iter().map(|r| r.impact_oee).sum();

        // symptom -> (count, resolution sum, impact sum); records without a symptom are not grouped
        let mut by_symptom: BTreeMap<&str, (usize, f64, f64)> = BTreeMap::new();
        for r in &data {
            if let Some(symptom) = r.symptom.as_deref() {
                let entry = by_symptom.entry(symptom).or_insert((0, 0.0, 0.0));
                entry.0 += 1;
                entry.1 += f64::from(r.resolution_time_minutes);
                entry.2 += r.impact_oee;
            }
        }
        let mut most_common: Vec<SymptomSummary> = by_symptom
            .into_iter()
            .map(|(symptom, (count, time, impact))| SymptomSummary {
                symptom: symptom.to_string(),
                count,
                avg_resolution_time: round_to(time / count as f64, 1),
                avg_impact: round_to(impact / count as f64, 2),
            })
            .collect();
        most_common.sort_by(|a, b| b.count.cmp(&a.count));
        most_common.truncate(3);

        let mut by_machine: BTreeMap<&str, usize> = BTreeMap::new();
        for r in &data {
            *by_machine.entry(r.machine_id.as_str()).or_insert(0) += 1;
        }
        let mut most_problematic: Option<(&str, usize)> = None;
        for (machine, count) in by_machine {
            if most_problematic.map_or(true, |(_, best)| count > best) {
                most_problematic = Some((machine, count));
            }
        }

        let mut by_month: HashMap<(i32, u32), usize> = HashMap::new();
        for r in &data {
            *by_month
                .entry((r.timestamp.year(), r.timestamp.month()))
                .or_insert(0) += 1;
        }
        let mean_monthly = total / by_month.len() as f64;
        let latest_month = by_month
            .iter()
            .max_by_key(|(month, _)| **month)
            .map_or(0, |(_, count)| *count);
        let trend = if latest_month as f64 > mean_monthly {
            AnomalyTrend::Increasing
        } else {
            AnomalyTrend::Stable
        };

        AnomalyTrendReport {
            total_anomalies: data.len(),
            avg_resolution_time: round_to(avg_resolution_time, 1),
            total_impact_oee: round_to(total_impact, 2),
            most_common,
            most_problematic_machine: most_problematic.map(|(m, _)| m.to_string()),
            trend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Priority;
    use chrono::NaiveDate;

    fn at(day: u32, month: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, month, day)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn record(id: u64, machine: &str, symptom: &str, cause: Option<&str>, solution: &str) -> AnomalyRecord {
        AnomalyRecord {
            anomaly_id: id,
            timestamp: at(1 + id as u32, 3),
            line_id: "L1".to_string(),
            machine_id: machine.to_string(),
            symptom: Some(symptom.to_string()),
            root_cause: cause.map(str::to_string),
            solution: solution.to_string(),
            resolution_time_minutes: 30 * id as u32,
            impact_oee: -5.0 * id as f64,
            recurrence_count: id as u32 - 1,
            priority: Priority::High,
            status: "Resolved".to_string(),
        }
    }

    fn knowledge_base() -> Vec<AnomalyRecord> {
        vec![
            record(1, "M1-1", "abnormal vibration on conveyor", Some("worn belts"), "Belt replacement and realignment"),
            record(2, "M1-2", "temperature drift in sealing unit", None, "Thermal control system recalibration"),
            record(3, "M1-1", "conveyor vibration and noise", Some("loose belts"), "Belt replacement and realignment"),
        ]
    }

    fn expert() -> AnomalyExpert {
        let mut expert = AnomalyExpert::new(&AnomalyConfig::default());
        expert.load_knowledge_base(knowledge_base());
        expert
    }

    #[test]
    fn test_unloaded_expert_returns_nothing() {
        let expert = AnomalyExpert::new(&AnomalyConfig::default());
        assert!(!expert.is_indexed());
        assert!(expert.find_similar("vibration", "").is_empty());
        assert_eq!(expert.suggest_solution("vibration", "").confidence(), ConfidenceLevel::Low);
    }

    #[test]
    fn test_exact_symptom_ranks_first() {
        let expert = expert();
        let similar = expert.find_similar("temperature drift in sealing unit", "");
        assert_eq!(similar[0].anomaly_id, 2);
        assert!(similar[0].similarity >= 99.0);
        assert!(similar.iter().all(|c| c.similarity <= similar[0].similarity));
        assert_eq!(similar[0].root_cause, "");
        // recurrence_count 1 is below the threshold of 2
        assert_eq!(similar[0].effectiveness, Effectiveness::High);
    }

    #[test]
    fn test_suggestion_groups_by_solution() {
        let expert = expert();
        let SolutionSuggestion::Recommended(s) = expert.suggest_solution("conveyor vibration belts", "") else {
            panic!("expected a recommendation");
        };
        assert_eq!(s.recommended_solution, "Belt replacement and realignment");
        assert_eq!(s.similar_cases_count, 2);
        assert_eq!(s.success_rate, 100.0);
        assert_eq!(s.confidence, ConfidenceLevel::Medium);
        assert_eq!(s.estimated_time_minutes, 60.0);
        assert_eq!(s.expected_impact, 10.0);
        assert_eq!(s.detailed_steps.len(), 7);
    }

    #[test]
    fn test_mutations_rebuild_index() {
        let mut expert = expert();
        assert!(expert.find_similar("hydraulic leak", "").is_empty());

        let mut leak = record(4, "M1-3", "hydraulic leak", Some("cracked hose"), "Hose replacement");
        expert.add_record(leak.clone()).unwrap();
        assert_eq!(expert.find_similar("hydraulic leak", "")[0].anomaly_id, 4);
        assert!(expert.add_record(leak.clone()).is_err());

        leak.symptom = Some("oil pressure loss".to_string());
        expert.update_record(leak).unwrap();
        assert_eq!(expert.find_similar("oil pressure loss", "")[0].anomaly_id, 4);

        expert.remove_record(4).unwrap();
        assert!(expert.find_similar("oil pressure loss", "").is_empty());
        assert!(expert.remove_record(4).is_err());
    }

    #[test]
    fn test_recent_anomalies_newest_first() {
        let expert = expert();
        let recent = expert.get_recent_anomalies(2, at(5, 3));
        let ids: Vec<u64> = recent.iter().map(|r| r.anomaly_id).collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[test]
    fn test_trend_report() {
        let mut records = knowledge_base();
        let mut older = record(5, "M1-2", "abnormal vibration on conveyor", None, "Bearing replacement");
        older.timestamp = at(10, 1);
        records.push(older);

        let mut expert = AnomalyExpert::new(&AnomalyConfig::default());
        expert.load_knowledge_base(records);
        let report = expert.analyze_trend(Some("L1"), 90, at(20, 3));

        assert_eq!(report.total_anomalies, 4);
        assert_eq!(report.most_common[0].symptom, "abnormal vibration on conveyor");
        assert_eq!(report.most_common[0].count, 2);
        // M1-1 and M1-2 tie at 2, alphabetical first wins
        assert_eq!(report.most_problematic_machine.as_deref(), Some("M1-1"));
        // March holds 3 of 4 anomalies over two months
        assert_eq!(report.trend, AnomalyTrend::Increasing);

        let empty = expert.analyze_trend(Some("L9"), 90, at(20, 3));
        assert_eq!(empty.total_anomalies, 0);
        assert!(empty.most_problematic_machine.is_none());
    }
}
