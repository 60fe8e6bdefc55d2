//! Anomaly Retrieval Engine
//!
//! Similarity search over historical anomaly records and remedy synthesis
//! from the matched neighborhood, plus rule-based active alerts derived from
//! recent line observations.
//!
//! ## Key Features
//! - TF-IDF index over symptom + root-cause text, rebuilt in full on change
//! - Top-k cosine retrieval with a minimum similarity cut
//! - Solution voting with confidence, success rate and a step checklist
//! - Independent threshold/statistical alert rules per line

pub mod alerts;
pub mod expert;
pub mod steps;
pub mod tfidf;

pub use alerts::derive_active_alerts;
pub use expert::AnomalyExpert;
pub use steps::solution_steps;
pub use tfidf::TfidfIndex;
