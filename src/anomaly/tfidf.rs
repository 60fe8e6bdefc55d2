//! Bounded-vocabulary TF-IDF text index with cosine scoring.
//!
//! Tokens are lowercase runs of two or more word characters. The vocabulary
//! keeps the `max_features` terms with the highest corpus frequency
//! (alphabetical order breaks ties). Weights are raw term counts times the
//! smoothed inverse document frequency `ln((1 + n) / (1 + df)) + 1`, and every
//! row is L2-normalized so a dot product is the cosine similarity.

use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

static TOKEN_PATTERN: OnceLock<Regex> = OnceLock::new();

fn token_pattern() -> &'static Regex {
    TOKEN_PATTERN.get_or_init(|| Regex::new(r"(?u)\b\w\w+\b").expect("token pattern is a valid literal"))
}

/// Lowercased word tokens of at least two characters.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    token_pattern()
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct TfidfIndex {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
    rows: Vec<Vec<f64>>,
}

impl TfidfIndex {
    /// Fit the vocabulary and weights on `documents` and index every one of them.
    pub fn fit(documents: &[String], max_features: usize) -> Self {
        let tokenized: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d)).collect();

        // BTreeMap keeps terms alphabetical for deterministic tie-breaks
        let mut term_freq: BTreeMap<&str, usize> = BTreeMap::new();
        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for tokens in &tokenized {
            let mut seen: Vec<&str> = Vec::new();
            for token in tokens {
                *term_freq.entry(token.as_str()).or_insert(0) += 1;
                if !seen.contains(&token.as_str()) {
                    seen.push(token.as_str());
                    *doc_freq.entry(token.as_str()).or_insert(0) += 1;
                }
            }
        }

        let mut ranked: Vec<(&str, usize)> = term_freq.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(max_features);
        ranked.sort_by(|a, b| a.0.cmp(b.0));

        let n_docs = documents.len() as f64;
        let vocabulary: HashMap<String, usize> = ranked
            .iter()
            .enumerate()
            .map(|(i, (term, _))| ((*term).to_string(), i))
            .collect();
        let idf: Vec<f64> = ranked
            .iter()
            .map(|(term, _)| {
                let df = doc_freq.get(term).copied().unwrap_or(0) as f64;
                ((1.0 + n_docs) / (1.0 + df)).ln() + 1.0
            })
            .collect();

        let mut index = Self {
            vocabulary,
            idf,
            rows: Vec::with_capacity(documents.len()),
        };
        index.rows = tokenized.iter().map(|t| index.vectorize(t)).collect();
        index
    }

    fn vectorize(&self, tokens: &[String]) -> Vec<f64> {
        let mut row = vec![0.0; self.idf.len()];
        for token in tokens {
            if let Some(&col) = self.vocabulary.get(token) {
                row[col] += 1.0;
            }
        }
        for (value, idf) in row.iter_mut().zip(&self.idf) {
            *value *= idf;
        }
        let norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            row.iter_mut().for_each(|v| *v /= norm);
        }
        row
    }

    /// Normalized vector of `text` under the fitted vocabulary. Unknown terms
    /// are ignored.
    pub fn transform(&self, text: &str) -> Vec<f64> {
        self.vectorize(&tokenize(text))
    }

    /// Cosine similarity of `text` against every indexed document, in index order.
    pub fn similarities(&self, text: &str) -> Vec<f64> {
        let query = self.transform(text);
        self.rows
            .iter()
            .map(|row| row.iter().zip(&query).map(|(a, b)| a * b).sum())
            .collect()
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
