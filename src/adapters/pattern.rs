//! Curated symptom-to-cause pattern matching.
//!
//! Patterns live in an owned, read-only table loaded at construction. A
//! pattern scores 0.3 per symptom phrase literally contained in the query
//! plus 0.2 once for the first context entry containing any symptom phrase;
//! the raw score is then scaled by curated confidence and historical
//! success rate.

use crate::adapters::SourceAdapter;
use crate::query;
use crate::types::{Evidence, SourceType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

const QUERY_PHRASE_SCORE: f32 = 0.3;
const CONTEXT_PHRASE_SCORE: f32 = 0.2;

/// One curated symptom-to-cause record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymptomPattern {
    pub id: String,
    pub symptom_phrases: Vec<String>,
    pub causes: Vec<String>,
    pub confidence: f32,
    pub historical_success_rate: f32,
    pub category: String,
}

/// Adapter over the symptom-pattern table.
pub struct PatternAdapter {
    patterns: Vec<SymptomPattern>,
}

impl PatternAdapter {
    pub fn new() -> Self {
        Self::with_patterns(builtin_patterns())
    }

    pub fn with_patterns(patterns: Vec<SymptomPattern>) -> Self {
        debug!(patterns = patterns.len(), "loaded symptom pattern table");
        Self { patterns }
    }

    /// Raw match score before confidence scaling; zero means no hit.
    fn match_score(pattern: &SymptomPattern, query_lower: &str, context: &[String]) -> f32 {
        let phrases: Vec<String> =
            pattern.symptom_phrases.iter().map(|p| p.to_lowercase()).collect();

        let mut score = phrases
            .iter()
            .filter(|phrase| query_lower.contains(phrase.as_str()))
            .count() as f32
            * QUERY_PHRASE_SCORE;

        // Only the first context entry containing any symptom phrase counts.
        for entry in context {
            let entry_lower = query::normalize(entry);
            if phrases.iter().any(|phrase| entry_lower.contains(phrase.as_str())) {
                score += CONTEXT_PHRASE_SCORE;
                break;
            }
        }

        score
    }

    fn to_evidence(pattern: &SymptomPattern, score: f32) -> Evidence {
        let snippet = format!(
            "Known pattern '{}': likely causes are {}.",
            pattern.symptom_phrases.first().map(String::as_str).unwrap_or(&pattern.id),
            pattern.causes.join("; ")
        );

        Evidence::new(format!("pattern:{}", pattern.id), SourceType::Pattern, snippet, score)
            .with_confidence(pattern.confidence)
            .with_provenance("adapter", "pattern")
            .with_provenance("adapter_version", env!("CARGO_PKG_VERSION"))
            .with_provenance("category", pattern.category.clone())
            .with_provenance("success_rate", format!("{:.2}", pattern.historical_success_rate))
    }
}

impl Default for PatternAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for PatternAdapter {
    async fn search(
        &self,
        query: &str,
        context: &[String],
        max_results: usize,
        filters: &HashMap<String, String>,
    ) -> Vec<Evidence> {
        let query_lower = query::normalize(query);
        let category = filters.get("category");

        let mut scored: Vec<(f32, &SymptomPattern)> = self
            .patterns
            .iter()
            .filter(|pattern| match category {
                Some(cat) => pattern.category.eq_ignore_ascii_case(cat),
                None => true,
            })
            .filter_map(|pattern| {
                let raw = Self::match_score(pattern, &query_lower, context);
                if raw <= 0.0 {
                    return None;
                }
                let scaled =
                    raw * pattern.confidence * (0.5 + 0.5 * pattern.historical_success_rate);
                Some((scaled, pattern))
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(max_results);

        scored.into_iter().map(|(score, pattern)| Self::to_evidence(pattern, score)).collect()
    }

    fn source_type(&self) -> SourceType {
        SourceType::Pattern
    }

    fn score_weight(&self, query: &str) -> f32 {
        if query::has_any_token(query, query::FAILURE_TOKENS) {
            1.3
        } else {
            1.0
        }
    }
}

/// Built-in curated pattern table.
fn builtin_patterns() -> Vec<SymptomPattern> {
    vec![
        SymptomPattern {
            id: "connection-refused".to_string(),
            symptom_phrases: vec![
                "connection refused".to_string(),
                "econnrefused".to_string(),
                "cannot connect".to_string(),
            ],
            causes: vec![
                "target service is down or not listening on the expected port".to_string(),
                "firewall or security group blocks the connection".to_string(),
                "service bound to localhost instead of the external interface".to_string(),
            ],
            confidence: 0.92,
            historical_success_rate: 0.88,
            category: "networking".to_string(),
        },
        SymptomPattern {
            id: "dns-resolution".to_string(),
            symptom_phrases: vec![
                "name or service not known".to_string(),
                "dns resolution failed".to_string(),
                "could not resolve host".to_string(),
            ],
            causes: vec![
                "stale or missing DNS record".to_string(),
                "resolver misconfiguration on the client host".to_string(),
            ],
            confidence: 0.85,
            historical_success_rate: 0.8,
            category: "networking".to_string(),
        },
        SymptomPattern {
            id: "disk-full".to_string(),
            symptom_phrases: vec![
                "no space left on device".to_string(),
                "disk full".to_string(),
            ],
            causes: vec![
                "log files or temporary artifacts filled the volume".to_string(),
                "retention policy not applied to an append-only data directory".to_string(),
            ],
            confidence: 0.95,
            historical_success_rate: 0.93,
            category: "capacity".to_string(),
        },
        SymptomPattern {
            id: "oom-kill".to_string(),
            symptom_phrases: vec![
                "out of memory".to_string(),
                "oomkilled".to_string(),
                "killed process".to_string(),
            ],
            causes: vec![
                "container memory limit below actual working set".to_string(),
                "memory leak in a long-running worker".to_string(),
            ],
            confidence: 0.9,
            historical_success_rate: 0.85,
            category: "capacity".to_string(),
        },
        SymptomPattern {
            id: "auth-expired".to_string(),
            symptom_phrases: vec![
                "401 unauthorized".to_string(),
                "invalid credentials".to_string(),
                "token expired".to_string(),
            ],
            causes: vec![
                "expired or rotated credential still cached by the client".to_string(),
                "clock skew between the client and the token issuer".to_string(),
            ],
            confidence: 0.88,
            historical_success_rate: 0.9,
            category: "auth".to_string(),
        },
    ]
}
