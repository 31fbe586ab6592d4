//! Procedural playbook retrieval.
//!
//! Playbooks score +0.4 when any query token appears in the title, +0.2 per
//! keyword literally contained in the query, and +0.1 once for the first
//! context entry containing any keyword. An optional `category` filter
//! excludes playbooks before scoring.

use crate::adapters::SourceAdapter;
use crate::query;
use crate::types::{Evidence, SourceType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

const TITLE_SCORE: f32 = 0.4;
const KEYWORD_SCORE: f32 = 0.2;
const CONTEXT_SCORE: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

/// One step-by-step remediation procedure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playbook {
    pub id: String,
    pub title: String,
    pub keywords: Vec<String>,
    pub steps: Vec<String>,
    pub category: String,
    pub difficulty: Difficulty,
    pub estimated_minutes: u32,
}

/// Adapter over the playbook table.
pub struct PlaybookAdapter {
    playbooks: Vec<Playbook>,
}

impl PlaybookAdapter {
    pub fn new() -> Self {
        Self::with_playbooks(builtin_playbooks())
    }

    pub fn with_playbooks(playbooks: Vec<Playbook>) -> Self {
        debug!(playbooks = playbooks.len(), "loaded playbook table");
        Self { playbooks }
    }

    fn match_score(playbook: &Playbook, query_lower: &str, context: &[String]) -> f32 {
        let query_tokens = query::tokens(query_lower);
        let title_tokens = query::tokens(&playbook.title);
        let keywords: Vec<String> = playbook.keywords.iter().map(|k| k.to_lowercase()).collect();

        let mut score = 0.0;

        if query_tokens.iter().any(|token| title_tokens.contains(token)) {
            score += TITLE_SCORE;
        }

        score += keywords
            .iter()
            .filter(|keyword| query_lower.contains(keyword.as_str()))
            .count() as f32
            * KEYWORD_SCORE;

        // Only the first context entry containing any keyword counts.
        for entry in context {
            let entry_lower = query::normalize(entry);
            if keywords.iter().any(|keyword| entry_lower.contains(keyword.as_str())) {
                score += CONTEXT_SCORE;
                break;
            }
        }

        score
    }

    fn to_evidence(playbook: &Playbook, score: f32) -> Evidence {
        let steps = playbook
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| format!("{}. {}", i + 1, step))
            .collect::<Vec<_>>()
            .join(" ");
        let snippet = format!(
            "{} (~{} min, {:?} level): {}",
            playbook.title, playbook.estimated_minutes, playbook.difficulty, steps
        );

        Evidence::new(format!("playbook:{}", playbook.id), SourceType::Playbook, snippet, score)
            .with_confidence(score.min(1.0))
            .with_provenance("adapter", "playbook")
            .with_provenance("adapter_version", env!("CARGO_PKG_VERSION"))
            .with_provenance("category", playbook.category.clone())
            .with_provenance("steps", playbook.steps.len().to_string())
    }
}

impl Default for PlaybookAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for PlaybookAdapter {
    async fn search(
        &self,
        query: &str,
        context: &[String],
        max_results: usize,
        filters: &HashMap<String, String>,
    ) -> Vec<Evidence> {
        let query_lower = query::normalize(query);
        let category = filters.get("category");

        let mut scored: Vec<(f32, &Playbook)> = self
            .playbooks
            .iter()
            .filter(|playbook| match category {
                Some(cat) => playbook.category.eq_ignore_ascii_case(cat),
                None => true,
            })
            .filter_map(|playbook| {
                let score = Self::match_score(playbook, &query_lower, context);
                if score <= 0.0 { None } else { Some((score, playbook)) }
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(max_results);

        scored.into_iter().map(|(score, playbook)| Self::to_evidence(playbook, score)).collect()
    }

    fn source_type(&self) -> SourceType {
        SourceType::Playbook
    }

    fn score_weight(&self, query: &str) -> f32 {
        if query::has_any_token(query, query::PROCEDURAL_TOKENS) {
            1.1
        } else {
            1.0
        }
    }
}

/// Built-in playbook table.
fn builtin_playbooks() -> Vec<Playbook> {
    vec![
        Playbook {
            id: "restart-unhealthy-service".to_string(),
            title: "Restart an unhealthy service".to_string(),
            keywords: vec!["restart".to_string(), "unhealthy".to_string(), "crash".to_string()],
            steps: vec![
                "Confirm the health-check failure in the service dashboard".to_string(),
                "Drain in-flight requests from the instance".to_string(),
                "Restart the service unit and watch the first readiness probe".to_string(),
                "Re-enable traffic and monitor error rates for ten minutes".to_string(),
            ],
            category: "operations".to_string(),
            difficulty: Difficulty::Beginner,
            estimated_minutes: 15,
        },
        Playbook {
            id: "diagnose-connection-refused".to_string(),
            title: "Diagnose a refused connection".to_string(),
            keywords: vec![
                "connection".to_string(),
                "refused".to_string(),
                "port".to_string(),
            ],
            steps: vec![
                "Probe the target port from the calling host".to_string(),
                "Verify the service process is listening on the expected interface".to_string(),
                "Check firewall and security-group rules along the path".to_string(),
                "Compare against a healthy peer to isolate the difference".to_string(),
            ],
            category: "networking".to_string(),
            difficulty: Difficulty::Intermediate,
            estimated_minutes: 25,
        },
        Playbook {
            id: "reclaim-disk-space".to_string(),
            title: "Reclaim disk space safely".to_string(),
            keywords: vec!["disk".to_string(), "space".to_string(), "cleanup".to_string()],
            steps: vec![
                "Identify the largest directories on the affected volume".to_string(),
                "Rotate and compress logs older than the retention window".to_string(),
                "Remove orphaned build artifacts and temporary files".to_string(),
                "Add an alert at eighty percent utilization".to_string(),
            ],
            category: "capacity".to_string(),
            difficulty: Difficulty::Beginner,
            estimated_minutes: 20,
        },
        Playbook {
            id: "rotate-expired-credentials".to_string(),
            title: "Rotate expired credentials".to_string(),
            keywords: vec!["credentials".to_string(), "token".to_string(), "rotate".to_string()],
            steps: vec![
                "Issue a replacement credential from the secrets manager".to_string(),
                "Deploy the new credential to every consumer".to_string(),
                "Revoke the expired credential and verify no consumer still uses it".to_string(),
            ],
            category: "auth".to_string(),
            difficulty: Difficulty::Advanced,
            estimated_minutes: 40,
        },
    ]
}
