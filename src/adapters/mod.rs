//! Source adapters: a uniform search contract over heterogeneous knowledge sources.

pub mod document;
pub mod pattern;
pub mod playbook;

pub use document::{DocumentAdapter, DocumentHit, DocumentIndex, VectorStore};
pub use pattern::{PatternAdapter, SymptomPattern};
pub use playbook::{Difficulty, Playbook, PlaybookAdapter};

use crate::types::{Evidence, SourceType};
use async_trait::async_trait;
use std::collections::HashMap;

/// Uniform capability implemented by every knowledge source.
///
/// `search` must never raise: adapters log internal failures and degrade to
/// an empty (or partial) result, so one failing source cannot abort the
/// orchestrator's fan-out or starve the other adapters.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn search(
        &self,
        query: &str,
        context: &[String],
        max_results: usize,
        filters: &HashMap<String, String>,
    ) -> Vec<Evidence>;

    /// Stable identifier used for weighting and distribution reporting.
    fn source_type(&self) -> SourceType;

    /// Multiplier biasing this adapter for query shapes it serves well.
    fn score_weight(&self, _query: &str) -> f32 {
        1.0
    }
}
