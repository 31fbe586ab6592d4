//! Core data model: evidence, requests, and responses.

use crate::error::{RetrievalError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Upper bound on evidence snippet length, enforced at construction.
pub const MAX_SNIPPET_CHARS: usize = 500;

/// Bounds on `RetrievalRequest::max_results`.
pub const MIN_MAX_RESULTS: usize = 1;
pub const MAX_MAX_RESULTS: usize = 100;

/// Identifier of a knowledge source behind an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Document,
    Pattern,
    Playbook,
}

impl SourceType {
    pub const ALL: [SourceType; 3] = [SourceType::Document, SourceType::Pattern, SourceType::Playbook];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Document => "document",
            SourceType::Pattern => "pattern",
            SourceType::Playbook => "playbook",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "document" => Ok(SourceType::Document),
            "pattern" => Ok(SourceType::Pattern),
            "playbook" => Ok(SourceType::Playbook),
            other => Err(RetrievalError::UnknownSource(other.to_string())),
        }
    }
}

/// A single ranked result from a search, carrying score, provenance, and snippet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    /// Adapter-qualified record id, e.g. `document:runbook-42`.
    pub source: String,
    pub source_type: SourceType,
    pub snippet: String,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Adapter name/version and adapter-specific extras.
    pub provenance: HashMap<String, String>,
    /// 1-based position, assigned only after the final sort.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<usize>,
    pub confidence: f32,
    /// Additive contribution computed by the emitting adapter.
    pub recency_boost: f32,
}

impl Evidence {
    pub fn new(
        source: impl Into<String>,
        source_type: SourceType,
        snippet: impl Into<String>,
        score: f32,
    ) -> Self {
        let mut snippet: String = snippet.into();
        if snippet.chars().count() > MAX_SNIPPET_CHARS {
            snippet = snippet.chars().take(MAX_SNIPPET_CHARS).collect();
        }

        Self {
            source: source.into(),
            source_type,
            snippet,
            score,
            url: None,
            timestamp: Utc::now(),
            provenance: HashMap::new(),
            rank: None,
            confidence: 0.0,
            recency_boost: 0.0,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_recency_boost(mut self, boost: f32) -> Self {
        self.recency_boost = boost;
        self
    }

    pub fn with_provenance(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.provenance.insert(key.into(), value.into());
        self
    }
}

/// A retrieval request against the registered adapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalRequest {
    pub query: String,

    /// Ordered conversational context, most recent last.
    #[serde(default)]
    pub context: Vec<String>,

    /// Sources to query; empty means all registered adapters.
    #[serde(default)]
    pub enabled_sources: Vec<SourceType>,

    #[serde(default = "default_max_results")]
    pub max_results: usize,

    #[serde(default = "default_recency_bias")]
    pub include_recency_bias: bool,

    /// Minimum fused score; evidence below it is dropped.
    #[serde(default)]
    pub semantic_similarity_threshold: f32,

    /// Caller-supplied per-source multipliers; absent sources default to 1.0.
    #[serde(default)]
    pub source_weights: HashMap<SourceType, f32>,

    /// Opaque filters forwarded to adapters (e.g. playbook `category`).
    #[serde(default)]
    pub filters: HashMap<String, String>,
}

fn default_max_results() -> usize {
    10
}

fn default_recency_bias() -> bool {
    true
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            context: Vec::new(),
            enabled_sources: Vec::new(),
            max_results: default_max_results(),
            include_recency_bias: default_recency_bias(),
            semantic_similarity_threshold: 0.0,
            source_weights: HashMap::new(),
            filters: HashMap::new(),
        }
    }

    pub fn with_context(mut self, context: Vec<String>) -> Self {
        self.context = context;
        self
    }

    pub fn with_sources(mut self, sources: Vec<SourceType>) -> Self {
        self.enabled_sources = sources;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_recency_bias(mut self, enabled: bool) -> Self {
        self.include_recency_bias = enabled;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.semantic_similarity_threshold = threshold;
        self
    }

    pub fn with_source_weight(mut self, source: SourceType, weight: f32) -> Self {
        self.source_weights.insert(source, weight);
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    /// Validate shape and membership against the registered sources.
    pub fn validate(&self, registered: &[SourceType]) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(RetrievalError::Validation("query must not be empty".to_string()));
        }

        if self.max_results < MIN_MAX_RESULTS || self.max_results > MAX_MAX_RESULTS {
            return Err(RetrievalError::Validation(format!(
                "max_results must be between {} and {}, got {}",
                MIN_MAX_RESULTS, MAX_MAX_RESULTS, self.max_results
            )));
        }

        if !(0.0..=1.0).contains(&self.semantic_similarity_threshold) {
            return Err(RetrievalError::Validation(format!(
                "semantic_similarity_threshold must be within [0, 1], got {}",
                self.semantic_similarity_threshold
            )));
        }

        let registered: HashSet<SourceType> = registered.iter().copied().collect();
        for source in &self.enabled_sources {
            if !registered.contains(source) {
                return Err(RetrievalError::Validation(format!(
                    "source '{}' is not registered",
                    source
                )));
            }
        }

        Ok(())
    }
}

/// Response to a retrieval request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResponse {
    /// Ranked evidence, length bounded by `max_results`.
    pub evidence: Vec<Evidence>,
    /// Candidate count after threshold filtering, before truncation.
    pub total_found: usize,
    pub elapsed_ms: u64,
    pub source_latencies: HashMap<SourceType, u64>,
    pub cache_hit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
    pub avg_relevance_score: f32,
    /// Evidence count per source over the truncated set.
    pub source_distribution: HashMap<SourceType, usize>,
}
