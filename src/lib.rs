//! Federated evidence retrieval for a troubleshooting assistant.
//!
//! This crate is the evidence-retrieval layer behind an AI troubleshooting
//! assistant: given a natural-language query and conversational context, it
//! gathers candidate evidence from heterogeneous knowledge sources, fuses
//! and ranks the results, and returns an explainable, latency-bounded
//! response.
//!
//! # Architecture
//!
//! - **Source adapters**: a uniform search contract with three concrete
//!   implementations: a document/runbook store, a curated symptom-to-cause
//!   pattern table, and a procedural playbook table
//! - **Semantic cache**: a TTL cache keyed by the normalized request rather
//!   than the exact request echo
//! - **Orchestrator**: concurrent, individually time-boxed fan-out with
//!   partial-failure tolerance, hybrid ranking, and recency bias
//! - **Metrics/health**: per-adapter counters rolled up into SLO-driven
//!   service health
//!
//! # Example
//!
//! ```no_run
//! use triage_retrieval::prelude::*;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let orchestrator = RetrievalOrchestrator::with_default_adapters(RetrievalConfig::default());
//!
//! let request = RetrievalRequest::new("connection refused from the payment gateway")
//!     .with_context(vec!["deployed new build an hour ago".to_string()])
//!     .with_max_results(5);
//!
//! let response = orchestrator.search(request).await?;
//! for evidence in &response.evidence {
//!     println!("#{:?} [{}] {}", evidence.rank, evidence.source, evidence.snippet);
//! }
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod cache;
pub mod config;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod query;
pub mod ranking;
pub mod trace;
pub mod types;

pub use adapters::{
    DocumentAdapter, DocumentHit, DocumentIndex, PatternAdapter, Playbook, PlaybookAdapter,
    SourceAdapter, SymptomPattern, VectorStore,
};
pub use cache::{CacheStats, CachedMetadata, SemanticCache};
pub use config::{CacheConfig, RetrievalConfig, SearchConfig, SloConfig};
pub use error::{Result, RetrievalError};
pub use metrics::{AdapterMetrics, HealthReport, HealthStatus, ServiceMetrics, StatsReport};
pub use orchestrator::RetrievalOrchestrator;
pub use trace::{DefaultSanitizer, Sanitizer, Tracer, TracingTracer};
pub use types::{Evidence, RetrievalRequest, RetrievalResponse, SourceType};

/// Re-export of the commonly used types.
pub mod prelude {
    pub use crate::adapters::SourceAdapter;
    pub use crate::config::RetrievalConfig;
    pub use crate::error::{Result, RetrievalError};
    pub use crate::orchestrator::RetrievalOrchestrator;
    pub use crate::types::{Evidence, RetrievalRequest, RetrievalResponse, SourceType};
}
