//! Retrieval orchestration: validation, caching, concurrent fan-out, hybrid
//! ranking, and the administrative surface.
//!
//! The pipeline is a single linear pass with one early exit at the cache
//! check. Each enabled adapter runs as an independent, time-boxed task; a
//! slow or failed adapter contributes an empty set and bumps a counter
//! without delaying the others, so worst-case latency is bounded by the
//! largest single adapter budget rather than their sum.

use crate::adapters::{DocumentAdapter, PatternAdapter, PlaybookAdapter, SourceAdapter};
use crate::cache::{CachedMetadata, SemanticCache};
use crate::config::RetrievalConfig;
use crate::error::Result;
use crate::metrics::{
    AdapterHealth, AdapterMetrics, HealthReport, HealthStatus, ServiceMetrics, StatsReport,
};
use crate::query;
use crate::ranking::{self, RankingContext};
use crate::trace::{DefaultSanitizer, Sanitizer, Tracer, TracingTracer};
use crate::types::{Evidence, RetrievalRequest, RetrievalResponse, SourceType};
use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;
use tokio::time::timeout;
use tracing::{debug, info, warn};

struct RegisteredAdapter {
    adapter: Arc<dyn SourceAdapter>,
    metrics: Arc<AdapterMetrics>,
}

/// Fans one request out to every enabled adapter and fuses the results.
pub struct RetrievalOrchestrator {
    config: RetrievalConfig,
    adapters: DashMap<SourceType, RegisteredAdapter>,
    cache: Option<Arc<SemanticCache>>,
    sanitizer: Arc<dyn Sanitizer>,
    tracer: Arc<dyn Tracer>,
    metrics: Arc<ServiceMetrics>,
}

impl RetrievalOrchestrator {
    pub fn new(config: RetrievalConfig) -> Self {
        let cache = config.cache.enabled.then(|| {
            Arc::new(SemanticCache::new(
                config.cache.max_entries,
                std::time::Duration::from_secs(config.cache.ttl_seconds),
            ))
        });

        info!(
            service = %config.service_name,
            cache_enabled = cache.is_some(),
            "initializing retrieval orchestrator"
        );

        Self {
            config,
            adapters: DashMap::new(),
            cache,
            sanitizer: Arc::new(DefaultSanitizer),
            tracer: Arc::new(TracingTracer),
            metrics: Arc::new(ServiceMetrics::default()),
        }
    }

    /// Orchestrator with the three built-in adapters registered.
    pub fn with_default_adapters(config: RetrievalConfig) -> Self {
        let orchestrator = Self::new(config);
        orchestrator.register_adapter(Arc::new(DocumentAdapter::new()));
        orchestrator.register_adapter(Arc::new(PatternAdapter::new()));
        orchestrator.register_adapter(Arc::new(PlaybookAdapter::new()));
        orchestrator
    }

    pub fn with_sanitizer(mut self, sanitizer: Arc<dyn Sanitizer>) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }

    /// Register (or replace) the adapter for its source type.
    pub fn register_adapter(&self, adapter: Arc<dyn SourceAdapter>) {
        let source = adapter.source_type();
        debug!(%source, "registering adapter");
        self.adapters.insert(
            source,
            RegisteredAdapter { adapter, metrics: Arc::new(AdapterMetrics::default()) },
        );
    }

    pub fn registered_sources(&self) -> Vec<SourceType> {
        self.adapters.iter().map(|entry| *entry.key()).collect()
    }

    /// Start the periodic expired-entry sweep; `None` when caching is off.
    pub fn start_cache_sweeper(&self) -> Option<tokio::task::JoinHandle<()>> {
        self.cache.as_ref().map(|cache| {
            cache.spawn_sweeper(std::time::Duration::from_secs(
                self.config.cache.sweep_interval_seconds,
            ))
        })
    }

    /// Run the full retrieval pipeline for one request.
    pub async fn search(&self, request: RetrievalRequest) -> Result<RetrievalResponse> {
        let started = Instant::now();
        self.metrics.requests.fetch_add(1, Ordering::Relaxed);

        let registered = self.registered_sources();
        if let Err(e) = request.validate(&registered) {
            self.metrics.validation_failures.fetch_add(1, Ordering::Relaxed);
            return Err(e);
        }

        let sanitized = self.sanitizer.sanitize(&request.query);
        let cache_key = query::cache_key(&request, &sanitized);

        if let Some(cache) = &self.cache {
            let lookup_started = Instant::now();
            let cached = cache.get(&cache_key);
            self.tracer.section("cache_lookup", lookup_started.elapsed());

            if let Some((evidence, metadata)) = cached {
                self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
                let elapsed_ms = started.elapsed().as_millis() as u64;
                self.metrics.record_latency(elapsed_ms);
                debug!(key = %cache_key, "cache hit");

                return Ok(RetrievalResponse {
                    evidence,
                    total_found: metadata.total_found,
                    elapsed_ms,
                    source_latencies: metadata.source_latencies,
                    cache_hit: true,
                    cache_key: Some(cache_key),
                    avg_relevance_score: metadata.avg_relevance_score,
                    source_distribution: metadata.source_distribution,
                });
            }
            self.metrics.cache_misses.fetch_add(1, Ordering::Relaxed);
        }

        let targets = self.resolve_targets(&request, &registered);

        let fan_out_started = Instant::now();
        let (candidates, source_latencies) = self.fan_out(&sanitized, &request, &targets).await;
        self.tracer.section("fan_out", fan_out_started.elapsed());

        let ranking_started = Instant::now();
        let adapter_weights: HashMap<SourceType, f32> = targets
            .iter()
            .filter_map(|source| {
                self.adapters
                    .get(source)
                    .map(|entry| (*source, entry.adapter.score_weight(&sanitized)))
            })
            .collect();

        let ctx = RankingContext {
            adapter_weights,
            caller_weights: request.source_weights.clone(),
            include_recency_bias: request.include_recency_bias,
            now: Utc::now(),
        };
        let mut ranked = ranking::fuse(candidates, &ctx);

        ranked.retain(|evidence| evidence.score >= request.semantic_similarity_threshold);
        let total_found = ranked.len();

        ranked.truncate(request.max_results);
        ranking::assign_ranks(&mut ranked);
        self.tracer.section("ranking", ranking_started.elapsed());

        let avg_relevance_score = if ranked.is_empty() {
            0.0
        } else {
            ranked.iter().map(|e| e.score).sum::<f32>() / ranked.len() as f32
        };

        let mut source_distribution: HashMap<SourceType, usize> = HashMap::new();
        for evidence in &ranked {
            *source_distribution.entry(evidence.source_type).or_insert(0) += 1;
        }

        // Cache failures must not abort a computed response; storage is
        // fire-and-forget from the pipeline's point of view.
        if let Some(cache) = &self.cache {
            cache.set(
                cache_key.clone(),
                ranked.clone(),
                CachedMetadata {
                    total_found,
                    avg_relevance_score,
                    source_distribution: source_distribution.clone(),
                    source_latencies: source_latencies.clone(),
                },
                None,
            );
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.metrics.record_latency(elapsed_ms);
        info!(
            total_found,
            returned = ranked.len(),
            elapsed_ms,
            "retrieval complete"
        );

        Ok(RetrievalResponse {
            evidence: ranked,
            total_found,
            elapsed_ms,
            source_latencies,
            cache_hit: false,
            cache_key: Some(cache_key),
            avg_relevance_score,
            source_distribution,
        })
    }

    /// Pattern-table lookup for a set of observed symptoms.
    ///
    /// Curated patterns are not time-sensitive, so recency bias is off.
    pub async fn search_patterns(
        &self,
        symptoms: &[String],
        context: &[String],
    ) -> Result<RetrievalResponse> {
        let request = RetrievalRequest::new(symptoms.join(" "))
            .with_context(context.to_vec())
            .with_sources(vec![SourceType::Pattern])
            .with_recency_bias(false);
        self.search(request).await
    }

    /// Clear cached responses; returns false when caching is disabled.
    pub fn invalidate_cache(&self, source_type: Option<SourceType>) -> bool {
        match &self.cache {
            Some(cache) => {
                let cleared = cache.invalidate(source_type);
                info!(cleared, "cache invalidated");
                true
            }
            None => false,
        }
    }

    pub fn cache_stats(&self) -> StatsReport {
        StatsReport {
            cache_enabled: self.cache.is_some(),
            cache_stats: self.cache.as_ref().map(|c| c.stats()).unwrap_or_default(),
            adapter_stats: self
                .adapters
                .iter()
                .map(|entry| (*entry.key(), entry.value().metrics.snapshot()))
                .collect(),
            service_metrics: self.metrics.snapshot(),
            timestamp: Utc::now(),
        }
    }

    /// Roll adapter and service counters up into an SLO-driven status.
    pub fn health_check(&self) -> HealthReport {
        let service = self.metrics.snapshot();
        let slo = &self.config.slo;
        let mut errors = Vec::new();
        let mut adapters = HashMap::new();
        let mut any_unhealthy = false;

        for entry in self.adapters.iter() {
            let snapshot = entry.value().metrics.snapshot();
            let status = if snapshot.searches > 0 && snapshot.failure_rate > slo.unhealthy_failure_rate
            {
                any_unhealthy = true;
                errors.push(format!(
                    "adapter '{}' failure rate {:.2} exceeds hard ceiling {:.2}",
                    entry.key(),
                    snapshot.failure_rate,
                    slo.unhealthy_failure_rate
                ));
                HealthStatus::Unhealthy
            } else if snapshot.searches > 0
                && snapshot.failure_rate > slo.max_adapter_failure_rate
            {
                errors.push(format!(
                    "adapter '{}' failure rate {:.2} exceeds SLO {:.2}",
                    entry.key(),
                    snapshot.failure_rate,
                    slo.max_adapter_failure_rate
                ));
                HealthStatus::Degraded
            } else {
                HealthStatus::Healthy
            };
            adapters.insert(*entry.key(), AdapterHealth { status, metrics: snapshot });
        }

        if service.requests > 0 && service.p95_latency_ms > slo.max_p95_latency_ms {
            errors.push(format!(
                "p95 latency {} ms exceeds SLO {} ms",
                service.p95_latency_ms, slo.max_p95_latency_ms
            ));
        }

        if self.cache.is_some()
            && self.metrics.cache_lookups() >= slo.min_hit_rate_samples
            && service.cache_hit_rate < slo.min_cache_hit_rate
        {
            errors.push(format!(
                "cache hit rate {:.2} below SLO {:.2}",
                service.cache_hit_rate, slo.min_cache_hit_rate
            ));
        }

        let status = if adapters.is_empty() {
            errors.push("no adapters registered".to_string());
            HealthStatus::Unhealthy
        } else if any_unhealthy {
            HealthStatus::Unhealthy
        } else if errors.is_empty() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        HealthReport {
            service: self.config.service_name.clone(),
            status,
            metrics: service,
            adapters,
            cache_enabled: self.cache.is_some(),
            errors,
        }
    }

    /// True iff at least one adapter is registered.
    pub fn ready_check(&self) -> bool {
        !self.adapters.is_empty()
    }

    fn resolve_targets(
        &self,
        request: &RetrievalRequest,
        registered: &[SourceType],
    ) -> Vec<SourceType> {
        if request.enabled_sources.is_empty() {
            let mut all = registered.to_vec();
            all.sort_by_key(|s| s.as_str());
            return all;
        }
        let mut targets = Vec::new();
        for source in &request.enabled_sources {
            if !targets.contains(source) {
                targets.push(*source);
            }
        }
        targets
    }

    /// Launch one independent, time-boxed task per target adapter and merge
    /// whatever comes back within budget.
    async fn fan_out(
        &self,
        query: &str,
        request: &RetrievalRequest,
        targets: &[SourceType],
    ) -> (Vec<Evidence>, HashMap<SourceType, u64>) {
        let tasks: Vec<_> = targets
            .iter()
            .filter_map(|source| {
                let entry = self.adapters.get(source)?;
                let adapter = Arc::clone(&entry.adapter);
                let metrics = Arc::clone(&entry.metrics);
                drop(entry);

                let source = *source;
                let budget = self.config.adapter_timeout(source);
                let query = query.to_string();
                let context = request.context.clone();
                let filters = request.filters.clone();
                let max_results = request.max_results;

                Some(async move {
                    let search_started = Instant::now();
                    let handle = tokio::spawn(async move {
                        adapter.search(&query, &context, max_results, &filters).await
                    });

                    let outcome = timeout(budget, handle).await;
                    let latency = search_started.elapsed().as_millis() as u64;

                    let evidence = match outcome {
                        Ok(Ok(evidence)) => {
                            metrics.record_success(evidence.len(), latency);
                            evidence
                        }
                        Ok(Err(join_error)) => {
                            warn!(%source, error = %join_error, "adapter task failed");
                            metrics.record_failure(latency);
                            Vec::new()
                        }
                        Err(_) => {
                            // The abandoned task keeps running detached; no
                            // retry is attempted.
                            warn!(
                                %source,
                                budget_ms = budget.as_millis() as u64,
                                "adapter timed out, contributing empty result"
                            );
                            metrics.record_timeout(latency);
                            Vec::new()
                        }
                    };

                    (source, evidence, latency)
                })
            })
            .collect();

        let results = join_all(tasks).await;

        let mut merged = Vec::new();
        let mut latencies = HashMap::new();
        for (source, evidence, latency) in results {
            latencies.insert(source, latency);
            merged.extend(evidence);
        }
        (merged, latencies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RetrievalError;

    fn test_config() -> RetrievalConfig {
        RetrievalConfig::default()
    }

    #[tokio::test]
    async fn test_validation_failures_propagate() {
        let orchestrator = RetrievalOrchestrator::with_default_adapters(test_config());

        let err = orchestrator.search(RetrievalRequest::new("  ")).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Validation(_)));

        let err = orchestrator
            .search(RetrievalRequest::new("q").with_max_results(0))
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::Validation(_)));

        assert_eq!(orchestrator.metrics.validation_failures.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_unknown_enabled_source_is_rejected() {
        let orchestrator = RetrievalOrchestrator::new(test_config());
        orchestrator.register_adapter(Arc::new(PatternAdapter::new()));

        let err = orchestrator
            .search(RetrievalRequest::new("q").with_sources(vec![SourceType::Document]))
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::Validation(_)));
    }

    #[tokio::test]
    async fn test_ready_check_requires_an_adapter() {
        let orchestrator = RetrievalOrchestrator::new(test_config());
        assert!(!orchestrator.ready_check());

        orchestrator.register_adapter(Arc::new(PatternAdapter::new()));
        assert!(orchestrator.ready_check());
    }

    #[tokio::test]
    async fn test_health_unhealthy_without_adapters() {
        let orchestrator = RetrievalOrchestrator::new(test_config());
        let report = orchestrator.health_check();
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert!(report.errors.iter().any(|e| e.contains("no adapters")));
    }

    #[tokio::test]
    async fn test_health_healthy_with_idle_adapters() {
        let orchestrator = RetrievalOrchestrator::with_default_adapters(test_config());
        let report = orchestrator.health_check();
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.errors.is_empty());
        assert_eq!(report.adapters.len(), 3);
    }

    #[tokio::test]
    async fn test_invalidate_without_cache_reports_false() {
        let mut config = test_config();
        config.cache.enabled = false;
        let orchestrator = RetrievalOrchestrator::with_default_adapters(config);
        assert!(!orchestrator.invalidate_cache(None));
        assert!(!orchestrator.cache_stats().cache_enabled);
    }

    #[tokio::test]
    async fn test_search_patterns_scopes_to_pattern_adapter() {
        let orchestrator = RetrievalOrchestrator::with_default_adapters(test_config());

        let response = orchestrator
            .search_patterns(
                &["connection refused".to_string()],
                &["gateway logs show econnrefused".to_string()],
            )
            .await
            .unwrap();

        assert!(!response.evidence.is_empty());
        assert!(response.evidence.iter().all(|e| e.source_type == SourceType::Pattern));
    }
}
