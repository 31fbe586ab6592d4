//! Configuration for the retrieval engine.

use crate::error::Result;
use crate::types::SourceType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Main configuration for the retrieval engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub service_name: String,
    pub search: SearchConfig,
    pub cache: CacheConfig,
    pub slo: SloConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            service_name: "triage-retrieval".to_string(),
            search: SearchConfig::default(),
            cache: CacheConfig::default(),
            slo: SloConfig::default(),
        }
    }
}

impl RetrievalConfig {
    /// Parse configuration from a TOML document; missing sections keep defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Time budget for a single adapter, honoring per-source overrides.
    pub fn adapter_timeout(&self, source: SourceType) -> Duration {
        let ms = self
            .search
            .adapter_timeout_overrides_ms
            .get(&source)
            .copied()
            .unwrap_or(self.search.adapter_timeout_ms);
        Duration::from_millis(ms)
    }
}

/// Search and fan-out configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Per-adapter time budget for one search call.
    pub adapter_timeout_ms: u64,

    /// Per-source overrides of the default budget.
    pub adapter_timeout_overrides_ms: HashMap<SourceType, u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            adapter_timeout_ms: 800,
            adapter_timeout_overrides_ms: HashMap::new(),
        }
    }
}

/// Semantic response cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    /// Time-to-live for cached responses.
    pub ttl_seconds: u64,

    /// Entry capacity; the oldest entry is evicted beyond it.
    pub max_entries: usize,

    /// Interval for the background expired-entry sweep.
    pub sweep_interval_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 300,
            max_entries: 1_000,
            sweep_interval_seconds: 60,
        }
    }
}

/// Service level objectives used by the health rollup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SloConfig {
    pub max_p95_latency_ms: u64,

    /// Failure rate above which an adapter degrades the service.
    pub max_adapter_failure_rate: f64,

    /// Failure rate above which an adapter is reported unhealthy.
    pub unhealthy_failure_rate: f64,

    pub min_cache_hit_rate: f64,

    /// Cache lookups required before the hit-rate SLO is evaluated.
    pub min_hit_rate_samples: u64,
}

impl Default for SloConfig {
    fn default() -> Self {
        Self {
            max_p95_latency_ms: 1_500,
            max_adapter_failure_rate: 0.25,
            unhealthy_failure_rate: 0.5,
            min_cache_hit_rate: 0.2,
            min_hit_rate_samples: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RetrievalConfig::default();
        assert_eq!(config.service_name, "triage-retrieval");
        assert_eq!(config.search.adapter_timeout_ms, 800);
        assert_eq!(config.cache.ttl_seconds, 300);
        assert!(config.cache.enabled);
        assert_eq!(config.slo.max_p95_latency_ms, 1_500);
    }

    #[test]
    fn test_serialization_round_trip() {
        let config = RetrievalConfig::default();
        let raw = toml::to_string(&config).unwrap();
        let parsed = RetrievalConfig::from_toml_str(&raw).unwrap();
        assert_eq!(parsed.service_name, config.service_name);
        assert_eq!(parsed.cache.max_entries, config.cache.max_entries);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let parsed = RetrievalConfig::from_toml_str(
            r#"
            service_name = "triage-retrieval-staging"

            [cache]
            ttl_seconds = 30
            "#,
        )
        .unwrap();

        assert_eq!(parsed.service_name, "triage-retrieval-staging");
        assert_eq!(parsed.cache.ttl_seconds, 30);
        // Untouched sections keep their defaults.
        assert_eq!(parsed.cache.max_entries, 1_000);
        assert_eq!(parsed.search.adapter_timeout_ms, 800);
    }

    #[test]
    fn test_adapter_timeout_override() {
        let mut config = RetrievalConfig::default();
        config
            .search
            .adapter_timeout_overrides_ms
            .insert(SourceType::Document, 1_200);

        assert_eq!(config.adapter_timeout(SourceType::Document), Duration::from_millis(1_200));
        assert_eq!(config.adapter_timeout(SourceType::Pattern), Duration::from_millis(800));
    }
}
