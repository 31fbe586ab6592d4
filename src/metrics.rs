//! Per-adapter and service-level metrics with SLO-driven health reporting.
//!
//! Counters are plain atomics updated best-effort from concurrent adapter
//! tasks; the latency sample window for p95 sits behind its own small lock.

use crate::cache::CacheStats;
use crate::types::SourceType;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

/// Bounded window of request latencies kept for percentile math.
const LATENCY_WINDOW: usize = 256;

/// Counters for a single registered adapter.
#[derive(Debug, Default)]
pub struct AdapterMetrics {
    pub searches: AtomicU64,
    pub failures: AtomicU64,
    pub timeouts: AtomicU64,
    pub results_returned: AtomicU64,
    pub total_latency_ms: AtomicU64,
}

impl AdapterMetrics {
    pub fn record_success(&self, results: usize, latency_ms: u64) {
        self.searches.fetch_add(1, Ordering::Relaxed);
        self.results_returned.fetch_add(results as u64, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
    }

    pub fn record_timeout(&self, latency_ms: u64) {
        self.searches.fetch_add(1, Ordering::Relaxed);
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
    }

    pub fn record_failure(&self, latency_ms: u64) {
        self.searches.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
    }

    pub fn failure_rate(&self) -> f64 {
        let searches = self.searches.load(Ordering::Relaxed);
        if searches == 0 {
            return 0.0;
        }
        self.failures.load(Ordering::Relaxed) as f64 / searches as f64
    }

    pub fn snapshot(&self) -> AdapterMetricsSnapshot {
        let searches = self.searches.load(Ordering::Relaxed);
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);
        AdapterMetricsSnapshot {
            searches,
            failures: self.failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            results_returned: self.results_returned.load(Ordering::Relaxed),
            avg_latency_ms: if searches == 0 {
                0.0
            } else {
                total_latency as f64 / searches as f64
            },
            failure_rate: self.failure_rate(),
        }
    }
}

/// Point-in-time view of one adapter's counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdapterMetricsSnapshot {
    pub searches: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub results_returned: u64,
    pub avg_latency_ms: f64,
    pub failure_rate: f64,
}

/// Service-level counters for the orchestration pipeline.
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    pub requests: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub validation_failures: AtomicU64,
    latencies: Mutex<VecDeque<u64>>,
}

impl ServiceMetrics {
    pub fn record_latency(&self, latency_ms: u64) {
        let mut samples = self.latencies.lock();
        if samples.len() == LATENCY_WINDOW {
            samples.pop_front();
        }
        samples.push_back(latency_ms);
    }

    pub fn p95_latency_ms(&self) -> u64 {
        let samples = self.latencies.lock();
        if samples.is_empty() {
            return 0;
        }
        let mut sorted: Vec<u64> = samples.iter().copied().collect();
        sorted.sort_unstable();
        let index = ((sorted.len() as f64) * 0.95).ceil() as usize;
        sorted[index.saturating_sub(1).min(sorted.len() - 1)]
    }

    pub fn avg_latency_ms(&self) -> f64 {
        let samples = self.latencies.lock();
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<u64>() as f64 / samples.len() as f64
    }

    pub fn cache_lookups(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed) + self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn cache_hit_rate(&self) -> f64 {
        let lookups = self.cache_lookups();
        if lookups == 0 {
            return 0.0;
        }
        self.cache_hits.load(Ordering::Relaxed) as f64 / lookups as f64
    }

    pub fn snapshot(&self) -> ServiceMetricsSnapshot {
        ServiceMetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            avg_latency_ms: self.avg_latency_ms(),
            p95_latency_ms: self.p95_latency_ms(),
            cache_hit_rate: self.cache_hit_rate(),
        }
    }
}

/// Point-in-time view of the service counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceMetricsSnapshot {
    pub requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub validation_failures: u64,
    pub avg_latency_ms: f64,
    pub p95_latency_ms: u64,
    pub cache_hit_rate: f64,
}

/// Rolled-up service health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health and counters for one adapter.
#[derive(Debug, Clone, Serialize)]
pub struct AdapterHealth {
    pub status: HealthStatus,
    pub metrics: AdapterMetricsSnapshot,
}

/// Response of the health check endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub service: String,
    pub status: HealthStatus,
    pub metrics: ServiceMetricsSnapshot,
    pub adapters: HashMap<SourceType, AdapterHealth>,
    pub cache_enabled: bool,
    pub errors: Vec<String>,
}

/// Response of the cache/metrics stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub cache_enabled: bool,
    pub cache_stats: CacheStats,
    pub adapter_stats: HashMap<SourceType, AdapterMetricsSnapshot>,
    pub service_metrics: ServiceMetricsSnapshot,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_adapter_metrics_counters() {
        let metrics = AdapterMetrics::default();
        metrics.record_success(3, 40);
        metrics.record_success(2, 60);
        metrics.record_timeout(800);
        metrics.record_failure(5);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.searches, 4);
        assert_eq!(snapshot.failures, 2);
        assert_eq!(snapshot.timeouts, 1);
        assert_eq!(snapshot.results_returned, 5);
        assert_relative_eq!(snapshot.failure_rate, 0.5);
        assert_relative_eq!(snapshot.avg_latency_ms, (40.0 + 60.0 + 800.0 + 5.0) / 4.0);
    }

    #[test]
    fn test_failure_rate_with_no_searches() {
        let metrics = AdapterMetrics::default();
        assert_relative_eq!(metrics.failure_rate(), 0.0);
    }

    #[test]
    fn test_p95_latency() {
        let metrics = ServiceMetrics::default();
        for latency in 1..=100 {
            metrics.record_latency(latency);
        }
        assert_eq!(metrics.p95_latency_ms(), 95);

        let empty = ServiceMetrics::default();
        assert_eq!(empty.p95_latency_ms(), 0);
    }

    #[test]
    fn test_latency_window_is_bounded() {
        let metrics = ServiceMetrics::default();
        for latency in 0..(LATENCY_WINDOW as u64 + 100) {
            metrics.record_latency(latency);
        }
        // The oldest 100 samples were dropped, so the minimum kept is 100.
        assert!(metrics.avg_latency_ms() >= 100.0);
    }

    #[test]
    fn test_cache_hit_rate() {
        let metrics = ServiceMetrics::default();
        assert_relative_eq!(metrics.cache_hit_rate(), 0.0);

        metrics.cache_hits.store(3, Ordering::Relaxed);
        metrics.cache_misses.store(1, Ordering::Relaxed);
        assert_relative_eq!(metrics.cache_hit_rate(), 0.75);
        assert_eq!(metrics.cache_lookups(), 4);
    }
}
