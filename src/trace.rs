//! Injected collaborators: query sanitizer and section tracer.
//!
//! Both have working defaults so the engine constructs without the outer
//! system supplying anything.

use regex::Regex;
use std::time::Duration;
use tracing::debug;

/// Cleans caller-supplied query text before it reaches adapters or the cache key.
pub trait Sanitizer: Send + Sync {
    fn sanitize(&self, text: &str) -> String;
}

/// Default sanitizer: strips control characters, collapses whitespace, trims.
#[derive(Debug, Default)]
pub struct DefaultSanitizer;

impl Sanitizer for DefaultSanitizer {
    fn sanitize(&self, text: &str) -> String {
        let stripped: String = text.chars().filter(|c| !c.is_control()).collect();
        let re = Regex::new(r"\s+").unwrap();
        re.replace_all(stripped.trim(), " ").to_string()
    }
}

/// Observes named pipeline sections and their wall-clock durations.
pub trait Tracer: Send + Sync {
    fn section(&self, name: &str, elapsed: Duration);
}

/// Default tracer: emits section timings through `tracing`.
#[derive(Debug, Default)]
pub struct TracingTracer;

impl Tracer for TracingTracer {
    fn section(&self, name: &str, elapsed: Duration) {
        debug!(section = name, elapsed_ms = elapsed.as_millis() as u64, "section complete");
    }
}
