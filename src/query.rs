//! Query normalization, intent vocabulary, and cache-key derivation.

use crate::types::RetrievalRequest;
use regex::Regex;

/// Tokens indicating a failure-shaped query.
pub const FAILURE_TOKENS: &[&str] = &["error", "issue", "problem", "fail"];

/// Tokens indicating procedural intent.
pub const PROCEDURAL_TOKENS: &[&str] = &["how", "steps", "procedure", "fix"];

/// Tokens indicating connectivity symptoms.
pub const CONNECTIVITY_TOKENS: &[&str] = &[
    "connection",
    "connect",
    "network",
    "unreachable",
    "refused",
    "dns",
    "timeout",
    "latency",
];

/// Tokens indicating a documentation/troubleshooting-guide query.
pub const DOCUMENTATION_TOKENS: &[&str] = &[
    "troubleshoot",
    "documentation",
    "docs",
    "guide",
    "runbook",
    "explain",
];

/// Lowercase, collapse whitespace, trim.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let re = Regex::new(r"\s+").unwrap();
    re.replace_all(lowered.trim(), " ").to_string()
}

/// Alphanumeric tokens of the normalized text.
pub fn tokens(text: &str) -> Vec<String> {
    normalize(text)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// True when any query token matches a vocabulary word.
///
/// Words of four or more characters match as prefixes, so `fail` covers
/// `failed` and `failure`; shorter words require an exact token.
pub fn has_any_token(query: &str, vocab: &[&str]) -> bool {
    let tokens = tokens(query);
    vocab.iter().any(|word| {
        tokens
            .iter()
            .any(|t| t == word || (word.len() >= 4 && t.starts_with(word)))
    })
}

/// Stable cache key over the normalized request.
///
/// The key covers every field that changes the computed response: the
/// sanitized query, sorted lowercased context, enabled sources, result limit,
/// threshold, recency flag, caller weights, and the canonicalized filter map.
pub fn cache_key(request: &RetrievalRequest, sanitized_query: &str) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(8);

    parts.push(format!("q={}", normalize(sanitized_query)));

    let mut context: Vec<String> = request.context.iter().map(|c| normalize(c)).collect();
    context.sort();
    parts.push(format!("ctx={}", context.join("\u{1f}")));

    let mut sources: Vec<&str> = request.enabled_sources.iter().map(|s| s.as_str()).collect();
    sources.sort_unstable();
    sources.dedup();
    parts.push(format!("src={}", sources.join(",")));

    parts.push(format!("n={}", request.max_results));
    parts.push(format!("t={:.4}", request.semantic_similarity_threshold));
    parts.push(format!("r={}", request.include_recency_bias));

    let mut weights: Vec<String> = request
        .source_weights
        .iter()
        .map(|(source, weight)| format!("{}:{:.4}", source, weight))
        .collect();
    weights.sort();
    parts.push(format!("w={}", weights.join(",")));

    let mut filters: Vec<String> = request
        .filters
        .iter()
        .map(|(key, value)| format!("{}={}", key.trim().to_lowercase(), value.trim()))
        .collect();
    filters.sort();
    parts.push(format!("f={}", filters.join(",")));

    blake3::hash(parts.join("\u{1e}").as_bytes()).to_hex().to_string()
}
