//! Hybrid ranking: weight fusion, recency bias, rank assignment.
//!
//! Fusion multiplies each candidate's score by its adapter self-weight and
//! the caller-supplied per-source weight, then adds the adapter-computed
//! recency boost. The optional recency bias is a separate multiplicative
//! pass bucketed by evidence age. Sorting is stable, so equal scores keep
//! adapter emission order and the whole pipeline is deterministic for a
//! fixed "now".

use crate::types::{Evidence, SourceType};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Inputs to one ranking pass.
#[derive(Debug, Clone)]
pub struct RankingContext {
    /// Per-source self-weights from `SourceAdapter::score_weight`.
    pub adapter_weights: HashMap<SourceType, f32>,
    /// Caller-supplied overrides; absent sources default to 1.0.
    pub caller_weights: HashMap<SourceType, f32>,
    pub include_recency_bias: bool,
    pub now: DateTime<Utc>,
}

impl RankingContext {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            adapter_weights: HashMap::new(),
            caller_weights: HashMap::new(),
            include_recency_bias: false,
            now,
        }
    }
}

/// Multiplicative age factor applied when recency bias is requested.
pub fn recency_factor(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
    let days = (now - timestamp).num_days();
    if days <= 7 {
        1.2
    } else if days <= 30 {
        1.1
    } else if days <= 90 {
        1.0
    } else {
        0.9
    }
}

/// Additive boost from document age, in three buckets.
pub fn document_age_boost(updated_at: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
    let days = (now - updated_at).num_days();
    if days < 30 {
        0.2
    } else if days < 90 {
        0.1
    } else {
        0.0
    }
}

/// Fuse candidate scores and sort descending.
pub fn fuse(mut candidates: Vec<Evidence>, ctx: &RankingContext) -> Vec<Evidence> {
    for evidence in &mut candidates {
        let adapter_weight = ctx
            .adapter_weights
            .get(&evidence.source_type)
            .copied()
            .unwrap_or(1.0);
        let caller_weight = ctx
            .caller_weights
            .get(&evidence.source_type)
            .copied()
            .unwrap_or(1.0);
        evidence.score = evidence.score * adapter_weight * caller_weight + evidence.recency_boost;
    }
    sort_by_score(&mut candidates);

    if ctx.include_recency_bias {
        for evidence in &mut candidates {
            evidence.score *= recency_factor(evidence.timestamp, ctx.now);
        }
        sort_by_score(&mut candidates);
    }

    candidates
}

/// Assign 1-based ranks matching the current order.
pub fn assign_ranks(evidence: &mut [Evidence]) {
    for (index, item) in evidence.iter_mut().enumerate() {
        item.rank = Some(index + 1);
    }
}

fn sort_by_score(evidence: &mut [Evidence]) {
    evidence.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Duration;
    use proptest::prelude::*;

    fn evidence(source: &str, source_type: SourceType, score: f32) -> Evidence {
        Evidence::new(source, source_type, "snippet", score)
    }

    #[test]
    fn test_fusion_applies_both_weights_and_boost() {
        let mut ctx = RankingContext::new(Utc::now());
        ctx.adapter_weights.insert(SourceType::Document, 1.3);
        ctx.caller_weights.insert(SourceType::Document, 0.5);

        let candidate =
            evidence("document:d1", SourceType::Document, 0.6).with_recency_boost(0.2);
        let fused = fuse(vec![candidate], &ctx);

        assert_relative_eq!(fused[0].score, 0.6 * 1.3 * 0.5 + 0.2, epsilon = 1e-6);
    }

    #[test]
    fn test_missing_weights_default_to_one() {
        let ctx = RankingContext::new(Utc::now());
        let fused = fuse(vec![evidence("pattern:p1", SourceType::Pattern, 0.4)], &ctx);
        assert_relative_eq!(fused[0].score, 0.4, epsilon = 1e-6);
    }

    #[test]
    fn test_sort_is_descending_and_ties_keep_emission_order() {
        let ctx = RankingContext::new(Utc::now());
        let fused = fuse(
            vec![
                evidence("document:a", SourceType::Document, 0.5),
                evidence("pattern:b", SourceType::Pattern, 0.9),
                evidence("document:c", SourceType::Document, 0.5),
            ],
            &ctx,
        );

        assert_eq!(fused[0].source, "pattern:b");
        // Stable sort: the two 0.5 candidates keep their original order.
        assert_eq!(fused[1].source, "document:a");
        assert_eq!(fused[2].source, "document:c");
    }

    #[test]
    fn test_recency_factor_buckets() {
        let now = Utc::now();
        assert_relative_eq!(recency_factor(now - Duration::days(3), now), 1.2);
        assert_relative_eq!(recency_factor(now - Duration::days(20), now), 1.1);
        assert_relative_eq!(recency_factor(now - Duration::days(60), now), 1.0);
        assert_relative_eq!(recency_factor(now - Duration::days(180), now), 0.9);
    }

    #[test]
    fn test_document_age_boost_buckets() {
        let now = Utc::now();
        assert_relative_eq!(document_age_boost(now - Duration::days(10), now), 0.2);
        assert_relative_eq!(document_age_boost(now - Duration::days(45), now), 0.1);
        assert_relative_eq!(document_age_boost(now - Duration::days(200), now), 0.0);
    }

    #[test]
    fn test_recency_bias_can_reorder() {
        let now = Utc::now();
        let mut ctx = RankingContext::new(now);
        ctx.include_recency_bias = true;

        let stale = evidence("document:old", SourceType::Document, 0.55)
            .with_timestamp(now - Duration::days(200));
        let fresh = evidence("pattern:new", SourceType::Pattern, 0.52).with_timestamp(now);

        let fused = fuse(vec![stale, fresh], &ctx);

        // 0.52 * 1.2 = 0.624 beats 0.55 * 0.9 = 0.495.
        assert_eq!(fused[0].source, "pattern:new");
    }

    #[test]
    fn test_ranking_is_deterministic_for_fixed_now() {
        let now = Utc::now();
        let mut ctx = RankingContext::new(now);
        ctx.include_recency_bias = true;
        ctx.adapter_weights.insert(SourceType::Pattern, 1.3);

        let candidates = vec![
            evidence("pattern:p1", SourceType::Pattern, 0.3).with_timestamp(now),
            evidence("document:d1", SourceType::Document, 0.4)
                .with_timestamp(now - Duration::days(40)),
            evidence("playbook:b1", SourceType::Playbook, 0.35).with_timestamp(now),
        ];

        let first: Vec<String> =
            fuse(candidates.clone(), &ctx).into_iter().map(|e| e.source).collect();
        let second: Vec<String> =
            fuse(candidates, &ctx).into_iter().map(|e| e.source).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_assign_ranks_is_dense() {
        let mut items = vec![
            evidence("document:a", SourceType::Document, 0.9),
            evidence("document:b", SourceType::Document, 0.5),
        ];
        assign_ranks(&mut items);
        assert_eq!(items[0].rank, Some(1));
        assert_eq!(items[1].rank, Some(2));
    }

    proptest! {
        #[test]
        fn prop_ranks_are_dense_and_order_is_descending(
            scores in proptest::collection::vec(0.0f32..1.0, 0..32)
        ) {
            let candidates: Vec<Evidence> = scores
                .iter()
                .enumerate()
                .map(|(i, score)| evidence(&format!("document:{i}"), SourceType::Document, *score))
                .collect();

            let ctx = RankingContext::new(Utc::now());
            let mut fused = fuse(candidates, &ctx);
            assign_ranks(&mut fused);

            for i in 0..fused.len() {
                prop_assert_eq!(fused[i].rank, Some(i + 1));
                if i > 0 {
                    prop_assert!(fused[i - 1].score >= fused[i].score);
                }
            }
        }
    }
}
