// Selection Engine
// Scores generated texts and picks one candidate per strategy

use super::metrics::MetricsEngine;
use crate::models::{Candidate, GeneratedText, Strategy};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

/// Attach fingerprints to generated texts. Exact duplicates keep their first occurrence.
pub fn score_candidates(metrics: &MetricsEngine, texts: Vec<GeneratedText>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    texts
        .into_iter()
        .filter(|g| seen.insert(g.text.clone()))
        .map(|g| {
            let fingerprint = metrics.fingerprint(&g.text);
            Candidate {
                composite_score: fingerprint.composite_score,
                fingerprint: Arc::clone(&fingerprint),
                text: g.text,
                backend_id: g.backend_id,
            }
        })
        .collect()
}

/// Position of a back end in the priority list. Derived ids (`glm+style`) rank with their origin;
/// synthesized and unknown ids rank last.
pub fn priority_of(backend_id: &str, priority: &[String]) -> usize {
    let origin = backend_id.split('+').next().unwrap_or(backend_id);
    priority
        .iter()
        .position(|id| id == origin)
        .unwrap_or(usize::MAX)
}

/// Composite descending, then repetition ascending, then back-end priority ascending
fn rank(a: &Candidate, b: &Candidate, priority: &[String]) -> Ordering {
    b.composite_score
        .total_cmp(&a.composite_score)
        .then_with(|| {
            a.fingerprint
                .repetition
                .repetition_score
                .total_cmp(&b.fingerprint.repetition.repetition_score)
        })
        .then_with(|| priority_of(&a.backend_id, priority).cmp(&priority_of(&b.backend_id, priority)))
}

pub fn select_best<'a>(candidates: &'a [Candidate], priority: &[String]) -> Option<&'a Candidate> {
    candidates.iter().min_by(|a, b| rank(a, b, priority))
}

/// Highest type-token ratio among candidates within `tolerance` of the best score
pub fn select_diverse<'a>(candidates: &'a [Candidate], priority: &[String], tolerance: f64) -> Option<&'a Candidate> {
    let best = select_best(candidates, priority)?;
    let floor = best.composite_score - tolerance;

    candidates
        .iter()
        .filter(|c| c.composite_score >= floor)
        .min_by(|a, b| {
            b.fingerprint
                .stylometry
                .type_token_ratio
                .total_cmp(&a.fingerprint.stylometry.type_token_ratio)
                .then_with(|| rank(a, b, priority))
        })
}

/// Pick one candidate per strategy. Mixed candidates arrive already synthesized and
/// are re-scored like any other set.
pub fn select<'a>(
    candidates: &'a [Candidate],
    strategy: Strategy,
    priority: &[String],
    diverse_tolerance: f64,
) -> Option<&'a Candidate> {
    match strategy {
        Strategy::Diverse => select_diverse(candidates, priority, diverse_tolerance),
        Strategy::Weighted
        | Strategy::Best
        | Strategy::Mixed
        | Strategy::Cascade
        | Strategy::StyleTransfer
        | Strategy::Adaptive => select_best(candidates, priority),
    }
}

/// Confidence in [0, 1]; downgraded when fewer candidates than the floor survived
pub fn confidence(candidate_count: usize, floor: usize) -> f64 {
    if floor == 0 || candidate_count >= floor {
        return 1.0;
    }
    warn!(
        "[SELECTION] only {} candidate(s), below diversity floor {}; confidence downgraded",
        candidate_count, floor
    );
    candidate_count as f64 / floor as f64
}
