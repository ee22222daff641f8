// Comparison
// Per-metric deltas between an original text and its rewrite

use crate::models::{ComparisonReport, MetricDelta, TextFingerprint};
use std::sync::Arc;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn delta(metric: &str, original: f64, rewritten: f64) -> MetricDelta {
    let diff = rewritten - original;
    let percent = if original.abs() > f64::EPSILON { diff / original.abs() * 100.0 } else { 0.0 };
    MetricDelta {
        metric: metric.to_string(),
        original: round2(original),
        rewritten: round2(rewritten),
        delta: round2(diff),
        percent: round2(percent),
    }
}

/// Metrics reported by `compare`, in output order
fn tracked(fp: &TextFingerprint) -> [(&'static str, f64); 10] {
    [
        ("composite_score", fp.composite_score),
        ("perplexity", fp.perplexity),
        ("burstiness", fp.burstiness),
        ("bigram_entropy", fp.bigram_entropy),
        ("trigram_entropy", fp.trigram_entropy),
        ("fourgram_entropy", fp.fourgram_entropy),
        ("pos_entropy", fp.pos_entropy),
        ("semantic_coherence", fp.semantic_coherence),
        ("repetition_score", fp.repetition.repetition_score),
        ("type_token_ratio", fp.stylometry.type_token_ratio),
    ]
}

pub fn compare(original: Arc<TextFingerprint>, rewritten: Arc<TextFingerprint>) -> ComparisonReport {
    let deltas = tracked(&original)
        .into_iter()
        .zip(tracked(&rewritten))
        .map(|((metric, before), (_, after))| delta(metric, before, after))
        .collect();

    ComparisonReport {
        improved: rewritten.composite_score > original.composite_score,
        original,
        rewritten,
        deltas,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RepetitionPatterns, ResistanceLevel, StylometricFeatures};

    fn fingerprint(score: f64, perplexity: f64) -> Arc<TextFingerprint> {
        Arc::new(TextFingerprint {
            word_count: 50,
            sentence_count: 4,
            raw_perplexity: None,
            perplexity,
            burstiness: 30.0,
            bigram_entropy: 0.0,
            trigram_entropy: 0.0,
            fourgram_entropy: 0.0,
            pos_entropy: 0.0,
            semantic_coherence: 0.0,
            stylometry: StylometricFeatures::default(),
            repetition: RepetitionPatterns::default(),
            composite_score: score,
            detection_resistance: ResistanceLevel::Low,
            undefined_metrics: Vec::new(),
        })
    }

    #[test]
    fn test_deltas_and_percent() {
        let report = compare(fingerprint(50.0, 40.0), fingerprint(75.0, 30.0));
        assert!(report.improved);

        let composite = &report.deltas[0];
        assert_eq!(composite.metric, "composite_score");
        assert_eq!(composite.delta, 25.0);
        assert_eq!(composite.percent, 50.0);

        let perplexity = &report.deltas[1];
        assert_eq!(perplexity.delta, -10.0);
        assert_eq!(perplexity.percent, -25.0);
    }

    #[test]
    fn test_zero_original_gives_zero_percent() {
        let report = compare(fingerprint(60.0, 0.0), fingerprint(55.0, 20.0));
        assert!(!report.improved);
        assert_eq!(report.deltas[1].percent, 0.0);
        assert_eq!(report.deltas[1].delta, 20.0);
    }
}
