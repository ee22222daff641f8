// Recommendations
// Plain-language tips derived from a profile and fingerprint

use crate::models::{TextFingerprint, TextProfile};

struct Tip {
    applies: fn(&TextProfile, &TextFingerprint) -> bool,
    message: &'static str,
}

const TIPS: &[Tip] = &[
    Tip {
        applies: |p, _| p.vocabulary_diversity < 0.5,
        message: "Increase vocabulary diversity: use more varied words and synonyms",
    },
    Tip {
        applies: |p, _| p.avg_sentence_length > 25.0,
        message: "Sentences are too long: break them into shorter ones",
    },
    Tip {
        applies: |_, f| f.perplexity < 40.0 && !is_undefined(f, "perplexity"),
        message: "Text is too predictable: add less obvious word choices",
    },
    Tip {
        applies: |_, f| f.burstiness < 40.0 && !is_undefined(f, "burstiness"),
        message: "Burstiness is low: vary sentence lengths more sharply",
    },
    Tip {
        applies: |_, f| f.repetition.repetition_score > 50.0,
        message: "Too much repetition: vary phrasing and sentence openings",
    },
    Tip {
        applies: |_, f| f.pos_entropy < 50.0 && !is_undefined(f, "pos_entropy"),
        message: "Grammatical structure is uniform: mix clause types and sentence shapes",
    },
];

fn is_undefined(fingerprint: &TextFingerprint, metric: &str) -> bool {
    fingerprint.undefined_metrics.iter().any(|m| m == metric)
}

/// Tips in table order. Metrics carrying the sentinel never trigger a tip.
pub fn recommendations(profile: &TextProfile, fingerprint: &TextFingerprint) -> Vec<String> {
    TIPS.iter()
        .filter(|tip| (tip.applies)(profile, fingerprint))
        .map(|tip| tip.message.to_string())
        .collect()
}
