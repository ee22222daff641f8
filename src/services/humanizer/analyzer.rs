// Text Analyzer
// Coarse statistics and category classification that drive strategy selection

use super::error::HumanizeError;
use crate::models::{TextCategory, TextProfile};
use crate::services::text_processor::{split_sentences, word_tokens};
use std::collections::HashSet;

const DIVERSITY_WINDOW: usize = 100;
const MARKER_DENSITY: f64 = 0.03;

const ACADEMIC_MARKERS: &[&str] = &[
    "furthermore", "moreover", "consequently", "therefore", "thus", "hence", "nevertheless",
    "whereas", "methodology", "hypothesis", "empirical", "analysis", "significant", "research",
    "study", "findings", "literature", "theoretical",
];
const CASUAL_MARKERS: &[&str] = &[
    "like", "really", "pretty", "kinda", "gonna", "wanna", "yeah", "stuff", "basically",
    "honestly", "lol", "okay", "ok", "super", "totally", "guess",
];
const PROFESSIONAL_MARKERS: &[&str] = &[
    "stakeholder", "stakeholders", "deliverable", "deliverables", "strategy", "revenue",
    "client", "clients", "customer", "customers", "team", "project", "roadmap", "quarter",
    "objective", "objectives", "business", "market", "budget",
];

/// Inputs the category table reads
#[derive(Debug, Clone, Copy)]
struct CategorySignals {
    avg_sentence_length: f64,
    diversity: f64,
    academic: f64,
    casual: f64,
    professional: f64,
}

impl CategorySignals {
    fn dominant(&self, own: f64, others: [f64; 2]) -> bool {
        own >= MARKER_DENSITY && others.iter().all(|o| own > *o)
    }
}

struct CategoryRule {
    name: &'static str,
    applies: fn(&CategorySignals) -> bool,
    category: TextCategory,
}

/// First matching row wins; the last row always matches
const CATEGORY_TABLE: &[CategoryRule] = &[
    CategoryRule {
        name: "academic_markers",
        applies: |s| s.dominant(s.academic, [s.casual, s.professional]) && s.avg_sentence_length >= 15.0,
        category: TextCategory::Academic,
    },
    CategoryRule {
        name: "casual_markers",
        applies: |s| s.dominant(s.casual, [s.academic, s.professional]),
        category: TextCategory::Casual,
    },
    CategoryRule {
        name: "long_and_diverse",
        applies: |s| s.avg_sentence_length > 25.0 && s.diversity > 0.6,
        category: TextCategory::Academic,
    },
    CategoryRule {
        name: "short_and_repetitive",
        applies: |s| s.avg_sentence_length < 15.0 && s.diversity < 0.5,
        category: TextCategory::Casual,
    },
    CategoryRule {
        name: "professional_markers",
        applies: |s| s.dominant(s.professional, [s.academic, s.casual]),
        category: TextCategory::Professional,
    },
    CategoryRule {
        name: "long_sentences",
        applies: |s| s.avg_sentence_length > 20.0,
        category: TextCategory::Professional,
    },
    CategoryRule {
        name: "default",
        applies: |_| true,
        category: TextCategory::Creative,
    },
];

fn classify(signals: &CategorySignals) -> (TextCategory, &'static str) {
    CATEGORY_TABLE
        .iter()
        .find(|rule| (rule.applies)(signals))
        .map(|rule| (rule.category, rule.name))
        .unwrap_or((TextCategory::Creative, "default"))
}

/// Mean type-token ratio over consecutive fixed windows.
/// A trailing partial window only counts when it is the only window.
pub fn vocabulary_diversity(tokens: &[String]) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }

    let ttr = |chunk: &[String]| chunk.iter().collect::<HashSet<_>>().len() as f64 / chunk.len() as f64;

    if tokens.len() < DIVERSITY_WINDOW {
        return ttr(tokens);
    }

    let ratios: Vec<f64> = tokens.chunks_exact(DIVERSITY_WINDOW).map(ttr).collect();
    ratios.iter().sum::<f64>() / ratios.len() as f64
}

fn marker_density(tokens: &[String], markers: &[&str]) -> f64 {
    let hits = tokens
        .iter()
        .filter(|t| markers.contains(&t.as_str()))
        .count();
    hits as f64 / tokens.len().max(1) as f64
}

fn casual_density(tokens: &[String]) -> f64 {
    let contractions = tokens.iter().filter(|t| t.contains('\'')).count();
    marker_density(tokens, CASUAL_MARKERS) + contractions as f64 / tokens.len().max(1) as f64
}

/// Build a profile; fails only on input without any words
pub fn analyze_text(text: &str) -> Result<TextProfile, HumanizeError> {
    if text.trim().is_empty() {
        return Err(HumanizeError::InputError("Text is empty".to_string()));
    }

    let tokens = word_tokens(text);
    if tokens.is_empty() {
        return Err(HumanizeError::InputError("Text contains no words".to_string()));
    }

    let sentence_count = split_sentences(text).len().max(1);
    let word_count = tokens.len();
    let avg_word_length =
        tokens.iter().map(|t| t.chars().count() as f64).sum::<f64>() / word_count as f64;
    let avg_sentence_length = word_count as f64 / sentence_count as f64;
    let diversity = vocabulary_diversity(&tokens);

    let signals = CategorySignals {
        avg_sentence_length,
        diversity,
        academic: marker_density(&tokens, ACADEMIC_MARKERS),
        casual: casual_density(&tokens),
        professional: marker_density(&tokens, PROFESSIONAL_MARKERS),
    };
    let (category, _rule) = classify(&signals);

    Ok(TextProfile {
        word_count,
        avg_word_length,
        sentence_count,
        avg_sentence_length,
        vocabulary_diversity: diversity,
        category,
    })
}
