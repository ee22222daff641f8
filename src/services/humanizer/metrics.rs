// Metrics Engine
// Statistical fingerprint of a text and its composite human-likeness score

use super::cache::{CacheStats, FingerprintCache};
use super::oracle::{calibrate_perplexity, entropy_perplexity_score, PerplexityOracle};
use super::pos_tagger::{pos_entropy, tag_text};
use crate::models::{RepetitionPatterns, ResistanceLevel, StylometricFeatures, TextFingerprint};
use crate::services::config_store::{CompositeWeights, HumanizerConfig, ResistanceThresholds};
use crate::services::text_processor::{split_sentences, word_tokens};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

const FUNCTION_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "should", "could", "may", "might", "must", "can",
    "of", "to", "in", "for", "on", "with", "at", "by", "from", "and", "but", "or", "so", "yet",
    "nor", "that", "which", "who", "whom", "whose", "this", "these", "those",
];

const CLAUSE_MARKERS: &[&str] = &["because", "although", "while", "which", "whereas", "though", "since"];

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Population standard deviation
fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Sentence-length dispersion on 0-100. `None` with fewer than two sentences.
pub fn burstiness(sentences: &[String]) -> Option<f64> {
    if sentences.len() < 2 {
        return None;
    }

    let word_lengths: Vec<f64> = sentences
        .iter()
        .map(|s| s.split_whitespace().count() as f64)
        .collect();
    let char_lengths: Vec<f64> = sentences.iter().map(|s| s.chars().count() as f64).collect();

    let word_mean = mean(&word_lengths);
    let char_mean = mean(&char_lengths);
    if word_mean <= 0.0 {
        return None;
    }

    let word_std = std_dev(&word_lengths);
    let word_cv = word_std / word_mean;
    let char_cv = if char_mean > 0.0 { std_dev(&char_lengths) / char_mean } else { 0.0 };

    let max = word_lengths.iter().cloned().fold(f64::MIN, f64::max);
    let min = word_lengths.iter().cloned().fold(f64::MAX, f64::min);
    let range = (max - min) / word_mean;

    let skewness = if word_lengths.len() > 3 {
        let third = word_lengths.iter().map(|l| (l - word_mean).powi(3)).sum::<f64>()
            / word_lengths.len() as f64;
        third / (word_std.powi(3) + 1e-8)
    } else {
        0.0
    };

    let raw = word_cv * 0.4 + char_cv * 0.25 + range * 0.2 + skewness.abs() * 0.15;
    Some((raw / 1.2 * 100.0).min(100.0))
}

/// Normalized Shannon entropy of the order-`n` n-gram distribution.
/// `None` with fewer than `n + 1` tokens.
pub fn ngram_entropy(tokens: &[String], n: usize) -> Option<f64> {
    if n == 0 || tokens.len() < n + 1 {
        return None;
    }

    let mut freq: HashMap<&[String], usize> = HashMap::new();
    for window in tokens.windows(n) {
        *freq.entry(window).or_insert(0) += 1;
    }

    let total = (tokens.len() - n + 1) as f64;
    let entropy: f64 = freq
        .values()
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.log2()
        })
        .sum();

    let max_entropy = total.log2();
    if max_entropy <= 0.0 {
        return None;
    }
    Some((entropy / max_entropy * 100.0).clamp(0.0, 100.0))
}

/// Inverted adjacent-sentence overlap. `None` when fewer than two sentences have more than three words.
pub fn semantic_coherence(sentences: &[String]) -> Option<f64> {
    let word_sets: Vec<HashSet<String>> = sentences
        .iter()
        .filter(|s| s.split_whitespace().count() > 3)
        .map(|s| word_tokens(s).into_iter().collect())
        .collect();

    if word_sets.len() < 2 {
        return None;
    }

    let overlaps: Vec<f64> = word_sets
        .windows(2)
        .filter(|pair| !pair[0].is_empty() && !pair[1].is_empty())
        .map(|pair| {
            let inter = pair[0].intersection(&pair[1]).count() as f64;
            let union = pair[0].union(&pair[1]).count() as f64;
            inter / union
        })
        .collect();

    if overlaps.is_empty() {
        return None;
    }

    let score = (1.0 - mean(&overlaps)) * 50.0 + std_dev(&overlaps) * 50.0;
    Some(score.clamp(0.0, 100.0))
}

pub fn stylometric_features(text: &str, sentence_count: usize) -> StylometricFeatures {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() || sentence_count == 0 {
        return StylometricFeatures::default();
    }

    let total = words.len() as f64;
    let avg_word_length = words.iter().map(|w| w.chars().count() as f64).sum::<f64>() / total;
    let lowered: Vec<String> = words.iter().map(|w| w.to_lowercase()).collect();
    let unique = lowered.iter().collect::<HashSet<_>>().len() as f64;

    let function_count = lowered
        .iter()
        .filter(|w| FUNCTION_WORDS.contains(&w.trim_matches(|c: char| !c.is_alphanumeric())))
        .count() as f64;
    let function_word_ratio = function_count / total;

    let punctuation: Vec<char> = text.chars().filter(|c| ".,!?;:".contains(*c)).collect();
    let punctuation_diversity = if punctuation.is_empty() {
        0.0
    } else {
        punctuation.iter().collect::<HashSet<_>>().len() as f64 / punctuation.len() as f64
    };

    StylometricFeatures {
        avg_word_length,
        avg_sentence_length: total / sentence_count as f64,
        lexical_density: 1.0 - function_word_ratio,
        function_word_ratio,
        punctuation_diversity,
        type_token_ratio: unique / total,
    }
}

fn repeated_ngram_types(tokens: &[String], n: usize) -> usize {
    if tokens.len() < n {
        return 0;
    }
    let mut freq: HashMap<&[String], usize> = HashMap::new();
    for window in tokens.windows(n) {
        *freq.entry(window).or_insert(0) += 1;
    }
    freq.values().filter(|&&c| c > 1).count()
}

pub fn repetition_patterns(tokens: &[String], sentences: &[String]) -> RepetitionPatterns {
    let bigram_repeats = repeated_ngram_types(tokens, 2);
    let trigram_repeats = repeated_ngram_types(tokens, 3);
    let fourgram_repeats = repeated_ngram_types(tokens, 4);

    let mut starts: HashMap<String, usize> = HashMap::new();
    for sentence in sentences {
        if let Some(first) = word_tokens(sentence).into_iter().next() {
            *starts.entry(first).or_insert(0) += 1;
        }
    }
    let repeated_sentence_starts = starts.values().filter(|&&c| c > 2).count();

    let mut word_freq: HashMap<&str, usize> = HashMap::new();
    for t in tokens {
        *word_freq.entry(t.as_str()).or_insert(0) += 1;
    }
    let threshold = tokens.len() as f64 * 0.05;
    let overused_words = word_freq
        .iter()
        .filter(|(w, &c)| w.chars().count() > 4 && c as f64 > threshold)
        .count();

    let total = bigram_repeats + trigram_repeats + fourgram_repeats + repeated_sentence_starts + overused_words;

    RepetitionPatterns {
        bigram_repeats,
        trigram_repeats,
        fourgram_repeats,
        repeated_sentence_starts,
        overused_words,
        repetition_score: (total as f64 * 8.0).min(100.0),
    }
}

/// Weighted sum clamped to [0, 100]. The repetition weight is credited in full and the
/// repetition score subtracts from it.
pub fn composite_score(fp: &TextFingerprint, weights: &CompositeWeights) -> f64 {
    let raw = fp.perplexity * weights.perplexity
        + fp.burstiness * weights.burstiness
        + fp.bigram_entropy * weights.bigram_entropy
        + fp.trigram_entropy * weights.trigram_entropy
        + fp.pos_entropy * weights.pos_entropy
        + fp.stylometry.type_token_ratio * 100.0 * weights.type_token_ratio
        + fp.semantic_coherence * weights.coherence
        + (100.0 - fp.repetition.repetition_score) * weights.repetition;
    round2(raw.clamp(0.0, 100.0))
}

pub fn resistance_level(score: f64, thresholds: &ResistanceThresholds) -> ResistanceLevel {
    if score >= thresholds.very_high {
        ResistanceLevel::VeryHigh
    } else if score >= thresholds.high {
        ResistanceLevel::High
    } else if score >= thresholds.medium_high {
        ResistanceLevel::MediumHigh
    } else if score >= thresholds.medium {
        ResistanceLevel::Medium
    } else {
        ResistanceLevel::Low
    }
}

/// Local desirability of one sentence for mixed recombination
pub fn sentence_quick_score(sentence: &str) -> f64 {
    let words = word_tokens(sentence);
    let count = words.len();
    if count == 0 {
        return 0.0;
    }

    let mut score = if (10..=20).contains(&count) {
        30.0
    } else if (5..=30).contains(&count) {
        20.0
    } else {
        10.0
    };

    let has_clause = sentence.contains(", ")
        || sentence.contains("; ")
        || words.iter().any(|w| CLAUSE_MARKERS.contains(&w.as_str()));
    if has_clause {
        score += 20.0;
    }
    if count < 5 {
        score -= 10.0;
    }

    let unique = words.iter().collect::<HashSet<_>>().len() as f64;
    score + unique / count as f64 * 20.0
}

enum PerplexitySource {
    Oracle,
    Local,
}

/// Computes fingerprints. Holds the shared oracle and cache; cheap to share behind `Arc`.
pub struct MetricsEngine {
    oracle: Arc<dyn PerplexityOracle>,
    cache: FingerprintCache,
    weights: CompositeWeights,
    thresholds: ResistanceThresholds,
}

impl MetricsEngine {
    pub fn new(oracle: Arc<dyn PerplexityOracle>, config: &HumanizerConfig) -> Self {
        Self {
            oracle,
            cache: FingerprintCache::new(config.cache_capacity),
            weights: config.weights.clone(),
            thresholds: config.resistance.clone(),
        }
    }

    /// Cached fingerprint of `text`. The oracle is consulted at most once per unique text,
    /// including when several requests ask for the same text at the same time.
    pub fn fingerprint(&self, text: &str) -> Arc<TextFingerprint> {
        self.cache.get_or_insert_with(text, || {
            let fingerprint = self.compute(text, PerplexitySource::Oracle);
            if !fingerprint.undefined_metrics.is_empty() {
                warn!(
                    "[METRICS] {} metric(s) undefined for {}-word text, using sentinel: {}",
                    fingerprint.undefined_metrics.len(),
                    fingerprint.word_count,
                    fingerprint.undefined_metrics.join(", ")
                );
            }
            debug!("[METRICS] fingerprinted {} chars", text.len());
            fingerprint
        })
    }

    /// Composite score using local perplexity only; bypasses the oracle and the cache
    pub fn quick_score(&self, text: &str) -> f64 {
        self.compute(text, PerplexitySource::Local).composite_score
    }

    pub fn resistance_label(&self, score: f64) -> ResistanceLevel {
        resistance_level(score, &self.thresholds)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn oracle_name(&self) -> &str {
        self.oracle.name()
    }

    fn perplexity(&self, text: &str, source: PerplexitySource) -> (Option<f64>, Option<f64>) {
        match source {
            PerplexitySource::Local => (None, entropy_perplexity_score(text)),
            PerplexitySource::Oracle => match self.oracle.score(text) {
                Ok(raw) if raw.is_finite() => (Some(raw), Some(calibrate_perplexity(raw))),
                Ok(raw) => {
                    warn!("[METRICS] oracle {} returned non-finite {}, using entropy fallback", self.oracle.name(), raw);
                    (None, entropy_perplexity_score(text))
                }
                Err(e) => {
                    warn!("[METRICS] oracle {} failed: {}, using entropy fallback", self.oracle.name(), e);
                    (None, entropy_perplexity_score(text))
                }
            },
        }
    }

    fn compute(&self, text: &str, source: PerplexitySource) -> TextFingerprint {
        let tokens = word_tokens(text);
        let sentences = split_sentences(text);
        let mut undefined = Vec::new();

        let mut defined = |name: &str, value: Option<f64>| -> f64 {
            value.unwrap_or_else(|| {
                undefined.push(name.to_string());
                0.0
            })
        };

        let (raw_perplexity, perplexity) = self.perplexity(text, source);
        let perplexity = defined("perplexity", perplexity);
        let burstiness = defined("burstiness", burstiness(&sentences));
        let bigram_entropy = defined("bigram_entropy", ngram_entropy(&tokens, 2));
        let trigram_entropy = defined("trigram_entropy", ngram_entropy(&tokens, 3));
        let fourgram_entropy = defined("fourgram_entropy", ngram_entropy(&tokens, 4));
        let pos_entropy = defined("pos_entropy", pos_entropy(&tag_text(text)));
        let semantic_coherence = defined("semantic_coherence", semantic_coherence(&sentences));

        let mut fingerprint = TextFingerprint {
            word_count: text.split_whitespace().count(),
            sentence_count: sentences.len(),
            raw_perplexity,
            perplexity: round2(perplexity),
            burstiness: round2(burstiness),
            bigram_entropy: round2(bigram_entropy),
            trigram_entropy: round2(trigram_entropy),
            fourgram_entropy: round2(fourgram_entropy),
            pos_entropy: round2(pos_entropy),
            semantic_coherence: round2(semantic_coherence),
            stylometry: stylometric_features(text, sentences.len()),
            repetition: repetition_patterns(&tokens, &sentences),
            composite_score: 0.0,
            detection_resistance: ResistanceLevel::Low,
            undefined_metrics: undefined,
        };

        fingerprint.composite_score = composite_score(&fingerprint, &self.weights);
        fingerprint.detection_resistance = self.resistance_label(fingerprint.composite_score);
        fingerprint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::humanizer::testing::CountingOracle;

    const SAMPLE: &str = "The implementation of artificial intelligence systems requires comprehensive consideration of numerous factors. Honestly, nobody agrees on which ones matter. Some teams obsess over data quality, while others chase raw speed because deadlines loom. Who is right?";

    fn engine(oracle: Arc<CountingOracle>) -> MetricsEngine {
        MetricsEngine::new(oracle, &HumanizerConfig::default())
    }

    #[test]
    fn test_score_in_range_and_label_monotone() {
        let oracle = Arc::new(CountingOracle::new(95.0));
        let engine = engine(oracle);
        let texts = [
            "",
            "Hi",
            "the the the the the the the the",
            SAMPLE,
            "Short. A much longer sentence follows here with plenty of words to vary things! Tiny?",
        ];
        for text in texts {
            let fp = engine.fingerprint(text);
            assert!((0.0..=100.0).contains(&fp.composite_score), "score out of range for {:?}", text);
            assert_eq!(fp.detection_resistance, engine.resistance_label(fp.composite_score));
        }

        let thresholds = ResistanceThresholds::default();
        let mut previous = ResistanceLevel::Low;
        for step in 0..=1000 {
            let label = resistance_level(step as f64 / 10.0, &thresholds);
            assert!(label >= previous);
            previous = label;
        }
        assert_eq!(resistance_level(85.0, &thresholds), ResistanceLevel::VeryHigh);
        assert_eq!(resistance_level(84.99, &thresholds), ResistanceLevel::High);
        assert_eq!(resistance_level(39.99, &thresholds), ResistanceLevel::Low);
    }

    #[test]
    fn test_cache_idempotent_without_second_oracle_call() {
        let oracle = Arc::new(CountingOracle::new(120.0));
        let engine = engine(oracle.clone());

        let first = engine.fingerprint(SAMPLE);
        let second = engine.fingerprint(SAMPLE);

        assert_eq!(*first, *second);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(oracle.calls(), 1);
        assert_eq!(engine.cache_stats().hits, 1);
    }

    #[test]
    fn test_concurrent_requests_share_one_oracle_call() {
        let oracle = Arc::new(CountingOracle::slow(120.0, std::time::Duration::from_millis(100)));
        let engine = Arc::new(engine(oracle.clone()));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || engine.fingerprint(SAMPLE))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(oracle.calls(), 1);
        assert!(results.iter().all(|fp| Arc::ptr_eq(fp, &results[0])));
    }

    #[test]
    fn test_quick_score_skips_oracle_and_cache() {
        let oracle = Arc::new(CountingOracle::new(120.0));
        let engine = engine(oracle.clone());
        let score = engine.quick_score(SAMPLE);
        assert!((0.0..=100.0).contains(&score));
        assert_eq!(oracle.calls(), 0);
        assert_eq!(engine.cache_stats().entries, 0);
    }

    #[test]
    fn test_short_text_gets_sentinels() {
        let oracle = Arc::new(CountingOracle::new(120.0));
        let engine = engine(oracle);
        let fp = engine.fingerprint("Tiny text");
        assert_eq!(fp.burstiness, 0.0);
        assert_eq!(fp.fourgram_entropy, 0.0);
        assert!(fp.undefined_metrics.contains(&"fourgram_entropy".to_string()));
        assert!(fp.undefined_metrics.contains(&"semantic_coherence".to_string()));
    }

    #[test]
    fn test_oracle_failure_falls_back_to_entropy() {
        let oracle = Arc::new(CountingOracle::failing());
        let engine = engine(oracle.clone());
        let fp = engine.fingerprint(SAMPLE);
        assert_eq!(fp.raw_perplexity, None);
        assert!(fp.perplexity > 0.0);
        assert_eq!(oracle.calls(), 1);
    }

    #[test]
    fn test_burstiness_rewards_variation() {
        let even: Vec<String> = vec!["aaa bbb ccc ddd.".into(), "eee fff ggg hhh.".into()];
        let uneven: Vec<String> = vec![
            "one.".into(),
            "two three four five six seven eight nine ten eleven twelve.".into(),
        ];
        assert_eq!(burstiness(&even), Some(0.0));
        assert!(burstiness(&uneven).unwrap() > 50.0);
    }

    #[test]
    fn test_repetition_detects_repeated_phrases() {
        let text = "It is what it is. It is what it is. It is what it is.";
        let tokens = word_tokens(text);
        let patterns = repetition_patterns(&tokens, &split_sentences(text));
        assert!(patterns.bigram_repeats > 0);
        assert_eq!(patterns.repeated_sentence_starts, 1);
        assert!(patterns.repetition_score > 0.0);
    }

    #[test]
    fn test_sentence_quick_score_prefers_mid_length_clauses() {
        let good = "We kept the draft short, because nobody reads the long version anyway.";
        let terse = "Yes.";
        assert!(sentence_quick_score(good) > sentence_quick_score(terse));
    }
}
