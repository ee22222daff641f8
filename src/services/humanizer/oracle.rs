// Perplexity Oracle
// Language-model surprise measure behind a trait, plus the local entropy estimators

use super::error::OracleError;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Scores raw perplexity for a text. Constructed once per process and shared read-only.
pub trait PerplexityOracle: Send + Sync {
    fn name(&self) -> &str;

    fn score(&self, text: &str) -> Result<f64, OracleError>;
}

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z0-9_']+").expect("token regex"))
}

/// Unigram-entropy perplexity estimator. Returns raw perplexity in [20, 300].
#[derive(Debug, Default, Clone)]
pub struct LocalEntropyOracle;

impl LocalEntropyOracle {
    pub fn new() -> Self {
        Self
    }

    pub fn estimate(text: &str) -> Option<f64> {
        let tokens: Vec<String> = token_regex()
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .collect();
        if tokens.is_empty() {
            return None;
        }

        let mut freq: HashMap<&str, usize> = HashMap::new();
        for t in &tokens {
            *freq.entry(t.as_str()).or_insert(0) += 1;
        }

        let total = tokens.len() as f64;
        let entropy = -freq
            .values()
            .map(|&c| {
                let p = c as f64 / total;
                p * (p + 1e-12).ln()
            })
            .sum::<f64>();

        let ppl_uni = entropy.exp();
        let ppl_scaled = 20.0 + ((ppl_uni - 1.0) * 22.5).min(280.0);
        let diversity = freq.len() as f64 / total.max(1.0);
        let base = 120.0 - diversity * 60.0 + (text.chars().count() as f64) / 500.0;
        let val = (0.5 * ppl_scaled + 0.5 * base).clamp(20.0, 300.0);
        Some((val * 100.0).round() / 100.0)
    }
}

impl PerplexityOracle for LocalEntropyOracle {
    fn name(&self) -> &str {
        "local-entropy"
    }

    fn score(&self, text: &str) -> Result<f64, OracleError> {
        Self::estimate(text).ok_or_else(|| OracleError::Unscorable("no word tokens".to_string()))
    }
}

/// Map raw perplexity onto 0-100
pub fn calibrate_perplexity(raw: f64) -> f64 {
    ((raw - 10.0) / 190.0 * 100.0).clamp(0.0, 100.0)
}

fn shannon_bits<I: IntoIterator<Item = usize>>(counts: I, total: f64) -> f64 {
    counts
        .into_iter()
        .map(|c| {
            let p = c as f64 / total;
            if p > 0.0 {
                -p * p.log2()
            } else {
                0.0
            }
        })
        .sum()
}

/// Entropy-based perplexity on the 0-100 scale, used when the oracle is unavailable
/// and for pipeline quick scores. `None` with fewer than two words.
pub fn entropy_perplexity_score(text: &str) -> Option<f64> {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered.split_whitespace().collect();
    if words.len() < 2 {
        return None;
    }

    let mut word_freq: HashMap<&str, usize> = HashMap::new();
    for w in &words {
        *word_freq.entry(*w).or_insert(0) += 1;
    }
    let word_entropy = shannon_bits(word_freq.into_values(), words.len() as f64);

    let mut char_freq: HashMap<char, usize> = HashMap::new();
    let mut total_chars = 0usize;
    for c in lowered.chars() {
        *char_freq.entry(c).or_insert(0) += 1;
        total_chars += 1;
    }
    let char_entropy = shannon_bits(char_freq.into_values(), total_chars as f64);

    let combined = word_entropy * 0.7 + char_entropy * 0.3;
    let max_entropy = (words.len() as f64).log2();
    if max_entropy <= 0.0 {
        return None;
    }
    Some((combined / max_entropy * 100.0).clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_oracle_range() {
        let oracle = LocalEntropyOracle::new();
        let ppl = oracle.score("The quick brown fox jumps over the lazy dog.").unwrap();
        assert!((20.0..=300.0).contains(&ppl));
        assert!(oracle.score("   ...   ").is_err());
    }

    #[test]
    fn test_calibration_curve() {
        assert_eq!(calibrate_perplexity(10.0), 0.0);
        assert_eq!(calibrate_perplexity(200.0), 100.0);
        assert!((calibrate_perplexity(105.0) - 50.0).abs() < 1e-9);
        assert_eq!(calibrate_perplexity(1000.0), 100.0);
    }

    #[test]
    fn test_entropy_perplexity_bounds() {
        assert_eq!(entropy_perplexity_score("word"), None);
        let score = entropy_perplexity_score("one two three four five six").unwrap();
        assert!((0.0..=100.0).contains(&score));
    }
}
