// HumanizeAI Data Models
// Shared request/response and fingerprint types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ============ Text Profile ============

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextCategory {
    Academic,
    Casual,
    Professional,
    Creative,
}

impl TextCategory {
    pub const ALL: [TextCategory; 4] = [
        TextCategory::Academic,
        TextCategory::Casual,
        TextCategory::Professional,
        TextCategory::Creative,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TextCategory::Academic => "academic",
            TextCategory::Casual => "casual",
            TextCategory::Professional => "professional",
            TextCategory::Creative => "creative",
        }
    }
}

/// Analysis snapshot used for strategy decisions. Lives for one orchestration call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextProfile {
    pub word_count: usize,
    pub avg_word_length: f64,
    pub sentence_count: usize,
    pub avg_sentence_length: f64,
    pub vocabulary_diversity: f64,
    pub category: TextCategory,
}

// ============ Fingerprint ============

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StylometricFeatures {
    pub avg_word_length: f64,
    pub avg_sentence_length: f64,
    pub lexical_density: f64,
    pub function_word_ratio: f64,
    pub punctuation_diversity: f64,
    pub type_token_ratio: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepetitionPatterns {
    pub bigram_repeats: usize,
    pub trigram_repeats: usize,
    pub fourgram_repeats: usize,
    pub repeated_sentence_starts: usize,
    pub overused_words: usize,
    pub repetition_score: f64,
}

/// Ordered resistance label: LOW < MEDIUM < MEDIUM-HIGH < HIGH < VERY HIGH.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum ResistanceLevel {
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "MEDIUM-HIGH")]
    MediumHigh,
    #[serde(rename = "HIGH")]
    High,
    #[serde(rename = "VERY HIGH")]
    VeryHigh,
}

impl ResistanceLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ResistanceLevel::Low => "LOW",
            ResistanceLevel::Medium => "MEDIUM",
            ResistanceLevel::MediumHigh => "MEDIUM-HIGH",
            ResistanceLevel::High => "HIGH",
            ResistanceLevel::VeryHigh => "VERY HIGH",
        }
    }
}

impl fmt::Display for ResistanceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistical profile of one text. Built by the metrics engine and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextFingerprint {
    pub word_count: usize,
    pub sentence_count: usize,
    /// Oracle perplexity before calibration. `None` when the entropy fallback was used.
    pub raw_perplexity: Option<f64>,
    pub perplexity: f64,
    pub burstiness: f64,
    pub bigram_entropy: f64,
    pub trigram_entropy: f64,
    pub fourgram_entropy: f64,
    pub pos_entropy: f64,
    pub semantic_coherence: f64,
    pub stylometry: StylometricFeatures,
    pub repetition: RepetitionPatterns,
    pub composite_score: f64,
    pub detection_resistance: ResistanceLevel,
    /// Metrics that could not be computed and carry the sentinel value instead.
    #[serde(default)]
    pub undefined_metrics: Vec<String>,
}

// ============ Strategy & Generation ============

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Weighted,
    Diverse,
    Mixed,
    Best,
    Cascade,
    StyleTransfer,
    Adaptive,
}

impl Strategy {
    /// Strategies a plan may resolve to (everything except `Adaptive`).
    pub const RESOLVED: [Strategy; 6] = [
        Strategy::Weighted,
        Strategy::Diverse,
        Strategy::Mixed,
        Strategy::Best,
        Strategy::Cascade,
        Strategy::StyleTransfer,
    ];

    pub fn from_str(val: &str) -> Option<Self> {
        match val.trim().to_lowercase().replace('-', "_").as_str() {
            "weighted" => Some(Self::Weighted),
            "diverse" => Some(Self::Diverse),
            "mixed" => Some(Self::Mixed),
            "best" => Some(Self::Best),
            "cascade" => Some(Self::Cascade),
            "style_transfer" | "style" => Some(Self::StyleTransfer),
            "adaptive" | "" => Some(Self::Adaptive),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Weighted => "weighted",
            Strategy::Diverse => "diverse",
            Strategy::Mixed => "mixed",
            Strategy::Best => "best",
            Strategy::Cascade => "cascade",
            Strategy::StyleTransfer => "style_transfer",
            Strategy::Adaptive => "adaptive",
        }
    }
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Adaptive
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Standard,
    Ultra,
}

impl Mode {
    pub fn from_str(val: &str) -> Option<Self> {
        match val.trim().to_lowercase().as_str() {
            "standard" => Some(Self::Standard),
            "ultra" => Some(Self::Ultra),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParams {
    pub temperature: f64,
    pub top_k: u32,
    pub top_p: f64,
    pub num_sequences: usize,
}

/// Sentence length band a style template steers towards.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentenceLength {
    Short,
    Medium,
    Long,
    Varied,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleTemplate {
    pub category: TextCategory,
    pub formality: f64,
    pub sentence_length: SentenceLength,
    pub complexity: String,
    pub instruction: String,
    pub temperature_bias: f64,
}

/// Built fresh for each back-end invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub source_text: String,
    pub backend_id: String,
    pub params: GenerationParams,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<StyleTemplate>,
}

/// Resolved output of the strategy selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyPlan {
    pub requested: Strategy,
    pub strategy: Strategy,
    pub params: GenerationParams,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<TextCategory>,
    pub rule: String,
}

/// Pipeline output before scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedText {
    pub text: String,
    pub backend_id: String,
    /// Cascade stage (0-based) that produced the text, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub text: String,
    pub backend_id: String,
    pub fingerprint: Arc<TextFingerprint>,
    pub composite_score: f64,
}

// ============ Refinement ============

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TargetMet,
    BudgetExhausted,
    Stalled,
    Regressed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationTrace {
    pub iteration: u32,
    pub strategy: Strategy,
    pub rule: String,
    pub source_score: f64,
    pub candidate_score: f64,
    pub best_score: f64,
    pub accepted: bool,
    pub candidate_count: usize,
    #[serde(default)]
    pub failed_backends: Vec<String>,
    pub confidence: f64,
    pub elapsed_ms: u128,
}

// ============ Entry Points ============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HumanizeRequest {
    pub text: String,
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default = "default_max_variations")]
    pub max_variations: usize,
}

fn default_max_variations() -> usize {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HumanizeResponse {
    pub request_id: String,
    pub text: String,
    pub fingerprint: Arc<TextFingerprint>,
    pub original_fingerprint: Arc<TextFingerprint>,
    pub strategy_used: Strategy,
    pub mode: Mode,
    pub iterations: u32,
    pub stop_reason: StopReason,
    pub confidence: f64,
    pub per_iteration_trace: Vec<IterationTrace>,
    pub processing_ms: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub profile: TextProfile,
    pub fingerprint: Arc<TextFingerprint>,
    pub recommendations: Vec<String>,
    pub suggested_strategy: Strategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDelta {
    pub metric: String,
    pub original: f64,
    pub rewritten: f64,
    pub delta: f64,
    /// Relative change in percent, 0 when the original value was 0.
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonReport {
    pub original: Arc<TextFingerprint>,
    pub rewritten: Arc<TextFingerprint>,
    pub deltas: Vec<MetricDelta>,
    pub improved: bool,
}

/// One entry of a batch run; exactly one of `response` and `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<HumanizeResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_and_mode_parse() {
        for s in Strategy::RESOLVED {
            assert_eq!(Strategy::from_str(s.as_str()), Some(s));
        }
        assert_eq!(Strategy::from_str("style-transfer"), Some(Strategy::StyleTransfer));
        assert_eq!(Strategy::from_str("nonsense"), None);
        assert_eq!(Mode::from_str(" Ultra "), Some(Mode::Ultra));
        assert_eq!(Mode::from_str("standard"), Some(Mode::Standard));
        assert_eq!(Mode::from_str("ulta"), None);
    }

    #[test]
    fn test_resistance_order_and_labels() {
        assert!(ResistanceLevel::Low < ResistanceLevel::Medium);
        assert!(ResistanceLevel::High < ResistanceLevel::VeryHigh);
        let json = serde_json::to_string(&ResistanceLevel::MediumHigh).unwrap();
        assert_eq!(json, "\"MEDIUM-HIGH\"");
    }

    #[test]
    fn test_humanize_request_defaults() {
        let req: HumanizeRequest = serde_json::from_str(r#"{"text":"hello"}"#).unwrap();
        assert_eq!(req.strategy, Strategy::Adaptive);
        assert_eq!(req.mode, Mode::Standard);
        assert_eq!(req.max_variations, 3);
    }
}
