// Humanizer Engine
// Analysis, strategy selection, multi-back-end generation, scoring and quality-gated refinement

pub mod analyzer;
pub mod backends;
pub mod cache;
pub mod comparison;
pub mod error;
pub mod metrics;
pub mod oracle;
pub mod pipeline;
pub mod pos_tagger;
pub mod recommendations;
pub mod refinement;
pub mod selection;
pub mod strategy;

#[cfg(test)]
pub mod testing;

pub use backends::{ChatParaphraseBackend, GenerationBackend};
pub use cache::{CacheStats, FingerprintCache};
pub use error::{BackendError, HumanizeError, OracleError};
pub use metrics::MetricsEngine;
pub use oracle::{LocalEntropyOracle, PerplexityOracle};
pub use pipeline::GenerationPipeline;
pub use refinement::{RefinementOutcome, RefinementSettings, RoundResult};
pub use strategy::StrategySelector;

use crate::models::{
    AnalysisReport, Candidate, ComparisonReport, HumanizeRequest, HumanizeResponse, Strategy,
};
use crate::services::config_store::HumanizerConfig;
use crate::services::text_processor::{apply_passes, POST_PASS_ORDER, PRE_PASS_ORDER};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Orchestration entry point. Construct once and share; every request owns its own state.
pub struct HumanizeEngine {
    config: HumanizerConfig,
    metrics: Arc<MetricsEngine>,
    pipeline: GenerationPipeline,
    selector: StrategySelector,
}

impl HumanizeEngine {
    pub fn new(
        config: HumanizerConfig,
        oracle: Arc<dyn PerplexityOracle>,
        backends: Vec<Arc<dyn GenerationBackend>>,
    ) -> Result<Self, HumanizeError> {
        config.validate().map_err(HumanizeError::Config)?;

        let metrics = Arc::new(MetricsEngine::new(oracle, &config));
        let pipeline = GenerationPipeline::new(
            backends,
            Arc::clone(&metrics),
            Duration::from_secs(config.backend_timeout_secs),
            config.min_length_ratio,
        );
        let selector = StrategySelector::new(config.strategies.clone(), config.adaptive.clone());

        info!(
            "[ENGINE] ready: {} back end(s), oracle={}, cache capacity {}",
            pipeline.backend_count(),
            metrics.oracle_name(),
            config.cache_capacity
        );
        Ok(Self { config, metrics, pipeline, selector })
    }

    pub fn metrics(&self) -> &MetricsEngine {
        &self.metrics
    }

    pub fn config(&self) -> &HumanizerConfig {
        &self.config
    }

    pub fn backend_count(&self) -> usize {
        self.pipeline.backend_count()
    }

    fn validate_input(&self, text: &str) -> Result<(), HumanizeError> {
        if text.trim().is_empty() {
            return Err(HumanizeError::InputError("Text is empty".to_string()));
        }
        let chars = text.chars().count();
        if chars > self.config.max_input_chars {
            return Err(HumanizeError::InputError(format!(
                "Text is too long: {} characters (max {})",
                chars, self.config.max_input_chars
            )));
        }
        Ok(())
    }

    /// Rewrite `request.text` under the quality gate
    pub async fn humanize(
        &self,
        request: &HumanizeRequest,
        cancel: &CancellationToken,
    ) -> Result<HumanizeResponse, HumanizeError> {
        let started = Instant::now();
        let request_id = uuid::Uuid::new_v4().to_string();

        self.validate_input(&request.text)?;
        if request.max_variations == 0 {
            return Err(HumanizeError::InputError("max_variations must be at least 1".to_string()));
        }

        let profile = analyzer::analyze_text(&request.text)?;
        let original_fingerprint = self.metrics.fingerprint(&request.text);
        let mode = self.config.modes.get(request.mode).clone();

        info!(
            "[ENGINE] {} start: {} words, category={}, strategy={}, mode={:?}, score={:.2}",
            request_id,
            profile.word_count,
            profile.category.as_str(),
            request.strategy,
            request.mode,
            original_fingerprint.composite_score
        );

        let prepared = apply_passes(&request.text, &PRE_PASS_ORDER, mode.pre_passes);
        let prepared_fingerprint = self.metrics.fingerprint(&prepared);
        let settings = RefinementSettings::from_config(&self.config, mode.max_iterations);
        let priority = self.pipeline.priority();

        let engine = self;
        let profile = &profile;
        let mode_ref = &mode;
        let priority = &priority;
        let outcome = refinement::refine(&prepared, prepared_fingerprint, &settings, move |iteration, source| async move {
            let plan = engine
                .selector
                .plan(profile, request.strategy, mode_ref, request.max_variations)?;
            info!(
                "[ENGINE] iteration {}: {} -> {} ({}) temp={:.2} top_k={} top_p={:.3} n={}",
                iteration,
                plan.requested,
                plan.strategy,
                plan.rule,
                plan.params.temperature,
                plan.params.top_k,
                plan.params.top_p,
                plan.params.num_sequences
            );

            let output = engine.pipeline.run(&source, &plan, cancel).await?;
            let candidates = selection::score_candidates(&engine.metrics, output.texts);
            let chosen = selection::select(&candidates, plan.strategy, priority, engine.config.diverse_tolerance)
                .cloned()
                .ok_or_else(|| HumanizeError::generation("No candidate survived selection"))?;
            let confidence = selection::confidence(candidates.len(), engine.config.diversity_floor);

            Ok::<RoundResult, HumanizeError>(RoundResult {
                candidate: chosen,
                strategy: plan.strategy,
                rule: plan.rule,
                candidate_count: candidates.len(),
                failed_backends: output.failed_backends,
                confidence,
            })
        })
        .await?;

        let strategy_used = outcome
            .state
            .trace
            .iter()
            .rev()
            .find(|t| t.accepted)
            .map(|t| t.strategy)
            .unwrap_or(request.strategy);
        let best = self.post_process(outcome.state.best, mode.post_passes);
        let processing_ms = started.elapsed().as_millis();

        info!(
            "[ENGINE] {} done: {:.2} -> {:.2} ({}) in {} iteration(s), {}ms",
            request_id,
            original_fingerprint.composite_score,
            best.composite_score,
            best.fingerprint.detection_resistance,
            outcome.state.iteration,
            processing_ms
        );

        Ok(HumanizeResponse {
            request_id,
            text: best.text,
            fingerprint: best.fingerprint,
            original_fingerprint,
            strategy_used,
            mode: request.mode,
            iterations: outcome.state.iteration,
            stop_reason: outcome.stop_reason,
            confidence: outcome.state.confidence,
            per_iteration_trace: outcome.state.trace,
            processing_ms,
        })
    }

    /// Post-passes are kept only when they do not lower the composite score
    fn post_process(&self, best: Candidate, passes: usize) -> Candidate {
        if passes == 0 {
            return best;
        }
        let polished = apply_passes(&best.text, &POST_PASS_ORDER, passes);
        if polished == best.text {
            return best;
        }

        let fingerprint = self.metrics.fingerprint(&polished);
        if fingerprint.composite_score < best.composite_score {
            warn!(
                "[ENGINE] post-processing lowered score {:.2} -> {:.2}; keeping unpolished text",
                best.composite_score, fingerprint.composite_score
            );
            return best;
        }

        Candidate {
            text: polished,
            backend_id: best.backend_id,
            composite_score: fingerprint.composite_score,
            fingerprint,
        }
    }

    /// Profile, fingerprint and improvement tips for a text without generating anything
    pub fn analyze(&self, text: &str) -> Result<AnalysisReport, HumanizeError> {
        self.validate_input(text)?;
        let profile = analyzer::analyze_text(text)?;
        let fingerprint = self.metrics.fingerprint(text);
        let recommendations = recommendations::recommendations(&profile, &fingerprint);
        let suggested_strategy = self.selector.resolve(&profile, Strategy::Adaptive).strategy;

        Ok(AnalysisReport {
            profile,
            fingerprint,
            recommendations,
            suggested_strategy,
        })
    }

    pub fn compare(&self, original: &str, rewritten: &str) -> Result<ComparisonReport, HumanizeError> {
        self.validate_input(original)?;
        self.validate_input(rewritten)?;
        Ok(comparison::compare(
            self.metrics.fingerprint(original),
            self.metrics.fingerprint(rewritten),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{CountingOracle, StubBackend, StubBehavior};
    use super::*;
    use crate::models::{Mode, StopReason};
    use crate::services::text_processor::split_sentences;

    const SOURCE: &str = "The implementation of artificial intelligence systems requires comprehensive consideration of numerous factors.";

    const PARAPHRASES: [&str; 3] = [
        "Building AI systems means weighing a lot of different factors carefully.",
        "Putting artificial intelligence to work? You have to think hard about many things, some obvious and some not.",
        "Implementing artificial intelligence systems requires the consideration of numerous factors.",
    ];

    fn engine(backends: Vec<Arc<StubBackend>>) -> HumanizeEngine {
        let backends = backends
            .into_iter()
            .map(|b| b as Arc<dyn GenerationBackend>)
            .collect();
        HumanizeEngine::new(HumanizerConfig::default(), Arc::new(CountingOracle::new(120.0)), backends).unwrap()
    }

    fn request(text: &str, strategy: Strategy, mode: Mode) -> HumanizeRequest {
        HumanizeRequest {
            text: text.to_string(),
            strategy,
            mode,
            max_variations: 3,
        }
    }

    fn stubs() -> Vec<Arc<StubBackend>> {
        vec![
            Arc::new(StubBackend::fixed("a", &[PARAPHRASES[0]])),
            Arc::new(StubBackend::fixed("b", &[PARAPHRASES[1]])),
            Arc::new(StubBackend::fixed("c", &[PARAPHRASES[2]])),
        ]
    }

    #[tokio::test]
    async fn test_best_strategy_returns_highest_scoring_stub() {
        let engine = engine(stubs());
        let response = engine
            .humanize(&request(SOURCE, Strategy::Best, Mode::Standard), &CancellationToken::new())
            .await
            .unwrap();

        let best_score = PARAPHRASES
            .iter()
            .map(|p| engine.metrics().fingerprint(p).composite_score)
            .fold(f64::MIN, f64::max);
        assert_eq!(response.fingerprint.composite_score, best_score);
        assert!(PARAPHRASES.contains(&response.text.as_str()));
        assert_eq!(response.strategy_used, Strategy::Best);
        assert!(response.iterations <= 3);
        assert_eq!(response.per_iteration_trace.len() as u32, response.iterations);
    }

    #[tokio::test]
    async fn test_mixed_strategy_recombines_stub_sentences() {
        let outputs = [
            "Building AI is hard work. It needs many careful choices along the way.",
            "Putting AI to work takes real thought. Plenty of different factors matter here.",
        ];
        let backends = vec![
            Arc::new(StubBackend::fixed("a", &[outputs[0]])),
            Arc::new(StubBackend::fixed("b", &[outputs[1]])),
        ];
        let engine = engine(backends);
        let response = engine
            .humanize(&request(SOURCE, Strategy::Mixed, Mode::Standard), &CancellationToken::new())
            .await
            .unwrap();

        let stub_sentences: Vec<String> = outputs.iter().flat_map(|o| split_sentences(o)).collect();
        let chosen = split_sentences(&response.text);
        assert_eq!(chosen.len(), 2);
        assert!(chosen.iter().all(|s| stub_sentences.contains(s)));
        assert_eq!(response.strategy_used, Strategy::Mixed);
    }

    #[tokio::test]
    async fn test_diverse_strategy_prefers_richest_vocabulary_within_tolerance() {
        let engine = engine(stubs());
        let response = engine
            .humanize(&request(SOURCE, Strategy::Diverse, Mode::Standard), &CancellationToken::new())
            .await
            .unwrap();

        let fingerprints: Vec<_> = PARAPHRASES.iter().map(|p| engine.metrics().fingerprint(p)).collect();
        let best = fingerprints.iter().map(|f| f.composite_score).fold(f64::MIN, f64::max);
        let floor = best - engine.config().diverse_tolerance;
        let richest = fingerprints
            .iter()
            .filter(|f| f.composite_score >= floor)
            .map(|f| f.stylometry.type_token_ratio)
            .fold(f64::MIN, f64::max);

        assert!(PARAPHRASES.contains(&response.text.as_str()));
        assert!(response.fingerprint.composite_score >= floor);
        assert_eq!(response.fingerprint.stylometry.type_token_ratio, richest);
        assert_eq!(response.strategy_used, Strategy::Diverse);
    }

    #[tokio::test]
    async fn test_adaptive_resolves_to_one_concrete_strategy() {
        let engine = engine(stubs());
        let expected = engine.analyze(SOURCE).unwrap().suggested_strategy;
        let response = engine
            .humanize(&request(SOURCE, Strategy::Adaptive, Mode::Standard), &CancellationToken::new())
            .await
            .unwrap();

        assert_ne!(expected, Strategy::Adaptive);
        assert_eq!(response.strategy_used, expected);
        assert!(response.per_iteration_trace.iter().all(|t| t.strategy == expected));
    }

    #[tokio::test]
    async fn test_empty_input_rejected_before_generation() {
        let backends = stubs();
        let engine = engine(backends.clone());
        let result = engine
            .humanize(&request("", Strategy::Best, Mode::Standard), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(HumanizeError::InputError(_))));
        assert!(backends.iter().all(|b| b.calls() == 0));
        assert_eq!(engine.metrics().cache_stats().entries, 0);
    }

    #[tokio::test]
    async fn test_oversized_input_rejected() {
        let backends = stubs();
        let engine = engine(backends.clone());
        let text = "word ".repeat(3000);
        let result = engine
            .humanize(&request(&text, Strategy::Best, Mode::Standard), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(HumanizeError::InputError(_))));
        assert!(backends.iter().all(|b| b.calls() == 0));
    }

    #[tokio::test]
    async fn test_partial_failure_still_succeeds() {
        let backends = vec![
            Arc::new(StubBackend::failing("a")),
            Arc::new(StubBackend::fixed("b", &[PARAPHRASES[0]])),
            Arc::new(StubBackend::failing("c")),
        ];
        let engine = engine(backends);
        let response = engine
            .humanize(&request(SOURCE, Strategy::Weighted, Mode::Standard), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.text, PARAPHRASES[0]);
        let first = &response.per_iteration_trace[0];
        assert_eq!(first.failed_backends, vec!["a".to_string(), "c".to_string()]);
        assert!(first.confidence < 1.0);
    }

    #[tokio::test]
    async fn test_total_failure_is_generation_failure() {
        let backends = vec![Arc::new(StubBackend::failing("a")), Arc::new(StubBackend::failing("b"))];
        let engine = engine(backends);
        let result = engine
            .humanize(&request(SOURCE, Strategy::Best, Mode::Standard), &CancellationToken::new())
            .await;

        match result {
            Err(HumanizeError::GenerationFailure { last_fingerprint, .. }) => assert!(last_fingerprint.is_some()),
            other => panic!("expected GenerationFailure, got {:?}", other.map(|r| r.text)),
        }
    }

    #[tokio::test]
    async fn test_cancellation_aborts_request() {
        let backends = vec![Arc::new(StubBackend::new(
            "slow",
            StubBehavior::Delay(Duration::from_secs(30), vec![PARAPHRASES[0].to_string()]),
        ))];
        let engine = engine(backends);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = engine
            .humanize(&request(SOURCE, Strategy::Best, Mode::Standard), &cancel)
            .await;
        assert!(matches!(result, Err(HumanizeError::Cancelled)));
    }

    #[tokio::test]
    async fn test_ultra_mode_forwards_aggressive_params() {
        let backends = stubs();
        let engine = engine(backends.clone());
        let response = engine
            .humanize(&request(SOURCE, Strategy::Best, Mode::Ultra), &CancellationToken::new())
            .await
            .unwrap();

        let requests = backends[0].requests();
        assert!(!requests.is_empty());
        assert!(requests.iter().all(|r| r.params.top_p >= 0.995 && r.params.num_sequences == 3));
        assert!(response.iterations <= 5);

        let gated_best = response.per_iteration_trace.last().unwrap().best_score;
        assert!(response.fingerprint.composite_score >= gated_best);
    }

    #[tokio::test]
    async fn test_repeated_rounds_stop_early() {
        let engine = engine(stubs());
        let response = engine
            .humanize(&request(SOURCE, Strategy::Best, Mode::Ultra), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(response.stop_reason, StopReason::Stalled | StopReason::TargetMet));
        assert!(response.iterations <= 2);
    }

    #[test]
    fn test_analyze_reports_tips_and_strategy() {
        let engine = engine(stubs());
        let report = engine.analyze(SOURCE).unwrap();
        assert_eq!(report.profile.word_count, 12);
        assert!(Strategy::RESOLVED.contains(&report.suggested_strategy));
        assert!(matches!(engine.analyze("   "), Err(HumanizeError::InputError(_))));
    }

    #[test]
    fn test_compare_uses_cached_fingerprints() {
        let engine = engine(stubs());
        let report = engine.compare(SOURCE, PARAPHRASES[1]).unwrap();
        assert_eq!(report.original.composite_score, engine.metrics().fingerprint(SOURCE).composite_score);
        assert_eq!(report.improved, report.rewritten.composite_score > report.original.composite_score);
        assert!(!report.deltas.is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = HumanizerConfig::default();
        config.weights.perplexity = 0.9;
        let result = HumanizeEngine::new(config, Arc::new(CountingOracle::new(100.0)), Vec::new());
        assert!(matches!(result, Err(HumanizeError::Config(_))));
    }
}
