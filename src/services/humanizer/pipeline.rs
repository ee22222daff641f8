// Generation Pipeline
// Drives back ends in parallel, cascaded or style-guided topologies

use super::backends::GenerationBackend;
use super::error::{BackendError, HumanizeError};
use super::metrics::{sentence_quick_score, MetricsEngine};
use super::strategy::style_template;
use crate::models::{
    GeneratedText, GenerationParams, GenerationRequest, Strategy, StrategyPlan, StyleTemplate, TextCategory,
};
use crate::services::text_processor::{apply_style, split_sentences};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Synthesized recombinations produced by the mixed topology
const MIXED_VARIANTS: usize = 3;
pub const MIXED_BACKEND_ID: &str = "mixed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    Parallel,
    Cascade,
    StyleTransfer,
    Mixed,
}

impl Topology {
    pub fn for_strategy(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Weighted | Strategy::Diverse | Strategy::Best => Topology::Parallel,
            Strategy::Mixed => Topology::Mixed,
            Strategy::Cascade | Strategy::Adaptive => Topology::Cascade,
            Strategy::StyleTransfer => Topology::StyleTransfer,
        }
    }
}

/// Generated texts of one round plus the back ends that failed
#[derive(Debug, Clone, Default)]
pub struct PipelineOutput {
    pub texts: Vec<GeneratedText>,
    pub failed_backends: Vec<String>,
}

/// Outcome of one back-end invocation. `None` means the request was cancelled.
async fn invoke(
    backend: &dyn GenerationBackend,
    request: &GenerationRequest,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Option<Result<Vec<String>, BackendError>> {
    let started = Instant::now();
    let result = tokio::select! {
        _ = cancel.cancelled() => return None,
        res = tokio::time::timeout(timeout, backend.generate(request)) => match res {
            Ok(inner) => inner,
            Err(_) => Err(BackendError::Timeout(timeout)),
        },
    };

    let result = result.and_then(|outputs| {
        let cleaned: Vec<String> = outputs
            .into_iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        if cleaned.is_empty() {
            Err(BackendError::EmptyOutput)
        } else {
            Ok(cleaned)
        }
    });

    match &result {
        Ok(outputs) => info!(
            "[PIPELINE] {} returned {} output(s) in {}ms",
            backend.id(),
            outputs.len(),
            started.elapsed().as_millis()
        ),
        Err(e) => warn!("[PIPELINE] {} failed: {}", backend.id(), e),
    }
    Some(result)
}

pub struct GenerationPipeline {
    backends: Vec<Arc<dyn GenerationBackend>>,
    metrics: Arc<MetricsEngine>,
    timeout: Duration,
    min_length_ratio: f64,
}

impl GenerationPipeline {
    pub fn new(
        backends: Vec<Arc<dyn GenerationBackend>>,
        metrics: Arc<MetricsEngine>,
        timeout: Duration,
        min_length_ratio: f64,
    ) -> Self {
        Self { backends, metrics, timeout, min_length_ratio }
    }

    /// Back-end ids in priority order
    pub fn priority(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.id().to_string()).collect()
    }

    pub fn backend_count(&self) -> usize {
        self.backends.len()
    }

    fn request(&self, backend: &dyn GenerationBackend, source: &str, params: &GenerationParams, style: Option<StyleTemplate>) -> GenerationRequest {
        GenerationRequest {
            source_text: source.to_string(),
            backend_id: backend.id().to_string(),
            params: params.clone(),
            style,
        }
    }

    /// Run one generation round for a resolved plan
    pub async fn run(
        &self,
        source: &str,
        plan: &StrategyPlan,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutput, HumanizeError> {
        if self.backends.is_empty() {
            return Err(HumanizeError::generation("No generation back ends configured"));
        }

        let topology = Topology::for_strategy(plan.strategy);
        let mut output = match topology {
            Topology::Parallel => self.run_parallel(source, &plan.params, cancel).await?,
            Topology::Cascade => self.run_cascade(source, &plan.params, cancel).await?,
            Topology::StyleTransfer => {
                let style = style_template(plan.style.unwrap_or(TextCategory::Professional));
                self.run_style_transfer(source, &plan.params, style, cancel).await?
            }
            Topology::Mixed => {
                let parallel = self.run_parallel(source, &plan.params, cancel).await?;
                PipelineOutput {
                    texts: synthesize_mixed(&parallel.texts),
                    failed_backends: parallel.failed_backends,
                }
            }
        };

        if output.texts.is_empty() {
            return Err(HumanizeError::generation(format!(
                "All {} back end(s) failed: {}",
                self.backends.len(),
                output.failed_backends.join(", ")
            )));
        }
        if !output.failed_backends.is_empty() {
            warn!(
                "[PIPELINE] partial failure ({:?}): {} of {} back end(s) unusable: {}",
                topology,
                output.failed_backends.len(),
                self.backends.len(),
                output.failed_backends.join(", ")
            );
        }

        output.texts = filter_short(source, output.texts, self.min_length_ratio);
        Ok(output)
    }

    /// Fan out to every back end; results come back ordered by priority regardless of completion order
    async fn run_parallel(
        &self,
        source: &str,
        params: &GenerationParams,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutput, HumanizeError> {
        let mut set = JoinSet::new();
        for (priority, backend) in self.backends.iter().enumerate() {
            let backend = Arc::clone(backend);
            let request = self.request(backend.as_ref(), source, params, None);
            let timeout = self.timeout;
            let cancel = cancel.clone();
            set.spawn(async move {
                let result = invoke(backend.as_ref(), &request, timeout, &cancel).await;
                (priority, result)
            });
        }

        let mut results: Vec<(usize, Vec<String>)> = Vec::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    set.abort_all();
                    return Err(HumanizeError::Cancelled);
                }
                joined = set.join_next() => match joined {
                    None => break,
                    Some(Ok((priority, Some(Ok(outputs))))) => results.push((priority, outputs)),
                    Some(Ok((_, Some(Err(_))))) => {}
                    Some(Ok((_, None))) => {
                        set.abort_all();
                        return Err(HumanizeError::Cancelled);
                    }
                    Some(Err(e)) => warn!("[PIPELINE] back-end task aborted: {}", e),
                },
            }
        }

        results.sort_by_key(|(priority, _)| *priority);
        let succeeded: HashSet<usize> = results.iter().map(|(p, _)| *p).collect();
        let failed_backends = self
            .backends
            .iter()
            .enumerate()
            .filter(|(p, _)| !succeeded.contains(p))
            .map(|(_, b)| b.id().to_string())
            .collect();

        let texts = results
            .into_iter()
            .flat_map(|(priority, outputs)| {
                let backend_id = self.backends[priority].id().to_string();
                outputs.into_iter().map(move |text| GeneratedText {
                    text,
                    backend_id: backend_id.clone(),
                    stage: None,
                })
            })
            .collect();

        Ok(PipelineOutput { texts, failed_backends })
    }

    /// Each stage rewrites the previous stage's best output; every stage's outputs are kept
    async fn run_cascade(
        &self,
        source: &str,
        params: &GenerationParams,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutput, HumanizeError> {
        let mut current = source.to_string();
        let mut output = PipelineOutput::default();

        for (stage, backend) in self.backends.iter().enumerate() {
            let request = self.request(backend.as_ref(), &current, params, None);
            let outputs = match invoke(backend.as_ref(), &request, self.timeout, cancel).await {
                None => return Err(HumanizeError::Cancelled),
                Some(Ok(outputs)) => outputs,
                Some(Err(_)) => {
                    output.failed_backends.push(backend.id().to_string());
                    continue;
                }
            };

            let stage_best = outputs
                .iter()
                .map(|o| (self.metrics.quick_score(o), o))
                .max_by(|a, b| a.0.total_cmp(&b.0))
                .map(|(score, text)| (score, text.clone()));

            if let Some((score, text)) = stage_best {
                info!("[PIPELINE] cascade stage {} ({}) best quick score {:.2}", stage, backend.id(), score);
                current = text;
            }

            output.texts.extend(outputs.into_iter().map(|text| GeneratedText {
                text,
                backend_id: backend.id().to_string(),
                stage: Some(stage),
            }));
        }

        Ok(output)
    }

    /// First back end (by priority) that succeeds, plus locally style-enhanced variants
    async fn run_style_transfer(
        &self,
        source: &str,
        params: &GenerationParams,
        style: StyleTemplate,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutput, HumanizeError> {
        let mut output = PipelineOutput::default();
        let mut styled_params = params.clone();
        styled_params.temperature = (params.temperature + style.temperature_bias).max(0.1);

        for backend in &self.backends {
            let request = self.request(backend.as_ref(), source, &styled_params, Some(style.clone()));
            match invoke(backend.as_ref(), &request, self.timeout, cancel).await {
                None => return Err(HumanizeError::Cancelled),
                Some(Ok(outputs)) => {
                    let id = backend.id().to_string();
                    let enhanced: Vec<GeneratedText> = outputs
                        .iter()
                        .map(|o| apply_style(o, &style))
                        .filter(|e| !e.is_empty() && !outputs.contains(e))
                        .map(|text| GeneratedText {
                            text,
                            backend_id: format!("{}+style", id),
                            stage: None,
                        })
                        .collect();
                    output.texts.extend(outputs.into_iter().map(|text| GeneratedText {
                        text,
                        backend_id: id.clone(),
                        stage: None,
                    }));
                    output.texts.extend(enhanced);
                    break;
                }
                Some(Err(_)) => output.failed_backends.push(backend.id().to_string()),
            }
        }

        Ok(output)
    }
}

/// Drop outputs far shorter than the source, unless that would drop everything
fn filter_short(source: &str, texts: Vec<GeneratedText>, ratio: f64) -> Vec<GeneratedText> {
    let min_words = (source.split_whitespace().count() as f64 * ratio).floor() as usize;
    let (kept, dropped): (Vec<_>, Vec<_>) = texts
        .into_iter()
        .partition(|t| t.text.split_whitespace().count() >= min_words);

    if kept.is_empty() {
        warn!("[PIPELINE] every output is under {} words; keeping short outputs", min_words);
        return dropped;
    }
    if !dropped.is_empty() {
        warn!("[PIPELINE] dropped {} output(s) under {} words", dropped.len(), min_words);
    }
    kept
}

/// Sentence-level recombination by position, spanning the longest output.
/// Variant 0 takes the best-ranked sentence everywhere; later variants swap in the
/// runner-up on alternating positions.
pub fn synthesize_mixed(outputs: &[GeneratedText]) -> Vec<GeneratedText> {
    let split_outputs: Vec<Vec<String>> = outputs.iter().map(|o| split_sentences(&o.text)).collect();
    let positions = split_outputs.iter().map(Vec::len).max().unwrap_or(0).max(1);

    let ranked: Vec<Vec<&str>> = (0..positions)
        .map(|i| {
            let mut options: Vec<(f64, &str)> = split_outputs
                .iter()
                .filter_map(|sentences| sentences.get(i))
                .map(|s| (sentence_quick_score(s), s.as_str()))
                .collect();
            options.sort_by(|a, b| b.0.total_cmp(&a.0));
            let mut seen = HashSet::new();
            options
                .into_iter()
                .map(|(_, s)| s)
                .filter(|s| seen.insert(*s))
                .collect()
        })
        .collect();

    let mut seen = HashSet::new();
    let mut variants = Vec::new();
    for variant in 0..MIXED_VARIANTS {
        let sentences: Vec<&str> = ranked
            .iter()
            .enumerate()
            .filter_map(|(i, options)| {
                let swap = variant > 0 && i % 2 == (variant - 1) % 2;
                let rank = if swap { 1.min(options.len().saturating_sub(1)) } else { 0 };
                options.get(rank).copied()
            })
            .collect();

        if sentences.is_empty() {
            continue;
        }
        let text = sentences.join(" ");
        if seen.insert(text.clone()) {
            variants.push(GeneratedText {
                text,
                backend_id: MIXED_BACKEND_ID.to_string(),
                stage: None,
            });
        }
    }

    if variants.is_empty() {
        return outputs.to_vec();
    }
    variants
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::config_store::HumanizerConfig;
    use crate::services::humanizer::testing::{CountingOracle, StubBackend, StubBehavior};

    const SOURCE: &str = "The implementation of artificial intelligence systems requires comprehensive consideration of numerous factors.";

    fn metrics() -> Arc<MetricsEngine> {
        Arc::new(MetricsEngine::new(Arc::new(CountingOracle::new(100.0)), &HumanizerConfig::default()))
    }

    fn pipeline(backends: Vec<Arc<dyn GenerationBackend>>) -> GenerationPipeline {
        GenerationPipeline::new(backends, metrics(), Duration::from_millis(500), 0.5)
    }

    fn plan(strategy: Strategy) -> StrategyPlan {
        StrategyPlan {
            requested: strategy,
            strategy,
            params: GenerationParams { temperature: 1.3, top_k: 100, top_p: 0.93, num_sequences: 2 },
            style: (strategy == Strategy::StyleTransfer).then_some(TextCategory::Casual),
            rule: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_parallel_survives_partial_failure() {
        let backends: Vec<Arc<dyn GenerationBackend>> = vec![
            Arc::new(StubBackend::failing("a")),
            Arc::new(StubBackend::new("b", StubBehavior::Fail(BackendError::EmptyOutput))),
            Arc::new(StubBackend::fixed("c", &["Building AI systems means weighing a lot of different factors carefully."])),
        ];
        let output = pipeline(backends).run(SOURCE, &plan(Strategy::Best), &CancellationToken::new()).await.unwrap();
        assert_eq!(output.texts.len(), 1);
        assert_eq!(output.texts[0].backend_id, "c");
        assert_eq!(output.failed_backends, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_all_failing_is_generation_failure() {
        let backends: Vec<Arc<dyn GenerationBackend>> =
            vec![Arc::new(StubBackend::failing("a")), Arc::new(StubBackend::failing("b"))];
        let result = pipeline(backends).run(SOURCE, &plan(Strategy::Weighted), &CancellationToken::new()).await;
        assert!(matches!(result, Err(HumanizeError::GenerationFailure { .. })));
    }

    #[tokio::test]
    async fn test_parallel_order_independent_of_completion() {
        let backends: Vec<Arc<dyn GenerationBackend>> = vec![
            Arc::new(StubBackend::new(
                "slow",
                StubBehavior::Delay(Duration::from_millis(50), vec!["A slower rewrite of the whole idea, kept at length here.".to_string()]),
            )),
            Arc::new(StubBackend::fixed("fast", &["A faster rewrite of the whole idea, kept at length here too."])),
        ];
        let output = pipeline(backends).run(SOURCE, &plan(Strategy::Best), &CancellationToken::new()).await.unwrap();
        let ids: Vec<&str> = output.texts.iter().map(|t| t.backend_id.as_str()).collect();
        assert_eq!(ids, vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let backends: Vec<Arc<dyn GenerationBackend>> = vec![
            Arc::new(StubBackend::new("stuck", StubBehavior::Delay(Duration::from_secs(30), vec!["late".to_string()]))),
            Arc::new(StubBackend::fixed("ok", &["Putting AI systems in place takes careful thought about many factors."])),
        ];
        let output = pipeline(backends).run(SOURCE, &plan(Strategy::Best), &CancellationToken::new()).await.unwrap();
        assert_eq!(output.failed_backends, vec!["stuck"]);
    }

    #[tokio::test]
    async fn test_cascade_feeds_previous_stage() {
        let first = Arc::new(StubBackend::new("first", StubBehavior::Append("Stage one.".to_string())));
        let second = Arc::new(StubBackend::new("second", StubBehavior::Append("Stage two.".to_string())));
        let backends: Vec<Arc<dyn GenerationBackend>> = vec![first.clone(), second.clone()];

        let output = pipeline(backends).run(SOURCE, &plan(Strategy::Cascade), &CancellationToken::new()).await.unwrap();
        assert_eq!(output.texts.len(), 2);
        assert_eq!(output.texts[0].stage, Some(0));
        assert_eq!(output.texts[1].stage, Some(1));
        assert!(second.requests()[0].source_text.ends_with("Stage one."));
        assert!(output.texts[1].text.ends_with("Stage one. Stage two."));
    }

    #[tokio::test]
    async fn test_cascade_skips_failed_stage() {
        let backends: Vec<Arc<dyn GenerationBackend>> = vec![
            Arc::new(StubBackend::failing("broken")),
            Arc::new(StubBackend::new("second", StubBehavior::Append("Stage two.".to_string()))),
        ];
        let output = pipeline(backends).run(SOURCE, &plan(Strategy::Cascade), &CancellationToken::new()).await.unwrap();
        assert_eq!(output.failed_backends, vec!["broken"]);
        assert_eq!(output.texts[0].text, format!("{} Stage two.", SOURCE));
    }

    #[tokio::test]
    async fn test_style_transfer_uses_first_working_backend() {
        let first = Arc::new(StubBackend::failing("first"));
        let second = Arc::new(StubBackend::fixed(
            "second",
            &["We do not think it is simple. Building AI systems means weighing many factors."],
        ));
        let third = Arc::new(StubBackend::fixed("third", &["unused"]));
        let backends: Vec<Arc<dyn GenerationBackend>> = vec![first, second.clone(), third.clone()];

        let output = pipeline(backends).run(SOURCE, &plan(Strategy::StyleTransfer), &CancellationToken::new()).await.unwrap();
        assert_eq!(third.calls(), 0);
        assert!(second.requests()[0].style.is_some());
        assert!(output.texts.iter().any(|t| t.backend_id == "second+style"));
    }

    #[tokio::test]
    async fn test_cancellation_aborts_round() {
        let backends: Vec<Arc<dyn GenerationBackend>> = vec![Arc::new(StubBackend::new(
            "slow",
            StubBehavior::Delay(Duration::from_millis(300), vec!["late".to_string()]),
        ))];
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let result = pipeline(backends).run(SOURCE, &plan(Strategy::Best), &cancel).await;
        assert!(matches!(result, Err(HumanizeError::Cancelled)));
    }

    #[test]
    fn test_synthesize_mixed_picks_best_sentence_per_position() {
        let outputs = vec![
            GeneratedText {
                text: "Ok. We checked the second idea twice, because it seemed fragile.".to_string(),
                backend_id: "a".to_string(),
                stage: None,
            },
            GeneratedText {
                text: "The first idea held up well, which surprised the whole team. No.".to_string(),
                backend_id: "b".to_string(),
                stage: None,
            },
        ];
        let variants = synthesize_mixed(&outputs);
        assert!(!variants.is_empty() && variants.len() <= MIXED_VARIANTS);
        assert_eq!(
            variants[0].text,
            "The first idea held up well, which surprised the whole team. We checked the second idea twice, because it seemed fragile."
        );
        assert!(variants.iter().all(|v| v.backend_id == MIXED_BACKEND_ID));
    }

    #[test]
    fn test_synthesize_mixed_keeps_sentences_beyond_the_source() {
        let outputs = vec![
            GeneratedText {
                text: "Building AI is hard work. It needs many careful choices.".to_string(),
                backend_id: "a".to_string(),
                stage: None,
            },
            GeneratedText {
                text: "Putting AI to work takes thought. Plenty of factors matter here.".to_string(),
                backend_id: "b".to_string(),
                stage: None,
            },
        ];
        let variants = synthesize_mixed(&outputs);
        assert!(!variants.is_empty());
        assert!(variants.iter().all(|v| split_sentences(&v.text).len() == 2));
    }

    #[test]
    fn test_synthesize_mixed_spans_the_longest_output() {
        let outputs = vec![
            GeneratedText { text: "One short line.".to_string(), backend_id: "a".to_string(), stage: None },
            GeneratedText {
                text: "A first thought. A second thought. A third thought.".to_string(),
                backend_id: "b".to_string(),
                stage: None,
            },
        ];
        let variants = synthesize_mixed(&outputs);
        assert!(variants.iter().all(|v| split_sentences(&v.text).len() == 3));
    }

    #[test]
    fn test_filter_short_keeps_all_when_everything_is_short() {
        let texts = vec![GeneratedText { text: "tiny".to_string(), backend_id: "a".to_string(), stage: None }];
        assert_eq!(filter_short(SOURCE, texts, 0.5).len(), 1);
    }
}
