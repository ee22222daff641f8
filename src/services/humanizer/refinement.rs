// Refinement Loop
// Quality-gated repetition of generate + select with a monotone best

use super::error::HumanizeError;
use crate::models::{Candidate, IterationTrace, StopReason, Strategy, TextFingerprint};
use crate::services::config_store::HumanizerConfig;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RefinementSettings {
    pub target_score: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
    /// Non-improving rounds after the first one before stopping early
    pub early_stop_streak: u32,
}

impl RefinementSettings {
    pub fn from_config(config: &HumanizerConfig, max_iterations: u32) -> Self {
        Self {
            target_score: config.target_score,
            tolerance: config.improvement_tolerance,
            max_iterations: max_iterations.max(1),
            early_stop_streak: config.early_stop_streak.max(1),
        }
    }
}

/// What one generate + select round hands back to the loop
#[derive(Debug, Clone)]
pub struct RoundResult {
    pub candidate: Candidate,
    pub strategy: Strategy,
    pub rule: String,
    pub candidate_count: usize,
    pub failed_backends: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initial,
    Generating,
    Gated,
    Done,
    Failed,
}

/// Owned by the loop; mutated once per iteration
#[derive(Debug, Clone)]
pub struct RefinementState {
    pub best: Candidate,
    pub iteration: u32,
    pub strategy_history: Vec<Strategy>,
    pub trace: Vec<IterationTrace>,
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct RefinementOutcome {
    pub state: RefinementState,
    pub stop_reason: StopReason,
}

/// Comparison of the latest round against the best before it
#[derive(Debug, Clone, Copy)]
struct Gate {
    improved: bool,
    regressed: bool,
}

/// Run rounds until the gate stops the loop. `round` receives the iteration number
/// (1-based) and the text to rewrite.
pub async fn refine<F, Fut>(
    source_text: &str,
    source_fingerprint: Arc<TextFingerprint>,
    settings: &RefinementSettings,
    mut round: F,
) -> Result<RefinementOutcome, HumanizeError>
where
    F: FnMut(u32, String) -> Fut,
    Fut: Future<Output = Result<RoundResult, HumanizeError>>,
{
    let mut phase = Phase::Initial;
    let mut state: Option<RefinementState> = None;
    let mut current_source = source_text.to_string();
    let mut current_source_score = source_fingerprint.composite_score;
    let mut stall_streak = 0u32;
    let mut gate = Gate { improved: true, regressed: false };
    let mut failure: Option<HumanizeError> = None;
    let mut stop_reason = StopReason::BudgetExhausted;

    loop {
        match phase {
            Phase::Initial => {
                phase = Phase::Generating;
            }
            Phase::Generating => {
                let iteration = state.as_ref().map_or(0, |s| s.iteration) + 1;
                let started = Instant::now();

                let result = match round(iteration, current_source.clone()).await {
                    Ok(result) => result,
                    Err(e) => {
                        failure = Some(e);
                        phase = Phase::Failed;
                        continue;
                    }
                };

                let new_score = result.candidate.composite_score;
                let trace_base = |best_score: f64, accepted: bool| IterationTrace {
                    iteration,
                    strategy: result.strategy,
                    rule: result.rule.clone(),
                    source_score: current_source_score,
                    candidate_score: new_score,
                    best_score,
                    accepted,
                    candidate_count: result.candidate_count,
                    failed_backends: result.failed_backends.clone(),
                    confidence: result.confidence,
                    elapsed_ms: started.elapsed().as_millis(),
                };

                match state.as_mut() {
                    None => {
                        let trace = trace_base(new_score, true);
                        gate = Gate { improved: true, regressed: false };
                        state = Some(RefinementState {
                            iteration,
                            strategy_history: vec![result.strategy],
                            trace: vec![trace],
                            confidence: result.confidence,
                            best: result.candidate.clone(),
                        });
                    }
                    Some(s) => {
                        let previous_best = s.best.composite_score;
                        let accepted = new_score > previous_best;
                        gate = Gate {
                            improved: new_score > previous_best + settings.tolerance,
                            regressed: new_score < previous_best - settings.tolerance,
                        };
                        if accepted {
                            s.best = result.candidate.clone();
                            s.confidence = result.confidence;
                        } else {
                            warn!(
                                "[REFINE] iteration {} rejected: {:.2} does not beat best {:.2}",
                                iteration, new_score, previous_best
                            );
                        }
                        s.iteration = iteration;
                        s.strategy_history.push(result.strategy);
                        s.trace.push(trace_base(s.best.composite_score, accepted));
                    }
                }

                info!(
                    "[REFINE] iteration {} strategy={} candidate={:.2} candidates={} elapsed_ms={}",
                    iteration,
                    result.strategy,
                    new_score,
                    result.candidate_count,
                    started.elapsed().as_millis()
                );
                phase = Phase::Gated;
            }
            Phase::Gated => {
                let Some(s) = state.as_ref() else {
                    phase = Phase::Failed;
                    continue;
                };

                if !gate.improved && s.iteration > 1 {
                    stall_streak += 1;
                } else {
                    stall_streak = 0;
                }

                let reason = if s.best.composite_score >= settings.target_score {
                    Some(StopReason::TargetMet)
                } else if gate.regressed {
                    Some(StopReason::Regressed)
                } else if stall_streak >= settings.early_stop_streak {
                    Some(StopReason::Stalled)
                } else if s.iteration >= settings.max_iterations {
                    Some(StopReason::BudgetExhausted)
                } else {
                    None
                };

                match reason {
                    Some(reason) => {
                        stop_reason = reason;
                        phase = Phase::Done;
                    }
                    None => {
                        current_source = s.best.text.clone();
                        current_source_score = s.best.composite_score;
                        phase = Phase::Generating;
                    }
                }
            }
            Phase::Done => {
                let Some(state) = state else {
                    return Err(HumanizeError::generation("Refinement finished without a result"));
                };
                info!(
                    "[REFINE] done after {} iteration(s): best={:.2} reason={:?}",
                    state.iteration, state.best.composite_score, stop_reason
                );
                return Ok(RefinementOutcome { state, stop_reason });
            }
            Phase::Failed => {
                let error = failure
                    .take()
                    .unwrap_or_else(|| HumanizeError::generation("Refinement failed"));
                let last = state
                    .as_ref()
                    .map(|s| Arc::clone(&s.best.fingerprint))
                    .unwrap_or_else(|| Arc::clone(&source_fingerprint));
                warn!("[REFINE] failed: {}", error);
                return Err(error.with_fingerprint(last));
            }
        }
    }
}
