//! The [`Summarizer`]: drives one run through the pipeline state machine.
//!
//! ```text
//! Start ─► Mapping ─► Collecting ─► Routing ─► Finalizing ─► Done
//!   │                    ▲            │  ▲
//!   └────── combine ─────┘            ▼  │
//!                                   Collapsing
//! ```
//!
//! Mapping fans out one reducer task per chunk and suspends at the fan-in
//! barrier; all state mutation happens on the driving task after the
//! barrier. Every `Routing -> Collapsing` increments the iteration counter,
//! which is capped by [`SummarizerConfig::max_collapse_rounds`].

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::config::SummarizerConfig;
use super::document::Document;
use super::events::{EventHandler, NoopHandler, PipelineEvent, Route};
use super::stages::{
    MapOutput, StageContext, chunk_inputs, collapse, collect, finalize, map_chunks, route,
};
use super::state::{PipelineStage, PipelineState, TransitionRecord};
use crate::api::usage::generate_run_id;
use crate::error::{RunResult, SummarizeError};
use crate::reduce::Reducer;
use crate::text::{Chunker, TokenCounter};

/// Successful result of one run.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryOutput {
    pub run_id: String,
    pub summary: String,
    /// Size of `summary`; never more than `budget`.
    pub tokens: usize,
    pub budget: usize,
    /// Input documents (or pre-made summaries for `combine`).
    pub documents: usize,
    pub chunks: usize,
    pub collapse_rounds: u32,
    pub transitions: Vec<TransitionRecord>,
    /// RFC 3339 timestamp of the run start.
    pub started_at: String,
    pub elapsed_ms: u64,
}

/// Budget-bounded recursive map-reduce summarizer.
///
/// # Example
///
/// ```ignore
/// let summarizer = Summarizer::new(reducer, Arc::new(WordCounter), SummarizerConfig::default())
///     .with_event_handler(LoggingHandler);
/// let output = summarizer.summarize(vec![article], 1000).await?;
/// assert!(output.tokens <= 1000);
/// ```
pub struct Summarizer {
    reducer: Arc<dyn Reducer>,
    counter: Arc<dyn TokenCounter>,
    config: SummarizerConfig,
    events: Arc<dyn EventHandler>,
}

impl Summarizer {
    pub fn new(
        reducer: Arc<dyn Reducer>,
        counter: Arc<dyn TokenCounter>,
        config: SummarizerConfig,
    ) -> Self {
        Self {
            reducer,
            counter,
            config,
            events: Arc::new(NoopHandler),
        }
    }

    pub fn with_event_handler(mut self, handler: impl EventHandler + 'static) -> Self {
        self.events = Arc::new(handler);
        self
    }

    /// Summarize `contents` (one entry per document) into at most `budget`
    /// tokens.
    pub async fn summarize(&self, contents: Vec<String>, budget: usize) -> RunResult {
        let documents = contents.len();
        let mut state = PipelineState::new(generate_run_id(), contents, budget);
        info!(
            "[{}] Summarizing {documents} documents to {budget} tokens with {} ({} counter)",
            state.run_id,
            self.reducer.name(),
            self.counter.name()
        );
        let started_at = Utc::now().to_rfc3339();
        let result = self
            .drive(&mut state, PipelineStage::Mapping, Vec::new())
            .await;
        self.finish(state, documents, started_at, result)
    }

    /// Combine summaries the caller already holds into one of at most
    /// `budget` tokens. Skips chunking and mapping; the summaries enter the
    /// pipeline at the collect barrier in the given order.
    pub async fn combine(&self, summaries: Vec<String>, budget: usize) -> RunResult {
        let documents = summaries.len();
        let mut state = PipelineState::new(generate_run_id(), Vec::new(), budget);
        info!(
            "[{}] Combining {documents} summaries to {budget} tokens",
            state.run_id
        );
        let started_at = Utc::now().to_rfc3339();
        let mapped: Vec<MapOutput> = summaries
            .into_iter()
            .filter(|s| !s.trim().is_empty())
            .enumerate()
            .map(|(document, text)| MapOutput {
                document,
                chunk: 0,
                summary: Document::new(text),
            })
            .collect();
        state.chunks = mapped.len();

        let result = if budget == 0 {
            Err(SummarizeError::InvalidBudget { budget })
        } else if mapped.is_empty() {
            Err(SummarizeError::EmptyInput)
        } else {
            self.drive(&mut state, PipelineStage::Collecting, mapped)
                .await
        };
        self.finish(state, documents, started_at, result)
    }

    fn stage_context(&self) -> StageContext {
        StageContext {
            reducer: self.reducer.clone(),
            counter: self.counter.clone(),
            events: self.events.clone(),
            retry: self.config.retry.clone(),
            timeout: self.config.reduce_timeout,
            limiter: Arc::new(Semaphore::new(self.config.max_concurrency.max(1))),
        }
    }

    fn advance(&self, state: &mut PipelineState, to: PipelineStage) -> Result<(), SummarizeError> {
        let from = state.advance(to)?;
        self.events.on_event(&PipelineEvent::Transition {
            run_id: &state.run_id,
            from,
            to,
            iteration: state.iteration,
        });
        Ok(())
    }

    /// Run the state machine from `entry` until `Done` or an error.
    async fn drive(
        &self,
        state: &mut PipelineState,
        entry: PipelineStage,
        mut mapped: Vec<MapOutput>,
    ) -> Result<Document, SummarizeError> {
        let budget = state.budget;
        if budget == 0 {
            return Err(SummarizeError::InvalidBudget { budget });
        }
        let ctx = self.stage_context();
        let counter = self.counter.as_ref();
        self.advance(state, entry)?;

        loop {
            match state.stage() {
                PipelineStage::Mapping => {
                    let inputs = std::mem::take(&mut state.inputs);
                    let chunker = Chunker::for_budget(
                        self.counter.clone(),
                        budget,
                        self.config.chunk_multiplier,
                        self.config.chunk_overlap,
                    );
                    let tasks = chunk_inputs(&inputs, &chunker);
                    if tasks.is_empty() {
                        return Err(SummarizeError::EmptyInput);
                    }
                    state.chunks = tasks.len();
                    self.events.on_event(&PipelineEvent::Chunked {
                        documents: inputs.len(),
                        chunks: tasks.len(),
                        chunk_size: chunker.chunk_size(),
                    });
                    mapped = map_chunks(&ctx, tasks, budget).await?;
                    self.advance(state, PipelineStage::Collecting)?;
                }
                PipelineStage::Collecting => {
                    state.summaries = collect(std::mem::take(&mut mapped));
                    self.advance(state, PipelineStage::Routing)?;
                }
                PipelineStage::Routing => {
                    let decision = route(&state.summaries, budget, counter);
                    self.events.on_event(&PipelineEvent::Routed {
                        route: decision.route,
                        total_tokens: decision.total_tokens,
                        documents: decision.documents,
                        budget,
                    });
                    match decision.route {
                        Route::Collapse => {
                            state.iteration += 1;
                            if state.iteration > self.config.max_collapse_rounds {
                                return Err(SummarizeError::RecursionLimitExceeded {
                                    limit: self.config.max_collapse_rounds,
                                });
                            }
                            self.advance(state, PipelineStage::Collapsing)?;
                        }
                        Route::Finalize => self.advance(state, PipelineStage::Finalizing)?,
                    }
                }
                PipelineStage::Collapsing => {
                    let set = std::mem::take(&mut state.summaries);
                    state.summaries = collapse(&ctx, set, budget, state.iteration).await?;
                    self.advance(state, PipelineStage::Routing)?;
                }
                PipelineStage::Finalizing => {
                    let reduced = finalize(&ctx, &state.summaries, budget).await?;
                    debug!(
                        "Final summary took {} attempts over {} summaries",
                        reduced.attempts,
                        state.summaries.len()
                    );
                    self.advance(state, PipelineStage::Done)?;
                    return Ok(reduced.document);
                }
                stage @ (PipelineStage::Start | PipelineStage::Done | PipelineStage::Failed) => {
                    return Err(SummarizeError::Internal(format!(
                        "pipeline loop reached {stage}"
                    )));
                }
            }
        }
    }

    /// Turn the drive result into the run's single [`RunResult`].
    fn finish(
        &self,
        mut state: PipelineState,
        documents: usize,
        started_at: String,
        result: Result<Document, SummarizeError>,
    ) -> RunResult {
        match result {
            Ok(summary) => {
                let tokens = summary.token_count(self.counter.as_ref());
                let elapsed_ms = state.elapsed_ms();
                self.events.on_event(&PipelineEvent::Finished {
                    run_id: &state.run_id,
                    tokens,
                    budget: state.budget,
                    elapsed_ms,
                });
                Ok(SummaryOutput {
                    budget: state.budget,
                    chunks: state.chunks,
                    collapse_rounds: state.iteration,
                    run_id: std::mem::take(&mut state.run_id),
                    summary: summary.into_text(),
                    tokens,
                    documents,
                    transitions: state.into_transitions(),
                    started_at,
                    elapsed_ms,
                })
            }
            Err(error) => {
                if !state.stage().is_terminal() {
                    // Failed is reachable from every live stage.
                    let _ = self.advance(&mut state, PipelineStage::Failed);
                }
                self.events.on_event(&PipelineEvent::Failed {
                    run_id: &state.run_id,
                    error: &error,
                });
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::retry::RetryConfig;
    use crate::reduce::{FnReducer, ReduceRequest, ReduceStage};
    use crate::text::WordCounter;
    use std::sync::Mutex;

    fn words(n: usize) -> String {
        "w ".repeat(n).trim_end().to_string()
    }

    fn summarizer(reducer: FnReducer) -> Summarizer {
        Summarizer::new(
            Arc::new(reducer),
            Arc::new(WordCounter),
            SummarizerConfig::default().with_retry(RetryConfig::immediate(3)),
        )
    }

    #[tokio::test]
    async fn records_every_transition() {
        let s = summarizer(FnReducer::new("fit", |_| async { Ok(words(3)) }));
        let out = s.summarize(vec![words(50)], 10).await.unwrap();
        let path: Vec<PipelineStage> = out.transitions.iter().map(|t| t.to).collect();
        assert_eq!(
            path,
            vec![
                PipelineStage::Mapping,
                PipelineStage::Collecting,
                PipelineStage::Routing,
                PipelineStage::Finalizing,
                PipelineStage::Done,
            ]
        );
        assert_eq!(out.tokens, 3);
        assert_eq!(out.documents, 1);
        assert!(out.chunks >= 2);
    }

    #[tokio::test]
    async fn failure_emits_failed_transition_and_event() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let s = summarizer(FnReducer::new("big", |_| async { Ok(words(100)) }))
            .with_event_handler(crate::pipeline::events::FnEventHandler::new(move |e| {
                let tag = match e {
                    PipelineEvent::Transition { to, .. } => format!("to:{to}"),
                    PipelineEvent::Failed { error, .. } => format!("failed:{}", error.kind()),
                    _ => return,
                };
                log.lock().unwrap().push(tag);
            }));

        let err = s.summarize(vec![words(5)], 10).await.unwrap_err();
        assert!(matches!(
            err,
            SummarizeError::ConvergenceFailure {
                stage: ReduceStage::Map,
                ..
            }
        ));
        let seen = seen.lock().unwrap();
        assert_eq!(
            seen.as_slice(),
            ["to:mapping", "to:failed", "failed:convergence_failure"]
        );
    }

    #[tokio::test]
    async fn zero_budget_is_rejected_before_any_call() {
        let s = summarizer(FnReducer::new("unused", |_: ReduceRequest| async {
            Err("should not be called".to_string())
        }));
        let err = s.summarize(vec!["text".into()], 0).await.unwrap_err();
        assert!(matches!(err, SummarizeError::InvalidBudget { budget: 0 }));
    }

    #[tokio::test]
    async fn combine_with_only_blank_summaries_is_empty_input() {
        let s = summarizer(FnReducer::new("unused", |_| async { Ok(String::new()) }));
        let err = s.combine(vec![" ".into(), String::new()], 10).await.unwrap_err();
        assert!(matches!(err, SummarizeError::EmptyInput));
    }
}
