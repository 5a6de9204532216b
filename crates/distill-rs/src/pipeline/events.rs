//! Event handler trait and built-in implementations for observing runs.
//!
//! The [`Summarizer`](super::Summarizer) emits [`PipelineEvent`] values at
//! every state transition, per-chunk completion, routing decision, collapse
//! round, and retry. Events for chunk and bin reductions fire from inside
//! spawned tasks, so handlers must be `Send + Sync`.

use tracing::{debug, info, warn};

use super::state::PipelineStage;
use crate::error::SummarizeError;
use crate::reduce::ReduceStage;

/// Router outcome for one pass over the working set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Collapse,
    Finalize,
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Route::Collapse => "collapse",
            Route::Finalize => "finalize",
        })
    }
}

/// Events emitted during a run.
#[derive(Debug)]
pub enum PipelineEvent<'a> {
    Transition {
        run_id: &'a str,
        from: PipelineStage,
        to: PipelineStage,
        iteration: u32,
    },
    /// All inputs have been split into chunks.
    Chunked {
        documents: usize,
        chunks: usize,
        chunk_size: usize,
    },
    /// One chunk's map summary fits the budget.
    ChunkSummarized {
        document: usize,
        chunk: usize,
        tokens: usize,
        attempts: u32,
    },
    /// A reducer attempt failed or came back over budget.
    ReduceRetry {
        stage: ReduceStage,
        attempt: u32,
        max_attempts: u32,
        reason: &'a str,
    },
    Routed {
        route: Route,
        total_tokens: usize,
        documents: usize,
        budget: usize,
    },
    CollapseRound {
        iteration: u32,
        bins: usize,
        documents_before: usize,
        documents_after: usize,
        tokens_before: usize,
        tokens_after: usize,
    },
    Finished {
        run_id: &'a str,
        tokens: usize,
        budget: usize,
        elapsed_ms: u64,
    },
    Failed {
        run_id: &'a str,
        error: &'a SummarizeError,
    },
}

/// Receives pipeline events. The default implementation ignores them.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &PipelineEvent<'_>) {
        let _ = event;
    }
}

/// Ignores every event.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
pub struct FnEventHandler<F>(F)
where
    F: Fn(&PipelineEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&PipelineEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&PipelineEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &PipelineEvent<'_>) {
        (self.0)(event)
    }
}

/// Dispatches every event to each inner handler in registration order.
#[derive(Default)]
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Add `handler` only when `condition` holds.
    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &PipelineEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// Logs events through `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &PipelineEvent<'_>) {
        match event {
            PipelineEvent::Transition { .. } => {}
            PipelineEvent::Chunked {
                documents,
                chunks,
                chunk_size,
            } => {
                info!("Split {documents} documents into {chunks} chunks of <= {chunk_size} tokens");
            }
            PipelineEvent::ChunkSummarized {
                document,
                chunk,
                tokens,
                attempts,
            } => {
                debug!("doc {document} chunk {chunk}: {tokens} tokens ({attempts} attempts)");
            }
            PipelineEvent::ReduceRetry {
                stage,
                attempt,
                max_attempts,
                reason,
            } => {
                warn!("{stage} attempt {attempt}/{max_attempts} rejected: {reason}");
            }
            PipelineEvent::Routed {
                route,
                total_tokens,
                documents,
                budget,
            } => {
                info!("Route: {route} ({total_tokens} tokens across {documents} summaries, budget {budget})");
            }
            PipelineEvent::CollapseRound {
                iteration,
                bins,
                documents_before,
                documents_after,
                tokens_before,
                tokens_after,
            } => {
                info!(
                    "Collapse round {iteration}: {bins} bins, {documents_before} -> {documents_after} summaries, {tokens_before} -> {tokens_after} tokens"
                );
            }
            PipelineEvent::Finished {
                run_id,
                tokens,
                budget,
                elapsed_ms,
            } => {
                info!("[{run_id}] Summary ready: {tokens}/{budget} tokens in {elapsed_ms}ms");
            }
            PipelineEvent::Failed { run_id, error } => {
                warn!("[{run_id}] Run failed ({}): {error}", error.kind());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn composite_dispatches_to_all() {
        let hits = Arc::new(AtomicUsize::new(0));
        let (a, b) = (hits.clone(), hits.clone());
        let handler = CompositeEventHandler::new()
            .with(FnEventHandler::new(move |_| {
                a.fetch_add(1, Ordering::SeqCst);
            }))
            .with(FnEventHandler::new(move |_| {
                b.fetch_add(1, Ordering::SeqCst);
            }))
            .with_if(false, NoopHandler);

        assert_eq!(handler.len(), 2);
        handler.on_event(&PipelineEvent::Chunked {
            documents: 1,
            chunks: 2,
            chunk_size: 100,
        });
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn logging_handler_accepts_every_event() {
        let err = SummarizeError::EmptyInput;
        LoggingHandler.on_event(&PipelineEvent::Failed {
            run_id: "run-1",
            error: &err,
        });
        LoggingHandler.on_event(&PipelineEvent::Routed {
            route: Route::Finalize,
            total_tokens: 10,
            documents: 1,
            budget: 100,
        });
    }
}
