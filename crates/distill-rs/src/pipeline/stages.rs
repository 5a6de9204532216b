//! The individual pipeline stages: map, collect, route, collapse, finalize.
//!
//! Every reducer call goes through [`reduce_to_budget`], which re-measures
//! the output and re-invokes the reducer until the output fits or the
//! attempt cap runs out. Nothing over budget ever leaves this module.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::document::{Document, WorkingSet};
use super::events::{EventHandler, PipelineEvent, Route};
use super::fanout::FanOut;
use crate::api::retry::{RetryConfig, is_permanent_error, is_transient_error};
use crate::error::SummarizeError;
use crate::reduce::{ReduceRequest, ReduceStage, Reducer};
use crate::text::{Chunker, TokenCounter};

/// Shared handles every stage needs. Cloned into each spawned task.
#[derive(Clone)]
pub struct StageContext {
    pub reducer: Arc<dyn Reducer>,
    pub counter: Arc<dyn TokenCounter>,
    pub events: Arc<dyn EventHandler>,
    pub retry: RetryConfig,
    pub timeout: Duration,
    pub limiter: Arc<Semaphore>,
}

/// A budget-compliant reducer output.
#[derive(Debug)]
pub struct Reduced {
    pub document: Document,
    pub attempts: u32,
}

enum Rejection {
    Oversized(usize),
    Upstream { message: String, transient: bool },
}

// ── Bounded reduce ─────────────────────────────────────────────────

/// Invoke the reducer until its output is within `request.budget`.
///
/// Attempts are stateless re-invocations with the same request. Transient
/// failures (429, 5xx, network errors, timeouts) back off first. Oversized
/// output and other non-permanent failures, such as a malformed or empty
/// response, are retried immediately. Permanent upstream failures end the
/// loop at once.
pub async fn reduce_to_budget(
    ctx: &StageContext,
    request: ReduceRequest,
) -> Result<Reduced, SummarizeError> {
    let stage = request.stage;
    let budget = request.budget;
    let max_attempts = ctx.retry.attempts();
    let mut last = Rejection::Upstream {
        message: String::from("no attempt made"),
        transient: false,
    };

    for attempt in 1..=max_attempts {
        let outcome = {
            let _permit = ctx
                .limiter
                .acquire()
                .await
                .map_err(|e| SummarizeError::Internal(format!("reducer limiter closed: {e}")))?;
            tokio::time::timeout(ctx.timeout, ctx.reducer.reduce(request.clone())).await
        };

        last = match outcome {
            Ok(Ok(text)) => {
                let document = Document::new(text);
                let tokens = document.token_count(ctx.counter.as_ref());
                if tokens <= budget {
                    debug!("{stage} reduction fits: {tokens}/{budget} tokens (attempt {attempt})");
                    return Ok(Reduced {
                        document,
                        attempts: attempt,
                    });
                }
                Rejection::Oversized(tokens)
            }
            Ok(Err(e)) if is_permanent_error(&e) => {
                warn!("{stage} reducer failed permanently: {e}");
                return Err(SummarizeError::UpstreamGeneration {
                    stage,
                    attempts: attempt,
                    message: e,
                });
            }
            Ok(Err(e)) => Rejection::Upstream {
                transient: is_transient_error(&e),
                message: e,
            },
            Err(_) => Rejection::Upstream {
                message: format!("reducer call timed out after {:?}", ctx.timeout),
                transient: true,
            },
        };

        let reason = match &last {
            Rejection::Oversized(tokens) => format!("{tokens} tokens exceeds budget {budget}"),
            Rejection::Upstream { message, .. } => message.clone(),
        };
        ctx.events.on_event(&PipelineEvent::ReduceRetry {
            stage,
            attempt,
            max_attempts,
            reason: &reason,
        });

        if attempt < max_attempts
            && matches!(
                last,
                Rejection::Upstream {
                    transient: true,
                    ..
                }
            )
        {
            tokio::time::sleep(ctx.retry.delay_for_attempt(attempt - 1)).await;
        }
    }

    Err(match last {
        Rejection::Oversized(tokens) => SummarizeError::ConvergenceFailure {
            stage,
            tokens,
            budget,
            attempts: max_attempts,
        },
        Rejection::Upstream { message, .. } => SummarizeError::UpstreamGeneration {
            stage,
            attempts: max_attempts,
            message,
        },
    })
}

// ── Map ────────────────────────────────────────────────────────────

/// One chunk of one input document.
#[derive(Debug, Clone)]
pub struct ChunkTask {
    pub document: usize,
    pub chunk: usize,
    pub text: String,
}

/// Per-chunk map result, tagged with its position in the input.
#[derive(Debug, Clone)]
pub struct MapOutput {
    pub document: usize,
    pub chunk: usize,
    pub summary: Document,
}

/// Split every input document into chunk tasks, in input order.
pub fn chunk_inputs(inputs: &[String], chunker: &Chunker) -> Vec<ChunkTask> {
    inputs
        .iter()
        .enumerate()
        .flat_map(|(document, text)| {
            chunker
                .split(text)
                .into_iter()
                .enumerate()
                .map(move |(chunk, text)| ChunkTask {
                    document,
                    chunk,
                    text,
                })
        })
        .collect()
}

/// Summarize every chunk concurrently. Fails the whole stage on the first
/// chunk that cannot be brought under budget.
pub async fn map_chunks(
    ctx: &StageContext,
    tasks: Vec<ChunkTask>,
    budget: usize,
) -> Result<Vec<MapOutput>, SummarizeError> {
    let mut fan = FanOut::new("map");
    for task in tasks {
        fan.spawn(map_one(ctx.clone(), task, budget));
    }
    fan.join().await
}

async fn map_one(
    ctx: StageContext,
    task: ChunkTask,
    budget: usize,
) -> Result<MapOutput, SummarizeError> {
    let request = ReduceRequest::new(vec![task.text], budget, ReduceStage::Map);
    let reduced = reduce_to_budget(&ctx, request).await?;
    ctx.events.on_event(&PipelineEvent::ChunkSummarized {
        document: task.document,
        chunk: task.chunk,
        tokens: reduced.document.token_count(ctx.counter.as_ref()),
        attempts: reduced.attempts,
    });
    Ok(MapOutput {
        document: task.document,
        chunk: task.chunk,
        summary: reduced.document,
    })
}

// ── Collect ────────────────────────────────────────────────────────

/// Merge map outputs into one working set ordered by document, then chunk.
pub fn collect(mut outputs: Vec<MapOutput>) -> WorkingSet {
    outputs.sort_by_key(|o| (o.document, o.chunk));
    WorkingSet::new(outputs.into_iter().map(|o| o.summary).collect())
}

// ── Route ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteDecision {
    pub route: Route,
    pub total_tokens: usize,
    pub documents: usize,
}

/// Collapse when the working set averages more than `budget` per summary.
pub fn route(set: &WorkingSet, budget: usize, counter: &dyn TokenCounter) -> RouteDecision {
    let total_tokens = set.total_tokens(counter);
    let documents = set.len();
    let route = if total_tokens > budget.saturating_mul(documents) {
        Route::Collapse
    } else {
        Route::Finalize
    };
    RouteDecision {
        route,
        total_tokens,
        documents,
    }
}

// ── Collapse ───────────────────────────────────────────────────────

/// Greedy sequential bin packing. Bins keep the input order and sum to at
/// most `budget`; a document larger than the budget gets a bin of its own.
pub fn plan_bins(
    docs: Vec<Document>,
    budget: usize,
    counter: &dyn TokenCounter,
) -> Vec<Vec<Document>> {
    let mut bins = Vec::new();
    let mut current: Vec<Document> = Vec::new();
    let mut current_tokens = 0;

    for doc in docs {
        let tokens = doc.token_count(counter);
        if tokens > budget {
            if !current.is_empty() {
                bins.push(std::mem::take(&mut current));
                current_tokens = 0;
            }
            bins.push(vec![doc]);
            continue;
        }
        if !current.is_empty() && current_tokens + tokens > budget {
            bins.push(std::mem::take(&mut current));
            current_tokens = 0;
        }
        current_tokens += tokens;
        current.push(doc);
    }
    if !current.is_empty() {
        bins.push(current);
    }
    bins
}

/// Reduce each bin to one summary, concurrently, preserving bin order.
///
/// A bin holding a single document that already fits is carried forward
/// as is. Fails with [`SummarizeError::CollapseStalled`] when the round
/// shrinks neither the document count nor the token total.
pub async fn collapse(
    ctx: &StageContext,
    set: WorkingSet,
    budget: usize,
    iteration: u32,
) -> Result<WorkingSet, SummarizeError> {
    let counter = ctx.counter.as_ref();
    let documents_before = set.len();
    let tokens_before = set.total_tokens(counter);

    let bins = plan_bins(set.into_docs(), budget, counter);
    let bin_count = bins.len();
    debug!("Collapse round {iteration}: {documents_before} summaries into {bin_count} bins");

    let mut fan = FanOut::new("collapse");
    for bin in bins {
        if let [only] = bin.as_slice()
            && only.token_count(counter) <= budget
        {
            let doc = only.clone();
            fan.spawn(async move { Ok(doc) });
            continue;
        }
        let ctx = ctx.clone();
        let texts = bin.into_iter().map(Document::into_text).collect();
        fan.spawn(async move {
            let request = ReduceRequest::new(texts, budget, ReduceStage::Collapse);
            reduce_to_budget(&ctx, request).await.map(|r| r.document)
        });
    }
    let collapsed = WorkingSet::new(fan.join().await?);

    let documents_after = collapsed.len();
    let tokens_after = collapsed.total_tokens(counter);
    ctx.events.on_event(&PipelineEvent::CollapseRound {
        iteration,
        bins: bin_count,
        documents_before,
        documents_after,
        tokens_before,
        tokens_after,
    });

    if documents_after < documents_before || tokens_after < tokens_before {
        Ok(collapsed)
    } else {
        Err(SummarizeError::CollapseStalled {
            documents: documents_after,
            tokens: tokens_after,
        })
    }
}

// ── Finalize ───────────────────────────────────────────────────────

/// Reduce the whole working set into the final summary.
pub async fn finalize(
    ctx: &StageContext,
    set: &WorkingSet,
    budget: usize,
) -> Result<Reduced, SummarizeError> {
    let request = ReduceRequest::new(set.texts(), budget, ReduceStage::Final);
    reduce_to_budget(ctx, request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::events::NoopHandler;
    use crate::reduce::FnReducer;
    use crate::text::WordCounter;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn words(n: usize) -> String {
        "w ".repeat(n).trim_end().to_string()
    }

    fn context(reducer: FnReducer, attempts: u32) -> StageContext {
        StageContext {
            reducer: Arc::new(reducer),
            counter: Arc::new(WordCounter),
            events: Arc::new(NoopHandler),
            retry: RetryConfig::immediate(attempts),
            timeout: Duration::from_secs(5),
            limiter: Arc::new(Semaphore::new(4)),
        }
    }

    fn set_of(sizes: &[usize]) -> WorkingSet {
        WorkingSet::new(sizes.iter().map(|&n| Document::new(words(n))).collect())
    }

    #[tokio::test]
    async fn fitting_output_returns_first_try() {
        let ctx = context(FnReducer::new("fit", |_| async { Ok(words(5)) }), 3);
        let reduced = reduce_to_budget(&ctx, ReduceRequest::new(vec![], 10, ReduceStage::Map))
            .await
            .unwrap();
        assert_eq!(reduced.attempts, 1);
        assert_eq!(reduced.document.token_count(&WordCounter), 5);
    }

    #[tokio::test]
    async fn oversized_output_is_retried_until_it_fits() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let ctx = context(
            FnReducer::new("shrinking", move |_| {
                let n = c.fetch_add(1, Ordering::SeqCst);
                async move { Ok(words(if n < 2 { 20 } else { 8 })) }
            }),
            5,
        );
        let reduced = reduce_to_budget(&ctx, ReduceRequest::new(vec![], 10, ReduceStage::Map))
            .await
            .unwrap();
        assert_eq!(reduced.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn persistent_oversize_is_a_convergence_failure() {
        let ctx = context(FnReducer::new("big", |_| async { Ok(words(20)) }), 3);
        let err = reduce_to_budget(&ctx, ReduceRequest::new(vec![], 10, ReduceStage::Collapse))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SummarizeError::ConvergenceFailure {
                stage: ReduceStage::Collapse,
                tokens: 20,
                budget: 10,
                attempts: 3
            }
        ));
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let ctx = context(
            FnReducer::new("denied", move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                async { Err("OpenRouter API HTTP 401: unauthorized".to_string()) }
            }),
            5,
        );
        let err = reduce_to_budget(&ctx, ReduceRequest::new(vec![], 10, ReduceStage::Map))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SummarizeError::UpstreamGeneration { attempts: 1, .. }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_errors_exhaust_attempts() {
        let ctx = context(
            FnReducer::new("flaky", |_| async {
                Err("OpenRouter API HTTP 503: unavailable".to_string())
            }),
            3,
        );
        let err = reduce_to_budget(&ctx, ReduceRequest::new(vec![], 10, ReduceStage::Final))
            .await
            .unwrap_err();
        match err {
            SummarizeError::UpstreamGeneration {
                stage,
                attempts,
                message,
            } => {
                assert_eq!(stage, ReduceStage::Final);
                assert_eq!(attempts, 3);
                assert!(message.contains("503"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn timeouts_count_as_attempts() {
        let mut ctx = context(
            FnReducer::new("slow", |_| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(String::new())
            }),
            2,
        );
        ctx.timeout = Duration::from_millis(10);
        let err = reduce_to_budget(&ctx, ReduceRequest::new(vec![], 10, ReduceStage::Map))
            .await
            .unwrap_err();
        match err {
            SummarizeError::UpstreamGeneration { message, .. } => {
                assert!(message.contains("timed out"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    fn fail_once(first: &'static str) -> (FnReducer, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let reducer = FnReducer::new("fail-once", move |_| {
            let n = c.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(first.to_string())
                } else {
                    Ok(words(3))
                }
            }
        });
        (reducer, calls)
    }

    #[tokio::test]
    async fn malformed_response_is_retried_without_backoff() {
        let (reducer, calls) = fail_once("empty LLM response");
        let mut ctx = context(reducer, 3);
        ctx.retry = RetryConfig {
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
            ..RetryConfig::with_attempts(3)
        };
        let reduced = tokio::time::timeout(
            Duration::from_secs(5),
            reduce_to_budget(&ctx, ReduceRequest::new(vec![], 10, ReduceStage::Map)),
        )
        .await
        .expect("non-transient failure should not back off")
        .unwrap();
        assert_eq!(reduced.attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn transient_error_backs_off_before_retrying() {
        let (reducer, calls) = fail_once("OpenRouter API HTTP 429: rate limited");
        let mut ctx = context(reducer, 3);
        ctx.retry = RetryConfig {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(50),
            jitter: false,
            ..RetryConfig::with_attempts(3)
        };
        let started = std::time::Instant::now();
        let reduced = reduce_to_budget(&ctx, ReduceRequest::new(vec![], 10, ReduceStage::Map))
            .await
            .unwrap();
        assert_eq!(reduced.attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn collect_orders_by_document_then_chunk() {
        let out = |document, chunk| MapOutput {
            document,
            chunk,
            summary: Document::new(format!("{document}.{chunk}")),
        };
        let set = collect(vec![out(1, 0), out(0, 1), out(2, 0), out(0, 0)]);
        assert_eq!(set.texts(), vec!["0.0", "0.1", "1.0", "2.0"]);
    }

    #[test]
    fn route_compares_against_budget_per_document() {
        let decision = route(&set_of(&[900, 900, 900]), 1000, &WordCounter);
        assert_eq!(decision.route, Route::Finalize);
        assert_eq!(decision.total_tokens, 2700);

        let decision = route(&set_of(&[1200, 1200, 1200]), 1000, &WordCounter);
        assert_eq!(decision.route, Route::Collapse);
        assert_eq!(decision.documents, 3);
    }

    #[test]
    fn bins_fill_greedily_and_isolate_oversized_docs() {
        let bins = plan_bins(set_of(&[3, 4, 5, 12, 2, 2, 9]).into_docs(), 10, &WordCounter);
        let sizes: Vec<Vec<usize>> = bins
            .iter()
            .map(|b| b.iter().map(|d| d.token_count(&WordCounter)).collect())
            .collect();
        assert_eq!(sizes, vec![vec![3, 4], vec![5], vec![12], vec![2, 2], vec![9]]);
    }

    #[test]
    fn every_over_budget_doc_gets_its_own_bin() {
        let bins = plan_bins(set_of(&[1200, 1200, 1200]).into_docs(), 1000, &WordCounter);
        assert_eq!(bins.len(), 3);
        assert!(bins.iter().all(|b| b.len() == 1));
    }

    #[test]
    fn chunk_inputs_tags_positions() {
        let chunker = Chunker::new(Arc::new(WordCounter), 2, 0);
        let tasks = chunk_inputs(&["a b c".into(), "   ".into(), "d".into()], &chunker);
        let tags: Vec<(usize, usize)> = tasks.iter().map(|t| (t.document, t.chunk)).collect();
        assert_eq!(tags, vec![(0, 0), (0, 1), (2, 0)]);
        assert_eq!(tasks[1].text, "c");
    }

    #[tokio::test]
    async fn collapse_passes_fitting_singletons_through() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let ctx = context(
            FnReducer::new("collapse", move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                async { Ok(words(6)) }
            }),
            3,
        );
        let set = collapse(&ctx, set_of(&[15, 8, 3]), 10, 1).await.unwrap();
        let sizes: Vec<usize> = set.iter().map(|d| d.token_count(&WordCounter)).collect();
        assert_eq!(sizes, vec![6, 8, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn collapse_without_progress_stalls() {
        let ctx = context(
            FnReducer::new("echo", |req: ReduceRequest| async move {
                Ok(req.texts.join(" "))
            }),
            1,
        );
        // Two 4-word docs share a bin; echoing them back yields one 8-word
        // doc, which is progress. A lone fitting doc never shrinks.
        let progressed = collapse(&ctx, set_of(&[4, 4]), 10, 1).await.unwrap();
        assert_eq!(progressed.len(), 1);

        let err = collapse(&ctx, set_of(&[4]), 10, 1).await.unwrap_err();
        assert!(matches!(
            err,
            SummarizeError::CollapseStalled {
                documents: 1,
                tokens: 4
            }
        ));
    }
}
