//! The text-reduction capability: one or more texts in, one consolidated
//! text out, aiming at a token budget.
//!
//! A [`Reducer`] makes no promise about output size; the pipeline always
//! re-measures and re-invokes. [`LlmReducer`] is the production
//! implementation. [`FnReducer`] wraps a closure, which is how deterministic
//! stubs drive the tests.

pub mod llm;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

pub use llm::{LlmReducer, LlmReducerConfig};

/// Which pipeline step a reduction belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReduceStage {
    /// Summarize one chunk of a source document.
    Map,
    /// Merge a bin of summaries into one.
    Collapse,
    /// Produce the final summary from the whole working set.
    Final,
}

impl fmt::Display for ReduceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReduceStage::Map => "map",
            ReduceStage::Collapse => "collapse",
            ReduceStage::Final => "final",
        })
    }
}

/// Input to one reducer invocation.
#[derive(Debug, Clone)]
pub struct ReduceRequest {
    pub texts: Vec<String>,
    pub budget: usize,
    pub stage: ReduceStage,
}

impl ReduceRequest {
    pub fn new(texts: Vec<String>, budget: usize, stage: ReduceStage) -> Self {
        Self {
            texts,
            budget,
            stage,
        }
    }
}

/// Boxed future returned by [`Reducer::reduce`].
pub type ReduceFuture<'a> = Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>>;

/// Turns a set of texts into one text of roughly `budget` tokens.
///
/// Errors are plain strings and are classified with
/// [`is_permanent_error`](crate::api::retry::is_permanent_error); anything
/// not permanent is retried with backoff.
pub trait Reducer: Send + Sync {
    fn reduce(&self, request: ReduceRequest) -> ReduceFuture<'_>;

    fn name(&self) -> &str {
        "reducer"
    }
}

// ── FnReducer ──────────────────────────────────────────────────────

type ErasedReduceHandler = Box<
    dyn Fn(ReduceRequest) -> Pin<Box<dyn Future<Output = Result<String, String>> + Send>>
        + Send
        + Sync,
>;

/// A closure-based reducer.
///
/// ```ignore
/// let echo = FnReducer::new("echo", |req: ReduceRequest| async move {
///     Ok(req.texts.join(" "))
/// });
/// ```
pub struct FnReducer {
    name: String,
    handler: ErasedReduceHandler,
}

impl FnReducer {
    pub fn new<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(ReduceRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, String>> + Send + 'static,
    {
        Self {
            name: name.into(),
            handler: Box::new(move |req| Box::pin(handler(req))),
        }
    }
}

impl Reducer for FnReducer {
    fn reduce(&self, request: ReduceRequest) -> ReduceFuture<'_> {
        (self.handler)(request)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for FnReducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnReducer")
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fn_reducer_delegates_to_closure() {
        let reducer = FnReducer::new("join", |req: ReduceRequest| async move {
            Ok(format!("{}:{}", req.stage, req.texts.join("+")))
        });
        let out = reducer
            .reduce(ReduceRequest::new(
                vec!["a".into(), "b".into()],
                10,
                ReduceStage::Collapse,
            ))
            .await
            .unwrap();
        assert_eq!(out, "collapse:a+b");
        assert_eq!(reducer.name(), "join");
    }

    #[test]
    fn stage_serializes_lowercase() {
        let json = serde_json::to_string(&ReduceStage::Final).unwrap();
        assert_eq!(json, "\"final\"");
    }
}
