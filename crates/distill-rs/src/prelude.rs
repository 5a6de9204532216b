//! Convenience re-exports for common `distill-rs` types.
//!
//! ```ignore
//! use distill_rs::prelude::*;
//! ```
//!
//! Stage internals (bin planning, the fan-out helper, the state table) are
//! left out; import those from their modules directly.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::error::{RunResult, SummarizeError};
pub use crate::pipeline::{
    CompositeEventHandler, EventHandler, FnEventHandler, LoggingHandler, NoopHandler,
    PipelineEvent, PipelineStage, Summarizer, SummarizerConfig, SummaryOutput,
};

// ── Reduction ───────────────────────────────────────────────────────
pub use crate::reduce::{
    FnReducer, LlmReducer, LlmReducerConfig, ReduceRequest, ReduceStage, Reducer,
};

// ── Text ────────────────────────────────────────────────────────────
pub use crate::text::{CharEstimateCounter, CounterKind, TokenCounter, WordCounter, create_counter};

// ── Loading and API ─────────────────────────────────────────────────
pub use crate::api::{ModelRouting, OpenRouterClient, RetryConfig};
pub use crate::loader::{DocumentLoader, FileLoader, WikipediaLoader};
