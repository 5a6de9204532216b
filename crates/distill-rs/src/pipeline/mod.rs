//! The map-reduce summarization pipeline.
//!
//! - [`orchestrator`]: [`Summarizer`], the state-machine driver, and the
//!   [`SummaryOutput`] it returns.
//! - [`stages`]: map, collect, route, collapse and finalize, all built on
//!   the bounded [`reduce_to_budget`](stages::reduce_to_budget) loop.
//! - [`state`]: [`PipelineStage`], the legal transition table and the
//!   per-run [`PipelineState`].
//! - [`fanout`]: index-ordered fan-out/fan-in over a `JoinSet`.
//! - [`document`]: [`Document`] and [`WorkingSet`].
//! - [`events`]: [`PipelineEvent`] and handlers.
//! - [`config`]: [`SummarizerConfig`].

pub mod config;
pub mod document;
pub mod events;
pub mod fanout;
pub mod orchestrator;
pub mod stages;
pub mod state;

pub use config::SummarizerConfig;
pub use document::{Document, WorkingSet};
pub use events::{
    CompositeEventHandler, EventHandler, FnEventHandler, LoggingHandler, NoopHandler,
    PipelineEvent, Route,
};
pub use orchestrator::{Summarizer, SummaryOutput};
pub use state::{PipelineStage, PipelineState, TransitionRecord};
