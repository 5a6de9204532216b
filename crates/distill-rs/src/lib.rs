//! Budget-bounded recursive map-reduce summarization.
//!
//! `distill-rs` turns an arbitrarily long document (or set of documents) into
//! one summary that fits a caller-chosen token budget, using a text generator
//! that can only read bounded inputs. Documents are cut into overlapping
//! chunks, every chunk is summarized in parallel, and the partial summaries
//! are recombined, collapsing them again for as long as they are too large
//! in aggregate.
//!
//! The core guarantees two things regardless of how the generator behaves:
//! a run **terminates** (every reducer call has an attempt cap and the
//! collapse loop has an iteration ceiling), and a successful run's summary
//! **fits the budget** (every reducer output is re-measured before it is
//! accepted).
//!
//! # Getting started
//!
//! ```ignore
//! use distill_rs::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let api_key = std::env::var("OPENROUTER_KEY").map_err(|e| e.to_string())?;
//!     let reducer = LlmReducer::new(OpenRouterClient::new(api_key)?, LlmReducerConfig::default());
//!
//!     let summarizer = Summarizer::new(
//!         Arc::new(reducer),
//!         Arc::new(CharEstimateCounter::default()),
//!         SummarizerConfig::default(),
//!     )
//!     .with_event_handler(LoggingHandler);
//!
//!     let article = WikipediaLoader::new()?
//!         .load("https://en.wikipedia.org/wiki/Nikola_Tesla")
//!         .await?;
//!     let output = summarizer
//!         .summarize(vec![article], 1000)
//!         .await
//!         .map_err(|e| e.to_string())?;
//!
//!     println!("{} ({} tokens)", output.summary, output.tokens);
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Run a summarization:** [`Summarizer`](pipeline::Summarizer) with
//!   [`SummarizerConfig`](pipeline::SummarizerConfig). Use
//!   [`summarize`](pipeline::Summarizer::summarize) for raw documents or
//!   [`combine`](pipeline::Summarizer::combine) for summaries you already have.
//!
//! - **Plug in a generator:** implement [`Reducer`](reduce::Reducer), or wrap
//!   a closure in [`FnReducer`](reduce::FnReducer).
//!   [`LlmReducer`](reduce::LlmReducer) is the OpenRouter-backed default.
//!
//! - **Change how size is measured:** implement
//!   [`TokenCounter`](text::TokenCounter) or pick one of the built-ins with
//!   [`create_counter`](text::create_counter).
//!
//! - **Observe a run:** implement [`EventHandler`](pipeline::EventHandler).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`pipeline`] | State machine, stages, fan-out, events, config |
//! | [`reduce`] | [`Reducer`](reduce::Reducer) capability and the LLM implementation |
//! | [`text`] | Token counters and the chunker |
//! | [`loader`] | File and Wikipedia document loaders |
//! | [`api`] | OpenRouter client, retry classification, model routing, usage accounting |
//! | [`error`] | [`SummarizeError`](error::SummarizeError) |

pub mod api;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod prelude;
pub mod reduce;
pub mod text;

pub use error::{RunResult, SummarizeError};

/// Default model for every reduction stage.
pub const DEFAULT_MODEL: &str = "google/gemini-flash-1.5";
