//! API interaction layer: HTTP client, retry classification, model routing,
//! and usage accounting.
//!
//! - [`client`]: [`OpenRouterClient`] for chat completions.
//! - [`retry`]: transient error detection (429, 5xx, network timeouts) with
//!   configurable exponential backoff and jitter. Never retries 400/401 errors.
//! - [`router`]: [`ModelRouting`] for per-stage model selection.
//! - [`usage`]: run ids, per-model pricing tables, and the cumulative
//!   [`UsageTracker`].

pub mod client;
pub mod retry;
pub mod router;
pub mod usage;

pub use client::{ChatCompletion, ChatRequest, Message, MessageRole, OpenRouterClient, UsageInfo};
pub use retry::RetryConfig;
pub use router::ModelRouting;
pub use usage::{UsageTracker, generate_run_id, pricing_for_model};
