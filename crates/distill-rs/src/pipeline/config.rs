//! Run configuration for [`Summarizer`](super::Summarizer).

use std::time::Duration;

use crate::api::retry::RetryConfig;

/// Knobs for one summarizer. Cheap to clone; shared by every run.
///
/// ```ignore
/// let config = SummarizerConfig::default()
///     .with_max_collapse_rounds(4)
///     .with_retry(RetryConfig::with_attempts(3))
///     .with_max_concurrency(16);
/// ```
#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    /// Ceiling on `Routing -> Collapsing` iterations before the run fails.
    pub max_collapse_rounds: u32,
    /// Attempt cap and backoff for every reducer call.
    pub retry: RetryConfig,
    /// Chunk window is `budget * chunk_multiplier` tokens.
    pub chunk_multiplier: usize,
    /// Tokens shared between consecutive chunks.
    pub chunk_overlap: usize,
    /// Reducer calls in flight at once.
    pub max_concurrency: usize,
    /// Per-call timeout. A timeout counts as a failed attempt.
    pub reduce_timeout: Duration,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            max_collapse_rounds: 10,
            retry: RetryConfig::default(),
            chunk_multiplier: 4,
            chunk_overlap: 100,
            max_concurrency: 8,
            reduce_timeout: Duration::from_secs(120),
        }
    }
}

impl SummarizerConfig {
    pub fn with_max_collapse_rounds(mut self, rounds: u32) -> Self {
        self.max_collapse_rounds = rounds;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Shorthand for changing only the attempt cap.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.retry.max_attempts = attempts;
        self
    }

    pub fn with_chunking(mut self, multiplier: usize, overlap: usize) -> Self {
        self.chunk_multiplier = multiplier;
        self.chunk_overlap = overlap;
        self
    }

    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n.max(1);
        self
    }

    pub fn with_reduce_timeout(mut self, timeout: Duration) -> Self {
        self.reduce_timeout = timeout;
        self
    }
}
