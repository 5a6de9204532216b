//! Token measurement and document chunking.

pub mod chunker;
pub mod tokens;

pub use chunker::Chunker;
pub use tokens::{
    CharEstimateCounter, CounterKind, DEFAULT_CHARS_PER_TOKEN, TokenCounter, WordCounter,
    create_counter,
};
#[cfg(feature = "tiktoken")]
pub use tokens::TiktokenCounter;
