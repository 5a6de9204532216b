//! Pluggable token counting.
//!
//! Every size decision in the pipeline (chunk windows, per-summary budget
//! checks, the collapse router) goes through a [`TokenCounter`], so the
//! engine's notion of "fits" is whatever the counter says it is.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Characters per token for the estimate counter. Most tokenizers average
/// 3-4 chars per token on English prose.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

/// Measures the size of a text in tokens. Must be pure and deterministic.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
    fn name(&self) -> &str;
}

/// Character-count estimate: `ceil(chars / chars_per_token)`. Fast and
/// dependency-free.
#[derive(Debug, Clone, Copy)]
pub struct CharEstimateCounter {
    chars_per_token: f64,
}

impl CharEstimateCounter {
    pub fn new(chars_per_token: f64) -> Self {
        let chars_per_token = if chars_per_token.is_finite() && chars_per_token > 0.0 {
            chars_per_token
        } else {
            DEFAULT_CHARS_PER_TOKEN
        };
        Self { chars_per_token }
    }
}

impl Default for CharEstimateCounter {
    fn default() -> Self {
        Self::new(DEFAULT_CHARS_PER_TOKEN)
    }
}

impl TokenCounter for CharEstimateCounter {
    fn count(&self, text: &str) -> usize {
        let chars = text.chars().count();
        (chars as f64 / self.chars_per_token).ceil() as usize
    }

    fn name(&self) -> &str {
        "chars"
    }
}

/// Whitespace-separated word count.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordCounter;

impl TokenCounter for WordCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }

    fn name(&self) -> &str {
        "words"
    }
}

/// GPT-2 BPE (`r50k_base`) token count.
#[cfg(feature = "tiktoken")]
pub struct TiktokenCounter {
    bpe: tiktoken_rs::CoreBPE,
}

#[cfg(feature = "tiktoken")]
impl TiktokenCounter {
    pub fn new() -> Result<Self, String> {
        let bpe = tiktoken_rs::r50k_base().map_err(|e| format!("failed to load r50k_base: {e}"))?;
        Ok(Self { bpe })
    }
}

#[cfg(feature = "tiktoken")]
impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    fn name(&self) -> &str {
        "tiktoken"
    }
}

/// Selectable counter implementations, e.g. from a CLI flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CounterKind {
    #[default]
    Chars,
    Words,
    Tiktoken,
}

impl fmt::Display for CounterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CounterKind::Chars => "chars",
            CounterKind::Words => "words",
            CounterKind::Tiktoken => "tiktoken",
        })
    }
}

impl FromStr for CounterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chars" | "char-estimate" => Ok(CounterKind::Chars),
            "words" => Ok(CounterKind::Words),
            "tiktoken" | "gpt2" => Ok(CounterKind::Tiktoken),
            other => Err(format!(
                "unknown tokenizer '{other}' (expected chars, words, or tiktoken)"
            )),
        }
    }
}

/// Build a shared counter of the given kind.
pub fn create_counter(kind: CounterKind) -> Result<Arc<dyn TokenCounter>, String> {
    match kind {
        CounterKind::Chars => Ok(Arc::new(CharEstimateCounter::default())),
        CounterKind::Words => Ok(Arc::new(WordCounter)),
        #[cfg(feature = "tiktoken")]
        CounterKind::Tiktoken => Ok(Arc::new(TiktokenCounter::new()?)),
        #[cfg(not(feature = "tiktoken"))]
        CounterKind::Tiktoken => {
            Err("tiktoken counter requires building with the `tiktoken` feature".into())
        }
    }
}
