//! Immutable documents with cached token counts, and the ordered working set.

use std::sync::OnceLock;

use crate::text::TokenCounter;

/// A piece of text with a lazily computed token count.
///
/// Documents are never mutated; a reduction produces a new one.
#[derive(Debug, Clone)]
pub struct Document {
    text: String,
    tokens: OnceLock<usize>,
}

impl Document {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tokens: OnceLock::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Token count, measured on first use and cached.
    pub fn token_count(&self, counter: &dyn TokenCounter) -> usize {
        *self.tokens.get_or_init(|| counter.count(&self.text))
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// Ordered sequence of summaries produced so far.
#[derive(Debug, Clone, Default)]
pub struct WorkingSet {
    docs: Vec<Document>,
}

impl WorkingSet {
    pub fn new(docs: Vec<Document>) -> Self {
        Self { docs }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.docs.iter()
    }

    /// Sum of every element's token count.
    pub fn total_tokens(&self, counter: &dyn TokenCounter) -> usize {
        self.docs.iter().map(|d| d.token_count(counter)).sum()
    }

    pub fn texts(&self) -> Vec<String> {
        self.docs.iter().map(|d| d.text().to_string()).collect()
    }

    pub fn into_docs(self) -> Vec<Document> {
        self.docs
    }
}
