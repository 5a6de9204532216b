//! Overlapping, token-bounded windows over one document.
//!
//! Windows break on whitespace. A run of non-whitespace longer than the chunk
//! size is cut on character boundaries. No emitted chunk exceeds the chunk
//! size as measured by the configured [`TokenCounter`].

use std::sync::Arc;

use tracing::trace;

use super::tokens::TokenCounter;

pub struct Chunker {
    counter: Arc<dyn TokenCounter>,
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a chunker. `chunk_size` is at least 1; an overlap that would
    /// stop windows from advancing is clamped to half the chunk size.
    pub fn new(counter: Arc<dyn TokenCounter>, chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        let overlap = if overlap >= chunk_size {
            chunk_size / 2
        } else {
            overlap
        };
        Self {
            counter,
            chunk_size,
            overlap,
        }
    }

    /// Chunker sized for a summary budget: windows of `budget * multiplier`.
    pub fn for_budget(
        counter: Arc<dyn TokenCounter>,
        budget: usize,
        multiplier: usize,
        overlap: usize,
    ) -> Self {
        Self::new(counter, budget.saturating_mul(multiplier.max(1)), overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` into ordered windows covering the whole document.
    /// Empty or whitespace-only input yields no chunks.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let mut pieces: Vec<&str> = Vec::new();
        for piece in text.split_inclusive(char::is_whitespace) {
            self.push_piece(piece, &mut pieces);
        }
        let sizes: Vec<usize> = pieces.iter().map(|p| self.counter.count(p)).collect();

        let mut chunks = Vec::new();
        let mut start = 0;
        while start < pieces.len() {
            let mut end = start;
            let mut sum = 0;
            while end < pieces.len() && (end == start || sum + sizes[end] <= self.chunk_size) {
                sum += sizes[end];
                end += 1;
            }

            // Per-piece counts need not add up exactly for subword
            // tokenizers, so re-measure the joined window.
            let mut window: String = pieces[start..end].concat();
            while end > start + 1 && self.counter.count(&window) > self.chunk_size {
                end -= 1;
                let keep = window.len() - pieces[end].len();
                window.truncate(keep);
            }

            let trimmed = window.trim();
            if !trimmed.is_empty() {
                chunks.push(trimmed.to_string());
            }
            if end >= pieces.len() {
                break;
            }

            let mut next = end;
            let mut carried = 0;
            while next > start + 1 && carried + sizes[next - 1] <= self.overlap {
                carried += sizes[next - 1];
                next -= 1;
            }
            start = next;
        }

        trace!(
            "Chunked {} pieces into {} windows (size={}, overlap={})",
            pieces.len(),
            chunks.len(),
            self.chunk_size,
            self.overlap
        );
        chunks
    }

    /// Push `piece`, halving it on char boundaries until each part fits.
    fn push_piece<'a>(&self, piece: &'a str, out: &mut Vec<&'a str>) {
        let chars = piece.chars().count();
        if chars <= 1 || self.counter.count(piece) <= self.chunk_size {
            out.push(piece);
            return;
        }
        let mid = piece
            .char_indices()
            .nth(chars / 2)
            .map_or(piece.len(), |(i, _)| i);
        let (head, tail) = piece.split_at(mid);
        self.push_piece(head, out);
        self.push_piece(tail, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::tokens::{CharEstimateCounter, WordCounter};

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    fn word_chunker(size: usize, overlap: usize) -> Chunker {
        Chunker::new(Arc::new(WordCounter), size, overlap)
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        let chunker = word_chunker(10, 2);
        assert!(chunker.split("").is_empty());
        assert!(chunker.split(" \n\t ").is_empty());
    }

    #[test]
    fn short_document_is_one_chunk() {
        let chunker = word_chunker(10, 2);
        assert_eq!(chunker.split("just a few words"), vec!["just a few words"]);
    }

    #[test]
    fn windows_overlap_and_cover_document() {
        let chunker = word_chunker(10, 3);
        let chunks = chunker.split(&words(100));

        assert!(chunks[0].starts_with("w0 "));
        assert!(chunks[0].ends_with(" w9"));
        assert!(chunks[1].starts_with("w7 "));
        assert!(chunks.last().unwrap().ends_with("w99"));
        assert_eq!(chunks.len(), 14);
        for chunk in &chunks {
            assert!(WordCounter.count(chunk) <= 10, "oversized chunk: {chunk}");
        }
    }

    #[test]
    fn zero_overlap_partitions_exactly() {
        let chunker = word_chunker(5, 0);
        let chunks = chunker.split(&words(12));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1], "w5 w6 w7 w8 w9");
        assert_eq!(chunks[2], "w10 w11");
    }

    #[test]
    fn overlap_not_smaller_than_size_is_clamped() {
        let chunker = word_chunker(4, 10);
        assert_eq!(chunker.overlap(), 2);
        let chunks = chunker.split(&words(10));
        assert!(chunks.len() > 1);
        assert!(chunks.last().unwrap().ends_with("w9"));
    }

    #[test]
    fn long_token_is_split_on_char_boundaries() {
        let chunker = Chunker::new(Arc::new(CharEstimateCounter::new(1.0)), 4, 0);
        let text = "ééééééééééé";
        let chunks = chunker.split(text);
        assert!(chunks.len() >= 3);
        assert_eq!(chunks.concat(), text);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 4);
        }
    }

    #[test]
    fn for_budget_multiplies_size() {
        let chunker = Chunker::for_budget(Arc::new(WordCounter), 1000, 4, 100);
        assert_eq!(chunker.chunk_size(), 4000);
        assert_eq!(chunker.overlap(), 100);
    }
}
