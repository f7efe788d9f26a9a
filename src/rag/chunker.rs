//! Fixed-window text segmentation.
//!
//! Lengths are counted in Unicode scalar values, so a window never splits a
//! multi-byte character.

use super::error::RagError;
use crate::core::config::defaults::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};

#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    default_size: usize,
    default_overlap: usize,
}

impl TextChunker {
    /// Zero values fall back to the built-in defaults (500 / 50).
    pub fn new(default_size: usize, default_overlap: usize) -> Self {
        Self {
            default_size: if default_size == 0 {
                DEFAULT_CHUNK_SIZE
            } else {
                default_size
            },
            default_overlap: if default_overlap == 0 {
                DEFAULT_CHUNK_OVERLAP
            } else {
                default_overlap
            },
        }
    }

    pub fn default_size(&self) -> usize {
        self.default_size
    }

    pub fn default_overlap(&self) -> usize {
        self.default_overlap
    }

    /// Splits `text` into consecutive windows of `size` chars.
    ///
    /// `size == 0` uses the configured default. Concatenating the output
    /// reproduces `text` exactly.
    pub fn chunk(&self, text: &str, size: usize) -> Vec<String> {
        let size = self.resolve_size(size);
        split_windows(text, size, size)
    }

    /// Splits `text` into windows of `size` chars, each starting
    /// `size - overlap` chars after the previous one.
    ///
    /// Zero arguments use the configured defaults. An overlap that is not
    /// smaller than the window would never advance and is rejected.
    pub fn chunk_with_overlap(
        &self,
        text: &str,
        size: usize,
        overlap: usize,
    ) -> Result<Vec<String>, RagError> {
        let size = self.resolve_size(size);
        let overlap = if overlap == 0 {
            self.default_overlap
        } else {
            overlap
        };

        if overlap >= size {
            return Err(RagError::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap, size
            )));
        }

        Ok(split_windows(text, size, size - overlap))
    }

    fn resolve_size(&self, size: usize) -> usize {
        if size == 0 {
            self.default_size
        } else {
            size
        }
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

fn split_windows(text: &str, size: usize, step: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let total_chars = chars.len();

    if total_chars == 0 {
        return Vec::new();
    }
    if total_chars <= size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::with_capacity(total_chars / step + 1);
    let mut start = 0;
    loop {
        let end = (start + size).min(total_chars);
        chunks.push(chars[start..end].iter().collect());
        if end == total_chars {
            break;
        }
        start += step;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn char_len(s: &str) -> usize {
        s.chars().count()
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunker = TextChunker::default();
        assert_eq!(chunker.chunk("hello", 10), vec!["hello"]);
        assert_eq!(chunker.chunk("exactly10!", 10), vec!["exactly10!"]);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunker = TextChunker::default();
        assert!(chunker.chunk("", 10).is_empty());
        assert!(chunker.chunk_with_overlap("", 10, 2).unwrap().is_empty());
    }

    #[test]
    fn chunks_reconstruct_text_and_are_full_size_except_last() {
        let chunker = TextChunker::default();
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(7);

        for size in [1, 3, 10, 44, 45, 46, 100] {
            let chunks = chunker.chunk(&text, size);
            assert_eq!(chunks.concat(), text, "size {size}");
            let (last, rest) = chunks.split_last().unwrap();
            assert!(rest.iter().all(|c| char_len(c) == size), "size {size}");
            assert!(char_len(last) <= size && !last.is_empty());
        }
    }

    #[test]
    fn counts_code_points_not_bytes() {
        let chunker = TextChunker::default();
        let text = "知识库问答助手".repeat(3); // 21 chars, 63 bytes
        let chunks = chunker.chunk(&text, 10);

        assert_eq!(chunks.len(), 3);
        assert_eq!(char_len(&chunks[0]), 10);
        assert_eq!(char_len(&chunks[2]), 1);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn zero_size_uses_configured_default() {
        let chunker = TextChunker::new(4, 1);
        assert_eq!(chunker.chunk("abcdefghij", 0), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn overlap_windows_advance_by_size_minus_overlap() {
        let chunker = TextChunker::default();
        let chunks = chunker.chunk_with_overlap("abcdefghij", 4, 1).unwrap();
        assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn overlap_stops_once_the_end_is_covered() {
        let chunker = TextChunker::default();
        let chunks = chunker.chunk_with_overlap("abcdefghijk", 4, 2).unwrap();
        assert_eq!(chunks, vec!["abcd", "cdef", "efgh", "ghij", "ijk"]);
    }

    #[test]
    fn overlap_not_smaller_than_size_is_a_config_error() {
        let chunker = TextChunker::default();
        assert!(matches!(
            chunker.chunk_with_overlap("abcdefghij", 4, 4),
            Err(RagError::Config(_))
        ));
        assert!(matches!(
            chunker.chunk_with_overlap("abcdefghij", 4, 9),
            Err(RagError::Config(_))
        ));
    }

    #[test]
    fn zero_overlap_uses_configured_default() {
        let chunker = TextChunker::new(500, 2);
        let chunks = chunker.chunk_with_overlap("abcdefghij", 5, 0).unwrap();
        assert_eq!(chunks, vec!["abcde", "defgh", "ghij"]);
    }
}
