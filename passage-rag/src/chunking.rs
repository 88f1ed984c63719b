//! Text chunking.
//!
//! This module provides the [`Chunker`] trait and the
//! [`SentenceWindowChunker`], which slides a fixed-size character window
//! over whitespace-normalised text and pulls each cut back to the nearest
//! sentence boundary inside the window.
//!
//! All sizes and offsets count characters, not bytes.

use crate::error::{RagError, Result};

/// A chunk of normalised text together with its exact location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    /// The chunk text, trimmed.
    pub text: String,
    /// Char offset of the first character in the normalised text.
    pub char_start: usize,
    /// Char offset one past the last character in the normalised text.
    pub char_end: usize,
}

/// A strategy for splitting text into passages.
pub trait Chunker: Send + Sync {
    /// Split `text` into ordered spans.
    ///
    /// Offsets refer to [`normalize_whitespace`]`(text)`. Returns an empty
    /// `Vec` if the text is empty or whitespace only.
    fn chunk(&self, text: &str) -> Vec<TextSpan>;

    /// Window size in characters.
    fn chunk_size(&self) -> usize;

    /// Overlap between consecutive windows in characters.
    fn overlap(&self) -> usize;
}

/// Collapse every whitespace run to a single space and trim both ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits text into overlapping windows that prefer to end on a sentence.
///
/// For a window that does not reach the end of the text, the chunker looks
/// backwards from the window end for `. `, `! `, `? ` or a newline and
/// shortens the window to end just after the terminator. The next window
/// starts `overlap` characters before the previous one ended, skipping a
/// space it lands on. If snapping would stop the start from advancing, the
/// hard cut is used instead.
///
/// # Example
///
/// ```rust,ignore
/// use passage_rag::{Chunker, SentenceWindowChunker};
///
/// let chunker = SentenceWindowChunker::new(500, 50)?;
/// let spans = chunker.chunk(&text);
/// ```
#[derive(Debug, Clone)]
pub struct SentenceWindowChunker {
    chunk_size: usize,
    overlap: usize,
}

impl SentenceWindowChunker {
    /// Create a new `SentenceWindowChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ChunkingError`] unless `0 < overlap < chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if overlap == 0 || overlap >= chunk_size {
            return Err(RagError::ChunkingError(format!(
                "overlap ({overlap}) must satisfy 0 < overlap < chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, overlap })
    }
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Position just after the last sentence boundary in `chars[start..end]`.
fn sentence_boundary(chars: &[char], start: usize, end: usize) -> Option<usize> {
    (start..end).rev().find_map(|i| {
        let two_char = i + 1 < end && is_terminator(chars[i]) && chars[i + 1] == ' ';
        (two_char || chars[i] == '\n').then_some(i + 1)
    })
}

impl Chunker for SentenceWindowChunker {
    fn chunk(&self, text: &str) -> Vec<TextSpan> {
        let normalized = normalize_whitespace(text);
        let chars: Vec<char> = normalized.chars().collect();
        let len = chars.len();

        let mut spans = Vec::new();
        let mut start = 0;

        while start < len {
            let hard_end = (start + self.chunk_size).min(len);
            let mut end = hard_end;

            if hard_end < len {
                if let Some(snapped) = sentence_boundary(&chars, start, hard_end) {
                    // Keep the snap only if the next window still moves forward.
                    if snapped.saturating_sub(self.overlap) > start {
                        end = snapped;
                    }
                }
            }

            // Windows always open on a non-space, so `start` is the span start.
            let trailing = chars[start..end].iter().rev().take_while(|c| c.is_whitespace()).count();
            let char_end = end - trailing;
            if start < char_end {
                spans.push(TextSpan {
                    text: chars[start..char_end].iter().collect(),
                    char_start: start,
                    char_end,
                });
            }

            if end >= len {
                break;
            }
            start = end - self.overlap;
            while start < len && chars[start].is_whitespace() {
                start += 1;
            }
        }

        spans
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn overlap(&self) -> usize {
        self.overlap
    }
}

/// Split `text` into overlapping chunk strings.
///
/// # Errors
///
/// Returns [`RagError::ChunkingError`] unless `0 < overlap < chunk_size`.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    let chunker = SentenceWindowChunker::new(chunk_size, overlap)?;
    Ok(chunker.chunk(text).into_iter().map(|span| span.text).collect())
}
