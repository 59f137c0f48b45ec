//! Recursive character splitting strategy.
//!
//! Splits on a cascade of separators, preferring the coarsest separator
//! present in the text and recursing with finer ones for oversized pieces.
//! Separators are kept attached to the piece they terminate so no text is
//! lost between chunks.

use crate::chunking::traits::TextSplitter;
use crate::error::{ChunkingError, Result};

/// Separator cascade, coarsest first. The empty string is the terminal
/// fallback that splits at bare character boundaries.
const SEPARATORS: &[&str] = &[
    "\n \n", "\n\n", "\n", ".", "!", "?", " ", ",", "\u{200b}", "\u{ff0c}", "\u{3001}",
    "\u{ff0e}", "\u{3002}", "",
];

/// Recursive character splitter with configurable size and overlap.
#[derive(Debug, Clone)]
pub struct RecursiveCharacterSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveCharacterSplitter {
    /// Creates a splitter with the given chunk size and overlap.
    ///
    /// # Errors
    ///
    /// Returns an error if `chunk_size` is zero or `overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidConfig {
                reason: "chunk_size must be > 0".to_string(),
            }
            .into());
        }
        if chunk_overlap >= chunk_size {
            return Err(ChunkingError::OverlapTooLarge {
                overlap: chunk_overlap,
                size: chunk_size,
            }
            .into());
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Splits `text` on `separator`, keeping the separator attached to the
    /// preceding piece.
    fn split_keep(text: &str, separator: &str) -> Vec<String> {
        let mut pieces = Vec::new();
        let mut rest = text;
        while let Some(pos) = rest.find(separator) {
            let end = pos + separator.len();
            pieces.push(rest[..end].to_string());
            rest = &rest[end..];
        }
        if !rest.is_empty() {
            pieces.push(rest.to_string());
        }
        pieces
    }

    /// Splits `text` into windows of at most `chunk_size` characters at
    /// valid char boundaries. Terminal fallback when no separator matches.
    fn split_chars(&self, text: &str) -> Vec<String> {
        let mut pieces = Vec::new();
        let mut start = 0;
        while start < text.len() {
            let mut end = start;
            let mut taken = 0;
            for (offset, c) in text[start..].char_indices() {
                if taken == self.chunk_size {
                    break;
                }
                end = start + offset + c.len_utf8();
                taken += 1;
            }
            pieces.push(text[start..end].to_string());
            start = end;
        }
        pieces
    }

    /// Greedily merges small pieces into chunks of at most `chunk_size`
    /// characters, carrying over trailing pieces up to `chunk_overlap`
    /// characters into the next chunk.
    fn merge(&self, pieces: &[String], out: &mut Vec<String>) {
        let mut current: Vec<&str> = Vec::new();
        let mut current_len = 0;

        for piece in pieces {
            let piece_len = piece.chars().count();
            if current_len + piece_len > self.chunk_size && !current.is_empty() {
                Self::push_chunk(&current, out);

                // Retain a tail of pieces as overlap for the next chunk
                let mut kept: Vec<&str> = Vec::new();
                let mut kept_len = 0;
                for prev in current.iter().rev() {
                    let prev_len = prev.chars().count();
                    if kept_len + prev_len > self.chunk_overlap {
                        break;
                    }
                    kept.push(prev);
                    kept_len += prev_len;
                }
                kept.reverse();
                current = kept;
                current_len = kept_len;
            }
            current.push(piece);
            current_len += piece_len;
        }

        Self::push_chunk(&current, out);
    }

    fn push_chunk(pieces: &[&str], out: &mut Vec<String>) {
        let chunk = pieces.concat();
        if !chunk.trim().is_empty() {
            out.push(chunk);
        }
    }

    fn split_recursive(&self, text: &str, separators: &[&str], out: &mut Vec<String>) {
        let (index, separator) = separators
            .iter()
            .enumerate()
            .find(|(_, sep)| sep.is_empty() || text.contains(**sep))
            .map_or((separators.len(), ""), |(i, sep)| (i, *sep));
        let remaining = separators.get(index + 1..).unwrap_or(&[]);

        let pieces = if separator.is_empty() {
            self.split_chars(text)
        } else {
            Self::split_keep(text, separator)
        };

        let mut small: Vec<String> = Vec::new();
        for piece in pieces {
            if piece.chars().count() <= self.chunk_size {
                small.push(piece);
            } else {
                if !small.is_empty() {
                    self.merge(&small, out);
                    small.clear();
                }
                if remaining.is_empty() {
                    out.push(piece);
                } else {
                    self.split_recursive(&piece, remaining, out);
                }
            }
        }
        if !small.is_empty() {
            self.merge(&small, out);
        }
    }
}

impl TextSplitter for RecursiveCharacterSplitter {
    fn split(&self, text: &str) -> Result<Vec<String>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let mut chunks = Vec::new();
        self.split_recursive(text, SEPARATORS, &mut chunks);
        Ok(chunks)
    }

    fn name(&self) -> &'static str {
        "RecursiveCharacterTextSplitter"
    }
}
