//! Paragraph splitting strategy.
//!
//! Splits on a configurable paragraph separator and packs consecutive
//! paragraphs into chunks up to a maximum size. Oversized single
//! paragraphs are hard-wrapped at character boundaries.

use crate::chunking::traits::TextSplitter;
use crate::error::{ChunkingError, Result};

/// Paragraph-oriented splitter.
#[derive(Debug, Clone)]
pub struct ParagraphSplitter {
    max_chunk_size: usize,
    separator: String,
}

impl ParagraphSplitter {
    /// Creates a splitter with the given maximum chunk size and separator.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_chunk_size` is zero or the separator is
    /// empty.
    pub fn new(max_chunk_size: usize, separator: &str) -> Result<Self> {
        if max_chunk_size == 0 {
            return Err(ChunkingError::InvalidConfig {
                reason: "max_chunk_size must be > 0".to_string(),
            }
            .into());
        }
        if separator.is_empty() {
            return Err(ChunkingError::InvalidConfig {
                reason: "paragraph separator must not be empty".to_string(),
            }
            .into());
        }
        Ok(Self {
            max_chunk_size,
            separator: separator.to_string(),
        })
    }

    /// Hard-wraps an oversized paragraph at character boundaries.
    fn wrap(&self, paragraph: &str, out: &mut Vec<String>) {
        let mut current = String::new();
        let mut current_len = 0;
        for c in paragraph.chars() {
            if current_len == self.max_chunk_size {
                out.push(std::mem::take(&mut current));
                current_len = 0;
            }
            current.push(c);
            current_len += 1;
        }
        if !current.trim().is_empty() {
            out.push(current);
        }
    }
}

impl TextSplitter for ParagraphSplitter {
    fn split(&self, text: &str) -> Result<Vec<String>> {
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_len = 0;

        for paragraph in text.split(&self.separator) {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() {
                continue;
            }
            let paragraph_len = paragraph.chars().count();

            if paragraph_len > self.max_chunk_size {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                self.wrap(paragraph, &mut chunks);
                continue;
            }

            // +separator length when appending to a non-empty chunk
            let added = if current.is_empty() {
                paragraph_len
            } else {
                paragraph_len + self.separator.chars().count()
            };
            if current_len + added > self.max_chunk_size && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if !current.is_empty() {
                current.push_str(&self.separator);
                current_len += self.separator.chars().count();
            }
            current.push_str(paragraph);
            current_len += paragraph_len;
        }

        if !current.is_empty() {
            chunks.push(current);
        }
        Ok(chunks)
    }

    fn name(&self) -> &'static str {
        "ParagraphChunker"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config() {
        assert!(ParagraphSplitter::new(0, "\n\n").is_err());
        assert!(ParagraphSplitter::new(100, "").is_err());
    }

    #[test]
    fn test_single_paragraph() {
        let splitter = ParagraphSplitter::new(100, "\n\n").unwrap();
        let chunks = splitter.split("just one paragraph").unwrap();
        assert_eq!(chunks, vec!["just one paragraph"]);
    }

    #[test]
    fn test_packs_paragraphs_up_to_limit() {
        let splitter = ParagraphSplitter::new(16, "\n\n").unwrap();
        let chunks = splitter.split("aaaa\n\nbbbb\n\ncccc\n\ndddd").unwrap();
        // 4 + 2 + 4 + 2 + 4 = 16 fits exactly; the fourth paragraph spills
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "aaaa\n\nbbbb\n\ncccc");
        assert_eq!(chunks[1], "dddd");
    }

    #[test]
    fn test_oversized_paragraph_wrapped() {
        let splitter = ParagraphSplitter::new(10, "\n\n").unwrap();
        let long = "x".repeat(25);
        let chunks = splitter.split(&long).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 10);
        assert_eq!(chunks[2].len(), 5);
    }

    #[test]
    fn test_blank_paragraphs_dropped() {
        let splitter = ParagraphSplitter::new(100, "\n\n").unwrap();
        let chunks = splitter.split("a\n\n\n\n   \n\nb").unwrap();
        assert_eq!(chunks, vec!["a\n\nb"]);
    }

    #[test]
    fn test_custom_separator() {
        let splitter = ParagraphSplitter::new(3, "---").unwrap();
        let chunks = splitter.split("aa---bb---cc").unwrap();
        assert_eq!(chunks, vec!["aa", "bb", "cc"]);
    }
}
