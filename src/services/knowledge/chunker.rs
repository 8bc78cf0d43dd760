//! Text Chunker
//!
//! Splits text into bounded, optionally overlapping windows measured in
//! characters (never splitting a UTF-8 sequence). Two modes are used:
//!
//! - coding: fixed-size, non-overlapping segments for documents above the
//!   coding threshold, each coded independently
//! - retrieval: smaller windows with a fixed overlap, tagged with the
//!   source document id so search hits map back to documents
//!
//! ## Usage
//!
//! ```rust,ignore
//! let chunker = TextChunker::new(100, 0);
//! let pieces: Vec<&str> = chunker.chunks(&text).collect();
//! assert_eq!(pieces.concat(), text);
//! ```

use serde::{Deserialize, Serialize};

use crate::models::settings::{PipelineParams, RetrievalParams};
use theory_cascade_core::Document;

/// A retrieval chunk produced by splitting a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk identifier ("{document_id}:{index}").
    pub chunk_id: String,
    /// ID of the source document.
    pub document_id: String,
    /// Text content of this chunk.
    pub content: String,
    /// Zero-based index of this chunk within the document.
    pub index: usize,
    /// Character offset of this chunk's start within the chunked text.
    pub char_offset: usize,
}

/// Fixed-size character windows with optional overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunker {
    size: usize,
    overlap: usize,
}

impl TextChunker {
    /// `size` of 0 is treated as 1; `overlap` is clamped below `size`.
    pub fn new(size: usize, overlap: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            overlap: overlap.min(size - 1),
        }
    }

    pub fn for_coding(params: &PipelineParams) -> Self {
        Self::new(params.coding_chunk_size, 0)
    }

    pub fn for_retrieval(params: &RetrievalParams) -> Self {
        Self::new(params.chunk_size, params.chunk_overlap)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Characters between the starts of consecutive windows.
    fn step(&self) -> usize {
        self.size - self.overlap
    }

    /// Lazily split `text`. Clone the iterator (or call again) to restart.
    pub fn chunks<'a>(&self, text: &'a str) -> TextChunks<'a> {
        TextChunks {
            text,
            pos: 0,
            size: self.size,
            step: self.step(),
            done: text.is_empty(),
        }
    }

    /// Split a document for retrieval, tagging every chunk with its source.
    ///
    /// The title is prepended so short documents still match on it.
    pub fn chunk_document(&self, document: &Document) -> Vec<Chunk> {
        let text = if document.title.is_empty() {
            document.full_text.clone()
        } else {
            format!("{} {}", document.title, document.full_text)
        };
        let step = self.step();
        self.chunks(&text)
            .enumerate()
            .map(|(index, content)| Chunk {
                chunk_id: format!("{}:{}", document.id, index),
                document_id: document.id.clone(),
                content: content.to_string(),
                index,
                char_offset: index * step,
            })
            .collect()
    }
}

/// Segments to code for one document body: the whole text when it is at or
/// below the coding threshold, otherwise fixed-size coding chunks.
pub fn coding_segments<'a>(text: &'a str, params: &PipelineParams) -> Vec<&'a str> {
    if text.chars().count() > params.coding_chunk_threshold {
        TextChunker::for_coding(params).chunks(text).collect()
    } else if text.is_empty() {
        Vec::new()
    } else {
        vec![text]
    }
}

/// Iterator over the windows of one text.
#[derive(Debug, Clone)]
pub struct TextChunks<'a> {
    text: &'a str,
    /// Byte offset of the next window.
    pos: usize,
    size: usize,
    step: usize,
    done: bool,
}

/// Byte length of the first `n` chars of `s` (or all of `s`).
fn byte_len_of_chars(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

impl<'a> Iterator for TextChunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let rest = &self.text[self.pos..];
        let end = byte_len_of_chars(rest, self.size);
        let chunk = &rest[..end];

        if self.pos + end >= self.text.len() {
            self.done = true;
        } else {
            self.pos += byte_len_of_chars(rest, self.step);
        }
        Some(chunk)
    }
}

impl std::iter::FusedIterator for TextChunks<'_> {}
