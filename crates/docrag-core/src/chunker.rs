//! Overlapping character windows sized by a chars-per-token heuristic.
//!
//! No tokenizer is involved: `chars_per_token` is a per-language constant
//! (3.0 works well for Cyrillic prose) that turns token budgets into
//! character counts.

use crate::types::{BuildParams, Chunk, Document};

pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharWindow {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl CharWindow {
    /// Distance between the starts of two consecutive windows.
    pub fn stride(&self) -> usize {
        self.max_chars - self.overlap_chars
    }
}

/// Derive the character window from token counts.
///
/// `overlap_chars` is capped at `max_chars - 1` so the window always advances.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn compute_char_window(target_tokens: usize, overlap_tokens: usize, chars_per_token: f64) -> CharWindow {
    let cpt = if chars_per_token.is_finite() && chars_per_token > 0.0 { chars_per_token } else { DEFAULT_CHARS_PER_TOKEN };
    let max_chars = ((target_tokens as f64 * cpt).round() as usize).max(1);
    let overlap_chars = ((overlap_tokens as f64 * cpt).round() as usize).min(max_chars - 1);
    CharWindow { max_chars, overlap_chars }
}

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    window: CharWindow,
}

impl Chunker {
    pub fn new(window: CharWindow) -> Self {
        let overlap_chars = window.overlap_chars.min(window.max_chars.saturating_sub(1));
        Self { window: CharWindow { max_chars: window.max_chars.max(1), overlap_chars } }
    }

    pub fn from_params(params: &BuildParams) -> Self {
        Self::new(CharWindow { max_chars: params.max_chars, overlap_chars: params.overlap_chars })
    }

    pub fn window(&self) -> CharWindow {
        self.window
    }

    pub fn chunk(&self, doc: &Document) -> Vec<Chunk> {
        chunk_text(&doc.path, &doc.raw_text, self.window)
    }
}

/// Split `text` into windows of `max_chars` characters advancing by
/// `max_chars - overlap_chars`. The last window takes whatever remains, so
/// there is never a trailing chunk made only of overlap.
pub fn chunk_text(doc_path: &str, text: &str, window: CharWindow) -> Vec<Chunk> {
    // Byte offset of every char plus the end, so slicing stays on boundaries.
    let bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
    let len = bounds.len() - 1;
    let stride = window.stride().max(1);

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < len {
        let remaining = len - start;
        let end = if remaining <= window.max_chars { len } else { start + window.max_chars };
        let piece = &text[bounds[start]..bounds[end]];
        let last = end == len;
        if !(last && piece.trim().is_empty()) {
            chunks.push(Chunk {
                doc_path: doc_path.to_string(),
                chunk_index: chunks.len(),
                text: piece.to_string(),
                start_offset: start,
                end_offset: end,
            });
        }
        if last {
            break;
        }
        start += stride;
    }
    chunks
}
