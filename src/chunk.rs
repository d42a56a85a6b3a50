//! Sliding-window text chunker with boundary snapping.
//!
//! Splits document text into overlapping [`Chunk`]s of at most `chunk_size`
//! characters. A window that does not reach the end of the text is shortened
//! to end right after the last paragraph, line, or sentence boundary it
//! contains, as long as that boundary lies past 40% of the window. Each
//! following window starts `chunk_overlap` characters before the previous
//! one ended.
//!
//! Offsets and sizes are counted in characters (Unicode scalar values), not
//! bytes, so Cyrillic text is cut at the same positions as Latin text.

use sha2::{Digest, Sha256};
use std::path::Path;

use crate::config::ChunkingConfig;
use crate::extract::{load_document, LoadError};
use crate::models::Chunk;

/// Boundary markers in priority order. The first marker found past the
/// snap threshold wins, even if a lower-priority marker occurs later.
const SEPARATORS: [&str; 5] = [".\n", "\n", ". ", "? ", "! "];

/// A boundary is only used when it lies past this fraction of `chunk_size`.
const SNAP_THRESHOLD: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(1000, 200)
    }
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into chunks labelled with `source`.
    ///
    /// The text is trimmed first; empty text yields no chunks. Chunk indices
    /// are contiguous from 0 and whitespace-only windows are dropped without
    /// consuming an index.
    pub fn split(&self, text: &str, source: &str) -> Vec<Chunk> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let min_cut = self.chunk_size as f64 * SNAP_THRESHOLD;

        let mut chunks = Vec::new();
        let mut start = 0usize;

        while start < len {
            let mut end = (start + self.chunk_size).min(len);
            let mut window: String = chars[start..end].iter().collect();

            if end < len {
                if let Some((byte_cut, char_cut)) = snap_point(&window, min_cut) {
                    window.truncate(byte_cut);
                    end = start + char_cut;
                }
            }

            let clean = window.trim();
            if !clean.is_empty() {
                chunks.push(make_chunk(source, chunks.len(), start, clean));
            }

            if end == len {
                break;
            }
            // An overlap as large as the snapped window would move backwards.
            let next = end.saturating_sub(self.chunk_overlap);
            start = if next > start { next } else { end };
        }

        chunks
    }

    /// Load a document and split it, using its file name as the source label.
    pub fn process_document(&self, path: &Path) -> Result<Vec<Chunk>, LoadError> {
        let text = load_document(path)?;
        Ok(self.split(&text, &document_name(path)))
    }
}

/// Human-readable document name derived from a path (its file name).
pub fn document_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Find where to cut `window`: right after the last occurrence of the first
/// separator whose position (in characters) exceeds `min_cut`.
/// Returns `(byte_len, char_len)` of the shortened window.
fn snap_point(window: &str, min_cut: f64) -> Option<(usize, usize)> {
    for sep in SEPARATORS {
        if let Some(pos) = window.rfind(sep) {
            let char_pos = window[..pos].chars().count();
            if char_pos as f64 > min_cut {
                return Some((pos + sep.len(), char_pos + sep.chars().count()));
            }
        }
    }
    None
}

fn make_chunk(source: &str, index: usize, start: usize, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: format!("{}_chunk_{}", source, index),
        text: text.to_string(),
        source: source.to_string(),
        chunk_index: index,
        start,
        hash,
    }
}
