use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};

/// Line prefix that opens a new section of the corpus
pub const DEFAULT_SECTION_MARKER: &str = "### ";

/// Cut points tried inside a section, most preferred first.
/// A hard cut at the size limit is the last resort.
const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// Represents a text chunk with metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// The actual text content of this chunk
    pub text: String,
    /// Starting byte position of this chunk in the original document
    pub start_position: usize,
}

impl TextChunk {
    /// Byte position right after the last byte of this chunk
    pub fn end_position(&self) -> usize {
        self.start_position + self.text.len()
    }
}

/// Chunk size limits, counted in characters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_size: usize,
    pub overlap: usize,
    pub section_marker: String,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        ChunkingConfig {
            max_size: 500,
            overlap: 100,
            section_marker: DEFAULT_SECTION_MARKER.to_string(),
        }
    }
}

impl ChunkingConfig {
    pub fn new(max_size: usize, overlap: usize) -> Result<Self> {
        let config = ChunkingConfig {
            max_size,
            overlap,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(RagError::Config(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if self.overlap >= self.max_size {
            return Err(RagError::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.overlap, self.max_size
            )));
        }
        Ok(())
    }
}

/// Split text into overlapping chunks of at most `config.max_size` characters.
///
/// The text is first cut into sections at every line starting with the
/// section marker; no chunk spans two sections and no overlap crosses a
/// section boundary. Inside a section, consecutive chunks share exactly
/// `config.overlap` characters. A window that holds nothing but whitespace
/// is dropped, leaving a whitespace-only gap between its neighbours.
pub fn split_into_chunks(text: &str, config: &ChunkingConfig) -> Result<Vec<TextChunk>> {
    config.validate()?;

    if text.trim().is_empty() {
        return Err(RagError::EmptyCorpus);
    }

    let mut chunks = Vec::new();
    for (start, end) in section_bounds(text, &config.section_marker) {
        split_section(text, start, end, config, &mut chunks);
    }

    Ok(chunks)
}

/// Byte ranges of the sections of `text`, with whitespace-only sections
/// folded into their neighbour.
fn section_bounds(text: &str, marker: &str) -> Vec<(usize, usize)> {
    let mut starts = vec![0];
    if !marker.is_empty() {
        starts.extend(
            text.match_indices(marker)
                .map(|(pos, _)| pos)
                .filter(|&pos| pos > 0 && text.as_bytes()[pos - 1] == b'\n'),
        );
    }

    let mut bounds: Vec<(usize, usize)> = Vec::new();
    let mut pending_start: Option<usize> = None;

    for (i, &section_start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(text.len());
        let start = pending_start.take().unwrap_or(section_start);

        if text[start..end].trim().is_empty() {
            pending_start = Some(start);
            continue;
        }
        bounds.push((start, end));
    }

    if let Some(start) = pending_start {
        match bounds.last_mut() {
            Some(last) => last.1 = text.len(),
            None => bounds.push((start, text.len())),
        }
    }

    bounds
}

fn split_section(
    text: &str,
    start: usize,
    end: usize,
    config: &ChunkingConfig,
    chunks: &mut Vec<TextChunk>,
) {
    let section = &text[start..end];

    // Byte offset of every char, plus the end of the section
    let boundaries: Vec<usize> = section
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(section.len()))
        .collect();
    let char_count = boundaries.len() - 1;

    let mut push = |from: usize, to: usize| {
        let text = &section[boundaries[from]..boundaries[to]];
        if text.trim().is_empty() {
            return;
        }
        chunks.push(TextChunk {
            text: text.to_string(),
            start_position: start + boundaries[from],
        });
    };

    let mut from = 0;
    while char_count - from > config.max_size {
        let cut = find_cut(section, &boundaries, from, config);
        push(from, cut);
        from = cut - config.overlap;
    }
    push(from, char_count);
}

/// Pick the char index to cut at for a chunk starting at char `from`.
///
/// The cut must land after `from + overlap` so that the next chunk,
/// which starts `overlap` chars before the cut, always advances.
fn find_cut(section: &str, boundaries: &[usize], from: usize, config: &ChunkingConfig) -> usize {
    let min_cut = from + config.overlap + 1;
    let max_cut = from + config.max_size;
    let window_start = boundaries[from];
    let window = &section[window_start..boundaries[max_cut]];

    for separator in SEPARATORS {
        // The last occurrence gives the largest cut, so if it is too
        // early every other occurrence is too.
        let Some(pos) = window.rfind(separator) else {
            continue;
        };
        if let Ok(cut) = boundaries.binary_search(&(window_start + pos + separator.len())) {
            if cut >= min_cut {
                return cut;
            }
        }
    }

    max_cut
}
