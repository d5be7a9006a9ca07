//! In-memory vector index over corpus chunks.
//!
//! Vectors are stored L2-normalized, so the similarity score of a query is
//! a plain dot product. Search is a linear scan: a CV yields tens of chunks.
//! Callers go through [`VectorSearch`] so an approximate nearest-neighbour
//! structure can replace the scan once a corpus grows into the thousands.

use crate::chunking::TextChunk;
use crate::embeddings::{dot, normalize, Embedding};
use crate::error::{RagError, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Bumped whenever the persisted layout changes
pub const FORMAT_VERSION: u32 = 1;

/// What an index was built from; used to detect a stale persisted index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub embedding_model: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub section_marker: String,
    pub corpus_sha256: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: TextChunk,
    pub vector: Vec<f32>,
}

/// A chunk returned by a search, with its cosine similarity to the query
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit<'a> {
    pub chunk: &'a TextChunk,
    pub score: f32,
}

/// Nearest-neighbour lookup over chunk vectors
pub trait VectorSearch: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dimension(&self) -> usize;

    /// Return the `k` chunks most similar to `query`, best first.
    /// Equal scores keep corpus order.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit<'_>>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    metadata: IndexMetadata,
    entries: Vec<IndexEntry>,
}

#[derive(Serialize)]
struct IndexFileRef<'a> {
    format_version: u32,
    dimension: usize,
    metadata: &'a IndexMetadata,
    entries: &'a [IndexEntry],
}

#[derive(Deserialize)]
struct IndexFile {
    format_version: u32,
    dimension: usize,
    metadata: IndexMetadata,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Pair each chunk with its embedding, in order
    pub fn build(
        chunks: Vec<TextChunk>,
        embeddings: Vec<Embedding>,
        metadata: IndexMetadata,
    ) -> Result<Self> {
        if chunks.len() != embeddings.len() {
            return Err(RagError::EmbeddingCount {
                chunks: chunks.len(),
                embeddings: embeddings.len(),
            });
        }

        let dimension = embeddings.first().map(Embedding::dimension).unwrap_or(0);

        let entries = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(position, (chunk, embedding))| {
                if embedding.dimension() != dimension {
                    return Err(RagError::DimensionMismatch {
                        expected: dimension,
                        found: embedding.dimension(),
                    });
                }
                // JSON has no NaN; it would persist as null and fail to load
                if embedding.values.iter().any(|v| !v.is_finite()) {
                    return Err(RagError::NonFiniteEmbedding { position });
                }
                Ok(IndexEntry {
                    chunk,
                    vector: embedding.normalized().values,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(VectorIndex {
            dimension,
            metadata,
            entries,
        })
    }

    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn chunks(&self) -> impl Iterator<Item = &TextChunk> {
        self.entries.iter().map(|entry| &entry.chunk)
    }

    /// Write the index to `path`.
    ///
    /// The data goes to a sibling temp file first and is renamed over `path`
    /// only once fully written, so readers never see a partial index.
    pub fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = temp_path(path);
        if let Err(e) = self.write_file(&tmp_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
        fs::rename(&tmp_path, path)?;

        info!(
            "Persisted index with {} chunks to {}",
            self.entries.len(),
            path.display()
        );
        Ok(())
    }

    fn write_file(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        serde_json::to_writer(
            &mut writer,
            &IndexFileRef {
                format_version: FORMAT_VERSION,
                dimension: self.dimension,
                metadata: &self.metadata,
                entries: &self.entries,
            },
        )?;

        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Read an index written by [`VectorIndex::persist`]
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let corrupt = |reason: String| RagError::CorruptIndex {
            path: path.to_path_buf(),
            reason,
        };

        let file: IndexFile =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;

        if file.format_version != FORMAT_VERSION {
            return Err(corrupt(format!(
                "unsupported format version {}",
                file.format_version
            )));
        }

        for (position, entry) in file.entries.iter().enumerate() {
            if entry.vector.len() != file.dimension {
                return Err(corrupt(format!(
                    "entry {} has dimension {}, expected {}",
                    position,
                    entry.vector.len(),
                    file.dimension
                )));
            }
            if entry.vector.iter().any(|v| !v.is_finite()) {
                return Err(corrupt(format!("entry {} has non-finite values", position)));
            }
        }

        debug!(
            "Loaded index with {} chunks of dimension {} from {}",
            file.entries.len(),
            file.dimension,
            path.display()
        );

        Ok(VectorIndex {
            dimension: file.dimension,
            metadata: file.metadata,
            entries: file.entries,
        })
    }
}

impl VectorSearch for VectorIndex {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit<'_>>> {
        if self.entries.is_empty() {
            return Err(RagError::EmptyIndex);
        }
        if query.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                found: query.len(),
            });
        }

        let mut query = query.to_vec();
        normalize(&mut query);

        let mut hits: Vec<SearchHit<'_>> = self
            .entries
            .iter()
            .map(|entry| SearchHit {
                chunk: &entry.chunk,
                score: dot(&entry.vector, &query),
            })
            .collect();

        // Stable sort: ties stay in corpus order
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);

        Ok(hits)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
