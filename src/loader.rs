use crate::chunking::{split_into_chunks, ChunkingConfig};
use crate::document::Document;
use crate::embeddings::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::{IndexMetadata, VectorIndex};
use log::{info, warn};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

/// Loads a persisted index or builds it from the corpus.
///
/// Each index path is built at most once per loader: concurrent callers
/// wait for the first build and all receive the same `Arc<VectorIndex>`.
pub struct IndexLoader {
    chunking: ChunkingConfig,
    cells: Mutex<HashMap<PathBuf, Arc<OnceCell<Arc<VectorIndex>>>>>,
}

impl IndexLoader {
    pub fn new(chunking: ChunkingConfig) -> Self {
        IndexLoader {
            chunking,
            cells: Mutex::new(HashMap::new()),
        }
    }

    pub async fn load_or_build(
        &self,
        corpus_path: &Path,
        index_path: &Path,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Arc<VectorIndex>> {
        let cell = {
            let mut cells = self.cells.lock().await;
            Arc::clone(cells.entry(index_path.to_path_buf()).or_default())
        };

        // A failed build leaves the cell empty, so the next caller retries
        let index = cell
            .get_or_try_init(|| async {
                self.load_or_build_uncached(corpus_path, index_path, embedder)
                    .await
                    .map(Arc::new)
            })
            .await?;

        Ok(Arc::clone(index))
    }

    /// Delete the persisted index at `index_path` and forget any cached copy.
    ///
    /// A build already running for that path is allowed to finish first, and
    /// new callers for any path wait until the file is gone.
    pub async fn discard(&self, index_path: &Path) -> Result<()> {
        let mut cells = self.cells.lock().await;
        if let Some(cell) = cells.remove(index_path) {
            // Returns at once when the cell is idle, otherwise waits for the
            // running build so its rename cannot land after the removal
            let _ = cell
                .get_or_try_init(|| async { Err::<Arc<VectorIndex>, ()>(()) })
                .await;
        }

        match fs::remove_file(index_path) {
            Ok(()) => {
                info!("Removed persisted index {}", index_path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_or_build_uncached(
        &self,
        corpus_path: &Path,
        index_path: &Path,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<VectorIndex> {
        if !index_path.exists() {
            let document = Document::from_file(corpus_path)?;
            return self.build(document, index_path, embedder).await;
        }

        let index = VectorIndex::load(index_path)?;

        let document = match Document::from_file(corpus_path) {
            Ok(document) => document,
            Err(RagError::CorpusNotFound(_)) => {
                warn!(
                    "Corpus {} not found, using persisted index {} as is",
                    corpus_path.display(),
                    index_path.display()
                );
                return Ok(index);
            }
            Err(e) => return Err(e),
        };

        if *index.metadata() == self.metadata_for(&document, embedder) {
            info!("Using existing index: {}", index_path.display());
            return Ok(index);
        }

        warn!(
            "Index {} was built from a different corpus or configuration, rebuilding",
            index_path.display()
        );
        self.build(document, index_path, embedder).await
    }

    async fn build(
        &self,
        document: Document,
        index_path: &Path,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<VectorIndex> {
        let chunks = split_into_chunks(&document.content, &self.chunking)?;
        info!("Split into {} chunks", chunks.len());

        info!("Generating embeddings with {}...", embedder.model_name());
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = embedder
            .embed_batch(&texts)
            .await
            .map_err(RagError::Embedding)?;

        let index = VectorIndex::build(chunks, embeddings, self.metadata_for(&document, embedder))?;
        index.persist(index_path)?;

        Ok(index)
    }

    fn metadata_for(&self, document: &Document, embedder: &dyn EmbeddingProvider) -> IndexMetadata {
        IndexMetadata {
            embedding_model: embedder.model_name().to_string(),
            chunk_size: self.chunking.max_size,
            chunk_overlap: self.chunking.overlap,
            section_marker: self.chunking.section_marker.clone(),
            corpus_sha256: document.fingerprint(),
        }
    }
}
