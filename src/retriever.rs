use crate::chunking::TextChunk;
use crate::embeddings::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::VectorSearch;
use log::debug;

/// Embed `question` and return the `k` most similar chunks, best first.
///
/// Embedding and search failures are both reported as
/// [`RagError::Retrieval`] with the original error as its source.
pub async fn retrieve<S>(
    question: &str,
    index: &S,
    embedder: &dyn EmbeddingProvider,
    k: usize,
) -> Result<Vec<TextChunk>>
where
    S: VectorSearch + ?Sized,
{
    let query = embedder
        .embed(question)
        .await
        .map_err(|e| RagError::Retrieval(Box::new(e)))?;

    let hits = index
        .search(&query.values, k)
        .map_err(|e| RagError::Retrieval(Box::new(e)))?;

    for hit in &hits {
        debug!(
            "Hit at {} scored {:.4}",
            hit.chunk.start_position, hit.score
        );
    }

    Ok(hits.into_iter().map(|hit| hit.chunk.clone()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::Embedding;
    use crate::error::ProviderError;
    use crate::index::{IndexMetadata, VectorIndex};
    use async_trait::async_trait;
    use std::error::Error as _;

    const VOCABULARY: [&str; 4] = ["eğitim", "üniversite", "deneyim", "şirket"];

    /// Counts vocabulary words (by prefix) in the lowercased text
    struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keywords"
        }

        async fn embed(&self, text: &str) -> std::result::Result<Embedding, ProviderError> {
            let text = text.to_lowercase();
            let values = VOCABULARY
                .iter()
                .map(|word| {
                    text.split(|c: char| !c.is_alphanumeric())
                        .filter(|token| token.starts_with(word))
                        .count() as f32
                })
                .collect();
            Ok(Embedding::new(values))
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }

        async fn embed(&self, _text: &str) -> std::result::Result<Embedding, ProviderError> {
            Err(ProviderError::Api {
                status: 429,
                body: "quota exceeded".to_string(),
            })
        }
    }

    async fn two_chunk_index() -> VectorIndex {
        let chunks = vec![
            TextChunk {
                text: "### Eğitim\nX Üniversitesi 2020-2024\n".to_string(),
                start_position: 0,
            },
            TextChunk {
                text: "### Deneyim\nY Şirketi stajyer".to_string(),
                start_position: 38,
            },
        ];
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = KeywordEmbedder.embed_batch(&texts).await.unwrap();
        let metadata = IndexMetadata {
            embedding_model: "keywords".to_string(),
            chunk_size: 500,
            chunk_overlap: 100,
            section_marker: "### ".to_string(),
            corpus_sha256: String::new(),
        };
        VectorIndex::build(chunks, embeddings, metadata).unwrap()
    }

    #[tokio::test]
    async fn test_retrieves_education_chunk() {
        let index = two_chunk_index().await;
        let chunks = retrieve("Eğitim bilgisi nedir?", &index, &KeywordEmbedder, 1)
            .await
            .unwrap();

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.starts_with("### Eğitim"));
    }

    #[tokio::test]
    async fn test_returns_chunks_in_rank_order() {
        let index = two_chunk_index().await;
        let chunks = retrieve("Hangi şirkette deneyim kazandı?", &index, &KeywordEmbedder, 5)
            .await
            .unwrap();

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].text.starts_with("### Deneyim"));
    }

    #[tokio::test]
    async fn test_embedding_failure_is_wrapped() {
        let index = two_chunk_index().await;
        let error = retrieve("Eğitim?", &index, &FailingEmbedder, 1)
            .await
            .unwrap_err();

        assert!(matches!(error, RagError::Retrieval(_)));
        assert!(error.source().unwrap().to_string().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_search_failure_is_wrapped() {
        let metadata = IndexMetadata {
            embedding_model: "keywords".to_string(),
            chunk_size: 500,
            chunk_overlap: 100,
            section_marker: "### ".to_string(),
            corpus_sha256: String::new(),
        };
        let empty = VectorIndex::build(Vec::new(), Vec::new(), metadata).unwrap();
        let error = retrieve("Eğitim?", &empty, &KeywordEmbedder, 1)
            .await
            .unwrap_err();

        let source = error.source().unwrap();
        assert!(matches!(
            source.downcast_ref::<RagError>(),
            Some(RagError::EmptyIndex)
        ));
    }
}
