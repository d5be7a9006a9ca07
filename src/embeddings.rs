use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Representation of a vector embedding
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Embedding { values }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Scale to unit length so cosine similarity reduces to a dot product
    pub fn normalized(mut self) -> Self {
        normalize(&mut self.values);
        self
    }
}

/// Scale `values` in place to an L2 norm of 1. Zero vectors are left as is.
pub fn normalize(values: &mut [f32]) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        values.iter_mut().for_each(|v| *v /= norm);
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Maps text to a fixed-length vector
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier, recorded in the persisted index
    fn model_name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Embedding, ProviderError>;

    /// Embed several texts, keeping the output in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, ProviderError> {
        let mut embeddings = Vec::with_capacity(texts.len());

        for text in texts {
            embeddings.push(self.embed(text).await?);
        }

        Ok(embeddings)
    }
}
