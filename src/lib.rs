pub mod chunking;
pub mod config;
pub mod document;
pub mod embeddings;
pub mod error;
pub mod gemini;
pub mod index;
pub mod loader;
pub mod prompt;
pub mod rag;
pub mod retriever;

pub use error::{ProviderError, RagError, Result};
