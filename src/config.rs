use crate::chunking::{ChunkingConfig, DEFAULT_SECTION_MARKER};
use crate::error::{RagError, Result};
use crate::prompt::PromptTemplate;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Settings for the retrieval pipeline
#[derive(Debug, Clone)]
pub struct RagConfig {
    pub corpus_path: PathBuf,
    pub index_path: PathBuf,
    pub chunking: ChunkingConfig,
    pub top_k: usize,
    pub generation_timeout: Duration,
    pub template: PromptTemplate,
}

impl Default for RagConfig {
    fn default() -> Self {
        RagConfig {
            corpus_path: PathBuf::from("data.txt"),
            index_path: PathBuf::from("index.json"),
            chunking: ChunkingConfig::default(),
            top_k: 4,
            generation_timeout: Duration::from_secs(60),
            template: PromptTemplate::default(),
        }
    }
}

impl RagConfig {
    /// Create a new configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let defaults = RagConfig::default();
        let template = PromptTemplate {
            subject: env_or("RAG_SUBJECT", &defaults.template.subject),
            language: env_or("RAG_LANGUAGE", &defaults.template.language),
            unknown_answer: env_or("RAG_UNKNOWN_ANSWER", &defaults.template.unknown_answer),
        };

        let config = RagConfig {
            corpus_path: env::var_os("RAG_CORPUS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.corpus_path),
            index_path: env::var_os("RAG_INDEX_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.index_path),
            chunking: ChunkingConfig {
                max_size: env_parse("RAG_CHUNK_SIZE", defaults.chunking.max_size)?,
                overlap: env_parse("RAG_CHUNK_OVERLAP", defaults.chunking.overlap)?,
                section_marker: env_or("RAG_SECTION_MARKER", DEFAULT_SECTION_MARKER),
            },
            top_k: env_parse("RAG_TOP_K", defaults.top_k)?,
            generation_timeout: Duration::from_secs(env_parse(
                "RAG_GENERATION_TIMEOUT_SECS",
                defaults.generation_timeout.as_secs(),
            )?),
            template,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be at least 1".to_string()));
        }
        if self.generation_timeout.is_zero() {
            return Err(RagError::Config(
                "generation timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read an environment variable, or `default` when it is unset
pub(crate) fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, or return `default` when it is unset
pub(crate) fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| RagError::Config(format!("invalid value {:?} for {}: {}", raw, key, e)))
}
