use crate::config::{env_or, env_parse};
use crate::embeddings::{Embedding, EmbeddingProvider};
use crate::error::{ProviderError, RagError, Result};
use crate::prompt::GenerationProvider;
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::env;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
pub const DEFAULT_GENERATION_MODEL: &str = "gemini-2.0-flash";

/// Largest number of texts accepted by a single `batchEmbedContents` call
const MAX_EMBED_BATCH: usize = 100;

/// Configuration for Gemini API
#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub embedding_model: String,
    pub generation_model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("embedding_model", &self.embedding_model)
            .field("generation_model", &self.generation_model)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish()
    }
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        GeminiConfig {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            temperature: 0.3,
            max_output_tokens: 512,
        }
    }

    /// Create a new configuration from environment variables.
    ///
    /// Fails when no API key is set, so a missing credential is reported at
    /// startup rather than on the first question.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("GEMINI_API_KEY")
            .or_else(|_| env::var("GOOGLE_API_KEY"))
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                RagError::Config("GEMINI_API_KEY (or GOOGLE_API_KEY) is not set".to_string())
            })?;

        let defaults = GeminiConfig::new(api_key);

        Ok(GeminiConfig {
            base_url: env_or("GEMINI_BASE_URL", &defaults.base_url)
                .trim_end_matches('/')
                .to_string(),
            embedding_model: env_or("GEMINI_EMBEDDING_MODEL", &defaults.embedding_model),
            generation_model: env_or("GEMINI_GENERATION_MODEL", &defaults.generation_model),
            temperature: env_parse("GEMINI_TEMPERATURE", defaults.temperature)?,
            max_output_tokens: env_parse("GEMINI_MAX_OUTPUT_TOKENS", defaults.max_output_tokens)?,
            ..defaults
        })
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, model, method)
    }
}

/// Client for interacting with Gemini API
#[derive(Clone)]
pub struct GeminiClient {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiClient {
    /// Create a new Gemini client
    pub fn new(config: GeminiConfig) -> Self {
        let client = reqwest::Client::new();
        GeminiClient { config, client }
    }

    /// Get the client configuration
    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    async fn post<Req, Resp>(&self, url: &str, request: &Req) -> std::result::Result<Resp, ProviderError>
    where
        Req: Serialize + ?Sized,
        Resp: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(url)
            .query(&[("key", &self.config.api_key)])
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }

    fn embed_request<'a>(&self, text: &'a str) -> EmbedContentRequest<'a> {
        EmbedContentRequest {
            model: format!("models/{}", self.config.embedding_model),
            content: Content::from_text(text),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiClient {
    fn model_name(&self) -> &str {
        &self.config.embedding_model
    }

    async fn embed(&self, text: &str) -> std::result::Result<Embedding, ProviderError> {
        let url = self.config.model_url(&self.config.embedding_model, "embedContent");
        let response: EmbedContentResponse = self.post(&url, &self.embed_request(text)).await?;

        into_embedding(response.embedding)
    }

    async fn embed_batch(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<Embedding>, ProviderError> {
        let url = self
            .config
            .model_url(&self.config.embedding_model, "batchEmbedContents");
        let mut embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(MAX_EMBED_BATCH) {
            let request = BatchEmbedRequest {
                requests: batch.iter().map(|text| self.embed_request(text)).collect(),
            };
            let response: BatchEmbedResponse = self.post(&url, &request).await?;

            if response.embeddings.len() != batch.len() {
                return Err(ProviderError::Other(format!(
                    "requested {} embeddings, received {}",
                    batch.len(),
                    response.embeddings.len()
                )));
            }
            for values in response.embeddings {
                embeddings.push(into_embedding(values)?);
            }
            debug!("Embedded {}/{} texts", embeddings.len(), texts.len());
        }

        Ok(embeddings)
    }
}

#[async_trait]
impl GenerationProvider for GeminiClient {
    async fn generate(&self, prompt: &str) -> std::result::Result<String, ProviderError> {
        let request = GenerateRequest {
            contents: vec![Content::new_with_role(prompt, "user")],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
            },
        };

        let url = self
            .config
            .model_url(&self.config.generation_model, "generateContent");
        let response: GenerateResponse = self.post(&url, &request).await?;

        extract_text(response)
    }
}

fn into_embedding(data: EmbeddingData) -> std::result::Result<Embedding, ProviderError> {
    if data.values.is_empty() {
        return Err(ProviderError::EmptyResponse);
    }
    Ok(Embedding::new(data.values).normalized())
}

/// Join the text parts of the first candidate
fn extract_text(response: GenerateResponse) -> std::result::Result<String, ProviderError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ProviderError::EmptyResponse);
    }
    Ok(text)
}

// Request/response structures for the Gemini API

#[derive(Serialize)]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Deserialize, Debug)]
struct EmbedContentResponse {
    embedding: EmbeddingData,
}

#[derive(Deserialize, Debug)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingData>,
}

#[derive(Deserialize, Debug)]
struct EmbeddingData {
    values: Vec<f32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
}

impl<'a> Content<'a> {
    fn from_text(text: &'a str) -> Self {
        Content {
            parts: vec![Part { text }],
            role: None,
        }
    }

    fn new_with_role(text: &'a str, role: &'static str) -> Self {
        Content {
            parts: vec![Part { text }],
            role: Some(role),
        }
    }
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize, Debug)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    text: Option<String>,
}
