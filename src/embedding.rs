//! Embedding client seam and the OpenAI adapter.
//!
//! The adapter is deliberately a single attempt, single round trip: it
//! normalizes the input, passes the fixed target dimensionality, and maps
//! failures into [`EmbedError`]. Retry logic belongs to the retrying store
//! writer, nowhere else.
//!
//! Empty input (after trimming) is success with an empty vector; callers
//! must treat that as "skip, do not store".

use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::EmbedError;

/// A service that turns text into a fixed-dimension float vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Embed one text. Returns an empty vector for empty input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

/// Embedding provider calling `POST /v1/embeddings` on the OpenAI API.
pub struct OpenAiEmbedder {
    model: String,
    dims: usize,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiEmbedder {
    /// Build the adapter from configuration. Fails if the API key
    /// environment variable named in the config is not set.
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            dims: config.dims,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let normalized = text.replace('\n', " ");
        let normalized = normalized.trim();
        if normalized.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "model": self.model,
            "input": [normalized],
            "encoding_format": "float",
            "dimensions": self.dims,
        });

        let response = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmbedError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EmbedError::Malformed(e.to_string()))?;

        parse_embedding_response(&json, self.dims)
    }
}

/// Extract the first embedding vector from an API response body.
fn parse_embedding_response(json: &serde_json::Value, dims: usize) -> Result<Vec<f32>, EmbedError> {
    let embedding = json
        .get("data")
        .and_then(|d| d.get(0))
        .and_then(|e| e.get("embedding"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| EmbedError::Malformed("missing data[0].embedding".to_string()))?;

    let vector: Vec<f32> = embedding
        .iter()
        .filter_map(|v| v.as_f64())
        .map(|f| f as f32)
        .collect();

    if vector.len() != embedding.len() {
        return Err(EmbedError::Malformed(
            "non-numeric value in embedding".to_string(),
        ));
    }
    if vector.len() != dims {
        return Err(EmbedError::Malformed(format!(
            "expected {} dimensions, got {}",
            dims,
            vector.len()
        )));
    }

    Ok(vector)
}
