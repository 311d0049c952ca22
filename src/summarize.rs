//! Optional best-effort chunk summarization.
//!
//! Summarization is an orthogonal text transform applied before
//! fingerprinting and embedding, and only for chunks above a configured
//! minimum length. It never blocks ingestion: any failure falls back to the
//! original chunk text.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::SummarizeConfig;

const SUMMARY_SYSTEM_PROMPT: &str = "Summarize the following text concisely, \
preserving key information and context. Keep it under 150 words.";

/// Best-effort text condenser. `None` means "use the original text".
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Option<String>;
}

/// Summarizer backed by a chat completion endpoint.
pub struct ChatSummarizer {
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl ChatSummarizer {
    pub fn new(config: &SummarizeConfig, api_key_env: &str) -> anyhow::Result<Self> {
        let api_key = std::env::var(api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", api_key_env))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            client,
        })
    }

    async fn request_summary(&self, text: &str) -> anyhow::Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SUMMARY_SYSTEM_PROMPT },
                { "role": "user", "content": text },
            ],
            "max_tokens": 200,
            "temperature": 0.3,
        });

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            anyhow::bail!("summarization API error {}: {}", status, message);
        }

        let json: serde_json::Value = response.json().await?;
        let summary = json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|s| s.as_str())
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        if summary.is_empty() {
            anyhow::bail!("summarization returned empty content");
        }
        Ok(summary)
    }
}

#[async_trait]
impl Summarizer for ChatSummarizer {
    async fn summarize(&self, text: &str) -> Option<String> {
        match self.request_summary(text).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                eprintln!("Warning: summarization failed, using original text: {}", e);
                None
            }
        }
    }
}
