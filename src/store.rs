//! Record store seam and the PostgREST-style REST adapter.
//!
//! A single-row insert is atomic on the store side; no transactional
//! batching is assumed across chunks. The adapter performs one attempt per
//! call; retries live in the store writer.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::models::MemoryRecord;

/// Row handle returned by a successful insert.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub id: Option<String>,
}

/// A backend that persists memory records.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Insert one record. Succeeds with the stored row or fails; never
    /// partially writes.
    async fn insert(&self, record: &MemoryRecord) -> Result<StoredRecord, StoreError>;
}

/// Store adapter for a PostgREST-compatible API (e.g. Supabase).
///
/// Inserts go to `POST {url}/rest/v1/{table}` with the service key in both
/// `apikey` and `Authorization` headers, asking for the inserted row back.
pub struct RestMemoryStore {
    base_url: String,
    table: String,
    api_key: String,
    client: reqwest::Client,
}

impl RestMemoryStore {
    /// Build the adapter from configuration. Fails if the key environment
    /// variable named in the config is not set.
    pub fn new(config: &StoreConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.key_env))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            table: config.table.clone(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl MemoryStore for RestMemoryStore {
    async fn insert(&self, record: &MemoryRecord) -> Result<StoredRecord, StoreError> {
        let url = format!("{}/rest/v1/{}", self.base_url, self.table);

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=representation")
            .json(record)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StoreError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let rows: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(StoreError::Transport)?;

        let row = rows.first().ok_or(StoreError::EmptyInsert)?;
        let id = row
            .get("id")
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            });

        Ok(StoredRecord { id })
    }
}
