//! TOML configuration parsing and validation.
//!
//! Secrets (API keys) are never read from the TOML file; the config names
//! the environment variables that carry them so the pipeline components can
//! be constructed without ambient global state.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub summarize: SummarizeConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("memvault_progress.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            min_chars: default_min_chars(),
        }
    }
}

fn default_max_tokens() -> usize {
    500
}
fn default_min_chars() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Base URL of the record store (PostgREST-style API).
    pub url: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_store_key_env")]
    pub key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_table() -> String {
    "structured_memory".to_string()
}
fn default_store_key_env() -> String {
    "MEMVAULT_STORE_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Chunk-store operations dispatched concurrently per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between batches, to respect upstream rate limits.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    /// Retry attempts per chunk (embedding + insert as one round).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Persist the progress ledger every N batches.
    #[serde(default = "default_persist_every")]
    pub persist_every_batches: usize,
    /// Conversation messages shorter than this are filtered at extraction.
    #[serde(default = "default_min_message_chars")]
    pub min_message_chars: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            max_retries: default_max_retries(),
            persist_every_batches: default_persist_every(),
            min_message_chars: default_min_message_chars(),
        }
    }
}

fn default_batch_size() -> usize {
    5
}
fn default_batch_delay_ms() -> u64 {
    1000
}
fn default_max_retries() -> u32 {
    3
}
fn default_persist_every() -> usize {
    5
}
fn default_min_message_chars() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct SummarizeConfig {
    #[serde(default = "default_summarize_model")]
    pub model: String,
    /// Chunks shorter than this skip summarization entirely.
    #[serde(default = "default_summarize_min_chars")]
    pub min_chars: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SummarizeConfig {
    fn default() -> Self {
        Self {
            model: default_summarize_model(),
            min_chars: default_summarize_min_chars(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_summarize_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_summarize_min_chars() -> usize {
    200
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }

    // The embedding service accepts exactly these target dimensionalities.
    if ![1536, 3072].contains(&config.embedding.dims) {
        anyhow::bail!(
            "embedding.dims must be 1536 or 3072, got {}",
            config.embedding.dims
        );
    }

    if config.ingest.batch_size == 0 {
        anyhow::bail!("ingest.batch_size must be >= 1");
    }

    if config.ingest.max_retries == 0 {
        anyhow::bail!("ingest.max_retries must be >= 1");
    }

    if config.ingest.persist_every_batches == 0 {
        anyhow::bail!("ingest.persist_every_batches must be >= 1");
    }

    if config.store.url.trim().is_empty() {
        anyhow::bail!("store.url must be set");
    }

    Ok(config)
}

/// Parse a comma-separated tags string into a trimmed, non-empty list.
pub fn parse_tags(tags_str: &str) -> Vec<String> {
    tags_str
        .split(',')
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

/// Validate an importance value is within 1 (low) to 5 (critical).
pub fn validate_importance(importance: u8) -> Result<u8> {
    if !(1..=5).contains(&importance) {
        anyhow::bail!("Importance must be between 1 (low) and 5 (critical)");
    }
    Ok(importance)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("memvault.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_minimal_config_with_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[embedding]

[store]
url = "https://example.supabase.co"
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.chunking.max_tokens, 500);
        assert_eq!(cfg.chunking.min_chars, 10);
        assert_eq!(cfg.embedding.model, "text-embedding-3-small");
        assert_eq!(cfg.embedding.dims, 1536);
        assert_eq!(cfg.store.table, "structured_memory");
        assert_eq!(cfg.ingest.batch_size, 5);
        assert_eq!(cfg.ingest.max_retries, 3);
        assert_eq!(cfg.ledger.path, PathBuf::from("memvault_progress.json"));
    }

    #[test]
    fn test_invalid_dims_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[embedding]
dims = 768

[store]
url = "https://example.supabase.co"
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[embedding]

[store]
url = "https://example.supabase.co"

[ingest]
batch_size = 0
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_parse_tags() {
        assert_eq!(parse_tags("a, b ,,c"), vec!["a", "b", "c"]);
        assert!(parse_tags("  ").is_empty());
    }

    #[test]
    fn test_validate_importance_bounds() {
        assert!(validate_importance(0).is_err());
        assert_eq!(validate_importance(1).unwrap(), 1);
        assert_eq!(validate_importance(5).unwrap(), 5);
        assert!(validate_importance(6).is_err());
    }
}
