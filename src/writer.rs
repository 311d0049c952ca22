//! Retrying store writer.
//!
//! Given a chunk and its insertion context, obtains an embedding and writes
//! one memory record, with bounded retries and exponential backoff. The
//! fingerprint check against the progress ledger happens before any
//! embedding call, which is what makes re-running ingestion over the same
//! export safe: already-completed content costs nothing.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use crate::embedding::Embedder;
use crate::fingerprint::fingerprint;
use crate::ledger::ProgressLedger;
use crate::models::{Chunk, ChunkContext, MemoryRecord, StoreOutcome};
use crate::store::MemoryStore;
use crate::summarize::Summarizer;

/// The one retry policy threaded through the writer (and nowhere else):
/// up to `max_attempts` rounds with `base_delay * 2^attempt` backoff,
/// attempt 0-indexed, exponent capped so a misconfigured attempt count
/// cannot stall the run.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.pow(attempt.min(6))
    }
}

/// Writes one record per distinct content fingerprint.
pub struct StoreWriter {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn MemoryStore>,
    ledger: Arc<ProgressLedger>,
    retry: RetryPolicy,
    summarizer: Option<Arc<dyn Summarizer>>,
    summarize_min_chars: usize,
}

impl StoreWriter {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn MemoryStore>,
        ledger: Arc<ProgressLedger>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            embedder,
            store,
            ledger,
            retry,
            summarizer: None,
            summarize_min_chars: 200,
        }
    }

    /// Enable best-effort summarization for chunks of at least `min_chars`.
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>, min_chars: usize) -> Self {
        self.summarizer = Some(summarizer);
        self.summarize_min_chars = min_chars;
        self
    }

    /// Store one chunk: summarize (optional), fingerprint, dedup-check,
    /// then embed + insert with retries.
    ///
    /// `AlreadyStored` is returned without calling the embedding service.
    /// On `Failed` the fingerprint is not added to the ledger, so a later
    /// run retries the chunk.
    pub async fn store_chunk(&self, chunk: &Chunk, ctx: &ChunkContext) -> StoreOutcome {
        let text = self.final_text(chunk).await;
        let fp = fingerprint(&text);

        if self.ledger.is_fingerprint_complete(&fp) {
            return StoreOutcome::AlreadyStored;
        }

        for attempt in 0..self.retry.max_attempts {
            match self.attempt_store(&text, chunk, ctx, &fp).await {
                Ok(true) => {
                    self.ledger.mark_fingerprint_complete(&fp);
                    return StoreOutcome::Stored;
                }
                Ok(false) => return StoreOutcome::Skipped,
                Err(e) => {
                    if attempt + 1 == self.retry.max_attempts {
                        eprintln!(
                            "Warning: chunk {}#{} failed after {} attempts: {}",
                            chunk.source_unit_id,
                            chunk.sequence_index,
                            self.retry.max_attempts,
                            e
                        );
                        return StoreOutcome::Failed;
                    }
                    eprintln!(
                        "Warning: attempt {} for chunk {}#{} failed, retrying: {}",
                        attempt + 1,
                        chunk.source_unit_id,
                        chunk.sequence_index,
                        e
                    );
                    sleep(self.retry.delay(attempt)).await;
                }
            }
        }

        StoreOutcome::Failed
    }

    /// The text that will be fingerprinted, embedded, and stored.
    async fn final_text(&self, chunk: &Chunk) -> String {
        if let Some(summarizer) = &self.summarizer {
            if chunk.text.len() >= self.summarize_min_chars {
                if let Some(summary) = summarizer.summarize(&chunk.text).await {
                    return summary;
                }
            }
        }
        chunk.text.clone()
    }

    /// One round: embedding call plus a single insert. `Ok(false)` means
    /// the embedding input was empty: a validation skip, not a failure.
    async fn attempt_store(
        &self,
        text: &str,
        chunk: &Chunk,
        ctx: &ChunkContext,
        fp: &str,
    ) -> anyhow::Result<bool> {
        let embedding = self.embedder.embed(text).await?;
        if embedding.is_empty() {
            return Ok(false);
        }

        let record = build_record(text, embedding, chunk, ctx, fp);
        self.store.insert(&record).await?;
        Ok(true)
    }
}

fn build_record(
    text: &str,
    embedding: Vec<f32>,
    chunk: &Chunk,
    ctx: &ChunkContext,
    fp: &str,
) -> MemoryRecord {
    let mut metadata = ctx.metadata.clone();
    if let serde_json::Value::Object(map) = &mut metadata {
        map.insert("content_fingerprint".to_string(), fp.into());
        map.insert(
            "source_unit_id".to_string(),
            chunk.source_unit_id.clone().into(),
        );
        map.insert("chunk_index".to_string(), chunk.sequence_index.into());
    }

    MemoryRecord {
        content: text.to_string(),
        embedding,
        mem_type: ctx.mem_type.clone(),
        source: ctx.source.clone(),
        importance: ctx.importance,
        tags: ctx.tags.clone(),
        metadata,
    }
}
