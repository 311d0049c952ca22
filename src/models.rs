//! Core data models used throughout memvault.
//!
//! These types represent the source units, chunks, and memory records that
//! flow through the ingestion pipeline.

use serde::Serialize;

/// One document or conversation being ingested. Read once per run and never
/// mutated; `unit_id` is stable across runs (filename or conversation id) so
/// the progress ledger can recognize it again.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    pub unit_id: String,
    pub title: String,
    pub body: UnitBody,
}

/// The content of a source unit.
#[derive(Debug, Clone)]
pub enum UnitBody {
    /// Free-form text (file contents, rendered JSON).
    Text(String),
    /// Messages extracted from a conversation export, in timeline order.
    Conversation(Vec<ConversationMessage>),
}

/// A single message extracted from a conversation export tree.
#[derive(Debug, Clone)]
pub struct ConversationMessage {
    pub id: String,
    pub role: String,
    pub content: String,
    pub create_time: Option<f64>,
    pub parent_id: Option<String>,
    pub content_type: String,
    pub model_slug: Option<String>,
}

/// A contiguous span of cleaned text bounded by `max_tokens`.
///
/// `sequence_index` records the chunk's position within its unit for
/// traceability; storage correctness does not depend on it.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub text: String,
    pub token_count: usize,
    pub sequence_index: usize,
    pub source_unit_id: String,
}

/// Insertion context for a chunk: classification, provenance, and the
/// metadata bag that rides along into the stored record.
#[derive(Debug, Clone)]
pub struct ChunkContext {
    pub mem_type: String,
    pub source: String,
    pub importance: u8,
    pub tags: Vec<String>,
    pub metadata: serde_json::Value,
}

/// The persisted record, serialized as the store insert body.
///
/// Created exactly once per distinct content fingerprint; re-ingestion of
/// identical content is a no-op, never an overwrite.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryRecord {
    pub content: String,
    pub embedding: Vec<f32>,
    #[serde(rename = "type")]
    pub mem_type: String,
    pub source: String,
    pub importance: u8,
    pub tags: Vec<String>,
    pub metadata: serde_json::Value,
}

/// Terminal outcome of one chunk-store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// Embedded and inserted in this call.
    Stored,
    /// Fingerprint already in the ledger; no embedding call was made.
    AlreadyStored,
    /// Validation skip (empty embedding input); counted, never retried.
    Skipped,
    /// All retry attempts exhausted; fingerprint not added to the ledger.
    Failed,
}
