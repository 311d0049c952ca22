//! Ingestion pipeline orchestration.
//!
//! Drives the full flow per source unit: resume fast path → chunking →
//! batched concurrent store-writes → ledger bookkeeping. Units move through
//! `Pending -> InProgress -> {Completed, PartiallyFailed}`; a partially
//! failed unit is left unmarked so the next run redoes only its failed
//! chunks (stored fingerprints are skipped via the ledger).
//!
//! Concurrency is exploited within a unit's chunk batches, not across
//! units: batches run strictly sequentially with an inter-batch delay, so
//! the global outstanding-call bound on the embedding service equals the
//! batch size.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use crate::chunk::{self, TokenCounter};
use crate::config::Config;
use crate::embedding::OpenAiEmbedder;
use crate::export;
use crate::ledger::ProgressLedger;
use crate::models::{ChunkContext, SourceUnit, StoreOutcome, UnitBody};
use crate::report::{IngestEvent, ProgressMode, ProgressReporter};
use crate::sources;
use crate::store::RestMemoryStore;
use crate::summarize::ChatSummarizer;
use crate::writer::{RetryPolicy, StoreWriter};

/// Knobs for one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub max_tokens: usize,
    pub min_chars: usize,
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub persist_every_batches: usize,
    /// Overrides the detected source kind for every unit.
    pub source_override: Option<String>,
    /// Overrides the generated tags for every chunk.
    pub tags_override: Option<Vec<String>>,
    /// Importance for text units (conversation messages score themselves).
    pub importance: u8,
}

impl IngestOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_tokens: config.chunking.max_tokens,
            min_chars: config.chunking.min_chars,
            batch_size: config.ingest.batch_size,
            batch_delay: Duration::from_millis(config.ingest.batch_delay_ms),
            persist_every_batches: config.ingest.persist_every_batches,
            source_override: None,
            tags_override: None,
            importance: 1,
        }
    }
}

/// Terminal state of one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Completed,
    PartiallyFailed,
}

/// Per-unit outcome tally.
#[derive(Debug, Clone)]
pub struct UnitReport {
    pub unit_id: String,
    pub stored: u64,
    pub already_stored: u64,
    pub skipped: u64,
    pub failed: u64,
    pub state: UnitState,
}

/// Aggregated result of a run, used for the summary and the exit code.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub units_total: usize,
    pub units_resumed_complete: usize,
    pub units_completed: usize,
    pub units_partially_failed: usize,
    pub stored: u64,
    pub already_stored: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Supervises the chunk-store flows for a list of source units.
pub struct IngestPipeline {
    writer: StoreWriter,
    ledger: Arc<ProgressLedger>,
    reporter: Box<dyn ProgressReporter>,
    options: IngestOptions,
    counter: Box<TokenCounter>,
}

impl IngestPipeline {
    pub fn new(
        writer: StoreWriter,
        ledger: Arc<ProgressLedger>,
        reporter: Box<dyn ProgressReporter>,
        options: IngestOptions,
    ) -> Self {
        Self {
            writer,
            ledger,
            reporter,
            options,
            counter: Box::new(chunk::token_count),
        }
    }

    /// Replace the token counter (tests inject a predictable one).
    pub fn with_counter(mut self, counter: Box<TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    /// Process every unit in order, persisting the ledger as it goes.
    pub async fn run(&self, units: &[SourceUnit]) -> Result<RunSummary> {
        self.ledger.note_total_units(units.len() as u64);

        let mut summary = RunSummary {
            units_total: units.len(),
            ..Default::default()
        };

        for (i, unit) in units.iter().enumerate() {
            match self.process_unit(unit, i + 1, units.len()).await? {
                None => summary.units_resumed_complete += 1,
                Some(report) => {
                    summary.stored += report.stored;
                    summary.already_stored += report.already_stored;
                    summary.skipped += report.skipped;
                    summary.failed += report.failed;
                    match report.state {
                        UnitState::Completed => summary.units_completed += 1,
                        UnitState::PartiallyFailed => summary.units_partially_failed += 1,
                    }
                }
            }
        }

        self.ledger.persist()?;
        Ok(summary)
    }

    /// Process one unit. Returns `None` when the unit was already complete
    /// (resume fast path, no chunking or embedding work at all).
    pub async fn process_unit(
        &self,
        unit: &SourceUnit,
        index: usize,
        total: usize,
    ) -> Result<Option<UnitReport>> {
        if self.ledger.is_unit_complete(&unit.unit_id) {
            self.reporter.report(IngestEvent::UnitSkipped {
                unit_id: unit.unit_id.clone(),
            });
            return Ok(None);
        }

        self.reporter.report(IngestEvent::UnitStart {
            unit_id: unit.unit_id.clone(),
            title: unit.title.clone(),
            index,
            total,
        });

        let (work, dropped) = plan_unit(unit, &self.options, &self.counter);
        self.ledger.record_dropped(dropped as u64);
        self.ledger.note_planned_chunks(work.len() as u64);

        let mut report = UnitReport {
            unit_id: unit.unit_id.clone(),
            stored: 0,
            already_stored: 0,
            skipped: 0,
            failed: 0,
            state: UnitState::Completed,
        };

        if work.is_empty() {
            // Nothing to store is a valid terminal state; marking the unit
            // complete avoids re-examining genuinely empty units forever.
            self.ledger.mark_unit_complete(&unit.unit_id);
            self.ledger.persist()?;
            self.reporter.report(IngestEvent::UnitDone {
                unit_id: unit.unit_id.clone(),
                completed: true,
            });
            return Ok(Some(report));
        }

        let total_chunks = work.len();
        let mut done = 0usize;

        for (batch_idx, batch) in work.chunks(self.options.batch_size).enumerate() {
            if batch_idx > 0 {
                tokio::time::sleep(self.options.batch_delay).await;
            }

            let outcomes = join_all(
                batch
                    .iter()
                    .map(|(chunk, ctx)| self.writer.store_chunk(chunk, ctx)),
            )
            .await;

            for outcome in outcomes {
                self.ledger.record_outcome(outcome);
                match outcome {
                    StoreOutcome::Stored => report.stored += 1,
                    StoreOutcome::AlreadyStored => report.already_stored += 1,
                    StoreOutcome::Skipped => report.skipped += 1,
                    StoreOutcome::Failed => report.failed += 1,
                }
            }

            done += batch.len();
            self.reporter.report(IngestEvent::Chunks {
                unit_id: unit.unit_id.clone(),
                done,
                total: total_chunks,
            });

            // Crash mid-unit loses at most persist_every_batches batches.
            if (batch_idx + 1) % self.options.persist_every_batches == 0 {
                self.ledger.persist()?;
            }
        }

        if report.failed == 0 {
            self.ledger.mark_unit_complete(&unit.unit_id);
        } else {
            report.state = UnitState::PartiallyFailed;
        }
        self.ledger.persist()?;

        self.reporter.report(IngestEvent::UnitDone {
            unit_id: unit.unit_id.clone(),
            completed: report.state == UnitState::Completed,
        });

        Ok(Some(report))
    }
}

/// Expand a unit into `(chunk, context)` work items plus the count of
/// chunks dropped as too short. Pure; used by both the pipeline and the
/// dry-run estimate.
pub fn plan_unit(
    unit: &SourceUnit,
    options: &IngestOptions,
    counter: &TokenCounter,
) -> (Vec<(crate::models::Chunk, ChunkContext)>, usize) {
    let mut work = Vec::new();
    let mut dropped = 0usize;

    match &unit.body {
        UnitBody::Text(text) => {
            let source = options.source_override.clone().unwrap_or_else(|| {
                sources::detect_source_kind(std::path::Path::new(&unit.unit_id)).to_string()
            });
            let ctx = ChunkContext {
                mem_type: "log".to_string(),
                source,
                importance: options.importance,
                tags: options.tags_override.clone().unwrap_or_default(),
                metadata: serde_json::json!({ "source_unit_title": unit.title }),
            };

            let chunked = chunk::chunk_text(
                &unit.unit_id,
                text,
                options.max_tokens,
                options.min_chars,
                counter,
            );
            dropped += chunked.dropped_short;
            for chunk in chunked.chunks {
                work.push((chunk, ctx.clone()));
            }
        }
        UnitBody::Conversation(messages) => {
            let source = options
                .source_override
                .clone()
                .unwrap_or_else(|| "chat-export".to_string());

            for message in messages {
                let ctx = ChunkContext {
                    mem_type: "chat".to_string(),
                    source: source.clone(),
                    importance: export::message_importance(&message.content),
                    tags: options
                        .tags_override
                        .clone()
                        .unwrap_or_else(|| export::message_tags(&message.role, &message.content)),
                    metadata: serde_json::json!({
                        "conversation_id": unit.unit_id,
                        "conversation_title": unit.title,
                        "message_id": message.id,
                        "role": message.role,
                        "create_time": message.create_time,
                        "parent_id": message.parent_id,
                        "content_type": message.content_type,
                        "model_slug": message.model_slug,
                    }),
                };

                let chunked = chunk::chunk_text(
                    &unit.unit_id,
                    &message.content,
                    options.max_tokens,
                    options.min_chars,
                    counter,
                );
                dropped += chunked.dropped_short;
                for chunk in chunked.chunks {
                    work.push((chunk, ctx.clone()));
                }
            }
        }
    }

    // Sequence indices are unit-wide, in original order.
    for (i, (chunk, _)) in work.iter_mut().enumerate() {
        chunk.sequence_index = i;
    }

    (work, dropped)
}

/// CLI-facing arguments for an ingestion run.
#[derive(Debug, Clone)]
pub struct IngestArgs {
    pub path: PathBuf,
    pub source: Option<String>,
    pub tags: Option<Vec<String>>,
    pub importance: u8,
    pub summarize: bool,
    pub reset: bool,
    pub progress_file: Option<PathBuf>,
    pub dry_run: bool,
    pub limit: Option<usize>,
    pub progress_mode: ProgressMode,
}

/// Run the `ingest` command end to end and print the run summary.
pub async fn run_ingest(config: &Config, args: IngestArgs) -> Result<RunSummary> {
    let ledger_path = args
        .progress_file
        .clone()
        .unwrap_or_else(|| config.ledger.path.clone());

    if args.reset && ledger_path.exists() {
        std::fs::remove_file(&ledger_path)?;
        println!("Deleted progress file: {}", ledger_path.display());
    }

    let mut units = sources::load_units(&args.path, config.ingest.min_message_chars)?;
    if let Some(limit) = args.limit {
        units.truncate(limit);
    }

    let ledger = Arc::new(ProgressLedger::load(&ledger_path)?);

    let mut options = IngestOptions::from_config(config);
    options.source_override = args.source.clone();
    options.tags_override = args.tags.clone();
    options.importance = args.importance;

    if args.dry_run {
        let counter: Box<TokenCounter> = Box::new(chunk::token_count);
        let mut total_chunks = 0usize;
        let mut already_complete = 0usize;
        for unit in &units {
            if ledger.is_unit_complete(&unit.unit_id) {
                already_complete += 1;
                continue;
            }
            let (work, _) = plan_unit(unit, &options, &counter);
            total_chunks += work.len();
        }
        println!("ingest {} (dry-run)", args.path.display());
        println!("  units found: {}", units.len());
        println!("  units already complete: {}", already_complete);
        println!("  estimated chunks: {}", total_chunks);
        return Ok(RunSummary {
            units_total: units.len(),
            units_resumed_complete: already_complete,
            ..Default::default()
        });
    }

    // An interrupt must not lose the current batch's completions.
    let signal_ledger = ledger.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted — progress saved, rerun the same command to resume.");
            if let Err(e) = signal_ledger.persist() {
                eprintln!("Warning: could not save progress: {}", e);
            }
            std::process::exit(130);
        }
    });

    let embedder = Arc::new(OpenAiEmbedder::new(&config.embedding)?);
    let store = Arc::new(RestMemoryStore::new(&config.store)?);
    let retry = RetryPolicy {
        max_attempts: config.ingest.max_retries,
        base_delay: Duration::from_secs(1),
    };

    let mut writer = StoreWriter::new(embedder, store, ledger.clone(), retry);
    if args.summarize {
        let summarizer = Arc::new(ChatSummarizer::new(
            &config.summarize,
            &config.embedding.api_key_env,
        )?);
        writer = writer.with_summarizer(summarizer, config.summarize.min_chars);
    }

    let pipeline = IngestPipeline::new(
        writer,
        ledger.clone(),
        args.progress_mode.reporter(),
        options,
    );

    let summary = pipeline.run(&units).await?;

    println!("ingest {}", args.path.display());
    println!("  units found: {}", summary.units_total);
    println!(
        "  units already complete: {}",
        summary.units_resumed_complete
    );
    println!("  units completed: {}", summary.units_completed);
    println!(
        "  units with failures: {}",
        summary.units_partially_failed
    );
    println!("  chunks stored: {}", summary.stored);
    println!("  chunks already stored: {}", summary.already_stored);
    println!("  chunks skipped: {}", summary.skipped);
    println!("  chunks failed: {}", summary.failed);
    let attempted = summary.stored + summary.already_stored + summary.skipped + summary.failed;
    if attempted > 0 {
        println!(
            "  success rate: {}%",
            ((attempted - summary.failed) * 100) / attempted
        );
    }
    println!("  progress file: {}", ledger_path.display());
    if summary.failed == 0 {
        println!("ok");
    } else {
        println!(
            "completed with {} failures — rerun the same command to retry them",
            summary.failed
        );
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedder;
    use crate::error::{EmbedError, StoreError};
    use crate::models::{ConversationMessage, MemoryRecord};
    use crate::report::NoProgress;
    use crate::store::{MemoryStore, StoredRecord};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn words(s: &str) -> usize {
        s.split_whitespace().count()
    }

    /// Embedder whose failure mode can be flipped between runs.
    struct SwitchableEmbedder {
        calls: AtomicUsize,
        failing: AtomicBool,
    }

    impl SwitchableEmbedder {
        fn working() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failing: AtomicBool::new(false),
            })
        }

        fn broken() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failing: AtomicBool::new(true),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Embedder for SwitchableEmbedder {
        fn model_name(&self) -> &str {
            "fake"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(EmbedError::Api {
                    status: 503,
                    message: "down".to_string(),
                });
            }
            if text.trim().is_empty() {
                return Ok(Vec::new());
            }
            Ok(vec![0.1; 3])
        }
    }

    #[derive(Default)]
    struct CapturingStore {
        inserts: Mutex<Vec<MemoryRecord>>,
    }

    #[async_trait]
    impl MemoryStore for CapturingStore {
        async fn insert(&self, record: &MemoryRecord) -> Result<StoredRecord, StoreError> {
            self.inserts.lock().unwrap().push(record.clone());
            Ok(StoredRecord { id: None })
        }
    }

    fn options() -> IngestOptions {
        IngestOptions {
            max_tokens: 10,
            min_chars: 3,
            batch_size: 2,
            batch_delay: Duration::from_millis(100),
            persist_every_batches: 2,
            source_override: None,
            tags_override: None,
            importance: 1,
        }
    }

    fn pipeline(
        embedder: Arc<SwitchableEmbedder>,
        store: Arc<CapturingStore>,
        ledger: Arc<ProgressLedger>,
    ) -> IngestPipeline {
        let writer = StoreWriter::new(
            embedder,
            store,
            ledger.clone(),
            RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(10),
            },
        );
        IngestPipeline::new(writer, ledger, Box::new(NoProgress), options())
            .with_counter(Box::new(words))
    }

    fn text_unit(id: &str, text: &str) -> SourceUnit {
        SourceUnit {
            unit_id: id.to_string(),
            title: id.to_string(),
            body: UnitBody::Text(text.to_string()),
        }
    }

    fn ledger_in(tmp: &tempfile::TempDir) -> Arc<ProgressLedger> {
        Arc::new(ProgressLedger::load(&tmp.path().join("progress.json")).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_unit_marked_complete_without_store_calls() {
        let tmp = tempfile::TempDir::new().unwrap();
        let embedder = SwitchableEmbedder::working();
        let store = Arc::new(CapturingStore::default());
        let ledger = ledger_in(&tmp);
        let p = pipeline(embedder.clone(), store.clone(), ledger.clone());

        let unit = text_unit("empty.txt", "   \n\n  ");
        let report = p.process_unit(&unit, 1, 1).await.unwrap().unwrap();

        assert_eq!(report.state, UnitState::Completed);
        assert!(ledger.is_unit_complete("empty.txt"));
        assert_eq!(embedder.calls(), 0);
        assert!(store.inserts.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_twice_is_idempotent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = Arc::new(CapturingStore::default());

        let text = (0..30)
            .map(|i| format!("sentence number {} goes here.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let units = vec![text_unit("doc.txt", &text)];

        let embedder = SwitchableEmbedder::working();
        {
            let ledger = ledger_in(&tmp);
            let p = pipeline(embedder.clone(), store.clone(), ledger);
            let summary = p.run(&units).await.unwrap();
            assert!(summary.stored > 0);
            assert_eq!(summary.failed, 0);
        }
        let first_inserts = store.inserts.lock().unwrap().len();
        let first_calls = embedder.calls();

        // Second run over the same input with the persisted ledger: the
        // unit is skipped entirely, nothing is embedded or inserted again.
        {
            let ledger = ledger_in(&tmp);
            let p = pipeline(embedder.clone(), store.clone(), ledger);
            let summary = p.run(&units).await.unwrap();
            assert_eq!(summary.units_resumed_complete, 1);
            assert_eq!(summary.stored, 0);
        }
        assert_eq!(store.inserts.lock().unwrap().len(), first_inserts);
        assert_eq!(embedder.calls(), first_calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_failure_leaves_unit_resumable() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = Arc::new(CapturingStore::default());

        let text = (0..20)
            .map(|i| format!("sentence number {} goes here.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let units = vec![text_unit("doc.txt", &text)];

        // First run: embedding service down, unit must stay unmarked.
        {
            let ledger = ledger_in(&tmp);
            let p = pipeline(SwitchableEmbedder::broken(), store.clone(), ledger.clone());
            let summary = p.run(&units).await.unwrap();
            assert!(summary.failed > 0);
            assert_eq!(summary.units_partially_failed, 1);
            assert!(!ledger.is_unit_complete("doc.txt"));
        }
        assert!(store.inserts.lock().unwrap().is_empty());

        // Second run: service recovered, everything lands and the unit
        // completes.
        {
            let ledger = ledger_in(&tmp);
            let p = pipeline(SwitchableEmbedder::working(), store.clone(), ledger.clone());
            let summary = p.run(&units).await.unwrap();
            assert_eq!(summary.failed, 0);
            assert_eq!(summary.units_completed, 1);
            assert!(ledger.is_unit_complete("doc.txt"));
        }
        assert!(!store.inserts.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupted_progress_resumes_at_batch_granularity() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = Arc::new(CapturingStore::default());

        let text = (0..20)
            .map(|i| format!("sentence number {} goes here.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let units = vec![text_unit("doc.txt", &text)];

        // Complete run to persist fingerprints, then simulate a crash by
        // reloading the ledger and deleting the unit-complete mark: the
        // re-run must report every chunk as already stored.
        {
            let ledger = ledger_in(&tmp);
            let p = pipeline(SwitchableEmbedder::working(), store.clone(), ledger);
            p.run(&units).await.unwrap();
        }
        let inserts_after_first = store.inserts.lock().unwrap().len();

        let raw = std::fs::read_to_string(tmp.path().join("progress.json")).unwrap();
        let mut json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        json["processed_units"] = serde_json::json!([]);
        std::fs::write(
            tmp.path().join("progress.json"),
            serde_json::to_string(&json).unwrap(),
        )
        .unwrap();

        let embedder = SwitchableEmbedder::working();
        {
            let ledger = ledger_in(&tmp);
            let p = pipeline(embedder.clone(), store.clone(), ledger.clone());
            let summary = p.run(&units).await.unwrap();
            assert_eq!(summary.stored, 0);
            assert!(summary.already_stored > 0);
            assert!(ledger.is_unit_complete("doc.txt"));
        }
        // No embedding calls and no new inserts for completed fingerprints.
        assert_eq!(embedder.calls(), 0);
        assert_eq!(store.inserts.lock().unwrap().len(), inserts_after_first);
    }

    #[test]
    fn test_plan_unit_conversation_contexts() {
        let unit = SourceUnit {
            unit_id: "conv-1".to_string(),
            title: "Talk".to_string(),
            body: UnitBody::Conversation(vec![
                ConversationMessage {
                    id: "m1".to_string(),
                    role: "user".to_string(),
                    content: "My database throws an error on startup.".to_string(),
                    create_time: Some(1.0),
                    parent_id: None,
                    content_type: "text".to_string(),
                    model_slug: None,
                },
                ConversationMessage {
                    id: "m2".to_string(),
                    role: "assistant".to_string(),
                    content: "A calm and fairly unremarkable reply without keywords at length."
                        .to_string(),
                    create_time: Some(2.0),
                    parent_id: Some("m1".to_string()),
                    content_type: "text".to_string(),
                    model_slug: Some("gpt-4o".to_string()),
                },
            ]),
        };

        let (work, dropped) = plan_unit(&unit, &options(), &words);
        assert_eq!(dropped, 0);
        assert_eq!(work.len(), 2);
        for (i, (chunk, _)) in work.iter().enumerate() {
            assert_eq!(chunk.sequence_index, i);
            assert_eq!(chunk.source_unit_id, "conv-1");
        }

        let (_, ctx1) = &work[0];
        assert_eq!(ctx1.mem_type, "chat");
        assert_eq!(ctx1.importance, 4); // "error" keyword
        assert!(ctx1.tags.contains(&"role-user".to_string()));
        assert_eq!(ctx1.metadata["message_id"], "m1");

        let (_, ctx2) = &work[1];
        assert_eq!(ctx2.metadata["model_slug"], "gpt-4o");
    }

    #[test]
    fn test_plan_unit_text_source_detection() {
        let unit = text_unit("server_logs.txt", "one ordinary line of text here.");
        let (work, _) = plan_unit(&unit, &options(), &words);
        assert_eq!(work.len(), 1);
        assert_eq!(work[0].1.mem_type, "log");
        assert_eq!(work[0].1.source, "log");

        let mut opts = options();
        opts.source_override = Some("notes".to_string());
        let (work, _) = plan_unit(&unit, &opts, &words);
        assert_eq!(work[0].1.source, "notes");
    }
}
