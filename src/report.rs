//! Ingestion progress reporting.
//!
//! Reports observable progress during `memvault ingest` so users see which
//! unit is being worked, how many chunks are done, and what a resume will
//! skip. Progress is emitted on **stderr** so stdout remains parseable for
//! scripts.

use std::io::Write;

/// A single progress event for ingestion.
#[derive(Clone, Debug)]
pub enum IngestEvent {
    /// A source unit entered processing: `index`/`total` across the run.
    UnitStart {
        unit_id: String,
        title: String,
        index: usize,
        total: usize,
    },
    /// A unit was skipped entirely via the coarse-grained resume fast path.
    UnitSkipped { unit_id: String },
    /// Chunk progress within the current unit.
    Chunks {
        unit_id: String,
        done: usize,
        total: usize,
    },
    /// A unit reached a terminal state.
    UnitDone { unit_id: String, completed: bool },
}

/// Reports ingest progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: IngestEvent);
}

/// Human-friendly progress: "ingest [3/12] 'Project notes'  chunks 15 / 40".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: IngestEvent) {
        let line = match &event {
            IngestEvent::UnitStart {
                title,
                index,
                total,
                ..
            } => format!("ingest [{}/{}] '{}'\n", index, total, title),
            IngestEvent::UnitSkipped { unit_id } => {
                format!("ingest skipping '{}' (already complete)\n", unit_id)
            }
            IngestEvent::Chunks {
                unit_id,
                done,
                total,
            } => format!(
                "ingest {}  chunks {} / {}\n",
                unit_id,
                format_number(*done as u64),
                format_number(*total as u64)
            ),
            IngestEvent::UnitDone { unit_id, completed } => {
                if *completed {
                    format!("ingest {}  done\n", unit_id)
                } else {
                    format!("ingest {}  completed with failures\n", unit_id)
                }
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: IngestEvent) {
        let obj = match &event {
            IngestEvent::UnitStart {
                unit_id,
                title,
                index,
                total,
            } => serde_json::json!({
                "event": "unit_start",
                "unit_id": unit_id,
                "title": title,
                "index": index,
                "total": total
            }),
            IngestEvent::UnitSkipped { unit_id } => serde_json::json!({
                "event": "unit_skipped",
                "unit_id": unit_id
            }),
            IngestEvent::Chunks {
                unit_id,
                done,
                total,
            } => serde_json::json!({
                "event": "chunks",
                "unit_id": unit_id,
                "done": done,
                "total": total
            }),
            IngestEvent::UnitDone { unit_id, completed } => serde_json::json!({
                "event": "unit_done",
                "unit_id": unit_id,
                "completed": completed
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: IngestEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
