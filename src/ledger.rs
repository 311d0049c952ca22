//! Durable ingestion progress ledger.
//!
//! A JSON file records which source units and which content fingerprints
//! have completed, so a re-run (after a crash, rate-limit stall, or Ctrl-C)
//! redoes at most one batch of work. A missing file means "start fresh"; an
//! unreadable or malformed file is a hard error; silently starting over
//! could mask duplicate inserts behind a false "already complete" read.
//!
//! All mutations are additive set-inserts, so concurrent completions from a
//! batch commute; the in-memory state sits behind one mutex and `persist`
//! atomically replaces the backing file (write tempfile, then rename).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::models::StoreOutcome;

/// Run statistics carried in the ledger file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    #[serde(default)]
    pub total_units: u64,
    #[serde(default)]
    pub total_chunks: u64,
    #[serde(default)]
    pub session_stored: u64,
    #[serde(default)]
    pub session_already_stored: u64,
    #[serde(default)]
    pub session_skipped: u64,
    #[serde(default)]
    pub session_failed: u64,
}

/// Persisted ledger layout. Unknown keys are ignored and missing keys
/// default to empty; the old field names from earlier exports are accepted
/// as aliases.
#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerState {
    #[serde(default, alias = "processed_conversations")]
    processed_units: BTreeSet<String>,
    #[serde(default, alias = "processed_messages")]
    processed_fingerprints: BTreeSet<String>,
    #[serde(default)]
    last_updated: Option<String>,
    #[serde(default)]
    stats: RunStats,
}

/// Read-only view of the ledger for reporting.
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    pub units_completed: usize,
    pub fingerprints_completed: usize,
    pub last_updated: Option<String>,
    pub stats: RunStats,
}

/// Durable, append-friendly record of completed work.
#[derive(Debug)]
pub struct ProgressLedger {
    path: PathBuf,
    state: Mutex<LedgerState>,
}

impl ProgressLedger {
    /// Load the ledger at `path`. A missing file starts fresh; a present
    /// but malformed file fails fast.
    pub fn load(path: &Path) -> Result<Self> {
        let state = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read progress file: {}", path.display()))?;
            let mut state: LedgerState = serde_json::from_str(&content).with_context(|| {
                format!(
                    "Corrupt progress file: {} (fix it or rerun with --reset)",
                    path.display()
                )
            })?;
            // Session counters describe one run; start this one at zero.
            state.stats.session_stored = 0;
            state.stats.session_already_stored = 0;
            state.stats.session_skipped = 0;
            state.stats.session_failed = 0;
            state
        } else {
            LedgerState::default()
        };

        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_unit_complete(&self, unit_id: &str) -> bool {
        self.lock().processed_units.contains(unit_id)
    }

    pub fn is_fingerprint_complete(&self, fp: &str) -> bool {
        self.lock().processed_fingerprints.contains(fp)
    }

    /// Idempotent set-insert.
    pub fn mark_fingerprint_complete(&self, fp: &str) {
        self.lock().processed_fingerprints.insert(fp.to_string());
    }

    /// Idempotent set-insert. Only called once every chunk of the unit has
    /// reached `Stored` or `AlreadyStored`.
    pub fn mark_unit_complete(&self, unit_id: &str) {
        self.lock().processed_units.insert(unit_id.to_string());
    }

    /// Record the number of units found for this run.
    pub fn note_total_units(&self, units: u64) {
        self.lock().stats.total_units = units;
    }

    /// Add chunks planned for a unit to the running total.
    pub fn note_planned_chunks(&self, chunks: u64) {
        self.lock().stats.total_chunks += chunks;
    }

    /// Tally one chunk-store outcome into the session counters.
    pub fn record_outcome(&self, outcome: StoreOutcome) {
        let mut state = self.lock();
        match outcome {
            StoreOutcome::Stored => state.stats.session_stored += 1,
            StoreOutcome::AlreadyStored => state.stats.session_already_stored += 1,
            StoreOutcome::Skipped => state.stats.session_skipped += 1,
            StoreOutcome::Failed => state.stats.session_failed += 1,
        }
    }

    /// Count chunks dropped before storage (below `min_chars`).
    pub fn record_dropped(&self, n: u64) {
        self.lock().stats.session_skipped += n;
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.lock();
        LedgerSnapshot {
            units_completed: state.processed_units.len(),
            fingerprints_completed: state.processed_fingerprints.len(),
            last_updated: state.last_updated.clone(),
            stats: state.stats.clone(),
        }
    }

    /// Flush in-memory state to the backing file. Safe to call repeatedly
    /// and to be interrupted mid-write: the new content lands in a sibling
    /// temp file that replaces the old file in one rename.
    pub fn persist(&self) -> Result<()> {
        let json = {
            let mut state = self.lock();
            state.last_updated = Some(chrono::Utc::now().to_rfc3339());
            serde_json::to_string_pretty(&*state)?
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write progress file: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace progress file: {}", self.path.display()))?;

        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        // Additive inserts cannot leave the state inconsistent, so a
        // poisoned lock would only mean a panicking reader.
        self.state.lock().expect("ledger lock")
    }
}
