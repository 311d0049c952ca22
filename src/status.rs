//! Progress overview for the `status` command.
//!
//! Reads the ledger file and prints what has been ingested so far: units
//! and chunks completed, the last session's outcome counters, and when the
//! file was last written. Read-only; never creates or modifies the file.

use std::path::Path;

use anyhow::Result;

use crate::ledger::ProgressLedger;

/// Run the status command against the ledger at `path`.
pub fn run_status(path: &Path) -> Result<()> {
    println!("memvault — Ingestion Status");
    println!("===========================");
    println!();
    println!("  Progress file:  {}", path.display());

    if !path.exists() {
        println!("  (no progress file — nothing ingested yet)");
        println!();
        return Ok(());
    }

    let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    let ledger = ProgressLedger::load(path)?;
    let snap = ledger.snapshot();

    println!("  Size:           {}", format_bytes(size));
    println!(
        "  Last updated:   {}",
        snap.last_updated
            .as_deref()
            .map(format_rfc3339_relative)
            .unwrap_or_else(|| "never".to_string())
    );
    println!();
    println!("  Units completed:   {}", snap.units_completed);
    println!("  Chunks completed:  {}", snap.fingerprints_completed);
    println!();
    println!("  Last session:");
    println!("    units found:     {}", snap.stats.total_units);
    println!("    chunks planned:  {}", snap.stats.total_chunks);
    println!("    stored:          {}", snap.stats.session_stored);
    println!("    already stored:  {}", snap.stats.session_already_stored);
    println!("    skipped:         {}", snap.stats.session_skipped);
    println!("    failed:          {}", snap.stats.session_failed);
    println!();

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Format an RFC 3339 timestamp as a relative time string (e.g. "3 hours
/// ago"); falls back to the raw string when it does not parse.
fn format_rfc3339_relative(raw: &str) -> String {
    let parsed = match chrono::DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt,
        Err(_) => return raw.to_string(),
    };

    let now = chrono::Utc::now().timestamp();
    let delta = now - parsed.timestamp();

    if delta < 0 {
        return parsed.format("%Y-%m-%d %H:%M").to_string();
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        parsed.format("%Y-%m-%d %H:%M").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
    }

    #[test]
    fn test_relative_time_recent() {
        let now = chrono::Utc::now().to_rfc3339();
        assert_eq!(format_rfc3339_relative(&now), "just now");
    }

    #[test]
    fn test_relative_time_unparseable_passes_through() {
        assert_eq!(format_rfc3339_relative("not a date"), "not a date");
    }

    #[test]
    fn test_status_on_missing_file_is_ok() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(run_status(&tmp.path().join("nope.json")).is_ok());
    }
}
