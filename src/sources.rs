//! Source unit loading.
//!
//! Turns an ingest path into [`SourceUnit`]s: a single `.txt`/`.md`/`.json`
//! file, a folder of such files (scanned recursively), or a chat export
//! folder containing `conversations.json`. Unit ids are stable across runs
//! (relative file path or conversation id) so resume can recognize them.

use anyhow::{Context, Result};
use std::path::Path;

use walkdir::WalkDir;

use crate::export;
use crate::models::{SourceUnit, UnitBody};

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "json"];

/// Load all source units under `path`.
pub fn load_units(path: &Path, min_message_chars: usize) -> Result<Vec<SourceUnit>> {
    if path.is_file() {
        let ext = extension(path);
        if !TEXT_EXTENSIONS.contains(&ext.as_str()) {
            anyhow::bail!(
                "Unsupported file type '{}'. Supported: .txt, .md, .json",
                ext
            );
        }
        return Ok(vec![read_text_unit(path, unit_id_for(path, None))?]);
    }

    if !path.is_dir() {
        anyhow::bail!("Path not found: {}", path.display());
    }

    // A chat export folder is recognized by its conversations.json.
    if path.join("conversations.json").is_file() {
        return export::load_export(path, min_message_chars);
    }

    let mut files: Vec<_> = WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| TEXT_EXTENSIONS.contains(&extension(p).as_str()))
        .collect();
    files.sort();

    if files.is_empty() {
        anyhow::bail!(
            "No ingestible files (.txt, .md, .json) found under {}",
            path.display()
        );
    }

    files
        .iter()
        .map(|file| read_text_unit(file, unit_id_for(file, Some(path))))
        .collect()
}

/// Unit id: the path relative to the scanned root, or the file name for a
/// directly-named file.
fn unit_id_for(file: &Path, root: Option<&Path>) -> String {
    let relative = root
        .and_then(|r| file.strip_prefix(r).ok())
        .unwrap_or_else(|| Path::new(file.file_name().unwrap_or(file.as_os_str())));
    relative.to_string_lossy().replace('\\', "/")
}

fn read_text_unit(path: &Path, unit_id: String) -> Result<SourceUnit> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    let raw = String::from_utf8_lossy(&bytes).into_owned();

    let text = if extension(path) == "json" {
        render_json(&raw)
    } else {
        raw
    };

    let title = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| unit_id.clone());

    Ok(SourceUnit {
        unit_id,
        title,
        body: UnitBody::Text(text),
    })
}

/// Convert JSON content to readable text: objects pretty-printed, arrays
/// one item per line, anything unparseable kept as-is.
fn render_json(raw: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value @ serde_json::Value::Object(_)) => {
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| raw.to_string())
        }
        Ok(serde_json::Value::Array(items)) => items
            .iter()
            .map(|item| item.to_string())
            .collect::<Vec<_>>()
            .join("\n"),
        Ok(other) => other.to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Auto-detect a source kind from filename patterns.
pub fn detect_source_kind(path: &Path) -> &'static str {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    const PATTERNS: &[(&str, &[&str])] = &[
        ("chat", &["chat", "conversation", "messages"]),
        ("blog", &["blog", "post", "article"]),
        ("email", &["email", "mail"]),
        ("documentation", &["doc", "documentation", "readme"]),
        ("log", &["log", "logs"]),
        ("notes", &["note", "notes"]),
    ];

    for (kind, words) in PATTERNS {
        if words.iter().any(|w| stem.contains(w)) {
            return kind;
        }
    }
    "file"
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}
