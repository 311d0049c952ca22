//! Chat export parsing.
//!
//! Reads a `conversations.json` export (a list of conversations, each with a
//! `mapping` tree of message nodes), extracts the meaningful messages, and
//! produces one [`SourceUnit`] per conversation. Also provides the keyword
//! heuristics that assign an importance score and tags to each message.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::models::{ConversationMessage, SourceUnit, UnitBody};

/// Roles whose messages are never ingested.
const SKIP_ROLES: &[&str] = &["system"];

/// Content types carrying tool scaffolding rather than conversation text.
const SKIP_CONTENT_TYPES: &[&str] = &["user_editable_context", "thoughts", "reasoning_recap"];

#[derive(Debug, Deserialize)]
pub struct Conversation {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub mapping: HashMap<String, Node>,
}

#[derive(Debug, Deserialize)]
pub struct Node {
    #[serde(default)]
    message: Option<MessageData>,
    #[serde(default)]
    parent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageData {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    author: Option<Author>,
    #[serde(default)]
    content: Option<MessageContent>,
    #[serde(default)]
    create_time: Option<f64>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Author {
    #[serde(default)]
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    parts: Option<Vec<serde_json::Value>>,
}

/// Load an export folder into source units, one per conversation.
///
/// Conversations whose messages are all filtered out still become units
/// with an empty message list; the orchestrator marks those complete
/// without any store calls.
pub fn load_export(folder: &Path, min_message_chars: usize) -> Result<Vec<SourceUnit>> {
    let conversations_file = folder.join("conversations.json");
    if !conversations_file.exists() {
        anyhow::bail!(
            "conversations.json not found in {}",
            folder.display()
        );
    }

    let content = std::fs::read_to_string(&conversations_file)
        .with_context(|| format!("Failed to read {}", conversations_file.display()))?;
    let conversations: Vec<Conversation> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", conversations_file.display()))?;

    let units = conversations
        .iter()
        .enumerate()
        .map(|(i, conv)| {
            let unit_id = conv
                .conversation_id
                .clone()
                .or_else(|| conv.id.clone())
                .unwrap_or_else(|| format!("conversation-{}", i));
            let title = conv
                .title
                .clone()
                .unwrap_or_else(|| "Untitled Conversation".to_string());
            SourceUnit {
                unit_id,
                title,
                body: UnitBody::Conversation(extract_messages(conv, min_message_chars)),
            }
        })
        .collect();

    Ok(units)
}

/// Extract meaningful messages from a conversation's mapping tree.
///
/// Skips unwanted roles and content types, joins text parts, and drops
/// contents shorter than `min_message_chars`. Messages are returned in
/// timeline order (create_time, then message id) so sequence indices are
/// deterministic across runs.
pub fn extract_messages(conv: &Conversation, min_message_chars: usize) -> Vec<ConversationMessage> {
    let mut messages: Vec<ConversationMessage> = Vec::new();

    for (node_id, node) in &conv.mapping {
        let Some(data) = &node.message else {
            continue;
        };

        let role = data
            .author
            .as_ref()
            .and_then(|a| a.role.clone())
            .unwrap_or_else(|| "unknown".to_string());
        let content_type = data
            .content
            .as_ref()
            .and_then(|c| c.content_type.clone())
            .unwrap_or_else(|| "text".to_string());

        if SKIP_ROLES.contains(&role.as_str()) || SKIP_CONTENT_TYPES.contains(&content_type.as_str())
        {
            continue;
        }

        let Some(parts) = data.content.as_ref().and_then(|c| c.parts.as_ref()) else {
            continue;
        };

        let content = join_parts(parts);
        if content.len() < min_message_chars {
            continue;
        }

        let model_slug = data
            .metadata
            .as_ref()
            .and_then(|m| m.get("model_slug"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        messages.push(ConversationMessage {
            id: data.id.clone().unwrap_or_else(|| node_id.clone()),
            role,
            content,
            create_time: data.create_time,
            parent_id: node.parent.clone(),
            content_type,
            model_slug,
        });
    }

    messages.sort_by(|a, b| {
        let ta = a.create_time.unwrap_or(f64::MAX);
        let tb = b.create_time.unwrap_or(f64::MAX);
        ta.partial_cmp(&tb)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });

    messages
}

/// Join the text parts of a message, skipping empties, trimming the result.
fn join_parts(parts: &[serde_json::Value]) -> String {
    let pieces: Vec<String> = parts
        .iter()
        .filter_map(|part| match part {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) if s.is_empty() => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
        .collect();
    pieces.join("\n").trim().to_string()
}

/// Heuristic importance (1–5) from message content.
pub fn message_importance(content: &str) -> u8 {
    let lower = content.to_lowercase();

    const HIGH: &[&str] = &[
        "error", "problem", "issue", "bug", "fix", "solution", "important", "critical", "urgent",
        "help", "stuck",
    ];
    const TECHNICAL: &[&str] = &[
        "code", "function", "class", "api", "database", "server", "algorithm", "implementation",
        "architecture", "design",
    ];
    const LEARNING: &[&str] = &[
        "learn", "understand", "explain", "how", "why", "what", "tutorial", "guide", "example",
        "documentation",
    ];

    if HIGH.iter().any(|k| lower.contains(k)) {
        return 4;
    }
    if TECHNICAL.iter().any(|k| lower.contains(k)) {
        return 3;
    }
    if LEARNING.iter().any(|k| lower.contains(k)) {
        return 3;
    }
    if content.len() < 50 {
        return 1;
    }
    2
}

/// Heuristic tags from message role and content.
pub fn message_tags(role: &str, content: &str) -> Vec<String> {
    let lower = content.to_lowercase();
    let mut tags = vec!["chat-export".to_string(), "chat-history".to_string()];
    tags.push(format!("role-{}", role));

    const TECH_KEYWORDS: &[(&str, &[&str])] = &[
        ("python", &["python", "pip", "django", "flask"]),
        ("javascript", &["javascript", "node", "npm", "react"]),
        ("web", &["html", "css", "website", "browser", "frontend"]),
        ("database", &["database", "sql", "supabase", "postgres"]),
        ("ai", &["gpt", "openai", "model", "embedding", "llm"]),
        ("coding", &["code", "function", "class", "variable", "algorithm"]),
    ];

    for (tag, keywords) in TECH_KEYWORDS {
        if keywords.iter().any(|k| lower.contains(k)) {
            tags.push(tag.to_string());
        }
    }

    if lower.contains("error") || lower.contains("problem") {
        tags.push("troubleshooting".to_string());
    }
    if lower.contains("tutorial") || lower.contains("guide") || lower.contains("how to") {
        tags.push("tutorial".to_string());
    }

    tags
}
