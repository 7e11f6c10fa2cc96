//! Transcript message extractor.
//!
//! Reads one conversation transcript (newline-delimited JSON, one event per
//! line) and yields ordered, role-tagged [`Message`]s. Tool invocations on
//! assistant messages and tool results on user messages are carried as
//! structured metadata for the chunker.
//!
//! Malformed lines, non-message events, and meta events are skipped — one
//! bad line never drops the rest of the file.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::models::{Message, ToolCall, ToolResult};

/// Parse a single transcript file into ordered messages.
///
/// The session id is the file stem. Lines that are not valid JSON, are not
/// `user`/`assistant` events, are flagged `isMeta`, or carry no text content
/// are skipped silently.
pub fn parse_conversation(filepath: &Path) -> Result<Vec<Message>> {
    let session_id = filepath
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let file = std::fs::File::open(filepath)
        .with_context(|| format!("Failed to open transcript: {}", filepath.display()))?;
    let reader = BufReader::new(file);

    let mut messages = Vec::new();

    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => continue,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let data: serde_json::Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(_) => continue,
        };

        let event_type = data.get("type").and_then(|t| t.as_str()).unwrap_or("");
        if event_type != "user" && event_type != "assistant" {
            continue;
        }
        if data.get("isMeta").and_then(|m| m.as_bool()).unwrap_or(false) {
            continue;
        }

        let content = match extract_text_content(&data) {
            Some(c) if !c.trim().is_empty() => c.trim().to_string(),
            _ => continue,
        };

        let role = data
            .get("message")
            .and_then(|m| m.get("role"))
            .and_then(|r| r.as_str())
            .unwrap_or("");
        if role != "user" && role != "assistant" {
            continue;
        }

        messages.push(Message {
            role: role.to_string(),
            content,
            uuid: data
                .get("uuid")
                .and_then(|u| u.as_str())
                .unwrap_or("")
                .to_string(),
            timestamp: data
                .get("timestamp")
                .and_then(|t| t.as_str())
                .unwrap_or("")
                .to_string(),
            session_id: session_id.clone(),
            tool_calls: extract_tool_calls(&data),
            tool_results: extract_tool_results(&data),
        });
    }

    Ok(messages)
}

/// Extract plain text from a message event.
///
/// User content is a bare string; assistant content is an array of blocks
/// from which the `text` blocks are joined with newlines.
fn extract_text_content(data: &serde_json::Value) -> Option<String> {
    let content = data.get("message")?.get("content")?;

    if let Some(text) = content.as_str() {
        return Some(text.to_string());
    }

    if let Some(blocks) = content.as_array() {
        let parts: Vec<&str> = blocks
            .iter()
            .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
            .collect();
        if parts.is_empty() {
            return None;
        }
        return Some(parts.join("\n"));
    }

    None
}

/// Extract `tool_use` blocks from an event's content array.
pub fn extract_tool_calls(data: &serde_json::Value) -> Vec<ToolCall> {
    let blocks = match data
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_array())
    {
        Some(b) => b,
        None => return Vec::new(),
    };

    blocks
        .iter()
        .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("tool_use"))
        .map(|b| ToolCall {
            name: b
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or("")
                .to_string(),
            input: b.get("input").cloned().unwrap_or(serde_json::json!({})),
            id: b
                .get("id")
                .and_then(|i| i.as_str())
                .unwrap_or("")
                .to_string(),
        })
        .collect()
}

/// Extract `tool_result` blocks from an event's content array.
///
/// Result content may be a bare string or a nested block array; nested
/// text blocks are joined with newlines.
pub fn extract_tool_results(data: &serde_json::Value) -> Vec<ToolResult> {
    let blocks = match data
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_array())
    {
        Some(b) => b,
        None => return Vec::new(),
    };

    blocks
        .iter()
        .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("tool_result"))
        .map(|b| {
            let content = match b.get("content") {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Array(parts)) => parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                    .collect::<Vec<_>>()
                    .join("\n"),
                _ => String::new(),
            };
            ToolResult {
                tool_use_id: b
                    .get("tool_use_id")
                    .and_then(|i| i.as_str())
                    .unwrap_or("")
                    .to_string(),
                content,
                is_error: b
                    .get("is_error")
                    .and_then(|e| e.as_bool())
                    .unwrap_or(false),
            }
        })
        .collect()
}

/// List transcript files under the configured directory, in lexicographic
/// path order so repeated syncs process files deterministically.
///
/// A missing directory yields an empty list, not an error.
pub fn get_source_files(config: &Config) -> Result<Vec<PathBuf>> {
    let root = &config.sources.transcripts_dir;
    if !root.exists() {
        return Ok(Vec::new());
    }

    let include_set = build_globset(&config.sources.include_globs)?;

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(root).max_depth(1) {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if include_set.is_match(&name) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
