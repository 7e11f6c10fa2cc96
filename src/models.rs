//! Core data models for the transcript memory pipeline.
//!
//! These types flow through parsing, chunking, the append-only chunk log,
//! and retrieval. [`ChunkRecord`] is the persisted log record; its serde
//! defaults implement the backward-compatibility contract for older log
//! entries that predate split tracking and tool metadata.

use serde::{Deserialize, Serialize};

/// A single tool invocation found on an assistant message.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub name: String,
    pub input: serde_json::Value,
    pub id: String,
}

/// The outcome of a tool invocation, found on a following user message.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub tool_use_id: String,
    pub content: String,
    pub is_error: bool,
}

/// One role-tagged message extracted from a transcript file.
///
/// Immutable and scoped to a single parse pass. The `uuid` is the
/// transcript's own message id and becomes the chunk id for the exchange
/// this message closes.
#[derive(Debug, Clone)]
pub struct Message {
    /// `"user"` or `"assistant"`.
    pub role: String,
    pub content: String,
    pub uuid: String,
    /// Sortable ISO-8601 string, taken verbatim from the transcript.
    pub timestamp: String,
    pub session_id: String,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResult>,
}

/// An ordered (user, assistant) pair within one conversation.
///
/// Derived by the chunker, never persisted.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub user: Message,
    pub assistant: Message,
}

/// Kind of a persisted chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    #[default]
    Turn,
    Summary,
}

impl ChunkKind {
    /// Stable lowercase form used in the index databases.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Turn => "turn",
            ChunkKind::Summary => "summary",
        }
    }

    /// Inverse of [`as_str`](Self::as_str); unknown values map to `Turn`.
    pub fn parse(s: &str) -> Self {
        match s {
            "summary" => ChunkKind::Summary,
            _ => ChunkKind::Turn,
        }
    }
}

/// One line of the append-only chunk log (`chunks-*.jsonl`).
///
/// Only `id`, `text`, `timestamp`, and `session_id` are required when
/// decoding; every other field defaults so that records written by older
/// versions still load. Unknown extra fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Globally unique within the merged log: the assistant message uuid,
    /// `{uuid}-{i}` for a split fragment, or `summary-{session_id}`.
    pub id: String,
    pub text: String,
    pub timestamp: String,
    pub session_id: String,
    #[serde(default)]
    pub chunk_type: ChunkKind,
    /// Ordinal position of the exchange within its conversation; `-1` for
    /// summary chunks.
    #[serde(default)]
    pub turn_index: i64,
    /// Empty unless this record is a fragment of an oversized exchange.
    #[serde(default)]
    pub parent_turn_id: String,
    #[serde(default)]
    pub chunk_index: i64,
    #[serde(default = "default_total_chunks")]
    pub total_chunks: i64,
    /// Comma-joined, sorted, deduplicated tool names.
    #[serde(default)]
    pub tools_used: String,
    /// Comma-joined file paths referenced by tool inputs (best effort).
    #[serde(default)]
    pub files_touched: String,
    /// Comma-joined shell commands, truncated, at most five.
    #[serde(default)]
    pub commands_run: String,
}

fn default_total_chunks() -> i64 {
    1
}

impl ChunkRecord {
    /// Build a plain turn chunk with no split or tool metadata.
    pub fn turn(
        id: &str,
        text: String,
        timestamp: &str,
        session_id: &str,
        turn_index: i64,
    ) -> Self {
        Self {
            id: id.to_string(),
            text,
            timestamp: timestamp.to_string(),
            session_id: session_id.to_string(),
            chunk_type: ChunkKind::Turn,
            turn_index,
            parent_turn_id: String::new(),
            chunk_index: 0,
            total_chunks: 1,
            tools_used: String::new(),
            files_touched: String::new(),
            commands_run: String::new(),
        }
    }
}

/// Per-chunk metadata carried alongside index entries and query hits.
///
/// Mirrors the non-id fields of [`ChunkRecord`] so both indexes can hand
/// results back without a log lookup.
#[derive(Debug, Clone, Default)]
pub struct ChunkMeta {
    pub text: String,
    pub session_id: String,
    pub timestamp: String,
    pub chunk_type: ChunkKind,
    pub turn_index: i64,
    pub parent_turn_id: String,
    pub chunk_index: i64,
    pub total_chunks: i64,
    pub tools_used: String,
    pub files_touched: String,
    pub commands_run: String,
}

impl ChunkMeta {
    pub fn from_record(record: &ChunkRecord) -> Self {
        Self {
            text: record.text.clone(),
            session_id: record.session_id.clone(),
            timestamp: record.timestamp.clone(),
            chunk_type: record.chunk_type,
            turn_index: record.turn_index,
            parent_turn_id: record.parent_turn_id.clone(),
            chunk_index: record.chunk_index,
            total_chunks: record.total_chunks,
            tools_used: record.tools_used.clone(),
            files_touched: record.files_touched.clone(),
            commands_run: record.commands_run.clone(),
        }
    }
}

/// A ranked hit returned by the hybrid retriever.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk_id: String,
    /// Combined score, lower is better.
    pub score: f64,
    pub text: String,
    pub session_id: String,
    pub timestamp: String,
    pub chunk_type: ChunkKind,
    pub turn_index: i64,
    pub parent_turn_id: String,
    pub chunk_index: i64,
    pub total_chunks: i64,
    pub tools_used: String,
    pub files_touched: String,
    pub commands_run: String,
}

impl SearchResult {
    /// Assemble a result from an id, combined score, and index metadata.
    pub fn from_meta(chunk_id: &str, score: f64, meta: &ChunkMeta) -> Self {
        Self {
            chunk_id: chunk_id.to_string(),
            score,
            text: meta.text.clone(),
            session_id: meta.session_id.clone(),
            timestamp: meta.timestamp.clone(),
            chunk_type: meta.chunk_type,
            turn_index: meta.turn_index,
            parent_turn_id: meta.parent_turn_id.clone(),
            chunk_index: meta.chunk_index,
            total_chunks: meta.total_chunks,
            tools_used: meta.tools_used.clone(),
            files_touched: meta.files_touched.clone(),
            commands_run: meta.commands_run.clone(),
        }
    }
}
