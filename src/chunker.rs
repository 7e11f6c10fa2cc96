//! Exchange chunker: turns a parsed conversation into bounded,
//! context-enriched chunk records.
//!
//! The pipeline per conversation:
//!
//! 1. Pair each user message with the next assistant message (exchanges).
//! 2. Drop exchanges whose user message matches the excluded set.
//! 3. For each exchange, either attach a character-budgeted window of
//!    surrounding exchanges (70% preceding / 30% following), or — when the
//!    exchange alone exceeds `max_chars` — split it recursively at natural
//!    boundaries (paragraph → line → sentence → word → hard cut) with an
//!    inter-fragment overlap.
//! 4. Attach tool metadata derived from the assistant's tool calls.
//!
//! All sizes are in bytes of UTF-8 text; cut points are snapped to char
//! boundaries.

use std::collections::BTreeSet;

use anyhow::Result;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use crate::config::ChunkingConfig;
use crate::models::{ChunkRecord, Exchange, Message, ToolCall};
use crate::parser::parse_conversation;

/// Separator between neighboring exchange texts in a context window.
const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Share of the context budget spent on preceding exchanges.
const CONTEXT_BEFORE_RATIO: f64 = 0.7;

/// Maximum number of shell commands kept per chunk.
const MAX_COMMANDS: usize = 5;

/// Commands longer than this are truncated with a trailing ellipsis.
const MAX_COMMAND_CHARS: usize = 200;

/// Parse one transcript file and produce its chunk records.
///
/// A conversation with no valid exchanges yields an empty vec, not an error.
pub fn chunk_conversation(filepath: &Path, config: &ChunkingConfig) -> Result<Vec<ChunkRecord>> {
    let messages = parse_conversation(filepath)?;
    let exchanges = pair_exchanges(&messages, &config.excluded_messages);
    Ok(chunk_exchanges(&exchanges, config))
}

/// Pair user messages with the next assistant message, in document order.
///
/// Each user message is consumed by at most one exchange; an assistant
/// message with no pending user message is ignored; a trailing unmatched
/// user message produces nothing. Exchanges whose user message matches the
/// excluded set (trimmed, case-insensitive) are dropped together with their
/// assistant reply.
pub fn pair_exchanges(messages: &[Message], excluded: &[String]) -> Vec<Exchange> {
    let mut exchanges = Vec::new();
    let mut pending_user: Option<&Message> = None;

    for msg in messages {
        match msg.role.as_str() {
            "user" => pending_user = Some(msg),
            "assistant" => {
                if let Some(user) = pending_user.take() {
                    if !is_excluded(&user.content, excluded) {
                        exchanges.push(Exchange {
                            user: user.clone(),
                            assistant: msg.clone(),
                        });
                    }
                }
            }
            _ => {}
        }
    }

    exchanges
}

fn is_excluded(user_text: &str, excluded: &[String]) -> bool {
    let normalized = user_text.trim().to_lowercase();
    excluded.iter().any(|e| normalized == e.trim().to_lowercase())
}

/// Format one exchange as embeddable text.
pub fn format_exchange(exchange: &Exchange) -> String {
    format!(
        "User: {}\n\nAssistant: {}",
        exchange.user.content, exchange.assistant.content
    )
}

/// Build chunk records for a conversation's exchanges.
///
/// Exchanges that fit within `max_chars` become a single context-enriched
/// chunk keyed by the assistant message uuid. Oversized exchanges are split
/// into `{uuid}-{i}` fragments with `parent_turn_id` tracking and an
/// `overlap_chars` prefix shared between neighbors.
pub fn chunk_exchanges(exchanges: &[Exchange], config: &ChunkingConfig) -> Vec<ChunkRecord> {
    let texts: Vec<String> = exchanges.iter().map(format_exchange).collect();
    let mut records = Vec::new();

    for (i, exchange) in exchanges.iter().enumerate() {
        let assistant = &exchange.assistant;
        // Assistant uuids are the stable chunk keys; a transcript that lost
        // its uuids still gets deterministic ids so re-syncs do not duplicate.
        let base_id = if assistant.uuid.is_empty() {
            format!("{}-turn-{}", assistant.session_id, i)
        } else {
            assistant.uuid.clone()
        };

        let (tools_used, files_touched, commands_run) = tool_metadata(&assistant.tool_calls);

        if texts[i].len() > config.max_chars {
            // The exchange alone blows the budget: drop context and split.
            let parts = recursive_split(&texts[i], config.max_chars);
            let parts = add_overlap(parts, config.overlap_chars);
            let total = parts.len() as i64;
            for (k, part) in parts.into_iter().enumerate() {
                records.push(ChunkRecord {
                    id: format!("{}-{}", base_id, k),
                    text: part,
                    timestamp: assistant.timestamp.clone(),
                    session_id: assistant.session_id.clone(),
                    chunk_type: crate::models::ChunkKind::Turn,
                    turn_index: i as i64,
                    parent_turn_id: base_id.clone(),
                    chunk_index: k as i64,
                    total_chunks: total,
                    tools_used: tools_used.clone(),
                    files_touched: files_touched.clone(),
                    commands_run: commands_run.clone(),
                });
            }
        } else {
            let text = with_context(&texts, i, config);
            let mut record = ChunkRecord::turn(
                &base_id,
                text,
                &assistant.timestamp,
                &assistant.session_id,
                i as i64,
            );
            record.tools_used = tools_used;
            record.files_touched = files_touched;
            record.commands_run = commands_run;
            records.push(record);
        }
    }

    records
}

/// Wrap the current exchange with a budgeted window of neighbors.
///
/// The budget is the configured context allowance, further shrunk so the
/// combined text never exceeds `max_chars`. 70% goes to preceding
/// exchanges, the rest to following ones; nearest neighbors are taken
/// first and each candidate's cost includes the joining separator.
fn with_context(texts: &[String], i: usize, config: &ChunkingConfig) -> String {
    let current = &texts[i];
    let budget = config
        .context_budget_chars
        .min(config.max_chars.saturating_sub(current.len()));
    let before_budget = (budget as f64 * CONTEXT_BEFORE_RATIO) as usize;
    let after_budget = budget - before_budget;

    let mut before: Vec<&str> = Vec::new();
    let mut spent = 0usize;
    for j in (0..i).rev() {
        let cost = texts[j].len() + CONTEXT_SEPARATOR.len();
        if spent + cost > before_budget {
            break;
        }
        spent += cost;
        before.insert(0, &texts[j]);
    }

    let mut after: Vec<&str> = Vec::new();
    spent = 0;
    for text in texts.iter().skip(i + 1) {
        let cost = text.len() + CONTEXT_SEPARATOR.len();
        if spent + cost > after_budget {
            break;
        }
        spent += cost;
        after.push(text);
    }

    let mut parts = before;
    parts.push(current);
    parts.extend(after);
    parts.join(CONTEXT_SEPARATOR)
}

/// Boundary kinds tried in order, coarsest first.
#[derive(Clone, Copy)]
enum SplitLevel {
    Paragraph,
    Line,
    Sentence,
    Word,
    Hard,
}

/// Split `text` into parts no longer than `max_chars`, preferring the
/// coarsest natural boundary that applies and falling back to finer ones
/// only for pieces that still exceed the limit.
pub fn recursive_split(text: &str, max_chars: usize) -> Vec<String> {
    split_at_level(text, max_chars, SplitLevel::Paragraph)
}

fn split_at_level(text: &str, max_chars: usize, level: SplitLevel) -> Vec<String> {
    if text.len() <= max_chars {
        return vec![text.to_string()];
    }

    match level {
        SplitLevel::Paragraph => {
            let pieces: Vec<&str> = text.split("\n\n").collect();
            pack_pieces(pieces, "\n\n", max_chars, SplitLevel::Line)
        }
        SplitLevel::Line => {
            let pieces: Vec<&str> = text.split('\n').collect();
            pack_pieces(pieces, "\n", max_chars, SplitLevel::Sentence)
        }
        SplitLevel::Sentence => {
            let pieces = split_sentences(text);
            pack_pieces(pieces, " ", max_chars, SplitLevel::Word)
        }
        SplitLevel::Word => {
            let pieces: Vec<&str> = text.split(' ').collect();
            pack_pieces(pieces, " ", max_chars, SplitLevel::Hard)
        }
        SplitLevel::Hard => hard_split(text, max_chars),
    }
}

/// Greedily pack pieces into parts of at most `max_chars`, rejoining with
/// the separator they were split on. Pieces that alone exceed the limit
/// recurse to the next-finer level.
fn pack_pieces(pieces: Vec<&str>, sep: &str, max_chars: usize, next: SplitLevel) -> Vec<String> {
    // A single piece means this boundary kind does not apply here.
    if pieces.len() <= 1 {
        let text = pieces.first().copied().unwrap_or("");
        return split_at_level(text, max_chars, next);
    }

    let mut parts: Vec<String> = Vec::new();
    let mut buf = String::new();

    for piece in pieces {
        if piece.len() > max_chars {
            if !buf.is_empty() {
                parts.push(std::mem::take(&mut buf));
            }
            parts.extend(split_at_level(piece, max_chars, next));
            continue;
        }

        let would_be = if buf.is_empty() {
            piece.len()
        } else {
            buf.len() + sep.len() + piece.len()
        };
        if would_be > max_chars && !buf.is_empty() {
            parts.push(std::mem::take(&mut buf));
        }
        if !buf.is_empty() {
            buf.push_str(sep);
        }
        buf.push_str(piece);
    }

    if !buf.is_empty() {
        parts.push(buf);
    }

    parts.retain(|p| !p.trim().is_empty());
    parts
}

/// Split after sentence-ending punctuation followed by a space, keeping the
/// punctuation attached to its sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();

    for i in 0..bytes.len().saturating_sub(1) {
        if matches!(bytes[i], b'.' | b'!' | b'?') && bytes[i + 1] == b' ' {
            pieces.push(text[start..=i].trim_end());
            start = i + 2;
        }
    }
    if start < text.len() {
        pieces.push(text[start..].trim_end());
    }

    pieces
}

/// Cut at `max_chars` boundaries regardless of content, snapping each cut
/// to a UTF-8 char boundary.
fn hard_split(text: &str, max_chars: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_chars {
            parts.push(remaining.to_string());
            break;
        }
        let mut cut = max_chars;
        while cut > 0 && !remaining.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            // Pathological max smaller than one char; take one char anyway.
            cut = remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len());
        }
        parts.push(remaining[..cut].to_string());
        remaining = &remaining[cut..];
    }

    parts
}

/// Prefix each fragment after the first with the tail of its predecessor so
/// adjacent fragments share context. The first fragment is unchanged.
pub fn add_overlap(parts: Vec<String>, overlap_chars: usize) -> Vec<String> {
    if parts.len() < 2 || overlap_chars == 0 {
        return parts;
    }

    let mut result = Vec::with_capacity(parts.len());
    for (i, part) in parts.iter().enumerate() {
        if i == 0 {
            result.push(part.clone());
            continue;
        }
        let prev = &parts[i - 1];
        let mut start = prev.len().saturating_sub(overlap_chars);
        while start < prev.len() && !prev.is_char_boundary(start) {
            start += 1;
        }
        result.push(format!("{}{}", &prev[start..], part));
    }
    result
}

/// Derive the (tools_used, files_touched, commands_run) metadata strings
/// from an assistant message's tool calls.
fn tool_metadata(tool_calls: &[ToolCall]) -> (String, String, String) {
    if tool_calls.is_empty() {
        return (String::new(), String::new(), String::new());
    }

    let names: BTreeSet<&str> = tool_calls
        .iter()
        .map(|tc| tc.name.as_str())
        .filter(|n| !n.is_empty())
        .collect();
    let tools_used = names.into_iter().collect::<Vec<_>>().join(",");

    let files = extract_files_from_tool_calls(tool_calls);
    let files_touched = files.into_iter().collect::<Vec<_>>().join(",");

    let commands_run = extract_commands_from_tool_calls(tool_calls).join(",");

    (tools_used, files_touched, commands_run)
}

/// File paths referenced by tool inputs.
///
/// Reads the common path-valued input keys directly, plus a best-effort
/// regex scan for quoted path-like strings inside `Bash` command inputs.
/// The regex is a lossy heuristic, not a shell parser.
pub fn extract_files_from_tool_calls(tool_calls: &[ToolCall]) -> BTreeSet<String> {
    static QUOTED_PATH: OnceLock<Regex> = OnceLock::new();
    let quoted_path = QUOTED_PATH
        .get_or_init(|| Regex::new(r#"["']([^"']+)["']"#).expect("literal pattern compiles"));

    let mut files = BTreeSet::new();

    for call in tool_calls {
        for key in ["file_path", "path", "notebook_path"] {
            if let Some(path) = call.input.get(key).and_then(|v| v.as_str()) {
                if !path.is_empty() {
                    files.insert(path.to_string());
                }
            }
        }

        if call.name == "Bash" {
            if let Some(command) = call.input.get("command").and_then(|v| v.as_str()) {
                for capture in quoted_path.captures_iter(command) {
                    let candidate = &capture[1];
                    if candidate.contains('/') || candidate.contains('.') {
                        files.insert(candidate.to_string());
                    }
                }
            }
        }
    }

    files
}

/// Shell command strings from `Bash` tool calls, each truncated to
/// [`MAX_COMMAND_CHARS`], at most [`MAX_COMMANDS`] per chunk.
pub fn extract_commands_from_tool_calls(tool_calls: &[ToolCall]) -> Vec<String> {
    tool_calls
        .iter()
        .filter(|tc| tc.name == "Bash")
        .filter_map(|tc| tc.input.get("command").and_then(|v| v.as_str()))
        .take(MAX_COMMANDS)
        .map(|cmd| {
            if cmd.chars().count() > MAX_COMMAND_CHARS {
                let truncated: String = cmd.chars().take(MAX_COMMAND_CHARS).collect();
                format!("{}...", truncated)
            } else {
                cmd.to_string()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkKind;

    fn msg(role: &str, content: &str, uuid: &str) -> Message {
        Message {
            role: role.to_string(),
            content: content.to_string(),
            uuid: uuid.to_string(),
            timestamp: format!("2025-01-15T10:00:00Z/{}", uuid),
            session_id: "test-session".to_string(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    fn default_config() -> ChunkingConfig {
        ChunkingConfig::default()
    }

    #[test]
    fn test_pairing_consumes_each_user_once() {
        let messages = vec![
            msg("user", "first question", "u1"),
            msg("assistant", "first answer", "a1"),
            msg("user", "second question", "u2"),
            msg("assistant", "second answer", "a2"),
            msg("user", "trailing question", "u3"),
        ];
        let exchanges = pair_exchanges(&messages, &[]);
        assert_eq!(exchanges.len(), 2);
        assert_eq!(exchanges[0].user.uuid, "u1");
        assert_eq!(exchanges[0].assistant.uuid, "a1");
        assert_eq!(exchanges[1].assistant.uuid, "a2");
    }

    #[test]
    fn test_unpaired_assistant_ignored() {
        let messages = vec![
            msg("assistant", "orphan answer", "a0"),
            msg("user", "question", "u1"),
            msg("assistant", "answer", "a1"),
        ];
        let exchanges = pair_exchanges(&messages, &[]);
        assert_eq!(exchanges.len(), 1);
        assert_eq!(exchanges[0].assistant.uuid, "a1");
    }

    #[test]
    fn test_excluded_user_message_drops_exchange() {
        let messages = vec![
            msg("user", "  Warmup  ", "u1"),
            msg("assistant", "warm reply", "a1"),
            msg("user", "real question", "u2"),
            msg("assistant", "real answer", "a2"),
        ];
        let exchanges = pair_exchanges(&messages, &["warmup".to_string()]);
        assert_eq!(exchanges.len(), 1);
        assert_eq!(exchanges[0].assistant.uuid, "a2");
    }

    #[test]
    fn test_exclusion_consumes_assistant_reply() {
        // The assistant reply to an excluded message must not pair with a
        // later user message.
        let messages = vec![
            msg("user", "warmup", "u1"),
            msg("assistant", "warm reply", "a1"),
            msg("user", "question", "u2"),
        ];
        let exchanges = pair_exchanges(&messages, &["warmup".to_string()]);
        assert!(exchanges.is_empty());
    }

    #[test]
    fn test_single_exchange_chunk_format() {
        let exchanges = pair_exchanges(
            &[
                msg("user", "What is Rust?", "u1"),
                msg("assistant", "A systems language.", "a1"),
            ],
            &[],
        );
        let chunks = chunk_exchanges(&exchanges, &default_config());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "a1");
        assert_eq!(
            chunks[0].text,
            "User: What is Rust?\n\nAssistant: A systems language."
        );
        assert_eq!(chunks[0].turn_index, 0);
        assert_eq!(chunks[0].parent_turn_id, "");
        assert_eq!(chunks[0].total_chunks, 1);
        assert_eq!(chunks[0].chunk_type, ChunkKind::Turn);
    }

    #[test]
    fn test_context_window_attached() {
        let exchanges = pair_exchanges(
            &[
                msg("user", "first", "u1"),
                msg("assistant", "one", "a1"),
                msg("user", "second", "u2"),
                msg("assistant", "two", "a2"),
                msg("user", "third", "u3"),
                msg("assistant", "three", "a3"),
            ],
            &[],
        );
        let chunks = chunk_exchanges(&exchanges, &default_config());
        assert_eq!(chunks.len(), 3);

        // Middle chunk sees both neighbors.
        let middle = &chunks[1];
        assert!(middle.text.contains("User: second"));
        assert!(middle.text.contains("User: first"));
        assert!(middle.text.contains("User: third"));
        assert!(middle.text.contains(CONTEXT_SEPARATOR));
    }

    #[test]
    fn test_context_never_exceeds_max_chars() {
        let near_limit = "x".repeat(1300);
        let exchanges = pair_exchanges(
            &[
                msg("user", &"context filler ".repeat(30), "u1"),
                msg("assistant", &"more filler ".repeat(30), "a1"),
                msg("user", "q", "u2"),
                msg("assistant", &near_limit, "a2"),
            ],
            &[],
        );
        let config = default_config();
        let chunks = chunk_exchanges(&exchanges, &config);
        for chunk in &chunks {
            assert!(
                chunk.text.len() <= config.max_chars + config.overlap_chars,
                "chunk {} is {} chars",
                chunk.id,
                chunk.text.len()
            );
        }
    }

    #[test]
    fn test_oversized_exchange_split_into_fragments() {
        let long_response = "This is a very detailed response. ".repeat(200); // ~6800 chars
        let exchanges = pair_exchanges(
            &[
                msg("user", "Tell me everything", "u1"),
                msg("assistant", &long_response, "a1"),
            ],
            &[],
        );
        let config = default_config();
        let chunks = chunk_exchanges(&exchanges, &config);

        assert!(chunks.len() >= 2);
        let total = chunks.len() as i64;
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.id, format!("a1-{}", i));
            assert_eq!(chunk.parent_turn_id, "a1");
            assert_eq!(chunk.chunk_index, i as i64);
            assert_eq!(chunk.total_chunks, total);
            assert!(chunk.chunk_index < chunk.total_chunks);
            assert!(chunk.text.len() <= config.max_chars + config.overlap_chars);
        }
    }

    #[test]
    fn test_fragment_indices_contiguous_and_turn_preserved() {
        let exchanges = pair_exchanges(
            &[
                msg("user", "short", "u1"),
                msg("assistant", "short answer", "a1"),
                msg("user", "long", "u2"),
                msg("assistant", &"word ".repeat(1000), "a2"),
            ],
            &[],
        );
        let chunks = chunk_exchanges(&exchanges, &default_config());
        let fragments: Vec<_> = chunks.iter().filter(|c| c.parent_turn_id == "a2").collect();
        assert!(fragments.len() >= 2);
        for (i, fragment) in fragments.iter().enumerate() {
            assert_eq!(fragment.chunk_index, i as i64);
            assert_eq!(fragment.turn_index, 1);
        }
    }

    #[test]
    fn test_recursive_split_short_text_untouched() {
        let parts = recursive_split("short text", 1400);
        assert_eq!(parts, vec!["short text".to_string()]);
    }

    #[test]
    fn test_recursive_split_prefers_paragraphs() {
        let paragraph = "A".repeat(500);
        let text = format!(
            "{p}\n\n{p}\n\n{p}\n\n{p}",
            p = paragraph
        );
        let parts = recursive_split(&text, 1400);
        assert!(parts.len() > 1);
        for part in &parts {
            assert!(part.len() <= 1400);
            // Paragraph splitting keeps whole paragraphs intact.
            assert!(part.starts_with('A'));
        }
    }

    #[test]
    fn test_recursive_split_falls_back_to_lines() {
        let line = "B".repeat(200);
        let text = vec![line; 10].join("\n");
        let parts = recursive_split(&text, 1400);
        assert!(parts.len() > 1);
        for part in &parts {
            assert!(part.len() <= 1400);
        }
    }

    #[test]
    fn test_recursive_split_falls_back_to_sentences() {
        let sentence = "C".repeat(150);
        let text = vec![sentence; 15].join(". ");
        let parts = recursive_split(&text, 1400);
        assert!(parts.len() > 1);
        for part in &parts {
            assert!(part.len() <= 1400);
        }
    }

    #[test]
    fn test_recursive_split_hard_cuts_long_word() {
        let text = "X".repeat(1900);
        let parts = recursive_split(&text, 1400);
        assert!(parts.len() > 1);
        for part in &parts[..parts.len() - 1] {
            assert!(part.len() <= 1400);
        }
    }

    #[test]
    fn test_recursive_split_parts_cover_original() {
        let text = "The quick brown fox. ".repeat(120);
        let parts = recursive_split(&text, 400);
        // Every part is a verbatim slice of the original, in order.
        let mut cursor = 0;
        for part in &parts {
            let found = text[cursor..]
                .find(part.as_str())
                .expect("part missing from original");
            cursor += found + part.len();
        }
    }

    #[test]
    fn test_add_overlap_prefixes_previous_tail() {
        let first = "first chunk with some content ".repeat(10);
        let parts = vec![first.clone(), "second chunk starts here".to_string()];
        let result = add_overlap(parts.clone(), 200);

        assert_eq!(result.len(), 2);
        assert_eq!(result[0], parts[0]);
        let tail = &first[first.len() - 200..];
        assert!(result[1].starts_with(tail));
        assert!(result[1].ends_with("second chunk starts here"));
    }

    #[test]
    fn test_add_overlap_single_part_unchanged() {
        let parts = vec!["only one".to_string()];
        assert_eq!(add_overlap(parts.clone(), 200), parts);
        assert!(add_overlap(Vec::new(), 200).is_empty());
    }

    #[test]
    fn test_tool_metadata_attached() {
        let mut assistant = msg("assistant", "done", "a1");
        assistant.tool_calls = vec![
            ToolCall {
                name: "Read".to_string(),
                input: serde_json::json!({"file_path": "/src/main.rs"}),
                id: "t1".to_string(),
            },
            ToolCall {
                name: "Bash".to_string(),
                input: serde_json::json!({"command": "cat \"/path/to/file.txt\""}),
                id: "t2".to_string(),
            },
            ToolCall {
                name: "Read".to_string(),
                input: serde_json::json!({"file_path": "/src/main.rs"}),
                id: "t3".to_string(),
            },
        ];
        let exchanges = pair_exchanges(&[msg("user", "do it", "u1"), assistant], &[]);
        let chunks = chunk_exchanges(&exchanges, &default_config());
        assert_eq!(chunks[0].tools_used, "Bash,Read");
        assert!(chunks[0].files_touched.contains("/src/main.rs"));
        assert!(chunks[0].files_touched.contains("/path/to/file.txt"));
        assert_eq!(chunks[0].commands_run, "cat \"/path/to/file.txt\"");
    }

    #[test]
    fn test_commands_truncated_and_capped() {
        let long_command = "x".repeat(300);
        let calls: Vec<ToolCall> = (0..7)
            .map(|i| ToolCall {
                name: "Bash".to_string(),
                input: serde_json::json!({ "command": format!("{}-{}", long_command, i) }),
                id: format!("t{}", i),
            })
            .collect();
        let commands = extract_commands_from_tool_calls(&calls);
        assert_eq!(commands.len(), 5);
        for command in &commands {
            assert_eq!(command.chars().count(), 203);
            assert!(command.ends_with("..."));
        }
    }

    #[test]
    fn test_non_bash_tools_yield_no_commands() {
        let calls = vec![ToolCall {
            name: "Read".to_string(),
            input: serde_json::json!({"file_path": "/foo.rs"}),
            id: "t1".to_string(),
        }];
        assert!(extract_commands_from_tool_calls(&calls).is_empty());
    }

    #[test]
    fn test_quoted_path_extraction_from_bash() {
        let calls = vec![
            ToolCall {
                name: "Bash".to_string(),
                input: serde_json::json!({"command": "python 'script.py'"}),
                id: "t1".to_string(),
            },
            ToolCall {
                name: "Bash".to_string(),
                input: serde_json::json!({"command": "echo 'plainword'"}),
                id: "t2".to_string(),
            },
        ];
        let files = extract_files_from_tool_calls(&calls);
        assert!(files.contains("script.py"));
        assert!(!files.contains("plainword"));
    }

    #[test]
    fn test_no_exchanges_yields_no_chunks() {
        let chunks = chunk_exchanges(&[], &default_config());
        assert!(chunks.is_empty());
    }
}
