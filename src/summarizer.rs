//! Session summaries: one synthetic chunk per conversation, generated by a
//! local Ollama model and appended to the chunk log alongside turn chunks.
//!
//! Summary chunks use the id `summary-{session_id}` and `turn_index = -1`,
//! so re-running the summarizer replaces an existing summary through the
//! log's last-write-wins dedup instead of duplicating it.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use crate::chunk_log;
use crate::chunker::pair_exchanges;
use crate::config::Config;
use crate::models::{ChunkKind, ChunkRecord, Exchange};
use crate::parser::{get_source_files, parse_conversation};

/// Messages longer than this are truncated before entering the prompt.
const MAX_MESSAGE_CHARS: usize = 1000;

/// Conversations are capped at this many exchanges in the prompt.
const MAX_PROMPT_TURNS: usize = 50;

const SUMMARY_PROMPT: &str = "Summarize this conversation in 2-3 sentences. \
Focus on what was asked, what was decided, and any files or tools involved. \
Reply with only the summary.\n\nConversation:\n";

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Whether the backend can be reached at all.
    async fn available(&self) -> bool;
    /// Summarize one conversation's prompt text.
    async fn summarize(&self, text: &str) -> Result<String>;
}

/// Backend shelling out to `ollama run <model>`.
pub struct OllamaSummarizer {
    model: String,
    timeout: Duration,
}

impl OllamaSummarizer {
    pub fn new(config: &Config) -> Self {
        Self {
            model: config.summarizer.model.clone(),
            timeout: Duration::from_secs(config.summarizer.timeout_secs),
        }
    }
}

#[async_trait]
impl Summarizer for OllamaSummarizer {
    async fn available(&self) -> bool {
        let probe = tokio::process::Command::new("ollama")
            .arg("list")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        matches!(
            tokio::time::timeout(Duration::from_secs(5), probe).await,
            Ok(Ok(status)) if status.success()
        )
    }

    async fn summarize(&self, text: &str) -> Result<String> {
        let prompt = format!("{}{}", SUMMARY_PROMPT, text);

        let child = tokio::process::Command::new("ollama")
            .arg("run")
            .arg(&self.model)
            .arg(&prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| anyhow::anyhow!("ollama timed out after {:?}", self.timeout))?
            .context("running ollama")?;

        if !output.status.success() {
            bail!(
                "ollama exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let summary = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if summary.is_empty() {
            bail!("ollama returned an empty summary");
        }
        Ok(summary)
    }
}

/// Backend for `summarizer.provider = "disabled"`.
pub struct DisabledSummarizer;

#[async_trait]
impl Summarizer for DisabledSummarizer {
    async fn available(&self) -> bool {
        false
    }
    async fn summarize(&self, _text: &str) -> Result<String> {
        bail!("summarizer is disabled")
    }
}

pub fn create_summarizer(config: &Config) -> Result<Box<dyn Summarizer>> {
    match config.summarizer.provider.as_str() {
        "ollama" => Ok(Box::new(OllamaSummarizer::new(config))),
        "disabled" => Ok(Box::new(DisabledSummarizer)),
        other => bail!("unknown summarizer provider: {}", other),
    }
}

/// Render a conversation as prompt text.
///
/// Returns the text, the timestamp of the last assistant message, and the
/// exchange count.
pub fn conversation_text(exchanges: &[Exchange]) -> (String, String, usize) {
    let mut blocks = Vec::new();
    for exchange in exchanges.iter().take(MAX_PROMPT_TURNS) {
        blocks.push(format!(
            "User: {}\n\nAssistant: {}",
            truncate_chars(&exchange.user.content, MAX_MESSAGE_CHARS),
            truncate_chars(&exchange.assistant.content, MAX_MESSAGE_CHARS),
        ));
    }

    let last_timestamp = exchanges
        .last()
        .map(|e| e.assistant.timestamp.clone())
        .unwrap_or_default();

    (blocks.join("\n\n---\n\n"), last_timestamp, exchanges.len())
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut)
}

/// Generate summaries for conversations that do not have one yet.
///
/// Returns `(generated, failed)`. With `force`, existing summaries are
/// regenerated and replace their old log entries. A failing conversation
/// is reported and skipped without aborting the pass.
pub async fn sync_summaries(
    config: &Config,
    summarizer: &dyn Summarizer,
    force: bool,
) -> Result<(usize, usize)> {
    if !summarizer.available().await {
        bail!("summarizer backend is not available (is ollama running?)");
    }

    let existing_ids = chunk_log::load_ids(config)?;
    let mut generated = 0;
    let mut failed = 0;

    for path in get_source_files(config)? {
        let Some(session_id) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let summary_id = format!("summary-{}", session_id);
        if !force && existing_ids.contains(&summary_id) {
            continue;
        }

        let messages = match parse_conversation(&path) {
            Ok(messages) => messages,
            Err(err) => {
                eprintln!("warning: skipping {}: {}", path.display(), err);
                failed += 1;
                continue;
            }
        };
        let exchanges = pair_exchanges(&messages, &config.chunking.excluded_messages);
        if exchanges.len() < config.summarizer.min_turns {
            continue;
        }

        let (text, last_timestamp, _) = conversation_text(&exchanges);

        let summary = match summarizer.summarize(&text).await {
            Ok(summary) => summary,
            Err(err) => {
                eprintln!("warning: summarizing {} failed: {}", session_id, err);
                failed += 1;
                continue;
            }
        };

        let record = ChunkRecord {
            chunk_type: ChunkKind::Summary,
            turn_index: -1,
            ..ChunkRecord::turn(&summary_id, summary, &last_timestamp, session_id, 0)
        };
        chunk_log::append(config, &[record])?;
        generated += 1;
    }

    Ok((generated, failed))
}
