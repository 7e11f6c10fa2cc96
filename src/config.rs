use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    pub sources: SourcesConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
}

/// Where transcript files come from.
#[derive(Debug, Deserialize, Clone)]
pub struct SourcesConfig {
    /// Directory holding transcript files (one conversation per file).
    pub transcripts_dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

fn default_include_globs() -> Vec<String> {
    vec!["*.jsonl".to_string()]
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            transcripts_dir: PathBuf::new(),
            include_globs: default_include_globs(),
        }
    }
}

/// Where the chunk log, marker table, and index databases live.
///
/// Point `dir` at a git-synced directory to share memory across machines;
/// each machine appends to its own `chunks-{machine_id}.jsonl` shard.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub dir: PathBuf,
    #[serde(default = "default_machine_id")]
    pub machine_id: String,
}

fn default_machine_id() -> String {
    "local".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::new(),
            machine_id: default_machine_id(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Hard ceiling on chunk payload size, in characters.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    /// Tail of fragment N prefixed onto fragment N+1 when an exchange is split.
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
    /// Total character budget for surrounding-exchange context.
    #[serde(default = "default_context_budget_chars")]
    pub context_budget_chars: usize,
    /// User messages (trimmed, lowercased) that produce no exchange.
    #[serde(default = "default_excluded_messages")]
    pub excluded_messages: Vec<String>,
}

fn default_max_chars() -> usize {
    1400
}
fn default_overlap_chars() -> usize {
    200
}
fn default_context_budget_chars() -> usize {
    600
}
fn default_excluded_messages() -> Vec<String> {
    vec!["warmup".to_string()]
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
            context_budget_chars: default_context_budget_chars(),
            excluded_messages: default_excluded_messages(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Default number of results returned by `cvm search`.
    #[serde(default = "default_num_results")]
    pub num_results: usize,
}

fn default_num_results() -> usize {
    5
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            num_results: default_num_results(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"hash"`, `"openai"`, or `"disabled"`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SummarizerConfig {
    /// `"ollama"` or `"disabled"`.
    #[serde(default = "default_summarizer_provider")]
    pub provider: String,
    #[serde(default = "default_summarizer_model")]
    pub model: String,
    /// Subprocess budget per conversation; expiry skips that conversation.
    #[serde(default = "default_summarize_timeout_secs")]
    pub timeout_secs: u64,
    /// Conversations with fewer exchanges than this are not summarized.
    #[serde(default = "default_min_turns")]
    pub min_turns: usize,
}

fn default_summarizer_provider() -> String {
    "disabled".to_string()
}
fn default_summarizer_model() -> String {
    "qwen2.5:1.5b".to_string()
}
fn default_summarize_timeout_secs() -> u64 {
    60
}
fn default_min_turns() -> usize {
    2
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            provider: default_summarizer_provider(),
            model: default_summarizer_model(),
            timeout_secs: default_summarize_timeout_secs(),
            min_turns: default_min_turns(),
        }
    }
}

impl Config {
    /// Path of this machine's append-only log shard.
    pub fn shard_path(&self) -> PathBuf {
        self.storage
            .dir
            .join(format!("chunks-{}.jsonl", self.storage.machine_id))
    }

    /// Path of the unsuffixed legacy shard (read, never written).
    pub fn legacy_shard_path(&self) -> PathBuf {
        self.storage.dir.join("chunks.jsonl")
    }

    /// Path of the processed-marker table.
    pub fn processed_path(&self) -> PathBuf {
        self.storage.dir.join("processed.json")
    }

    /// Path of the vector index database.
    pub fn vector_db_path(&self) -> PathBuf {
        self.storage.dir.join("vectors.db")
    }

    /// Path of the keyword index database.
    pub fn text_index_db_path(&self) -> PathBuf {
        self.storage.dir.join("text_index.db")
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl SummarizerConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.max_chars");
    }
    if config.retrieval.num_results == 0 {
        anyhow::bail!("retrieval.num_results must be >= 1");
    }
    if config.storage.machine_id.trim().is_empty()
        || config.storage.machine_id.contains(['/', '\\'])
    {
        anyhow::bail!("storage.machine_id must be a non-empty name without path separators");
    }

    match config.embedding.provider.as_str() {
        "hash" | "disabled" => {}
        "openai" => {
            if config.embedding.model.is_none() {
                anyhow::bail!("embedding.model must be specified when provider is 'openai'");
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!("embedding.dims must be > 0 when provider is 'openai'");
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hash, openai, or disabled.",
            other
        ),
    }

    match config.summarizer.provider.as_str() {
        "ollama" | "disabled" => {}
        other => anyhow::bail!(
            "Unknown summarizer provider: '{}'. Must be ollama or disabled.",
            other
        ),
    }

    Ok(config)
}
