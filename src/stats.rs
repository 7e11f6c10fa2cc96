//! Storage statistics and health overview.
//!
//! A quick summary of what's on disk and indexed: shard files, chunk and
//! session counts, and index coverage. Used by `cvm stats` to give
//! confidence that syncs are working as expected.

use std::collections::HashSet;

use anyhow::Result;

use crate::chunk_log;
use crate::config::Config;
use crate::embedding;
use crate::models::ChunkKind;
use crate::store::VectorIndex;
use crate::text_index::KeywordIndex;

pub async fn run_stats(config: &Config) -> Result<()> {
    let shards = chunk_log::shard_files(config)?;
    let chunks = chunk_log::load_all(config)?;

    let sessions: HashSet<&str> = chunks.iter().map(|c| c.session_id.as_str()).collect();
    let summaries = chunks
        .iter()
        .filter(|c| c.chunk_type == ChunkKind::Summary)
        .count();
    let split_turns: HashSet<&str> = chunks
        .iter()
        .filter(|c| !c.parent_turn_id.is_empty())
        .map(|c| c.parent_turn_id.as_str())
        .collect();

    let store = VectorIndex::open(config).await?;
    let text_index = KeywordIndex::open(config).await?;
    let embedded = store.count().await?;
    let keyword_indexed = text_index.count().await?;

    println!("convo-memory — storage stats");
    println!("============================");
    println!();
    println!("  Storage dir:  {}", config.storage.dir.display());
    println!("  Machine id:   {}", config.storage.machine_id);
    println!();
    println!("  Shards:       {}", shards.len());
    for shard in &shards {
        let size = std::fs::metadata(shard).map(|m| m.len()).unwrap_or(0);
        let name = shard
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("(unnamed)");
        println!("    {} ({})", name, format_bytes(size));
    }
    println!();
    println!("  Chunks:       {}", chunks.len());
    println!("  Sessions:     {}", sessions.len());
    println!("  Summaries:    {}", summaries);
    println!("  Split turns:  {}", split_turns.len());
    println!();
    println!("  Embedding:    {}", embedding_label(config));
    println!(
        "  Embedded:     {} / {} ({}%)",
        embedded,
        chunks.len(),
        percent(embedded, chunks.len())
    );
    println!(
        "  Keyword:      {} / {} ({}%)",
        keyword_indexed,
        chunks.len(),
        percent(keyword_indexed, chunks.len())
    );

    Ok(())
}

fn embedding_label(config: &Config) -> String {
    if !config.embedding.is_enabled() {
        return "disabled".to_string();
    }
    match embedding::create_provider(&config.embedding) {
        Ok(provider) => format!("{} ({} dims)", provider.model_name(), provider.dims()),
        Err(err) => format!("{} (unavailable: {})", config.embedding.provider, err),
    }
}

fn percent(part: i64, whole: usize) -> i64 {
    if whole == 0 {
        0
    } else {
        part * 100 / whole as i64
    }
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
