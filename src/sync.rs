//! Sync orchestration: log ingestion followed by index catch-up.
//!
//! `cvm sync` runs two phases back to back. Phase one walks the transcript
//! directory and appends new chunks to the log; phase two brings both
//! indexes up to the merged log. The phases are independently restartable:
//! each only adds what is missing, so a crash between them is repaired by
//! the next run.

use anyhow::Result;

use crate::chunk_log;
use crate::config::Config;
use crate::embedding;
use crate::store::VectorIndex;
use crate::summarizer;
use crate::text_index::KeywordIndex;

/// Run a full sync pass; with `summaries`, also generate session
/// summaries before indexing.
pub async fn run_sync(config: &Config, quiet: bool, summaries: bool) -> Result<()> {
    let outcome = chunk_log::sync(config)?;
    if !quiet {
        println!("sync {}", config.sources.transcripts_dir.display());
        println!(
            "  new chunks: {} (from {} files)",
            outcome.new_chunks, outcome.new_files
        );
    }

    if summaries {
        if config.summarizer.is_enabled() {
            let backend = summarizer::create_summarizer(config)?;
            let (generated, failed) =
                summarizer::sync_summaries(config, backend.as_ref(), false).await?;
            if !quiet {
                println!("  summaries: {} generated, {} failed", generated, failed);
            }
        } else if !quiet {
            println!("  summaries: skipped (summarizer disabled)");
        }
    }

    let chunks = chunk_log::load_all(config)?;

    let store = VectorIndex::open(config).await?;
    let embedded = if config.embedding.is_enabled() {
        // Surfaces a misconfigured backend (missing API key, bad provider
        // name) before any rows are written.
        let provider = embedding::create_provider(&config.embedding)?;
        if !quiet {
            println!(
                "  embedding with {} ({} dims)",
                provider.model_name(),
                provider.dims()
            );
        }
        store.rebuild(&chunks).await?
    } else {
        0
    };

    let text_index = KeywordIndex::open(config).await?;
    let indexed = text_index.rebuild(&chunks).await?;

    if !quiet {
        println!("  embeddings written: {}", embedded);
        println!("  keyword entries written: {}", indexed);
        println!(
            "  total: {} chunks, {} embedded, {} keyword-indexed",
            chunks.len(),
            store.count().await?,
            text_index.count().await?
        );
        println!("ok");
    }

    Ok(())
}

/// Drop both indexes and rebuild them from the chunk log. The log itself
/// is untouched.
pub async fn run_rebuild(config: &Config) -> Result<()> {
    let chunks = chunk_log::load_all(config)?;

    let store = VectorIndex::open(config).await?;
    store.clear().await?;
    let embedded = if config.embedding.is_enabled() {
        embedding::create_provider(&config.embedding)?;
        store.rebuild(&chunks).await?
    } else {
        0
    };

    let text_index = KeywordIndex::open(config).await?;
    text_index.clear().await?;
    let indexed = text_index.rebuild(&chunks).await?;

    println!(
        "rebuilt indexes from {} chunks ({} embedded, {} keyword-indexed)",
        chunks.len(),
        embedded,
        indexed
    );
    Ok(())
}

/// Empty both indexes without touching the chunk log.
pub async fn run_clear(config: &Config) -> Result<()> {
    let store = VectorIndex::open(config).await?;
    store.clear().await?;
    let text_index = KeywordIndex::open(config).await?;
    text_index.clear().await?;
    println!("cleared both indexes (chunk log untouched)");
    Ok(())
}

/// Standalone summary generation, `cvm summarize`.
pub async fn run_summarize(config: &Config, force: bool) -> Result<()> {
    if !config.summarizer.is_enabled() {
        anyhow::bail!("summarizer is disabled; set [summarizer] provider in config");
    }
    let backend = summarizer::create_summarizer(config)?;
    let (generated, failed) = summarizer::sync_summaries(config, backend.as_ref(), force).await?;
    println!("summaries: {} generated, {} failed", generated, failed);

    if generated > 0 {
        // New summary chunks need indexing to become searchable.
        let chunks = chunk_log::load_all(config)?;
        let store = VectorIndex::open(config).await?;
        if config.embedding.is_enabled() {
            store.rebuild(&chunks).await?;
        }
        let text_index = KeywordIndex::open(config).await?;
        text_index.rebuild(&chunks).await?;
    }

    Ok(())
}
