//! # convo-memory CLI (`cvm`)
//!
//! The `cvm` binary indexes AI assistant conversation transcripts and
//! searches them with a hybrid keyword + semantic retriever.
//!
//! ## Usage
//!
//! ```bash
//! cvm --config ./config/cvm.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cvm sync` | Ingest new/changed transcripts and update both indexes |
//! | `cvm search "<query>"` | Hybrid search over indexed chunks |
//! | `cvm summarize` | Generate per-session summaries via Ollama |
//! | `cvm stats` | Show storage and index coverage |
//! | `cvm rebuild` | Rebuild both indexes from the chunk log |
//! | `cvm clear` | Empty both indexes (chunk log untouched) |
//! | `cvm config` | Print the effective configuration |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use convo_memory::{config, embedding, search, stats, sync};

/// convo-memory CLI — index and search AI assistant conversation history.
#[derive(Parser)]
#[command(
    name = "cvm",
    about = "convo-memory — local-first search over AI assistant conversation transcripts",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/cvm.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest new or changed transcripts, then update both indexes.
    ///
    /// Incremental and idempotent: unchanged transcripts are skipped via
    /// mtime markers, and chunks already in the log are never re-appended.
    Sync {
        /// Suppress progress output.
        #[arg(long)]
        quiet: bool,

        /// Also generate per-session summaries (requires ollama).
        #[arg(long)]
        summaries: bool,
    },

    /// Search indexed conversation chunks.
    Search {
        /// The search query. Plain terms become a prefix-OR FTS query;
        /// AND/OR/NOT and quoted phrases pass through as-is.
        query: String,

        /// Maximum number of results.
        #[arg(short = 'n', long = "num-results")]
        n: Option<usize>,

        /// Return every matching fragment instead of collapsing split
        /// turns to their best fragment.
        #[arg(long)]
        no_dedupe: bool,

        /// Skip the keyword index and rank by vector distance alone.
        #[arg(long)]
        vector_only: bool,
    },

    /// Generate per-session summaries for conversations without one.
    Summarize {
        /// Regenerate summaries that already exist.
        #[arg(long)]
        force: bool,
    },

    /// Show storage and index statistics.
    Stats,

    /// Rebuild both indexes from the chunk log.
    Rebuild,

    /// Empty both indexes. The chunk log is untouched.
    Clear,

    /// Print the effective configuration and derived paths.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Sync { quiet, summaries } => sync::run_sync(&config, quiet, summaries).await?,
        Commands::Search {
            query,
            n,
            no_dedupe,
            vector_only,
        } => {
            let n = n.unwrap_or(config.retrieval.num_results);
            search::run_search(&config, &query, n, no_dedupe, vector_only).await?;
        }
        Commands::Summarize { force } => sync::run_summarize(&config, force).await?,
        Commands::Stats => stats::run_stats(&config).await?,
        Commands::Rebuild => sync::run_rebuild(&config).await?,
        Commands::Clear => sync::run_clear(&config).await?,
        Commands::Config => print_config(&config),
    }

    Ok(())
}

fn print_config(config: &config::Config) {
    println!("[sources]");
    println!(
        "  transcripts_dir = {}",
        config.sources.transcripts_dir.display()
    );
    println!("  include_globs = {:?}", config.sources.include_globs);
    println!();
    println!("[storage]");
    println!("  dir = {}", config.storage.dir.display());
    println!("  machine_id = {}", config.storage.machine_id);
    println!("  shard = {}", config.shard_path().display());
    println!("  vector db = {}", config.vector_db_path().display());
    println!("  text index db = {}", config.text_index_db_path().display());
    println!();
    println!("[chunking]");
    println!("  max_chars = {}", config.chunking.max_chars);
    println!("  overlap_chars = {}", config.chunking.overlap_chars);
    println!(
        "  context_budget_chars = {}",
        config.chunking.context_budget_chars
    );
    println!(
        "  excluded_messages = {:?}",
        config.chunking.excluded_messages
    );
    println!();
    println!("[retrieval]");
    println!("  num_results = {}", config.retrieval.num_results);
    println!();
    println!("[embedding]");
    println!("  provider = {}", config.embedding.provider);
    if let Some(ref model) = config.embedding.model {
        println!("  model = {}", model);
    }
    if let Some(dims) = config.embedding.dims {
        println!("  dims = {}", dims);
    }
    match embedding::create_provider(&config.embedding) {
        Ok(provider) => println!(
            "  backend = {} ({} dims)",
            provider.model_name(),
            provider.dims()
        ),
        Err(err) => println!("  backend = unavailable ({})", err),
    }
    println!("  batch_size = {}", config.embedding.batch_size);
    println!();
    println!("[summarizer]");
    println!("  provider = {}", config.summarizer.provider);
    println!("  model = {}", config.summarizer.model);
    println!("  min_turns = {}", config.summarizer.min_turns);
}
