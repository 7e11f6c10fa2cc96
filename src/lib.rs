//! # convo-memory
//!
//! Local-first indexing and retrieval over AI assistant chat transcripts.
//!
//! convo-memory watches a directory of JSONL conversation transcripts,
//! chunks each conversation into user/assistant exchanges, appends them to
//! a per-machine JSONL chunk log, and maintains two derived indexes — a
//! vector index for semantic similarity and an FTS5 keyword index — that
//! a hybrid retriever merges at query time.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌───────────────────────┐
//! │ Transcripts │──▶│   Chunker     │──▶│  Chunk log (JSONL      │
//! │  (*.jsonl)  │   │ pair + split  │   │  shards, append-only)  │
//! └────────────┘   └──────────────┘   └──────────┬────────────┘
//!                                                 │
//!                              ┌──────────────────┤
//!                              ▼                  ▼
//!                       ┌────────────┐     ┌─────────────┐
//!                       │ vectors.db  │     │ text_index   │
//!                       │ (cosine)    │     │ .db (FTS5)   │
//!                       └──────┬─────┘     └──────┬──────┘
//!                              └────────┬─────────┘
//!                                       ▼
//!                               hybrid retriever
//! ```
//!
//! The chunk log is the source of truth; both databases are disposable
//! caches rebuilt from it with `cvm rebuild`.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and path layout |
//! | [`models`] | Core data types |
//! | [`parser`] | Transcript JSONL parsing |
//! | [`chunker`] | Exchange pairing, context windows, recursive splitting |
//! | [`chunk_log`] | Append-only shard log and incremental sync |
//! | [`embedding`] | Embedding providers and vector utilities |
//! | [`store`] | Vector index (`vectors.db`) |
//! | [`text_index`] | Keyword index (`text_index.db`) |
//! | [`search`] | Hybrid retriever |
//! | [`summarizer`] | Per-session summary generation |
//! | [`sync`] | Sync / rebuild / clear orchestration |
//! | [`stats`] | Storage overview |
//! | [`db`] | SQLite connection setup |

pub mod chunk_log;
pub mod chunker;
pub mod config;
pub mod db;
pub mod embedding;
pub mod models;
pub mod parser;
pub mod search;
pub mod stats;
pub mod store;
pub mod summarizer;
pub mod sync;
pub mod text_index;
