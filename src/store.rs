//! Vector index: chunk embeddings plus denormalized chunk metadata in
//! `vectors.db`.
//!
//! The index is a derived view of the chunk log and can be dropped and
//! rebuilt at any time. Embeddings are little-endian f32 BLOBs; similarity
//! runs in-process over all rows, which is comfortably fast at the scale of
//! personal conversation history.

use std::collections::HashSet;

use anyhow::Result;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::config::Config;
use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, embed_query, embed_texts, vec_to_blob};
use crate::models::{ChunkKind, ChunkMeta, ChunkRecord};

/// A nearest-neighbor hit: chunk id, cosine distance (lower is better),
/// and the chunk's metadata.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub chunk_id: String,
    pub distance: f64,
    pub meta: ChunkMeta,
}

pub struct VectorIndex {
    pool: SqlitePool,
    config: Config,
}

impl VectorIndex {
    /// Open `vectors.db`, creating the schema if needed.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(&config.vector_db_path()).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunk_vectors (
                chunk_id TEXT PRIMARY KEY,
                embedding BLOB NOT NULL,
                text TEXT NOT NULL,
                session_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                chunk_type TEXT NOT NULL DEFAULT 'turn',
                turn_index INTEGER NOT NULL DEFAULT 0,
                parent_turn_id TEXT NOT NULL DEFAULT '',
                chunk_index INTEGER NOT NULL DEFAULT 0,
                total_chunks INTEGER NOT NULL DEFAULT 1,
                tools_used TEXT NOT NULL DEFAULT '',
                files_touched TEXT NOT NULL DEFAULT '',
                commands_run TEXT NOT NULL DEFAULT ''
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self {
            pool,
            config: config.clone(),
        })
    }

    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM chunk_vectors")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    /// Ids already present in the index.
    pub async fn indexed_ids(&self) -> Result<HashSet<String>> {
        let rows = sqlx::query("SELECT chunk_id FROM chunk_vectors")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get("chunk_id")).collect())
    }

    /// Embed and insert any chunks not yet indexed; returns how many were
    /// added. Already-indexed ids are left untouched, so the result of a
    /// rebuild does not depend on how chunks arrive across calls.
    pub async fn rebuild(&self, chunks: &[ChunkRecord]) -> Result<usize> {
        let existing = self.indexed_ids().await?;
        let missing: Vec<&ChunkRecord> = chunks
            .iter()
            .filter(|c| !existing.contains(&c.id))
            .collect();

        if missing.is_empty() {
            return Ok(0);
        }

        let batch_size = self.config.embedding.batch_size.max(1);
        let mut added = 0;

        for batch in missing.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embeddings = embed_texts(&self.config.embedding, &texts).await?;

            for (chunk, embedding) in batch.iter().zip(embeddings.iter()) {
                sqlx::query(
                    r#"
                    INSERT OR REPLACE INTO chunk_vectors
                        (chunk_id, embedding, text, session_id, timestamp,
                         chunk_type, turn_index, parent_turn_id, chunk_index,
                         total_chunks, tools_used, files_touched, commands_run)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&chunk.id)
                .bind(vec_to_blob(embedding))
                .bind(&chunk.text)
                .bind(&chunk.session_id)
                .bind(&chunk.timestamp)
                .bind(chunk.chunk_type.as_str())
                .bind(chunk.turn_index)
                .bind(&chunk.parent_turn_id)
                .bind(chunk.chunk_index)
                .bind(chunk.total_chunks)
                .bind(&chunk.tools_used)
                .bind(&chunk.files_touched)
                .bind(&chunk.commands_run)
                .execute(&self.pool)
                .await?;
                added += 1;
            }
        }

        Ok(added)
    }

    /// Nearest chunks to `text` by cosine distance, best first.
    ///
    /// Candidates whose similarity is zero or negative are dropped rather
    /// than ranked, so a query sharing no vocabulary with the corpus
    /// returns nothing instead of its least-bad neighbor.
    pub async fn query(&self, text: &str, n: usize) -> Result<Vec<VectorHit>> {
        if n == 0 {
            return Ok(Vec::new());
        }

        let query_vec = embed_query(&self.config.embedding, text).await?;

        let rows = sqlx::query(
            r#"
            SELECT chunk_id, embedding, text, session_id, timestamp,
                   chunk_type, turn_index, parent_turn_id, chunk_index,
                   total_chunks, tools_used, files_touched, commands_run
            FROM chunk_vectors
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<VectorHit> = Vec::new();
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            let similarity = cosine_similarity(&query_vec, &blob_to_vec(&blob));
            if similarity <= 0.0 {
                continue;
            }
            let chunk_type: String = row.get("chunk_type");
            hits.push(VectorHit {
                chunk_id: row.get("chunk_id"),
                distance: 1.0 - similarity as f64,
                meta: ChunkMeta {
                    text: row.get("text"),
                    session_id: row.get("session_id"),
                    timestamp: row.get("timestamp"),
                    chunk_type: ChunkKind::parse(&chunk_type),
                    turn_index: row.get("turn_index"),
                    parent_turn_id: row.get("parent_turn_id"),
                    chunk_index: row.get("chunk_index"),
                    total_chunks: row.get("total_chunks"),
                    tools_used: row.get("tools_used"),
                    files_touched: row.get("files_touched"),
                    commands_run: row.get("commands_run"),
                },
            });
        }

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(n);
        Ok(hits)
    }

    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM chunk_vectors")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
