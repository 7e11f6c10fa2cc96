//! Keyword index: SQLite FTS5 over chunk text in `text_index.db`.
//!
//! Like the vector index this is a derived view of the chunk log. A plain
//! `indexed_chunks` table tracks which ids are present, since FTS5 virtual
//! tables make membership queries awkward.

use std::collections::HashSet;

use anyhow::Result;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::config::Config;
use crate::db;
use crate::models::ChunkRecord;

/// A keyword hit with its raw BM25 score (more negative is better, as
/// SQLite reports it).
#[derive(Debug, Clone)]
pub struct TextSearchResult {
    pub chunk_id: String,
    pub text: String,
    pub bm25_score: f64,
    pub session_id: String,
    pub timestamp: String,
}

pub struct KeywordIndex {
    pool: SqlitePool,
}

impl KeywordIndex {
    /// Open `text_index.db`, creating the schema if needed.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(&config.text_index_db_path()).await?;

        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
                chunk_id UNINDEXED,
                text,
                session_id UNINDEXED,
                timestamp UNINDEXED,
                tokenize='porter unicode61'
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS indexed_chunks (chunk_id TEXT PRIMARY KEY)",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM indexed_chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    pub async fn indexed_ids(&self) -> Result<HashSet<String>> {
        let rows = sqlx::query("SELECT chunk_id FROM indexed_chunks")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get("chunk_id")).collect())
    }

    /// Insert any chunks not yet indexed; returns how many were added.
    pub async fn rebuild(&self, chunks: &[ChunkRecord]) -> Result<usize> {
        let existing = self.indexed_ids().await?;
        let mut added = 0;

        for chunk in chunks {
            if existing.contains(&chunk.id) {
                continue;
            }
            sqlx::query(
                "INSERT INTO chunks_fts (chunk_id, text, session_id, timestamp) VALUES (?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.text)
            .bind(&chunk.session_id)
            .bind(&chunk.timestamp)
            .execute(&self.pool)
            .await?;
            sqlx::query("INSERT OR IGNORE INTO indexed_chunks (chunk_id) VALUES (?)")
                .bind(&chunk.id)
                .execute(&self.pool)
                .await?;
            added += 1;
        }

        Ok(added)
    }

    /// BM25-ranked keyword search, best first.
    ///
    /// The raw query is normalized by [`prepare_query`]; a query FTS5
    /// still rejects yields no hits rather than an error.
    pub async fn search(&self, query: &str, n: usize) -> Result<Vec<TextSearchResult>> {
        let prepared = prepare_query(query);
        if prepared.is_empty() || n == 0 {
            return Ok(Vec::new());
        }

        let result = sqlx::query(
            r#"
            SELECT chunk_id, text, session_id, timestamp,
                   bm25(chunks_fts) AS score
            FROM chunks_fts
            WHERE chunks_fts MATCH ?
            ORDER BY score
            LIMIT ?
            "#,
        )
        .bind(&prepared)
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await;

        let rows = match result {
            Ok(rows) => rows,
            // Unbalanced quotes and similar still reach FTS5; treat a
            // parse failure as "no matches".
            Err(sqlx::Error::Database(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(rows
            .iter()
            .map(|row| TextSearchResult {
                chunk_id: row.get("chunk_id"),
                text: row.get("text"),
                bm25_score: row.get("score"),
                session_id: row.get("session_id"),
                timestamp: row.get("timestamp"),
            })
            .collect())
    }

    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM chunks_fts")
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM indexed_chunks")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Turn a free-text query into an FTS5 MATCH expression.
///
/// Queries that already use FTS operators (`AND`, `OR`, `NOT`, or quoted
/// phrases) pass through untouched. Anything else becomes a prefix-OR
/// query, `term* OR term*`, so partial words still match. Punctuation
/// inside a term splits it, so `async/await` matches either word.
pub fn prepare_query(query: &str) -> String {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let has_operator = trimmed.contains('"')
        || trimmed.contains(" AND ")
        || trimmed.contains(" OR ")
        || trimmed.contains(" NOT ");
    if has_operator {
        return trimmed.to_string();
    }

    trimmed
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| format!("{}*", part))
        .collect::<Vec<_>>()
        .join(" OR ")
}
