//! Hybrid retriever: merges cosine-distance candidates from the vector
//! index with BM25 candidates from the keyword index into one ranking.
//!
//! Both score families are normalized to `[0, 1]` with 0 best before
//! merging. Chunks found by both indexes combine the two; chunks found by
//! only the keyword index carry a fixed penalty so a strong semantic match
//! always outranks a keyword-only match.

use anyhow::Result;

use crate::config::Config;
use crate::models::{ChunkMeta, SearchResult};
use crate::store::VectorIndex;
use crate::text_index::KeywordIndex;

/// Weight of the vector score in a combined hit; the keyword score gets
/// the remainder.
pub const HYBRID_VECTOR_WEIGHT: f64 = 0.7;

/// Base score for a keyword-only hit. Sits above any combined score, so
/// keyword-only hits rank after everything the vector index agreed with.
pub const KEYWORD_ONLY_PENALTY: f64 = 0.5;

struct Candidate {
    score: f64,
    meta: ChunkMeta,
}

/// Run a hybrid (or vector-only) query and return up to `n` ranked hits,
/// best first.
///
/// With `dedupe_splits` set, fragments of the same oversized turn collapse
/// to their best-ranked fragment; extra candidates are fetched up front so
/// collapsing still leaves `n` distinct turns where possible.
///
/// Each signal degrades independently: an empty or failing vector index
/// leaves a pure keyword ranking, and vice versa.
pub async fn hybrid_search(
    store: &VectorIndex,
    text_index: &KeywordIndex,
    query: &str,
    n: usize,
    dedupe_splits: bool,
    hybrid: bool,
) -> Result<Vec<SearchResult>> {
    let total = store.count().await? as usize;
    if n == 0 || (total == 0 && !hybrid) {
        return Ok(Vec::new());
    }

    let fetch_n = if dedupe_splits { n * 5 } else { n * 2 };
    let fetch_n = if total > 0 { fetch_n.min(total) } else { fetch_n };

    let vector_hits = if total == 0 {
        Vec::new()
    } else {
        match store.query(query, fetch_n).await {
            Ok(hits) => hits,
            Err(err) if hybrid => {
                eprintln!("warning: vector search failed, using keyword only: {}", err);
                Vec::new()
            }
            Err(err) => return Err(err),
        }
    };

    // Normalize distances so the worst fetched candidate sits at 1.0.
    let max_distance = vector_hits
        .iter()
        .map(|h| h.distance)
        .fold(0.0f64, f64::max);

    let mut merged: Vec<(String, Candidate)> = Vec::new();
    for hit in vector_hits {
        let norm = if max_distance > 0.0 {
            hit.distance / max_distance
        } else {
            0.0
        };
        merged.push((
            hit.chunk_id,
            Candidate {
                score: norm,
                meta: hit.meta,
            },
        ));
    }

    if hybrid {
        let keyword_hits = match text_index.search(query, fetch_n).await {
            Ok(hits) => hits,
            Err(err) => {
                eprintln!("warning: keyword search failed, using vector only: {}", err);
                Vec::new()
            }
        };

        if !keyword_hits.is_empty() {
            let best = keyword_hits
                .iter()
                .map(|h| h.bm25_score)
                .fold(f64::INFINITY, f64::min);
            let worst = keyword_hits
                .iter()
                .map(|h| h.bm25_score)
                .fold(f64::NEG_INFINITY, f64::max);
            let range = worst - best;

            for hit in keyword_hits {
                // Min-max to [0, 1]; SQLite BM25 is more negative = better.
                let norm_bm25 = if range > 0.0 {
                    (hit.bm25_score - best) / range
                } else {
                    0.0
                };

                if let Some((_, candidate)) =
                    merged.iter_mut().find(|(id, _)| *id == hit.chunk_id)
                {
                    candidate.score = HYBRID_VECTOR_WEIGHT * candidate.score
                        + (1.0 - HYBRID_VECTOR_WEIGHT) * norm_bm25;
                } else {
                    merged.push((
                        hit.chunk_id.clone(),
                        Candidate {
                            score: KEYWORD_ONLY_PENALTY
                                + (1.0 - HYBRID_VECTOR_WEIGHT) * norm_bm25,
                            meta: ChunkMeta {
                                text: hit.text,
                                session_id: hit.session_id,
                                timestamp: hit.timestamp,
                                ..ChunkMeta::default()
                            },
                        },
                    ));
                }
            }
        }
    }

    merged.sort_by(|a, b| {
        a.1.score
            .partial_cmp(&b.1.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    let mut results = Vec::with_capacity(n);
    if dedupe_splits {
        let mut seen_turns = std::collections::HashSet::new();
        for (chunk_id, candidate) in &merged {
            let key = if candidate.meta.parent_turn_id.is_empty() {
                format!("chunk:{}", chunk_id)
            } else {
                format!("turn:{}", candidate.meta.parent_turn_id)
            };
            if !seen_turns.insert(key) {
                continue;
            }
            results.push(SearchResult::from_meta(
                chunk_id,
                candidate.score,
                &candidate.meta,
            ));
            if results.len() == n {
                break;
            }
        }
    } else {
        for (chunk_id, candidate) in merged.iter().take(n) {
            results.push(SearchResult::from_meta(
                chunk_id,
                candidate.score,
                &candidate.meta,
            ));
        }
    }

    Ok(results)
}

/// CLI entry point: run a search and print the hits.
pub async fn run_search(
    config: &Config,
    query: &str,
    n: usize,
    no_dedupe: bool,
    vector_only: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let store = VectorIndex::open(config).await?;
    let text_index = KeywordIndex::open(config).await?;

    let results = hybrid_search(
        &store,
        &text_index,
        query,
        n,
        !no_dedupe,
        !vector_only,
    )
    .await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} / turn {}",
            i + 1,
            result.score,
            result.session_id,
            result.turn_index
        );
        println!("    when: {}", format_timestamp(&result.timestamp));
        if result.total_chunks > 1 {
            println!(
                "    part: {} of {}",
                result.chunk_index + 1,
                result.total_chunks
            );
        }
        if !result.tools_used.is_empty() {
            println!("    tools: {}", result.tools_used);
        }
        if !result.files_touched.is_empty() {
            println!("    files: {}", result.files_touched);
        }
        println!("    excerpt: \"{}\"", excerpt(&result.text, 160));
        println!("    id: {}", result.chunk_id);
        println!();
    }

    Ok(())
}

/// Render an RFC 3339 transcript timestamp as a short local-agnostic
/// date-time; anything unparseable passes through as-is.
fn format_timestamp(raw: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= max_chars {
        return flat.to_string();
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::models::ChunkRecord;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.storage = StorageConfig {
            dir: dir.path().to_path_buf(),
            machine_id: "local".to_string(),
        };
        config
    }

    fn record(id: &str, text: &str) -> ChunkRecord {
        ChunkRecord::turn(id, text.to_string(), "2025-01-15T10:00:00Z", "s1", 0)
    }

    async fn indexes(config: &Config, chunks: &[ChunkRecord]) -> (VectorIndex, KeywordIndex) {
        let store = VectorIndex::open(config).await.unwrap();
        let text_index = KeywordIndex::open(config).await.unwrap();
        store.rebuild(chunks).await.unwrap();
        text_index.rebuild(chunks).await.unwrap();
        (store, text_index)
    }

    #[tokio::test]
    async fn test_hybrid_prefers_chunk_matched_by_both_indexes() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let chunks = vec![
            record("c1", "User: How do rust lifetimes work?\n\nAssistant: Lifetimes annotate borrow scopes."),
            record("c2", "User: What about gardening?\n\nAssistant: Water the tomato plants daily."),
        ];
        let (store, text_index) = indexes(&config, &chunks).await;

        let results = hybrid_search(&store, &text_index, "rust lifetimes", 2, true, true)
            .await
            .unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].chunk_id, "c1");
    }

    #[tokio::test]
    async fn test_empty_store_returns_empty() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let (store, text_index) = indexes(&config, &[]).await;
        let results = hybrid_search(&store, &text_index, "anything", 5, true, true)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_keyword_only_hits_carry_penalty() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let chunks = vec![
            record("c1", "User: explain tokio channels\n\nAssistant: Use mpsc for fan-in."),
            record("c2", "User: purely unrelated words here\n\nAssistant: entirely different topic entirely."),
        ];
        let (store, text_index) = indexes(&config, &chunks).await;

        let results = hybrid_search(&store, &text_index, "tokio channels", 5, true, true)
            .await
            .unwrap();
        // The matching chunk ranks first, and any keyword-only stragglers
        // score at or above the penalty floor.
        assert_eq!(results[0].chunk_id, "c1");
        for result in results.iter().skip(1) {
            assert!(result.score >= results[0].score);
        }
    }

    #[tokio::test]
    async fn test_dedupe_collapses_fragments_of_same_turn() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let mut frag_a = record("t1-0", "User: sharded counters\n\nAssistant: shard counters part one");
        frag_a.parent_turn_id = "t1".to_string();
        frag_a.chunk_index = 0;
        frag_a.total_chunks = 2;
        let mut frag_b = record("t1-1", "User: sharded counters\n\nAssistant: shard counters part two");
        frag_b.parent_turn_id = "t1".to_string();
        frag_b.chunk_index = 1;
        frag_b.total_chunks = 2;
        let chunks = vec![frag_a, frag_b];
        let (store, text_index) = indexes(&config, &chunks).await;

        let deduped = hybrid_search(&store, &text_index, "sharded counters", 5, true, true)
            .await
            .unwrap();
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].parent_turn_id, "t1");

        let raw = hybrid_search(&store, &text_index, "sharded counters", 5, false, true)
            .await
            .unwrap();
        assert_eq!(raw.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_vector_store_degrades_to_keyword_ranking() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.embedding.provider = "disabled".to_string();

        let store = VectorIndex::open(&config).await.unwrap();
        let text_index = KeywordIndex::open(&config).await.unwrap();
        text_index
            .rebuild(&[record(
                "c1",
                "User: python decorators\n\nAssistant: They wrap callables.",
            )])
            .await
            .unwrap();

        let results = hybrid_search(&store, &text_index, "python", 5, true, true)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_id, "c1");
    }

    #[tokio::test]
    async fn test_failing_vector_query_degrades_to_keyword_ranking() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let chunks = vec![record(
            "c1",
            "User: python decorators\n\nAssistant: They wrap callables.",
        )];
        let (_, text_index) = indexes(&config, &chunks).await;

        // Reopen the populated store with embeddings disabled: count is
        // nonzero but every query errors.
        let mut disabled = config.clone();
        disabled.embedding.provider = "disabled".to_string();
        let store = VectorIndex::open(&disabled).await.unwrap();
        assert!(store.query("python", 5).await.is_err());

        let results = hybrid_search(&store, &text_index, "python", 5, true, true)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_id, "c1");

        // Vector-only has no signal left to fall back on.
        let vector_only = hybrid_search(&store, &text_index, "python", 5, true, false).await;
        assert!(vector_only.is_err());
    }

    #[tokio::test]
    async fn test_vector_only_skips_keyword_matches() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let chunks = vec![record(
            "c1",
            "User: explain async executors\n\nAssistant: Executors poll futures.",
        )];
        let (store, text_index) = indexes(&config, &chunks).await;

        let results = hybrid_search(&store, &text_index, "async executors", 5, true, false)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_id, "c1");
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(
            format_timestamp("2025-01-15T10:00:00Z"),
            "2025-01-15 10:00"
        );
        assert_eq!(format_timestamp("not a date"), "not a date");
    }

    #[test]
    fn test_excerpt_flattens_and_truncates() {
        let text = "line one\nline two";
        assert_eq!(excerpt(text, 160), "line one line two");
        let long = "x".repeat(200);
        let cut = excerpt(&long, 160);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), 163);
    }
}
