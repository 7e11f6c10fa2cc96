//! Append-only chunk log: JSONL shard files plus the processed-file marker.
//!
//! Each machine appends to its own shard (`chunks-{machine_id}.jsonl`), so
//! shards from several machines can be merged by file sync without write
//! conflicts. Reads always see the union of every shard, with a legacy
//! un-suffixed `chunks.jsonl` loaded first when present. Duplicate chunk
//! ids across shards resolve to the last occurrence in load order.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};

use crate::chunker::chunk_conversation;
use crate::config::Config;
use crate::models::ChunkRecord;
use crate::parser::get_source_files;

/// Outcome of one [`sync`] pass.
#[derive(Debug, Default)]
pub struct SyncOutcome {
    /// Chunks appended to this machine's shard.
    pub new_chunks: usize,
    /// Source files that produced at least one new chunk.
    pub new_files: usize,
}

/// All shard files in load order: the legacy shard first, then per-machine
/// shards sorted by file name.
pub fn shard_files(config: &Config) -> Result<Vec<PathBuf>> {
    let mut shards = Vec::new();

    let legacy = config.legacy_shard_path();
    if legacy.is_file() {
        shards.push(legacy);
    }

    let dir = &config.storage.dir;
    if dir.is_dir() {
        let mut suffixed: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("reading storage dir {}", dir.display()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .map(|n| n.starts_with("chunks-") && n.ends_with(".jsonl"))
                        .unwrap_or(false)
            })
            .collect();
        suffixed.sort();
        shards.extend(suffixed);
    }

    Ok(shards)
}

/// Load every chunk from every shard, deduplicated by id.
///
/// When the same id appears more than once the last occurrence wins, but
/// the chunk keeps the position of its first appearance, so the overall
/// ordering stays stable across re-syncs.
pub fn load_all(config: &Config) -> Result<Vec<ChunkRecord>> {
    let mut chunks: Vec<ChunkRecord> = Vec::new();
    let mut index_by_id: HashMap<String, usize> = HashMap::new();

    for shard in shard_files(config)? {
        let file = File::open(&shard)
            .with_context(|| format!("opening chunk log {}", shard.display()))?;
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            // A line that fails to read (non-UTF-8 bytes, usually) is as
            // recoverable as malformed JSON: skip it, keep the rest.
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    eprintln!(
                        "warning: skipping unreadable line at {}:{}: {}",
                        shard.display(),
                        line_no + 1,
                        err
                    );
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let record: ChunkRecord = match serde_json::from_str(&line) {
                Ok(record) => record,
                Err(err) => {
                    eprintln!(
                        "warning: skipping malformed chunk at {}:{}: {}",
                        shard.display(),
                        line_no + 1,
                        err
                    );
                    continue;
                }
            };
            match index_by_id.get(&record.id) {
                Some(&at) => chunks[at] = record,
                None => {
                    index_by_id.insert(record.id.clone(), chunks.len());
                    chunks.push(record);
                }
            }
        }
    }

    Ok(chunks)
}

/// Ids of every chunk currently in the log.
pub fn load_ids(config: &Config) -> Result<std::collections::HashSet<String>> {
    Ok(load_all(config)?.into_iter().map(|c| c.id).collect())
}

/// Append records to this machine's shard, one JSON object per line.
pub fn append(config: &Config, records: &[ChunkRecord]) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }

    let path = config.shard_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating storage dir {}", parent.display()))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening chunk log {} for append", path.display()))?;

    for record in records {
        let line = serde_json::to_string(record)?;
        writeln!(file, "{}", line)?;
    }

    Ok(())
}

/// Processed-file markers: source file name → mtime in milliseconds.
///
/// A corrupt or missing marker file degrades to "nothing processed", which
/// costs a re-chunk but never loses data since appends are id-deduplicated.
pub fn load_processed(config: &Config) -> HashMap<String, String> {
    let path = config.processed_path();
    let Ok(raw) = fs::read_to_string(&path) else {
        return HashMap::new();
    };
    serde_json::from_str(&raw).unwrap_or_default()
}

pub fn save_processed(config: &Config, processed: &HashMap<String, String>) -> Result<()> {
    let path = config.processed_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating storage dir {}", parent.display()))?;
    }
    let raw = serde_json::to_string_pretty(processed)?;
    fs::write(&path, raw).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn mtime_millis(path: &Path) -> Result<String> {
    let metadata = fs::metadata(path)
        .with_context(|| format!("stat {}", path.display()))?;
    let mtime = metadata
        .modified()
        .with_context(|| format!("mtime of {}", path.display()))?;
    let millis = mtime
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    Ok(millis.to_string())
}

/// Incrementally ingest every source transcript into the chunk log.
///
/// Files whose mtime marker is unchanged are skipped entirely. Changed or
/// new files are re-chunked, and only chunks whose id is absent from the
/// log are appended, so running sync twice in a row is a no-op. A file
/// that fails to parse is reported and skipped without aborting the pass.
pub fn sync(config: &Config) -> Result<SyncOutcome> {
    let source_files = get_source_files(config)?;
    let mut processed = load_processed(config);
    let mut existing_ids = load_ids(config)?;
    let mut outcome = SyncOutcome::default();

    for path in source_files {
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(String::from) else {
            continue;
        };

        let mtime = match mtime_millis(&path) {
            Ok(mtime) => mtime,
            Err(err) => {
                eprintln!("warning: skipping {}: {}", path.display(), err);
                continue;
            }
        };

        if processed.get(&name) == Some(&mtime) {
            continue;
        }

        let chunks = match chunk_conversation(&path, &config.chunking) {
            Ok(chunks) => chunks,
            Err(err) => {
                eprintln!("warning: failed to chunk {}: {}", path.display(), err);
                continue;
            }
        };

        let fresh: Vec<ChunkRecord> = chunks
            .into_iter()
            .filter(|c| !existing_ids.contains(&c.id))
            .collect();

        if !fresh.is_empty() {
            append(config, &fresh)?;
            for chunk in &fresh {
                existing_ids.insert(chunk.id.clone());
            }
            outcome.new_chunks += fresh.len();
            outcome.new_files += 1;
        }

        // Marker updates even when nothing new was appended, so an
        // unchanged-but-touched file is not re-chunked next time.
        processed.insert(name, mtime);
    }

    save_processed(config, &processed)?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, StorageConfig};
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.sources.transcripts_dir = dir.path().join("transcripts");
        config.storage = StorageConfig {
            dir: dir.path().join("storage"),
            machine_id: "testbox".to_string(),
        };
        config
    }

    fn record(id: &str, text: &str) -> ChunkRecord {
        ChunkRecord::turn(id, text.to_string(), "2025-01-15T10:00:00Z", "s1", 0)
    }

    fn write_transcript(config: &Config, name: &str, lines: &[&str]) {
        fs::create_dir_all(&config.sources.transcripts_dir).unwrap();
        fs::write(
            config.sources.transcripts_dir.join(name),
            lines.join("\n"),
        )
        .unwrap();
    }

    fn user_line(uuid: &str, text: &str) -> String {
        format!(
            r#"{{"type":"user","uuid":"{}","timestamp":"2025-01-15T10:00:00Z","message":{{"role":"user","content":"{}"}}}}"#,
            uuid, text
        )
    }

    fn assistant_line(uuid: &str, text: &str) -> String {
        format!(
            r#"{{"type":"assistant","uuid":"{}","timestamp":"2025-01-15T10:00:01Z","message":{{"role":"assistant","content":"{}"}}}}"#,
            uuid, text
        )
    }

    #[test]
    fn test_append_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        append(&config, &[record("c1", "hello"), record("c2", "world")]).unwrap();
        let loaded = load_all(&config).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, "c1");
        assert_eq!(loaded[1].text, "world");
    }

    #[test]
    fn test_duplicate_ids_last_wins_first_position() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        append(&config, &[record("c1", "old"), record("c2", "other")]).unwrap();
        append(&config, &[record("c1", "new")]).unwrap();

        let loaded = load_all(&config).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, "c1");
        assert_eq!(loaded[0].text, "new");
        assert_eq!(loaded[1].id, "c2");
    }

    #[test]
    fn test_legacy_shard_loads_before_machine_shards() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        fs::create_dir_all(&config.storage.dir).unwrap();
        let legacy_line = serde_json::to_string(&record("c1", "legacy")).unwrap();
        fs::write(config.legacy_shard_path(), format!("{}\n", legacy_line)).unwrap();
        append(&config, &[record("c1", "machine")]).unwrap();

        let loaded = load_all(&config).unwrap();
        assert_eq!(loaded.len(), 1);
        // Machine shard loads after legacy, so its version wins.
        assert_eq!(loaded[0].text, "machine");
    }

    #[test]
    fn test_malformed_line_skipped() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        append(&config, &[record("c1", "good")]).unwrap();
        let path = config.shard_path();
        let mut raw = fs::read_to_string(&path).unwrap();
        raw.push_str("{not json\n");
        let good = serde_json::to_string(&record("c2", "also good")).unwrap();
        raw.push_str(&good);
        raw.push('\n');
        fs::write(&path, raw).unwrap();

        let loaded = load_all(&config).unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn test_non_utf8_line_skipped() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        append(&config, &[record("c1", "good")]).unwrap();
        let path = config.shard_path();
        let mut raw = fs::read(&path).unwrap();
        raw.extend_from_slice(&[0xff, 0xfe, 0xfd, b'\n']);
        let good = serde_json::to_string(&record("c2", "also good")).unwrap();
        raw.extend_from_slice(good.as_bytes());
        raw.push(b'\n');
        fs::write(&path, raw).unwrap();

        let loaded = load_all(&config).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, "c1");
        assert_eq!(loaded[1].id, "c2");
    }

    #[test]
    fn test_corrupt_marker_degrades_to_empty() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        fs::create_dir_all(&config.storage.dir).unwrap();
        fs::write(config.processed_path(), "{{{{").unwrap();
        assert!(load_processed(&config).is_empty());
    }

    #[test]
    fn test_sync_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        write_transcript(
            &config,
            "session-a.jsonl",
            &[
                &user_line("u1", "How do I sort a vec?"),
                &assistant_line("a1", "Call sort on it."),
            ],
        );

        let first = sync(&config).unwrap();
        assert_eq!(first.new_chunks, 1);
        assert_eq!(first.new_files, 1);

        let second = sync(&config).unwrap();
        assert_eq!(second.new_chunks, 0);
        assert_eq!(second.new_files, 0);

        assert_eq!(load_all(&config).unwrap().len(), 1);
    }

    #[test]
    fn test_sync_picks_up_new_file() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        write_transcript(
            &config,
            "session-a.jsonl",
            &[&user_line("u1", "q1"), &assistant_line("a1", "r1")],
        );
        sync(&config).unwrap();

        write_transcript(
            &config,
            "session-b.jsonl",
            &[&user_line("u2", "q2"), &assistant_line("a2", "r2")],
        );
        let outcome = sync(&config).unwrap();
        assert_eq!(outcome.new_chunks, 1);
        assert_eq!(outcome.new_files, 1);
        assert_eq!(load_all(&config).unwrap().len(), 2);
    }

    #[test]
    fn test_sync_missing_source_dir_is_empty_pass() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let outcome = sync(&config).unwrap();
        assert_eq!(outcome.new_chunks, 0);
    }
}
