//! Embedding providers and vector utilities.
//!
//! Three backends, selected by `embedding.provider`:
//! - `"hash"` — deterministic feature-hashed bag-of-words. No network, no
//!   model download; the default, and what the tests run against.
//! - `"openai"` — the OpenAI embeddings API with batching, retry, and
//!   exponential backoff (1s, 2s, 4s, ... capped at 32s). HTTP 429 and 5xx
//!   retry; other 4xx fail immediately.
//! - `"disabled"` — always errors; keyword search still works without it.
//!
//! Vectors are stored as little-endian f32 BLOBs ([`vec_to_blob`] /
//! [`blob_to_vec`]) and compared with [`cosine_similarity`].

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::config::EmbeddingConfig;

/// Dimensionality of the hash provider's vectors.
pub const HASH_DIMS: usize = 256;

/// Identity of an embedding backend: the command layer builds one up
/// front via [`create_provider`] to validate the configuration and to
/// report the model in `cvm stats` and `cvm config`. The embedding
/// computation itself goes through [`embed_texts`].
pub trait EmbeddingProvider: Send + Sync {
    fn model_name(&self) -> &str;
    fn dims(&self) -> usize;
}

/// Embed a batch of texts with the configured backend, preserving input
/// order.
pub async fn embed_texts(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    match config.provider.as_str() {
        "hash" => Ok(texts.iter().map(|t| hash_embed(t)).collect()),
        "openai" => embed_openai(config, texts).await,
        "disabled" => bail!("embedding provider is disabled"),
        other => bail!("unknown embedding provider: {}", other),
    }
}

/// Embed a single query text.
pub async fn embed_query(config: &EmbeddingConfig, text: &str) -> Result<Vec<f32>> {
    let results = embed_texts(config, &[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("empty embedding response"))
}

/// Build the provider named by the config.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "hash" => Ok(Box::new(HashProvider)),
        "openai" => Ok(Box::new(OpenAIProvider::new(config)?)),
        "disabled" => Ok(Box::new(DisabledProvider)),
        other => bail!("unknown embedding provider: {}", other),
    }
}

// ============ Disabled Provider ============

/// Placeholder provider for `embedding.provider = "disabled"`.
pub struct DisabledProvider;

impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
}

// ============ Hash Provider ============

/// Feature-hashed bag-of-words embeddings.
///
/// Each lowercased alphanumeric token is hashed with SHA-256; the hash
/// picks a bucket in a [`HASH_DIMS`]-dimensional vector and a sign, and
/// the final vector is L2-normalized. Texts sharing vocabulary get
/// positive cosine similarity; texts with disjoint vocabulary stay near
/// zero. Crude as semantics go, but fully deterministic and offline.
pub struct HashProvider;

impl EmbeddingProvider for HashProvider {
    fn model_name(&self) -> &str {
        "feature-hash-256"
    }
    fn dims(&self) -> usize {
        HASH_DIMS
    }
}

/// Embed one text with the hash provider.
pub fn hash_embed(text: &str) -> Vec<f32> {
    let mut vec = vec![0.0f32; HASH_DIMS];

    for token in tokenize(text) {
        let digest = Sha256::digest(token.as_bytes());
        let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
            % HASH_DIMS;
        let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
        vec[bucket] += sign;
    }

    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in &mut vec {
            *v /= norm;
        }
    }

    vec
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

// ============ OpenAI Provider ============

/// Provider backed by `POST https://api.openai.com/v1/embeddings`.
///
/// Requires `embedding.model`, `embedding.dims`, and the `OPENAI_API_KEY`
/// environment variable.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }

        Ok(Self { model, dims })
    }
}

impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

async fn embed_openai(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let api_key =
        std::env::var("OPENAI_API_KEY").map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

    let model = config
        .model
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("embedding.model required"))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let body = serde_json::json!({
        "model": model,
        "input": texts,
    });

    let mut last_err = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let resp = client
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: serde_json::Value = response.json().await?;
                    return parse_openai_response(&json);
                }

                // Rate limited or server error, retry with backoff.
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow::anyhow!("OpenAI API error {}: {}", status, body_text));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                bail!("OpenAI API error {}: {}", status, body_text);
            }
            Err(e) => {
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("embedding failed after retries")))
}

fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("invalid OpenAI response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());

    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("invalid OpenAI response: missing embedding"))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        embeddings.push(vec);
    }

    Ok(embeddings)
}

// ============ Vector utilities ============

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB produced by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty or mismatched
/// lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_empty_and_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_hash_embed_deterministic() {
        let a = hash_embed("How do I write a parser in Rust?");
        let b = hash_embed("How do I write a parser in Rust?");
        assert_eq!(a, b);
        assert_eq!(a.len(), HASH_DIMS);
    }

    #[test]
    fn test_hash_embed_normalized() {
        let v = hash_embed("some text with several words");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hash_embed_case_insensitive() {
        assert_eq!(hash_embed("Rust Parser"), hash_embed("rust parser"));
    }

    #[test]
    fn test_hash_embed_shared_vocabulary_scores_higher() {
        let base = hash_embed("python decorators explained with examples");
        let related = hash_embed("python decorators are wrappers");
        let unrelated = hash_embed("garden soil drainage tips");
        let sim_related = cosine_similarity(&base, &related);
        let sim_unrelated = cosine_similarity(&base, &unrelated);
        assert!(sim_related > sim_unrelated);
        assert!(sim_related > 0.0);
    }

    #[test]
    fn test_hash_embed_empty_text_is_zero_vector() {
        let v = hash_embed("");
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_create_provider_dispatch() {
        let mut config = EmbeddingConfig::default();
        assert_eq!(create_provider(&config).unwrap().model_name(), "feature-hash-256");

        config.provider = "disabled".to_string();
        assert_eq!(create_provider(&config).unwrap().model_name(), "disabled");

        config.provider = "nope".to_string();
        assert!(create_provider(&config).is_err());
    }

    #[test]
    fn test_create_provider_openai_requires_model() {
        let mut config = EmbeddingConfig::default();
        config.provider = "openai".to_string();
        // No model set; rejected before the API key is even looked at.
        assert!(create_provider(&config).is_err());
    }

    #[tokio::test]
    async fn test_embed_texts_disabled_errors() {
        let mut config = EmbeddingConfig::default();
        config.provider = "disabled".to_string();
        assert!(embed_texts(&config, &["hello".to_string()]).await.is_err());
    }
}
