//! Embedding capabilities and the per-process embedding cache.
//!
//! `HashEmbedder` is deterministic and offline, used in tests and development.
//! `HttpEmbedder` talks to an OpenAI-compatible `/embeddings` endpoint.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use lenny_core::config::EmbeddingSettings;
use lenny_core::traits::Embedder;

pub mod cache;

pub use cache::{CacheStats, EmbeddingCache};

/// Token-hashing embedder: each whitespace token lands in a bucket chosen by
/// its XxHash64, then the vector is L2-normalized.
pub struct HashEmbedder { dim: usize }

impl HashEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim: dim.max(1) } }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher}; use twox_hash::XxHash64;
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let token = token.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
            if token.is_empty() { continue; }
            let mut hasher = XxHash64::with_seed(0); token.hash(&mut hasher); let h = hasher.finish();
            let idx = (h as usize) % self.dim; let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += 0.5 + val + (i as f32 % 3.0) * 0.01;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6); for x in &mut v { *x /= norm; } v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dim(&self) -> usize { self.dim }
    async fn embed(&self, text: &str) -> Result<Vec<f32>> { Ok(self.embed_sync(text)) }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> { input: &'a [String], model: &'a str, encoding_format: &'static str }

#[derive(Deserialize)]
struct EmbeddingResponse { data: Vec<EmbeddingDatum> }

#[derive(Deserialize)]
struct EmbeddingDatum { embedding: Vec<f32> }

pub struct HttpEmbedder { client: reqwest::Client, base_url: String, model: String, api_key: String, dim: usize }

impl HttpEmbedder {
    pub fn new(base_url: &str, model: &str, api_key: String, dim: usize) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.trim_end_matches('/').to_string(), model: model.to_string(), api_key, dim }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn dim(&self) -> usize { self.dim }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()]).await?.pop().ok_or_else(|| anyhow!("embedding response was empty"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingRequest { input: texts, model: &self.model, encoding_format: "float" };
        let resp = self.client.post(format!("{}/embeddings", self.base_url)).bearer_auth(&self.api_key).json(&body).send().await?.error_for_status()?;
        let parsed: EmbeddingResponse = resp.json().await?;
        if parsed.data.len() != texts.len() { return Err(anyhow!("expected {} embeddings, got {}", texts.len(), parsed.data.len())); }
        let out: Vec<Vec<f32>> = parsed.data.into_iter().map(|d| d.embedding).collect();
        if let Some(bad) = out.iter().find(|v| v.len() != self.dim) { return Err(anyhow!("embedding dim {} does not match configured {}", bad.len(), self.dim)); }
        Ok(out)
    }
}

/// Builds the embedder named by `settings.provider`.
pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    match settings.provider.as_str() {
        "hash" => { info!(dim = settings.dim, "using hash embeddings"); Ok(Arc::new(HashEmbedder::new(settings.dim))) }
        "http" => {
            let api_key = std::env::var(&settings.api_key_env).map_err(|_| anyhow!("{} is not set", settings.api_key_env))?;
            info!(model = %settings.model, base_url = %settings.base_url, "using http embeddings");
            Ok(Arc::new(HttpEmbedder::new(&settings.base_url, &settings.model, api_key, settings.dim)))
        }
        other => Err(anyhow!("unknown embedding provider '{}'", other)),
    }
}
