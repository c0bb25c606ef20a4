//! Process-lifetime embedding cache keyed by a blake3 hash of the input text.
//!
//! Unbounded: query volume is low and entries are never invalidated, since the
//! wrapped embedder is deterministic. Safe for concurrent reads and inserts; two
//! callers racing on the same miss both call the embedder and the later insert
//! wins with an identical value.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use lenny_core::traits::Embedder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

pub struct EmbeddingCache {
    embedder: Arc<dyn Embedder>,
    entries: DashMap<String, Arc<Vec<f32>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingCache {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder, entries: DashMap::new(), hits: AtomicU64::new(0), misses: AtomicU64::new(0) }
    }

    pub fn key(text: &str) -> String { blake3::hash(text.as_bytes()).to_hex().to_string() }

    /// Returns the cached vector for `text`, calling the embedder only on a miss.
    pub async fn embed(&self, text: &str) -> anyhow::Result<Arc<Vec<f32>>> {
        let key = Self::key(text);
        if let Some(hit) = self.entries.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %&key[..12], "embedding cache hit");
            return Ok(Arc::clone(hit.value()));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let vector = Arc::new(self.embedder.embed(text).await?);
        self.entries.insert(key, Arc::clone(&vector));
        Ok(vector)
    }

    pub fn dim(&self) -> usize { self.embedder.dim() }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn stats(&self) -> CacheStats {
        CacheStats { hits: self.hits.load(Ordering::Relaxed), misses: self.misses.load(Ordering::Relaxed) }
    }
}
