use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::types::{CompletionRequest, Partition, SearchHit, Segment};

/// Text fragments produced by a completion backend, ended by the stream finishing.
///
/// An `Err` item means the backend failed mid-stream; nothing follows it.
pub type FragmentStream = BoxStream<'static, anyhow::Result<String>>;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;

    /// Must be deterministic for identical input.
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts { out.push(self.embed(t).await?); }
        Ok(out)
    }
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Total number of segments across both partitions.
    async fn segment_count(&self) -> anyhow::Result<usize>;

    /// Nearest neighbours restricted to `partition`, best first.
    ///
    /// Returns fewer than `k` hits, never an error, when the partition is small.
    async fn search(&self, query: &[f32], partition: Partition, k: usize) -> anyhow::Result<Vec<SearchHit>>;
}

/// Write side of an index, used only by ingestion.
#[async_trait]
pub trait SegmentWriter: Send + Sync {
    async fn insert(&self, segments: &[Segment]) -> anyhow::Result<()>;
}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Opens a streaming completion. Dropping the returned stream must release
    /// the underlying connection.
    async fn generate(&self, request: CompletionRequest) -> anyhow::Result<FragmentStream>;
}
