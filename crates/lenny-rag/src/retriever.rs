use std::sync::Arc;
use tracing::{debug, warn};

use lenny_core::traits::VectorIndex;
use lenny_core::types::{Partition, RetrievalResult, StratifiedResults};
use lenny_core::{Error, Result};
use lenny_embed::EmbeddingCache;

/// Runs one independent top-k search per partition.
///
/// Subject hits never compete with other hits for a slot, so the evidence
/// ratio stays fixed no matter which partition dominates the embedding space.
pub struct StratifiedRetriever {
    index: Arc<dyn VectorIndex>,
    cache: Arc<EmbeddingCache>,
}

impl StratifiedRetriever {
    pub fn new(index: Arc<dyn VectorIndex>, cache: Arc<EmbeddingCache>) -> Self { Self { index, cache } }

    pub fn cache(&self) -> &EmbeddingCache { &self.cache }

    pub async fn retrieve(&self, question: &str, top_k_per_partition: usize) -> Result<StratifiedResults> {
        check_request(question, top_k_per_partition)?;
        let query = self.embed_question(question).await?;
        self.search(&query, top_k_per_partition).await
    }

    /// Embeds through the cache. Any embedder error is an [`Error::EmbeddingFailure`].
    pub async fn embed_question(&self, question: &str) -> Result<Arc<Vec<f32>>> {
        self.cache.embed(question).await.map_err(|e| {
            warn!(error = %e, "question embedding failed");
            Error::EmbeddingFailure(e)
        })
    }

    /// Both partitions are searched concurrently; the result order is fixed regardless.
    pub async fn search(&self, query: &[f32], top_k_per_partition: usize) -> Result<StratifiedResults> {
        if top_k_per_partition == 0 {
            return Err(Error::InvalidRequest("top_k_per_partition must be at least 1".into()));
        }
        let total = self.index.segment_count().await.map_err(|e| {
            warn!(error = %e, "index unreachable");
            Error::RetrievalUnavailable(e)
        })?;
        if total == 0 {
            warn!("index holds no segments");
            return Err(Error::RetrievalUnavailable(anyhow::anyhow!("the index holds no segments; run ingestion first")));
        }

        let (subject, other) = futures::try_join!(
            self.index.search(query, Partition::Subject, top_k_per_partition),
            self.index.search(query, Partition::Other, top_k_per_partition),
        )
        .map_err(|e| {
            warn!(error = %e, "partition search failed");
            Error::RetrievalUnavailable(e)
        })?;

        let results = StratifiedResults {
            subject: RetrievalResult::new(subject.into_iter().filter(|h| h.partition == Partition::Subject).collect(), top_k_per_partition),
            other: RetrievalResult::new(other.into_iter().filter(|h| h.partition == Partition::Other).collect(), top_k_per_partition),
        };
        debug!(subject = results.subject.len(), other = results.other.len(), k = top_k_per_partition, "stratified retrieval");
        Ok(results)
    }
}

pub(crate) fn check_request(question: &str, top_k_per_partition: usize) -> Result<()> {
    if question.trim().is_empty() {
        return Err(Error::InvalidRequest("question is empty".into()));
    }
    if top_k_per_partition == 0 {
        return Err(Error::InvalidRequest("top_k_per_partition must be at least 1".into()));
    }
    Ok(())
}
