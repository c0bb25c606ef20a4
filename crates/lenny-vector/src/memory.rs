use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use lenny_core::traits::{SegmentWriter, VectorIndex};
use lenny_core::types::{Partition, SearchHit, Segment};

use crate::cosine;

#[derive(Default, Serialize, Deserialize)]
struct Snapshot { segments: Vec<Segment> }

#[derive(Default)]
pub struct MemoryIndex {
    segments: RwLock<Vec<Segment>>,
    path: Option<PathBuf>,
}

impl MemoryIndex {
    pub fn new() -> Self { Self::default() }

    /// Loads the snapshot at `path` if it exists; `save` writes back to it.
    pub fn open(path: &Path) -> Result<Self> {
        let segments = if path.exists() {
            let raw = fs::read_to_string(path).with_context(|| format!("reading index {}", path.display()))?;
            let snapshot: Snapshot = serde_json::from_str(&raw).with_context(|| format!("parsing index {}", path.display()))?;
            info!(path = %path.display(), segments = snapshot.segments.len(), "loaded index");
            snapshot.segments
        } else {
            Vec::new()
        };
        Ok(Self { segments: RwLock::new(segments), path: Some(path.to_path_buf()) })
    }

    pub fn from_segments(segments: Vec<Segment>) -> Self { Self { segments: RwLock::new(segments), path: None } }

    pub fn save(&self) -> Result<()> {
        let path = self.path.as_ref().ok_or_else(|| anyhow!("index has no backing file"))?;
        if let Some(parent) = path.parent() { fs::create_dir_all(parent)?; }
        let snapshot = Snapshot { segments: self.segments.read().clone() };
        fs::write(path, serde_json::to_string(&snapshot)?)?;
        info!(path = %path.display(), segments = snapshot.segments.len(), "saved index");
        Ok(())
    }

    pub fn len(&self) -> usize { self.segments.read().len() }

    pub fn is_empty(&self) -> bool { self.segments.read().is_empty() }

    pub fn count_partition(&self, partition: Partition) -> usize {
        self.segments.read().iter().filter(|s| s.partition() == partition).count()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn segment_count(&self) -> Result<usize> { Ok(self.len()) }

    async fn search(&self, query: &[f32], partition: Partition, k: usize) -> Result<Vec<SearchHit>> {
        let segments = self.segments.read();
        let mut hits = Vec::new();
        for segment in segments.iter().filter(|s| s.partition() == partition) {
            if segment.embedding.len() != query.len() {
                return Err(anyhow!("segment {} has dim {}, query has dim {}", segment.id, segment.embedding.len(), query.len()));
            }
            hits.push(SearchHit::from_segment(segment, cosine(query, &segment.embedding)));
        }
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        debug!(%partition, k, hits = hits.len(), "memory search");
        Ok(hits)
    }
}

#[async_trait]
impl SegmentWriter for MemoryIndex {
    async fn insert(&self, segments: &[Segment]) -> Result<()> {
        if let Some(s) = segments.iter().find(|s| s.embedding.is_empty()) { return Err(anyhow!("segment {} has no embedding", s.id)); }
        let incoming: HashSet<&str> = segments.iter().map(|s| s.source_id.as_str()).collect();
        let mut guard = self.segments.write();
        // Every document in the batch replaces all of its previous segments.
        let before = guard.len();
        guard.retain(|existing| !incoming.contains(existing.source_id.as_str()));
        debug!(documents = incoming.len(), replaced = before - guard.len(), added = segments.len(), "memory insert");
        guard.extend_from_slice(segments);
        Ok(())
    }
}
