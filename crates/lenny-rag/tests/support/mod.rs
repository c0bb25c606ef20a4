#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use lenny_core::traits::{CompletionBackend, Embedder, FragmentStream, SegmentWriter, VectorIndex};
use lenny_core::types::{CompletionRequest, Partition, SearchHit, Segment};
use lenny_embed::{EmbeddingCache, HashEmbedder};
use lenny_rag::{LennyRag, PersonaPolicy, StratifiedRetriever};
use lenny_vector::MemoryIndex;

pub const DIM: usize = 64;

/// Flips `open` back to false when the stream holding it is dropped.
struct CloseProbe(Arc<AtomicBool>);

impl Drop for CloseProbe {
    fn drop(&mut self) { self.0.store(false, Ordering::SeqCst); }
}

/// Replays a fixed script of fragments and errors.
pub struct ScriptedCompletion {
    script: Vec<Result<String, String>>,
    hang_after_script: bool,
    refuse: Option<String>,
    pub open: Arc<AtomicBool>,
    pub calls: AtomicUsize,
    pub last_request: Mutex<Option<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn new(script: Vec<Result<&str, &str>>) -> Self {
        Self {
            script: script.into_iter().map(|r| r.map(str::to_string).map_err(str::to_string)).collect(),
            hang_after_script: false,
            refuse: None,
            open: Arc::new(AtomicBool::new(false)),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn text(fragments: &[&str]) -> Self { Self::new(fragments.iter().map(|f| Ok(*f)).collect()) }

    /// Never signals end-of-stream after the script, like a slow backend.
    pub fn hanging(mut self) -> Self { self.hang_after_script = true; self }

    pub fn refusing(mut self, reason: &str) -> Self { self.refuse = Some(reason.to_string()); self }

    pub fn is_open(&self) -> bool { self.open.load(Ordering::SeqCst) }

    pub fn request(&self) -> CompletionRequest { self.last_request.lock().unwrap().clone().expect("generate was called") }
}

#[async_trait]
impl CompletionBackend for ScriptedCompletion {
    async fn generate(&self, request: CompletionRequest) -> anyhow::Result<FragmentStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request);
        if let Some(reason) = &self.refuse { return Err(anyhow::anyhow!(reason.clone())); }

        self.open.store(true, Ordering::SeqCst);
        let probe = CloseProbe(Arc::clone(&self.open));
        let items = futures::stream::iter(self.script.clone().into_iter().map(|r| r.map_err(|e| anyhow::anyhow!(e))));
        let tail = if self.hang_after_script { futures::stream::pending().boxed() } else { futures::stream::empty().boxed() };
        Ok(items
            .chain(tail)
            .map(move |item| {
                let _held = &probe;
                item
            })
            .boxed())
    }
}

pub struct BrokenEmbedder;

#[async_trait]
impl Embedder for BrokenEmbedder {
    fn dim(&self) -> usize { DIM }
    async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> { Err(anyhow::anyhow!("embedding service unreachable")) }
}

/// Reports segments but fails every search.
pub struct BrokenIndex;

#[async_trait]
impl VectorIndex for BrokenIndex {
    async fn segment_count(&self) -> anyhow::Result<usize> { Ok(10) }
    async fn search(&self, _q: &[f32], _p: Partition, _k: usize) -> anyhow::Result<Vec<SearchHit>> {
        Err(anyhow::anyhow!("connection refused"))
    }
}

/// Non-empty, but nothing ever matches.
pub struct BarrenIndex;

#[async_trait]
impl VectorIndex for BarrenIndex {
    async fn segment_count(&self) -> anyhow::Result<usize> { Ok(3) }
    async fn search(&self, _q: &[f32], _p: Partition, _k: usize) -> anyhow::Result<Vec<SearchHit>> { Ok(vec![]) }
}

pub fn segment(source: &str, pos: usize, text: &str, partition: Partition) -> Segment {
    Segment::new(source, text, partition, pos, 10).with_embedding(HashEmbedder::new(DIM).embed_sync(text))
}

/// A small corpus: `subject` posts about retention and `other` guest turns.
pub async fn corpus(subject: usize, other: usize) -> Arc<MemoryIndex> {
    let index = MemoryIndex::new();
    let mut segments = Vec::new();
    for i in 0..subject {
        segments.push(segment(&format!("writing/post-{}", i % 2), i, &format!("retention is the metric I watch most closely, note {}", i), Partition::Subject));
    }
    for i in 0..other {
        segments.push(segment("transcripts/ep-7", i, &format!("at our company retention climbed once onboarding changed, story {}", i), Partition::Other).with_url(Some("https://youtu.be/ep7".into())));
    }
    index.insert(&segments).await.unwrap();
    Arc::new(index)
}

pub fn cache() -> Arc<EmbeddingCache> { Arc::new(EmbeddingCache::new(Arc::new(HashEmbedder::new(DIM)))) }

pub fn rag(index: Arc<dyn VectorIndex>, completion: Arc<ScriptedCompletion>) -> LennyRag {
    LennyRag::new(StratifiedRetriever::new(index, cache()), PersonaPolicy::default(), completion)
}
