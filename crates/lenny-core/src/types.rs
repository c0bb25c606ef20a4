//! Domain types shared by ingestion, retrieval and generation.

use serde::{Deserialize, Serialize};
use std::fmt;

pub type SegmentId = String;

/// One of the two disjoint evidence pools.
///
/// `Subject` holds the subject's own words (posts, host turns in interviews),
/// `Other` holds everything said by guests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Subject,
    Other,
}

impl Partition {
    /// Fixed merge order: subject material always precedes other material.
    pub const ALL: [Partition; 2] = [Partition::Subject, Partition::Other];

    pub fn as_str(self) -> &'static str {
        match self {
            Partition::Subject => "subject",
            Partition::Other => "other",
        }
    }

    /// Label shown next to a citation.
    pub fn authority(self) -> &'static str {
        match self {
            Partition::Subject => "Lenny's core belief",
            Partition::Other => "Guest case study",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "subject" => Some(Partition::Subject),
            "other" => Some(Partition::Other),
            _ => None,
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// A unit of ingested text.
///
/// - `id`: globally unique segment identifier (`<source_id>:<position_index>`)
/// - `source_id`: opaque identity of the originating document
/// - `source_url`: optional link carried through to citations
/// - `position_index`/`source_doc_length`: order within the parent document
/// - `embedding`: empty until the segment has been embedded for indexing
///
/// The partition is assigned once when the segment is created and has no setter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    pub id: SegmentId,
    pub source_id: String,
    #[serde(default)]
    pub source_url: Option<String>,
    pub text: String,
    partition: Partition,
    pub position_index: usize,
    pub source_doc_length: usize,
    #[serde(default)]
    pub embedding: Vec<f32>,
}

impl Segment {
    pub fn new(source_id: &str, text: impl Into<String>, partition: Partition, position_index: usize, source_doc_length: usize) -> Self {
        Self {
            id: format!("{}:{}", source_id, position_index),
            source_id: source_id.to_string(),
            source_url: None,
            text: text.into(),
            partition,
            position_index,
            source_doc_length,
            embedding: Vec::new(),
        }
    }

    pub fn with_url(mut self, url: Option<String>) -> Self { self.source_url = url; self }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self { self.embedding = embedding; self }

    pub fn partition(&self) -> Partition { self.partition }
}

/// A segment returned by a similarity search, with its score.
///
/// `score` is cosine-style: higher is always better.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub id: SegmentId,
    pub source_id: String,
    pub source_url: Option<String>,
    pub text: String,
    pub partition: Partition,
    pub score: f32,
}

impl SearchHit {
    pub fn from_segment(segment: &Segment, score: f32) -> Self {
        Self {
            id: segment.id.clone(),
            source_id: segment.source_id.clone(),
            source_url: segment.source_url.clone(),
            text: segment.text.clone(),
            partition: segment.partition(),
            score,
        }
    }
}

/// Ranked hits from a single partition, best first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalResult {
    hits: Vec<SearchHit>,
}

impl RetrievalResult {
    /// Sorts by descending score and keeps at most `limit` hits.
    pub fn new(mut hits: Vec<SearchHit>, limit: usize) -> Self {
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Self { hits }
    }

    pub fn len(&self) -> usize { self.hits.len() }

    pub fn is_empty(&self) -> bool { self.hits.is_empty() }

    pub fn hits(&self) -> &[SearchHit] { &self.hits }

    pub fn iter(&self) -> std::slice::Iter<'_, SearchHit> { self.hits.iter() }

    pub fn into_hits(self) -> Vec<SearchHit> { self.hits }
}

/// Output of a stratified retrieval: one independent ranking per partition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StratifiedResults {
    pub subject: RetrievalResult,
    pub other: RetrievalResult,
}

impl StratifiedResults {
    pub fn is_empty(&self) -> bool { self.subject.is_empty() && self.other.is_empty() }
}

/// A hardcoded fact injected verbatim when one of its keywords appears in a question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Framework {
    pub name: String,
    pub keywords: Vec<String>,
    pub content: String,
}

impl Framework {
    pub fn new(name: &str, keywords: &[&str], content: &str) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            content: content.to_string(),
        }
    }

    /// `question` must already be lowercased.
    pub fn matches(&self, question: &str) -> bool {
        self.keywords.iter().any(|k| !k.is_empty() && question.contains(k.to_lowercase().as_str()))
    }
}

/// A source reference emitted after an answer has been fully streamed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    pub segment_id: SegmentId,
    pub source_id: String,
    pub source_url: Option<String>,
    pub partition: Partition,
    pub authority: String,
    pub score: f32,
}

impl From<&SearchHit> for Citation {
    fn from(hit: &SearchHit) -> Self {
        Self {
            segment_id: hit.id.clone(),
            source_id: hit.source_id.clone(),
            source_url: hit.source_url.clone(),
            partition: hit.partition,
            authority: hit.partition.authority().to_string(),
            score: hit.score,
        }
    }
}

/// A single streaming generation request.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}
