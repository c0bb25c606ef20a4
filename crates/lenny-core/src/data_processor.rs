//! Turns a corpus directory into partition-labeled segments.
//!
//! Layout under the corpus root:
//! - `writing/**/*.txt`: the subject's own posts, every segment is `Subject`
//! - `transcripts/**/*.txt`: interviews, each turn labeled by [`crate::attribution`]
//!
//! A file may start with a `url: <link>` line that is carried into citations.

use anyhow::Result;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::attribution::{self, AttributionRule};
use crate::types::{Partition, Segment};

pub const WRITING_DIR: &str = "writing";
pub const TRANSCRIPTS_DIR: &str = "transcripts";

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub max_words: usize,
    pub overlap_percent: f32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_words: 300, overlap_percent: 0.2 }
    }
}

#[derive(Default)]
pub struct DataProcessor {
    chunking_config: ChunkingConfig,
}

impl DataProcessor {
    pub fn new() -> Self { Self::default() }

    pub fn with_chunking(chunking_config: ChunkingConfig) -> Self { Self { chunking_config } }

    pub fn process_directory(&self, root: &Path) -> Result<Vec<Segment>> {
        let mut all_segments = Vec::new();
        let writing = self.list_txt_files(&root.join(WRITING_DIR));
        for file_path in &writing {
            let (url, body) = take_url_header(&self.read_file_content(file_path)?);
            let source_id = self.extract_doc_id(root, file_path, WRITING_DIR);
            all_segments.extend(self.process_writing(&source_id, &body, url));
        }
        let transcripts = self.list_txt_files(&root.join(TRANSCRIPTS_DIR));
        let mut by_rule: HashMap<AttributionRule, usize> = HashMap::new();
        for file_path in &transcripts {
            let (url, body) = take_url_header(&self.read_file_content(file_path)?);
            let source_id = self.extract_doc_id(root, file_path, TRANSCRIPTS_DIR);
            let (segments, rules) = self.process_transcript(&source_id, &body, url);
            for rule in rules { *by_rule.entry(rule).or_default() += 1; }
            all_segments.extend(segments);
        }
        if writing.is_empty() && transcripts.is_empty() {
            info!(root = %root.display(), "no .txt files found");
            return Ok(vec![]);
        }
        for (rule, count) in &by_rule { debug!(rule = rule.as_str(), count, "attribution rule"); }
        let subject = all_segments.iter().filter(|s| s.partition() == Partition::Subject).count();
        info!(writing = writing.len(), transcripts = transcripts.len(), segments = all_segments.len(), subject, other = all_segments.len() - subject, "processed corpus");
        Ok(all_segments)
    }

    /// Paragraph-chunks one of the subject's own documents.
    pub fn process_writing(&self, source_id: &str, content: &str, url: Option<String>) -> Vec<Segment> {
        let mut pieces = Vec::new();
        for paragraph in content.split("\n\n") {
            let paragraph = paragraph.trim(); if paragraph.is_empty() { continue; }
            if paragraph.split_whitespace().count() <= self.chunking_config.max_words { pieces.push(paragraph.to_string()); }
            else { pieces.extend(self.split_paragraph_with_overlap(paragraph)); }
        }
        let total = pieces.len();
        pieces.into_iter().enumerate()
            .map(|(i, text)| Segment::new(source_id, text, Partition::Subject, i, total).with_url(url.clone()))
            .collect()
    }

    /// Splits an interview into turns and labels each one exactly once.
    pub fn process_transcript(&self, source_id: &str, content: &str, url: Option<String>) -> (Vec<Segment>, Vec<AttributionRule>) {
        let turns = split_turns(content);
        let total = turns.len();
        let mut rules = Vec::with_capacity(total);
        let segments: Vec<Segment> = turns.into_iter().enumerate().map(|(i, turn)| {
            let (partition, rule) = attribution::explain(turn, i, total);
            rules.push(rule);
            Segment::new(source_id, turn, partition, i, total).with_url(url.clone())
        }).collect();
        (segments, rules)
    }

    fn read_file_content(&self, file_path: &Path) -> Result<String> {
        match fs::read_to_string(file_path) {
            Ok(content) => Ok(content),
            Err(_) => Ok(String::from_utf8_lossy(&fs::read(file_path)?).to_string()),
        }
    }

    /// `<kind>/<path under root/kind without extension>`, e.g. `writing/2023/pmf`.
    fn extract_doc_id(&self, root: &Path, file_path: &Path, kind: &str) -> String {
        let relative = file_path.strip_prefix(root.join(kind)).unwrap_or(file_path).with_extension("");
        let parts: Vec<String> = relative.components().map(|c| c.as_os_str().to_string_lossy().to_string()).collect();
        if parts.is_empty() { format!("{}/unnamed", kind) } else { format!("{}/{}", kind, parts.join("/")) }
    }

    fn split_paragraph_with_overlap(&self, paragraph: &str) -> Vec<String> {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        let words_per_chunk = self.chunking_config.max_words.max(1);
        let overlap_words = ((words_per_chunk as f32 * self.chunking_config.overlap_percent) as usize).min(words_per_chunk - 1);
        let mut chunks = Vec::new(); let mut start = 0;
        while start < words.len() {
            let end = (start + words_per_chunk).min(words.len());
            chunks.push(words[start..end].join(" "));
            if end >= words.len() { break; }
            start = end - overlap_words;
        }
        chunks
    }

    fn list_txt_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut txt_files = Vec::new();
        for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
            let path = entry.path(); if path.extension().and_then(|s| s.to_str()) == Some("txt") { txt_files.push(path.to_path_buf()); }
        }
        txt_files.sort(); txt_files
    }
}

/// Splits after `.`, `?` or `!` when followed by whitespace.
pub fn split_turns(text: &str) -> Vec<&str> {
    let mut turns = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if matches!(c, '.' | '?' | '!') {
            if let Some(&(next_i, next)) = chars.peek() {
                if next.is_whitespace() {
                    let turn = text[start..next_i].trim();
                    if !turn.is_empty() { turns.push(turn); }
                    start = next_i;
                }
            }
        }
    }
    let rest = text[start..].trim();
    if !rest.is_empty() { turns.push(rest); }
    turns
}

fn take_url_header(content: &str) -> (Option<String>, String) {
    let mut lines = content.splitn(2, '\n');
    let first = lines.next().unwrap_or("").trim();
    match first.strip_prefix("url:") {
        Some(url) => (Some(url.trim().to_string()).filter(|u| !u.is_empty()), lines.next().unwrap_or("").to_string()),
        None => (None, content.to_string()),
    }
}
