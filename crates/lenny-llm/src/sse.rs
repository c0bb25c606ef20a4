//! Decoding of OpenAI-style `text/event-stream` completion bodies.

use anyhow::{anyhow, Context, Result};
use async_stream::try_stream;
use futures::{Stream, StreamExt};
use serde::Deserialize;

/// What one `data:` line carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Delta(String),
    Done,
}

#[derive(Deserialize)]
struct ChunkBody {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Parses a single line of the event stream.
///
/// Blank lines, comments and non-`data` fields yield `None`, as do chunks
/// with an empty delta (role announcements, finish reasons).
pub fn parse_sse_line(line: &str) -> Result<Option<SseEvent>> {
    let line = line.trim_end_matches('\r');
    let Some(data) = line.strip_prefix("data:") else { return Ok(None) };
    let data = data.trim();
    if data.is_empty() { return Ok(None); }
    if data == "[DONE]" { return Ok(Some(SseEvent::Done)); }

    let body: ChunkBody = serde_json::from_str(data).with_context(|| format!("malformed stream chunk: {}", data))?;
    if let Some(err) = body.error {
        return Err(anyhow!("backend reported an error mid-stream: {}", err));
    }
    let text: String = body.choices.into_iter().filter_map(|c| c.delta.content).collect();
    Ok(if text.is_empty() { None } else { Some(SseEvent::Delta(text)) })
}

/// Splits arbitrary byte chunks into complete lines.
#[derive(Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned());
        }
        lines
    }

    /// Whatever is left after the transport closed.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() { return None; }
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(rest)
    }
}

/// Turns a raw byte stream into text fragments.
///
/// Ends cleanly on `[DONE]`. A transport error, a malformed chunk, or the body
/// closing before `[DONE]` ends the stream with an `Err` item.
pub fn decode_fragments<S, B, E>(bytes: S) -> impl Stream<Item = Result<String>> + Send + 'static
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<anyhow::Error> + Send + 'static,
{
    try_stream! {
        let mut bytes = Box::pin(bytes);
        let mut lines = LineBuffer::default();
        let mut done = false;
        'read: while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|e| Into::<anyhow::Error>::into(e).context("reading completion stream"))?;
            for line in lines.push(chunk.as_ref()) {
                match parse_sse_line(&line)? {
                    Some(SseEvent::Delta(text)) => yield text,
                    Some(SseEvent::Done) => { done = true; break 'read; }
                    None => {}
                }
            }
        }
        if !done {
            if let Some(line) = lines.finish() {
                match parse_sse_line(&line)? {
                    Some(SseEvent::Delta(text)) => yield text,
                    Some(SseEvent::Done) => done = true,
                    None => {}
                }
            }
        }
        if !done {
            Err::<(), _>(anyhow!("completion stream closed before [DONE]"))?;
        }
    }
}
