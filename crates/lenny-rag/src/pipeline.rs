//! The answer pipeline and its streamed output.
//!
//! `EMBEDDING -> RETRIEVING -> CONTEXT_BUILT -> STREAMING -> DONE`, with
//! `FAILED` reachable from every non-terminal state. Failures before streaming
//! are returned from [`LennyRag::answer`]; failures while streaming arrive as a
//! terminal [`AnswerEvent::Interrupted`] after whatever text was already sent.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::Stream;
use futures::StreamExt;
use tracing::{debug, info, warn};

use lenny_core::traits::{CompletionBackend, FragmentStream};
use lenny_core::types::Citation;
use lenny_core::{Error, Result};

use crate::persona::{PersonaPolicy, PromptContext};
use crate::retriever::{check_request, StratifiedRetriever};

pub const DEFAULT_MAX_TOKENS: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Embedding,
    Retrieving,
    ContextBuilt,
    Streaming,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool { matches!(self, PipelineState::Done | PipelineState::Failed) }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelineState::Embedding => "EMBEDDING",
            PipelineState::Retrieving => "RETRIEVING",
            PipelineState::ContextBuilt => "CONTEXT_BUILT",
            PipelineState::Streaming => "STREAMING",
            PipelineState::Done => "DONE",
            PipelineState::Failed => "FAILED",
        })
    }
}

#[derive(Debug)]
pub enum AnswerEvent {
    Fragment(String),
    /// Last item of a complete answer.
    Done { citations: Vec<Citation> },
    /// Last item of a cut-off answer. Fragments already yielded stand.
    Interrupted { error: Error, citations: Vec<Citation> },
}

pub struct LennyRag {
    retriever: StratifiedRetriever,
    policy: PersonaPolicy,
    completion: Arc<dyn CompletionBackend>,
    max_tokens: u32,
}

impl LennyRag {
    pub fn new(retriever: StratifiedRetriever, policy: PersonaPolicy, completion: Arc<dyn CompletionBackend>) -> Self {
        Self { retriever, policy, completion, max_tokens: DEFAULT_MAX_TOKENS }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn retriever(&self) -> &StratifiedRetriever { &self.retriever }

    pub fn policy(&self) -> &PersonaPolicy { &self.policy }

    /// Answers one independent question.
    ///
    /// Never retries. An embedding or index failure is returned here with no
    /// answer attempted.
    pub async fn answer(&self, question: &str, top_k_per_partition: usize, temperature: f32) -> Result<AnswerStream> {
        check_request(question, top_k_per_partition)?;
        if !temperature.is_finite() || !(0.0..=2.0).contains(&temperature) {
            return Err(Error::InvalidRequest(format!("temperature {} outside [0, 2]", temperature)));
        }

        transition(PipelineState::Embedding);
        let query = self.retriever.embed_question(question).await.inspect_err(|_| transition(PipelineState::Failed))?;

        transition(PipelineState::Retrieving);
        let results = self.retriever.search(&query, top_k_per_partition).await.inspect_err(|_| transition(PipelineState::Failed))?;

        let context = self.policy.build_prompt(question, &results);
        transition(PipelineState::ContextBuilt);
        debug!(
            framework = context.injected_framework.as_ref().map(|f| f.name.as_str()).unwrap_or("none"),
            subject = context.subject_evidence.len(),
            other = context.other_evidence.len(),
            "prompt assembled"
        );
        if !context.has_evidence() {
            info!("no supporting passages found; answering from frameworks only");
        }

        let request = context.to_request(temperature, self.max_tokens);
        transition(PipelineState::Streaming);
        let fragments = match self.completion.generate(request).await {
            Ok(stream) => stream,
            // Surfaces as an interruption with zero fragments.
            Err(e) => futures::stream::once(futures::future::ready(Err(e))).boxed(),
        };
        Ok(AnswerStream::new(fragments, context))
    }
}

fn transition(state: PipelineState) {
    debug!(%state, "pipeline state");
}

/// Streamed answer: text fragments in order, then exactly one terminal event.
///
/// Dropping it before the end drops the completion stream and with it the
/// connection to the backend.
pub struct AnswerStream {
    fragments: Option<FragmentStream>,
    context: PromptContext,
    state: PipelineState,
    emitted: usize,
}

impl AnswerStream {
    fn new(fragments: FragmentStream, context: PromptContext) -> Self {
        Self { fragments: Some(fragments), context, state: PipelineState::Streaming, emitted: 0 }
    }

    pub fn state(&self) -> PipelineState { self.state }

    pub fn context(&self) -> &PromptContext { &self.context }

    pub fn fragments_emitted(&self) -> usize { self.emitted }

    fn finish(&mut self) -> AnswerEvent {
        self.fragments = None;
        self.state = PipelineState::Done;
        transition(self.state);
        AnswerEvent::Done { citations: self.context.citations() }
    }

    fn fail(&mut self, source: anyhow::Error) -> AnswerEvent {
        self.fragments = None;
        self.state = PipelineState::Failed;
        warn!(fragments = self.emitted, error = %source, "generation interrupted");
        transition(self.state);
        AnswerEvent::Interrupted {
            error: Error::GenerationInterrupted { fragments_emitted: self.emitted, source },
            citations: self.context.citations(),
        }
    }
}

impl Stream for AnswerStream {
    type Item = AnswerEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<AnswerEvent>> {
        let this = self.get_mut();
        let Some(fragments) = this.fragments.as_mut() else { return Poll::Ready(None) };
        match fragments.as_mut().poll_next(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(text))) => {
                this.emitted += 1;
                Poll::Ready(Some(AnswerEvent::Fragment(text)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(this.fail(e))),
            Poll::Ready(None) => Poll::Ready(Some(this.finish())),
        }
    }
}
