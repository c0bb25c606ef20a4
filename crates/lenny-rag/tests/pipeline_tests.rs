mod support;

use futures::StreamExt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use lenny_core::traits::VectorIndex;
use lenny_core::types::Partition;
use lenny_core::Error;
use lenny_embed::EmbeddingCache;
use lenny_rag::{AnswerEvent, LennyRag, PersonaPolicy, PipelineState, StratifiedRetriever};
use lenny_vector::MemoryIndex;
use support::*;

async fn drain(stream: lenny_rag::AnswerStream) -> Vec<AnswerEvent> { stream.collect().await }

#[tokio::test]
async fn streams_fragments_then_citations() {
    let completion = Arc::new(ScriptedCompletion::text(&["Retention ", "is ", "everything."]));
    let rag = rag(corpus(4, 4).await, Arc::clone(&completion));

    let stream = rag.answer("How should I think about retention?", 2, 0.7).await.unwrap();
    assert_eq!(stream.state(), PipelineState::Streaming);
    let expected_citations = stream.context().citations();
    let events = drain(stream).await;

    let text: String = events.iter().filter_map(|e| match e { AnswerEvent::Fragment(t) => Some(t.as_str()), _ => None }).collect();
    assert_eq!(text, "Retention is everything.");
    match events.last() {
        Some(AnswerEvent::Done { citations }) => {
            assert_eq!(citations, &expected_citations);
            assert_eq!(citations[0].partition, Partition::Subject);
            assert_eq!(citations.last().map(|c| c.authority.as_str()), Some("Guest case study"));
        }
        other => panic!("expected Done, got {:?}", other),
    }
    assert_eq!(events.len(), 4);
    assert!(!completion.is_open());

    let request = completion.request();
    assert!(request.system.contains("Use contractions"));
    assert!(request.prompt.contains("From Lenny's own writing"));
    assert!(request.prompt.contains("From others' examples"));
    assert!(request.prompt.contains("SMB products around 60%"));
    assert_eq!(request.max_tokens, 500);
    assert!((request.temperature - 0.7).abs() < f32::EPSILON);
}

#[tokio::test]
async fn dropping_the_stream_closes_the_backend() {
    let completion = Arc::new(ScriptedCompletion::text(&["first", "second"]).hanging());
    let rag = rag(corpus(2, 2).await, Arc::clone(&completion));

    let mut stream = rag.answer("retention tips?", 3, 0.2).await.unwrap();
    assert!(matches!(stream.next().await, Some(AnswerEvent::Fragment(ref t)) if t == "first"));
    assert!(completion.is_open());
    drop(stream);
    assert!(!completion.is_open());
}

#[tokio::test]
async fn mid_stream_failure_keeps_partial_text() {
    let completion = Arc::new(ScriptedCompletion::new(vec![Ok("PMF is "), Ok("when "), Err("upstream reset")]));
    let rag = rag(corpus(2, 2).await, Arc::clone(&completion));

    let mut stream = rag.answer("what is pmf?", 3, 0.7).await.unwrap();
    let mut text = String::new();
    let mut terminal = None;
    while let Some(event) = stream.next().await {
        match event {
            AnswerEvent::Fragment(t) => text.push_str(&t),
            other => terminal = Some(other),
        }
    }
    assert_eq!(text, "PMF is when ");
    assert_eq!(stream.state(), PipelineState::Failed);
    match terminal {
        Some(AnswerEvent::Interrupted { error: Error::GenerationInterrupted { fragments_emitted, .. }, citations }) => {
            assert_eq!(fragments_emitted, 2);
            assert!(!citations.is_empty());
        }
        other => panic!("expected Interrupted, got {:?}", other),
    }
    assert!(!completion.is_open());
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn refused_completion_is_an_empty_interruption() {
    let completion = Arc::new(ScriptedCompletion::text(&[]).refusing("503 overloaded"));
    let rag = rag(corpus(1, 1).await, Arc::clone(&completion));

    let events = drain(rag.answer("hiring advice?", 1, 0.7).await.unwrap()).await;
    assert_eq!(events.len(), 1);
    match &events[0] {
        AnswerEvent::Interrupted { error, .. } => {
            assert!(matches!(error, Error::GenerationInterrupted { fragments_emitted: 0, .. }));
            assert!(error.user_notice().contains("cut off"));
        }
        other => panic!("expected Interrupted, got {:?}", other),
    }
}

#[tokio::test]
async fn embedding_failure_stops_before_generation() {
    let completion = Arc::new(ScriptedCompletion::text(&["never"]));
    let retriever = StratifiedRetriever::new(corpus(2, 2).await, Arc::new(EmbeddingCache::new(Arc::new(BrokenEmbedder))));
    let rag = LennyRag::new(retriever, PersonaPolicy::default(), Arc::clone(&completion) as _);

    let err = rag.answer("what is pmf?", 3, 0.7).await.err().unwrap();
    assert!(matches!(err, Error::EmbeddingFailure(_)));
    assert!(err.user_notice().contains("couldn't search"));
    assert_eq!(completion.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn index_failures_are_retrieval_unavailable() {
    let indexes: [Arc<dyn VectorIndex>; 2] = [Arc::new(BrokenIndex), Arc::new(MemoryIndex::new())];
    for index in indexes {
        let completion = Arc::new(ScriptedCompletion::text(&["never"]));
        let rag = rag(index, Arc::clone(&completion));
        let err = rag.answer("what is pmf?", 3, 0.7).await.err().unwrap();
        assert!(matches!(err, Error::RetrievalUnavailable(_)), "{:?}", err);
        assert!(err.user_notice().contains("couldn't search"));
        assert_eq!(completion.calls.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test]
async fn no_evidence_still_answers() {
    let completion = Arc::new(ScriptedCompletion::text(&["Honestly, I haven't written about that."]));
    let rag = rag(Arc::new(BarrenIndex), Arc::clone(&completion));

    let stream = rag.answer("what do you think of crypto?", 3, 0.7).await.unwrap();
    assert!(!stream.context().has_evidence());
    let events = drain(stream).await;
    assert!(matches!(events.last(), Some(AnswerEvent::Done { citations }) if citations.is_empty()));

    let prompt = completion.request().prompt;
    assert!(prompt.contains("No supporting passages were found"));
    assert!(!prompt.contains("From Lenny's own writing"));
    assert!(!prompt.contains("From others' examples"));
}

#[tokio::test]
async fn preconditions_are_checked() {
    let completion = Arc::new(ScriptedCompletion::text(&["x"]));
    let rag = rag(corpus(1, 1).await, Arc::clone(&completion));
    assert!(matches!(rag.answer("   ", 3, 0.7).await.err(), Some(Error::InvalidRequest(_))));
    assert!(matches!(rag.answer("pmf?", 0, 0.7).await.err(), Some(Error::InvalidRequest(_))));
    assert!(matches!(rag.answer("pmf?", 3, f32::NAN).await.err(), Some(Error::InvalidRequest(_))));
    assert_eq!(completion.calls.load(Ordering::SeqCst), 0);
}
