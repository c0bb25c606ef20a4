use std::fmt;
use thiserror::Error;

/// The pipeline stage an external call failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Embedding,
    Retrieval,
    Generation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Embedding => "embedding",
            Stage::Retrieval => "retrieval",
            Stage::Generation => "generation",
        })
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Embedding failed: {0}")]
    EmbeddingFailure(#[source] anyhow::Error),

    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(#[source] anyhow::Error),

    #[error("Generation interrupted after {fragments_emitted} fragments: {source}")]
    GenerationInterrupted {
        fragments_emitted: usize,
        #[source]
        source: anyhow::Error,
    },
}

impl Error {
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::EmbeddingFailure(_) => Some(Stage::Embedding),
            Error::RetrievalUnavailable(_) => Some(Stage::Retrieval),
            Error::GenerationInterrupted { .. } => Some(Stage::Generation),
            Error::InvalidRequest(_) | Error::InvalidConfig(_) => None,
        }
    }

    /// Caller-facing wording. Search failures call for a retry, generation
    /// failures for keeping the partial text on screen.
    pub fn user_notice(&self) -> &'static str {
        match self {
            Error::EmbeddingFailure(_) | Error::RetrievalUnavailable(_) => {
                "I couldn't search my notes just now. Please try asking again."
            }
            Error::GenerationInterrupted { .. } => "I started answering but got cut off. What you see above is all I got out.",
            Error::InvalidRequest(_) => "I can't answer that request as asked. Check the question and the search settings.",
            Error::InvalidConfig(_) => "I'm not set up correctly yet.",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
