//! Stratified retrieval, persona conditioning and streamed answering.
//!
//! ```text
//! question -> EmbeddingCache -> StratifiedRetriever -> PersonaPolicy -> CompletionBackend
//!                                 (subject | other)     (PromptContext)    (AnswerStream)
//! ```

pub mod evaluation;
pub mod persona;
pub mod pipeline;
pub mod retriever;

pub use evaluation::{ConsistencyScore, PersonaEvaluator};
pub use persona::{default_frameworks, PersonaPolicy, PromptContext};
pub use pipeline::{AnswerEvent, AnswerStream, LennyRag, PipelineState};
pub use retriever::StratifiedRetriever;
