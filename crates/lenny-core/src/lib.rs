//! Shared model for the Lenny answer engine: segments and partitions, the
//! capability traits the pipeline talks to, errors, configuration and corpus
//! ingestion with heuristic speaker attribution.

pub mod attribution;
pub mod config;
pub mod data_processor;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result, Stage};
pub use types::{Citation, CompletionRequest, Framework, Partition, RetrievalResult, SearchHit, Segment, StratifiedResults};
