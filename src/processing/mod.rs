//! Retrieval pipeline: chunking, grounded prompts, and the tutor orchestrator.

pub mod chunking;
pub mod prompt;
mod service;
pub mod types;

pub use service::{BuiltIndex, TutorApi, TutorService, TutorSettings};
pub use types::{
    ChatTurn, ChunkingError, IndexInfo, LearnOutcome, PersistOutcome, QueryResult, SimilarChunk,
    SourceExcerpt, TutorError,
};
