//! Core data types and error definitions for the retrieval pipeline.

use crate::{
    embedding::EmbeddingFallbackError, extract::ExtractionError,
    generation::GenerationClientError, index::IndexError,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while turning raw text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Splitter configured with an impossible size budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
}

/// Errors emitted by the tutor pipeline.
#[derive(Debug, Error)]
pub enum TutorError {
    /// Caller supplied missing or malformed input.
    #[error("{0}")]
    Validation(String),
    /// Uploaded document could not be parsed.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// Document produced no chunks to index.
    #[error("No text extracted from the PDF")]
    EmptyDocument,
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Every configured embedding model failed.
    #[error("Embedding provider error: {0}")]
    EmbeddingProvider(#[from] EmbeddingFallbackError),
    /// Generation provider failed to produce an answer.
    #[error("Generation provider error: {0}")]
    GenerationProvider(#[from] GenerationClientError),
    /// No index is in memory and none is persisted.
    #[error("Vector store not initialized; upload a document first")]
    IndexNotReady,
    /// Index was built with an embedding model that is no longer configured.
    #[error("Embedding model '{0}' used by the index is not configured")]
    UnknownEmbeddingModel(String),
    /// Index could not be searched or loaded.
    #[error("Vector index error: {0}")]
    Index(#[from] IndexError),
}

/// Result of writing a freshly built index to the persisted slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    /// The slot now holds the new index.
    Persisted,
    /// The slot could not be written; the in-memory index still serves requests.
    Failed(String),
}

/// A chunk returned by similarity search, with its L2 distance to the query.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarChunk {
    /// Full chunk text.
    pub chunk: String,
    /// Euclidean distance to the query vector; smaller is more similar.
    pub similarity_score: f32,
}

/// Bounded view of a chunk used to ground an answer.
#[derive(Debug, Clone, Serialize)]
pub struct SourceExcerpt {
    /// First characters of the chunk.
    pub content: String,
    /// Metadata stored with the chunk.
    pub metadata: Map<String, Value>,
}

/// Grounded answer with the sources it was conditioned on.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    /// Generated answer text.
    pub answer: String,
    /// Retrieved chunks, nearest first.
    pub sources: Vec<SourceExcerpt>,
}

/// Snapshot describing the current similarity index.
#[derive(Debug, Clone, Serialize)]
pub struct IndexInfo {
    /// `initialized` or `not_initialized`.
    pub status: &'static str,
    /// Persisted slot location.
    pub index_path: PathBuf,
    /// Index identifier, when initialized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_id: Option<String>,
    /// Embedding model that built the index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    /// Number of indexed chunks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<usize>,
    /// Vector dimension.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,
    /// Build timestamp (RFC3339).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub built_at: Option<String>,
    /// SHA-256 of the indexed text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_digest: Option<String>,
    /// Whether the last build reached the persisted slot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persisted: Option<bool>,
    /// Why the last persist failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persist_error: Option<String>,
}

/// Role-tagged chat turn as received from a caller.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatTurn {
    /// `system`, `user`, `human`, or `assistant`.
    pub role: String,
    /// Turn content.
    pub content: String,
}

/// Everything `/learn` reports after indexing a document and answering a topic.
#[derive(Debug, Clone, Serialize)]
pub struct LearnOutcome {
    /// State of the freshly built index.
    pub vector_store_info: IndexInfo,
    /// Nearest chunks to the topic, nearest first.
    pub similar_chunks: Vec<SimilarChunk>,
    /// Grounded answer about the topic.
    pub qa_result: QueryResult,
}
