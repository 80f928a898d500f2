//! Grounded prompt composition and response shaping.

use super::types::SourceExcerpt;
use crate::generation::{ChatMessage, GenerationRequest};
use crate::index::IndexedChunk;

/// System instruction sent with every grounded answer.
pub const TUTOR_SYSTEM_PROMPT: &str =
    "You are a helpful tutor. Answer the question using only the provided context.";

/// Maximum characters of a chunk returned as a source excerpt.
pub const SOURCE_EXCERPT_CHARS: usize = 200;

/// Build the generation request answering `question` from the retrieved `context` chunks.
///
/// Chunks are joined in retrieval order, nearest first.
pub fn grounded_request<'a, I>(
    context: I,
    question: &str,
    temperature: Option<f32>,
) -> GenerationRequest
where
    I: IntoIterator<Item = &'a IndexedChunk>,
{
    let context = context
        .into_iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    GenerationRequest {
        system: Some(TUTOR_SYSTEM_PROMPT.to_string()),
        messages: vec![ChatMessage::user(format!(
            "Context:\n{context}\n\nQuestion: {question}\n\nAnswer:"
        ))],
        temperature,
    }
}

/// Bounded excerpt of a chunk, with its metadata.
pub fn excerpt(chunk: &IndexedChunk) -> SourceExcerpt {
    SourceExcerpt {
        content: chunk.text.chars().take(SOURCE_EXCERPT_CHARS).collect(),
        metadata: chunk.metadata.clone(),
    }
}
