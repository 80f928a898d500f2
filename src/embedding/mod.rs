//! Embedding provider abstraction, adapters, and the ordered fallback table.
//!
//! The retrieval pipeline never talks to a single embedding backend directly. Instead it asks
//! [`EmbeddingProviders`] to embed a batch, which walks its candidate models in priority order
//! and reports which model produced the vectors. That model is then pinned to the index built
//! from those vectors so that later queries are embedded in the same space.

mod gemini;

pub use gemini::GeminiEmbeddingClient;

use crate::config::{Config, EmbeddingProvider};
use crate::gemini::{GeminiError, GeminiTransport};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Remote provider request failed.
    #[error("Embedding provider request failed: {0}")]
    Provider(#[from] GeminiError),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Model identifier this client embeds with.
    fn model(&self) -> &str;

    /// Produce an embedding vector for each supplied chunk of text.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;

    /// Produce the embedding used to query an index.
    async fn embed_query(&self, text: String) -> Result<Vec<f32>, EmbeddingClientError> {
        self.generate_embeddings(vec![text])
            .await?
            .pop()
            .ok_or_else(|| EmbeddingClientError::GenerationFailed("no vector returned".into()))
    }
}

/// Deterministic offline embedding client that hashes bytes into vector slots.
pub struct HashEmbeddingClient {
    model: String,
    dimension: usize,
}

impl HashEmbeddingClient {
    /// Construct a hashing client producing vectors of `dimension` slots.
    pub fn new(dimension: usize) -> Self {
        Self {
            model: format!("hash-{dimension}"),
            dimension,
        }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        if text.is_empty() {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            let position = (idx.wrapping_mul(31) ^ usize::from(byte)) % dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashEmbeddingClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        tracing::debug!(
            model = %self.model,
            texts = texts.len(),
            "Generating hash embeddings"
        );

        Ok(texts
            .iter()
            .map(|text| Self::encode(text, self.dimension))
            .collect())
    }
}

/// Successful embedding of a batch, together with the client that produced it.
pub struct EmbeddedBatch {
    /// Client whose model produced `vectors`.
    pub client: Arc<dyn EmbeddingClient>,
    /// One vector per input text, in input order.
    pub vectors: Vec<Vec<f32>>,
}

/// Every candidate model failed to embed a batch.
#[derive(Debug, Error)]
#[error("all embedding models failed (tried {tried}): {last_error}", tried = .attempted.join(", "))]
pub struct EmbeddingFallbackError {
    /// Model identifiers attempted, in order.
    pub attempted: Vec<String>,
    /// Error message reported by the last attempt.
    pub last_error: String,
}

/// Ordered table of embedding backends tried until one succeeds.
#[derive(Clone)]
pub struct EmbeddingProviders {
    candidates: Vec<Arc<dyn EmbeddingClient>>,
}

impl EmbeddingProviders {
    /// Build a table from explicit candidates; the first entry is the preferred model.
    pub fn new(candidates: Vec<Arc<dyn EmbeddingClient>>) -> Self {
        Self { candidates }
    }

    /// Build the table described by the configuration.
    pub fn from_config(config: &Config, transport: &GeminiTransport) -> Self {
        let candidates: Vec<Arc<dyn EmbeddingClient>> = match config.embedding_provider {
            EmbeddingProvider::Hash => {
                vec![Arc::new(HashEmbeddingClient::new(config.embedding_dimension))]
            }
            EmbeddingProvider::Gemini => std::iter::once(&config.embedding_model)
                .chain(config.embedding_fallback_models.iter())
                .map(|model| {
                    Arc::new(GeminiEmbeddingClient::new(transport.clone(), model))
                        as Arc<dyn EmbeddingClient>
                })
                .collect(),
        };
        tracing::info!(
            models = ?candidates.iter().map(|client| client.model()).collect::<Vec<_>>(),
            "Embedding providers configured"
        );
        Self::new(candidates)
    }

    /// Resolve the client for a model recorded on an index.
    pub fn client_for(&self, model: &str) -> Option<Arc<dyn EmbeddingClient>> {
        self.candidates
            .iter()
            .find(|client| client.model() == model)
            .cloned()
    }

    /// Embed `texts` with the first candidate that returns one well-formed vector per text.
    pub async fn embed_with_fallback(
        &self,
        texts: &[String],
    ) -> Result<EmbeddedBatch, EmbeddingFallbackError> {
        let mut attempted = Vec::with_capacity(self.candidates.len());
        let mut last_error = String::from("no embedding models configured");

        for client in &self.candidates {
            attempted.push(client.model().to_string());
            let outcome = client
                .generate_embeddings(texts.to_vec())
                .await
                .and_then(|vectors| validate_batch(texts.len(), vectors));

            match outcome {
                Ok(vectors) => {
                    tracing::debug!(
                        model = client.model(),
                        vectors = vectors.len(),
                        attempts = attempted.len(),
                        "Embeddings generated"
                    );
                    return Ok(EmbeddedBatch {
                        client: client.clone(),
                        vectors,
                    });
                }
                Err(error) => {
                    tracing::warn!(
                        model = client.model(),
                        error = %error,
                        "Embedding model failed; trying next candidate"
                    );
                    last_error = error.to_string();
                }
            }
        }

        Err(EmbeddingFallbackError {
            attempted,
            last_error,
        })
    }
}

fn validate_batch(
    expected: usize,
    vectors: Vec<Vec<f32>>,
) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
    if vectors.len() != expected {
        return Err(EmbeddingClientError::GenerationFailed(format!(
            "expected {expected} vectors, got {}",
            vectors.len()
        )));
    }
    let dimension = vectors.first().map(Vec::len).unwrap_or(0);
    if expected > 0 && dimension == 0 {
        return Err(EmbeddingClientError::GenerationFailed(
            "provider returned empty vectors".into(),
        ));
    }
    if vectors.iter().any(|vector| vector.len() != dimension) {
        return Err(EmbeddingClientError::GenerationFailed(
            "provider returned vectors of differing dimensions".into(),
        ));
    }
    if vectors.iter().flatten().any(|value| !value.is_finite()) {
        return Err(EmbeddingClientError::GenerationFailed(
            "provider returned non-finite vector components".into(),
        ));
    }
    Ok(vectors)
}
