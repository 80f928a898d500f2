use super::{EmbeddingClient, EmbeddingClientError};
use crate::gemini::{GeminiTransport, model_resource};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

/// Gemini caps `batchEmbedContents` at 100 requests per call.
const MAX_BATCH_SIZE: usize = 100;

/// Embedding client backed by the Gemini `batchEmbedContents` endpoint.
pub struct GeminiEmbeddingClient {
    transport: GeminiTransport,
    model: String,
}

impl GeminiEmbeddingClient {
    /// Create a client embedding with `model` (e.g. `models/text-embedding-004`).
    pub fn new(transport: GeminiTransport, model: &str) -> Self {
        Self {
            transport,
            model: model_resource(model),
        }
    }

    async fn embed(
        &self,
        texts: &[String],
        task_type: &str,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let mut vectors = Vec::with_capacity(texts.len());
        let path = format!("v1beta/{}:batchEmbedContents", self.model);

        for batch in texts.chunks(MAX_BATCH_SIZE) {
            let requests: Vec<_> = batch
                .iter()
                .map(|text| {
                    json!({
                        "model": self.model,
                        "content": { "parts": [{ "text": text }] },
                        "taskType": task_type,
                    })
                })
                .collect();

            let response: BatchEmbedResponse = self
                .transport
                .post(&path, &json!({ "requests": requests }))
                .await?;
            vectors.extend(response.embeddings.into_iter().map(|item| item.values));
        }

        Ok(vectors)
    }
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}

#[async_trait]
impl EmbeddingClient for GeminiEmbeddingClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        tracing::debug!(model = %self.model, texts = texts.len(), "Requesting Gemini embeddings");
        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }
        self.embed(&texts, "RETRIEVAL_DOCUMENT").await
    }

    async fn embed_query(&self, text: String) -> Result<Vec<f32>, EmbeddingClientError> {
        self.embed(std::slice::from_ref(&text), "RETRIEVAL_QUERY")
            .await?
            .pop()
            .ok_or_else(|| EmbeddingClientError::GenerationFailed("no vector returned".into()))
    }
}
