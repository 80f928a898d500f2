//! Tutor service coordinating chunking, embedding, retrieval, and grounded generation.

use crate::{
    config::Config,
    embedding::{EmbeddingClient, EmbeddingFallbackError, EmbeddingProviders},
    generation::{ChatMessage, ChatRole, GenerationClient, GenerationRequest},
    index::{self, IndexedChunk, PDF_SOURCE, ScoredChunk, SimilarityIndex, chunk_metadata},
    processing::{
        chunking::TextSplitter,
        prompt,
        types::{
            ChatTurn, IndexInfo, LearnOutcome, PersistOutcome, QueryResult, SimilarChunk,
            TutorError,
        },
    },
};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Tunables for [`TutorService`], usually derived from [`Config`].
#[derive(Debug, Clone)]
pub struct TutorSettings {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Character overlap carried between adjacent chunks.
    pub chunk_overlap: usize,
    /// Number of chunks retrieved for `/learn` and `/ask`.
    pub top_k: usize,
    /// Sampling temperature for generated answers.
    pub temperature: Option<f32>,
    /// Persisted index slot.
    pub index_path: PathBuf,
}

impl TutorSettings {
    /// Derive settings from the runtime configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.text_splitter_chunk_size,
            chunk_overlap: config.text_splitter_chunk_overlap,
            top_k: config.retrieval_top_k,
            temperature: Some(config.generation_temperature),
            index_path: config.vector_index_path.clone(),
        }
    }
}

/// A freshly built index and the fate of its persisted copy.
#[derive(Debug, Clone)]
pub struct BuiltIndex {
    /// The index now installed as current.
    pub index: Arc<SimilarityIndex>,
    /// Whether the persisted slot was updated.
    pub persist: PersistOutcome,
}

#[derive(Clone)]
struct InstalledIndex {
    index: Arc<SimilarityIndex>,
    persist: PersistOutcome,
}

/// Retrieval-augmented tutor over one document at a time.
///
/// The service owns the embedding provider table, the generation client, and the current
/// similarity index. Each build replaces the current index wholesale; requests keep working
/// against the `Arc` they obtained, so a query racing a rebuild answers from one consistent
/// index. When no index is in memory, queries fall back to the persisted slot.
pub struct TutorService {
    splitter: TextSplitter,
    embeddings: EmbeddingProviders,
    generator: Arc<dyn GenerationClient>,
    index_path: PathBuf,
    top_k: usize,
    temperature: Option<f32>,
    current: RwLock<Option<InstalledIndex>>,
}

/// Abstraction over the tutor pipeline used by the HTTP surface.
#[async_trait]
pub trait TutorApi: Send + Sync {
    /// Index `text`, then report the chunks nearest to `topic` and a grounded answer about it.
    async fn learn(&self, text: &str, topic: &str) -> Result<LearnOutcome, TutorError>;

    /// Answer `question` from the current (or persisted) index.
    async fn ask(&self, question: &str) -> Result<QueryResult, TutorError>;

    /// Replay a role-tagged conversation to the generation provider and return its reply.
    async fn chat(&self, turns: Vec<ChatTurn>) -> Result<String, TutorError>;

    /// Describe the current index.
    async fn index_info(&self) -> IndexInfo;
}

impl TutorService {
    /// Build a tutor from its collaborators.
    pub fn new(
        settings: TutorSettings,
        embeddings: EmbeddingProviders,
        generator: Arc<dyn GenerationClient>,
    ) -> Result<Self, TutorError> {
        let splitter = TextSplitter::new(settings.chunk_size, settings.chunk_overlap)?;
        tracing::info!(
            chunk_size = settings.chunk_size,
            chunk_overlap = settings.chunk_overlap,
            top_k = settings.top_k,
            index_path = %settings.index_path.display(),
            generation_model = generator.model(),
            "Tutor service configured"
        );
        Ok(Self {
            splitter,
            embeddings,
            generator,
            index_path: settings.index_path,
            top_k: settings.top_k,
            temperature: settings.temperature,
            current: RwLock::new(None),
        })
    }

    /// Chunk and embed `text`, install the resulting index as current, and persist it.
    ///
    /// Persistence is best effort: a failed write is logged and reported in the returned
    /// [`BuiltIndex`], while the in-memory index keeps serving requests. The slot lock is held
    /// from the write through installation, so the persisted file always matches memory.
    pub async fn build_index(&self, text: &str) -> Result<BuiltIndex, TutorError> {
        let pieces = self.splitter.split(text);
        if pieces.is_empty() {
            return Err(TutorError::EmptyDocument);
        }
        tracing::debug!(
            chunks = pieces.len(),
            max_size = self.splitter.max_size(),
            "Document chunked"
        );

        let batch = self.embeddings.embed_with_fallback(&pieces).await?;
        let chunks: Vec<IndexedChunk> = pieces
            .into_iter()
            .enumerate()
            .map(|(position, text)| IndexedChunk {
                text,
                metadata: chunk_metadata(PDF_SOURCE, position),
            })
            .collect();
        let index = Arc::new(SimilarityIndex::build(
            batch.client.model(),
            text,
            chunks,
            batch.vectors,
        )?);

        let mut current = self.current.write().await;
        let persist = match index::persist::save(&index, &self.index_path).await {
            Ok(()) => PersistOutcome::Persisted,
            Err(error) => {
                tracing::warn!(
                    path = %self.index_path.display(),
                    error = %error,
                    "Failed to persist similarity index; serving from memory"
                );
                PersistOutcome::Failed(error.to_string())
            }
        };

        *current = Some(InstalledIndex {
            index: index.clone(),
            persist: persist.clone(),
        });
        drop(current);
        tracing::info!(
            index_id = %index.id(),
            model = index.embedding_model(),
            chunks = index.len(),
            dimension = index.dimension(),
            "Similarity index built"
        );

        Ok(BuiltIndex { index, persist })
    }

    /// Index `text` and answer `topic` from its `k` nearest chunks.
    pub async fn answer(
        &self,
        text: &str,
        topic: &str,
        k: usize,
    ) -> Result<QueryResult, TutorError> {
        require_text(topic, "topic")?;
        let built = self.build_index(text).await?;
        let hits = self.retrieve(&built.index, topic, k).await?;
        self.grounded_answer(&hits, topic).await
    }

    async fn retrieve<'a>(
        &self,
        index: &'a SimilarityIndex,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk<'a>>, TutorError> {
        let client = self.query_client(index)?;
        let vector = client
            .embed_query(query.to_string())
            .await
            .map_err(|error| EmbeddingFallbackError {
                attempted: vec![client.model().to_string()],
                last_error: error.to_string(),
            })?;
        let hits = index.search(&vector, k)?;
        tracing::debug!(
            k,
            hits = hits.len(),
            nearest = hits.first().map(|hit| hit.distance),
            "Retrieved similar chunks"
        );
        Ok(hits)
    }

    /// The client whose model built `index`; queries must be embedded in the same space.
    fn query_client(
        &self,
        index: &SimilarityIndex,
    ) -> Result<Arc<dyn EmbeddingClient>, TutorError> {
        self.embeddings
            .client_for(index.embedding_model())
            .ok_or_else(|| TutorError::UnknownEmbeddingModel(index.embedding_model().to_string()))
    }

    async fn grounded_answer(
        &self,
        hits: &[ScoredChunk<'_>],
        question: &str,
    ) -> Result<QueryResult, TutorError> {
        let request = prompt::grounded_request(
            hits.iter().map(|hit| hit.chunk),
            question,
            self.temperature,
        );
        let answer = self.generator.generate(request).await?;
        Ok(QueryResult {
            answer,
            sources: hits.iter().map(|hit| prompt::excerpt(hit.chunk)).collect(),
        })
    }

    async fn current_or_persisted(&self) -> Result<Arc<SimilarityIndex>, TutorError> {
        if let Some(installed) = self.current.read().await.as_ref() {
            return Ok(installed.index.clone());
        }

        let Some(loaded) = index::persist::load(&self.index_path).await? else {
            return Err(TutorError::IndexNotReady);
        };
        tracing::info!(
            path = %self.index_path.display(),
            index_id = %loaded.id(),
            "Reloaded persisted similarity index"
        );

        // A build that finished while the slot was loading takes precedence.
        let mut current = self.current.write().await;
        let installed = current.get_or_insert_with(|| InstalledIndex {
            index: Arc::new(loaded),
            persist: PersistOutcome::Persisted,
        });
        Ok(installed.index.clone())
    }

    fn describe(&self, installed: Option<&InstalledIndex>) -> IndexInfo {
        let Some(InstalledIndex { index, persist }) = installed else {
            return IndexInfo {
                status: "not_initialized",
                index_path: self.index_path.clone(),
                index_id: None,
                embedding_model: None,
                chunk_count: None,
                dimension: None,
                built_at: None,
                source_digest: None,
                persisted: None,
                persist_error: None,
            };
        };
        let persist_error = match persist {
            PersistOutcome::Persisted => None,
            PersistOutcome::Failed(reason) => Some(reason.clone()),
        };
        IndexInfo {
            status: "initialized",
            index_path: self.index_path.clone(),
            index_id: Some(index.id().to_string()),
            embedding_model: Some(index.embedding_model().to_string()),
            chunk_count: Some(index.len()),
            dimension: Some(index.dimension()),
            built_at: Some(index.built_at().to_string()),
            source_digest: Some(index.source_digest().to_string()),
            persisted: Some(persist_error.is_none()),
            persist_error,
        }
    }
}

fn require_text(value: &str, field: &str) -> Result<(), TutorError> {
    if value.trim().is_empty() {
        return Err(TutorError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

#[async_trait]
impl TutorApi for TutorService {
    async fn learn(&self, text: &str, topic: &str) -> Result<LearnOutcome, TutorError> {
        require_text(topic, "topic")?;
        tracing::info!(topic, characters = text.chars().count(), "Learning document");

        let built = self.build_index(text).await?;
        // The topic is embedded once and serves both the similar-chunk report and the answer.
        let hits = self.retrieve(&built.index, topic, self.top_k).await?;
        let similar_chunks = hits
            .iter()
            .map(|hit| SimilarChunk {
                chunk: hit.chunk.text.clone(),
                similarity_score: hit.distance,
            })
            .collect();
        let qa_result = self.grounded_answer(&hits, topic).await?;

        let installed = InstalledIndex {
            index: built.index.clone(),
            persist: built.persist,
        };
        Ok(LearnOutcome {
            vector_store_info: self.describe(Some(&installed)),
            similar_chunks,
            qa_result,
        })
    }

    async fn ask(&self, question: &str) -> Result<QueryResult, TutorError> {
        require_text(question, "question")?;
        let index = self.current_or_persisted().await?;
        let hits = self.retrieve(&index, question, self.top_k).await?;
        self.grounded_answer(&hits, question).await
    }

    async fn chat(&self, turns: Vec<ChatTurn>) -> Result<String, TutorError> {
        if turns.is_empty() {
            return Err(TutorError::Validation("messages must not be empty".into()));
        }
        let messages = turns
            .into_iter()
            .map(|turn| {
                let role: ChatRole = turn.role.parse().map_err(TutorError::Validation)?;
                Ok(ChatMessage {
                    role,
                    content: turn.content,
                })
            })
            .collect::<Result<Vec<_>, TutorError>>()?;
        if messages.iter().all(|message| message.role == ChatRole::System) {
            return Err(TutorError::Validation(
                "at least one user or assistant message is required".into(),
            ));
        }

        tracing::info!(turns = messages.len(), "Chat request");
        let reply = self
            .generator
            .generate(GenerationRequest {
                system: None,
                messages,
                temperature: self.temperature,
            })
            .await?;
        Ok(reply)
    }

    async fn index_info(&self) -> IndexInfo {
        let current = self.current.read().await;
        self.describe(current.as_ref())
    }
}
