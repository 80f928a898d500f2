//! In-memory similarity index over the chunks of one document.
//!
//! An index is immutable once built: rebuilding produces a new [`SimilarityIndex`] that replaces
//! the old one wholesale. Search is exact k-nearest-neighbour by Euclidean distance, so scores
//! are distances and smaller means more similar. The index can be written to and read back from
//! a single JSON slot on disk (see [`persist`]).

pub mod payload;
pub mod persist;

pub use payload::{PDF_SOURCE, chunk_metadata, compute_source_digest};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while building, searching, or persisting an index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// An index needs at least one chunk.
    #[error("cannot build an index without chunks")]
    Empty,
    /// Chunk and vector counts differ.
    #[error("received {vectors} vectors for {chunks} chunks")]
    LengthMismatch {
        /// Number of chunks supplied.
        chunks: usize,
        /// Number of vectors supplied.
        vectors: usize,
    },
    /// A vector does not match the index dimension.
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension of the index.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
    /// A vector holds NaN or an infinite component.
    #[error("vector {position} has non-finite components")]
    NonFinite {
        /// Position of the offending vector; `0` for a query.
        position: usize,
    },
    /// Reading or writing the persisted slot failed.
    #[error("index file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// The persisted slot could not be encoded or decoded.
    #[error("index file is not valid: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A chunk of document text with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    /// Chunk text.
    pub text: String,
    /// Metadata recorded when the chunk was produced.
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    chunk: IndexedChunk,
    vector: Vec<f32>,
}

/// Search hit borrowed from an index.
#[derive(Debug, Clone, Copy)]
pub struct ScoredChunk<'a> {
    /// Matching chunk.
    pub chunk: &'a IndexedChunk,
    /// Euclidean distance to the query; smaller is more similar.
    pub distance: f32,
}

/// Exact nearest-neighbour index over one document's chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityIndex {
    id: Uuid,
    embedding_model: String,
    dimension: usize,
    built_at: String,
    source_digest: String,
    entries: Vec<IndexEntry>,
}

impl SimilarityIndex {
    /// Build an index from chunks and their vectors (paired by position).
    pub fn build(
        embedding_model: &str,
        source_text: &str,
        chunks: Vec<IndexedChunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::Empty);
        }
        if chunks.len() != vectors.len() {
            return Err(IndexError::LengthMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }
        let dimension = vectors[0].len();
        if let Some(vector) = vectors.iter().find(|vector| vector.len() != dimension) {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            });
        }
        if let Some(position) = vectors.iter().position(|vector| !all_finite(vector)) {
            return Err(IndexError::NonFinite { position });
        }

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry { chunk, vector })
            .collect();

        Ok(Self {
            id: Uuid::new_v4(),
            embedding_model: embedding_model.to_string(),
            dimension,
            built_at: payload::current_timestamp_rfc3339(),
            source_digest: compute_source_digest(source_text),
            entries,
        })
    }

    /// Return the `k` chunks nearest to `query`, nearest first.
    ///
    /// Equal distances keep document order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk<'_>>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if !all_finite(query) {
            return Err(IndexError::NonFinite { position: 0 });
        }

        let mut scored: Vec<ScoredChunk<'_>> = self
            .entries
            .iter()
            .map(|entry| ScoredChunk {
                chunk: &entry.chunk,
                distance: euclidean_distance(&entry.vector, query),
            })
            .collect();

        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(k);
        Ok(scored)
    }

    /// Unique identifier assigned at build time.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Embedding model whose vectors populate the index.
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    /// Vector dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build timestamp (RFC3339).
    pub fn built_at(&self) -> &str {
        &self.built_at
    }

    /// SHA-256 digest of the text the index was built from.
    pub fn source_digest(&self) -> &str {
        &self.source_digest
    }
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

fn all_finite(vector: &[f32]) -> bool {
    vector.iter().all(|value| value.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, index: usize) -> IndexedChunk {
        IndexedChunk {
            text: text.to_string(),
            metadata: chunk_metadata(PDF_SOURCE, index),
        }
    }

    fn sample_index() -> SimilarityIndex {
        SimilarityIndex::build(
            "test-model",
            "north east south",
            vec![chunk("north", 0), chunk("east", 1), chunk("south", 2)],
            vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.0, -1.0]],
        )
        .expect("index")
    }

    #[test]
    fn search_orders_by_ascending_distance() {
        let index = sample_index();
        let hits = index.search(&[0.1, 0.9], 3).expect("search");

        let texts: Vec<&str> = hits.iter().map(|hit| hit.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["north", "east", "south"]);
        assert!(hits.windows(2).all(|pair| pair[0].distance <= pair[1].distance));
    }

    #[test]
    fn exact_vector_is_its_own_nearest_neighbour() {
        let index = sample_index();
        let hits = index.search(&[1.0, 0.0], 1).expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.text, "east");
        assert_eq!(hits[0].distance, 0.0);
    }

    #[test]
    fn k_is_bounded_by_index_size() {
        let index = sample_index();
        assert_eq!(index.search(&[0.0, 0.0], 10).expect("search").len(), 3);
        assert!(index.search(&[0.0, 0.0], 0).expect("search").is_empty());
    }

    #[test]
    fn ties_keep_document_order() {
        let index = SimilarityIndex::build(
            "test-model",
            "a b",
            vec![chunk("first", 0), chunk("second", 1)],
            vec![vec![1.0, 0.0], vec![1.0, 0.0]],
        )
        .expect("index");
        let hits = index.search(&[1.0, 0.0], 2).expect("search");
        assert_eq!(hits[0].chunk.text, "first");
        assert_eq!(hits[1].chunk.text, "second");
    }

    #[test]
    fn query_dimension_must_match() {
        let error = sample_index().search(&[1.0, 0.0, 0.0], 1).unwrap_err();
        assert!(matches!(
            error,
            IndexError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn build_validates_inputs() {
        assert!(matches!(
            SimilarityIndex::build("m", "", vec![], vec![]),
            Err(IndexError::Empty)
        ));
        assert!(matches!(
            SimilarityIndex::build("m", "x", vec![chunk("x", 0)], vec![]),
            Err(IndexError::LengthMismatch {
                chunks: 1,
                vectors: 0
            })
        ));
        assert!(matches!(
            SimilarityIndex::build(
                "m",
                "x y",
                vec![chunk("x", 0), chunk("y", 1)],
                vec![vec![1.0], vec![1.0, 2.0]]
            ),
            Err(IndexError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn non_finite_vectors_are_rejected() {
        let chunks: Vec<IndexedChunk> = (0..6).map(|i| chunk("text", i)).collect();
        let vectors: Vec<Vec<f32>> = (0..6)
            .map(|i| if i % 3 == 2 { vec![f32::NAN, 0.0] } else { vec![i as f32, 0.0] })
            .collect();
        assert!(matches!(
            SimilarityIndex::build("m", "text", chunks, vectors),
            Err(IndexError::NonFinite { position: 2 })
        ));

        assert!(matches!(
            sample_index().search(&[f32::INFINITY, 0.0], 1),
            Err(IndexError::NonFinite { .. })
        ));
    }

    #[test]
    fn build_records_model_and_digest() {
        let index = sample_index();
        assert_eq!(index.embedding_model(), "test-model");
        assert_eq!(index.dimension(), 2);
        assert_eq!(index.len(), 3);
        assert!(!index.is_empty());
        assert_eq!(
            index.source_digest(),
            compute_source_digest("north east south")
        );
    }
}
