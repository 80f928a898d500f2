//! Single-slot JSON persistence for [`SimilarityIndex`].

use super::{IndexError, SimilarityIndex};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Write `index` to `path`, replacing any previous slot.
///
/// The JSON is written to a sibling temporary file first and renamed into place, so a reader
/// never observes a partially written slot.
pub async fn save(index: &SimilarityIndex, path: &Path) -> Result<(), IndexError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    let json = serde_json::to_vec(index)?;
    let staging = staging_path(path);
    fs::write(&staging, json).await?;
    if let Err(error) = fs::rename(&staging, path).await {
        let _ = fs::remove_file(&staging).await;
        return Err(error.into());
    }

    tracing::debug!(
        path = %path.display(),
        chunks = index.len(),
        "Persisted similarity index"
    );
    Ok(())
}

/// Read the slot at `path`. Returns `Ok(None)` when nothing has been persisted yet.
pub async fn load(path: &Path) -> Result<Option<SimilarityIndex>, IndexError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(error.into()),
    };

    let index: SimilarityIndex = serde_json::from_slice(&bytes)?;
    tracing::debug!(
        path = %path.display(),
        chunks = index.len(),
        model = index.embedding_model(),
        "Loaded similarity index"
    );
    Ok(Some(index))
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "index".into());
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexedChunk, PDF_SOURCE, chunk_metadata};

    fn sample_index() -> SimilarityIndex {
        SimilarityIndex::build(
            "hash-3",
            "alpha beta",
            vec![
                IndexedChunk {
                    text: "alpha".into(),
                    metadata: chunk_metadata(PDF_SOURCE, 0),
                },
                IndexedChunk {
                    text: "beta".into(),
                    metadata: chunk_metadata(PDF_SOURCE, 1),
                },
            ],
            vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]],
        )
        .expect("index")
    }

    #[tokio::test]
    async fn save_then_load_restores_the_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("vector_index.json");
        let index = sample_index();

        save(&index, &path).await.expect("save");
        let restored = load(&path).await.expect("load").expect("slot present");

        assert_eq!(restored.id(), index.id());
        assert_eq!(restored.embedding_model(), "hash-3");
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.source_digest(), index.source_digest());
        let hits = restored.search(&[0.0, 1.0, 0.0], 1).expect("search");
        assert_eq!(hits[0].chunk.text, "beta");
        assert!(!staging_path(&path).exists());
    }

    #[tokio::test]
    async fn saving_again_replaces_the_slot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vector_index.json");

        save(&sample_index(), &path).await.expect("first save");
        let second = sample_index();
        save(&second, &path).await.expect("second save");

        let restored = load(&path).await.expect("load").expect("slot present");
        assert_eq!(restored.id(), second.id());
    }

    #[tokio::test]
    async fn missing_slot_loads_as_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loaded = load(&dir.path().join("absent.json")).await.expect("load");
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn corrupt_slot_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vector_index.json");
        tokio::fs::write(&path, b"{not json").await.expect("write");

        assert!(matches!(
            load(&path).await,
            Err(IndexError::Serialization(_))
        ));
    }
}
