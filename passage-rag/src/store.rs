//! Persistence of an [`Index`] as a single self-describing artifact.

use std::path::Path;

use async_trait::async_trait;
use tracing::{error, info};

use crate::document::Index;
use crate::error::{RagError, Result};

/// A durable home for an [`Index`].
///
/// `load(save(index)) == index` must hold field for field, including exact
/// embedding values.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Persist `index` at `path`, replacing any existing artifact.
    async fn save(&self, index: &Index, path: &Path) -> Result<()>;

    /// Read and validate the artifact at `path`.
    async fn load(&self, path: &Path) -> Result<Index>;
}

/// Stores an index as pretty-printed UTF-8 JSON.
///
/// The artifact has top-level `metadata` and `passages` fields. `load` also
/// accepts `documents` in place of `passages`. Writes go to a sibling
/// temporary file that is renamed over the target.
///
/// # Example
///
/// ```rust,ignore
/// use passage_rag::{IndexStore, JsonIndexStore};
///
/// JsonIndexStore.save(&index, Path::new("notes_index.json")).await?;
/// let index = JsonIndexStore.load(Path::new("notes_index.json")).await?;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonIndexStore;

impl JsonIndexStore {
    /// Serialise an index to the artifact format.
    pub fn to_json(index: &Index) -> Result<String> {
        serde_json::to_string_pretty(index)
            .map_err(|e| RagError::IndexFormatError(format!("failed to serialise index: {e}")))
    }

    /// Parse and validate an artifact.
    pub fn from_json(raw: &str) -> Result<Index> {
        serde_json::from_str(raw).map_err(|e| RagError::IndexFormatError(e.to_string()))
    }
}

#[async_trait]
impl IndexStore for JsonIndexStore {
    async fn save(&self, index: &Index, path: &Path) -> Result<()> {
        let json = Self::to_json(index)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(|e| RagError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, path).await.map_err(|e| RagError::io(path, e))?;
        info!(path = %path.display(), passage_count = index.len(), "saved index");
        Ok(())
    }

    async fn load(&self, path: &Path) -> Result<Index> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| RagError::io(path, e))?;
        let index = Self::from_json(&raw).map_err(|e| {
            error!(path = %path.display(), error = %e, "invalid index artifact");
            e
        })?;
        info!(
            path = %path.display(),
            passage_count = index.len(),
            dimension = index.metadata().embedding_dimension,
            "loaded index"
        );
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_required_field_is_format_error() {
        let raw = r#"{ "metadata": { "chunk_size": 500 }, "passages": [] }"#;
        assert!(matches!(JsonIndexStore::from_json(raw), Err(RagError::IndexFormatError(_))));
    }

    #[test]
    fn accepts_documents_alias_and_model_alias() {
        let raw = r#"{
            "metadata": {
                "total_chunks": 1,
                "chunk_size": 500,
                "overlap": 50,
                "model": "text-search-doc",
                "embedding_dimension": 2,
                "total_tokens_used": 7
            },
            "documents": [
                { "id": 0, "text": "hi", "embedding": [0.5, -0.25], "char_start": 0, "char_end": 2 }
            ]
        }"#;
        let index = JsonIndexStore::from_json(raw).unwrap();
        assert_eq!(index.metadata().embedding_model, "text-search-doc");
        assert_eq!(index.metadata().query_model, None);
        assert_eq!(index.passages()[0].embedding, vec![0.5, -0.25]);
    }

    #[test]
    fn rejects_wrong_embedding_length() {
        let raw = r#"{
            "metadata": {
                "total_chunks": 1, "chunk_size": 500, "overlap": 50,
                "embedding_model": "doc", "embedding_dimension": 3, "total_tokens_used": 0
            },
            "passages": [
                { "id": 0, "text": "hi", "embedding": [0.5, -0.25], "char_start": 0, "char_end": 2 }
            ]
        }"#;
        let err = JsonIndexStore::from_json(raw).unwrap_err();
        assert!(err.to_string().contains("expected 3"));
    }
}
