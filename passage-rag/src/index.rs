//! Index construction: chunk, embed, stamp metadata.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::chunking::{Chunker, TextSpan};
use crate::document::{Index, IndexMetadata, Passage};
use crate::embedding::{DocumentEmbeddings, Embedder};
use crate::error::{RagError, Result};

/// Build an [`Index`] from source text.
///
/// Runs `chunker`, embeds every chunk with the document-side model through
/// `embedder`, and records the build parameters in the metadata.
///
/// # Errors
///
/// Propagates fatal errors from the first embedding call and
/// [`RagError::Cancelled`].
pub async fn build_index(
    text: &str,
    chunker: &dyn Chunker,
    embedder: &Embedder,
    concurrency: usize,
    cancel: &CancellationToken,
) -> Result<Index> {
    let spans = chunker.chunk(text);
    info!(chunk_count = spans.len(), source_chars = text.chars().count(), "chunked source text");

    let texts: Vec<String> = spans.iter().map(|s| s.text.clone()).collect();
    let embeddings = embedder.embed_documents(&texts, concurrency, cancel).await?;

    let metadata = IndexMetadata {
        total_chunks: spans.len(),
        chunk_size: chunker.chunk_size(),
        overlap: chunker.overlap(),
        embedding_model: embedder.document_model().to_string(),
        query_model: Some(embedder.query_model().to_string()),
        embedding_dimension: embeddings.dimension,
        total_tokens_used: embeddings.tokens_used,
    };
    assemble(metadata, spans, embeddings)
}

fn assemble(
    metadata: IndexMetadata,
    spans: Vec<TextSpan>,
    embeddings: DocumentEmbeddings,
) -> Result<Index> {
    if spans.len() != embeddings.vectors.len() {
        return Err(RagError::PipelineError(format!(
            "{} chunks but {} embedding slots",
            spans.len(),
            embeddings.vectors.len()
        )));
    }
    let passages = spans
        .into_iter()
        .zip(embeddings.vectors)
        .enumerate()
        .map(|(id, (span, embedding))| Passage {
            id,
            text: span.text,
            char_start: span.char_start,
            char_end: span.char_end,
            embedding,
        })
        .collect();
    Index::new(metadata, passages)
}

/// The artifact path for a source file: `<stem>_index.json` beside it.
pub fn default_index_path(source: impl AsRef<Path>) -> PathBuf {
    let source = source.as_ref();
    let stem = source.file_stem().and_then(|s| s.to_str()).unwrap_or("document");
    source.with_file_name(format!("{stem}_index.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_path_sits_beside_source() {
        assert_eq!(
            default_index_path("/data/text_to_test.txt"),
            PathBuf::from("/data/text_to_test_index.json")
        );
        assert_eq!(default_index_path("notes"), PathBuf::from("notes_index.json"));
    }

    #[test]
    fn assemble_keeps_spans_and_degraded_slots() {
        let spans = vec![
            TextSpan { text: "a".into(), char_start: 0, char_end: 1 },
            TextSpan { text: "b".into(), char_start: 1, char_end: 2 },
        ];
        let embeddings = DocumentEmbeddings {
            vectors: vec![vec![1.0, 0.0], vec![]],
            dimension: 2,
            tokens_used: 3,
            failed: vec![1],
        };
        let metadata = IndexMetadata {
            total_chunks: 2,
            chunk_size: 10,
            overlap: 2,
            embedding_model: "doc".into(),
            query_model: Some("query".into()),
            embedding_dimension: 2,
            total_tokens_used: 3,
        };
        let index = assemble(metadata, spans, embeddings).unwrap();
        assert_eq!(index.passages()[1].char_start, 1);
        assert_eq!(index.failed_passages(), vec![1]);
    }
}
