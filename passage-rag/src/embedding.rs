//! Embedding provider trait and the document/query [`Embedder`].

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::document::Query;
use crate::error::{RagError, Result};

/// Which encoder variant an embedding request targets.
///
/// Document and query encoders are not guaranteed to share a geometry, so
/// passages are always embedded with [`EmbeddingKind::Document`] and
/// questions with [`EmbeddingKind::Query`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingKind {
    /// Passage-side encoder.
    Document,
    /// Question-side encoder.
    Query,
}

/// A vector returned by an embedding service.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    /// The embedding vector.
    pub vector: Vec<f32>,
    /// Tokens billed for the call, if the service reported them.
    pub tokens: Option<u64>,
}

/// A provider that generates vector embeddings from text input.
///
/// # Example
///
/// ```rust,ignore
/// use passage_rag::{EmbeddingKind, EmbeddingProvider};
///
/// let embedding = provider.embed("hello world", EmbeddingKind::Query).await?;
/// println!("{} dims, {:?} tokens", embedding.vector.len(), embedding.tokens);
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text with the given encoder variant.
    async fn embed(&self, text: &str, kind: EmbeddingKind) -> Result<Embedding>;

    /// The model identifier used for the given variant.
    fn model_name(&self, kind: EmbeddingKind) -> &str;
}

/// Outcome of embedding every passage of a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentEmbeddings {
    /// One vector per input text, in input order. Empty for failed passages.
    pub vectors: Vec<Vec<f32>>,
    /// Length shared by every non-empty vector; 0 if none succeeded.
    pub dimension: usize,
    /// Tokens reported across all successful calls.
    pub tokens_used: u64,
    /// Indices of texts whose embedding failed.
    pub failed: Vec<usize>,
}

/// Turns passages and questions into vectors through an [`EmbeddingProvider`].
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
}

impl Embedder {
    /// Wrap a provider.
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }

    /// The model passages are embedded with.
    pub fn document_model(&self) -> &str {
        self.provider.model_name(EmbeddingKind::Document)
    }

    /// The model questions are embedded with.
    pub fn query_model(&self) -> &str {
        self.provider.model_name(EmbeddingKind::Query)
    }

    async fn embed_cancellable(
        &self,
        text: &str,
        kind: EmbeddingKind,
        cancel: &CancellationToken,
    ) -> Result<Embedding> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RagError::Cancelled),
            result = self.provider.embed(text, kind) => result,
        }
    }

    /// Embed every text with the document-side model.
    ///
    /// The first text is embedded on its own: a fatal error there
    /// (see [`RagError::is_fatal`]) aborts the whole batch. Every other
    /// failure only affects its own passage, which gets an empty vector and
    /// is listed in [`DocumentEmbeddings::failed`]. The remaining texts are
    /// embedded with up to `concurrency` requests in flight.
    ///
    /// # Errors
    ///
    /// Returns the fatal error from the first call, or [`RagError::Cancelled`]
    /// if `cancel` fires.
    pub async fn embed_documents(
        &self,
        texts: &[String],
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Result<DocumentEmbeddings> {
        let total = texts.len();
        let mut vectors = vec![Vec::new(); total];
        let mut tokens_used = 0u64;
        let mut failed = Vec::new();
        if total == 0 {
            return Ok(DocumentEmbeddings::default());
        }

        info!(passage_count = total, model = self.document_model(), "embedding passages");

        let first = self.embed_cancellable(&texts[0], EmbeddingKind::Document, cancel).await;
        let mut record = |id: usize, result: Result<Embedding>| -> Result<()> {
            match result {
                Ok(embedding) if !embedding.vector.is_empty() => {
                    tokens_used += embedding.tokens.unwrap_or(0);
                    vectors[id] = embedding.vector;
                }
                Ok(_) => {
                    warn!(passage.id = id, "embedding service returned an empty vector");
                    failed.push(id);
                }
                Err(RagError::Cancelled) => return Err(RagError::Cancelled),
                Err(e) => {
                    warn!(passage.id = id, error = %e, "failed to embed passage, skipping");
                    failed.push(id);
                }
            }
            Ok(())
        };

        match first {
            Err(e) if e.is_fatal() => return Err(e),
            result => record(0, result)?,
        }

        let mut pending = futures::stream::iter(1..total)
            .map(|id| async move {
                (id, self.embed_cancellable(&texts[id], EmbeddingKind::Document, cancel).await)
            })
            .buffer_unordered(concurrency.max(1));

        let mut done = 1;
        while let Some((id, result)) = pending.next().await {
            record(id, result)?;
            done += 1;
            if done % 10 == 0 {
                info!(done, total, "embedding progress");
            }
        }

        let dimension = vectors.iter().find(|v| !v.is_empty()).map_or(0, Vec::len);
        for (id, vector) in vectors.iter_mut().enumerate() {
            if !vector.is_empty() && vector.len() != dimension {
                warn!(
                    passage.id = id,
                    len = vector.len(),
                    dimension,
                    "embedding length differs from index dimension, skipping"
                );
                vector.clear();
                failed.push(id);
            }
        }
        failed.sort_unstable();

        info!(
            embedded = total - failed.len(),
            failed = failed.len(),
            tokens_used,
            dimension,
            "passage embedding finished"
        );

        Ok(DocumentEmbeddings { vectors, dimension, tokens_used, failed })
    }

    /// Embed a question with the query-side model.
    ///
    /// Returns the query and the tokens the call consumed, when reported.
    ///
    /// # Errors
    ///
    /// Returns the provider error, [`RagError::EmbeddingError`] for an empty
    /// vector, or [`RagError::Cancelled`].
    pub async fn embed_query(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<(Query, Option<u64>)> {
        debug!(text_len = text.len(), model = self.query_model(), "embedding query");
        let embedding = self.embed_cancellable(text, EmbeddingKind::Query, cancel).await?;
        if embedding.vector.is_empty() {
            return Err(RagError::EmbeddingError {
                provider: self.query_model().to_string(),
                message: "service returned an empty query vector".into(),
            });
        }
        Ok((Query { text: text.to_string(), embedding: embedding.vector }, embedding.tokens))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Records every request and fails on texts containing "fail".
    struct Recording {
        calls: Mutex<Vec<(String, EmbeddingKind)>>,
        fatal_first: bool,
    }

    impl Recording {
        fn new(fatal_first: bool) -> Self {
            Self { calls: Mutex::new(Vec::new()), fatal_first }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for Recording {
        async fn embed(&self, text: &str, kind: EmbeddingKind) -> Result<Embedding> {
            let first = {
                let mut calls = self.calls.lock().unwrap();
                calls.push((text.to_string(), kind));
                calls.len() == 1
            };
            if first && self.fatal_first {
                return Err(RagError::AuthenticationError {
                    provider: "test".into(),
                    message: "bad key".into(),
                });
            }
            if text.contains("fail") {
                return Err(RagError::EmbeddingError {
                    provider: "test".into(),
                    message: "boom".into(),
                });
            }
            Ok(Embedding { vector: vec![text.len() as f32, 1.0], tokens: Some(2) })
        }

        fn model_name(&self, kind: EmbeddingKind) -> &str {
            match kind {
                EmbeddingKind::Document => "doc-model",
                EmbeddingKind::Query => "query-model",
            }
        }
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn single_failure_does_not_abort_batch() {
        let embedder = Embedder::new(Arc::new(Recording::new(false)));
        let out = embedder
            .embed_documents(&texts(&["a", "fail", "ccc"]), 2, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.failed, vec![1]);
        assert!(out.vectors[1].is_empty());
        assert_eq!(out.vectors[2], vec![3.0, 1.0]);
        assert_eq!(out.tokens_used, 4);
        assert_eq!(out.dimension, 2);
    }

    #[tokio::test]
    async fn fatal_first_call_aborts() {
        let provider = Arc::new(Recording::new(true));
        let embedder = Embedder::new(provider.clone());
        let err = embedder
            .embed_documents(&texts(&["a", "b"]), 1, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::AuthenticationError { .. }));
        assert_eq!(provider.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn documents_and_queries_use_distinct_variants() {
        let provider = Arc::new(Recording::new(false));
        let embedder = Embedder::new(provider.clone());
        let cancel = CancellationToken::new();
        embedder.embed_documents(&texts(&["a"]), 1, &cancel).await.unwrap();
        let (query, tokens) = embedder.embed_query("what?", &cancel).await.unwrap();

        assert_eq!(query.text, "what?");
        assert_eq!(tokens, Some(2));
        let calls = provider.calls.lock().unwrap();
        assert_eq!(calls[0].1, EmbeddingKind::Document);
        assert_eq!(calls[1].1, EmbeddingKind::Query);
    }

    #[tokio::test]
    async fn cancelled_token_aborts_build() {
        let embedder = Embedder::new(Arc::new(Recording::new(false)));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = embedder.embed_documents(&texts(&["a", "b"]), 1, &cancel).await.unwrap_err();
        assert!(matches!(err, RagError::Cancelled));
    }
}
