//! Retrieval-augmented question answering over a single private document.
//!
//! This crate provides:
//! - Sentence-aware sliding-window chunking with exact character spans
//! - Asymmetric document/query embedding with per-passage failure isolation
//! - A validated, JSON-persisted [`Index`] of embedded passages
//! - Composable cosine-similarity retrieval with top-k and threshold filtering
//! - Grounded answer generation with an ungrounded fallback
//! - A [`RagPipeline`] orchestrating the build and query flows
//!
//! Service access goes through the [`EmbeddingProvider`] and
//! [`CompletionProvider`] traits. With the `yandex` feature (on by default)
//! the [`yandex`] module implements both against Yandex Foundation Models.

pub mod answer;
pub mod chunking;
pub mod completion;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod index;
pub mod pipeline;
pub mod retriever;
pub mod store;

#[cfg(feature = "yandex")]
pub mod yandex;

pub use answer::AnswerGenerator;
pub use chunking::{Chunker, SentenceWindowChunker, TextSpan, chunk_text, normalize_whitespace};
pub use completion::{
    Completion, CompletionOptions, CompletionProvider, Message, ResponseFormat, Role,
};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{
    Answer, AnswerKind, Index, IndexMetadata, Passage, Query, RankedPassage, Usage,
};
pub use embedding::{DocumentEmbeddings, Embedder, Embedding, EmbeddingKind, EmbeddingProvider};
pub use error::{RagError, Result};
pub use index::{build_index, default_index_path};
pub use pipeline::{
    Comparison, ComparisonAnalysis, ContextRelevance, LengthVerdict, QueryStage, RagPipeline,
    RagPipelineBuilder,
};
pub use retriever::{
    CosineRetriever, RetrievalStats, Retriever, ThresholdFilter, TopK, cosine_similarity,
    filter_threshold, rank, top_k,
};
pub use store::{IndexStore, JsonIndexStore};

#[cfg(feature = "yandex")]
pub use yandex::{YandexCompletionProvider, YandexConfig, YandexEmbeddingProvider};
