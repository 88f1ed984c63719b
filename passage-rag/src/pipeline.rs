//! Pipeline orchestrator.
//!
//! The [`RagPipeline`] wires the chunker, embedder, retriever and answer
//! generator into the two flows the crate offers: building an [`Index`] from
//! source text, and answering a question against a built index.
//!
//! # Example
//!
//! ```rust,ignore
//! use passage_rag::{IndexStore, JsonIndexStore, RagConfig, RagPipeline};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(embedder))
//!     .completion_provider(Arc::new(llm))
//!     .build()?;
//!
//! let index = pipeline.build_index_from_file("notes.txt").await?;
//! JsonIndexStore.save(&index, Path::new("notes_index.json")).await?;
//! let answer = pipeline.ask(&index, "What does the author propose?").await;
//! ```

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::answer::AnswerGenerator;
use crate::chunking::{Chunker, SentenceWindowChunker};
use crate::completion::CompletionProvider;
use crate::config::RagConfig;
use crate::document::{Answer, Index, RankedPassage};
use crate::embedding::{Embedder, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::index::build_index;
use crate::retriever::{CosineRetriever, RetrievalStats, ThresholdFilter, TopK};

/// Steps a single question moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStage {
    /// The question arrived.
    Received,
    /// The question is being embedded with the query-side model.
    EmbeddingQuery,
    /// Passages are being scored.
    Ranking,
    /// The top-k set is being filtered by the threshold.
    Filtering,
    /// A grounded answer is being generated.
    Generating,
    /// Nothing passed the filter; an ungrounded answer is being generated.
    GeneratingUngrounded,
    /// An answer is available.
    Answered,
}

/// Answers to the same question with and without retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comparison {
    /// The question asked.
    pub question: String,
    /// The retrieval-backed answer.
    pub with_retrieval: Answer,
    /// The answer from model knowledge alone.
    pub without_retrieval: Answer,
    /// How the two answers differ.
    pub analysis: ComparisonAnalysis,
}

/// Phrases that point at the supplied document.
const CITING_PHRASES: &[&str] = &[
    "according to",
    "the document",
    "the passage",
    "is stated",
    "says that",
    "согласно",
    "в документе",
    "указано",
    "фрагмент",
    "говорится",
];

/// Hedging phrases typical of an answer given without facts.
const VAGUE_PHRASES: &[&str] = &[
    "in general",
    "as a rule",
    "usually",
    "typically",
    "may be",
    "possibly",
    "в общем",
    "как правило",
    "обычно",
    "может быть",
    "возможно",
];

/// One answer is "longer" when it exceeds the other by this factor.
const LENGTH_RATIO: f32 = 1.3;

/// Which of the two answers is noticeably longer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LengthVerdict {
    /// The retrieval-backed answer is more detailed.
    RetrievalLonger,
    /// The baseline answer is more detailed.
    BaselineLonger,
    /// Neither exceeds the other by the length ratio.
    Similar,
}

/// How relevant the admitted context was on average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextRelevance {
    /// Mean similarity above 0.7.
    High,
    /// Mean similarity above 0.5.
    Medium,
    /// Anything lower.
    Low,
}

impl ContextRelevance {
    /// Band a mean similarity.
    pub fn from_mean(mean: f32) -> Self {
        if mean > 0.7 {
            Self::High
        } else if mean > 0.5 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Heuristic differences between a retrieval-backed and a baseline answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonAnalysis {
    /// Length comparison in characters.
    pub length: LengthVerdict,
    /// The retrieval-backed answer refers to the document.
    pub cites_sources: bool,
    /// The baseline hedges more than the retrieval-backed answer.
    pub more_specific: bool,
    /// Mean similarity of the passages behind the retrieval-backed answer.
    pub mean_relevance: Option<f32>,
    /// Band of `mean_relevance`.
    pub relevance: Option<ContextRelevance>,
}

fn count_phrases(text: &str, phrases: &[&str]) -> usize {
    phrases.iter().filter(|p| text.contains(*p)).count()
}

impl ComparisonAnalysis {
    /// Compare two answers to the same question.
    pub fn analyze(with_retrieval: &Answer, without_retrieval: &Answer) -> Self {
        let grounded = with_retrieval.text.to_lowercase();
        let baseline = without_retrieval.text.to_lowercase();
        let grounded_len = grounded.chars().count() as f32;
        let baseline_len = baseline.chars().count() as f32;

        let length = if grounded_len > baseline_len * LENGTH_RATIO {
            LengthVerdict::RetrievalLonger
        } else if baseline_len > grounded_len * LENGTH_RATIO {
            LengthVerdict::BaselineLonger
        } else {
            LengthVerdict::Similar
        };

        let mean_relevance = with_retrieval.retrieval.as_ref().and_then(|s| s.mean_similarity);
        Self {
            length,
            cites_sources: count_phrases(&grounded, CITING_PHRASES) > 0,
            more_specific: count_phrases(&baseline, VAGUE_PHRASES)
                > count_phrases(&grounded, VAGUE_PHRASES),
            mean_relevance,
            relevance: mean_relevance.map(ContextRelevance::from_mean),
        }
    }
}

/// The retrieval pipeline orchestrator.
///
/// Construct one via [`RagPipeline::builder()`]. A pipeline holds no
/// per-query state; one instance can answer any number of questions
/// against any number of indexes concurrently.
pub struct RagPipeline {
    config: RagConfig,
    embedder: Embedder,
    generator: AnswerGenerator,
    chunker: Arc<dyn Chunker>,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedder.
    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    /// Build an index from source text.
    ///
    /// # Errors
    ///
    /// Returns fatal errors from the embedding service's first call.
    pub async fn build_index(&self, text: &str) -> Result<Index> {
        self.build_index_with_cancel(text, &CancellationToken::new()).await
    }

    /// Build an index from source text, aborting when `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns fatal errors from the embedding service's first call and
    /// [`RagError::Cancelled`].
    pub async fn build_index_with_cancel(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Index> {
        let index = build_index(
            text,
            self.chunker.as_ref(),
            &self.embedder,
            self.config.embedding_concurrency,
            cancel,
        )
        .await
        .map_err(|e| {
            error!(error = %e, "index build failed");
            e
        })?;

        let failed = index.failed_passages();
        if !failed.is_empty() {
            warn!(failed_count = failed.len(), ?failed, "some passages are not retrievable");
        }
        info!(
            passage_count = index.len(),
            dimension = index.metadata().embedding_dimension,
            tokens_used = index.metadata().total_tokens_used,
            "index built"
        );
        Ok(index)
    }

    /// Read a UTF-8 source file and build an index from it.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Io`] if the file cannot be read, plus the errors
    /// of [`build_index`](Self::build_index).
    pub async fn build_index_from_file(&self, path: impl AsRef<Path>) -> Result<Index> {
        self.build_index_from_file_with_cancel(path, &CancellationToken::new()).await
    }

    /// Read a UTF-8 source file and build an index from it, aborting when
    /// `cancel` fires.
    ///
    /// # Errors
    ///
    /// See [`build_index_from_file`](Self::build_index_from_file).
    pub async fn build_index_from_file_with_cancel(
        &self,
        path: impl AsRef<Path>,
        cancel: &CancellationToken,
    ) -> Result<Index> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            error!(path = %path.display(), error = %e, "failed to read source document");
            RagError::io(path, e)
        })?;
        info!(path = %path.display(), chars = text.chars().count(), "read source document");
        self.build_index_with_cancel(&text, cancel).await
    }

    /// The retrieval policy: top-k by cosine similarity, then the threshold.
    ///
    /// Without a configured threshold every top-k passage is admitted.
    pub fn retriever(&self) -> ThresholdFilter<TopK<CosineRetriever>> {
        let threshold = self.config.similarity_threshold.unwrap_or(-1.0);
        ThresholdFilter::new(TopK::new(CosineRetriever, self.config.top_k), threshold)
    }

    /// Rank and filter `index` against a query embedding.
    pub fn retrieve(
        &self,
        index: &Index,
        query_embedding: &[f32],
    ) -> (Vec<RankedPassage>, RetrievalStats) {
        debug!(stage = ?QueryStage::Ranking, "ranking passages");
        let (candidates, admitted) =
            self.retriever().retrieve_with_candidates(index, query_embedding);
        debug!(stage = ?QueryStage::Filtering, candidates = candidates.len(), "filtering passages");
        let stats =
            RetrievalStats::summarize(&candidates, &admitted, self.config.similarity_threshold);
        (admitted, stats)
    }

    /// Answer a question against `index`.
    ///
    /// Never fails: service errors during query embedding or generation are
    /// turned into a diagnostic [`Answer`].
    pub async fn ask(&self, index: &Index, question: &str) -> Answer {
        match self.ask_with_cancel(index, question, &CancellationToken::new()).await {
            Ok(answer) => answer,
            Err(e) => Answer::diagnostic(format!("The question could not be answered: {e}")),
        }
    }

    /// Answer a question against `index`, aborting when `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns only [`RagError::Cancelled`]; every other failure becomes a
    /// diagnostic [`Answer`].
    pub async fn ask_with_cancel(
        &self,
        index: &Index,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<Answer> {
        debug!(stage = ?QueryStage::Received, question_len = question.len(), "question received");

        if let Some(expected) = &index.metadata().query_model {
            if expected != self.embedder.query_model() {
                warn!(
                    index_model = %expected,
                    pipeline_model = self.embedder.query_model(),
                    "query model differs from the one the index was built for"
                );
            }
        }

        debug!(stage = ?QueryStage::EmbeddingQuery, "embedding question");
        let query = match self.embedder.embed_query(question, cancel).await {
            Ok((query, tokens)) => {
                debug!(tokens = ?tokens, "question embedded");
                query
            }
            Err(RagError::Cancelled) => return Err(RagError::Cancelled),
            Err(e) => {
                error!(error = %e, "query embedding failed");
                return Ok(Answer::diagnostic(format!("Could not embed the question: {e}")));
            }
        };

        let dimension = index.metadata().embedding_dimension;
        if dimension != 0 && query.embedding.len() != dimension {
            error!(
                query_dimension = query.embedding.len(),
                index_dimension = dimension,
                "query embedding does not match index dimension"
            );
            return Ok(Answer::diagnostic(format!(
                "The question embedding has {} dimensions but the index uses {dimension}; \
                 was the index built with a different embedding model?",
                query.embedding.len()
            )));
        }

        let (admitted, stats) = self.retrieve(index, &query.embedding);
        if admitted.is_empty() {
            warn!(
                candidates = stats.candidates,
                threshold = ?stats.threshold,
                "no passage passed the relevance filter"
            );
            debug!(stage = ?QueryStage::GeneratingUngrounded, "generating without context");
        } else {
            debug!(stage = ?QueryStage::Generating, admitted = admitted.len(), "generating answer");
        }

        let generated = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RagError::Cancelled),
            result = self.generator.answer(
                question,
                admitted,
                self.config.temperature,
                self.config.max_tokens,
            ) => result,
        };

        let mut answer = match generated {
            Ok(answer) => answer,
            Err(RagError::Cancelled) => return Err(RagError::Cancelled),
            Err(e) => {
                error!(error = %e, "answer generation failed");
                Answer::diagnostic(format!("Could not generate an answer: {e}"))
            }
        };
        answer.retrieval = Some(stats);
        debug!(stage = ?QueryStage::Answered, kind = ?answer.kind, "question answered");
        Ok(answer)
    }

    /// Answer a question both with retrieval and from model knowledge alone.
    pub async fn compare(&self, index: &Index, question: &str) -> Comparison {
        let with_retrieval = self.ask(index, question).await;
        let without_retrieval = self
            .generator
            .answer_without_context(question, self.config.temperature, self.config.max_tokens)
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "baseline answer failed");
                Answer::diagnostic(format!("Could not generate a baseline answer: {e}"))
            });
        let analysis = ComparisonAnalysis::analyze(&with_retrieval, &without_retrieval);
        debug!(?analysis, "answers compared");
        Comparison { question: question.to_string(), with_retrieval, without_retrieval, analysis }
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// The config and both providers are required. The chunker defaults to a
/// [`SentenceWindowChunker`] using the config's chunk size and overlap.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .config(RagConfig::default())
///     .embedding_provider(Arc::new(embedder))
///     .completion_provider(Arc::new(llm))
///     .chunker(Arc::new(chunker))  // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    completion_provider: Option<Arc<dyn CompletionProvider>>,
    chunker: Option<Arc<dyn Chunker>>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the completion provider.
    pub fn completion_provider(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.completion_provider = Some(provider);
        self
    }

    /// Replace the default chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Build the [`RagPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing or
    /// the config is invalid.
    pub fn build(self) -> Result<RagPipeline> {
        let config =
            self.config.ok_or_else(|| RagError::ConfigError("config is required".to_string()))?;
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let completion_provider = self
            .completion_provider
            .ok_or_else(|| RagError::ConfigError("completion_provider is required".to_string()))?;
        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(
                SentenceWindowChunker::new(config.chunk_size, config.chunk_overlap)
                    .map_err(|e| RagError::ConfigError(e.to_string()))?,
            ),
        };

        let generator = AnswerGenerator::new(completion_provider)
            .with_fallback_max_tokens(config.fallback_max_tokens);

        Ok(RagPipeline { config, embedder: Embedder::new(embedding_provider), generator, chunker })
    }
}
