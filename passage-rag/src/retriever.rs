//! Similarity ranking and relevance filtering.
//!
//! The free functions [`rank`], [`top_k`] and [`filter_threshold`] hold the
//! algorithms. The [`Retriever`] trait lets retrieval policies compose:
//! [`CosineRetriever`] ranks the whole index, and the [`TopK`] and
//! [`ThresholdFilter`] decorators narrow whatever their inner retriever
//! returns. The pipeline uses `ThresholdFilter<TopK<CosineRetriever>>`, so
//! the threshold applies to the bounded top-k set, never to the full index.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::{Index, RankedPassage};

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        debug!(left = a.len(), right = b.len(), "cosine similarity of mismatched lengths");
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Score every retrievable passage against `query_embedding`.
///
/// Passages without an embedding are skipped. The result is sorted by
/// descending similarity, ties broken by ascending passage id.
pub fn rank(index: &Index, query_embedding: &[f32]) -> Vec<RankedPassage> {
    let mut ranked: Vec<RankedPassage> = index
        .retrievable()
        .map(|passage| RankedPassage {
            similarity: cosine_similarity(&passage.embedding, query_embedding),
            passage: passage.clone(),
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.passage.id.cmp(&b.passage.id))
    });
    ranked
}

/// Keep the first `k` entries.
pub fn top_k(mut ranked: Vec<RankedPassage>, k: usize) -> Vec<RankedPassage> {
    ranked.truncate(k);
    ranked
}

/// Keep entries with `similarity >= min_similarity`, preserving order.
pub fn filter_threshold(ranked: Vec<RankedPassage>, min_similarity: f32) -> Vec<RankedPassage> {
    ranked.into_iter().filter(|r| r.similarity >= min_similarity).collect()
}

/// A retrieval policy over an [`Index`].
pub trait Retriever: Send + Sync {
    /// Return passages for the query embedding, best first.
    fn retrieve(&self, index: &Index, query_embedding: &[f32]) -> Vec<RankedPassage>;
}

/// Ranks every retrievable passage by cosine similarity.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineRetriever;

impl Retriever for CosineRetriever {
    fn retrieve(&self, index: &Index, query_embedding: &[f32]) -> Vec<RankedPassage> {
        rank(index, query_embedding)
    }
}

/// Truncates the inner retriever's output to `k` entries.
#[derive(Debug, Clone)]
pub struct TopK<R> {
    inner: R,
    k: usize,
}

impl<R: Retriever> TopK<R> {
    /// Wrap `inner`, keeping at most `k` results.
    pub fn new(inner: R, k: usize) -> Self {
        Self { inner, k }
    }
}

impl<R: Retriever> Retriever for TopK<R> {
    fn retrieve(&self, index: &Index, query_embedding: &[f32]) -> Vec<RankedPassage> {
        top_k(self.inner.retrieve(index, query_embedding), self.k)
    }
}

/// Drops inner results below a minimum similarity.
#[derive(Debug, Clone)]
pub struct ThresholdFilter<R> {
    inner: R,
    min_similarity: f32,
}

impl<R: Retriever> ThresholdFilter<R> {
    /// Wrap `inner`, admitting results with `similarity >= min_similarity`.
    pub fn new(inner: R, min_similarity: f32) -> Self {
        Self { inner, min_similarity }
    }

    /// The admission threshold.
    pub fn min_similarity(&self) -> f32 {
        self.min_similarity
    }

    /// Retrieve, returning both the inner candidates and the admitted subset.
    pub fn retrieve_with_candidates(
        &self,
        index: &Index,
        query_embedding: &[f32],
    ) -> (Vec<RankedPassage>, Vec<RankedPassage>) {
        let candidates = self.inner.retrieve(index, query_embedding);
        let admitted = filter_threshold(candidates.clone(), self.min_similarity);
        (candidates, admitted)
    }
}

impl<R: Retriever> Retriever for ThresholdFilter<R> {
    fn retrieve(&self, index: &Index, query_embedding: &[f32]) -> Vec<RankedPassage> {
        filter_threshold(self.inner.retrieve(index, query_embedding), self.min_similarity)
    }
}

/// Summary of one retrieval, for reporting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalStats {
    /// Passages returned by the top-k stage.
    pub candidates: usize,
    /// Passages that passed the threshold.
    pub admitted: usize,
    /// Candidates rejected by the threshold.
    pub filtered_out: usize,
    /// The threshold applied, if any.
    pub threshold: Option<f32>,
    /// Lowest admitted similarity.
    pub min_similarity: Option<f32>,
    /// Highest admitted similarity.
    pub max_similarity: Option<f32>,
    /// Mean admitted similarity.
    pub mean_similarity: Option<f32>,
}

impl RetrievalStats {
    /// Summarise a candidate set and the subset admitted from it.
    pub fn summarize(
        candidates: &[RankedPassage],
        admitted: &[RankedPassage],
        threshold: Option<f32>,
    ) -> Self {
        let scores: Vec<f32> = admitted.iter().map(|r| r.similarity).collect();
        let (min, max, mean) = if scores.is_empty() {
            (None, None, None)
        } else {
            let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
            let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let mean = scores.iter().sum::<f32>() / scores.len() as f32;
            (Some(min), Some(max), Some(mean))
        };
        Self {
            candidates: candidates.len(),
            admitted: admitted.len(),
            filtered_out: candidates.len() - admitted.len(),
            threshold,
            min_similarity: min,
            max_similarity: max,
            mean_similarity: mean,
        }
    }
}
