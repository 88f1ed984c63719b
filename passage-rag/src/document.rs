//! Data types for passages, indexes, queries, and answers.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::retriever::RetrievalStats;

/// A contiguous segment of the source text, the unit of retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Passage {
    /// Ordinal assigned in chunk-creation order.
    pub id: usize,
    /// The passage text.
    pub text: String,
    /// Char offset of the first character in the normalised source.
    pub char_start: usize,
    /// Char offset one past the last character in the normalised source.
    pub char_end: usize,
    /// Document-side embedding. Empty when embedding failed for this passage.
    pub embedding: Vec<f32>,
}

impl Passage {
    /// Whether this passage can take part in ranking.
    pub fn is_retrievable(&self) -> bool {
        !self.embedding.is_empty()
    }
}

/// Parameters the index was built with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexMetadata {
    /// Number of passages in the index.
    pub total_chunks: usize,
    /// Chunk window size in characters.
    pub chunk_size: usize,
    /// Overlap between consecutive windows in characters.
    pub overlap: usize,
    /// Document-side embedding model.
    #[serde(alias = "model")]
    pub embedding_model: String,
    /// Query-side embedding model questions must be embedded with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_model: Option<String>,
    /// Length of every non-empty embedding; 0 if none succeeded.
    pub embedding_dimension: usize,
    /// Tokens consumed by the embedding service while building.
    pub total_tokens_used: u64,
}

/// An immutable collection of embedded passages.
///
/// Constructed once per source text, either by the build pipeline or by
/// loading an artifact. Both paths go through [`Index::new`], so every
/// non-empty embedding is guaranteed to have `embedding_dimension` entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "RawIndex")]
pub struct Index {
    metadata: IndexMetadata,
    passages: Vec<Passage>,
}

#[derive(Deserialize)]
struct RawIndex {
    metadata: IndexMetadata,
    #[serde(alias = "documents")]
    passages: Vec<Passage>,
}

impl TryFrom<RawIndex> for Index {
    type Error = String;

    fn try_from(raw: RawIndex) -> std::result::Result<Self, String> {
        Index::new(raw.metadata, raw.passages).map_err(|e| match e {
            RagError::IndexFormatError(message) => message,
            other => other.to_string(),
        })
    }
}

impl Index {
    /// Create an index, validating its structural invariants.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexFormatError`] if `total_chunks` disagrees
    /// with the passage count, passage ids are not `0..n` in order, or a
    /// non-empty embedding has the wrong length.
    pub fn new(metadata: IndexMetadata, passages: Vec<Passage>) -> Result<Self> {
        if metadata.total_chunks != passages.len() {
            return Err(RagError::IndexFormatError(format!(
                "metadata declares {} chunks but {} passages are present",
                metadata.total_chunks,
                passages.len()
            )));
        }
        for (position, passage) in passages.iter().enumerate() {
            if passage.id != position {
                return Err(RagError::IndexFormatError(format!(
                    "passage at position {position} has id {}",
                    passage.id
                )));
            }
            if passage.char_end < passage.char_start {
                return Err(RagError::IndexFormatError(format!(
                    "passage {} has char_end before char_start",
                    passage.id
                )));
            }
            if passage.is_retrievable() && passage.embedding.len() != metadata.embedding_dimension {
                return Err(RagError::IndexFormatError(format!(
                    "passage {} has embedding of length {}, expected {}",
                    passage.id,
                    passage.embedding.len(),
                    metadata.embedding_dimension
                )));
            }
        }
        Ok(Self { metadata, passages })
    }

    /// The build parameters.
    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    /// All passages in id order, including degraded ones.
    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }

    /// Passages that carry an embedding.
    pub fn retrievable(&self) -> impl Iterator<Item = &Passage> {
        self.passages.iter().filter(|p| p.is_retrievable())
    }

    /// Ids of passages whose embedding failed.
    pub fn failed_passages(&self) -> Vec<usize> {
        self.passages.iter().filter(|p| !p.is_retrievable()).map(|p| p.id).collect()
    }

    /// Number of passages.
    pub fn len(&self) -> usize {
        self.passages.len()
    }

    /// Whether the index holds no passages.
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

/// A question embedded with the query-side model.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// The question text.
    pub text: String,
    /// The query-side embedding.
    pub embedding: Vec<f32>,
}

/// A [`Passage`] paired with its similarity to a query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedPassage {
    /// The scored passage.
    pub passage: Passage,
    /// Cosine similarity in `[-1, 1]`.
    pub similarity: f32,
}

/// Token usage reported by a service call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    /// Tokens in the prompt.
    pub prompt_tokens: u64,
    /// Tokens in the completion.
    pub completion_tokens: u64,
    /// Total tokens billed.
    pub total_tokens: u64,
}

impl Usage {
    /// Sum two usage records.
    pub fn merge(self, other: Usage) -> Usage {
        Usage {
            prompt_tokens: self.prompt_tokens + other.prompt_tokens,
            completion_tokens: self.completion_tokens + other.completion_tokens,
            total_tokens: self.total_tokens + other.total_tokens,
        }
    }

    /// Sum two optional usage records; unavailable on both sides stays unavailable.
    pub fn merge_optional(a: Option<Usage>, b: Option<Usage>) -> Option<Usage> {
        match (a, b) {
            (Some(a), Some(b)) => Some(a.merge(b)),
            (a, b) => a.or(b),
        }
    }
}

/// How an [`Answer`] was produced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    /// Composed from retrieved passages.
    Grounded,
    /// No passage passed the relevance filter; the model answered while
    /// admitting it had no source material.
    Ungrounded,
    /// A service failure was turned into an explanatory message.
    Diagnostic,
}

/// The result of answering one question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    /// The answer text.
    pub text: String,
    /// Passages placed in the prompt, in rank order.
    pub used_passages: Vec<RankedPassage>,
    /// Completion usage; `None` when the service did not report it.
    pub usage: Option<Usage>,
    /// How the answer was produced.
    pub kind: AnswerKind,
    /// Retrieval summary, when retrieval ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval: Option<RetrievalStats>,
}

impl Answer {
    /// Build a diagnostic answer describing a failure.
    pub fn diagnostic(message: impl Into<String>) -> Self {
        Self {
            text: message.into(),
            used_passages: Vec::new(),
            usage: None,
            kind: AnswerKind::Diagnostic,
            retrieval: None,
        }
    }

    /// Whether the answer was composed from retrieved passages.
    pub fn is_grounded(&self) -> bool {
        self.kind == AnswerKind::Grounded
    }
}
