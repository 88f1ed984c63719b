//! Deterministic service doubles shared by the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use passage_rag::{
    Completion, CompletionOptions, CompletionProvider, Embedding, EmbeddingKind,
    EmbeddingProvider, Message, RagConfig, RagError, RagPipeline, Result, Usage,
};

/// Bag-of-words embeddings: each lowercase word adds 1.0 to a hashed bucket.
///
/// Texts sharing words get high cosine similarity, so retrieval behaves
/// predictably without a real model.
pub struct WordHashEmbedder {
    pub dimensions: usize,
    pub query_dimensions: usize,
    pub fail_documents_containing: Option<String>,
    pub fail_queries: bool,
    pub reject_credentials: bool,
    pub calls: Mutex<Vec<EmbeddingKind>>,
}

impl WordHashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            query_dimensions: dimensions,
            fail_documents_containing: None,
            fail_queries: false,
            reject_credentials: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn vector(text: &str, dimensions: usize) -> Vec<f32> {
        let mut vector = vec![0.0f32; dimensions];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
            vector[(hash % dimensions as u64) as usize] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for WordHashEmbedder {
    async fn embed(&self, text: &str, kind: EmbeddingKind) -> Result<Embedding> {
        self.calls.lock().unwrap().push(kind);
        if self.reject_credentials {
            return Err(RagError::AuthenticationError {
                provider: "word-hash".into(),
                message: "API returned 401 Unauthorized".into(),
            });
        }
        let dimensions = match kind {
            EmbeddingKind::Document => {
                if let Some(marker) = &self.fail_documents_containing {
                    if text.contains(marker.as_str()) {
                        return Err(RagError::EmbeddingError {
                            provider: "word-hash".into(),
                            message: "rejected passage".into(),
                        });
                    }
                }
                self.dimensions
            }
            EmbeddingKind::Query => {
                if self.fail_queries {
                    return Err(RagError::EmbeddingError {
                        provider: "word-hash".into(),
                        message: "service unavailable".into(),
                    });
                }
                self.query_dimensions
            }
        };
        let tokens = text.split_whitespace().count() as u64;
        Ok(Embedding { vector: Self::vector(text, dimensions), tokens: Some(tokens) })
    }

    fn model_name(&self, kind: EmbeddingKind) -> &str {
        match kind {
            EmbeddingKind::Document => "word-hash-doc",
            EmbeddingKind::Query => "word-hash-query",
        }
    }
}

/// Replies with a fixed text and records every prompt it receives.
pub struct ScriptedCompletion {
    pub reply: String,
    pub fail: bool,
    pub prompts: Mutex<Vec<(String, CompletionOptions)>>,
}

impl ScriptedCompletion {
    pub fn new(reply: &str) -> Self {
        Self { reply: reply.to_string(), fail: false, prompts: Mutex::new(Vec::new()) }
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Self::new("") }
    }

    pub fn prompts(&self) -> Vec<(String, CompletionOptions)> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompletion {
    async fn complete(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<Completion> {
        let prompt = messages.iter().map(|m| m.text.as_str()).collect::<Vec<_>>().join("\n");
        self.prompts.lock().unwrap().push((prompt, *options));
        if self.fail {
            return Err(RagError::CompletionError {
                provider: "scripted".into(),
                message: "API returned 500 Internal Server Error".into(),
            });
        }
        Ok(Completion {
            alternatives: vec![self.reply.clone()],
            usage: Some(Usage { prompt_tokens: 40, completion_tokens: 8, total_tokens: 48 }),
        })
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// A short document whose sentences use disjoint vocabularies.
pub const ANIMALS: &str = "Penguins live in Antarctica. \
Camels cross hot deserts carrying water. \
Owls hunt mice quietly at night. \
Salmon swim upstream every autumn to spawn. \
Bees gather nectar from spring flowers.";

pub fn pipeline(
    config: RagConfig,
    embedder: Arc<WordHashEmbedder>,
    completion: Arc<ScriptedCompletion>,
) -> RagPipeline {
    RagPipeline::builder()
        .config(config)
        .embedding_provider(embedder)
        .completion_provider(completion)
        .build()
        .unwrap()
}

pub fn small_chunks() -> RagConfig {
    RagConfig::builder().chunk_size(48).chunk_overlap(8).top_k(2).build().unwrap()
}
