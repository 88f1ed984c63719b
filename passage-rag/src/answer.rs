//! Grounded answer composition.
//!
//! The [`AnswerGenerator`] renders retrieved passages into a prompt, calls a
//! [`CompletionProvider`] once, and records the first alternative together
//! with the reported usage. When no passage survived retrieval it asks the
//! model to answer while admitting it has no source material.

use std::fmt::Write;
use std::sync::Arc;

use tracing::{debug, info};

use crate::completion::{CompletionOptions, CompletionProvider, Message};
use crate::document::{Answer, AnswerKind, RankedPassage};
use crate::error::{RagError, Result};

const GROUNDED_INSTRUCTIONS: &str = "Answer the user's question using only the context below.\n\
- Use only information found in the context.\n\
- If the context does not contain the answer, say so explicitly.\n\
- Quote the context where it helps.\n\
- Be clear and to the point.";

const UNGROUNDED_INSTRUCTIONS: &str = "Answer the question, but state plainly that you have no \
specific information about it from the document.";

const BASELINE_INSTRUCTIONS: &str = "Answer the following question using your own knowledge.";

/// Render the grounded prompt: instructions, ranked context, question.
pub fn grounded_prompt(question: &str, passages: &[RankedPassage]) -> String {
    let mut prompt = String::from(GROUNDED_INSTRUCTIONS);
    prompt.push_str("\n\nCONTEXT:\n");
    for (rank, ranked) in passages.iter().enumerate() {
        if rank > 0 {
            prompt.push_str("\n\n");
        }
        // Writing into a String cannot fail.
        let _ = write!(
            prompt,
            "Passage {} (similarity: {:.4}):\n{}",
            rank + 1,
            ranked.similarity,
            ranked.passage.text
        );
    }
    let _ = write!(prompt, "\n\nQUESTION:\n{question}\n\nANSWER:");
    prompt
}

/// Render the fallback prompt used when no passage was admitted.
pub fn ungrounded_prompt(question: &str) -> String {
    format!("{UNGROUNDED_INSTRUCTIONS}\n\nQUESTION:\n{question}\n\nANSWER:")
}

/// Render the prompt for an answer from model knowledge alone.
pub fn baseline_prompt(question: &str) -> String {
    format!("{BASELINE_INSTRUCTIONS}\n\nQUESTION:\n{question}\n\nANSWER:")
}

/// Composes answers from retrieved passages through a completion service.
///
/// # Example
///
/// ```rust,ignore
/// use passage_rag::AnswerGenerator;
///
/// let generator = AnswerGenerator::new(Arc::new(completion_provider));
/// let answer = generator.answer("What is X?", ranked, 0.3, 2000).await?;
/// ```
#[derive(Clone)]
pub struct AnswerGenerator {
    provider: Arc<dyn CompletionProvider>,
    fallback_max_tokens: Option<u32>,
}

impl AnswerGenerator {
    /// Wrap a completion provider.
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self { provider, fallback_max_tokens: None }
    }

    /// Use a separate token budget for the ungrounded fallback.
    pub fn with_fallback_max_tokens(mut self, max_tokens: u32) -> Self {
        self.fallback_max_tokens = Some(max_tokens);
        self
    }

    /// The generation model.
    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Answer `question` from `passages`.
    ///
    /// An empty `passages` list yields an [`AnswerKind::Ungrounded`] answer
    /// with no used passages instead of an error.
    ///
    /// # Errors
    ///
    /// Returns the provider's error, or [`RagError::CompletionError`] if the
    /// service returned no alternatives.
    pub async fn answer(
        &self,
        question: &str,
        passages: Vec<RankedPassage>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Answer> {
        if passages.is_empty() {
            info!("no passages admitted, answering without context");
            let budget = self.fallback_max_tokens.unwrap_or(max_tokens);
            let prompt = ungrounded_prompt(question);
            return self
                .generate(prompt, temperature, budget, Vec::new(), AnswerKind::Ungrounded)
                .await;
        }

        let prompt = grounded_prompt(question, &passages);
        debug!(
            passage_count = passages.len(),
            prompt_chars = prompt.chars().count(),
            model = self.model_name(),
            temperature,
            "generating grounded answer"
        );
        self.generate(prompt, temperature, max_tokens, passages, AnswerKind::Grounded).await
    }

    /// Answer from model knowledge alone, without retrieval.
    ///
    /// Used to compare retrieval-backed answers against a baseline.
    pub async fn answer_without_context(
        &self,
        question: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Answer> {
        let prompt = baseline_prompt(question);
        self.generate(prompt, temperature, max_tokens, Vec::new(), AnswerKind::Ungrounded).await
    }

    async fn generate(
        &self,
        prompt: String,
        temperature: f32,
        max_tokens: u32,
        used_passages: Vec<RankedPassage>,
        kind: AnswerKind,
    ) -> Result<Answer> {
        let options = CompletionOptions::text(temperature, max_tokens);
        let completion = self.provider.complete(&[Message::user(prompt)], &options).await?;

        let text = completion.alternatives.into_iter().next().ok_or_else(|| {
            RagError::CompletionError {
                provider: self.model_name().to_string(),
                message: "service returned no alternatives".into(),
            }
        })?;

        if let Some(usage) = completion.usage {
            info!(
                total_tokens = usage.total_tokens,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "answer generated"
            );
        } else {
            info!("answer generated, usage unavailable");
        }

        Ok(Answer { text, used_passages, usage: completion.usage, kind, retrieval: None })
    }
}
