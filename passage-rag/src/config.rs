//! Configuration for index construction and question answering.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Configuration parameters for the retrieval pipeline.
///
/// Deserialisation fills missing fields from [`RagConfig::default`], so a
/// config file only needs to name the values it changes. Call
/// [`RagConfig::validate`] (or build through [`RagConfig::builder`]) before use.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of top-ranked passages considered for the answer prompt.
    pub top_k: usize,
    /// Minimum similarity a top-k passage needs to enter the prompt.
    /// `None` admits every top-k passage.
    pub similarity_threshold: Option<f32>,
    /// Sampling temperature for grounded answers.
    pub temperature: f32,
    /// Completion token budget for grounded answers.
    pub max_tokens: u32,
    /// Completion token budget for the ungrounded fallback answer.
    pub fallback_max_tokens: u32,
    /// Number of passages embedded concurrently while building an index.
    pub embedding_concurrency: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            top_k: 3,
            similarity_threshold: None,
            temperature: 0.3,
            max_tokens: 2000,
            fallback_max_tokens: 500,
            embedding_concurrency: 1,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Load a configuration from a JSON file and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Io`] if the file cannot be read and
    /// [`RagError::ConfigError`] if it does not parse or fails validation.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| RagError::io(path, e))?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            RagError::ConfigError(format!("invalid config file {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0` or `chunk_overlap == 0`
    /// - `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `similarity_threshold` lies outside `[-1, 1]`
    /// - `temperature` lies outside `[0, 1]`
    /// - either token budget is zero
    /// - `embedding_concurrency == 0`
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap == 0 {
            return Err(RagError::ConfigError(
                "chunk_overlap must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if let Some(threshold) = self.similarity_threshold {
            if !(-1.0..=1.0).contains(&threshold) {
                return Err(RagError::ConfigError(format!(
                    "similarity_threshold ({threshold}) must lie in [-1, 1]"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(RagError::ConfigError(format!(
                "temperature ({}) must lie in [0, 1]",
                self.temperature
            )));
        }
        if self.max_tokens == 0 || self.fallback_max_tokens == 0 {
            return Err(RagError::ConfigError(
                "token budgets must be greater than zero".to_string(),
            ));
        }
        if self.embedding_concurrency == 0 {
            return Err(RagError::ConfigError(
                "embedding_concurrency must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Start from an existing configuration instead of the defaults.
    pub fn from_config(config: RagConfig) -> Self {
        Self { config }
    }

    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of top-ranked passages considered per question.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the minimum similarity threshold for admitting passages.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = Some(threshold);
        self
    }

    /// Set the sampling temperature for grounded answers.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    /// Set the completion token budget for grounded answers.
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.config.max_tokens = max_tokens;
        self
    }

    /// Set the completion token budget for the ungrounded fallback.
    pub fn fallback_max_tokens(mut self, max_tokens: u32) -> Self {
        self.config.fallback_max_tokens = max_tokens;
        self
    }

    /// Set how many passages are embedded concurrently.
    pub fn embedding_concurrency(mut self, workers: usize) -> Self {
        self.config.embedding_concurrency = workers;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
