use crate::chunking::ChunkingConfig;
use crate::embeddings::DEFAULT_BATCH_SIZE;
use crate::engine::{
    EngineSettings, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_CONTEXT_CHAR_BUDGET, DEFAULT_TOP_K,
};
use crate::enrichment::DEFAULT_MAX_VIDEOS;
use crate::error::ConfigError;
use crate::models::IngestionOptions;
use crate::quiz::DEFAULT_QUIZ_QUESTIONS;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Pipeline tunables. Every key is optional in the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TutorSettings {
    pub top_k: usize,
    pub confidence_threshold: f32,
    pub context_char_budget: usize,
    pub enrichment_max_results: usize,
    pub max_tokens: usize,
    pub overlap: usize,
    pub embedding_batch_size: usize,
    pub quiz_questions: usize,
    pub llm_timeout_secs: u64,
}

impl Default for TutorSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            context_char_budget: DEFAULT_CONTEXT_CHAR_BUDGET,
            enrichment_max_results: DEFAULT_MAX_VIDEOS,
            max_tokens: 500,
            overlap: 100,
            embedding_batch_size: DEFAULT_BATCH_SIZE,
            quiz_questions: DEFAULT_QUIZ_QUESTIONS,
            llm_timeout_secs: 60,
        }
    }
}

impl TutorSettings {
    /// Reads `path` when given, otherwise returns the defaults. The result is
    /// always validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let settings = match path {
            Some(path) => toml::from_str(&fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ChunkingConfig::new(self.max_tokens, self.overlap)
            .map_err(|error| ConfigError::Invalid(error.to_string()))?;

        if self.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::Invalid(format!(
                "confidence_threshold {} must be within [0, 1]",
                self.confidence_threshold
            )));
        }
        if self.embedding_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "embedding_batch_size must be at least 1".to_string(),
            ));
        }
        if self.context_char_budget == 0 {
            return Err(ConfigError::Invalid(
                "context_char_budget must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn engine_settings(&self, collection: &str) -> EngineSettings {
        EngineSettings {
            collection: collection.to_string(),
            top_k: self.top_k,
            confidence_threshold: self.confidence_threshold,
            context_char_budget: self.context_char_budget,
            enrichment_max_results: self.enrichment_max_results,
        }
    }

    pub fn ingestion_options(&self, collection: &str, course_id: &str) -> IngestionOptions {
        IngestionOptions {
            max_tokens: self.max_tokens,
            overlap: self.overlap,
            ..IngestionOptions::new(collection, course_id)
        }
    }
}
