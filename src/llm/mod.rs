// Language model integration
// Completion and embedding calls against Ollama

pub mod ollama;
#[cfg(test)]
pub(crate) mod scripted;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use ollama::{EmbeddingResult, OllamaClient};

/// Response envelope returned by a completion service.
///
/// `text` holds the model output. It is optional so that envelopes missing
/// the field deserialize and can be reported as a parse failure downstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl CompletionEnvelope {
    #[inline]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }
}

/// A prompt-to-text language model.
///
/// Implementations return the raw envelope body (JSON with a `text` field).
/// An `Err` means the service itself failed; malformed model output is not an
/// error at this level.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}
