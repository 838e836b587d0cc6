// Canned CompletionService used by unit tests

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::{CompletionEnvelope, CompletionService};

/// Replays queued responses in order. `Err` entries fail that call.
#[derive(Default)]
pub(crate) struct ScriptedCompletion {
    responses: Mutex<VecDeque<std::result::Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue a raw envelope body
    pub(crate) fn respond_raw(self, body: impl Into<String>) -> Self {
        self.responses
            .lock()
            .expect("responses lock")
            .push_back(Ok(body.into()));
        self
    }

    /// Queue a body whose envelope `text` is the given model output
    pub(crate) fn respond(self, model_output: &str) -> Self {
        let body = serde_json::to_string(&CompletionEnvelope::new(model_output))
            .expect("envelope serializes");
        self.respond_raw(body)
    }

    pub(crate) fn fail(self, message: &str) -> Self {
        self.responses
            .lock()
            .expect("responses lock")
            .push_back(Err(message.to_string()));
        self
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(prompt.to_string());

        let next = self.responses.lock().expect("responses lock").pop_front();
        match next {
            Some(Ok(body)) => Ok(body),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted response left")),
        }
    }
}
