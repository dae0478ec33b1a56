//! Single-call backend: ask for the function body and nothing else.

use std::sync::Arc;

use async_trait::async_trait;
use codebench_core::{
    GenerationError, GenerationFailure, GenerationRequest, Generator, RawCompletion,
};

use crate::client::{ChatApi, ChatMessage, ChatRequest};

pub(crate) const BODY_ONLY_SYSTEM_PROMPT: &str = "You complete Python functions from a provided signature+docstring. \
Return ONLY the function body (the indented code after the signature). \
Do not repeat the signature. Do not add imports. \
Do not include explanations or markdown.";

pub(crate) const BODY_ONLY_SUFFIX: &str = "\n\n# Write ONLY the function body below, nothing else.";

/// Sequences that end a body before the model wanders into a script.
pub const STOP_SEQUENCES: &[&str] = &[
    "\n\n\n",
    "\nif __name__ == '__main__':",
    "\nif __name__ == \"__main__\":",
];

pub struct DirectGenerator {
    api: Arc<dyn ChatApi>,
    model: String,
}

impl DirectGenerator {
    pub fn new(api: Arc<dyn ChatApi>, model: impl Into<String>) -> Self {
        Self {
            api,
            model: model.into(),
        }
    }

    fn build_request(&self, request: &GenerationRequest<'_>) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(BODY_ONLY_SYSTEM_PROMPT),
                ChatMessage::user(format!("{}{}", request.prompt, BODY_ONLY_SUFFIX)),
            ],
            temperature: request.params.temperature,
            max_tokens: request.params.max_tokens,
            stop: STOP_SEQUENCES.iter().map(|s| s.to_string()).collect(),
            tools: Vec::new(),
        }
    }
}

#[async_trait]
impl Generator for DirectGenerator {
    fn name(&self) -> &str {
        "direct"
    }

    async fn complete(
        &self,
        request: &GenerationRequest<'_>,
    ) -> Result<RawCompletion, GenerationFailure> {
        let reply = self.api.chat(&self.build_request(request)).await?;
        let text = reply.content.ok_or_else(|| {
            GenerationFailure::with_usage(
                GenerationError::Malformed("reply has no content".to_string()),
                reply.usage,
            )
        })?;
        Ok(RawCompletion {
            text,
            usage: reply.usage,
            latency: reply.latency,
        })
    }
}
