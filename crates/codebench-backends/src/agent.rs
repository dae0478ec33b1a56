//! Two-step reasoning backend: plan first, then write the body against the
//! plan. Token usage and latency are summed over both calls; if the second
//! call fails, the plan's tokens travel with the failure.

use std::sync::Arc;

use async_trait::async_trait;
use codebench_core::{
    GenerationError, GenerationFailure, GenerationRequest, Generator, RawCompletion,
};

use crate::client::{ChatApi, ChatMessage, ChatRequest};
use crate::direct::{BODY_ONLY_SUFFIX, BODY_ONLY_SYSTEM_PROMPT, STOP_SEQUENCES};

const PLAN_SYSTEM_PROMPT: &str = "You are a careful Python engineer. \
Read the function signature and docstring and outline, in at most five short numbered steps, \
how to implement it. Mention edge cases. Do not write code.";

pub struct ReasoningAgentGenerator {
    api: Arc<dyn ChatApi>,
    model: String,
}

impl ReasoningAgentGenerator {
    pub fn new(api: Arc<dyn ChatApi>, model: impl Into<String>) -> Self {
        Self {
            api,
            model: model.into(),
        }
    }

    fn chat_request(
        &self,
        messages: Vec<ChatMessage>,
        request: &GenerationRequest<'_>,
        stop: &[&str],
    ) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: request.params.temperature,
            max_tokens: request.params.max_tokens,
            stop: stop.iter().map(|s| s.to_string()).collect(),
            tools: Vec::new(),
        }
    }
}

#[async_trait]
impl Generator for ReasoningAgentGenerator {
    fn name(&self) -> &str {
        "agent"
    }

    async fn complete(
        &self,
        request: &GenerationRequest<'_>,
    ) -> Result<RawCompletion, GenerationFailure> {
        let plan_request = self.chat_request(
            vec![
                ChatMessage::system(PLAN_SYSTEM_PROMPT),
                ChatMessage::user(request.prompt),
            ],
            request,
            &[],
        );
        let plan = self.api.chat(&plan_request).await?;
        let plan_text = plan
            .content
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| {
                GenerationFailure::with_usage(
                    GenerationError::Malformed("plan reply has no content".to_string()),
                    plan.usage,
                )
            })?;
        tracing::debug!(task_id = %request.task_id, index = request.index, plan_chars = plan_text.len(), "plan drafted");

        let implement_request = self.chat_request(
            vec![
                ChatMessage::system(BODY_ONLY_SYSTEM_PROMPT),
                ChatMessage::user(format!(
                    "{}\n\n# Plan:\n{}{}",
                    request.prompt,
                    comment_block(&plan_text),
                    BODY_ONLY_SUFFIX
                )),
            ],
            request,
            STOP_SEQUENCES,
        );
        let body = self
            .api
            .chat(&implement_request)
            .await
            .map_err(|e| GenerationFailure::with_usage(e, plan.usage))?;
        let usage = plan.usage + body.usage;
        let text = body.content.ok_or_else(|| {
            GenerationFailure::with_usage(
                GenerationError::Malformed("reply has no content".to_string()),
                usage,
            )
        })?;

        Ok(RawCompletion {
            text,
            usage,
            latency: plan.latency + body.latency,
        })
    }
}

/// Prefix every line with `# ` so the plan reads as Python comments.
fn comment_block(text: &str) -> String {
    text.trim()
        .lines()
        .map(|line| format!("# {}", line.trim_end()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedChat;
    use codebench_core::{SamplingParams, TokenUsage};
    use std::time::Duration;

    fn request() -> GenerationRequest<'static> {
        GenerationRequest {
            task_id: "HumanEval/1",
            index: 2,
            prompt: "def inc(x):\n    \"\"\"x plus one.\"\"\"\n",
            params: SamplingParams::default(),
        }
    }

    #[tokio::test]
    async fn test_plan_feeds_implementation_and_usage_is_summed() {
        let chat = Arc::new(
            ScriptedChat::new()
                .text("1. add one\n2. return it", TokenUsage::new(30, 10))
                .text("    return x + 1\n", TokenUsage::new(50, 5)),
        );
        let generator = ReasoningAgentGenerator::new(chat.clone(), "gpt-4o");

        let completion = generator.complete(&request()).await.expect("complete");
        assert_eq!(completion.text, "    return x + 1\n");
        assert_eq!(completion.usage, TokenUsage::new(80, 15));
        assert_eq!(completion.latency, Duration::from_millis(20));

        let sent = chat.requests();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].stop.is_empty());
        let implement = sent[1].messages[1].content.as_deref().unwrap_or_default();
        assert!(implement.contains("# 1. add one\n# 2. return it"));
        assert_eq!(sent[1].stop.len(), STOP_SEQUENCES.len());
    }

    #[tokio::test]
    async fn test_empty_plan_is_malformed() {
        let chat = Arc::new(ScriptedChat::new().text("   ", TokenUsage::default()));
        let generator = ReasoningAgentGenerator::new(chat.clone(), "gpt-4o");
        let failure = generator.complete(&request()).await.unwrap_err();
        assert!(matches!(failure.error, GenerationError::Malformed(_)));
        assert_eq!(chat.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_implement_call_carries_plan_usage() {
        let chat = Arc::new(
            ScriptedChat::new()
                .text("1. add one", TokenUsage::new(500, 100))
                .reply(Err(GenerationError::Backend("HTTP 500: boom".into()))),
        );
        let generator = ReasoningAgentGenerator::new(chat, "gpt-4o");

        let failure = generator.complete(&request()).await.unwrap_err();
        assert_eq!(
            failure.error,
            GenerationError::Backend("HTTP 500: boom".into())
        );
        assert_eq!(failure.usage, TokenUsage::new(500, 100));
    }

    #[test]
    fn test_comment_block() {
        assert_eq!(comment_block("a\nb  \n"), "# a\n# b");
    }
}
