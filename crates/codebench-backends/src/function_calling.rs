//! Tool-calling backend: the model submits its answer through a
//! `submit_function_body` function call.
//!
//! Invalid submissions are answered with a tool message describing the
//! problem, and the model gets another turn, up to `max_steps` calls in
//! total. A plain-text answer is accepted as the completion. Failures carry
//! the tokens spent on earlier turns.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use codebench_core::{
    GenerationError, GenerationFailure, GenerationRequest, Generator, RawCompletion, TokenUsage,
};
use serde::Deserialize;
use serde_json::json;

use crate::client::{ChatApi, ChatMessage, ChatRequest, ToolCall, ToolDefinition};
use crate::direct::BODY_ONLY_SYSTEM_PROMPT;

pub const SUBMIT_TOOL: &str = "submit_function_body";
pub const DEFAULT_MAX_STEPS: usize = 4;

#[derive(Debug, Deserialize)]
struct Submission {
    body: String,
}

pub struct FunctionCallingGenerator {
    api: Arc<dyn ChatApi>,
    model: String,
    max_steps: usize,
}

impl FunctionCallingGenerator {
    pub fn new(api: Arc<dyn ChatApi>, model: impl Into<String>) -> Self {
        Self {
            api,
            model: model.into(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    fn submit_tool() -> ToolDefinition {
        ToolDefinition::function(
            SUBMIT_TOOL,
            "Submit the indented Python function body that completes the given signature.",
            json!({
                "type": "object",
                "properties": {
                    "body": {
                        "type": "string",
                        "description": "Function body only, indented by four spaces, without the signature."
                    }
                },
                "required": ["body"]
            }),
        )
    }
}

/// What to do with one tool call.
enum CallVerdict {
    Accepted(String),
    Rejected(String),
}

fn judge(call: &ToolCall) -> CallVerdict {
    if call.function.name != SUBMIT_TOOL {
        return CallVerdict::Rejected(format!(
            "unknown tool {:?}; call {} instead",
            call.function.name, SUBMIT_TOOL
        ));
    }
    match serde_json::from_str::<Submission>(&call.function.arguments) {
        Ok(submission) if !submission.body.trim().is_empty() => {
            CallVerdict::Accepted(submission.body)
        }
        Ok(_) => CallVerdict::Rejected("the body is empty; submit the full function body".to_string()),
        Err(e) => CallVerdict::Rejected(format!(
            "invalid arguments ({}); call {} with {{\"body\": \"<code>\"}}",
            e, SUBMIT_TOOL
        )),
    }
}

#[async_trait]
impl Generator for FunctionCallingGenerator {
    fn name(&self) -> &str {
        "function-calling"
    }

    async fn complete(
        &self,
        request: &GenerationRequest<'_>,
    ) -> Result<RawCompletion, GenerationFailure> {
        let mut messages = vec![
            ChatMessage::system(format!(
                "{} Submit your answer by calling {}.",
                BODY_ONLY_SYSTEM_PROMPT, SUBMIT_TOOL
            )),
            ChatMessage::user(request.prompt),
        ];
        let mut usage = TokenUsage::default();
        let mut latency = Duration::ZERO;

        for step in 1..=self.max_steps {
            let chat_request = ChatRequest {
                model: self.model.clone(),
                messages: messages.clone(),
                temperature: request.params.temperature,
                max_tokens: request.params.max_tokens,
                stop: Vec::new(),
                tools: vec![Self::submit_tool()],
            };
            let reply = self
                .api
                .chat(&chat_request)
                .await
                .map_err(|e| GenerationFailure::with_usage(e, usage))?;
            usage += reply.usage;
            latency += reply.latency;

            if reply.tool_calls.is_empty() {
                return match reply.content.filter(|c| !c.trim().is_empty()) {
                    Some(text) => Ok(RawCompletion {
                        text,
                        usage,
                        latency,
                    }),
                    None => Err(GenerationFailure::with_usage(
                        GenerationError::Malformed(
                            "reply has neither content nor tool calls".to_string(),
                        ),
                        usage,
                    )),
                };
            }

            let mut feedback = Vec::with_capacity(reply.tool_calls.len());
            for call in &reply.tool_calls {
                match judge(call) {
                    CallVerdict::Accepted(body) => {
                        return Ok(RawCompletion {
                            text: body,
                            usage,
                            latency,
                        })
                    }
                    CallVerdict::Rejected(reason) => {
                        tracing::debug!(task_id = %request.task_id, step, reason = %reason, "tool call rejected");
                        feedback.push(ChatMessage::tool(call.id.clone(), reason));
                    }
                }
            }
            messages.push(ChatMessage::assistant_tool_calls(
                reply.content,
                reply.tool_calls,
            ));
            messages.extend(feedback);
        }

        Err(GenerationFailure::with_usage(
            GenerationError::Malformed(format!(
                "no valid {} call after {} steps",
                SUBMIT_TOOL, self.max_steps
            )),
            usage,
        ))
    }
}
