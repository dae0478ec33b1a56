//! Scripted chat endpoint for backend tests (no network).

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use codebench_core::{GenerationError, TokenUsage};

use crate::client::{ChatApi, ChatReply, ChatRequest, ToolCall};

/// Replays queued replies in order and records every request.
///
/// Once the queue is empty every further call fails with a `Backend` error.
#[derive(Debug, Default)]
pub struct ScriptedChat {
    replies: Mutex<VecDeque<Result<ChatReply, GenerationError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a plain text reply.
    pub fn text(self, content: &str, usage: TokenUsage) -> Self {
        self.reply(Ok(ChatReply {
            content: Some(content.to_string()),
            tool_calls: Vec::new(),
            usage,
            latency: Duration::from_millis(10),
        }))
    }

    /// Queue a reply that calls one tool.
    pub fn tool_call(self, name: &str, arguments: &str, usage: TokenUsage) -> Self {
        let id = format!("call_{}", self.replies.lock().unwrap().len());
        self.reply(Ok(ChatReply {
            content: None,
            tool_calls: vec![ToolCall::function(id, name, arguments)],
            usage,
            latency: Duration::from_millis(10),
        }))
    }

    pub fn reply(self, reply: Result<ChatReply, GenerationError>) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatApi for ScriptedChat {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, GenerationError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GenerationError::Backend("script exhausted".to_string())))
    }
}
