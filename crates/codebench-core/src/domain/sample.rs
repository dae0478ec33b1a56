//! Generation requests, raw completions and samples.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Sampling parameters forwarded to every backend call of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 512,
        }
    }
}

/// One backend call for one sample of one problem.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest<'a> {
    pub task_id: &'a str,
    pub index: usize,
    pub prompt: &'a str,
    pub params: SamplingParams,
}

/// Token counts reported (or estimated) by a backend.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

impl std::ops::Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: TokenUsage) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens + rhs.input_tokens,
            output_tokens: self.output_tokens + rhs.output_tokens,
        }
    }
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: TokenUsage) {
        *self = *self + rhs;
    }
}

/// Backend output for one generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCompletion {
    pub text: String,
    pub usage: TokenUsage,
    pub latency: Duration,
}

/// Whether a sample carries a usable body.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SampleStatus {
    /// Sanitized body is ready for execution.
    #[default]
    Ready,
    /// The completion could not be normalized into a function body.
    Unsanitizable { reason: String },
    /// Every generation attempt failed; the body is empty.
    GenerationFailed { attempts: u32, reason: String },
}

impl SampleStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, SampleStatus::Ready)
    }
}

/// One generated attempt at a problem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    pub task_id: String,

    /// Position within the problem's k samples (0-based, stable).
    pub index: usize,

    /// Sanitized function body (empty unless `status` is `Ready`).
    pub completion: String,

    /// Backend text before sanitization.
    pub raw: String,

    pub usage: TokenUsage,

    pub latency_ms: u64,

    pub status: SampleStatus,
}

impl Sample {
    /// A sample whose generation exhausted its retry budget.
    pub fn generation_failed(
        task_id: impl Into<String>,
        index: usize,
        attempts: u32,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            index,
            completion: String::new(),
            raw: String::new(),
            usage: TokenUsage::default(),
            latency_ms: 0,
            status: SampleStatus::GenerationFailed {
                attempts,
                reason: reason.into(),
            },
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status.is_ready()
    }
}
