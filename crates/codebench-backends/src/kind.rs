//! Backend selection.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use codebench_core::{Generator, Problem};
use serde::{Deserialize, Serialize};

use crate::agent::ReasoningAgentGenerator;
use crate::canonical::CanonicalGenerator;
use crate::client::{ChatApi, ChatClient, ChatClientConfig, DEFAULT_BASE_URL};
use crate::direct::DirectGenerator;
use crate::function_calling::{FunctionCallingGenerator, DEFAULT_MAX_STEPS};
use crate::{BackendError, Result};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    #[default]
    Direct,
    Agent,
    FunctionCalling,
    Canonical,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Direct,
        BackendKind::Agent,
        BackendKind::FunctionCalling,
        BackendKind::Canonical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Direct => "direct",
            BackendKind::Agent => "agent",
            BackendKind::FunctionCalling => "function-calling",
            BackendKind::Canonical => "canonical",
        }
    }

    /// Whether the backend calls a remote model.
    pub fn needs_api(&self) -> bool {
        !matches!(self, BackendKind::Canonical)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        BackendKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| BackendError::UnknownBackend(s.to_string()))
    }
}

/// Everything needed to build a generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub request_timeout: Duration,
    /// Tool-call turns for the function-calling backend.
    pub max_steps: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(120),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

impl BackendConfig {
    fn chat_client(&self) -> Result<Arc<dyn ChatApi>> {
        let api_key = self
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(BackendError::MissingApiKey(self.kind))?;
        let client = ChatClient::new(ChatClientConfig {
            base_url: self.base_url.clone(),
            api_key,
            timeout: self.request_timeout,
        })?;
        Ok(Arc::new(client))
    }
}

/// Build the generator selected by `config`.
///
/// `problems` is only consulted by the canonical backend.
pub fn build_generator(config: &BackendConfig, problems: &[Problem]) -> Result<Arc<dyn Generator>> {
    let generator: Arc<dyn Generator> = match config.kind {
        BackendKind::Canonical => Arc::new(CanonicalGenerator::new(problems)),
        BackendKind::Direct => Arc::new(DirectGenerator::new(
            config.chat_client()?,
            config.model.clone(),
        )),
        BackendKind::Agent => Arc::new(ReasoningAgentGenerator::new(
            config.chat_client()?,
            config.model.clone(),
        )),
        BackendKind::FunctionCalling => Arc::new(
            FunctionCallingGenerator::new(config.chat_client()?, config.model.clone())
                .with_max_steps(config.max_steps),
        ),
    };
    tracing::debug!(backend = %config.kind, model = %config.model, "generator ready");
    Ok(generator)
}
