//! codebench backends
//!
//! Generators that turn a HumanEval prompt into a raw completion: an
//! OpenAI-compatible chat client with three prompting strategies, plus an
//! offline reference backend.

pub mod agent;
pub mod canonical;
pub mod client;
pub mod direct;
pub mod fakes;
pub mod function_calling;
pub mod kind;

pub use agent::ReasoningAgentGenerator;
pub use canonical::CanonicalGenerator;
pub use client::{ChatApi, ChatClient, ChatClientConfig, ChatMessage, ChatReply, ChatRequest};
pub use direct::DirectGenerator;
pub use function_calling::FunctionCallingGenerator;
pub use kind::{build_generator, BackendConfig, BackendKind};

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("unknown backend {0:?} (expected direct, agent, function-calling or canonical)")]
    UnknownBackend(String),

    #[error("backend {0} needs an API key (set OPENAI_API_KEY)")]
    MissingApiKey(BackendKind),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, BackendError>;
