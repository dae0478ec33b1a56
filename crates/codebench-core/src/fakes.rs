//! In-memory generators for tests (no network).
//!
//! `ScriptedGenerator` replays canned responses per `(task_id, index)` and
//! records every call; `FailingGenerator` fails every call with a fixed
//! error.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{GenerationRequest, RawCompletion, TokenUsage};
use crate::generator::{GenerationError, GenerationFailure, Generator};

/// Token usage reported by the fakes for every successful call.
pub const FAKE_USAGE: TokenUsage = TokenUsage {
    input_tokens: 10,
    output_tokens: 5,
};

type Script = VecDeque<Result<String, GenerationError>>;

/// Generator that answers from a script.
///
/// Each `(task_id, index)` pair owns a queue of results consumed one per
/// attempt; once a queue is empty (or was never set) the default text is
/// returned.
#[derive(Debug)]
pub struct ScriptedGenerator {
    default_text: String,
    scripts: Mutex<HashMap<(String, usize), Script>>,
    delays: HashMap<usize, Duration>,
    calls: Mutex<Vec<(String, usize)>>,
}

impl ScriptedGenerator {
    pub fn new(default_text: impl Into<String>) -> Self {
        Self {
            default_text: default_text.into(),
            scripts: Mutex::new(HashMap::new()),
            delays: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue one attempt result for `(task_id, index)`.
    pub fn push(
        self,
        task_id: &str,
        index: usize,
        result: Result<String, GenerationError>,
    ) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry((task_id.to_string(), index))
            .or_default()
            .push_back(result);
        self
    }

    /// Sleep before answering calls for sample `index`.
    pub fn with_delay(mut self, index: usize, delay: Duration) -> Self {
        self.delays.insert(index, delay);
        self
    }

    /// Every `(task_id, index)` seen, in call order.
    pub fn calls(&self) -> Vec<(String, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        request: &GenerationRequest<'_>,
    ) -> Result<RawCompletion, GenerationFailure> {
        self.calls
            .lock()
            .unwrap()
            .push((request.task_id.to_string(), request.index));

        if let Some(delay) = self.delays.get(&request.index) {
            tokio::time::sleep(*delay).await;
        }

        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&(request.task_id.to_string(), request.index))
            .and_then(|queue| queue.pop_front());

        let text = match next {
            Some(result) => result?,
            None => self.default_text.clone(),
        };
        Ok(RawCompletion {
            text,
            usage: FAKE_USAGE,
            latency: Duration::from_millis(1),
        })
    }
}

/// Generator whose every call fails with the same error.
#[derive(Debug)]
pub struct FailingGenerator {
    error: GenerationError,
    calls: AtomicU64,
}

impl FailingGenerator {
    pub fn new(error: GenerationError) -> Self {
        Self {
            error,
            calls: AtomicU64::new(0),
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for FailingGenerator {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(
        &self,
        _request: &GenerationRequest<'_>,
    ) -> Result<RawCompletion, GenerationFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone().into())
    }
}
