//! Run configuration and its validation.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::corpus::CorpusFilter;
use crate::domain::{BenchError, Result};
use crate::sampler::SamplerConfig;
use crate::sandbox::SandboxConfig;

/// pass@k values reported when none are requested.
pub fn default_ks() -> Vec<usize> {
    (1..=10).collect()
}

/// Everything a benchmark run needs, fixed before the first backend call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    /// HumanEval JSONL corpus, plain or gzip-compressed.
    pub corpus: PathBuf,
    /// Root of the `samples/`, `problems/` and `results/` folders.
    pub output_dir: PathBuf,
    /// Backend label used in artifact names.
    pub backend: String,
    pub model: String,
    pub samples_per_task: usize,
    pub ks: Vec<usize>,
    pub filter: CorpusFilter,
    pub sampler: SamplerConfig,
    pub sandbox: SandboxConfig,
    /// Also write the unsanitized completions next to the samples file.
    pub emit_raw: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            corpus: PathBuf::from("data/HumanEval.jsonl.gz"),
            output_dir: PathBuf::from("runs"),
            backend: "direct".to_string(),
            model: "gpt-4o-mini".to_string(),
            samples_per_task: 10,
            ks: default_ks(),
            filter: CorpusFilter::default(),
            sampler: SamplerConfig::default(),
            sandbox: SandboxConfig::default(),
            emit_raw: false,
        }
    }
}

impl RunConfig {
    /// Reject settings that would make the run meaningless.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(BenchError::Configuration(msg.to_string()));

        if self.samples_per_task == 0 {
            return invalid("samples per task must be at least 1");
        }
        if self.ks.is_empty() {
            return invalid("at least one k is required");
        }
        if self.ks.contains(&0) {
            return invalid("k must be at least 1");
        }
        if self.model.trim().is_empty() {
            return invalid("model name is empty");
        }
        if self.filter.limit == Some(0) {
            return invalid("task limit must be at least 1");
        }
        if self.sampler.concurrency == 0 {
            return invalid("generation concurrency must be at least 1");
        }
        if self.sampler.retry.max_attempts == 0 {
            return invalid("max attempts must be at least 1");
        }
        let temperature = self.sampler.params.temperature;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(BenchError::Configuration(format!(
                "temperature {} is outside 0.0..=2.0",
                temperature
            )));
        }
        if self.sampler.params.max_tokens == 0 {
            return invalid("max tokens must be at least 1");
        }
        if self.sandbox.interpreter.trim().is_empty() {
            return invalid("interpreter is empty");
        }
        if self.sandbox.timeout_ms == 0 {
            return invalid("execution timeout must be positive");
        }
        if self.sandbox.workers == 0 {
            return invalid("execution workers must be at least 1");
        }
        if self.ks.iter().all(|&k| k > self.samples_per_task) {
            tracing::warn!(
                samples_per_task = self.samples_per_task,
                "every requested k exceeds the samples per task; pass@k will be N/A"
            );
        }
        Ok(())
    }
}
