//! codebench core library
//!
//! Sampling, sanitization, sandboxed execution and pass@k scoring for
//! HumanEval-style code-generation benchmarks.

pub mod artifacts;
pub mod config;
pub mod corpus;
pub mod domain;
pub mod evaluator;
pub mod fakes;
pub mod generator;
pub mod metrics;
pub mod obs;
pub mod pipeline;
pub mod reporting;
pub mod retry;
pub mod sampler;
pub mod sandbox;
pub mod sanitize;
pub mod scorer;
pub mod telemetry;
pub mod usage;

pub use domain::{
    BenchError, ExecutionOutcome, GenerationRequest, OutcomeStatus, Problem, RawCompletion,
    Result, Sample, SampleStatus, SamplingParams, TokenUsage,
};

pub use artifacts::{ArtifactDigest, ResultRecord, RunLayout, RunManifest, SampleRecord};
pub use config::{default_ks, RunConfig};
pub use corpus::{load_corpus, load_problems, CorpusFilter};
pub use evaluator::Evaluator;
pub use generator::{GenerationError, GenerationFailure, Generator};
pub use pipeline::{
    evaluate_files, evaluate_records, generate, run_benchmark, score_results_file, Evaluation,
    GenerationSummary, RunSummary,
};
pub use reporting::{estimate_cost, render_summary, ResultsTracker, RunRow};
pub use retry::{execute_with_retry, RetryExhausted, RetryPolicy};
pub use sampler::{Sampler, SamplerConfig};
pub use sandbox::{ProgramSpec, Sandbox, SandboxConfig, Verdict};
pub use sanitize::{sanitize, Unsanitizable};
pub use scorer::{pass_at_k, score, CorpusPassAtK, ProblemScore, ScoreReport, Verdicted};
pub use usage::{UsageLedger, UsageSnapshot};
