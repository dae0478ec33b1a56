//! Domain models for codebench.
//!
//! Canonical definitions for the records that flow through a run:
//! - `Problem`: immutable benchmark task (prompt, hidden tests, entry point)
//! - `Sample`: one generated-and-sanitized attempt at a problem
//! - `ExecutionOutcome`: verdict of running one sample against hidden tests

pub mod error;
pub mod outcome;
pub mod problem;
pub mod sample;

pub use error::{BenchError, Result};
pub use outcome::{ExecutionOutcome, OutcomeStatus};
pub use problem::Problem;
pub use sample::{
    GenerationRequest, RawCompletion, Sample, SampleStatus, SamplingParams, TokenUsage,
};
