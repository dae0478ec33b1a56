//! Structured lifecycle events for benchmark runs.
//!
//! Every event carries an `event = "<area>.<what>"` field so JSON log lines
//! can be filtered without parsing messages.

use tracing::{debug, info, warn};

use crate::domain::OutcomeStatus;

/// Span that tags everything logged during a run with its id.
///
/// Attach it with `Instrument::instrument` so it follows the run across
/// await points.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("codebench.run", run_id = %run_id)
}

pub fn emit_run_started(run_id: &str, backend: &str, model: &str, problems: usize, k: usize) {
    info!(
        event = "run.started",
        run_id = %run_id,
        backend = %backend,
        model = %model,
        problems = problems,
        samples_per_task = k,
    );
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, outcomes: usize, passed: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        outcomes = outcomes,
        passed = passed,
    );
}

pub fn emit_sample_generated(task_id: &str, index: usize, attempts: u32, latency_ms: u64) {
    debug!(
        event = "sample.generated",
        task_id = %task_id,
        index = index,
        attempts = attempts,
        latency_ms = latency_ms,
    );
}

pub fn emit_sample_unsanitizable(task_id: &str, index: usize, reason: &dyn std::fmt::Display) {
    warn!(event = "sample.unsanitizable", task_id = %task_id, index = index, reason = %reason);
}

pub fn emit_generation_failed(
    task_id: &str,
    index: usize,
    attempts: u32,
    error: &dyn std::fmt::Display,
) {
    warn!(
        event = "sample.generation_failed",
        task_id = %task_id,
        index = index,
        attempts = attempts,
        error = %error,
    );
}

pub fn emit_problem_sampled(task_id: &str, k: usize, ready: usize) {
    info!(event = "problem.sampled", task_id = %task_id, k = k, ready = ready);
}

pub fn emit_execution_finished(
    task_id: &str,
    index: usize,
    status: OutcomeStatus,
    duration_ms: u64,
) {
    debug!(
        event = "execution.finished",
        task_id = %task_id,
        index = index,
        status = %status,
        duration_ms = duration_ms,
    );
}

pub fn emit_score_computed(k: usize, value: Option<f64>, included: usize, excluded: usize) {
    info!(
        event = "score.computed",
        k = k,
        pass_at_k = value,
        included = included,
        excluded = excluded,
    );
}

pub fn emit_artifact_written(kind: &str, path: &std::path::Path) {
    info!(event = "artifact.written", kind = %kind, path = %path.display());
}
