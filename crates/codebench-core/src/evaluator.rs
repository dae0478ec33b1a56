//! Functional-correctness evaluation of sample records.

use std::collections::HashMap;

use futures::stream::{self, StreamExt};

use crate::artifacts::SampleRecord;
use crate::domain::{BenchError, ExecutionOutcome, OutcomeStatus, Problem, Result, SampleStatus};
use crate::metrics::METRICS;
use crate::obs;
use crate::sandbox::{ProgramSpec, Sandbox};

/// Runs every sample record through the sandbox with at most
/// `workers` executions in flight.
#[derive(Debug, Clone)]
pub struct Evaluator {
    sandbox: Sandbox,
}

struct Job<'a> {
    problem: &'a Problem,
    record: &'a SampleRecord,
    sample_index: usize,
}

impl Evaluator {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// One outcome per record, in record order.
    ///
    /// Fails before executing anything when a record names a task that is
    /// not in `problems`, or when a problem has no records. Sample indices
    /// are assigned per task in file order.
    pub async fn evaluate(
        &self,
        problems: &[Problem],
        records: &[SampleRecord],
    ) -> Result<Vec<ExecutionOutcome>> {
        let by_id: HashMap<&str, &Problem> =
            problems.iter().map(|p| (p.task_id.as_str(), p)).collect();

        let mut next_index: HashMap<&str, usize> = HashMap::new();
        let mut jobs = Vec::with_capacity(records.len());
        for record in records {
            let problem = by_id
                .get(record.task_id.as_str())
                .copied()
                .ok_or_else(|| BenchError::UnknownTask(record.task_id.clone()))?;
            let slot = next_index.entry(problem.task_id.as_str()).or_insert(0);
            jobs.push(Job {
                problem,
                record,
                sample_index: *slot,
            });
            *slot += 1;
        }

        if let Some(missing) = problems
            .iter()
            .find(|p| !next_index.contains_key(p.task_id.as_str()))
        {
            return Err(BenchError::MissingSamples(missing.task_id.clone()));
        }

        let workers = self.sandbox.config().workers.max(1);
        let outcomes: Vec<ExecutionOutcome> = stream::iter(jobs)
            .map(|job| self.run_job(job))
            .buffered(workers)
            .collect()
            .await;
        Ok(outcomes)
    }

    async fn run_job(&self, job: Job<'_>) -> ExecutionOutcome {
        let Job {
            problem,
            record,
            sample_index,
        } = job;

        let (status, detail, duration_ms) = match &record.status {
            SampleStatus::Unsanitizable { reason } => (
                OutcomeStatus::Error,
                Some(format!("unsanitizable completion: {}", reason)),
                0,
            ),
            SampleStatus::GenerationFailed { reason, .. } => (
                OutcomeStatus::Failed,
                Some(format!("generation failed: {}", reason)),
                0,
            ),
            SampleStatus::Ready => {
                let spec = ProgramSpec {
                    prompt: &problem.prompt,
                    body: &record.completion,
                    tests: &problem.test,
                    entry_point: &problem.entry_point,
                };
                let verdict = self.sandbox.execute(&spec).await;
                METRICS.inc_executions(verdict.status == OutcomeStatus::TimedOut);
                (verdict.status, verdict.detail, verdict.duration_ms)
            }
        };

        obs::emit_execution_finished(&problem.task_id, sample_index, status, duration_ms);
        ExecutionOutcome {
            task_id: problem.task_id.clone(),
            sample_index,
            completion: record.completion.clone(),
            status,
            detail,
            duration_ms,
        }
    }
}
