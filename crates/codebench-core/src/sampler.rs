//! Sampler/aggregator: k independent generations per problem.
//!
//! Up to `concurrency` backend calls run at once. Results are collected
//! through an ordered buffer, so sample indices come back 0..k-1 no matter
//! which call finishes first. A call that exhausts its retries, or hits a
//! non-retryable error, still yields a sample (empty body,
//! `generation_failed`), so every problem always gets exactly k samples.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::domain::{GenerationRequest, Problem, Sample, SampleStatus, SamplingParams};
use crate::generator::Generator;
use crate::metrics::METRICS;
use crate::obs;
use crate::retry::{execute_with_retry, RetryPolicy};
use crate::sanitize::sanitize;
use crate::usage::UsageLedger;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SamplerConfig {
    /// Generation calls in flight per problem.
    pub concurrency: usize,
    pub params: SamplingParams,
    pub retry: RetryPolicy,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            params: SamplingParams::default(),
            retry: RetryPolicy::default(),
        }
    }
}

pub struct Sampler {
    generator: Arc<dyn Generator>,
    config: SamplerConfig,
    usage: Arc<UsageLedger>,
}

impl Sampler {
    pub fn new(
        generator: Arc<dyn Generator>,
        config: SamplerConfig,
        usage: Arc<UsageLedger>,
    ) -> Self {
        Self {
            generator,
            config,
            usage,
        }
    }

    pub fn generator_name(&self) -> &str {
        self.generator.name()
    }

    pub fn usage(&self) -> &Arc<UsageLedger> {
        &self.usage
    }

    /// Exactly `k` samples for `problem`, ordered by index.
    pub async fn generate_samples(&self, problem: &Problem, k: usize) -> Vec<Sample> {
        let signature = problem.signature().unwrap_or_default();
        let samples: Vec<Sample> = stream::iter(0..k)
            .map(|index| self.generate_one(problem, &signature, index))
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let ready = samples.iter().filter(|s| s.is_ready()).count();
        obs::emit_problem_sampled(&problem.task_id, k, ready);
        samples
    }

    /// Lazily sample each problem in turn.
    pub fn stream<'a>(
        &'a self,
        problems: &'a [Problem],
        k: usize,
    ) -> impl Stream<Item = (&'a Problem, Vec<Sample>)> + 'a {
        stream::iter(problems)
            .then(move |problem| async move { (problem, self.generate_samples(problem, k).await) })
    }

    async fn generate_one(&self, problem: &Problem, signature: &str, index: usize) -> Sample {
        let request = GenerationRequest {
            task_id: &problem.task_id,
            index,
            prompt: &problem.prompt,
            params: self.config.params,
        };

        let attempt_result = execute_with_retry(&self.config.retry, |attempt| {
            let request = &request;
            async move {
                METRICS.inc_generation_calls();
                if attempt > 1 {
                    METRICS.inc_generation_retries();
                }
                let started = Instant::now();
                match self.generator.complete(request).await {
                    Ok(completion) => {
                        self.usage
                            .record_success(completion.usage, completion.latency);
                        Ok(completion)
                    }
                    Err(failure) => {
                        self.usage
                            .record_failure(failure.usage, started.elapsed());
                        Err(failure.error)
                    }
                }
            }
        })
        .await;

        let (completion, attempts) = match attempt_result {
            Ok(done) => done,
            Err(exhausted) => {
                METRICS.inc_samples_failed();
                obs::emit_generation_failed(
                    &problem.task_id,
                    index,
                    exhausted.attempts,
                    &exhausted.last_error,
                );
                return Sample::generation_failed(
                    problem.task_id.clone(),
                    index,
                    exhausted.attempts,
                    exhausted.last_error.to_string(),
                );
            }
        };

        let latency_ms = completion.latency.as_millis() as u64;
        obs::emit_sample_generated(&problem.task_id, index, attempts, latency_ms);

        let (body, status) = match sanitize(&completion.text, signature) {
            Ok(body) => (body, SampleStatus::Ready),
            Err(reason) => {
                METRICS.inc_samples_unsanitizable();
                obs::emit_sample_unsanitizable(&problem.task_id, index, &reason);
                (
                    String::new(),
                    SampleStatus::Unsanitizable {
                        reason: reason.to_string(),
                    },
                )
            }
        };

        Sample {
            task_id: problem.task_id.clone(),
            index,
            completion: body,
            raw: completion.text,
            usage: completion.usage,
            latency_ms,
            status,
        }
    }
}
