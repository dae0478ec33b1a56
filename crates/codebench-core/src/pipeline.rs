//! End-to-end benchmark runs: generate, persist, evaluate, score.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Local, Utc};
use futures::StreamExt;
use tracing::Instrument;
use uuid::Uuid;

use crate::artifacts::{
    self, ArtifactDigest, ResultRecord, RunLayout, RunManifest, SampleRecord,
};
use crate::config::RunConfig;
use crate::corpus::load_corpus;
use crate::domain::{BenchError, ExecutionOutcome, Problem, Result, Sample};
use crate::evaluator::Evaluator;
use crate::generator::Generator;
use crate::metrics::METRICS;
use crate::obs;
use crate::sampler::Sampler;
use crate::sandbox::{Sandbox, SandboxConfig};
use crate::scorer::{group_by_task, score, ScoreReport};
use crate::usage::{UsageLedger, UsageSnapshot};

/// Output of the generation half of a run.
#[derive(Debug, Clone)]
pub struct GenerationSummary {
    pub layout: RunLayout,
    pub problems: Vec<Problem>,
    pub samples: Vec<Sample>,
    pub usage: UsageSnapshot,
    pub samples_path: PathBuf,
    pub problems_path: PathBuf,
    pub raw_samples_path: Option<PathBuf>,
}

/// Outcomes plus their score.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub outcomes: Vec<ExecutionOutcome>,
    pub score: ScoreReport,
}

impl Evaluation {
    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed()).count()
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub layout: RunLayout,
    pub problems: usize,
    pub samples_per_task: usize,
    pub outcomes: usize,
    pub passed: usize,
    pub score: ScoreReport,
    pub usage: UsageSnapshot,
    pub duration: Duration,
    pub results_path: PathBuf,
    pub manifest_path: PathBuf,
}

/// Sample every selected problem and write the samples and problem subset.
pub async fn generate(
    config: &RunConfig,
    generator: Arc<dyn Generator>,
) -> Result<GenerationSummary> {
    config.validate()?;
    let problems = load_corpus(&config.corpus, &config.filter)?;
    let layout = RunLayout::new(
        &config.output_dir,
        &config.backend,
        &config.model,
        Local::now().naive_local(),
    );
    generate_into(config, generator, problems, layout).await
}

async fn generate_into(
    config: &RunConfig,
    generator: Arc<dyn Generator>,
    problems: Vec<Problem>,
    layout: RunLayout,
) -> Result<GenerationSummary> {
    layout.create()?;

    let usage = Arc::new(UsageLedger::new());
    let sampler = Sampler::new(generator, config.sampler, Arc::clone(&usage));

    let mut samples = Vec::with_capacity(problems.len() * config.samples_per_task);
    let mut batches = Box::pin(sampler.stream(&problems, config.samples_per_task));
    while let Some((_, batch)) = batches.next().await {
        samples.extend(batch);
    }
    drop(batches);

    let samples_path = layout.samples_path();
    artifacts::write_samples(&samples_path, &samples, false)?;
    obs::emit_artifact_written("samples", &samples_path);

    let raw_samples_path = if config.emit_raw {
        let path = layout.raw_samples_path();
        artifacts::write_samples(&path, &samples, true)?;
        obs::emit_artifact_written("raw_samples", &path);
        Some(path)
    } else {
        None
    };

    let problems_path = layout.problems_path();
    artifacts::write_problems(&problems_path, &problems)?;
    obs::emit_artifact_written("problems", &problems_path);

    Ok(GenerationSummary {
        layout,
        problems,
        samples,
        usage: usage.snapshot(),
        samples_path,
        problems_path,
        raw_samples_path,
    })
}

/// Execute sample records against their problems and score the outcomes.
pub async fn evaluate_records(
    problems: &[Problem],
    records: &[SampleRecord],
    sandbox: SandboxConfig,
    ks: &[usize],
) -> Result<Evaluation> {
    let evaluator = Evaluator::new(Sandbox::new(sandbox));
    let outcomes = evaluator.evaluate(problems, records).await?;
    let score = score_outcomes(&outcomes, ks);
    Ok(Evaluation { outcomes, score })
}

/// Evaluate a samples file against a problems file and write
/// `<samples>_results.jsonl` next to the samples.
pub async fn evaluate_files(
    samples_path: &Path,
    problems_path: &Path,
    sandbox: SandboxConfig,
    ks: &[usize],
) -> Result<(Evaluation, PathBuf)> {
    check_ks(ks)?;
    Sandbox::new(sandbox.clone()).probe().await?;
    let problems = crate::corpus::load_problems(problems_path)?;
    let records = artifacts::read_samples(samples_path)?;
    let evaluation = evaluate_records(&problems, &records, sandbox, ks).await?;

    let results_path = artifacts::results_path_for(samples_path);
    artifacts::write_results(&results_path, &evaluation.outcomes)?;
    obs::emit_artifact_written("results", &results_path);
    Ok((evaluation, results_path))
}

/// pass@k from an existing results file.
pub fn score_results_file(path: &Path, ks: &[usize]) -> Result<ScoreReport> {
    check_ks(ks)?;
    let records: Vec<ResultRecord> = artifacts::read_results(path)?;
    let grouped = group_by_task(records, |r| r.task_id.as_str());
    let report = score(&grouped, ks);
    emit_scores(&report);
    Ok(report)
}

fn check_ks(ks: &[usize]) -> Result<()> {
    if ks.contains(&0) {
        return Err(BenchError::Configuration("k must be at least 1".to_string()));
    }
    Ok(())
}

fn score_outcomes(outcomes: &[ExecutionOutcome], ks: &[usize]) -> ScoreReport {
    let grouped = group_by_task(outcomes.to_vec(), |o| o.task_id.as_str());
    let report = score(&grouped, ks);
    emit_scores(&report);
    report
}

fn emit_scores(report: &ScoreReport) {
    for entry in &report.corpus {
        obs::emit_score_computed(entry.k, entry.value, entry.included, entry.excluded);
    }
}

/// Full run: probe, generate, persist, evaluate, persist, score, manifest.
///
/// Fails with `OutcomeCountMismatch` unless exactly `problems x k`
/// outcomes were produced.
pub async fn run_benchmark(config: &RunConfig, generator: Arc<dyn Generator>) -> Result<RunSummary> {
    config.validate()?;
    let run_id = Uuid::new_v4();
    run_with_id(config, generator, run_id)
        .instrument(obs::run_span(&run_id.to_string()))
        .await
}

async fn run_with_id(
    config: &RunConfig,
    generator: Arc<dyn Generator>,
    run_id: Uuid,
) -> Result<RunSummary> {
    let started = Instant::now();
    let started_at = Utc::now();

    let version = Sandbox::new(config.sandbox.clone()).probe().await?;
    tracing::debug!(interpreter = %config.sandbox.interpreter, version = %version, "interpreter ready");

    let problems = load_corpus(&config.corpus, &config.filter)?;
    obs::emit_run_started(
        &run_id.to_string(),
        generator.name(),
        &config.model,
        problems.len(),
        config.samples_per_task,
    );

    let layout = RunLayout::new(
        &config.output_dir,
        &config.backend,
        &config.model,
        Local::now().naive_local(),
    );
    let generated = generate_into(config, generator, problems, layout).await?;

    let records: Vec<SampleRecord> = generated
        .samples
        .iter()
        .map(|s| SampleRecord::from_sample(s, false))
        .collect();
    let evaluation = evaluate_records(
        &generated.problems,
        &records,
        config.sandbox.clone(),
        &config.ks,
    )
    .await?;

    let expected = generated.problems.len() * config.samples_per_task;
    if evaluation.outcomes.len() != expected {
        return Err(BenchError::OutcomeCountMismatch {
            expected,
            actual: evaluation.outcomes.len(),
        });
    }

    let layout = generated.layout;
    let results_path = layout.results_path();
    artifacts::write_results(&results_path, &evaluation.outcomes)?;
    obs::emit_artifact_written("results", &results_path);

    let mut digests = vec![
        ArtifactDigest::of_file("samples", &generated.samples_path)?,
        ArtifactDigest::of_file("problems", &generated.problems_path)?,
        ArtifactDigest::of_file("results", &results_path)?,
    ];
    if let Some(raw) = &generated.raw_samples_path {
        digests.push(ArtifactDigest::of_file("raw_samples", raw)?);
    }

    let duration = started.elapsed();
    let passed = evaluation.passed();
    let manifest = RunManifest {
        run_id,
        backend: config.backend.clone(),
        model: config.model.clone(),
        started_at,
        finished_at: Utc::now(),
        duration_ms: duration.as_millis() as u64,
        problems: generated.problems.len(),
        samples_per_task: config.samples_per_task,
        outcomes: evaluation.outcomes.len(),
        passed,
        usage: generated.usage,
        score: evaluation.score.clone(),
        artifacts: digests,
    };
    let manifest_path = layout.manifest_path();
    manifest.write(&manifest_path)?;
    obs::emit_artifact_written("manifest", &manifest_path);

    METRICS.flush();
    obs::emit_run_finished(
        &run_id.to_string(),
        manifest.duration_ms,
        evaluation.outcomes.len(),
        passed,
    );

    Ok(RunSummary {
        run_id,
        layout,
        problems: generated.problems.len(),
        samples_per_task: config.samples_per_task,
        outcomes: evaluation.outcomes.len(),
        passed,
        score: evaluation.score,
        usage: generated.usage,
        duration,
        results_path,
        manifest_path,
    })
}
