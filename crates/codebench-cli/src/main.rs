//! codebench - pass@k benchmarking for code-generation backends
//!
//! ## Commands
//!
//! - `run`: sample, execute, score, write the manifest and append a CSV row
//! - `generate`: sample only; writes the samples and problem subset files
//! - `evaluate`: execute an existing samples file against its problems
//! - `score`: pass@k from an existing results file

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use tracing::info;

use codebench_backends::client::DEFAULT_BASE_URL;
use codebench_backends::{build_generator, BackendConfig, BackendKind};
use codebench_core::reporting::{render_summary, write_score_json, ResultsTracker, RunRow};
use codebench_core::{
    default_ks, evaluate_files, generate, load_problems, run_benchmark, score_results_file,
    telemetry, CorpusFilter, Generator, RetryPolicy, RunConfig, SamplerConfig, SamplingParams,
    SandboxConfig,
};

#[derive(Parser)]
#[command(name = "codebench")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "pass@k benchmarking for code-generation backends", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample, execute and score a corpus end to end
    Run {
        #[command(flatten)]
        generation: GenerationArgs,

        #[command(flatten)]
        sandbox: SandboxArgs,

        /// k values to report (comma separated, default 1..10)
        #[arg(long, value_delimiter = ',', value_parser = parse_k)]
        k: Vec<usize>,

        /// CSV file that collects one row per run
        #[arg(long, env = "CODEBENCH_RESULTS_CSV", default_value = "results/combined_results.csv")]
        results_csv: PathBuf,

        /// Approach label for the CSV row (default: backend name)
        #[arg(long)]
        approach: Option<String>,

        /// Benchmark label for the CSV row
        #[arg(long, default_value = "HumanEval")]
        benchmark: String,
    },

    /// Sample a corpus without executing anything
    Generate {
        #[command(flatten)]
        generation: GenerationArgs,
    },

    /// Execute a samples file against its problem subset
    Evaluate {
        /// Samples JSONL (`task_id`/`problem_id` + `completion`)
        #[arg(long)]
        samples: PathBuf,

        /// Problem subset JSONL written next to the samples
        #[arg(long)]
        problems: PathBuf,

        #[command(flatten)]
        sandbox: SandboxArgs,

        /// k values to report (comma separated, default 1..10)
        #[arg(long, value_delimiter = ',', value_parser = parse_k)]
        k: Vec<usize>,
    },

    /// Compute pass@k from an existing results file
    Score {
        /// Results JSONL produced by `run` or `evaluate`
        #[arg(long)]
        results: PathBuf,

        /// k values to report (comma separated, default 1..10)
        #[arg(long, value_delimiter = ',', value_parser = parse_k)]
        k: Vec<usize>,

        /// Also write the score report as JSON
        #[arg(long)]
        json_out: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone)]
struct GenerationArgs {
    /// HumanEval corpus (JSONL, optionally gzip-compressed)
    #[arg(long, env = "CODEBENCH_CORPUS", default_value = "data/HumanEval.jsonl.gz")]
    corpus: PathBuf,

    /// Root directory for samples/, problems/ and results/
    #[arg(long, env = "CODEBENCH_OUTPUT_DIR", default_value = "runs")]
    output_dir: PathBuf,

    /// Generation backend: direct, agent, function-calling or canonical
    #[arg(long, env = "CODEBENCH_BACKEND", default_value = "direct")]
    backend: BackendKind,

    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
    model: String,

    #[arg(long, env = "OPENAI_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    #[arg(long, env = "OPENAI_MAX_TOKENS", default_value_t = 512)]
    max_tokens: u32,

    /// Completions sampled per problem
    #[arg(short = 'n', long, env = "NUM_SAMPLES_PER_TASK", default_value_t = 10)]
    samples_per_task: usize,

    /// Only use the first N problems
    #[arg(long, env = "TASK_LIMIT")]
    limit: Option<usize>,

    /// Only use these task ids (comma separated); overrides --limit
    #[arg(long, env = "TASK_IDS", value_delimiter = ',')]
    task_ids: Vec<String>,

    /// Shuffle problems before selecting
    #[arg(long, env = "SHUFFLE_TASKS")]
    shuffle: bool,

    /// Seed for --shuffle
    #[arg(long, env = "TASK_SHUFFLE_SEED")]
    seed: Option<u64>,

    /// Generation calls in flight per problem
    #[arg(long, env = "CODEBENCH_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Attempts per sample, including the first
    #[arg(long, env = "CODEBENCH_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Tool-call turns for the function-calling backend
    #[arg(long, default_value_t = 4)]
    max_steps: usize,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Also write unsanitized completions
    #[arg(long)]
    emit_raw: bool,
}

#[derive(Args, Debug, Clone)]
struct SandboxArgs {
    /// Python interpreter used to execute programs
    #[arg(long, env = "CODEBENCH_PYTHON", default_value = "python3")]
    interpreter: String,

    /// Wall-clock limit per execution
    #[arg(long, env = "CODEBENCH_TIMEOUT_MS", default_value_t = 3000)]
    timeout_ms: u64,

    /// Executions in flight at once
    #[arg(long, env = "CODEBENCH_WORKERS", default_value_t = 4)]
    workers: usize,
}

impl SandboxArgs {
    fn config(&self) -> SandboxConfig {
        SandboxConfig {
            interpreter: self.interpreter.clone(),
            timeout_ms: self.timeout_ms,
            workers: self.workers,
        }
    }
}

impl GenerationArgs {
    fn run_config(&self, ks: &[usize], sandbox: SandboxConfig) -> RunConfig {
        RunConfig {
            corpus: self.corpus.clone(),
            output_dir: self.output_dir.clone(),
            backend: self.backend.to_string(),
            model: self.model.clone(),
            samples_per_task: self.samples_per_task,
            ks: ks_or_default(ks),
            filter: CorpusFilter {
                task_ids: self.task_ids.clone(),
                limit: self.limit,
                shuffle: self.shuffle,
                seed: self.seed,
            },
            sampler: SamplerConfig {
                concurrency: self.concurrency,
                params: SamplingParams {
                    temperature: self.temperature,
                    max_tokens: self.max_tokens,
                },
                retry: RetryPolicy {
                    max_attempts: self.max_attempts,
                    ..RetryPolicy::default()
                },
            },
            sandbox,
            emit_raw: self.emit_raw,
        }
    }

    fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            kind: self.backend,
            model: self.model.clone(),
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            max_steps: self.max_steps,
            ..BackendConfig::default()
        }
    }

    /// The canonical backend needs the corpus up front to look up
    /// reference solutions.
    fn generator(&self) -> Result<Arc<dyn Generator>> {
        let problems = if self.backend == BackendKind::Canonical {
            load_problems(&self.corpus)
                .with_context(|| format!("Failed to load corpus {:?}", self.corpus))?
        } else {
            Vec::new()
        };
        build_generator(&self.backend_config(), &problems)
            .with_context(|| format!("Failed to set up backend {}", self.backend))
    }
}

/// One `--k` value; pass@0 is undefined.
fn parse_k(value: &str) -> std::result::Result<usize, String> {
    match value.trim().parse::<usize>() {
        Ok(0) => Err("k must be at least 1".to_string()),
        Ok(k) => Ok(k),
        Err(e) => Err(e.to_string()),
    }
}

fn ks_or_default(ks: &[usize]) -> Vec<usize> {
    if ks.is_empty() {
        default_ks()
    } else {
        ks.to_vec()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    telemetry::init_tracing(cli.json, telemetry::default_level(cli.verbose));

    match cli.command {
        Commands::Run {
            generation,
            sandbox,
            k,
            results_csv,
            approach,
            benchmark,
        } => {
            cmd_run(
                &generation,
                &sandbox,
                &k,
                &results_csv,
                approach.as_deref(),
                &benchmark,
            )
            .await
        }
        Commands::Generate { generation } => cmd_generate(&generation).await,
        Commands::Evaluate {
            samples,
            problems,
            sandbox,
            k,
        } => cmd_evaluate(&samples, &problems, &sandbox, &k).await,
        Commands::Score {
            results,
            k,
            json_out,
        } => cmd_score(&results, &k, json_out.as_deref()),
    }
}

async fn cmd_run(
    generation: &GenerationArgs,
    sandbox: &SandboxArgs,
    ks: &[usize],
    results_csv: &Path,
    approach: Option<&str>,
    benchmark: &str,
) -> Result<()> {
    let config = generation.run_config(ks, sandbox.config());
    config.validate().context("Invalid run configuration")?;
    let generator = generation.generator()?;

    let summary = run_benchmark(&config, generator)
        .await
        .context("Benchmark run failed")?;

    print!(
        "{}",
        render_summary(&summary.score, Some(&summary.usage), &config.model)
    );
    println!("Results:  {}", summary.results_path.display());
    println!("Manifest: {}", summary.manifest_path.display());

    let tracker = ResultsTracker::new(results_csv);
    tracker.append(&RunRow {
        approach: approach.unwrap_or(&config.backend),
        benchmark,
        score: &summary.score,
        elapsed_secs: summary.duration.as_secs_f64(),
        usage: summary.usage,
        timestamp: Local::now().naive_local(),
        model: &config.model,
        tasks: summary.problems,
        samples_per_task: summary.samples_per_task,
    })?;
    info!(csv = %tracker.path().display(), run_id = %summary.run_id, "run recorded");
    Ok(())
}

async fn cmd_generate(generation: &GenerationArgs) -> Result<()> {
    let config = generation.run_config(&[], SandboxConfig::default());
    let generator = generation.generator()?;

    let generated = generate(&config, generator)
        .await
        .context("Generation failed")?;

    let ready = generated.samples.iter().filter(|s| s.is_ready()).count();
    println!(
        "Problems: {}  Samples: {}  Ready: {}",
        generated.problems.len(),
        generated.samples.len(),
        ready
    );
    println!(
        "Tokens: {} input + {} output",
        generated.usage.input_tokens, generated.usage.output_tokens
    );
    println!("Samples:  {}", generated.samples_path.display());
    println!("Problems: {}", generated.problems_path.display());
    if let Some(raw) = &generated.raw_samples_path {
        println!("Raw:      {}", raw.display());
    }
    Ok(())
}

async fn cmd_evaluate(
    samples: &Path,
    problems: &Path,
    sandbox: &SandboxArgs,
    ks: &[usize],
) -> Result<()> {
    let (evaluation, results_path) =
        evaluate_files(samples, problems, sandbox.config(), &ks_or_default(ks))
            .await
            .with_context(|| format!("Failed to evaluate {:?}", samples))?;

    print!("{}", render_summary(&evaluation.score, None, ""));
    println!("Results: {}", results_path.display());
    Ok(())
}

fn cmd_score(results: &Path, ks: &[usize], json_out: Option<&Path>) -> Result<()> {
    let report = score_results_file(results, &ks_or_default(ks))
        .with_context(|| format!("Failed to score {:?}", results))?;

    print!("{}", render_summary(&report, None, ""));
    if let Some(path) = json_out {
        write_score_json(path, &report)?;
        println!("Score: {}", path.display());
    }
    Ok(())
}
