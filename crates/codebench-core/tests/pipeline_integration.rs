//! End-to-end runs over a small on-disk corpus with scripted generators.

use std::path::Path;
use std::sync::Arc;

use codebench_core::artifacts::{read_results, read_samples};
use codebench_core::fakes::ScriptedGenerator;
use codebench_core::{
    evaluate_files, generate, run_benchmark, score_results_file, BenchError, CorpusFilter,
    OutcomeStatus, Problem, RunConfig, RunManifest, SandboxConfig,
};

fn python_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn problems() -> Vec<Problem> {
    vec![
        Problem {
            task_id: "Mini/0".to_string(),
            prompt: "def add(a, b):\n    \"\"\"Add two numbers.\"\"\"\n".to_string(),
            canonical_solution: "    return a + b\n".to_string(),
            test: "def check(candidate):\n    assert candidate(2, 3) == 5\n".to_string(),
            entry_point: "add".to_string(),
        },
        Problem {
            task_id: "Mini/1".to_string(),
            prompt: "def double(x):\n    \"\"\"Twice x.\"\"\"\n".to_string(),
            canonical_solution: "    return 2 * x\n".to_string(),
            test: "def check(candidate):\n    assert candidate(4) == 8\n".to_string(),
            entry_point: "double".to_string(),
        },
    ]
}

fn write_corpus(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("mini.jsonl");
    let content: String = problems()
        .iter()
        .map(|p| serde_json::to_string(p).expect("serialize problem") + "\n")
        .collect();
    std::fs::write(&path, content).expect("write corpus");
    path
}

fn config(dir: &Path, samples_per_task: usize) -> RunConfig {
    RunConfig {
        corpus: write_corpus(dir),
        output_dir: dir.join("runs"),
        backend: "scripted".to_string(),
        model: "fake-model".to_string(),
        samples_per_task,
        ks: vec![1, 2, 5],
        filter: CorpusFilter::default(),
        emit_raw: true,
        ..RunConfig::default()
    }
}

/// Mini/0 passes on even indices, Mini/1 always fails.
fn generator() -> ScriptedGenerator {
    ScriptedGenerator::new("    return 0\n")
        .push("Mini/0", 0, Ok("```python\n    return a + b\n```".into()))
        .push("Mini/0", 2, Ok("def add(a, b):\n    return a + b\n".into()))
}

#[tokio::test]
async fn full_run_writes_consistent_artifacts() {
    if !python_available() {
        return;
    }
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config(dir.path(), 3);

    let summary = run_benchmark(&config, Arc::new(generator()))
        .await
        .expect("run");

    assert_eq!(summary.problems, 2);
    assert_eq!(summary.outcomes, 6);
    assert_eq!(summary.passed, 2);
    assert_eq!(summary.usage.requests, 6);

    let per_task: Vec<(String, usize, usize)> = summary
        .score
        .problems
        .iter()
        .map(|p| (p.task_id.clone(), p.n, p.c))
        .collect();
    assert_eq!(
        per_task,
        vec![("Mini/0".to_string(), 3, 2), ("Mini/1".to_string(), 3, 0)]
    );
    let pass1 = summary.score.value(1).expect("pass@1");
    assert!((pass1 - (2.0 / 3.0) / 2.0).abs() < 1e-9);
    assert_eq!(summary.score.value(5), None);

    let results = read_results(&summary.results_path).expect("results");
    assert_eq!(results.len(), 6);
    assert!(results
        .iter()
        .filter(|r| r.task_id == "Mini/1")
        .all(|r| r.result.starts_with("failed")));

    let manifest = RunManifest::read(&summary.manifest_path).expect("manifest");
    assert_eq!(manifest.run_id, summary.run_id);
    assert_eq!(manifest.outcomes, 6);
    let kinds: Vec<&str> = manifest.artifacts.iter().map(|a| a.kind.as_str()).collect();
    assert_eq!(kinds, vec!["samples", "problems", "results", "raw_samples"]);
    for artifact in &manifest.artifacts {
        assert!(artifact.verify().expect("verify"), "{:?} changed", artifact.path);
    }
}

#[tokio::test]
async fn generate_then_evaluate_files() {
    if !python_available() {
        return;
    }
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config(dir.path(), 2);

    let generated = generate(&config, Arc::new(generator()))
        .await
        .expect("generate");
    assert_eq!(generated.samples.len(), 4);
    let records = read_samples(&generated.samples_path).expect("samples");
    assert_eq!(records.len(), 4);
    assert_eq!(records[0].completion, "    return a + b\n");

    let (evaluation, results_path) = evaluate_files(
        &generated.samples_path,
        &generated.problems_path,
        SandboxConfig::default(),
        &[1, 2],
    )
    .await
    .expect("evaluate");
    assert_eq!(evaluation.outcomes.len(), 4);
    assert_eq!(evaluation.passed(), 1);
    assert_eq!(evaluation.outcomes[0].status, OutcomeStatus::Passed);
    assert!(results_path
        .to_string_lossy()
        .ends_with("_results.jsonl"));

    let rescored = score_results_file(&results_path, &[1, 2]).expect("score");
    assert_eq!(rescored.value(1), evaluation.score.value(1));
    assert_eq!(rescored.value(2), Some(0.5));
}

#[tokio::test]
async fn unusable_interpreter_fails_before_generation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = config(dir.path(), 1);
    config.sandbox.interpreter = "codebench-no-such-interpreter".to_string();
    let generator = Arc::new(generator());

    match run_benchmark(&config, generator.clone()).await {
        Err(BenchError::Configuration(msg)) => assert!(msg.contains("not usable"), "{msg}"),
        other => panic!("expected Configuration error, got {:?}", other),
    }
    assert!(generator.calls().is_empty());
    assert!(!dir.path().join("runs").exists());
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = RunConfig {
        samples_per_task: 0,
        ..config(dir.path(), 1)
    };
    let result = run_benchmark(&config, Arc::new(generator())).await;
    assert!(matches!(result, Err(BenchError::Configuration(_))));
}

#[test]
fn zero_k_is_rejected_when_scoring() {
    let dir = tempfile::tempdir().expect("tempdir");
    let results = dir.path().join("run_results.jsonl");
    std::fs::write(
        &results,
        "{\"task_id\":\"Mini/0\",\"completion\":\"\",\"result\":\"passed\",\"passed\":true}\n",
    )
    .expect("write results");

    match score_results_file(&results, &[1, 0]) {
        Err(BenchError::Configuration(msg)) => assert!(msg.contains("at least 1"), "{msg}"),
        other => panic!("expected Configuration error, got {:?}", other),
    }
    assert!(score_results_file(&results, &[1]).is_ok());
}

#[tokio::test]
async fn unknown_task_filter_is_rejected() {
    if !python_available() {
        return;
    }
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = config(dir.path(), 1);
    config.filter.task_ids = vec!["Mini/9".to_string()];
    match run_benchmark(&config, Arc::new(generator())).await {
        Err(BenchError::UnknownTask(id)) => assert_eq!(id, "Mini/9"),
        other => panic!("expected UnknownTask, got {:?}", other),
    }
}
