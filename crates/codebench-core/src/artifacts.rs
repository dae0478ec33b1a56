//! Persisted run artifacts: JSONL samples, problem subsets and results,
//! the run folder layout, and the run manifest.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::{BenchError, ExecutionOutcome, Problem, Result, Sample, SampleStatus};
use crate::scorer::{ScoreReport, Verdicted};
use crate::usage::UsageSnapshot;

/// One line of a samples file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SampleRecord {
    #[serde(alias = "problem_id")]
    pub task_id: String,
    pub completion: String,
    #[serde(default, skip_serializing_if = "SampleStatus::is_ready")]
    pub status: SampleStatus,
}

impl SampleRecord {
    /// Record for `sample`; with `raw` set, the unsanitized backend text is
    /// written as the completion.
    pub fn from_sample(sample: &Sample, raw: bool) -> Self {
        Self {
            task_id: sample.task_id.clone(),
            completion: if raw {
                sample.raw.clone()
            } else {
                sample.completion.clone()
            },
            status: sample.status.clone(),
        }
    }
}

/// One line of a results file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultRecord {
    pub task_id: String,
    pub completion: String,
    /// `passed`, `failed: <detail>`, `timed out` or `error: <detail>`.
    pub result: String,
    pub passed: bool,
}

impl From<&ExecutionOutcome> for ResultRecord {
    fn from(outcome: &ExecutionOutcome) -> Self {
        Self {
            task_id: outcome.task_id.clone(),
            completion: outcome.completion.clone(),
            result: outcome.result_label(),
            passed: outcome.passed(),
        }
    }
}

impl Verdicted for ResultRecord {
    fn is_pass(&self) -> bool {
        self.passed
    }
}

/// Write one JSON document per line, creating parent directories.
pub fn write_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| BenchError::artifact_io(parent, e))?;
    }
    let file = File::create(path).map_err(|e| BenchError::artifact_io(path, e))?;
    let mut out = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")
            .map_err(|e| BenchError::artifact_io(path, e))?;
    }
    out.flush().map_err(|e| BenchError::artifact_io(path, e))?;
    Ok(())
}

/// Read a JSONL file; blank lines are skipped.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path).map_err(|e| BenchError::artifact_io(path, e))?;
    let mut records = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| BenchError::artifact_io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| BenchError::MalformedArtifact {
            path: path.to_path_buf(),
            line: n + 1,
            reason: e.to_string(),
        })?;
        records.push(record);
    }
    Ok(records)
}

pub fn write_samples(path: &Path, samples: &[Sample], raw: bool) -> Result<()> {
    let records: Vec<SampleRecord> = samples
        .iter()
        .map(|s| SampleRecord::from_sample(s, raw))
        .collect();
    write_jsonl(path, &records)
}

pub fn read_samples(path: &Path) -> Result<Vec<SampleRecord>> {
    read_jsonl(path)
}

pub fn write_problems(path: &Path, problems: &[Problem]) -> Result<()> {
    write_jsonl(path, problems)
}

pub fn write_results(path: &Path, outcomes: &[ExecutionOutcome]) -> Result<()> {
    let records: Vec<ResultRecord> = outcomes.iter().map(ResultRecord::from).collect();
    write_jsonl(path, &records)
}

pub fn read_results(path: &Path) -> Result<Vec<ResultRecord>> {
    read_jsonl(path)
}

/// `<dir>/<stem>_results.jsonl` next to a samples file.
pub fn results_path_for(samples: &Path) -> PathBuf {
    let stem = samples
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "samples".to_string());
    samples.with_file_name(format!("{}_results.jsonl", stem))
}

fn path_component(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

/// Folder layout of one run under an output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    pub root: PathBuf,
    pub stem: String,
}

impl RunLayout {
    /// Files are named `<backend>_<model>_<YYYYmmdd_HHMMSS>`.
    pub fn new(root: impl Into<PathBuf>, backend: &str, model: &str, at: NaiveDateTime) -> Self {
        Self {
            root: root.into(),
            stem: format!(
                "{}_{}_{}",
                path_component(backend),
                path_component(model),
                at.format("%Y%m%d_%H%M%S")
            ),
        }
    }

    pub fn create(&self) -> Result<()> {
        for dir in [self.samples_dir(), self.problems_dir(), self.results_dir()] {
            std::fs::create_dir_all(&dir).map_err(|e| BenchError::artifact_io(&dir, e))?;
        }
        Ok(())
    }

    pub fn samples_dir(&self) -> PathBuf {
        self.root.join("samples")
    }

    pub fn problems_dir(&self) -> PathBuf {
        self.root.join("problems")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.root.join("results")
    }

    pub fn samples_path(&self) -> PathBuf {
        self.samples_dir().join(format!("{}.jsonl", self.stem))
    }

    pub fn raw_samples_path(&self) -> PathBuf {
        self.samples_dir().join(format!("{}_raw.jsonl", self.stem))
    }

    pub fn problems_path(&self) -> PathBuf {
        self.problems_dir()
            .join(format!("{}_problems.jsonl", self.stem))
    }

    pub fn results_path(&self) -> PathBuf {
        self.results_dir()
            .join(format!("{}_results.jsonl", self.stem))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.results_dir()
            .join(format!("{}_manifest.json", self.stem))
    }
}

/// Content digest of one persisted artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactDigest {
    pub kind: String,
    pub path: PathBuf,
    pub sha256: String,
    pub bytes: u64,
}

impl ArtifactDigest {
    pub fn of_file(kind: &str, path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| BenchError::artifact_io(path, e))?;
        Ok(Self {
            kind: kind.to_string(),
            path: path.to_path_buf(),
            sha256: hex::encode(Sha256::digest(&data)),
            bytes: data.len() as u64,
        })
    }

    /// Whether the file on disk still matches the recorded digest.
    pub fn verify(&self) -> Result<bool> {
        Ok(Self::of_file(&self.kind, &self.path)?.sha256 == self.sha256)
    }
}

/// Summary of one run, written as pretty JSON next to its results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunManifest {
    pub run_id: Uuid,
    pub backend: String,
    pub model: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub problems: usize,
    pub samples_per_task: usize,
    pub outcomes: usize,
    pub passed: usize,
    pub usage: UsageSnapshot,
    pub score: ScoreReport,
    pub artifacts: Vec<ArtifactDigest>,
}

impl RunManifest {
    pub fn write(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| BenchError::artifact_io(path, e))
    }

    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BenchError::artifact_io(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OutcomeStatus, TokenUsage};
    use chrono::NaiveDate;

    fn sample(index: usize, status: SampleStatus) -> Sample {
        Sample {
            task_id: "HumanEval/0".to_string(),
            index,
            completion: "    return 1\n".to_string(),
            raw: "```python\n    return 1\n```".to_string(),
            usage: TokenUsage::new(3, 4),
            latency_ms: 7,
            status,
        }
    }

    #[test]
    fn test_ready_sample_record_omits_status() {
        let record = SampleRecord::from_sample(&sample(0, SampleStatus::Ready), false);
        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["task_id"], "HumanEval/0");
        assert_eq!(json["completion"], "    return 1\n");
        assert!(json.get("status").is_none());
    }

    #[test]
    fn test_raw_emission_uses_backend_text() {
        let record = SampleRecord::from_sample(&sample(0, SampleStatus::Ready), true);
        assert_eq!(record.completion, "```python\n    return 1\n```");
    }

    #[test]
    fn test_sample_record_accepts_problem_id_alias() {
        let record: SampleRecord =
            serde_json::from_str(r#"{"problem_id":"HumanEval/5","completion":"    pass\n"}"#)
                .expect("deserialize");
        assert_eq!(record.task_id, "HumanEval/5");
        assert!(record.status.is_ready());
    }

    #[test]
    fn test_samples_file_round_trip_keeps_status() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/samples.jsonl");
        let samples = vec![
            sample(0, SampleStatus::Ready),
            sample(
                1,
                SampleStatus::Unsanitizable {
                    reason: "completion contains no code".into(),
                },
            ),
        ];
        write_samples(&path, &samples, false).expect("write");
        let records = read_samples(&path).expect("read");
        assert_eq!(records.len(), 2);
        assert!(records[0].status.is_ready());
        assert!(matches!(records[1].status, SampleStatus::Unsanitizable { .. }));
    }

    #[test]
    fn test_results_records() {
        let outcome = ExecutionOutcome {
            task_id: "HumanEval/0".into(),
            sample_index: 0,
            completion: "    return 2\n".into(),
            status: OutcomeStatus::Failed,
            detail: Some("AssertionError".into()),
            duration_ms: 40,
        };
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("results.jsonl");
        write_results(&path, &[outcome]).expect("write");
        let records = read_results(&path).expect("read");
        assert_eq!(records[0].result, "failed: AssertionError");
        assert!(!records[0].passed);
    }

    #[test]
    fn test_malformed_line_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("results.jsonl");
        std::fs::write(
            &path,
            "{\"task_id\":\"A\",\"completion\":\"\",\"result\":\"passed\",\"passed\":true}\n\n[1,2]\n",
        )
        .expect("write");
        match read_results(&path) {
            Err(BenchError::MalformedArtifact { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected MalformedArtifact, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_artifact_names_path() {
        let err = read_results(Path::new("/nonexistent/results.jsonl")).expect_err("missing");
        assert!(err.to_string().contains("/nonexistent/results.jsonl"));
    }

    #[test]
    fn test_run_layout_names() {
        let at = NaiveDate::from_ymd_opt(2026, 3, 14)
            .and_then(|d| d.and_hms_opt(9, 26, 53))
            .expect("valid timestamp");
        let layout = RunLayout::new("/tmp/out", "function-calling", "org/model:latest", at);
        assert_eq!(layout.stem, "function-calling_org-model-latest_20260314_092653");
        assert_eq!(
            layout.samples_path(),
            PathBuf::from("/tmp/out/samples/function-calling_org-model-latest_20260314_092653.jsonl")
        );
        assert!(layout
            .results_path()
            .to_string_lossy()
            .ends_with("results/function-calling_org-model-latest_20260314_092653_results.jsonl"));
    }

    #[test]
    fn test_results_path_for_samples_file() {
        assert_eq!(
            results_path_for(Path::new("out/samples/run_1.jsonl")),
            PathBuf::from("out/samples/run_1_results.jsonl")
        );
    }

    #[test]
    fn test_digest_of_known_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("abc.txt");
        std::fs::write(&path, "abc").expect("write");
        let digest = ArtifactDigest::of_file("test", &path).expect("digest");
        assert_eq!(
            digest.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(digest.bytes, 3);
        assert!(digest.verify().expect("verify"));
        std::fs::write(&path, "abd").expect("rewrite");
        assert!(!digest.verify().expect("verify"));
    }
}
