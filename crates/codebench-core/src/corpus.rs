//! Problem corpus loading (HumanEval JSONL, plain or gzip-compressed).

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::domain::{BenchError, Problem, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Which problems of a corpus a run uses.
///
/// Shuffling happens first; then an explicit id list wins over `limit`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CorpusFilter {
    pub task_ids: Vec<String>,
    pub limit: Option<usize>,
    pub shuffle: bool,
    pub seed: Option<u64>,
}

impl CorpusFilter {
    pub fn apply(&self, mut problems: Vec<Problem>) -> Result<Vec<Problem>> {
        if self.shuffle {
            match self.seed {
                Some(seed) => problems.shuffle(&mut StdRng::seed_from_u64(seed)),
                None => problems.shuffle(&mut rand::thread_rng()),
            }
        }

        if !self.task_ids.is_empty() {
            let known: HashSet<&str> = problems.iter().map(|p| p.task_id.as_str()).collect();
            if let Some(missing) = self.task_ids.iter().find(|id| !known.contains(id.as_str())) {
                return Err(BenchError::UnknownTask(missing.clone()));
            }
            let wanted: HashSet<&str> = self.task_ids.iter().map(String::as_str).collect();
            problems.retain(|p| wanted.contains(p.task_id.as_str()));
            return Ok(problems);
        }

        if let Some(limit) = self.limit {
            problems.truncate(limit);
        }
        Ok(problems)
    }
}

/// Load every problem from `path`.
pub fn load_problems(path: &Path) -> Result<Vec<Problem>> {
    let bytes = std::fs::read(path).map_err(|e| BenchError::corpus(path, e))?;
    let text = if bytes.starts_with(&GZIP_MAGIC) {
        let mut text = String::new();
        GzDecoder::new(bytes.as_slice())
            .read_to_string(&mut text)
            .map_err(|e| BenchError::corpus(path, format!("gzip: {}", e)))?;
        text
    } else {
        String::from_utf8(bytes).map_err(|e| BenchError::corpus(path, e))?
    };

    let mut problems = Vec::new();
    let mut seen = HashSet::new();
    for (n, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let problem: Problem = serde_json::from_str(line)
            .map_err(|e| BenchError::corpus(path, format!("line {}: {}", n + 1, e)))?;
        if !seen.insert(problem.task_id.clone()) {
            return Err(BenchError::corpus(
                path,
                format!("line {}: duplicate task_id {}", n + 1, problem.task_id),
            ));
        }
        problems.push(problem);
    }

    if problems.is_empty() {
        return Err(BenchError::corpus(path, "corpus contains no problems"));
    }
    tracing::debug!(path = %path.display(), problems = problems.len(), "corpus loaded");
    Ok(problems)
}

/// Load `path` and apply `filter`.
pub fn load_corpus(path: &Path, filter: &CorpusFilter) -> Result<Vec<Problem>> {
    filter.apply(load_problems(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn line(id: &str) -> String {
        format!(
            r#"{{"task_id":"{id}","prompt":"def f():\n","canonical_solution":"    return 1\n","test":"def check(c):\n    assert c() == 1\n","entry_point":"f"}}"#
        )
    }

    fn corpus_text(n: usize) -> String {
        (0..n)
            .map(|i| line(&format!("HumanEval/{i}")))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn ids(problems: &[Problem]) -> Vec<String> {
        problems.iter().map(|p| p.task_id.clone()).collect()
    }

    #[test]
    fn test_load_plain_jsonl() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("problems.jsonl");
        std::fs::write(&path, corpus_text(3) + "\n\n").expect("write");
        let problems = load_problems(&path).expect("load");
        assert_eq!(ids(&problems), vec!["HumanEval/0", "HumanEval/1", "HumanEval/2"]);
    }

    #[test]
    fn test_load_gzip_by_magic_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("HumanEval.jsonl");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(corpus_text(2).as_bytes()).expect("gzip");
        std::fs::write(&path, encoder.finish().expect("finish")).expect("write");
        assert_eq!(load_problems(&path).expect("load").len(), 2);
    }

    #[test]
    fn test_malformed_line_names_line_number() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, format!("{}\n{{not json", line("A"))).expect("write");
        match load_problems(&path) {
            Err(BenchError::CorpusLoad { reason, .. }) => assert!(reason.contains("line 2")),
            other => panic!("expected CorpusLoad, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_is_corpus_error() {
        let err = load_problems(Path::new("/nonexistent/codebench.jsonl")).expect_err("missing");
        assert!(matches!(err, BenchError::CorpusLoad { .. }));
    }

    #[test]
    fn test_duplicate_task_id_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dup.jsonl");
        std::fs::write(&path, format!("{}\n{}", line("A"), line("A"))).expect("write");
        assert!(matches!(
            load_problems(&path),
            Err(BenchError::CorpusLoad { .. })
        ));
    }

    #[test]
    fn test_empty_corpus_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("empty.jsonl");
        std::fs::write(&path, "\n").expect("write");
        assert!(load_problems(&path).is_err());
    }

    fn problems(n: usize) -> Vec<Problem> {
        corpus_text(n)
            .lines()
            .map(|l| serde_json::from_str(l).expect("parse"))
            .collect()
    }

    #[test]
    fn test_limit_takes_first_n() {
        let filter = CorpusFilter {
            limit: Some(2),
            ..CorpusFilter::default()
        };
        let out = filter.apply(problems(5)).expect("apply");
        assert_eq!(ids(&out), vec!["HumanEval/0", "HumanEval/1"]);
    }

    #[test]
    fn test_task_ids_win_over_limit() {
        let filter = CorpusFilter {
            task_ids: vec!["HumanEval/4".into(), "HumanEval/1".into(), "HumanEval/3".into()],
            limit: Some(1),
            ..CorpusFilter::default()
        };
        let out = filter.apply(problems(5)).expect("apply");
        assert_eq!(ids(&out), vec!["HumanEval/1", "HumanEval/3", "HumanEval/4"]);
    }

    #[test]
    fn test_unknown_task_id_is_error() {
        let filter = CorpusFilter {
            task_ids: vec!["HumanEval/99".into()],
            ..CorpusFilter::default()
        };
        match filter.apply(problems(2)) {
            Err(BenchError::UnknownTask(id)) => assert_eq!(id, "HumanEval/99"),
            other => panic!("expected UnknownTask, got {:?}", other),
        }
    }

    #[test]
    fn test_seeded_shuffle_is_deterministic() {
        let filter = CorpusFilter {
            shuffle: true,
            seed: Some(42),
            limit: Some(5),
            ..CorpusFilter::default()
        };
        let a = filter.apply(problems(20)).expect("apply");
        let b = filter.apply(problems(20)).expect("apply");
        assert_eq!(ids(&a), ids(&b));
        assert_eq!(a.len(), 5);
    }
}
