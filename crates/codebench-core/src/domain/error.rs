//! Run-level error taxonomy for codebench.
//!
//! Only the conditions in this enum abort a run. Per-sample failures
//! (generation, sanitization, execution) degrade the sample instead and are
//! modelled by `SampleStatus` and `OutcomeStatus`.

use std::path::PathBuf;

/// Fatal codebench errors.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("failed to load corpus {path:?}: {reason}")]
    CorpusLoad { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("sample references unknown task: {0}")]
    UnknownTask(String),

    #[error("problem {0} has no samples")]
    MissingSamples(String),

    #[error("expected {expected} outcome records, got {actual}")]
    OutcomeCountMismatch { expected: usize, actual: usize },

    #[error("malformed artifact {path:?} line {line}: {reason}")]
    MalformedArtifact {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("cannot access artifact {path:?}: {source}")]
    ArtifactIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BenchError {
    pub(crate) fn corpus(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        BenchError::CorpusLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn artifact_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BenchError::ArtifactIo {
            path: path.into(),
            source,
        }
    }
}

/// Result type for codebench operations.
pub type Result<T> = std::result::Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corpus_error_display_names_path() {
        let err = BenchError::corpus("data/HumanEval.jsonl.gz", "unexpected EOF");
        let msg = err.to_string();
        assert!(msg.contains("HumanEval.jsonl.gz"));
        assert!(msg.contains("unexpected EOF"));
    }

    #[test]
    fn test_outcome_count_mismatch_display() {
        let err = BenchError::OutcomeCountMismatch {
            expected: 20,
            actual: 19,
        };
        let msg = err.to_string();
        assert!(msg.contains("20"));
        assert!(msg.contains("19"));
    }

    #[test]
    fn test_configuration_error() {
        let err = BenchError::Configuration("samples per task must be at least 1".to_string());
        assert!(err.to_string().contains("invalid configuration"));
    }
}
