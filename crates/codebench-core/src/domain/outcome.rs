//! Execution outcomes.

use serde::{Deserialize, Serialize};

/// Verdict of running one completion against its problem's hidden tests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Program ran to completion and every assertion held.
    Passed,
    /// Program ran to completion but an assertion failed.
    Failed,
    /// Wall-clock limit exceeded; the process was killed.
    TimedOut,
    /// Any other fault: syntax error, uncaught exception, spawn failure.
    Error,
}

impl OutcomeStatus {
    pub fn is_pass(&self) -> bool {
        matches!(self, OutcomeStatus::Passed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Passed => "passed",
            OutcomeStatus::Failed => "failed",
            OutcomeStatus::TimedOut => "timed_out",
            OutcomeStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable execution record per sample.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionOutcome {
    pub task_id: String,
    pub sample_index: usize,
    pub completion: String,
    pub status: OutcomeStatus,
    pub detail: Option<String>,
    pub duration_ms: u64,
}

impl ExecutionOutcome {
    pub fn passed(&self) -> bool {
        self.status.is_pass()
    }

    /// HumanEval-style result string: `passed`, `failed: <detail>`,
    /// `timed out`, or `error: <detail>`.
    pub fn result_label(&self) -> String {
        match (self.status, self.detail.as_deref()) {
            (OutcomeStatus::Passed, _) => "passed".to_string(),
            (OutcomeStatus::TimedOut, _) => "timed out".to_string(),
            (OutcomeStatus::Failed, Some(d)) => format!("failed: {}", d),
            (OutcomeStatus::Failed, None) => "failed".to_string(),
            (OutcomeStatus::Error, Some(d)) => format!("error: {}", d),
            (OutcomeStatus::Error, None) => "error".to_string(),
        }
    }
}
