//! Execution sandbox: run one completed program in a child interpreter.
//!
//! Each execution gets a fresh temporary working directory, closed stdin,
//! file-backed output and a wall-clock limit. On unix the child leads its
//! own process group, and the whole group is killed once the child exits
//! or the limit fires, so subprocesses it started never outlive the
//! verdict. Isolation is best-effort; this is not a security boundary.

use std::io::SeekFrom;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::process::Command;

use crate::domain::{BenchError, OutcomeStatus, Result};

const PROGRAM_FILE: &str = "program.py";
const STDOUT_FILE: &str = "stdout.log";
const STDERR_FILE: &str = "stderr.log";
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Bytes of stderr kept for classification; only the tail matters.
const STDERR_TAIL_BYTES: u64 = 64 * 1024;

/// How a finished child exited, plus the tail of its stderr.
#[derive(Debug)]
struct ChildExit {
    code: Option<i32>,
    stderr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SandboxConfig {
    /// Interpreter executable, looked up on `PATH`.
    pub interpreter: String,
    /// Wall-clock limit per execution (milliseconds).
    pub timeout_ms: u64,
    /// Executions in flight at once.
    pub workers: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            timeout_ms: 3_000,
            workers: 4,
        }
    }
}

impl SandboxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// The pieces assembled into one executable program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramSpec<'a> {
    pub prompt: &'a str,
    pub body: &'a str,
    pub tests: &'a str,
    pub entry_point: &'a str,
}

impl ProgramSpec<'_> {
    /// `prompt + body + "\n" + tests + "\n" + "check(<entry_point>)\n"`.
    pub fn render(&self) -> String {
        format!(
            "{}{}\n{}\ncheck({})\n",
            self.prompt, self.body, self.tests, self.entry_point
        )
    }
}

/// Classification of one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub status: OutcomeStatus,
    pub detail: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Sandbox {
    config: SandboxConfig,
}

impl Sandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Check that the interpreter can be launched; returns its version line.
    pub async fn probe(&self) -> Result<String> {
        let unavailable = |reason: String| {
            BenchError::Configuration(format!(
                "interpreter {:?} is not usable: {}",
                self.config.interpreter, reason
            ))
        };

        let child = Command::new(&self.config.interpreter)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| unavailable(e.to_string()))?;

        let output = tokio::time::timeout(PROBE_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| unavailable("timed out".to_string()))?
            .map_err(|e| unavailable(e.to_string()))?;

        if !output.status.success() {
            return Err(unavailable(format!("exited with {}", output.status)));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let version = if stdout.trim().is_empty() { stderr } else { stdout };
        Ok(version.trim().to_string())
    }

    /// Execute with the configured timeout.
    pub async fn execute(&self, program: &ProgramSpec<'_>) -> Verdict {
        self.execute_with_timeout(program, self.config.timeout())
            .await
    }

    /// Execute `program`, killing it after `timeout`.
    ///
    /// Never fails: infrastructure problems (temp dir, spawn) are reported
    /// as an `error` verdict for this sample only.
    pub async fn execute_with_timeout(
        &self,
        program: &ProgramSpec<'_>,
        timeout: Duration,
    ) -> Verdict {
        let start = Instant::now();
        let elapsed = |start: Instant| start.elapsed().as_millis() as u64;

        let workdir = match tempfile::Builder::new().prefix("codebench-").tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                return Verdict {
                    status: OutcomeStatus::Error,
                    detail: Some(format!("failed to create working directory: {}", e)),
                    duration_ms: elapsed(start),
                }
            }
        };

        let exit = match self.run_in(workdir.path(), &program.render(), timeout).await {
            Ok(Some(exit)) => exit,
            Ok(None) => {
                return Verdict {
                    status: OutcomeStatus::TimedOut,
                    detail: Some(format!("exceeded {} ms", timeout.as_millis())),
                    duration_ms: elapsed(start),
                }
            }
            Err(e) => {
                return Verdict {
                    status: OutcomeStatus::Error,
                    detail: Some(e),
                    duration_ms: elapsed(start),
                }
            }
        };

        let (status, detail) = classify(exit.code, &exit.stderr);
        Verdict {
            status,
            detail,
            duration_ms: elapsed(start),
        }
    }

    /// `Ok(None)` means the timeout fired and the child was killed.
    ///
    /// Waits on the child's exit, not on its output streams, so a lingering
    /// subprocess cannot hold the verdict open.
    async fn run_in(
        &self,
        dir: &Path,
        source: &str,
        timeout: Duration,
    ) -> std::result::Result<Option<ChildExit>, String> {
        let script = dir.join(PROGRAM_FILE);
        tokio::fs::write(&script, source)
            .await
            .map_err(|e| format!("failed to write program: {}", e))?;

        let stdout = std::fs::File::create(dir.join(STDOUT_FILE))
            .map_err(|e| format!("failed to create stdout log: {}", e))?;
        let stderr = std::fs::File::create(dir.join(STDERR_FILE))
            .map_err(|e| format!("failed to create stderr log: {}", e))?;

        let mut command = Command::new(&self.config.interpreter);
        command
            .arg(&script)
            .current_dir(dir)
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| format!("failed to spawn {}: {}", self.config.interpreter, e))?;
        let pid = child.id();

        let waited = tokio::time::timeout(timeout, child.wait()).await;
        if let Some(pid) = pid {
            kill_process_group(pid).await;
        }

        let status = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(format!("failed to wait for child: {}", e)),
            Err(_elapsed) => {
                // Group kill already delivered SIGKILL on unix; this reaps.
                let _ = child.kill().await;
                return Ok(None);
            }
        };

        let stderr = read_tail(&dir.join(STDERR_FILE), STDERR_TAIL_BYTES)
            .await
            .map_err(|e| format!("failed to read stderr: {}", e))?;
        Ok(Some(ChildExit {
            code: status.code(),
            stderr,
        }))
    }
}

/// SIGKILL every process in the group led by `pgid`.
///
/// A group with no members left is not an error.
#[cfg(unix)]
async fn kill_process_group(pgid: u32) {
    let group = format!("-{}", pgid);
    let result = Command::new("kill")
        .args(["-s", "KILL", "--", group.as_str()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if let Err(e) = result {
        tracing::debug!(pgid, error = %e, "process group kill failed");
    }
}

#[cfg(not(unix))]
async fn kill_process_group(_pgid: u32) {}

/// Read at most the last `limit` bytes of `path` as lossy UTF-8.
async fn read_tail(path: &Path, limit: u64) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let len = file.metadata().await?.len();
    if len > limit {
        file.seek(SeekFrom::Start(len - limit)).await?;
    }
    let mut buf = Vec::with_capacity(len.min(limit) as usize);
    file.take(limit).read_to_end(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Map an exit code and captured stderr to a status plus detail line.
///
/// `exit_code` is `None` when the child was killed by a signal.
pub fn classify(exit_code: Option<i32>, stderr: &str) -> (OutcomeStatus, Option<String>) {
    let last_line = stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string);

    match exit_code {
        Some(0) => (OutcomeStatus::Passed, None),
        Some(_) if stderr.contains("AssertionError") => (
            OutcomeStatus::Failed,
            last_line.or_else(|| Some("AssertionError".to_string())),
        ),
        Some(code) => (
            OutcomeStatus::Error,
            last_line.or_else(|| Some(format!("exit status {}", code))),
        ),
        None => (
            OutcomeStatus::Error,
            last_line.or_else(|| Some("terminated by signal".to_string())),
        ),
    }
}
