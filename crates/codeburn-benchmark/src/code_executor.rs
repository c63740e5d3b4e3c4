//! Sandboxed execution of generated code.
//!
//! Each run gets a fresh interpreter in isolated mode (`-I`), a cleared
//! environment, a closed stdin and a private temp directory as its working
//! directory. On unix the interpreter leads its own process group, and the
//! whole group is killed once the run ends, so nothing the code spawned
//! survives it. This is process isolation only; there is no seccomp,
//! namespace or cgroup confinement.

use std::io::Write;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use codeburn_core::{ExecutionError, ExecutionOutcome};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

/// Cap on captured stdout/stderr per stream.
pub const MAX_CAPTURED_BYTES: usize = 64 * 1024;

/// How long to wait for pipe readers after a timed-out child was killed.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Failures of the sandbox itself, as opposed to failures of the code.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("process-spawn-failure: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("sandbox IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExecutorError>;

/// A place generated code can be run. Swap implementations (container,
/// WASM, remote) without touching scoring.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, code: &str, timeout: Duration) -> Result<ExecutionOutcome>;
}

/// Runs code in a child `python3` process.
#[derive(Debug, Clone)]
pub struct SubprocessExecutor {
    python_cmd: String,
    max_output_bytes: usize,
}

impl Default for SubprocessExecutor {
    fn default() -> Self {
        Self::new("python3")
    }
}

impl SubprocessExecutor {
    pub fn new(python_cmd: impl Into<String>) -> Self {
        Self {
            python_cmd: python_cmd.into(),
            max_output_bytes: MAX_CAPTURED_BYTES,
        }
    }

    pub fn with_max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }
}

#[async_trait]
impl Executor for SubprocessExecutor {
    async fn execute(&self, code: &str, timeout: Duration) -> Result<ExecutionOutcome> {
        // Both are removed on drop, whichever way this function returns.
        let work_dir = tempfile::Builder::new().prefix("codeburn-").tempdir()?;
        let mut script = tempfile::Builder::new()
            .prefix("solution-")
            .suffix(".py")
            .tempfile_in(work_dir.path())?;
        script.write_all(code.as_bytes())?;
        script.flush()?;

        let path_env = std::env::var("PATH")
            .unwrap_or_else(|_| "/usr/bin:/usr/local/bin:/bin".to_string());

        let mut command = Command::new(&self.python_cmd);
        command
            .arg("-I")
            .arg(script.path())
            .current_dir(work_dir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env_clear()
            .env("PATH", &path_env)
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(ExecutorError::Spawn)?;
        let mut group = ProcessGroup::new(child.id());

        let start = Instant::now();
        let stdout_task = spawn_reader(child.stdout.take(), self.max_output_bytes);
        let stderr_task = spawn_reader(child.stderr.take(), self.max_output_bytes);

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => return Err(ExecutorError::Io(e)),
            Err(_) => None,
        };
        let duration_secs = start.elapsed().as_secs_f64();

        // Background processes left by the code die with the group, which
        // also closes any pipes they inherited.
        group.kill();
        if status.is_none() {
            // Reap the leader.
            if let Err(e) = child.kill().await {
                tracing::warn!("Failed to kill timed out child: {}", e);
            }
        }

        let stdout = collect(stdout_task).await;
        let stderr = collect(stderr_task).await;

        let outcome = match status {
            None => ExecutionOutcome {
                success: false,
                error: Some(ExecutionError::Timeout),
                stdout,
                stderr,
                duration_secs,
            },
            Some(status) if status.success() => ExecutionOutcome {
                success: true,
                error: None,
                stdout,
                stderr,
                duration_secs,
            },
            Some(status) => {
                let message = error_message(&stderr).unwrap_or_else(|| match status.code() {
                    Some(code) => format!("exit status {}", code),
                    None => "terminated by signal".to_string(),
                });
                ExecutionOutcome {
                    success: false,
                    error: Some(ExecutionError::RuntimeError(message)),
                    stdout,
                    stderr,
                    duration_secs,
                }
            }
        };

        tracing::debug!(
            success = outcome.success,
            duration_secs = outcome.duration_secs,
            "Sandboxed run finished"
        );
        Ok(outcome)
    }
}

/// The process group led by a spawned child. Killed at most once, and on
/// drop if the run is abandoned midway.
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_process_group(pgid);
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: killpg only sends a signal. ESRCH (group already gone) is fine.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::warn!("Failed to kill process group {}: {}", pgid, err);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

fn spawn_reader<R>(reader: Option<R>, limit: usize) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        match reader {
            Some(r) => read_capped(r, limit).await,
            None => String::new(),
        }
    })
}

/// Read to EOF, keeping at most `limit` bytes. The rest is drained so the
/// child never blocks on a full pipe.
async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> String {
    let mut kept = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut truncated = false;

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = limit.saturating_sub(kept.len());
                if n > room {
                    truncated = true;
                }
                kept.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }

    let mut text = String::from_utf8_lossy(&kept).into_owned();
    if truncated {
        text.push_str("\n[output truncated]");
    }
    text
}

async fn collect(task: JoinHandle<String>) -> String {
    let abort = task.abort_handle();
    match tokio::time::timeout(DRAIN_GRACE, task).await {
        Ok(joined) => joined.unwrap_or_default(),
        Err(_) => {
            // A grandchild still holds the pipe open.
            abort.abort();
            String::new()
        }
    }
}

/// The exception line of a traceback, e.g. `ZeroDivisionError: division by zero`.
fn error_message(stderr: &str) -> Option<String> {
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty() && *line != "[output truncated]")
        .map(str::to_string)
}
