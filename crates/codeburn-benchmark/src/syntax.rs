use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::code_executor::{ExecutorError, Result};

/// Compiles stdin to bytecode without running it. `compile` also reports
/// errors that only surface after parsing, such as `return` outside a
/// function.
const CHECK_SCRIPT: &str =
    "import sys\nsource = sys.stdin.buffer.read()\ncompile(source, '<generated>', 'exec', dont_inherit=True)\n";

const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Syntax checker backed by the interpreter's own compiler front end.
#[derive(Debug, Clone)]
pub struct SyntaxValidator {
    python_cmd: String,
    timeout: Duration,
}

impl Default for SyntaxValidator {
    fn default() -> Self {
        Self::new("python3")
    }
}

impl SyntaxValidator {
    pub fn new(python_cmd: impl Into<String>) -> Self {
        Self {
            python_cmd: python_cmd.into(),
            timeout: DEFAULT_CHECK_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `true` iff `code` compiles. Blank input, compile errors and any
    /// failure to run the checker all count as `false`.
    pub async fn check_syntax(&self, code: &str) -> bool {
        match self.try_check_syntax(code).await {
            Ok(ok) => ok,
            Err(e) => {
                tracing::warn!("Syntax check could not run: {}", e);
                false
            }
        }
    }

    /// Like [`check_syntax`](Self::check_syntax), but a checker that cannot
    /// be started is an error rather than a rejection.
    pub async fn try_check_syntax(&self, code: &str) -> Result<bool> {
        if code.trim().is_empty() {
            return Ok(false);
        }
        self.compile(code).await
    }

    async fn compile(&self, code: &str) -> Result<bool> {
        let path_env = std::env::var("PATH")
            .unwrap_or_else(|_| "/usr/bin:/usr/local/bin:/bin".to_string());

        let mut child = Command::new(&self.python_cmd)
            .args(["-I", "-c", CHECK_SCRIPT])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .env_clear()
            .env("PATH", &path_env)
            .kill_on_drop(true)
            .spawn()
            .map_err(ExecutorError::Spawn)?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("checker stdin unavailable"))?;
        let source = code.as_bytes().to_vec();

        let run = async move {
            stdin.write_all(&source).await?;
            drop(stdin);
            child.wait_with_output().await
        };

        match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(output)) => {
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    tracing::debug!(
                        "Syntax check rejected code: {}",
                        stderr.lines().last().unwrap_or_default()
                    );
                }
                Ok(output.status.success())
            }
            Ok(Err(e)) => Err(ExecutorError::Io(e)),
            Err(_) => {
                tracing::warn!("Syntax check timed out after {:?}", self.timeout);
                Ok(false)
            }
        }
    }
}
