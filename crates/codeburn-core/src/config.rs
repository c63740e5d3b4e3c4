use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{CodeBurnError, Result};

/// Environment variable that overrides the interpreter used for syntax
/// checks and sandboxed execution.
pub const PYTHON_ENV: &str = "CODEBURN_PYTHON";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeBurnConfig {
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

impl CodeBurnConfig {
    /// Load a JSON config file. Keys missing from the file keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CodeBurnConfig = serde_json::from_str(&content)?;
        config.validate()?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load `path` when given, otherwise fall back to built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };

        if let Ok(python) = std::env::var(PYTHON_ENV) {
            if !python.trim().is_empty() {
                config.evaluation.python_cmd = python;
            }
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let eval = &self.evaluation;
        check_timeout("execution_timeout_secs", eval.execution_timeout_secs)?;
        if eval.max_concurrency == 0 {
            return Err(CodeBurnError::Config(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if eval.max_reasonable_lines == 0 {
            return Err(CodeBurnError::Config(
                "max_reasonable_lines must be at least 1".to_string(),
            ));
        }
        check_timeout("request_timeout_secs", self.client.request_timeout_secs)?;
        Ok(())
    }
}

/// Timeouts must be positive and representable as a `Duration`.
fn check_timeout(name: &str, secs: f64) -> Result<()> {
    match secs > 0.0 && Duration::try_from_secs_f64(secs).is_ok() {
        true => Ok(()),
        false => Err(CodeBurnError::Config(format!(
            "{} must be a positive number of seconds, got {}",
            name, secs
        ))),
    }
}

/// Unvalidated values saturate instead of panicking.
fn to_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(match secs > 0.0 {
        true => Duration::MAX,
        false => Duration::ZERO,
    })
}

fn default_execution_timeout() -> f64 {
    5.0
}

fn default_max_reasonable_lines() -> usize {
    200
}

fn default_python_cmd() -> String {
    "python3".to_string()
}

fn default_max_concurrency() -> usize {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default = "default_execution_timeout")]
    pub execution_timeout_secs: f64,
    #[serde(default = "default_max_reasonable_lines")]
    pub max_reasonable_lines: usize,
    #[serde(default = "default_python_cmd")]
    pub python_cmd: String,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl EvaluationConfig {
    pub fn execution_timeout(&self) -> Duration {
        to_duration(self.execution_timeout_secs)
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            execution_timeout_secs: default_execution_timeout(),
            max_reasonable_lines: default_max_reasonable_lines(),
            python_cmd: default_python_cmd(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

fn default_request_timeout() -> f64 {
    60.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: f64,
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        to_duration(self.request_timeout_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_true")]
    pub export_json: bool,
    #[serde(default = "default_true")]
    pub export_csv: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            export_json: true,
            export_csv: true,
        }
    }
}
