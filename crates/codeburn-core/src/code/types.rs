use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Per-evaluation inputs and intermediates
// =============================================================================

/// What the dispatcher got back from a model endpoint.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawResponse {
    pub model_name: String,
    pub prompt_name: String,
    pub raw_text: String,
    pub response_time_seconds: f64,
    #[serde(default)]
    pub transport_error: Option<String>,
}

impl RawResponse {
    pub fn ok(
        model_name: impl Into<String>,
        prompt_name: impl Into<String>,
        raw_text: impl Into<String>,
        response_time_seconds: f64,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            prompt_name: prompt_name.into(),
            raw_text: raw_text.into(),
            response_time_seconds,
            transport_error: None,
        }
    }

    pub fn failed(
        model_name: impl Into<String>,
        prompt_name: impl Into<String>,
        error: impl Into<String>,
        response_time_seconds: f64,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            prompt_name: prompt_name.into(),
            raw_text: String::new(),
            response_time_seconds,
            transport_error: Some(error.into()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractedCode {
    pub source_text: String,
    pub found: bool,
}

impl ExtractedCode {
    pub fn found(source_text: impl Into<String>) -> Self {
        Self {
            source_text: source_text.into(),
            found: true,
        }
    }

    pub fn missing() -> Self {
        Self::default()
    }
}

/// Why a sandboxed run did not succeed. Infrastructure problems (the child
/// could not be spawned) are not represented here; the executor reports them
/// as errors instead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ExecutionError {
    Timeout,
    RuntimeError(String),
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::Timeout => write!(f, "timeout"),
            ExecutionError::RuntimeError(msg) => write!(f, "{}", msg),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub error: Option<ExecutionError>,
    pub stdout: String,
    pub stderr: String,
    pub duration_secs: f64,
}

impl ExecutionOutcome {
    /// Outcome used when execution was never attempted.
    pub fn skipped() -> Self {
        Self::default()
    }
}

// =============================================================================
// Scored output
// =============================================================================

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub syntax_correct: bool,
    pub execution_success: bool,
    #[serde(default)]
    pub execution_error: Option<String>,
    pub keywords_present: bool,
    #[serde(default)]
    pub matched_keywords: BTreeSet<String>,
    /// Share of expected keywords found; 1.0 when none are expected.
    #[serde(default)]
    pub keyword_match_ratio: f64,
    pub has_functions_or_classes: bool,
    pub has_error_handling: bool,
    pub has_documentation: bool,
    pub line_count: usize,
    pub code_quality: f64,
    pub total_score: f64,
}

impl Evaluation {
    pub fn zeroed() -> Self {
        Self::default()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The model never produced a response.
    Transport,
    /// The response contained nothing recognizable as code.
    NoCode,
    /// The sandbox itself could not run.
    Infrastructure,
}

impl FailureKind {
    pub fn label(&self) -> &'static str {
        match self {
            FailureKind::Transport => "transport",
            FailureKind::NoCode => "no_code",
            FailureKind::Infrastructure => "infrastructure",
        }
    }

    /// Whether this failure means the pair could not be evaluated at all,
    /// as opposed to being evaluated and scoring poorly.
    pub fn is_unevaluated(&self) -> bool {
        matches!(self, FailureKind::Transport | FailureKind::Infrastructure)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub model_name: String,
    pub prompt_name: String,
    pub success: bool,
    pub response_time: f64,
    pub extracted_code: String,
    /// stdout of a successful run, otherwise what the run reported on stderr.
    #[serde(default)]
    pub execution_output: String,
    pub evaluation: Evaluation,
    #[serde(default)]
    pub failure: Option<FailureKind>,
    #[serde(default)]
    pub error: Option<String>,
}

impl EvaluationResult {
    pub fn key(&self) -> (&str, &str) {
        (&self.model_name, &self.prompt_name)
    }

    pub fn to_row(&self) -> ResultRow {
        let eval = &self.evaluation;
        ResultRow {
            model_name: self.model_name.clone(),
            prompt_name: self.prompt_name.clone(),
            success: self.success,
            failure: self.failure.map(|f| f.label().to_string()).unwrap_or_default(),
            response_time: self.response_time,
            syntax_correct: eval.syntax_correct,
            execution_success: eval.execution_success,
            execution_error: eval.execution_error.clone().unwrap_or_default(),
            keywords_present: eval.keywords_present,
            matched_keywords: eval
                .matched_keywords
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(";"),
            keyword_match_ratio: eval.keyword_match_ratio,
            has_functions_or_classes: eval.has_functions_or_classes,
            has_error_handling: eval.has_error_handling,
            has_documentation: eval.has_documentation,
            line_count: eval.line_count,
            code_quality: eval.code_quality,
            total_score: eval.total_score,
        }
    }
}

/// Flat, primitive-only view of one result for CSV export.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub model_name: String,
    pub prompt_name: String,
    pub success: bool,
    pub failure: String,
    pub response_time: f64,
    pub syntax_correct: bool,
    pub execution_success: bool,
    pub execution_error: String,
    pub keywords_present: bool,
    pub matched_keywords: String,
    pub keyword_match_ratio: f64,
    pub has_functions_or_classes: bool,
    pub has_error_handling: bool,
    pub has_documentation: bool,
    pub line_count: usize,
    pub code_quality: f64,
    pub total_score: f64,
}
