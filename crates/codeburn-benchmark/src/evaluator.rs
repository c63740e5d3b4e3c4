use std::sync::Arc;
use std::time::Duration;

use codeburn_core::{
    Evaluation, EvaluationConfig, EvaluationResult, ExecutionOutcome, FailureKind, ModelSpec,
    Prompt, RawResponse,
};

use crate::code_executor::{Executor, ExecutorError, SubprocessExecutor};
use crate::extractor;
use crate::scorer::Scorer;
use crate::syntax::SyntaxValidator;

pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs extraction, syntax check, sandboxed execution and scoring for one
/// (model, prompt, response) tuple. Every failure ends up as data on the
/// returned result.
#[derive(Clone)]
pub struct Evaluator {
    syntax: SyntaxValidator,
    executor: Arc<dyn Executor>,
    scorer: Scorer,
    execution_timeout: Duration,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(
            SyntaxValidator::default(),
            Arc::new(SubprocessExecutor::default()),
            Scorer::default(),
            DEFAULT_EXECUTION_TIMEOUT,
        )
    }
}

impl Evaluator {
    pub fn new(
        syntax: SyntaxValidator,
        executor: Arc<dyn Executor>,
        scorer: Scorer,
        execution_timeout: Duration,
    ) -> Self {
        Self {
            syntax,
            executor,
            scorer,
            execution_timeout,
        }
    }

    pub fn from_config(config: &EvaluationConfig) -> Self {
        Self::new(
            SyntaxValidator::new(&config.python_cmd),
            Arc::new(SubprocessExecutor::new(&config.python_cmd)),
            Scorer::new(config.max_reasonable_lines),
            config.execution_timeout(),
        )
    }

    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn execution_timeout(&self) -> Duration {
        self.execution_timeout
    }

    pub async fn evaluate(
        &self,
        model: &ModelSpec,
        prompt: &Prompt,
        response: &RawResponse,
    ) -> EvaluationResult {
        let base = EvaluationResult {
            model_name: model.model_name.clone(),
            prompt_name: prompt.name.clone(),
            success: false,
            response_time: response.response_time_seconds,
            extracted_code: String::new(),
            execution_output: String::new(),
            evaluation: Evaluation::zeroed(),
            failure: None,
            error: None,
        };

        if let Some(err) = &response.transport_error {
            tracing::debug!(model = %model.model_name, prompt = %prompt.name, "Transport error: {}", err);
            return EvaluationResult {
                failure: Some(FailureKind::Transport),
                error: Some(err.clone()),
                ..base
            };
        }

        let extracted = extractor::extract(&response.raw_text);
        if !extracted.found {
            tracing::debug!(model = %model.model_name, prompt = %prompt.name, "No code in response");
            return EvaluationResult {
                failure: Some(FailureKind::NoCode),
                error: Some("no code found in response".to_string()),
                ..base
            };
        }

        let syntax_ok = match self.syntax.try_check_syntax(&extracted.source_text).await {
            Ok(ok) => ok,
            Err(e) => return Self::infrastructure_failure(base, extracted.source_text, e),
        };

        let outcome = match syntax_ok {
            false => ExecutionOutcome::skipped(),
            true => {
                let executed = self
                    .executor
                    .execute(&extracted.source_text, self.execution_timeout)
                    .await;
                match executed {
                    Ok(outcome) => outcome,
                    Err(e) => return Self::infrastructure_failure(base, extracted.source_text, e),
                }
            }
        };

        let evaluation = self.scorer.score(prompt, &extracted, syntax_ok, &outcome);
        let success = evaluation.syntax_correct && evaluation.execution_success;
        let execution_output = execution_output(&outcome);

        tracing::debug!(
            model = %model.model_name,
            prompt = %prompt.name,
            success,
            total_score = evaluation.total_score,
            "Evaluated response"
        );

        EvaluationResult {
            success,
            extracted_code: extracted.source_text,
            execution_output,
            error: evaluation.execution_error.clone(),
            evaluation,
            ..base
        }
    }

    fn infrastructure_failure(
        base: EvaluationResult,
        code: String,
        err: ExecutorError,
    ) -> EvaluationResult {
        tracing::warn!(
            model = %base.model_name,
            prompt = %base.prompt_name,
            "Sandbox failure: {}",
            err
        );

        let marker = match &err {
            ExecutorError::Spawn(_) => err.to_string(),
            ExecutorError::Io(_) => format!("process-spawn-failure: {}", err),
        };

        EvaluationResult {
            extracted_code: code,
            execution_output: err.to_string(),
            evaluation: Evaluation {
                execution_error: Some(marker.clone()),
                ..Evaluation::zeroed()
            },
            failure: Some(FailureKind::Infrastructure),
            error: Some(marker),
            ..base
        }
    }
}

/// What the program printed: stdout when it succeeded, otherwise stderr
/// (the traceback), falling back to the error itself.
fn execution_output(outcome: &ExecutionOutcome) -> String {
    match (outcome.success, &outcome.error) {
        (true, _) => outcome.stdout.clone(),
        (false, Some(err)) if outcome.stderr.trim().is_empty() => err.to_string(),
        (false, _) => outcome.stderr.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_executor::Result as ExecResult;
    use async_trait::async_trait;
    use codeburn_core::ExecutionError;

    struct BrokenSandbox;

    #[async_trait]
    impl Executor for BrokenSandbox {
        async fn execute(&self, _code: &str, _timeout: Duration) -> ExecResult<ExecutionOutcome> {
            Err(ExecutorError::Spawn(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no interpreter",
            )))
        }
    }

    fn model() -> ModelSpec {
        ModelSpec::new("test-model", "http://localhost:0")
    }

    fn add_prompt() -> Prompt {
        Prompt::new("add", "Write add").with_keywords(["def", "add"])
    }

    #[tokio::test]
    async fn test_add_function_end_to_end() {
        let evaluator = Evaluator::default();
        let response = RawResponse::ok(
            "test-model",
            "add",
            "Here:\n```python\ndef add(a, b):\n    return a + b\n```",
            0.4,
        );

        let result = evaluator.evaluate(&model(), &add_prompt(), &response).await;

        assert!(result.success, "{:?}", result);
        assert_eq!(result.failure, None);
        assert_eq!(result.extracted_code, "def add(a, b):\n    return a + b");
        assert!(result.evaluation.syntax_correct);
        assert!(result.evaluation.execution_success);
        assert!(result.evaluation.keywords_present);
        assert_eq!(result.evaluation.total_score, 8.0);
        assert_eq!(result.response_time, 0.4);
    }

    #[tokio::test]
    async fn test_transport_error_short_circuits() {
        let evaluator = Evaluator::default().with_executor(Arc::new(BrokenSandbox));
        let response = RawResponse::failed("test-model", "add", "HTTP 500", 1.0);

        let result = evaluator.evaluate(&model(), &add_prompt(), &response).await;

        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureKind::Transport));
        assert_eq!(result.error.as_deref(), Some("HTTP 500"));
        assert_eq!(result.evaluation, Evaluation::zeroed());
    }

    #[tokio::test]
    async fn test_empty_response() {
        let evaluator = Evaluator::default();
        let response = RawResponse::ok("test-model", "add", "", 0.1);

        let result = evaluator.evaluate(&model(), &add_prompt(), &response).await;

        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureKind::NoCode));
        assert_eq!(result.evaluation, Evaluation::zeroed());
        assert!(result.extracted_code.is_empty());
    }

    #[tokio::test]
    async fn test_syntax_error_skips_execution() {
        // A broken sandbox proves execution is never attempted.
        let evaluator = Evaluator::default().with_executor(Arc::new(BrokenSandbox));
        let response = RawResponse::ok("test-model", "add", "```python\ndef add(a, b\n```", 0.2);

        let result = evaluator.evaluate(&model(), &add_prompt(), &response).await;

        assert!(!result.success);
        assert_eq!(result.failure, None);
        assert!(!result.evaluation.syntax_correct);
        assert!(!result.evaluation.execution_success);
        assert_eq!(result.evaluation.total_score, 3.0);
    }

    #[tokio::test]
    async fn test_infinite_loop_times_out() {
        let evaluator = Evaluator::new(
            SyntaxValidator::default(),
            Arc::new(SubprocessExecutor::default()),
            Scorer::default(),
            Duration::from_secs(1),
        );
        let response = RawResponse::ok("test-model", "loop", "```python\nwhile True:\n    pass\n```", 0.2);

        let result = evaluator
            .evaluate(&model(), &Prompt::new("loop", "loop forever"), &response)
            .await;

        assert!(!result.success);
        assert!(result.evaluation.syntax_correct);
        assert!(!result.evaluation.execution_success);
        assert_eq!(
            result.evaluation.execution_error.as_deref(),
            Some(ExecutionError::Timeout.to_string().as_str())
        );
    }

    #[tokio::test]
    async fn test_spawn_failure_is_infrastructure() {
        let evaluator = Evaluator::default().with_executor(Arc::new(BrokenSandbox));
        let response = RawResponse::ok("test-model", "add", "```python\nx = 1\n```", 0.2);

        let result = evaluator.evaluate(&model(), &add_prompt(), &response).await;

        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureKind::Infrastructure));
        let marker = result.evaluation.execution_error.unwrap();
        assert!(marker.starts_with("process-spawn-failure"), "got {}", marker);
        assert_eq!(result.evaluation.total_score, 0.0);
        assert_eq!(result.extracted_code, "x = 1");
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_infrastructure() {
        let config = EvaluationConfig {
            python_cmd: "codeburn-no-such-python".into(),
            ..Default::default()
        };
        let evaluator = Evaluator::from_config(&config);
        let response = RawResponse::ok(
            "test-model",
            "add",
            "```python\ndef add(a, b):\n    return a + b\n```",
            0.2,
        );

        let result = evaluator.evaluate(&model(), &add_prompt(), &response).await;

        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureKind::Infrastructure));
        let marker = result.evaluation.execution_error.clone().unwrap();
        assert!(marker.starts_with("process-spawn-failure"), "got {}", marker);
        assert!(!result.evaluation.syntax_correct);
        assert_eq!(result.evaluation.total_score, 0.0);
        assert_eq!(result.error.as_deref(), Some(marker.as_str()));
    }

    #[tokio::test]
    async fn test_execution_output_is_kept() {
        let evaluator = Evaluator::default();

        let printed = RawResponse::ok("test-model", "p", "```python\nprint('hello')\n```", 0.1);
        let result = evaluator
            .evaluate(&model(), &Prompt::new("p", "say hello"), &printed)
            .await;
        assert!(result.success);
        assert_eq!(result.execution_output.trim(), "hello");

        let crashing = RawResponse::ok("test-model", "p", "```python\nx = 1 / 0\n```", 0.1);
        let result = evaluator
            .evaluate(&model(), &Prompt::new("p", "divide"), &crashing)
            .await;
        assert!(!result.success);
        assert!(result.execution_output.contains("ZeroDivisionError"));
    }

    #[test]
    fn test_execution_output_falls_back_to_error() {
        let timed_out = ExecutionOutcome {
            success: false,
            error: Some(ExecutionError::Timeout),
            ..Default::default()
        };
        assert_eq!(execution_output(&timed_out), "timeout");
        assert_eq!(execution_output(&ExecutionOutcome::skipped()), "");
    }
}
