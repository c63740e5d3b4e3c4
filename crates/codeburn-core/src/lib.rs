// Domain modules
pub mod code;
pub mod config;
pub mod error;

pub use code::{
    default_prompts, load_models, load_prompts, parse_models, BenchmarkRun, Evaluation,
    EvaluationResult, ExecutionError, ExecutionOutcome, ExtractedCode, FailureKind, ModelScore,
    ModelSpec, Prompt, RawResponse, ResultRow, RunSummary, SAMPLE_MODELS_CSV,
};
pub use config::{ClientConfig, CodeBurnConfig, EvaluationConfig, ReportConfig, PYTHON_ENV};
pub use error::{CodeBurnError, Result};
