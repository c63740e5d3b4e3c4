mod model;
mod prompt;
mod summary;
mod types;

pub use model::{load_models, parse_models, ModelSpec, SAMPLE_MODELS_CSV};
pub use prompt::{default_prompts, load_prompts, Prompt};
pub use summary::{BenchmarkRun, ModelScore, RunSummary};
pub use types::{
    Evaluation, EvaluationResult, ExecutionError, ExecutionOutcome, ExtractedCode, FailureKind,
    RawResponse, ResultRow,
};
