use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodeBurnError {
    #[error("Benchmark failed: {0}")]
    BenchmarkFailed(String),

    #[error("Duplicate result for model '{model}' and prompt '{prompt}'")]
    DuplicateResult { model: String, prompt: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CodeBurnError>;
