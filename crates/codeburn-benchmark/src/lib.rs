pub mod client;
pub mod code_executor;
pub mod evaluator;
pub mod export;
pub mod extractor;
pub mod runner;
pub mod scorer;
pub mod syntax;

pub use client::{Dispatcher, ModelClient};
pub use code_executor::{Executor, ExecutorError, SubprocessExecutor};
pub use evaluator::{Evaluator, DEFAULT_EXECUTION_TIMEOUT};
pub use export::{BenchmarkReport, PromptInfo};
pub use extractor::{extract, looks_like_code};
pub use runner::{BenchmarkEvent, BenchmarkRunner, DEFAULT_MAX_CONCURRENCY};
pub use scorer::{score, Scorer};
pub use syntax::SyntaxValidator;
