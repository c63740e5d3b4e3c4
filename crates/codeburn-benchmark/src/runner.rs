use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use codeburn_core::{
    BenchmarkRun, CodeBurnConfig, CodeBurnError, EvaluationResult, ModelSpec, Prompt, Result,
    RunSummary,
};
use futures::{future, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::client::{Dispatcher, ModelClient};
use crate::evaluator::Evaluator;

pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BenchmarkEvent {
    Started { total: usize },
    Evaluated { model: String, prompt: String, success: bool, total_score: f64 },
    Error { message: String },
    Cancelled,
    Done { summary: RunSummary },
}

/// Evaluates every (model, prompt) pair of a matrix.
pub struct BenchmarkRunner {
    dispatcher: Arc<dyn Dispatcher>,
    evaluator: Evaluator,
    max_concurrency: usize,
}

impl BenchmarkRunner {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, evaluator: Evaluator) -> Self {
        Self {
            dispatcher,
            evaluator,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    pub fn from_config(config: &CodeBurnConfig) -> Result<Self> {
        config.validate()?;
        let client = ModelClient::new(config.client.request_timeout())?;
        Ok(Self::new(Arc::new(client), Evaluator::from_config(&config.evaluation))
            .with_concurrency(config.evaluation.max_concurrency))
    }

    pub fn with_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Runs the matrix and returns its results in matrix order (models
    /// outer, prompts inner).
    ///
    /// Cancelling `cancel` stops scheduling new pairs; whatever finished is
    /// still returned. Fails only if no pair could be evaluated at all.
    #[instrument(skip_all, fields(models = models.len(), prompts = prompts.len()))]
    pub async fn run(
        &self,
        models: &[ModelSpec],
        prompts: &[Prompt],
        cancel: CancellationToken,
        tx: mpsc::Sender<BenchmarkEvent>,
    ) -> Result<BenchmarkRun> {
        let models = unique_by(models, |m| m.model_name.as_str(), "model");
        let prompts = unique_by(prompts, |p| p.name.as_str(), "prompt");

        let pairs: Vec<(&ModelSpec, &Prompt)> = models
            .iter()
            .flat_map(|m| prompts.iter().map(move |p| (*m, *p)))
            .collect();

        let order: HashMap<(&str, &str), usize> = pairs
            .iter()
            .enumerate()
            .map(|(i, (m, p))| ((m.model_name.as_str(), p.name.as_str()), i))
            .collect();

        info!(
            "Starting benchmark: {} models x {} prompts",
            models.len(),
            prompts.len()
        );
        let _ = tx.send(BenchmarkEvent::Started { total: pairs.len() }).await;

        let mut run = BenchmarkRun::new();
        let mut pending = futures::stream::iter(pairs.iter().copied())
            .take_while(|_| future::ready(!cancel.is_cancelled()))
            .map(|(model, prompt)| self.evaluate_pair(model, prompt))
            .buffer_unordered(self.max_concurrency);

        while let Some(result) = pending.next().await {
            let _ = tx
                .send(BenchmarkEvent::Evaluated {
                    model: result.model_name.clone(),
                    prompt: result.prompt_name.clone(),
                    success: result.success,
                    total_score: result.evaluation.total_score,
                })
                .await;

            if let Err(e) = run.insert(result) {
                warn!("Dropping result: {}", e);
            }
        }
        drop(pending);

        if cancel.is_cancelled() {
            warn!("Benchmark cancelled after {} of {} pairs", run.len(), pairs.len());
            let _ = tx.send(BenchmarkEvent::Cancelled).await;
        }

        run.sort_by_order(|model, prompt| order.get(&(model, prompt)).copied());

        if !run.any_evaluated() {
            let message = match pairs.is_empty() {
                true => "no models or prompts to evaluate".to_string(),
                false => format!(
                    "none of {} pairs could be evaluated ({} finished)",
                    pairs.len(),
                    run.len()
                ),
            };
            let _ = tx.send(BenchmarkEvent::Error { message: message.clone() }).await;
            return Err(CodeBurnError::BenchmarkFailed(message));
        }

        let summary = run.summary();
        info!(
            "Benchmark complete: {}/{} successful ({:.1}%)",
            summary.successful_tests, summary.total_tests, summary.success_rate
        );
        let _ = tx.send(BenchmarkEvent::Done { summary }).await;

        Ok(run)
    }

    async fn evaluate_pair(&self, model: &ModelSpec, prompt: &Prompt) -> EvaluationResult {
        let response = self.dispatcher.dispatch(model, prompt).await;
        self.evaluator.evaluate(model, prompt, &response).await
    }
}

/// First occurrence of each key wins.
fn unique_by<'a, T, F>(items: &'a [T], key: F, kind: &str) -> Vec<&'a T>
where
    F: Fn(&T) -> &str,
{
    let mut seen = HashSet::new();
    items
        .iter()
        .filter(|item| {
            let fresh = seen.insert(key(item).to_string());
            if !fresh {
                warn!("Skipping duplicate {} '{}'", kind, key(item));
            }
            fresh
        })
        .collect()
}
