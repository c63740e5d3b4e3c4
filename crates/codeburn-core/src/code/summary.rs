use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{EvaluationResult, FailureKind};
use crate::{CodeBurnError, Result};

/// Results of one benchmark run, at most one per (model, prompt) pair.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(try_from = "StoredRun")]
pub struct BenchmarkRun {
    results: Vec<EvaluationResult>,
    #[serde(skip)]
    seen: HashSet<(String, String)>,
}

/// Serialized form of a run. Loading goes back through `insert`, so the
/// pair index is rebuilt and duplicate pairs are rejected.
#[derive(Deserialize)]
struct StoredRun {
    results: Vec<EvaluationResult>,
}

impl TryFrom<StoredRun> for BenchmarkRun {
    type Error = CodeBurnError;

    fn try_from(stored: StoredRun) -> Result<Self> {
        let mut run = BenchmarkRun::new();
        for result in stored.results {
            run.insert(result)?;
        }
        Ok(run)
    }
}

impl BenchmarkRun {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, result: EvaluationResult) -> Result<()> {
        let key = (result.model_name.clone(), result.prompt_name.clone());
        if !self.seen.insert(key) {
            return Err(CodeBurnError::DuplicateResult {
                model: result.model_name,
                prompt: result.prompt_name,
            });
        }
        self.results.push(result);
        Ok(())
    }

    pub fn results(&self) -> &[EvaluationResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<EvaluationResult> {
        self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Reorder results by an external ranking of their keys, e.g. the
    /// order in which pairs were scheduled. Unknown keys sort last.
    pub fn sort_by_order<F>(&mut self, rank: F)
    where
        F: Fn(&str, &str) -> Option<usize>,
    {
        self.results
            .sort_by_key(|r| rank(&r.model_name, &r.prompt_name).unwrap_or(usize::MAX));
    }

    /// True when at least one pair made it past transport and sandbox setup.
    pub fn any_evaluated(&self) -> bool {
        self.results
            .iter()
            .any(|r| !r.failure.is_some_and(|f| f.is_unevaluated()))
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary::from_results(&self.results)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelScore {
    pub model_name: String,
    pub evaluations: u32,
    pub successes: u32,
    pub success_rate: f64,
    pub avg_score: f64,
    pub avg_code_quality: f64,
    pub avg_response_time: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_tests: u32,
    pub successful_tests: u32,
    pub success_rate: f64,
    pub avg_response_time: f64,
    /// Ranked best first.
    pub models: Vec<ModelScore>,
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0u32), |(s, n), v| (s + v, n + 1));
    match n {
        0 => 0.0,
        _ => sum / n as f64,
    }
}

fn responded(r: &EvaluationResult) -> bool {
    r.failure != Some(FailureKind::Transport)
}

impl RunSummary {
    pub fn from_results(results: &[EvaluationResult]) -> Self {
        let total_tests = results.len() as u32;
        let successful_tests = results.iter().filter(|r| r.success).count() as u32;
        let success_rate = match total_tests {
            0 => 0.0,
            _ => successful_tests as f64 / total_tests as f64 * 100.0,
        };
        let avg_response_time = mean(
            results
                .iter()
                .filter(|r| responded(r))
                .map(|r| r.response_time),
        );

        // First-seen order keeps ties stable.
        let mut names: Vec<&str> = Vec::new();
        for r in results {
            if !names.contains(&r.model_name.as_str()) {
                names.push(&r.model_name);
            }
        }

        let mut models: Vec<ModelScore> = names
            .into_iter()
            .map(|name| {
                let mine: Vec<_> = results.iter().filter(|r| r.model_name == name).collect();
                let evaluations = mine.len() as u32;
                let successes = mine.iter().filter(|r| r.success).count() as u32;
                ModelScore {
                    model_name: name.to_string(),
                    evaluations,
                    successes,
                    success_rate: successes as f64 / evaluations as f64 * 100.0,
                    avg_score: mean(mine.iter().map(|r| r.evaluation.total_score)),
                    avg_code_quality: mean(mine.iter().map(|r| r.evaluation.code_quality)),
                    avg_response_time: mean(
                        mine.iter().filter(|r| responded(r)).map(|r| r.response_time),
                    ),
                }
            })
            .collect();

        models.sort_by(|a, b| {
            b.success_rate
                .total_cmp(&a.success_rate)
                .then(b.avg_score.total_cmp(&a.avg_score))
        });

        RunSummary {
            total_tests,
            successful_tests,
            success_rate,
            avg_response_time,
            models,
        }
    }
}
