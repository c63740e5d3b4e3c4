use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use codeburn_core::{
    BenchmarkRun, CodeBurnError, EvaluationResult, Prompt, ReportConfig, Result, RunSummary,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptInfo {
    pub prompt_text: String,
    pub description: String,
    pub expected_keywords: BTreeSet<String>,
}

/// Everything one run produced, as written to the JSON export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub run_id: String,
    pub generated_at_unix: i64,
    pub models_tested: Vec<String>,
    pub total_tests: u32,
    pub successful_tests: u32,
    pub prompts_info: BTreeMap<String, PromptInfo>,
    pub summary: RunSummary,
    pub results: Vec<EvaluationResult>,
}

impl BenchmarkReport {
    pub fn new(run: &BenchmarkRun, prompts: &[Prompt]) -> Self {
        let generated_at_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let mut models_tested: Vec<String> = Vec::new();
        for r in run.results() {
            if !models_tested.contains(&r.model_name) {
                models_tested.push(r.model_name.clone());
            }
        }

        let used: BTreeSet<&str> = run.results().iter().map(|r| r.prompt_name.as_str()).collect();
        let mut prompts_info = BTreeMap::new();
        for p in prompts.iter().filter(|p| used.contains(p.name.as_str())) {
            prompts_info.entry(p.name.clone()).or_insert_with(|| PromptInfo {
                prompt_text: p.prompt_text.clone(),
                description: p.description.clone(),
                expected_keywords: p.expected_keywords.clone(),
            });
        }

        let summary = run.summary();

        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            generated_at_unix,
            models_tested,
            total_tests: summary.total_tests,
            successful_tests: summary.successful_tests,
            prompts_info,
            summary,
            results: run.results().to_vec(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for result in &self.results {
            writer.serialize(result.to_row())?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| CodeBurnError::Io(e.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for result in &self.results {
            writer.serialize(result.to_row())?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Writes the exports enabled in `config` into its output directory and
    /// returns the paths written.
    pub fn export(&self, config: &ReportConfig) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        if !config.export_json && !config.export_csv {
            return Ok(written);
        }

        std::fs::create_dir_all(&config.output_dir)?;
        let stem = format!("codeburn_results_{}", self.generated_at_unix);

        if config.export_json {
            let path = config.output_dir.join(format!("{}.json", stem));
            self.write_json(&path)?;
            written.push(path);
        }
        if config.export_csv {
            let path = config.output_dir.join(format!("{}.csv", stem));
            self.write_csv(&path)?;
            written.push(path);
        }

        for path in &written {
            info!("Results exported to {}", path.display());
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeburn_core::{Evaluation, FailureKind};

    fn result(model: &str, prompt: &str, success: bool) -> EvaluationResult {
        let mut evaluation = Evaluation::zeroed();
        evaluation.total_score = if success { 8.0 } else { 0.0 };
        evaluation.matched_keywords = ["add", "def"].iter().map(|s| s.to_string()).collect();
        evaluation.keyword_match_ratio = 1.0;
        EvaluationResult {
            model_name: model.into(),
            prompt_name: prompt.into(),
            success,
            response_time: 1.5,
            extracted_code: "def add(a, b):\n    return a + b".into(),
            execution_output: if success { "3\n".into() } else { String::new() },
            evaluation,
            failure: (!success).then_some(FailureKind::NoCode),
            error: None,
        }
    }

    fn sample_run() -> BenchmarkRun {
        let mut run = BenchmarkRun::new();
        run.insert(result("m1", "add", true)).unwrap();
        run.insert(result("m2", "add", false)).unwrap();
        run
    }

    fn prompts() -> Vec<Prompt> {
        vec![
            Prompt::new("add", "Write add")
                .with_keywords(["def", "add"])
                .with_description("adds numbers"),
            Prompt::new("unused", "Not run"),
        ]
    }

    #[test]
    fn test_report_fields() {
        let report = BenchmarkReport::new(&sample_run(), &prompts());

        assert_eq!(report.models_tested, vec!["m1", "m2"]);
        assert_eq!(report.total_tests, 2);
        assert_eq!(report.successful_tests, 1);
        assert_eq!(report.prompts_info.len(), 1);
        assert_eq!(report.prompts_info["add"].description, "adds numbers");
        assert!(uuid::Uuid::parse_str(&report.run_id).is_ok());
        assert!(report.generated_at_unix > 0);
    }

    #[test]
    fn test_json_export_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let report = BenchmarkReport::new(&sample_run(), &prompts());
        report.write_json(&path).unwrap();

        let loaded: BenchmarkReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.run_id, report.run_id);
        assert_eq!(loaded.results.len(), 2);
        assert_eq!(loaded.summary, report.summary);
        assert_eq!(loaded.results[0].execution_output, "3\n");
        assert_eq!(loaded.results[0].evaluation.keyword_match_ratio, 1.0);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["results"][0]["execution_output"], "3\n");
        assert_eq!(raw["results"][0]["evaluation"]["keyword_match_ratio"], 1.0);
    }

    #[test]
    fn test_csv_rows() {
        let report = BenchmarkReport::new(&sample_run(), &prompts());
        let csv = report.to_csv().unwrap();
        let mut lines = csv.lines();

        let header = lines.next().unwrap();
        assert!(header.starts_with("model_name,prompt_name,success,failure,response_time"));
        assert!(header.ends_with("code_quality,total_score"));
        assert!(header.contains("matched_keywords,keyword_match_ratio,"));

        let first = lines.next().unwrap();
        assert!(first.starts_with("m1,add,true,,1.5"));
        assert!(first.contains("add;def,1.0,"));

        let second = lines.next().unwrap();
        assert!(second.starts_with("m2,add,false,no_code"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_export_respects_config() {
        let dir = tempfile::tempdir().unwrap();
        let report = BenchmarkReport::new(&sample_run(), &prompts());

        let config = ReportConfig {
            output_dir: dir.path().join("out"),
            export_json: true,
            export_csv: false,
        };
        let written = report.export(&config).unwrap();
        assert_eq!(written.len(), 1);
        assert!(written[0].extension().is_some_and(|e| e == "json"));
        assert!(written[0].exists());

        let config = ReportConfig {
            output_dir: dir.path().join("none"),
            export_json: false,
            export_csv: false,
        };
        assert!(report.export(&config).unwrap().is_empty());
        assert!(!dir.path().join("none").exists());
    }
}
