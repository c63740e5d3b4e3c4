use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{CodeBurnError, Result};

/// A model endpoint under test.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub model_name: String,
    pub url: String,
    #[serde(default)]
    pub auth_header: Option<String>,
    #[serde(default)]
    pub auth_value: Option<String>,
    #[serde(default)]
    pub supports_think: bool,
    #[serde(default)]
    pub description: String,
}

impl ModelSpec {
    pub fn new(model_name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            url: url.into(),
            auth_header: None,
            auth_value: None,
            supports_think: false,
            description: String::new(),
        }
    }

    /// Header pair to attach to requests, only when both halves are set.
    pub fn auth(&self) -> Option<(&str, &str)> {
        match (self.auth_header.as_deref(), self.auth_value.as_deref()) {
            (Some(h), Some(v)) => Some((h, v)),
            _ => None,
        }
    }
}

/// One line of `models.csv` as written on disk.
#[derive(Debug, Deserialize)]
struct ModelRow {
    model_name: String,
    url: String,
    #[serde(default)]
    auth_header: String,
    #[serde(default)]
    auth_value: String,
    #[serde(default)]
    think: String,
    #[serde(default)]
    description: String,
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    match trimmed.is_empty() {
        true => None,
        false => Some(trimmed.to_string()),
    }
}

fn parse_flag(s: &str) -> bool {
    matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

impl TryFrom<ModelRow> for ModelSpec {
    type Error = CodeBurnError;

    fn try_from(row: ModelRow) -> Result<Self> {
        let model_name = row.model_name.trim().to_string();
        let url = row.url.trim().to_string();

        if model_name.is_empty() {
            return Err(CodeBurnError::Config("model row with empty model_name".into()));
        }
        if url.is_empty() {
            return Err(CodeBurnError::Config(format!(
                "model '{}' has no url",
                model_name
            )));
        }

        Ok(ModelSpec {
            model_name,
            url,
            auth_header: non_empty(row.auth_header),
            auth_value: non_empty(row.auth_value),
            supports_think: parse_flag(&row.think),
            description: row.description.trim().to_string(),
        })
    }
}

/// Parse models from any CSV reader with a header row.
pub fn parse_models<R: std::io::Read>(reader: R) -> Result<Vec<ModelSpec>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut models = Vec::new();
    for row in csv_reader.deserialize::<ModelRow>() {
        models.push(ModelSpec::try_from(row?)?);
    }
    Ok(models)
}

pub fn load_models(path: &Path) -> Result<Vec<ModelSpec>> {
    let file = std::fs::File::open(path)?;
    let models = parse_models(file)?;
    tracing::info!("Loaded {} models from {}", models.len(), path.display());
    Ok(models)
}

/// Header and example row written by `codeburn init`.
pub const SAMPLE_MODELS_CSV: &str = "model_name,url,auth_header,auth_value,think,description\n\
llama3.1:8b,http://localhost:11434/api/chat,,,false,Local Ollama model\n";
