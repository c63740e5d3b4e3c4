use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{CodeBurnError, Result};

/// A code-generation task and the rubric hints used to score answers to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub name: String,
    #[serde(alias = "prompt")]
    pub prompt_text: String,
    #[serde(default)]
    pub expected_keywords: BTreeSet<String>,
    #[serde(default)]
    pub expected_behavior: String,
    #[serde(default)]
    pub description: String,
}

impl Prompt {
    pub fn new(name: impl Into<String>, prompt_text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prompt_text: prompt_text.into(),
            expected_keywords: BTreeSet::new(),
            expected_behavior: String::new(),
            description: String::new(),
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_behavior(mut self, behavior: impl Into<String>) -> Self {
        self.expected_behavior = behavior.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Load a prompt set from a JSON array.
pub fn load_prompts(path: &Path) -> Result<Vec<Prompt>> {
    let content = std::fs::read_to_string(path)?;
    let prompts: Vec<Prompt> = serde_json::from_str(&content)?;

    if let Some(p) = prompts.iter().find(|p| p.name.trim().is_empty()) {
        return Err(CodeBurnError::Config(format!(
            "prompt with empty name in {} (text: {:.40})",
            path.display(),
            p.prompt_text
        )));
    }

    tracing::info!("Loaded {} prompts from {}", prompts.len(), path.display());
    Ok(prompts)
}

/// Built-in prompt set used when no prompts file is given.
pub fn default_prompts() -> Vec<Prompt> {
    vec![
        Prompt::new(
            "Simple Addition Function",
            "Write a Python function called 'add_numbers' that takes two parameters (a, b) and returns their sum. Include a docstring and a simple test call.",
        )
        .with_keywords(["def", "add_numbers", "return", "a", "b"])
        .with_behavior("function_definition"),
        Prompt::new(
            "User Class",
            "Create a Python class called 'User' with __init__ method that accepts name and email parameters. Add a method called 'get_info' that returns a formatted string with user information.",
        )
        .with_keywords(["class", "User", "__init__", "name", "email", "get_info"])
        .with_behavior("class_definition"),
        Prompt::new(
            "Password Hashing",
            "Write a Python function called 'hash_password' that takes a password string and returns a hashed version. Use hashlib library with sha256. Include error handling for empty passwords.",
        )
        .with_keywords(["def", "hash_password", "hashlib", "sha256", "encode"])
        .with_behavior("function_with_imports"),
        Prompt::new(
            "CSV Reader",
            "Write a Python function called 'read_csv_file' that takes a filename parameter and returns a list of dictionaries. Use the csv module and include basic error handling for file not found.",
        )
        .with_keywords(["def", "read_csv_file", "csv", "DictReader", "try", "except"])
        .with_behavior("function_with_error_handling"),
        Prompt::new(
            "Simple Calculator",
            "Create a Python class called 'Calculator' with methods: add, subtract, multiply, divide. Each method should take two numbers and return the result. Include division by zero protection.",
        )
        .with_keywords(["class", "Calculator", "add", "subtract", "multiply", "divide"])
        .with_behavior("class_with_methods"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_prompts_have_unique_names() {
        let prompts = default_prompts();
        let names: BTreeSet<_> = prompts.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names.len(), prompts.len());
        assert!(prompts.iter().all(|p| !p.expected_keywords.is_empty()));
    }

    #[test]
    fn test_load_accepts_prompt_alias() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"name": "Add", "prompt": "Write add", "expected_keywords": ["def", "add"]}}]"#
        )
        .unwrap();

        let prompts = load_prompts(file.path()).unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].prompt_text, "Write add");
        assert!(prompts[0].expected_keywords.contains("add"));
        assert_eq!(prompts[0].expected_behavior, "");
    }

    #[test]
    fn test_load_rejects_blank_name() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"name": " ", "prompt_text": "x"}}]"#).unwrap();

        assert!(matches!(
            load_prompts(file.path()),
            Err(CodeBurnError::Config(_))
        ));
    }
}
