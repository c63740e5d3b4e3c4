//! Rubric scoring of extracted code.
//!
//! | Signal                     | Points |
//! |----------------------------|--------|
//! | Syntax correct             | 3      |
//! | Executes without error     | 2      |
//! | Expected keywords present  | 2      |
//! | Function/class definitions | 1      |
//! | Error handling             | 1      |
//! | Documentation              | 1      |
//!
//! `code_quality` is a separate 0-5 sub-score built from the structural
//! signals plus a length check. The two are never combined.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use codeburn_core::{Evaluation, ExecutionOutcome, ExtractedCode, Prompt};
use regex::Regex;

pub const SYNTAX_POINTS: f64 = 3.0;
pub const EXECUTION_POINTS: f64 = 2.0;
pub const KEYWORD_POINTS: f64 = 2.0;
pub const STRUCTURE_POINTS: f64 = 1.0;
pub const MAX_TOTAL_SCORE: f64 = 10.0;
pub const MAX_CODE_QUALITY: f64 = 5.0;

/// Shortest comment text that counts as documentation.
const MIN_COMMENT_CHARS: usize = 4;

pub const DEFAULT_MAX_REASONABLE_LINES: usize = 200;

fn definition_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*(?:async[ \t]+)?(?:def|class)[ \t]+\w+")
            .expect("definition pattern is valid")
    })
}

fn error_handling_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*(?:try[ \t]*:|except\b|finally[ \t]*:|raise\b)|:[ \t]*raise\b")
            .expect("error handling pattern is valid")
    })
}

#[derive(Debug, Clone)]
pub struct Scorer {
    max_reasonable_lines: usize,
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REASONABLE_LINES)
    }
}

impl Scorer {
    pub fn new(max_reasonable_lines: usize) -> Self {
        Self {
            max_reasonable_lines,
        }
    }

    /// Score one piece of extracted code. Pure: no IO, no randomness.
    pub fn score(
        &self,
        prompt: &Prompt,
        extracted: &ExtractedCode,
        syntax_ok: bool,
        exec_outcome: &ExecutionOutcome,
    ) -> Evaluation {
        if !extracted.found {
            return Evaluation::zeroed();
        }

        let code = extracted.source_text.as_str();
        let matched_keywords = matched_keywords(code, &prompt.expected_keywords);
        let keywords_present =
            prompt.expected_keywords.is_empty() || !matched_keywords.is_empty();
        let keyword_match_ratio = keyword_match_ratio(&matched_keywords, &prompt.expected_keywords);

        let has_functions_or_classes = has_definitions(code);
        let has_error_handling = has_error_handling(code);
        let has_documentation = has_documentation(code);
        let line_count = line_count(code);
        let length_reasonable = (1..=self.max_reasonable_lines).contains(&line_count);

        let execution_success = exec_outcome.success;

        let total_score = [
            (syntax_ok, SYNTAX_POINTS),
            (execution_success, EXECUTION_POINTS),
            (keywords_present, KEYWORD_POINTS),
            (has_functions_or_classes, STRUCTURE_POINTS),
            (has_error_handling, STRUCTURE_POINTS),
            (has_documentation, STRUCTURE_POINTS),
        ]
        .iter()
        .filter(|(hit, _)| *hit)
        .map(|(_, points)| points)
        .sum::<f64>()
        .clamp(0.0, MAX_TOTAL_SCORE);

        let code_quality = [
            has_functions_or_classes,
            has_error_handling,
            has_documentation,
            length_reasonable,
        ]
        .iter()
        .filter(|hit| **hit)
        .count() as f64;

        Evaluation {
            syntax_correct: syntax_ok,
            execution_success,
            execution_error: exec_outcome.error.as_ref().map(|e| e.to_string()),
            keywords_present,
            matched_keywords,
            keyword_match_ratio,
            has_functions_or_classes,
            has_error_handling,
            has_documentation,
            line_count,
            code_quality: code_quality.clamp(0.0, MAX_CODE_QUALITY),
            total_score,
        }
    }
}

/// Score with the default length bound.
pub fn score(
    prompt: &Prompt,
    extracted: &ExtractedCode,
    syntax_ok: bool,
    exec_outcome: &ExecutionOutcome,
) -> Evaluation {
    Scorer::default().score(prompt, extracted, syntax_ok, exec_outcome)
}

/// Case-insensitive substring match; returns the keywords as the prompt
/// spelled them.
pub fn matched_keywords(code: &str, keywords: &BTreeSet<String>) -> BTreeSet<String> {
    let code_lower = code.to_lowercase();
    keywords
        .iter()
        .filter(|kw| !kw.trim().is_empty())
        .filter(|kw| code_lower.contains(&kw.to_lowercase()))
        .cloned()
        .collect()
}

/// Fraction of the (non-blank) expected keywords that matched.
pub fn keyword_match_ratio(matched: &BTreeSet<String>, expected: &BTreeSet<String>) -> f64 {
    let expected = expected.iter().filter(|kw| !kw.trim().is_empty()).count();
    match expected {
        0 => 1.0,
        n => matched.len() as f64 / n as f64,
    }
}

pub fn has_definitions(code: &str) -> bool {
    definition_re().is_match(code)
}

pub fn has_error_handling(code: &str) -> bool {
    error_handling_re().is_match(code)
}

/// A docstring, or a `#` comment with some actual text in it.
pub fn has_documentation(code: &str) -> bool {
    if code.contains("\"\"\"") || code.contains("'''") {
        return true;
    }
    code.lines().any(|line| comment_text(line).is_some_and(|t| t.chars().count() >= MIN_COMMENT_CHARS))
}

/// Text of a comment on this line. A `#` only starts a comment at the
/// beginning of the line or after whitespace; shebangs are not comments.
fn comment_text(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with("#!") {
        return None;
    }
    if let Some(rest) = trimmed.strip_prefix('#') {
        return Some(rest.trim());
    }

    let bytes = line.as_bytes();
    line.match_indices('#')
        .find(|(i, _)| *i > 0 && (bytes[i - 1] == b' ' || bytes[i - 1] == b'\t'))
        .map(|(i, _)| line[i + 1..].trim())
}

/// Non-blank lines.
pub fn line_count(code: &str) -> usize {
    code.lines().filter(|l| !l.trim().is_empty()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeburn_core::ExecutionError;

    fn ok_run() -> ExecutionOutcome {
        ExecutionOutcome {
            success: true,
            ..Default::default()
        }
    }

    fn add_prompt() -> Prompt {
        Prompt::new("add", "Write add").with_keywords(["def", "add"])
    }

    #[test]
    fn test_add_function_scores_eight() {
        let code = ExtractedCode::found("def add(a, b):\n    return a + b");
        let eval = score(&add_prompt(), &code, true, &ok_run());

        assert!(eval.syntax_correct);
        assert!(eval.execution_success);
        assert!(eval.keywords_present);
        assert!(eval.has_functions_or_classes);
        assert!(!eval.has_error_handling);
        assert!(!eval.has_documentation);
        assert_eq!(eval.line_count, 2);
        assert_eq!(eval.total_score, 8.0);
        assert_eq!(eval.code_quality, 2.0);
        assert_eq!(eval.matched_keywords.len(), 2);
        assert_eq!(eval.keyword_match_ratio, 1.0);
    }

    #[test]
    fn test_full_marks() {
        let code = ExtractedCode::found(
            "def safe_div(a, b):\n    \"\"\"Divide a by b.\"\"\"\n    try:\n        return a / b\n    except ZeroDivisionError:\n        return None",
        );
        let prompt = Prompt::new("div", "x").with_keywords(["safe_div"]);
        let eval = score(&prompt, &code, true, &ok_run());

        assert_eq!(eval.total_score, MAX_TOTAL_SCORE);
        assert_eq!(eval.code_quality, 4.0);
    }

    #[test]
    fn test_syntax_error_loses_syntax_and_execution_points() {
        let code = ExtractedCode::found("def add(a, b");
        let failed = ExecutionOutcome::skipped();
        let eval = score(&add_prompt(), &code, false, &failed);

        assert!(!eval.syntax_correct);
        assert!(!eval.execution_success);
        // keywords (2) + definition (1)
        assert_eq!(eval.total_score, 3.0);
    }

    #[test]
    fn test_execution_error_is_recorded() {
        let code = ExtractedCode::found("while True:\n    pass");
        let timeout = ExecutionOutcome {
            success: false,
            error: Some(ExecutionError::Timeout),
            ..Default::default()
        };
        let eval = score(&Prompt::new("loop", "x"), &code, true, &timeout);

        assert_eq!(eval.execution_error.as_deref(), Some("timeout"));
        assert!(!eval.execution_success);
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let keywords: BTreeSet<String> =
            ["DictReader", "CSV", "missing"].iter().map(|s| s.to_string()).collect();
        let matched = matched_keywords("import csv\nreader = csv.dictreader(f)", &keywords);

        let expected: BTreeSet<String> = ["CSV", "DictReader"].iter().map(|s| s.to_string()).collect();
        assert_eq!(matched, expected);

        let ratio = keyword_match_ratio(&matched, &keywords);
        assert!((ratio - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_keyword_match() {
        let code = ExtractedCode::found("x = 1");
        let prompt = Prompt::new("p", "x").with_keywords(["class"]);
        let eval = score(&prompt, &code, true, &ok_run());

        assert!(!eval.keywords_present);
        assert!(eval.matched_keywords.is_empty());
        assert_eq!(eval.keyword_match_ratio, 0.0);
        assert_eq!(eval.total_score, 5.0);
    }

    #[test]
    fn test_empty_keyword_set_counts_as_present() {
        let code = ExtractedCode::found("x = 1");
        let eval = score(&Prompt::new("p", "x"), &code, true, &ok_run());
        assert!(eval.keywords_present);
        assert_eq!(eval.keyword_match_ratio, 1.0);
        assert_eq!(eval.total_score, 7.0);
    }

    #[test]
    fn test_missing_code_is_zeroed() {
        let eval = score(&Prompt::new("p", "x"), &ExtractedCode::missing(), true, &ok_run());
        assert_eq!(eval, Evaluation::zeroed());
    }

    #[test]
    fn test_documentation_detection() {
        assert!(has_documentation("def f():\n    '''Docs.'''"));
        assert!(has_documentation("# compute the total\ntotal = 1"));
        assert!(has_documentation("total = 1  # running sum"));
        assert!(!has_documentation("#!/usr/bin/env python3\nx = 1"));
        assert!(!has_documentation("x = 1 #\ny = 2 # ok"));
        assert!(!has_documentation("color = '#ffffff'"));
    }

    #[test]
    fn test_error_handling_detection() {
        assert!(has_error_handling("try:\n    x()\nexcept Exception:\n    pass"));
        assert!(has_error_handling("if not p:\n    raise ValueError('empty')"));
        assert!(has_error_handling("if not p: raise ValueError('empty')"));
        assert!(!has_error_handling("retry = 3\nexcepted = False"));
    }

    #[test]
    fn test_definition_detection() {
        assert!(has_definitions("class User:\n    pass"));
        assert!(has_definitions("    async def fetch(self):"));
        assert!(!has_definitions("undefined = 1\nsubclass = 2"));
    }

    #[test]
    fn test_length_bound() {
        let long_code = "x = 1\n".repeat(5);
        let scorer = Scorer::new(3);
        let eval = scorer.score(&Prompt::new("p", "x"), &ExtractedCode::found(long_code), true, &ok_run());
        assert_eq!(eval.line_count, 5);
        assert_eq!(eval.code_quality, 0.0);
    }

    #[test]
    fn test_score_is_deterministic_and_bounded() {
        let samples = [
            "",
            "x",
            "def f():\n    '''d'''\n    try:\n        pass\n    except: raise",
            "class A:\n    # documented here\n    pass",
        ];
        for sample in samples {
            let code = ExtractedCode::found(sample);
            for syntax_ok in [true, false] {
                let a = score(&add_prompt(), &code, syntax_ok, &ok_run());
                let b = score(&add_prompt(), &code, syntax_ok, &ok_run());
                assert_eq!(a, b);
                assert!((0.0..=MAX_TOTAL_SCORE).contains(&a.total_score));
                assert!((0.0..=MAX_CODE_QUALITY).contains(&a.code_quality));
            }
        }
    }
}
