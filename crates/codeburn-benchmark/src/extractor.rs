//! Pulls candidate source code out of a free-form model response.
//!
//! Chat models usually wrap code in a fenced block; some answer with bare
//! code. Anything else is reported as "no code found" rather than an error.

use std::sync::OnceLock;

use codeburn_core::ExtractedCode;
use regex::Regex;

const FENCE: &str = "```";

/// A line that only a program would contain: a definition, an import or an
/// assignment at the start of a line.
const CODE_LINE_PATTERN: &str = r"(?m)^[ \t]*(?:(?:async[ \t]+)?def[ \t]+\w+[ \t]*\(|class[ \t]+\w+[ \t]*[:(]|import[ \t]+\w|from[ \t]+[\w.]+[ \t]+import[ \t]|[A-Za-z_][\w.]*(?:\[[^\]\n]*\])?(?:[ \t]*,[ \t]*[A-Za-z_]\w*)*[ \t]*(?:[-+*/%&|^@]|//|\*\*|<<|>>)?=[^=])";

const LANGUAGE_TAG_PATTERN: &str = r"^[\w+#.\-]*$";

fn code_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(CODE_LINE_PATTERN).expect("code line pattern is valid"))
}

fn language_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(LANGUAGE_TAG_PATTERN).expect("language tag pattern is valid"))
}

/// Extract the first non-blank fenced block, or the whole text when it has
/// no fences but reads like code.
pub fn extract(raw_text: &str) -> ExtractedCode {
    if raw_text.contains(FENCE) {
        return fenced_blocks(raw_text)
            .into_iter()
            .map(str::trim)
            .find(|block| !block.is_empty())
            .map(ExtractedCode::found)
            .unwrap_or_else(ExtractedCode::missing);
    }

    match looks_like_code(raw_text) {
        true => ExtractedCode::found(raw_text.trim()),
        false => ExtractedCode::missing(),
    }
}

/// Whether at least one line of `text` is recognizably a code statement.
pub fn looks_like_code(text: &str) -> bool {
    code_line_re().is_match(text)
}

/// Contents of every fenced block in order, fence lines and language tags
/// stripped. An unterminated final fence runs to the end of the text.
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find(FENCE) {
        let after_open = &rest[open + FENCE.len()..];

        let (block, remainder) = match after_open.find('\n') {
            // ```print(1)``` or an unterminated fence on the last line
            None => match after_open.find(FENCE) {
                Some(close) => (&after_open[..close], &after_open[close + FENCE.len()..]),
                None => (after_open, ""),
            },
            Some(newline) => {
                let info = &after_open[..newline];
                if let Some(close) = info.find(FENCE) {
                    (&info[..close], &after_open[close + FENCE.len()..])
                } else {
                    let body_start = match language_tag_re().is_match(info.trim()) {
                        true => newline + 1,
                        // Code started on the fence line itself.
                        false => 0,
                    };
                    let body = &after_open[body_start..];
                    match body.find(FENCE) {
                        Some(close) => (&body[..close], &body[close + FENCE.len()..]),
                        None => (body, ""),
                    }
                }
            }
        };

        blocks.push(block);
        rest = remainder;
    }

    blocks
}
