#[cfg(test)]
mod tests;

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{Result, StudyError};

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```(?:json)?").expect("static pattern compiles"));
static ARRAY_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[.*\]").expect("static pattern compiles"));
static MISSING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\}\s*\{").expect("static pattern compiles"));
static COMMENT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*//.*$").expect("static pattern compiles"));

/// Best-effort repair of generative-model output that is supposed to be a
/// JSON array.
///
/// Steps, in order: strip Markdown code fences, cut the text down to the
/// outermost `[...]` span, insert the comma the model tends to drop between
/// adjacent objects, and remove `//` comment lines. Comment stripping is
/// line-anchored so `https://` inside string values survives.
#[inline]
pub fn clean_json_output(text: &str) -> String {
    let text = FENCE.replace_all(text, "");
    let text = text.trim();

    let text = ARRAY_SPAN
        .find(text)
        .map_or_else(|| text.to_string(), |m| m.as_str().to_string());

    let text = MISSING_COMMA.replace_all(&text, "}, {");
    let text = COMMENT_LINE.replace_all(&text, "");

    text.trim().to_string()
}

/// Rewrite single-quoted strings to double-quoted JSON strings, leaving
/// proper double-quoted strings untouched. Tolerates `\'` escapes and
/// escapes any embedded double quotes.
fn relax_single_quotes(text: &str) -> String {
    #[derive(PartialEq)]
    enum Mode {
        Plain,
        Double,
        Single,
    }

    let mut out = String::with_capacity(text.len());
    let mut mode = Mode::Plain;
    let mut escaped = false;

    for c in text.chars() {
        match mode {
            Mode::Plain => match c {
                '\'' => {
                    mode = Mode::Single;
                    out.push('"');
                }
                '"' => {
                    mode = Mode::Double;
                    out.push('"');
                }
                _ => out.push(c),
            },
            Mode::Double => {
                if escaped {
                    escaped = false;
                    out.push(c);
                } else if c == '\\' {
                    escaped = true;
                    out.push(c);
                } else {
                    if c == '"' {
                        mode = Mode::Plain;
                    }
                    out.push(c);
                }
            }
            Mode::Single => {
                if escaped {
                    escaped = false;
                    if c == '\'' {
                        out.push('\'');
                    } else {
                        out.push('\\');
                        out.push(c);
                    }
                } else if c == '\\' {
                    escaped = true;
                } else if c == '\'' {
                    mode = Mode::Plain;
                    out.push('"');
                } else if c == '"' {
                    out.push('\\');
                    out.push('"');
                } else {
                    out.push(c);
                }
            }
        }
    }

    out
}

/// Parse sanitized model output as a JSON array: strict parse first, then a
/// permissive pass tolerating single-quoted keys/strings. When both fail the
/// raw output is preserved in the error so the caller can show it instead of
/// discarding the generated content.
#[inline]
pub fn parse_model_array<T: DeserializeOwned>(raw: &str) -> Result<Vec<T>> {
    let cleaned = clean_json_output(raw);

    match serde_json::from_str(&cleaned) {
        Ok(parsed) => Ok(parsed),
        Err(strict_err) => {
            debug!("Strict JSON parse failed ({strict_err}), trying permissive parse");
            let relaxed = relax_single_quotes(&cleaned);
            serde_json::from_str(&relaxed).map_err(|permissive_err| {
                debug!("Permissive JSON parse failed: {permissive_err}");
                StudyError::MalformedOutput {
                    raw: raw.to_string(),
                }
            })
        }
    }
}
