//! Tolerant JSON extraction for LLM output
//!
//! Models wrap JSON in prose, fence it in markdown, or emit almost-JSON with
//! trailing commas and smart quotes. [`parse_llm_json`] finds the JSON-shaped
//! region and, if a strict parse fails, applies a fixed sequence of purely
//! textual repairs before trying once more. Everything here is deterministic
//! and does no I/O.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{truncate_chars, ParseError, RAW_SNIPPET_CHARS};

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```(?:json)?\s*(.*?)```").expect("valid regex"));
static TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*([}\]])").expect("valid regex"));
static SINGLE_QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([:{\[,\s])'([^']*)'").expect("valid regex"));
static BARE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([,{\s])([A-Za-z0-9_\-]+)\s*:").expect("valid regex"));
static REPEATED_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*,").expect("valid regex"));

/// Model output handed to the parser
#[derive(Debug, Clone)]
pub enum LlmOutput {
    /// Raw completion text
    Text(String),
    /// Already structured; returned unchanged
    Structured(Value),
}

impl From<&str> for LlmOutput {
    fn from(text: &str) -> Self {
        LlmOutput::Text(text.to_string())
    }
}

impl From<String> for LlmOutput {
    fn from(text: String) -> Self {
        LlmOutput::Text(text)
    }
}

impl From<Value> for LlmOutput {
    fn from(value: Value) -> Self {
        LlmOutput::Structured(value)
    }
}

/// Extract and parse the JSON payload of a model response
pub fn parse_llm_json(output: impl Into<LlmOutput>) -> Result<Value, ParseError> {
    let raw = match output.into() {
        LlmOutput::Structured(value) => return Ok(value),
        LlmOutput::Text(text) => text,
    };

    let candidate = extract_candidate(&raw).ok_or_else(|| ParseError::NoJson {
        snippet: truncate_chars(&raw, RAW_SNIPPET_CHARS).to_string(),
    })?;

    let first_error = match serde_json::from_str::<Value>(candidate) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    debug!("Strict JSON parse failed ({}), attempting repairs", first_error);
    let repaired = repair_json(candidate);

    match serde_json::from_str::<Value>(&repaired) {
        Ok(value) => {
            warn!("parse_llm_json: parsed after repairs");
            Ok(value)
        }
        Err(repair_error) => Err(ParseError::Malformed {
            original: candidate.to_string(),
            repaired,
            first_error: first_error.to_string(),
            repair_error: repair_error.to_string(),
        }),
    }
}

/// Parse a model response straight into a typed structure
pub fn parse_llm_as<T: DeserializeOwned>(
    output: impl Into<LlmOutput>,
    expected: &'static str,
) -> Result<T, ParseError> {
    let value = parse_llm_json(output)?;
    serde_json::from_value(value).map_err(|e| ParseError::Shape {
        expected,
        message: e.to_string(),
    })
}

/// Locate the JSON-shaped region: a fenced block first, else the outermost braces
pub fn extract_candidate(raw: &str) -> Option<&str> {
    if let Some(inner) = FENCED_BLOCK
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
    {
        if !inner.is_empty() {
            return Some(inner);
        }
    }

    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end > start {
        Some(&raw[start..=end])
    } else {
        None
    }
}

/// Apply the textual repairs in order. Pure; never fails.
pub fn repair_json(candidate: &str) -> String {
    let repaired = TRAILING_COMMA.replace_all(candidate, "${1}");
    let repaired = repaired
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    let repaired = SINGLE_QUOTED.replace_all(&repaired, "${1}\"${2}\"");
    let repaired = BARE_KEY.replace_all(&repaired, "${1}\"${2}\":");
    REPEATED_COMMA.replace_all(&repaired, ",").into_owned()
}
