//! Best-effort recovery of JSON values from model output.
//!
//! Text is run through [`Strategy::ORDER`]; the first strategy whose
//! candidate parses wins. Already-structured values pass through untouched.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

const INPUT_PREFIX_CHARS: usize = 100;

static UNQUOTED_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+):\s").expect("valid unquoted key pattern"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid JSON output: {message}; could not recover from input starting with {input_prefix:?}")]
pub struct JsonSalvageError {
    /// Message of the first parse error (the direct parse of the full text).
    pub message: String,
    /// First 100 characters of the input, for diagnostics.
    pub input_prefix: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Direct,
    Fence,
    BracketSpan,
    UnquotedKeys,
}

impl Strategy {
    pub const ORDER: [Strategy; 4] = [
        Strategy::Direct,
        Strategy::Fence,
        Strategy::BracketSpan,
        Strategy::UnquotedKeys,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Strategy::Direct => "direct",
            Strategy::Fence => "fence",
            Strategy::BracketSpan => "bracket_span",
            Strategy::UnquotedKeys => "unquoted_keys",
        }
    }

    /// Returns `None` when the strategy does not apply to `text`.
    fn attempt(self, text: &str) -> Option<Result<Value, serde_json::Error>> {
        match self {
            Strategy::Direct => Some(serde_json::from_str(text)),
            Strategy::Fence => fenced_json(text).map(serde_json::from_str),
            Strategy::BracketSpan => bracket_span(text).map(serde_json::from_str),
            Strategy::UnquotedKeys => quote_bare_keys(text).map(|repaired| {
                serde_json::from_str(&repaired).or_else(|err| {
                    let trimmed = repaired.trim();
                    if trimmed.starts_with('{') || trimmed.starts_with('[') {
                        return Err(err);
                    }
                    serde_json::from_str(&format!("{{{trimmed}}}"))
                })
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SalvageInput<'a> {
    Text(Cow<'a, str>),
    Structured(Value),
}

impl<'a> From<&'a str> for SalvageInput<'a> {
    fn from(text: &'a str) -> Self {
        SalvageInput::Text(Cow::Borrowed(text))
    }
}

impl<'a> From<&'a String> for SalvageInput<'a> {
    fn from(text: &'a String) -> Self {
        SalvageInput::Text(Cow::Borrowed(text.as_str()))
    }
}

impl From<String> for SalvageInput<'static> {
    fn from(text: String) -> Self {
        SalvageInput::Text(Cow::Owned(text))
    }
}

impl From<Value> for SalvageInput<'static> {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => SalvageInput::Text(Cow::Owned(text)),
            other => SalvageInput::Structured(other),
        }
    }
}

pub fn salvage<'a>(input: impl Into<SalvageInput<'a>>) -> Result<Value, JsonSalvageError> {
    match input.into() {
        SalvageInput::Structured(value) => Ok(value),
        SalvageInput::Text(text) => recover(&text).map(|(value, _)| value),
    }
}

/// Like [`salvage`], then validates the result against `schema`.
///
/// Schema violations are logged and the value is returned anyway.
pub fn salvage_with_schema<'a>(
    input: impl Into<SalvageInput<'a>>,
    schema: &Value,
) -> Result<Value, JsonSalvageError> {
    let value = salvage(input)?;
    warn_on_schema_violations(&value, schema);
    Ok(value)
}

/// Runs the strategies over `text` and reports which one succeeded.
pub fn recover(text: &str) -> Result<(Value, Strategy), JsonSalvageError> {
    let mut first_error: Option<serde_json::Error> = None;

    for strategy in Strategy::ORDER {
        let Some(outcome) = strategy.attempt(text) else {
            continue;
        };
        match outcome {
            Ok(value) => {
                if strategy != Strategy::Direct {
                    tracing::debug!(strategy = strategy.name(), "salvaged json");
                }
                return Ok((value, strategy));
            }
            Err(err) => {
                tracing::debug!(strategy = strategy.name(), error = %err, "salvage strategy failed");
                first_error.get_or_insert(err);
            }
        }
    }

    let message = first_error
        .map(|err| err.to_string())
        .unwrap_or_else(|| "no recovery strategy applied".to_owned());
    let input_prefix = text.chars().take(INPUT_PREFIX_CHARS).collect::<String>();
    tracing::error!(error = %message, input_prefix = %input_prefix, "failed to salvage json");

    Err(JsonSalvageError {
        message,
        input_prefix,
    })
}

fn fenced_json(text: &str) -> Option<&str> {
    const MARKER: &str = "```json";

    let open = text.to_ascii_lowercase().find(MARKER)?;
    let rest = &text[open + MARKER.len()..];
    let close = rest.find("```")?;
    Some(rest[..close].trim())
}

// Known limitation: unrelated braces before or after the value widen the span.
fn bracket_span(text: &str) -> Option<&str> {
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (text.find(open), text.rfind(close)) {
            return Some(if end > start { &text[start..=end] } else { "" });
        }
    }
    None
}

fn quote_bare_keys(text: &str) -> Option<String> {
    if text.contains('"') || !UNQUOTED_KEY.is_match(text) {
        return None;
    }
    Some(UNQUOTED_KEY.replace_all(text, r#""${1}": "#).into_owned())
}

fn warn_on_schema_violations(value: &Value, schema: &Value) {
    let compiled = match jsonschema::JSONSchema::compile(schema) {
        Ok(compiled) => compiled,
        Err(err) => {
            tracing::warn!(error = %err, "invalid json schema; skipping validation");
            return;
        }
    };

    if let Err(errors) = compiled.validate(value) {
        for err in errors {
            tracing::warn!(error = %err, "json validation error");
        }
    }
}
