//! Documented shapes of the stage outputs.
//!
//! These are advisory: models are asked to follow them and the schemas are
//! checked with warnings only. Nothing downstream requires a value to match.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Paper {
    pub title: String,
    pub authors: String,
    #[serde(default)]
    pub year: Option<Value>,
    #[serde(default)]
    pub venue: Option<String>,
    pub url: String,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct PaperAnalysis {
    pub key_knowledge: Vec<String>,
    pub limitations: Vec<String>,
    #[serde(default)]
    pub methodologies: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SeedIdea {
    pub idea_title: String,
    pub description: String,
    pub rationale: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RefinedIdea {
    pub refined_idea_title: String,
    pub description: String,
    pub impact: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Proposal {
    pub proposal_title: String,
    pub methodology: Value,
    pub expected_outcomes: Value,
    #[serde(default)]
    pub timestamp: Option<String>,
}

pub fn schema_of<T: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Bool(true))
}

/// Renders a documented field value (string, list or object) as one line.
pub fn field_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "N/A".to_owned(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| field_text(Some(item)))
            .collect::<Vec<_>>()
            .join("; "),
        Some(other) => other.to_string(),
    }
}
