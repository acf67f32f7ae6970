use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Environment;

/// A text model that turns instructions plus input into free-form output.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, instructions: &str, input: &str) -> anyhow::Result<String>;
}

#[derive(Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
}

impl OpenAiConfig {
    pub fn from_environment(env: &Environment) -> anyhow::Result<Self> {
        let api_key = env
            .openai_api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY is not set"))?;
        Ok(Self {
            base_url: env.openai_base_url.clone(),
            api_key,
            model: env.openai_model.clone(),
            temperature: env.openai_temperature,
        })
    }
}

pub fn responses_endpoint(base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    format!("{base_url}/responses")
}

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    instructions: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    store: bool,
}

#[derive(Debug, Deserialize)]
struct ResponsesBody {
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

pub struct OpenAiModel {
    client: reqwest::Client,
    endpoint: String,
    config: OpenAiConfig,
}

impl OpenAiModel {
    pub fn new(config: OpenAiConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .context("build openai http client")?;
        Ok(Self {
            client,
            endpoint: responses_endpoint(&config.base_url),
            config,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    async fn complete(&self, instructions: &str, input: &str) -> anyhow::Result<String> {
        // GPT-5 family rejects sampling params.
        let temperature = (!self.config.model.starts_with("gpt-5")).then_some(self.config.temperature);
        let body = ResponsesRequest {
            model: &self.config.model,
            instructions,
            input,
            temperature,
            store: false,
        };

        tracing::debug!(model = %self.config.model, input_chars = input.len(), "openai request");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {}", self.endpoint))?;

        let status = response.status();
        let raw = response.text().await.context("read OpenAI response body")?;
        if !status.is_success() {
            let message = parse_error_message(&raw).unwrap_or(raw);
            anyhow::bail!("OpenAI API error ({status}): {message}");
        }

        let body: ResponsesBody = serde_json::from_str(&raw).context("parse OpenAI response")?;
        output_text(&body).context("extract output text")
    }
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(raw_json)
        .ok()
        .map(|body| body.error.message)
}

fn output_text(body: &ResponsesBody) -> anyhow::Result<String> {
    let text = body
        .output
        .iter()
        .filter(|item| item.kind == "message")
        .flat_map(|item| item.content.iter())
        .filter(|part| part.kind == "output_text")
        .filter_map(|part| part.text.as_deref())
        .collect::<String>();

    if text.trim().is_empty() {
        anyhow::bail!("OpenAI output text is empty");
    }
    Ok(text)
}
