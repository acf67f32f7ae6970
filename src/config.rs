use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::fetch::{DEFAULT_USER_AGENT, ScrapeConfig};
use crate::search::{DEFAULT_INCLUDE_DOMAINS, DEFAULT_TAVILY_BASE_URL, SearchConfig, SearchDepth};

/// Settings for the scrape and search tools, read from `--config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    /// Request timeout in seconds.
    pub timeout: u64,
    pub max_retries: u32,
    pub user_agent: String,
    pub max_results: u32,
    pub search_depth: SearchDepth,
    pub include_domains: Vec<String>,
    pub exclude_domains: Vec<String>,
    pub include_answer: bool,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            timeout: 30,
            max_retries: 3,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            max_results: 5,
            search_depth: SearchDepth::Advanced,
            include_domains: DEFAULT_INCLUDE_DOMAINS
                .iter()
                .map(|d| (*d).to_owned())
                .collect(),
            exclude_domains: Vec::new(),
            include_answer: true,
        }
    }
}

impl ToolConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config: {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("parse config: {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(raw).context("deserialize tool config")?;
        if config.max_retries == 0 {
            anyhow::bail!("max_retries must be >= 1");
        }
        if config.timeout == 0 {
            anyhow::bail!("timeout must be >= 1 second");
        }
        Ok(config)
    }

    pub fn scrape(&self) -> ScrapeConfig {
        ScrapeConfig {
            timeout: Duration::from_secs(self.timeout),
            max_retries: self.max_retries,
            user_agent: self.user_agent.clone(),
            ..ScrapeConfig::default()
        }
    }

    pub fn search(&self, base_url: &str) -> SearchConfig {
        SearchConfig {
            base_url: base_url.to_owned(),
            max_results: self.max_results,
            search_depth: self.search_depth,
            include_answer: self.include_answer,
            include_domains: self.include_domains.clone(),
            exclude_domains: self.exclude_domains.clone(),
            timeout: Duration::from_secs(self.timeout),
        }
    }
}

/// Credentials and endpoints taken from the process environment.
#[derive(Clone)]
pub struct Environment {
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub openai_temperature: f32,
    pub tavily_api_key: Option<String>,
    pub tavily_base_url: String,
    pub debug: bool,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<set>"))
            .field("openai_base_url", &self.openai_base_url)
            .field("openai_model", &self.openai_model)
            .field("openai_temperature", &self.openai_temperature)
            .field("tavily_api_key", &self.tavily_api_key.as_ref().map(|_| "<set>"))
            .field("tavily_base_url", &self.tavily_base_url)
            .field("debug", &self.debug)
            .finish()
    }
}

impl Environment {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let openai_temperature = match non_empty("PROPOSALSMITH_OPENAI_TEMPERATURE") {
            Some(raw) => raw
                .trim()
                .parse::<f32>()
                .with_context(|| format!("parse PROPOSALSMITH_OPENAI_TEMPERATURE: {raw}"))?,
            None => 0.0,
        };

        Ok(Self {
            openai_api_key: non_empty("OPENAI_API_KEY"),
            openai_base_url: non_empty("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_owned()),
            openai_model: non_empty("PROPOSALSMITH_OPENAI_MODEL")
                .unwrap_or_else(|| "gpt-4o".to_owned()),
            openai_temperature,
            tavily_api_key: non_empty("TAVILY_API_KEY"),
            tavily_base_url: non_empty("TAVILY_BASE_URL")
                .unwrap_or_else(|| DEFAULT_TAVILY_BASE_URL.to_owned()),
            debug: non_empty("DEBUG").is_some_and(|v| is_truthy(&v)),
        })
    }
}

pub fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "t")
}
