use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TAVILY_BASE_URL: &str = "https://api.tavily.com";

pub const DEFAULT_INCLUDE_DOMAINS: [&str; 11] = [
    "scholar.google.com",
    "arxiv.org",
    "academia.edu",
    "researchgate.net",
    "sciencedirect.com",
    "nature.com",
    "science.org",
    "pubmed.ncbi.nlm.nih.gov",
    "ieee.org",
    "acm.org",
    "jstor.org",
];

const ACADEMIC_TERMS: [&str; 6] = [
    "research",
    "paper",
    "study",
    "journal",
    "publication",
    "article",
];

const SUMMARY_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    Basic,
    #[default]
    Advanced,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub base_url: String,
    pub max_results: u32,
    pub search_depth: SearchDepth,
    pub include_answer: bool,
    pub include_domains: Vec<String>,
    pub exclude_domains: Vec<String>,
    pub timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_TAVILY_BASE_URL.to_owned(),
            max_results: 5,
            search_depth: SearchDepth::Advanced,
            include_answer: true,
            include_domains: DEFAULT_INCLUDE_DOMAINS
                .iter()
                .map(|d| (*d).to_owned())
                .collect(),
            exclude_domains: Vec::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
struct TavilySearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: SearchDepth,
    max_results: u32,
    include_answer: bool,
    include_domains: &'a [String],
    exclude_domains: &'a [String],
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
}

impl SearchResponse {
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.results.iter().filter_map(|hit| hit.url.as_deref())
    }

    pub fn render(&self, include_answer: bool) -> String {
        let mut output = Vec::new();

        if include_answer
            && let Some(answer) = self.answer.as_deref().filter(|a| !a.is_empty())
        {
            output.push(format!("Tavily Answer: {answer}\n"));
        }

        if self.results.is_empty() {
            output.push("No search results found.".to_owned());
            return output.join("\n");
        }

        output.push("Search Results:".to_owned());
        for (idx, hit) in self.results.iter().enumerate() {
            let title = hit.title.as_deref().unwrap_or("No Title");
            let url = hit.url.as_deref().unwrap_or("No URL");
            let content = hit.content.as_deref().unwrap_or("No Content");
            let summary = content.chars().take(SUMMARY_CHARS).collect::<String>();
            output.push(format!(
                "\n{n}. {title}\n   URL: {url}\n   Relevance Score: {score:.2}\n   Summary: {summary}...\n",
                n = idx + 1,
                score = hit.score.unwrap_or(0.0),
            ));
        }

        output.join("\n")
    }
}

/// Appends "research papers" unless the query already reads as academic.
pub fn optimize_query(query: &str) -> String {
    let lowered = query.to_lowercase();
    if ACADEMIC_TERMS.iter().any(|term| lowered.contains(term)) {
        query.to_owned()
    } else {
        format!("{query} research papers")
    }
}

pub struct TavilySearcher {
    api_key: String,
    client: reqwest::Client,
    config: SearchConfig,
}

impl TavilySearcher {
    pub fn new(api_key: String, config: SearchConfig) -> anyhow::Result<Self> {
        if api_key.trim().is_empty() {
            anyhow::bail!("Tavily API key is empty");
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("build search http client")?;
        Ok(Self {
            api_key,
            client,
            config,
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub async fn search(&self, query: &str) -> anyhow::Result<SearchResponse> {
        let optimized = optimize_query(query);
        tracing::info!(query, optimized = %optimized, "searching tavily");

        let endpoint = format!("{}/search", self.config.base_url.trim_end_matches('/'));
        let request = TavilySearchRequest {
            api_key: &self.api_key,
            query: &optimized,
            search_depth: self.config.search_depth,
            max_results: self.config.max_results,
            include_answer: self.config.include_answer,
            include_domains: &self.config.include_domains,
            exclude_domains: &self.config.exclude_domains,
        };

        let response = self
            .client
            .post(&endpoint)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("POST {endpoint}"))?;

        let status = response.status();
        let raw = response.text().await.context("read Tavily response body")?;
        if !status.is_success() {
            anyhow::bail!("Tavily API error ({status}): {raw}");
        }

        let parsed: SearchResponse =
            serde_json::from_str(&raw).context("parse Tavily response")?;
        tracing::info!(query, results = parsed.results.len(), "search completed");
        Ok(parsed)
    }
}
