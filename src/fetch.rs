//! Fetching a page over HTTP with bounded retry, then extracting it.

use std::time::Duration;

use anyhow::Context as _;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde::Serialize;
use url::Url;

use crate::extract::{self, ContentSource, PageMetadata};

pub const MAX_CONTENT_CHARS: usize = 8000;
const RAW_PREFIX_CHARS: usize = 1000;

pub const DEFAULT_USER_AGENT: &str = "Research Proposal Generator Bot";

#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub timeout: Duration,
    /// Total attempts allowed for transient failures (timeouts, 429, 503).
    pub max_retries: u32,
    pub user_agent: String,
    /// Delay before the second attempt; doubles for every further attempt.
    pub backoff_base: Duration,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            backoff_base: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScrapedPage {
    pub url: String,
    pub content: String,
    /// Character count of the content before truncation.
    pub total_chars: usize,
    pub truncated: bool,
    pub source: ContentSource,
    pub metadata: PageMetadata,
}

impl ScrapedPage {
    pub fn from_html(url: &str, html: &str) -> Self {
        let page = extract::extract_page(html);
        let total_chars = page.content.chars().count();
        let truncated = total_chars > MAX_CONTENT_CHARS;
        let content = if truncated {
            page.content.chars().take(MAX_CONTENT_CHARS).collect()
        } else {
            page.content
        };

        Self {
            url: url.to_owned(),
            content,
            total_chars,
            truncated,
            source: page.source,
            metadata: page.metadata,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(title) = &self.metadata.title {
            out.push_str(&format!("Title: {title}\n\n"));
        }
        if let Some(authors) = &self.metadata.authors {
            out.push_str(&format!("Authors: {authors}\n\n"));
        }
        if let Some(date) = &self.metadata.publication_date {
            out.push_str(&format!("Publication Date: {date}\n\n"));
        }

        if self.truncated {
            out.push_str(&format!("Content (truncated):\n{}...\n\n", self.content));
            out.push_str(&format!(
                "[Content truncated, full text is {} characters]",
                self.total_chars
            ));
        } else {
            out.push_str(&format!("Content:\n{}", self.content));
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error {status} after {attempts} attempt(s)")]
    Status { status: u16, attempts: u32 },
    #[error("request timed out after {attempts} attempt(s)")]
    TimedOut { attempts: u32 },
    #[error("failed to fetch URL: {message}")]
    Request { message: String, attempts: u32 },
}

impl FetchError {
    pub fn attempts(&self) -> u32 {
        match self {
            FetchError::Status { attempts, .. }
            | FetchError::TimedOut { attempts }
            | FetchError::Request { attempts, .. } => *attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageFetchResult {
    Page(ScrapedPage),
    NotHtml {
        url: String,
        content_type: String,
        raw_prefix: String,
    },
    Failed {
        url: String,
        error: FetchError,
    },
}

impl PageFetchResult {
    pub fn page(&self) -> Option<&ScrapedPage> {
        match self {
            PageFetchResult::Page(page) => Some(page),
            _ => None,
        }
    }

    pub fn render(&self) -> String {
        match self {
            PageFetchResult::Page(page) => page.render(),
            PageFetchResult::NotHtml { content_type, .. } => format!(
                "Failed to scrape website: URL does not contain HTML content. Content-Type: {content_type}"
            ),
            PageFetchResult::Failed { error, .. } => format!("Failed to scrape website: {error}"),
        }
    }
}

enum Attempt {
    Success { content_type: String, body: String },
    Transient(FetchError),
    Permanent(FetchError),
}

pub struct WebFetcher {
    client: reqwest::Client,
    config: ScrapeConfig,
}

impl WebFetcher {
    pub fn new(config: ScrapeConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build scrape http client")?;
        Ok(Self { client, config })
    }

    /// Never fails: network and HTTP problems come back as [`PageFetchResult::Failed`].
    pub async fn fetch_and_extract(&self, url: &str) -> PageFetchResult {
        tracing::info!(%url, "scraping website");

        if let Err(message) = check_url(url) {
            return PageFetchResult::Failed {
                url: url.to_owned(),
                error: FetchError::Request {
                    message,
                    attempts: 0,
                },
            };
        }

        let ceiling = self.config.max_retries.max(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.attempt(url, attempt).await {
                Attempt::Success { content_type, body } => {
                    return self.classify(url, &content_type, &body);
                }
                Attempt::Permanent(error) => {
                    tracing::error!(%url, %error, "scrape failed");
                    return PageFetchResult::Failed {
                        url: url.to_owned(),
                        error,
                    };
                }
                Attempt::Transient(error) => {
                    if attempt >= ceiling {
                        tracing::error!(%url, %error, max_retries = ceiling, "max retries exceeded");
                        return PageFetchResult::Failed {
                            url: url.to_owned(),
                            error,
                        };
                    }
                    let delay = backoff_delay(self.config.backoff_base, attempt);
                    tracing::warn!(
                        %url,
                        %error,
                        attempt,
                        max_retries = ceiling,
                        ?delay,
                        "transient scrape failure; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn attempt(&self, url: &str, attempt: u32) -> Attempt {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, &self.config.user_agent)
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) => return request_failure(&err, attempt),
        };

        let status = response.status();
        if !status.is_success() {
            let error = FetchError::Status {
                status: status.as_u16(),
                attempts: attempt,
            };
            return if is_transient_status(status) {
                Attempt::Transient(error)
            } else {
                Attempt::Permanent(error)
            };
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();

        match response.text().await {
            Ok(body) => Attempt::Success { content_type, body },
            Err(err) => request_failure(&err, attempt),
        }
    }

    fn classify(&self, url: &str, content_type: &str, body: &str) -> PageFetchResult {
        if !is_html(content_type) {
            tracing::warn!(%url, content_type, "url does not contain html content");
            return PageFetchResult::NotHtml {
                url: url.to_owned(),
                content_type: content_type.to_owned(),
                raw_prefix: body.chars().take(RAW_PREFIX_CHARS).collect(),
            };
        }

        let page = ScrapedPage::from_html(url, body);
        tracing::info!(
            %url,
            source = ?page.source,
            chars = page.total_chars,
            truncated = page.truncated,
            "scraped website"
        );
        PageFetchResult::Page(page)
    }
}

fn check_url(url: &str) -> Result<(), String> {
    let parsed = Url::parse(url).map_err(|err| format!("invalid URL {url}: {err}"))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(format!("URL must be http/https: {url}"));
    }
    Ok(())
}

fn request_failure(err: &reqwest::Error, attempt: u32) -> Attempt {
    if err.is_timeout() {
        Attempt::Transient(FetchError::TimedOut { attempts: attempt })
    } else {
        Attempt::Permanent(FetchError::Request {
            message: err.to_string(),
            attempts: attempt,
        })
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE
}

fn is_html(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    content_type.contains("text/html") || content_type.contains("application/xhtml+xml")
}

/// Delay after the `attempt`-th (1-based) failed attempt: `base * 2^(attempt - 1)`.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor)
}
