use async_trait::async_trait;
use reqwest::Url;
use scraper::{Html, Node};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ConfigurationError, ScrapeError};

// Elements whose text is never part of the article
const SKIPPED: &[&str] = &["script", "style", "noscript", "head", "template"];

/// Turns a URL into plain text. Not retried by the orchestrator.
#[async_trait]
pub trait Scraper: Send + Sync {
    async fn scrape(&self, url: &str) -> Result<String, ScrapeError>;
}

pub struct HttpScraper {
    client: reqwest::Client,
}

impl HttpScraper {
    pub fn new(timeout: Duration) -> Result<Self, ConfigurationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigurationError::Invalid(format!("http client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Scraper for HttpScraper {
    async fn scrape(&self, url: &str) -> Result<String, ScrapeError> {
        let parsed = Url::parse(url).map_err(|e| ScrapeError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ScrapeError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| ScrapeError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url, status = status.as_u16(), "scrape failed");
            return Err(ScrapeError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let html = response.text().await.map_err(|e| ScrapeError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let text = html_to_text(&html);
        if text.is_empty() {
            return Err(ScrapeError::Empty {
                url: url.to_string(),
            });
        }
        debug!(url, chars = text.len(), "scraped page");
        Ok(text)
    }
}

/// Visible text of a document, one trimmed non-empty line per text run.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut lines = Vec::new();

    for node in document.tree.nodes() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|parent| {
            parent
                .value()
                .as_element()
                .is_some_and(|el| SKIPPED.contains(&el.name()))
        });
        if hidden {
            continue;
        }
        lines.extend(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        );
    }

    lines.join("\n")
}
