//! Note use cases: parse, generate, fetch-and-extract and Q&A.
//!
//! Every operation returns a [`Note`] envelope, never an error. Remote calls
//! go through the [`RetryingCaller`]; when it gives up, the raw input is
//! decoded naively instead so the caller's content is never lost. An
//! optional [`ResponseCache`] answers repeated requests before any rate
//! budget is spent.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::{ResponseCache, make_cache_key};
use crate::error::{CallError, ConfigurationError};
use crate::extractor::RemoteExtractor;
use crate::metrics::FALLBACK_TOTAL;
use crate::models::{ExtractedArticle, Note, QaSet, RawResponse};
use crate::retry::{Attempt, RetryingCaller};
use crate::scrape::Scraper;

const NO_CLIENT: &str = "No extraction client configured";

pub struct ExtractionOrchestrator {
    extractor: Option<Arc<dyn RemoteExtractor>>,
    scraper: Arc<dyn Scraper>,
    caller: RetryingCaller<String>,
    cache: Option<ResponseCache>,
    // every remote call of this orchestrator draws from one budget
    budget_key: String,
    max_retries: u32,
}

impl ExtractionOrchestrator {
    pub fn new(
        extractor: Option<Arc<dyn RemoteExtractor>>,
        scraper: Arc<dyn Scraper>,
        caller: RetryingCaller<String>,
        budget_key: impl Into<String>,
        max_retries: u32,
    ) -> Result<Self, ConfigurationError> {
        if max_retries == 0 {
            return Err(ConfigurationError::ZeroRetries);
        }
        Ok(Self {
            extractor,
            scraper,
            caller,
            cache: None,
            budget_key: budget_key.into(),
            max_retries,
        })
    }

    /// Serve repeated extractions from `cache` without touching the limiter.
    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn has_remote(&self) -> bool {
        self.extractor.is_some()
    }

    /// Decode `raw` as an already structured note. Never touches the network.
    pub fn naive_parse(raw: &str) -> Note {
        match Note::from_json_lenient(raw) {
            Ok(note) => note,
            Err(e) => Note::failed(raw, format!("Naive JSON parsing failed: {e}")),
        }
    }

    /// Parse a user-supplied note through remote extraction, or decode it
    /// locally when no client is configured.
    pub async fn parse(&self, raw: &str) -> Note {
        if raw.trim().is_empty() {
            return Note::failed(raw, "Note content is empty");
        }
        let Some(extractor) = &self.extractor else {
            return Self::naive_parse(raw);
        };

        match self
            .extract_structured::<Note>(
                extractor.as_ref(),
                &note_prompt(raw),
                &Note::json_schema(),
            )
            .await
        {
            Ok(note) => {
                info!("note extracted remotely");
                note
            }
            Err(err) => fallback(raw, failure_message(&err)),
        }
    }

    /// Extract a note from free article text.
    pub async fn generate(&self, content: &str) -> Note {
        if content.trim().is_empty() {
            return Note::failed(content, "Content is empty");
        }

        let Some(extractor) = &self.extractor else {
            let mut note = Self::naive_parse(content);
            if !note.success {
                note.push_error(NO_CLIENT);
            }
            return note;
        };

        match self
            .extract_structured::<ExtractedArticle>(
                extractor.as_ref(),
                &article_prompt(content),
                &ExtractedArticle::json_schema(),
            )
            .await
        {
            Ok(article) => {
                info!(title = %article.title, "article extracted remotely");
                Note::from(article)
            }
            Err(err) => fallback(content, failure_message(&err)),
        }
    }

    /// Scrape `url` and extract a note from its text. Scraping is not retried.
    pub async fn fetch_and_extract(&self, url: &str) -> Note {
        let url = url.trim();
        if url.is_empty() {
            return Note::failed("", "URL is required");
        }

        match self.scraper.scrape(url).await {
            Ok(text) => self.generate(&text).await,
            Err(e) => {
                warn!(url, error = %e, "scrape failed");
                Note::failed("", format!("Scraping failed: {e}"))
            }
        }
    }

    /// Attach generated question / answer pairs to a successful note.
    pub async fn generate_qa(&self, mut note: Note) -> Note {
        if !note.success {
            note.push_error("Cannot generate Q&A for unsuccessful note");
            return note;
        }
        let Some(extractor) = &self.extractor else {
            note.success = false;
            note.push_error(format!("{NO_CLIENT}. Cannot generate Q&A."));
            return note;
        };
        if note.content.trim().is_empty() {
            note.success = false;
            note.push_error("Note content is empty. Cannot generate Q&A.");
            return note;
        }

        match self
            .extract_structured::<QaSet>(
                extractor.as_ref(),
                &qa_prompt(&note.content),
                &QaSet::json_schema(),
            )
            .await
        {
            Ok(set) => {
                info!(pairs = set.qa.len(), "Q&A generated");
                note.qa = set.qa;
            }
            Err(err) => {
                warn!(error = %err, "Q&A generation failed");
                note.success = false;
                note.push_error(format!("Q&A generation failed: {}", failure_detail(&err)));
            }
        }
        note
    }

    // One remote extraction, validated into `T`, under the retry policy.
    // Cache hits skip admission; only validated responses are stored.
    async fn extract_structured<T>(
        &self,
        extractor: &dyn RemoteExtractor,
        prompt: &str,
        schema: &Value,
    ) -> Result<T, CallError>
    where
        T: DeserializeOwned + Send,
    {
        let cache_key = self
            .cache
            .as_ref()
            .map(|_| make_cache_key(&self.budget_key, prompt, schema));
        let cached = self
            .cache
            .as_ref()
            .zip(cache_key.as_deref())
            .and_then(|(cache, key)| cache.lookup(key))
            .and_then(|raw| serde_json::from_str::<T>(&raw.text).ok());
        if let Some(value) = cached {
            return Ok(value);
        }

        let (value, raw) = self
            .caller
            .call(
                || async move {
                    match extractor.extract(prompt, schema).await {
                        Ok(raw) => match serde_json::from_str::<T>(&raw.text) {
                            Ok(value) => Attempt::Success((value, raw)),
                            Err(e) => Attempt::Invalid(e.to_string()),
                        },
                        Err(e) => Err::<(T, RawResponse), _>(e).into(),
                    }
                },
                &self.budget_key,
                self.max_retries,
            )
            .await?;

        if let (Some(cache), Some(key)) = (&self.cache, cache_key) {
            cache.store(key, raw);
        }
        Ok(value)
    }
}

// Degraded result once the remote path is gone: naive decode of the input
fn fallback(raw: &str, cause: String) -> Note {
    FALLBACK_TOTAL.inc();
    warn!(%cause, "using fallback parser");
    match Note::from_json_lenient(raw) {
        Ok(mut note) => {
            note.push_error(cause);
            note
        }
        // the input was free text; exhaustion is the only cause worth reporting
        Err(_) => Note::failed(raw, cause),
    }
}

fn failure_message(err: &CallError) -> String {
    match err {
        CallError::Exhausted { .. } => {
            format!("All extraction attempts failed: {}", failure_detail(err))
        }
        other => format!("Extraction failed: {other}"),
    }
}

fn failure_detail(err: &CallError) -> String {
    match err {
        CallError::Exhausted { last_error, .. } => last_error.clone(),
        other => other.to_string(),
    }
}

fn note_prompt(raw: &str) -> String {
    format!(
        "Extract the key information from the following note and format it according to the \
         given schema. Use plain text without Markdown.\n\nNote Content:\n{raw}"
    )
}

fn article_prompt(content: &str) -> String {
    format!(
        "Extract the key information from the following article and format it according to the \
         given schema. Use plain text without Markdown.\n\nArticle Content:\n{content}"
    )
}

fn qa_prompt(content: &str) -> String {
    format!(
        "Generate insightful questions with their answers covering the key concepts of the \
         following note.\n\nNote Content:\n{content}"
    )
}
