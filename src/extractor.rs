use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::{ConfigurationError, ExtractError};
use crate::models::RawResponse;

pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";

/// Structured-extraction capability. One call is one remote attempt; retrying
/// is the caller's business.
#[async_trait]
pub trait RemoteExtractor: Send + Sync {
    async fn extract(&self, prompt: &str, schema: &Value) -> Result<RawResponse, ExtractError>;
}

// Gemini generateContent request format
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'a str,
    response_json_schema: &'a Value,
}

// Gemini generateContent response format (only what we read)
#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateResponse {
    fn into_text(self) -> Option<String> {
        let text: String = self
            .candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .filter_map(|part| part.text)
            .collect();
        (!text.is_empty()).then_some(text)
    }
}

pub struct GeminiExtractor {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiExtractor {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ConfigurationError> {
        let api_key = api_key.into();
        let model = model.into();
        if api_key.trim().is_empty() {
            return Err(ConfigurationError::Invalid("Gemini API key is empty".into()));
        }
        if model.trim().is_empty() {
            return Err(ConfigurationError::Invalid("model name is empty".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigurationError::Invalid(format!("http client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

#[async_trait]
impl RemoteExtractor for GeminiExtractor {
    async fn extract(&self, prompt: &str, schema: &Value) -> Result<RawResponse, ExtractError> {
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_json_schema: schema,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExtractError::Transient(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &self.model, &detail));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ExtractError::Invalid(format!("malformed response body: {e}")))?;

        let text = parsed
            .into_text()
            .ok_or_else(|| ExtractError::Invalid("response contained no text".into()))?;
        debug!(model = %self.model, chars = text.len(), "extraction response received");

        Ok(RawResponse { text })
    }
}

// Timeouts, throttling and server faults may clear up; any other status will not
fn classify_status(status: StatusCode, model: &str, detail: &str) -> ExtractError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            ExtractError::Transient(format!("{model} rate limited the request"))
        }
        StatusCode::REQUEST_TIMEOUT => ExtractError::Transient("request timed out".into()),
        s if s.is_server_error() => {
            ExtractError::Transient(format!("status {}: {detail}", s.as_u16()))
        }
        s => ExtractError::Rejected(format!("status {}: {detail}", s.as_u16())),
    }
}

impl std::fmt::Debug for GeminiExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiExtractor")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn extractor(server: &MockServer) -> GeminiExtractor {
        GeminiExtractor::new("test-key", "test-model", server.uri(), Duration::from_secs(5))
            .unwrap()
    }

    #[test]
    fn rejects_empty_key() {
        let result = GeminiExtractor::new(" ", "m", DEFAULT_GEMINI_URL, Duration::from_secs(1));
        assert!(matches!(result, Err(ConfigurationError::Invalid(_))));
    }

    #[test]
    fn debug_output_hides_the_key() {
        let extractor =
            GeminiExtractor::new("secret", "m", DEFAULT_GEMINI_URL, Duration::from_secs(1))
                .unwrap();
        assert!(!format!("{extractor:?}").contains("secret"));
    }

    #[tokio::test]
    async fn returns_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/test-model:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({
                "generationConfig": { "responseMimeType": "application/json" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": "{\"qa\": []}" }] } }]
            })))
            .mount(&server)
            .await;

        let raw = extractor(&server)
            .extract("prompt", &json!({ "type": "object" }))
            .await
            .unwrap();

        assert_eq!(raw.text, "{\"qa\": []}");
    }

    #[tokio::test]
    async fn server_errors_are_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = extractor(&server)
            .extract("prompt", &json!({}))
            .await
            .unwrap_err();

        assert_eq!(err, ExtractError::Transient("status 503: overloaded".into()));
    }

    #[test]
    fn only_retryable_statuses_are_transient() {
        let kind = |code: u16| classify_status(StatusCode::from_u16(code).unwrap(), "m", "x");

        assert!(matches!(kind(408), ExtractError::Transient(_)));
        assert!(matches!(kind(429), ExtractError::Transient(_)));
        assert!(matches!(kind(500), ExtractError::Transient(_)));
        assert_eq!(kind(400), ExtractError::Rejected("status 400: x".into()));
        assert!(matches!(kind(401), ExtractError::Rejected(_)));
        assert!(matches!(kind(403), ExtractError::Rejected(_)));
    }

    #[tokio::test]
    async fn bad_credentials_are_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("API key not valid"))
            .expect(1)
            .mount(&server)
            .await;

        let err = extractor(&server)
            .extract("prompt", &json!({}))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ExtractError::Rejected("status 403: API key not valid".into())
        );
    }

    #[tokio::test]
    async fn empty_candidates_are_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let err = extractor(&server)
            .extract("prompt", &json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractError::Invalid(_)));
    }
}
