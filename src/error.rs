use std::time::Duration;
use thiserror::Error;

// Invalid limiter / retry / client parameters. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("rate limit must be greater than zero")]
    ZeroLimit,

    #[error("rate window must be greater than zero")]
    ZeroWindow,

    #[error("max retries must be greater than zero")]
    ZeroRetries,

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// Failure of a single remote extraction attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    // network, 429, 5xx ... worth another try
    #[error("transient failure: {0}")]
    Transient(String),

    // response did not match the expected schema
    #[error("validation failed: {0}")]
    Invalid(String),

    // the provider refused the request itself (400, 401, 403 ...)
    #[error("request rejected: {0}")]
    Rejected(String),
}

// Why a retried call gave up
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimitExceeded { retry_after: Option<Duration> },

    #[error("all {attempts} attempts failed: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error("request rejected after {attempts} attempt(s): {reason}")]
    Rejected { attempts: u32, reason: String },

    #[error("deadline exceeded after {elapsed:?}")]
    DeadlineExceeded { elapsed: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScrapeError {
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("{url} contained no readable text")]
    Empty { url: String },
}
