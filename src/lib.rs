//! Note extraction service built around a shared sliding-window rate limiter
//! and a retrying caller for unreliable structured-extraction requests.

pub mod cache;
pub mod config;
pub mod error;
pub mod extractor;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod rate_limit;
pub mod retry;
pub mod scrape;
pub mod state;

pub use error::{CallError, ConfigurationError, ExtractError, ScrapeError};
pub use models::Note;
pub use orchestrator::ExtractionOrchestrator;
pub use rate_limit::{FixedWindowLimiter, RateLimiter, SlidingWindowLimiter};
pub use retry::{Admission, Attempt, RetryPolicy, RetryingCaller};
