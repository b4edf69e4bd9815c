use clap::{Parser, ValueEnum};
use std::time::Duration;

use crate::extractor::DEFAULT_GEMINI_URL;
use crate::retry::{Admission, RetryPolicy};

// CLI argument structure, every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "notes-gateway")]
#[command(about = "Rate limited note extraction service")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "NOTES_PORT", default_value_t = 8080)]
    pub port: u16,

    // Ingress rate limit: max requests per client IP per window
    #[arg(long, env = "NOTES_RATE_LIMIT", default_value_t = 60)]
    pub rate_limit: u32,

    // Ingress rate limit window in seconds
    #[arg(long, env = "NOTES_RATE_WINDOW", default_value_t = 60)]
    pub rate_window: u64,

    // Ingress limiter flavour
    #[arg(long, env = "NOTES_RATE_POLICY", value_enum, default_value_t = LimiterPolicy::Sliding)]
    pub rate_policy: LimiterPolicy,

    // Outbound budget: max extraction calls per window
    #[arg(long, env = "NOTES_EXTRACT_LIMIT", default_value_t = 10)]
    pub extract_limit: u32,

    // Outbound budget window in seconds
    #[arg(long, env = "NOTES_EXTRACT_WINDOW", default_value_t = 60)]
    pub extract_window: u64,

    // Attempts per extraction before falling back
    #[arg(long, env = "NOTES_MAX_RETRIES", default_value_t = 3)]
    pub max_retries: u32,

    // One backoff unit; attempt n waits 2^n units
    #[arg(long, env = "NOTES_BACKOFF_UNIT_MS", default_value_t = 1000)]
    pub backoff_unit_ms: u64,

    // Longest single sleep while waiting for an extraction slot
    #[arg(long, env = "NOTES_ADMISSION_POLL_MS", default_value_t = 250)]
    pub admission_poll_ms: u64,

    // Total budget for one extraction call in seconds (unbounded if unset)
    #[arg(long, env = "NOTES_OVERALL_TIMEOUT")]
    pub overall_timeout: Option<u64>,

    // Extraction cache TTL in seconds (0 disables the cache)
    #[arg(short, long, env = "NOTES_CACHE_TTL", default_value_t = 300)]
    pub cache_ttl: u64,

    // Without a key the service only parses structured notes locally
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    #[arg(long, env = "GEMINI_MODEL", default_value = "gemini-2.5-flash")]
    pub model: String,

    #[arg(long, env = "GEMINI_BASE_URL", default_value = DEFAULT_GEMINI_URL)]
    pub gemini_base_url: String,

    // Timeout for a single extraction request in seconds
    #[arg(long, env = "NOTES_REQUEST_TIMEOUT", default_value_t = 60)]
    pub request_timeout: u64,

    // Timeout for fetching a page to scrape in seconds
    #[arg(long, env = "NOTES_SCRAPE_TIMEOUT", default_value_t = 30)]
    pub scrape_timeout: u64,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterPolicy {
    // hard cap over any trailing window
    Sliding,
    // counter reset every window, allows bursts at the boundary
    Fixed,
}

impl Args {
    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window)
    }

    pub fn extract_window(&self) -> Duration {
        Duration::from_secs(self.extract_window)
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.cache_ttl > 0).then(|| Duration::from_secs(self.cache_ttl))
    }

    // The orchestrator waits for a slot instead of failing fast
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            backoff_unit: Duration::from_millis(self.backoff_unit_ms),
            admission: Admission::Wait {
                poll: Duration::from_millis(self.admission_poll_ms),
            },
            overall_timeout: self.overall_timeout.map(Duration::from_secs),
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        self.gemini_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let args = Args::try_parse_from(["notes-gateway"]).unwrap();

        assert_eq!(args.port, 8080);
        assert_eq!(args.rate_limit, 60);
        assert_eq!(args.rate_policy, LimiterPolicy::Sliding);
        assert_eq!(args.max_retries, 3);
        assert_eq!(args.model, "gemini-2.5-flash");
        assert_eq!(args.cache_ttl(), Some(Duration::from_secs(300)));
        assert_eq!(args.retry_policy().backoff_unit, Duration::from_secs(1));
        assert_eq!(args.retry_policy().overall_timeout, None);
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::try_parse_from([
            "notes-gateway",
            "--extract-limit",
            "5",
            "--rate-policy",
            "fixed",
            "--overall-timeout",
            "20",
            "--cache-ttl",
            "0",
            "--gemini-api-key",
            "  ",
        ])
        .unwrap();

        assert_eq!(args.extract_limit, 5);
        assert_eq!(args.rate_policy, LimiterPolicy::Fixed);
        assert_eq!(
            args.retry_policy().overall_timeout,
            Some(Duration::from_secs(20))
        );
        assert_eq!(args.cache_ttl(), None);
        assert_eq!(args.api_key(), None);
    }
}
