use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::cache::ResponseCache;
use crate::config::{Args, LimiterPolicy};
use crate::error::ConfigurationError;
use crate::extractor::{GeminiExtractor, RemoteExtractor};
use crate::orchestrator::ExtractionOrchestrator;
use crate::rate_limit::{FixedWindowLimiter, RateLimiter, SlidingWindowLimiter};
use crate::retry::RetryingCaller;
use crate::scrape::HttpScraper;

// app's shared state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ExtractionOrchestrator>,
    // per client IP, fail fast
    pub ingress: Arc<dyn RateLimiter<IpAddr>>,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<ExtractionOrchestrator>,
        ingress: Arc<dyn RateLimiter<IpAddr>>,
    ) -> Self {
        Self {
            orchestrator,
            ingress,
        }
    }

    /// Wire every component from the command line.
    pub fn from_args(args: &Args) -> Result<Self, ConfigurationError> {
        let ingress: Arc<dyn RateLimiter<IpAddr>> = match args.rate_policy {
            LimiterPolicy::Sliding => {
                Arc::new(SlidingWindowLimiter::<IpAddr>::new(args.rate_limit, args.rate_window())?)
            }
            LimiterPolicy::Fixed => {
                Arc::new(FixedWindowLimiter::<IpAddr>::new(args.rate_limit, args.rate_window())?)
            }
        };
        let outbound = Arc::new(SlidingWindowLimiter::<String>::new(
            args.extract_limit,
            args.extract_window(),
        )?);

        let extractor: Option<Arc<dyn RemoteExtractor>> = match args.api_key() {
            Some(key) => {
                let gemini: Arc<dyn RemoteExtractor> = Arc::new(GeminiExtractor::new(
                    key,
                    args.model.clone(),
                    args.gemini_base_url.clone(),
                    Duration::from_secs(args.request_timeout),
                )?);
                Some(gemini)
            }
            None => {
                warn!("no Gemini API key configured, only local parsing is available");
                None
            }
        };

        let scraper = Arc::new(HttpScraper::new(Duration::from_secs(args.scrape_timeout))?);
        let caller = RetryingCaller::new(outbound, args.retry_policy());
        let mut orchestrator = ExtractionOrchestrator::new(
            extractor,
            scraper,
            caller,
            args.model.clone(),
            args.max_retries,
        )?;
        if let Some(ttl) = args.cache_ttl() {
            orchestrator = orchestrator.with_cache(ResponseCache::new(ttl));
        }

        info!(
            rate_limit = args.rate_limit,
            rate_window_secs = args.rate_window,
            extract_limit = args.extract_limit,
            extract_window_secs = args.extract_window,
            max_retries = args.max_retries,
            remote = orchestrator.has_remote(),
            "state initialized"
        );

        Ok(Self::new(Arc::new(orchestrator), ingress))
    }
}
