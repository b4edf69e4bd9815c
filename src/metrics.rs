use lazy_static::lazy_static;
use prometheus::{
    Counter, Encoder, Gauge, Histogram, TextEncoder, register_counter, register_gauge,
    register_histogram,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("notes_requests_total", "Total number of requests").unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "notes_request_latency_seconds",
        "Request latency in seconds"
    )
    .unwrap();
    pub static ref RATE_LIMITED_TOTAL: Counter = register_counter!(
        "notes_rate_limited_total",
        "Requests rejected by the ingress rate limiter"
    )
    .unwrap();
    pub static ref EXTRACTION_ATTEMPTS: Counter = register_counter!(
        "notes_extraction_attempts_total",
        "Remote extraction attempts"
    )
    .unwrap();
    pub static ref EXTRACTION_RETRIES: Counter = register_counter!(
        "notes_extraction_retries_total",
        "Remote extraction attempts followed by a backoff"
    )
    .unwrap();
    pub static ref EXTRACTION_EXHAUSTED: Counter = register_counter!(
        "notes_extraction_exhausted_total",
        "Calls that used up every retry"
    )
    .unwrap();
    pub static ref FALLBACK_TOTAL: Counter = register_counter!(
        "notes_fallback_total",
        "Results produced by the naive fallback parser"
    )
    .unwrap();
    pub static ref CACHE_HITS: Counter =
        register_counter!("notes_cache_hits_total", "Total cache hits").unwrap();
    pub static ref CACHE_MISSES: Counter =
        register_counter!("notes_cache_misses_total", "Total cache misses").unwrap();
    pub static ref CACHE_SIZE: Gauge =
        register_gauge!("notes_cache_size", "Current number of items in cache").unwrap();
}

// Render every registered metric in the prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
