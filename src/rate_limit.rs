use dashmap::DashMap;
use std::collections::VecDeque;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::ConfigurationError;

/// Admission decision for one key.
///
/// `is_allowed` must never block; a `true` answer consumes one unit of the
/// key's budget.
pub trait RateLimiter<K>: Send + Sync {
    fn is_allowed(&self, key: &K) -> bool;

    /// How long until `key` could be granted again, `None` if it could be
    /// granted right now.
    fn retry_after(&self, key: &K) -> Option<Duration>;
}

/// Strict sliding window: at most `limit` grants inside any trailing
/// `window` per key.
///
/// Each key owns a deque of grant instants in grant order. Expired instants
/// are popped from the front when the key is touched, so a call costs
/// amortized O(1). The whole evict/count/append sequence runs while the
/// key's map shard is write-locked, which makes it atomic per key.
pub struct SlidingWindowLimiter<K> {
    limit: usize,
    window: Duration,
    windows: DashMap<K, VecDeque<Instant>>,
}

impl<K> SlidingWindowLimiter<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new(limit: u32, window: Duration) -> Result<Self, ConfigurationError> {
        if limit == 0 {
            return Err(ConfigurationError::ZeroLimit);
        }
        if window.is_zero() {
            return Err(ConfigurationError::ZeroWindow);
        }
        Ok(Self {
            limit: limit as usize,
            window,
            windows: DashMap::new(),
        })
    }

    pub fn limit(&self) -> u32 {
        self.limit as u32
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    // Grants currently inside the window for `key`
    pub fn occupancy(&self, key: &K) -> usize {
        let now = Instant::now();
        match self.windows.get_mut(key) {
            Some(mut grants) => {
                evict_expired(&mut grants, now, self.window);
                grants.len()
            }
            None => 0,
        }
    }

    fn admit(&self, grants: &mut VecDeque<Instant>, now: Instant) -> bool {
        evict_expired(grants, now, self.window);
        if grants.len() >= self.limit {
            return false;
        }
        grants.push_back(now);
        true
    }
}

// Drop grants that left the window. Only ever pops from the front.
fn evict_expired(grants: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = grants.front() {
        if now.saturating_duration_since(oldest) >= window {
            grants.pop_front();
        } else {
            break;
        }
    }
}

impl<K> RateLimiter<K> for SlidingWindowLimiter<K>
where
    K: Eq + Hash + Clone + Send + Sync,
{
    fn is_allowed(&self, key: &K) -> bool {
        let now = Instant::now();

        // Existing key: no clone needed
        if let Some(mut grants) = self.windows.get_mut(key) {
            return self.admit(&mut grants, now);
        }

        let mut grants = self.windows.entry(key.clone()).or_default();
        self.admit(&mut grants, now)
    }

    fn retry_after(&self, key: &K) -> Option<Duration> {
        let now = Instant::now();
        let mut grants = self.windows.get_mut(key)?;
        evict_expired(&mut grants, now, self.window);

        if grants.len() < self.limit {
            return None;
        }
        // Full window: the oldest grant is the next one to expire
        grants
            .front()
            .map(|&oldest| (oldest + self.window).saturating_duration_since(now))
    }
}

// Rate limit entry - fixed window counter per key
#[derive(Debug, Clone, Copy)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_start: Instant,
}

/// Fixed window counter. Cheaper than the sliding window but allows up to
/// `2 * limit` grants across a window boundary, so it is never the default.
pub struct FixedWindowLimiter<K> {
    limit: u32,
    window: Duration,
    entries: DashMap<K, RateLimitEntry>,
}

impl<K> FixedWindowLimiter<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new(limit: u32, window: Duration) -> Result<Self, ConfigurationError> {
        if limit == 0 {
            return Err(ConfigurationError::ZeroLimit);
        }
        if window.is_zero() {
            return Err(ConfigurationError::ZeroWindow);
        }
        Ok(Self {
            limit,
            window,
            entries: DashMap::new(),
        })
    }
}

impl<K> RateLimiter<K> for FixedWindowLimiter<K>
where
    K: Eq + Hash + Clone + Send + Sync,
{
    fn is_allowed(&self, key: &K) -> bool {
        let now = Instant::now();

        let mut entry = self.entries.entry(key.clone()).or_insert(RateLimitEntry {
            count: 0,
            window_start: now,
        });

        // window expired? start a new one
        if now.saturating_duration_since(entry.window_start) >= self.window {
            entry.count = 1;
            entry.window_start = now;
            return true;
        }

        if entry.count < self.limit {
            entry.count += 1;
            return true;
        }

        false
    }

    fn retry_after(&self, key: &K) -> Option<Duration> {
        let now = Instant::now();
        let entry = self.entries.get(key)?;
        let elapsed = now.saturating_duration_since(entry.window_start);

        if elapsed >= self.window || entry.count < self.limit {
            return None;
        }
        Some(self.window - elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use tokio::time::advance;

    fn limiter(limit: u32, window_ms: u64) -> SlidingWindowLimiter<String> {
        SlidingWindowLimiter::new(limit, Duration::from_millis(window_ms)).unwrap()
    }

    #[test]
    fn rejects_zero_limit_and_zero_window() {
        assert_eq!(
            SlidingWindowLimiter::<String>::new(0, Duration::from_secs(1)).err(),
            Some(ConfigurationError::ZeroLimit)
        );
        assert_eq!(
            SlidingWindowLimiter::<String>::new(1, Duration::ZERO).err(),
            Some(ConfigurationError::ZeroWindow)
        );
        assert!(FixedWindowLimiter::<String>::new(0, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn fresh_key_is_always_allowed() {
        let limiter = limiter(1, 60_000);
        assert!(limiter.is_allowed(&"a".to_string()));
        assert!(limiter.is_allowed(&"b".to_string()));
        assert!(!limiter.is_allowed(&"a".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn allows_up_to_limit_then_denies() {
        let limiter = limiter(3, 1_000);
        let key = "client".to_string();

        for _ in 0..3 {
            assert!(limiter.is_allowed(&key));
            advance(Duration::from_millis(10)).await;
        }
        assert!(!limiter.is_allowed(&key));
        // denial records nothing
        assert_eq!(limiter.occupancy(&key), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_grants_do_not_count() {
        let limiter = limiter(2, 1_000);
        let key = "client".to_string();

        assert!(limiter.is_allowed(&key));
        advance(Duration::from_millis(500)).await;
        assert!(limiter.is_allowed(&key));
        assert!(!limiter.is_allowed(&key));

        // first grant is now exactly one window old
        advance(Duration::from_millis(500)).await;
        assert_eq!(limiter.occupancy(&key), 1);
        assert!(limiter.is_allowed(&key));
        assert!(!limiter.is_allowed(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_points_at_oldest_grant() {
        let limiter = limiter(2, 1_000);
        let key = "client".to_string();

        assert_eq!(limiter.retry_after(&key), None);
        limiter.is_allowed(&key);
        advance(Duration::from_millis(300)).await;
        limiter.is_allowed(&key);
        assert_eq!(limiter.retry_after(&key), Some(Duration::from_millis(700)));

        advance(Duration::from_millis(700)).await;
        assert_eq!(limiter.retry_after(&key), None);
    }

    #[tokio::test(start_paused = true)]
    async fn never_more_than_limit_in_any_window() {
        let limit = 5usize;
        let window = Duration::from_millis(100);
        let limiter = SlidingWindowLimiter::new(limit as u32, window).unwrap();
        let key = 7u64;
        let mut granted = Vec::new();

        // 1000 calls, one every 3ms, far above the allowed rate
        for _ in 0..1_000 {
            if limiter.is_allowed(&key) {
                granted.push(Instant::now());
            }
            advance(Duration::from_millis(3)).await;
        }

        assert!(!granted.is_empty());
        for pair in granted.windows(limit + 1) {
            assert!(pair[limit] - pair[0] >= window);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn below_limit_is_never_denied() {
        let limiter = limiter(4, 100);
        let key = "steady".to_string();

        // one call every 30ms keeps at most 4 grants inside 100ms
        for _ in 0..200 {
            assert!(limiter.is_allowed(&key));
            advance(Duration::from_millis(30)).await;
        }
    }

    #[test]
    fn concurrent_callers_get_exactly_limit_grants() {
        let threads = 16;
        let limiter = Arc::new(limiter(threads as u32 - 1, 60_000));
        let barrier = Arc::new(Barrier::new(threads));
        let granted = Arc::new(AtomicUsize::new(0));

        std::thread::scope(|scope| {
            for _ in 0..threads {
                let limiter = Arc::clone(&limiter);
                let barrier = Arc::clone(&barrier);
                let granted = Arc::clone(&granted);
                scope.spawn(move || {
                    barrier.wait();
                    if limiter.is_allowed(&"shared".to_string()) {
                        granted.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(granted.load(Ordering::SeqCst), threads - 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_window_resets_after_window() {
        let limiter = FixedWindowLimiter::new(2, Duration::from_secs(1)).unwrap();
        let key = "global".to_string();

        assert!(limiter.is_allowed(&key));
        assert!(limiter.is_allowed(&key));
        assert!(!limiter.is_allowed(&key));
        assert_eq!(limiter.retry_after(&key), Some(Duration::from_secs(1)));

        advance(Duration::from_secs(1)).await;
        assert!(limiter.is_allowed(&key));
    }
}
