//! Request pacing shared by every call made against one Slack token.
//!
//! Slack enforces its limits per token and per method tier, not per channel,
//! so all export jobs go through a single [`RateLimiter`]. Time is read
//! through [`Clock`] so the pacing can be tested without sleeping.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use log::debug;
use tokio::sync::Mutex;

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by tokio timers.
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Default)]
struct LimiterState {
    next_allowed: Option<Instant>,
    requests: u64,
    throttled: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterStats {
    pub requests: u64,
    pub throttled: u64,
}

pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    min_interval: Duration,
    default_backoff: Duration,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    /// `min_interval` spaces consecutive requests, `default_backoff` is used
    /// when a throttled response carries no `Retry-After`.
    pub fn new(clock: Arc<dyn Clock>, min_interval: Duration, default_backoff: Duration) -> Self {
        Self {
            clock,
            min_interval,
            default_backoff,
            state: Mutex::new(LimiterState::default()),
        }
    }

    pub fn system(min_interval: Duration, default_backoff: Duration) -> Self {
        Self::new(Arc::new(SystemClock), min_interval, default_backoff)
    }

    /// Reserves the next request slot and waits for it.
    pub async fn acquire(&self) {
        let wait = {
            let mut state = self.state.lock().await;
            let now = self.clock.now();
            let slot = state.next_allowed.map_or(now, |next| next.max(now));
            state.next_allowed = Some(slot + self.min_interval);
            state.requests += 1;
            slot.saturating_duration_since(now)
        };

        if !wait.is_zero() {
            self.clock.sleep(wait).await;
        }
    }

    /// Holds back every caller after a throttled response. Returns the delay applied.
    pub async fn back_off(&self, retry_after: Option<Duration>) -> Duration {
        let delay = retry_after.unwrap_or(self.default_backoff);
        let mut state = self.state.lock().await;
        let until = self.clock.now() + delay;
        state.next_allowed = Some(state.next_allowed.map_or(until, |next| next.max(until)));
        state.throttled += 1;
        debug!("rate limited, holding requests for {:?}", delay);
        delay
    }

    pub async fn stats(&self) -> LimiterStats {
        let state = self.state.lock().await;
        LimiterStats {
            requests: state.requests,
            throttled: state.throttled,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Clock that only moves when something sleeps on it.
    pub struct ManualClock {
        now: Mutex<Instant>,
        sleeps: Mutex<Vec<Duration>>,
    }

    impl ManualClock {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                now: Mutex::new(Instant::now()),
                sleeps: Mutex::new(Vec::new()),
            })
        }

        pub fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.lock().unwrap().clone()
        }

        pub fn advance(&self, duration: Duration) {
            *self.now.lock().unwrap() += duration;
        }
    }

    #[async_trait]
    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }

        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
            self.advance(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ManualClock;
    use super::*;

    #[tokio::test]
    async fn test_unpaced_limiter_never_sleeps() {
        let clock = ManualClock::new();
        let limiter = RateLimiter::new(clock.clone(), Duration::ZERO, Duration::from_secs(30));

        for _ in 0..5 {
            limiter.acquire().await;
        }

        assert!(clock.sleeps().is_empty());
        assert_eq!(
            limiter.stats().await,
            LimiterStats {
                requests: 5,
                throttled: 0
            }
        );
    }

    #[tokio::test]
    async fn test_min_interval_spaces_requests() {
        let clock = ManualClock::new();
        let limiter =
            RateLimiter::new(clock.clone(), Duration::from_millis(500), Duration::from_secs(30));

        limiter.acquire().await;
        limiter.acquire().await;
        clock.advance(Duration::from_millis(200));
        limiter.acquire().await;

        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_millis(500), Duration::from_millis(300)]
        );
    }

    #[tokio::test]
    async fn test_back_off_delays_next_request() {
        let clock = ManualClock::new();
        let limiter = RateLimiter::new(clock.clone(), Duration::ZERO, Duration::from_secs(30));

        limiter.acquire().await;
        let delay = limiter.back_off(Some(Duration::from_secs(2))).await;
        limiter.acquire().await;

        assert_eq!(delay, Duration::from_secs(2));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(2)]);
        assert_eq!(limiter.stats().await.throttled, 1);
    }

    #[tokio::test]
    async fn test_back_off_without_hint_uses_default() {
        let clock = ManualClock::new();
        let limiter = RateLimiter::new(clock.clone(), Duration::ZERO, Duration::from_secs(7));

        assert_eq!(limiter.back_off(None).await, Duration::from_secs(7));
        limiter.acquire().await;

        assert_eq!(clock.sleeps(), vec![Duration::from_secs(7)]);
    }
}
