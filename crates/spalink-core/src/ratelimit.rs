// ── Global rate-limit guard ──
//
// One shared instance wraps every gateway call site. Throttle responses
// back off the whole process -- a burst of sweep commands cools the
// entire sweep down rather than hammering the gateway unit by unit.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

#[derive(Debug, Default)]
struct RateLimitState {
    consecutive_throttles: u32,
    backoff_until: Option<Instant>,
}

/// Tracks consecutive throttle responses and computes exponential
/// backoff windows. Any non-throttled success resets the streak.
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<RateLimitState>,
    base: Duration,
    cap: Duration,
}

impl RateLimiter {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            state: Mutex::new(RateLimitState::default()),
            base,
            cap,
        }
    }

    /// Record a throttle response. Returns the backoff window callers
    /// must now respect: `base * 2^(n-1)`, capped.
    pub fn record_throttle(&self) -> Duration {
        let mut state = self.state.lock().expect("rate limiter poisoned");
        state.consecutive_throttles += 1;
        let exponent = state.consecutive_throttles.saturating_sub(1).min(16);
        let window = self
            .base
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.cap);
        state.backoff_until = Some(Instant::now() + window);
        warn!(
            consecutive = state.consecutive_throttles,
            backoff_secs = window.as_secs(),
            "gateway throttled -- backing off"
        );
        window
    }

    /// Record a successful (non-throttled) gateway call.
    pub fn record_success(&self) {
        let mut state = self.state.lock().expect("rate limiter poisoned");
        state.consecutive_throttles = 0;
        state.backoff_until = None;
    }

    /// Current throttle streak length.
    pub fn consecutive_throttles(&self) -> u32 {
        self.state
            .lock()
            .expect("rate limiter poisoned")
            .consecutive_throttles
    }

    /// Remaining backoff, if a window is active.
    pub fn remaining_backoff(&self) -> Option<Duration> {
        let state = self.state.lock().expect("rate limiter poisoned");
        state
            .backoff_until
            .and_then(|until| until.checked_duration_since(Instant::now()))
    }

    /// Wait out any active backoff window before touching the gateway.
    pub async fn wait_ready(&self) {
        let until = {
            let state = self.state.lock().expect("rate limiter poisoned");
            state.backoff_until
        };
        if let Some(until) = until {
            tokio::time::sleep_until(until).await;
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_consecutive_throttle() {
        let limiter = RateLimiter::new(Duration::from_secs(5), Duration::from_secs(300));
        assert_eq!(limiter.record_throttle(), Duration::from_secs(5));
        assert_eq!(limiter.record_throttle(), Duration::from_secs(10));
        assert_eq!(limiter.record_throttle(), Duration::from_secs(20));
        assert_eq!(limiter.record_throttle(), Duration::from_secs(40));
    }

    #[test]
    fn backoff_is_capped() {
        let limiter = RateLimiter::new(Duration::from_secs(60), Duration::from_secs(120));
        limiter.record_throttle();
        limiter.record_throttle();
        assert_eq!(limiter.record_throttle(), Duration::from_secs(120));
    }

    #[test]
    fn success_resets_streak() {
        let limiter = RateLimiter::default();
        limiter.record_throttle();
        limiter.record_throttle();
        assert_eq!(limiter.consecutive_throttles(), 2);

        limiter.record_success();
        assert_eq!(limiter.consecutive_throttles(), 0);
        assert!(limiter.remaining_backoff().is_none());
        // Next throttle starts from the base window again.
        assert_eq!(limiter.record_throttle(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_ready_respects_backoff_window() {
        let limiter = RateLimiter::new(Duration::from_secs(8), Duration::from_secs(300));
        limiter.record_throttle();

        let start = Instant::now();
        limiter.wait_ready().await;
        assert!(start.elapsed() >= Duration::from_secs(8));

        // No active window -> returns immediately.
        limiter.record_success();
        let start = Instant::now();
        limiter.wait_ready().await;
        assert!(start.elapsed() < Duration::from_millis(1));
    }
}
