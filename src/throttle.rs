//! Shared minimum-interval gate for outbound sends
//!
//! The limited resource is the account's aggregate send rate, so a single
//! throttle is shared by every send in the run rather than one per
//! recipient. Built on `tokio::time` so tests can drive it under a paused
//! clock without wall-time waits.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Minimum-interval send throttle
///
/// `acquire` returns only when at least the configured interval has passed
/// since the previous acquisition. The first acquisition never waits.
#[derive(Debug)]
pub struct SendThrottle {
    inner: Arc<Mutex<ThrottleState>>,
    interval: Duration,
}

#[derive(Debug)]
struct ThrottleState {
    /// When the previous send slot was claimed
    last_acquired: Option<Instant>,
    /// Total slots handed out (for stats)
    total_acquired: u64,
    /// Total acquisitions that had to wait (for stats)
    total_delayed: u64,
}

impl SendThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ThrottleState {
                last_acquired: None,
                total_acquired: 0,
                total_delayed: 0,
            })),
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Claim the next send slot, sleeping until the minimum interval since
    /// the previous slot has elapsed.
    pub async fn acquire(&self) {
        loop {
            let wait_time = {
                let mut state = self.inner.lock().await;
                let now = Instant::now();

                match state.last_acquired {
                    Some(last) if now.duration_since(last) < self.interval => {
                        state.total_delayed += 1;
                        self.interval - now.duration_since(last)
                    }
                    _ => {
                        state.last_acquired = Some(now);
                        state.total_acquired += 1;
                        return;
                    }
                }
            };

            // Sleep outside the lock
            debug!("Throttle: waiting {:.2}s for next send slot", wait_time.as_secs_f64());
            tokio::time::sleep(wait_time).await;
        }
    }

    /// Get current statistics about throttle usage
    pub async fn stats(&self) -> ThrottleStats {
        let state = self.inner.lock().await;
        ThrottleStats {
            total_acquired: state.total_acquired,
            total_delayed: state.total_delayed,
        }
    }
}

impl Clone for SendThrottle {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            interval: self.interval,
        }
    }
}

/// Statistics about throttle usage
#[derive(Debug, Clone)]
pub struct ThrottleStats {
    pub total_acquired: u64,
    pub total_delayed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_acquire_is_immediate() {
        let throttle = SendThrottle::new(Duration::from_secs(5));

        let start = Instant::now();
        throttle.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        let stats = throttle.stats().await;
        assert_eq!(stats.total_acquired, 1);
        assert_eq!(stats.total_delayed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enforces_minimum_spacing_over_sequence() {
        let interval = Duration::from_secs(5);
        let throttle = SendThrottle::new(interval);

        // Six consecutive slots must each wait out the full interval
        let mut timestamps = Vec::new();
        for _ in 0..6 {
            throttle.acquire().await;
            timestamps.push(Instant::now());
        }

        for pair in timestamps.windows(2) {
            assert!(
                pair[1].duration_since(pair[0]) >= interval,
                "calls closer than the minimum interval"
            );
        }

        let stats = throttle.stats().await;
        assert_eq!(stats.total_acquired, 6);
        assert!(stats.total_delayed >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_when_interval_already_elapsed() {
        let throttle = SendThrottle::new(Duration::from_secs(5));

        throttle.acquire().await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        let start = Instant::now();
        throttle.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clone_shares_state() {
        let throttle1 = SendThrottle::new(Duration::from_secs(5));
        let throttle2 = throttle1.clone();

        throttle1.acquire().await;

        let start = Instant::now();
        throttle2.acquire().await;
        // The clone observes the first acquisition and waits
        assert!(start.elapsed() >= Duration::from_secs(5));

        let stats = throttle1.stats().await;
        assert_eq!(stats.total_acquired, 2);
    }
}
