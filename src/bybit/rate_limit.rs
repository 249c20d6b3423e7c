//! Sliding-window request limiter

use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Snapshot of the limiter state
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RateLimitStatus {
    pub max_requests: usize,
    pub window_secs: u64,
    pub requests_made: usize,
    pub remaining: usize,
    /// Seconds until the oldest request leaves the window
    pub reset_in_secs: f64,
}

/// Allows at most `max_requests` per sliding `window`
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    requests: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            requests: Mutex::new(VecDeque::new()),
        }
    }

    fn prune(requests: &mut VecDeque<Instant>, window: Duration, now: Instant) {
        while let Some(oldest) = requests.front() {
            if now.duration_since(*oldest) >= window {
                requests.pop_front();
            } else {
                break;
            }
        }
    }

    /// Wait until a request slot is free, then take it
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut requests = self.requests.lock().await;
                let now = Instant::now();
                Self::prune(&mut requests, self.window, now);

                if requests.len() < self.max_requests {
                    requests.push_back(now);
                    return;
                }

                match requests.front() {
                    Some(oldest) => (*oldest + self.window).saturating_duration_since(now),
                    None => Duration::ZERO,
                }
            };

            tracing::debug!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    pub async fn status(&self) -> RateLimitStatus {
        let mut requests = self.requests.lock().await;
        let now = Instant::now();
        Self::prune(&mut requests, self.window, now);

        let reset_in = requests
            .front()
            .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO);

        RateLimitStatus {
            max_requests: self.max_requests,
            window_secs: self.window.as_secs(),
            requests_made: requests.len(),
            remaining: self.max_requests.saturating_sub(requests.len()),
            reset_in_secs: reset_in.as_secs_f64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_status_counts_requests() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        limiter.acquire().await;
        limiter.acquire().await;

        let status = limiter.status().await;
        assert_eq!(status.max_requests, 5);
        assert_eq!(status.window_secs, 60);
        assert_eq!(status.requests_made, 2);
        assert_eq!(status.remaining, 3);
        assert!(status.reset_in_secs > 59.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_secs(1));

        // third request must wait for the first to leave the window
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(10));

        let status = limiter.status().await;
        assert_eq!(status.requests_made, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_expiry_frees_slots() {
        let limiter = RateLimiter::new(1, Duration::from_secs(5));
        limiter.acquire().await;
        assert_eq!(limiter.status().await.remaining, 0);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(limiter.status().await.remaining, 1);
    }
}
