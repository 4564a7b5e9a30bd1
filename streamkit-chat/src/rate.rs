//! Outbound rate limiting.
//!
//! The platform caps outbound chat messages per rolling time window.
//! Sends beyond the limit queue behind [`RateLimiter::acquire`] rather
//! than being dropped.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Rolling-window limiter: at most `capacity` acquisitions per `window`.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: usize,
    window: Duration,
    sent: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(capacity: usize, window: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            window,
            sent: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait until a send slot is free, then consume it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut sent = self.sent.lock();
                let now = Instant::now();
                while sent
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= self.window)
                {
                    sent.pop_front();
                }
                match sent.front() {
                    Some(oldest) if sent.len() >= self.capacity => {
                        // Oldest entry leaving the window frees the next slot.
                        *oldest + self.window - now
                    }
                    _ => {
                        sent.push_back(now);
                        return;
                    }
                }
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Free slots right now, without consuming any.
    pub fn available(&self) -> usize {
        let mut sent = self.sent.lock();
        let now = Instant::now();
        while sent
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            sent.pop_front();
        }
        self.capacity - sent.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn acquires_up_to_capacity_without_waiting() {
        let limiter = RateLimiter::new(3, Duration::from_secs(30));
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(limiter.available(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn overflow_waits_for_window_not_dropped() {
        let limiter = RateLimiter::new(2, Duration::from_secs(30));
        limiter.acquire().await;
        limiter.acquire().await;

        let start = Instant::now();
        // Queues until the first acquisition leaves the 30s window.
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn slots_free_as_window_slides() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_secs(6)).await;
        limiter.acquire().await;
        assert_eq!(limiter.available(), 0);

        tokio::time::sleep(Duration::from_secs(5)).await;
        // First acquisition has aged out, second has not.
        assert_eq!(limiter.available(), 1);
    }
}
