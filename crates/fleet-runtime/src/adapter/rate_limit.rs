//! Per-partner delivery rate limiting

use std::sync::Mutex;
use tokio::time::Instant;

/// Token bucket refilled continuously
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    max_tokens: f64,
    /// Tokens per second
    refill_rate: f64,
}

impl TokenBucket {
    fn new(max_tokens: u32, refill_rate: f64) -> Self {
        Self {
            tokens: max_tokens as f64,
            last_refill: Instant::now(),
            max_tokens: max_tokens as f64,
            refill_rate,
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;
    }

    fn try_consume(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// `per_minute` deliveries per minute with a burst of the same size.
/// Zero disables limiting.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Option<Mutex<TokenBucket>>,
}

impl RateLimiter {
    pub fn per_minute(per_minute: u32) -> Self {
        let bucket = (per_minute > 0).then(|| Mutex::new(TokenBucket::new(per_minute, per_minute as f64 / 60.0)));
        Self { bucket }
    }

    pub fn unlimited() -> Self {
        Self { bucket: None }
    }

    pub fn is_unlimited(&self) -> bool {
        self.bucket.is_none()
    }

    /// Take one delivery slot if available
    pub fn try_acquire(&self) -> bool {
        match &self.bucket {
            Some(bucket) => bucket.lock().unwrap_or_else(|e| e.into_inner()).try_consume(),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_zero_means_unlimited() {
        let limiter = RateLimiter::per_minute(0);
        assert!(limiter.is_unlimited());
        assert!((0..10_000).all(|_| limiter.try_acquire()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_refill() {
        let limiter = RateLimiter::per_minute(3);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        // One token every 20 seconds
        tokio::time::advance(Duration::from_secs(21)).await;
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }
}
