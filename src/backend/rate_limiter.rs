use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Token-bucket rate limiter. Refills continuously at `requests_per_minute /
/// 60` tokens per second, capped at a one-minute burst, bounding outbound
/// call rates against the backend store.
pub struct RateLimiter {
    inner: Mutex<Bucket>,
    refill_per_sec: f64,
    capacity: f64,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let capacity = requests_per_minute.max(1) as f64;
        RateLimiter {
            inner: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            refill_per_sec: capacity / 60.0,
            capacity,
        }
    }

    /// Attempts to take one token; returns `Some(wait)` with how long the
    /// caller should sleep before retrying if the bucket is empty.
    pub fn try_acquire(&self) -> Option<Duration> {
        let mut bucket = self.inner.lock().unwrap();
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            None
        } else {
            let deficit = 1.0 - bucket.tokens;
            Some(Duration::from_secs_f64(deficit / self.refill_per_sec))
        }
    }

    /// Blocks (asynchronously) until a token is available.
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire() {
                None => return,
                Some(wait) => tokio::time::sleep(wait).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_starts_full_and_drains() {
        let limiter = RateLimiter::new(60);
        for _ in 0..60 {
            assert!(limiter.try_acquire().is_none());
        }
        assert!(limiter.try_acquire().is_some());
    }

    #[tokio::test]
    async fn acquire_eventually_succeeds_after_drain() {
        let limiter = RateLimiter::new(6000); // fast refill for the test
        for _ in 0..6000 {
            limiter.try_acquire();
        }
        tokio::time::timeout(Duration::from_secs(2), limiter.acquire())
            .await
            .expect("acquire should not hang");
    }
}
