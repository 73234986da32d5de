use std::time::Duration;

use rand::Rng;

/// HTTP-shaped statuses the client retries on.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 502 | 503 | 504)
}

/// Exponential backoff with ±25% jitter, capped at 30s, for retry attempt
/// `attempt` (0-indexed).
pub fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = 200u64.saturating_mul(1u64 << attempt.min(16));
    let capped_ms = base_ms.min(30_000);
    let jitter_frac = rand::rng().random_range(-0.25..=0.25);
    let jittered_ms = (capped_ms as f64 * (1.0 + jitter_frac)).max(0.0);
    Duration::from_millis(jittered_ms as u64).min(Duration::from_secs(30))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        for s in [408, 429, 502, 503, 504] {
            assert!(is_retryable_status(s));
        }
        for s in [200, 400, 401, 404, 500] {
            assert!(!is_retryable_status(s));
        }
    }

    #[test]
    fn backoff_is_capped_and_grows() {
        let d0 = backoff_delay(0);
        let d5 = backoff_delay(5);
        assert!(d0 <= Duration::from_millis(250));
        assert!(d5 <= Duration::from_secs(30));
        let d_huge = backoff_delay(30);
        assert!(d_huge <= Duration::from_secs(30));
    }
}
