//! Bounded exponential backoff with jitter (spec §5, §9):
//! `delay = base * 2^(attempt-1)`, capped at `max_delay`, times a uniform
//! jitter factor in `[0.5, 1.5]`.

use rand::Rng;
use std::time::Duration;

const MAX_DELAY_SECS: f64 = 30.0;

pub fn backoff_delay(attempt: u32, base_secs: f64) -> Duration {
    let raw = base_secs * 2f64.powi(attempt as i32 - 1);
    let capped = raw.min(MAX_DELAY_SECS);
    let jitter = rand::thread_rng().gen_range(0.5..=1.5);
    Duration::from_secs_f64((capped * jitter).max(0.0))
}

pub async fn sleep_with_backoff(attempt: u32, base_secs: f64) {
    tokio::time::sleep(backoff_delay(attempt, base_secs)).await;
}

pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_with_attempt_before_cap() {
        let d1 = backoff_delay(1, 1.0);
        let d2 = backoff_delay(2, 1.0);
        // jitter makes single samples noisy; compare against the
        // deterministic un-jittered floor/ceiling instead.
        assert!(d1.as_secs_f64() <= 1.5 + 1e-9);
        assert!(d2.as_secs_f64() <= 3.0 + 1e-9);
    }

    #[test]
    fn retryable_status_set_matches_spec() {
        for code in [408, 429, 500, 502, 503, 504] {
            assert!(is_retryable_status(code));
        }
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(200));
    }
}
