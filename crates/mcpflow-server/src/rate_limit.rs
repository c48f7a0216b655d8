//! Per-session token-bucket admission control.
//!
//! One bucket per session id, refilled lazily on access — no background
//! timer. A session's first request starts the bucket at `burst − 1` and is
//! allowed; each later request refills by `elapsed × rate` (capped at
//! `burst`) and then consumes one token if one is available.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// The per-session rate limiter.
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
    burst: f64,
    rate: f64,
}

impl RateLimiter {
    /// Create a limiter with the given bucket capacity and refill rate.
    #[must_use]
    pub fn new(burst: u32, rate_per_second: f64) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            burst: f64::from(burst),
            rate: rate_per_second,
        }
    }

    /// Consume one token for `session_id` if the bucket allows it.
    pub fn allow(&self, session_id: &str) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().expect("rate limiter lock");

        match buckets.get_mut(session_id) {
            None => {
                buckets.insert(
                    session_id.to_string(),
                    Bucket {
                        tokens: self.burst - 1.0,
                        last_refill: now,
                    },
                );
                true
            }
            Some(bucket) => {
                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
                bucket.last_refill = now;

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    true
                } else {
                    tracing::warn!(session_id = %session_id, "rate limit exceeded");
                    false
                }
            }
        }
    }

    /// How long until `session_id` has a token again. A retry hint, not a
    /// reservation.
    #[must_use]
    pub fn retry_after(&self, session_id: &str) -> Option<Duration> {
        let buckets = self.buckets.lock().expect("rate limiter lock");
        let bucket = buckets.get(session_id)?;
        if bucket.tokens >= 1.0 || self.rate <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64((1.0 - bucket.tokens) / self.rate))
    }

    /// Drop the bucket for a session. Called from the eviction cascade.
    pub fn cleanup(&self, session_id: &str) {
        self.buckets.lock().expect("rate limiter lock").remove(session_id);
    }

    /// Drop buckets untouched for longer than `max_idle`.
    ///
    /// Bounds memory when sessions vanish without a clean close; runs
    /// independently of session eviction.
    pub fn cleanup_stale(&self, max_idle: Duration) {
        self.buckets
            .lock()
            .expect("rate limiter lock")
            .retain(|_, bucket| bucket.last_refill.elapsed() < max_idle);
    }

    /// Number of live buckets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.lock().expect("rate limiter lock").len()
    }

    /// Whether no buckets exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
