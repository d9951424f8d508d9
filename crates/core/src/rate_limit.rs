//! Fixed-window request budget, keyed by `"purpose:clientAddress"`.
//!
//! The window table is the only process-wide mutable state in the system, so
//! it lives behind an explicitly constructed handle rather than a module
//! singleton. Check-and-increment is atomic per key under the table lock.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window_ms: i64,
    pub max_requests: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Seconds the caller must wait before retrying, rounded up, never zero.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_at - now).num_milliseconds().max(0);
        (millis as u64).div_ceil(1000).max(1)
    }
}

#[derive(Debug)]
struct Window {
    count: u32,
    reset_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, key: &str, config: &RateLimitConfig) -> RateLimitDecision {
        self.check_at(key, config, Utc::now())
    }

    /// Deterministic variant with an injected clock.
    pub fn check_at(
        &self,
        key: &str,
        config: &RateLimitConfig,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let mut windows = self.windows.lock().expect("rate limit table poisoned");

        // Lazy sweep: expired windows for other keys are dropped here instead
        // of on a timer.
        windows.retain(|entry_key, window| entry_key == key || window.reset_at > now);

        let window = windows.entry(key.to_string()).or_insert_with(|| Window {
            count: 0,
            reset_at: now + Duration::milliseconds(config.window_ms),
        });

        if window.reset_at <= now {
            window.count = 0;
            window.reset_at = now + Duration::milliseconds(config.window_ms);
        }

        if window.count >= config.max_requests {
            return RateLimitDecision { allowed: false, remaining: 0, reset_at: window.reset_at };
        }

        window.count += 1;
        RateLimitDecision {
            allowed: true,
            remaining: config.max_requests - window.count,
            reset_at: window.reset_at,
        }
    }
}
