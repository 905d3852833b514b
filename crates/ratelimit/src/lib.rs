//! Admission control in front of the deep-search loop.
//!
//! A fixed-size rolling window counter scoped by key prefix: up to
//! `max_requests` admitted per `window_ms`, with a capped sleep-and-recheck
//! retry budget for callers that are denied. Denial after retries exhausted
//! is a value, never a panic.
//!
//! The trait seam allows an external (e.g. Redis-backed) implementation; the
//! in-process one keeps counters in a mutex-guarded map.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, warn};

/// Rate-limit window configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Admissions allowed per window.
    pub max_requests: u32,

    /// Window length in milliseconds.
    pub window_ms: u64,

    /// Recheck attempts before a denial becomes terminal.
    pub max_retries: u32,

    /// Scopes the counter; different prefixes are independent windows.
    pub key_prefix: String,
}

/// The result of one admission check.
#[derive(Debug, Clone, Copy)]
pub struct Admission {
    pub allowed: bool,

    /// Admissions left in the current window.
    pub remaining: u32,

    /// Milliseconds until the current window expires.
    pub reset_in_ms: u64,
}

/// The admission-control trait.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Check whether a unit of work may be admitted right now.
    async fn check(&self, config: &RateLimitConfig) -> Admission;

    /// Record one admitted unit of work.
    async fn record(&self, config: &RateLimitConfig);

    /// Wait for a slot, rechecking exactly `max_retries` times.
    ///
    /// Sleeps until the window expiry after a denied recheck — never
    /// busy-spins. Resolves `false` once the retry budget is exhausted;
    /// with `max_retries = 0` it never rechecks at all.
    async fn retry(&self, config: &RateLimitConfig) -> bool {
        for attempt in 1..=config.max_retries {
            let admission = self.check(config).await;
            if admission.allowed {
                return true;
            }
            debug!(
                key = %config.key_prefix,
                attempt,
                wait_ms = admission.reset_in_ms,
                "Rate limited, waiting for window"
            );
            sleep(Duration::from_millis(admission.reset_in_ms.max(1))).await;
        }

        warn!(key = %config.key_prefix, "Rate limit retries exhausted");
        false
    }
}

#[derive(Debug)]
struct Window {
    started_at: Instant,
    count: u32,
}

/// In-process sliding-window limiter.
///
/// Counters live behind one mutex so check and record are atomic with
/// respect to concurrent callers.
#[derive(Clone, Default)]
pub struct SlidingWindowLimiter {
    windows: Arc<Mutex<HashMap<String, Window>>>,
}

impl SlidingWindowLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Roll the window forward if it has fully elapsed, then return a
    /// snapshot of its state.
    async fn current_window(&self, config: &RateLimitConfig) -> (u32, u64) {
        let mut windows = self.windows.lock().await;
        let now = Instant::now();
        let window_len = Duration::from_millis(config.window_ms);

        let window = windows
            .entry(config.key_prefix.clone())
            .or_insert_with(|| Window {
                started_at: now,
                count: 0,
            });

        if now.duration_since(window.started_at) >= window_len {
            window.started_at = now;
            window.count = 0;
        }

        let elapsed = now.duration_since(window.started_at);
        let reset_in_ms = window_len.saturating_sub(elapsed).as_millis() as u64;
        (window.count, reset_in_ms)
    }
}

#[async_trait]
impl RateLimiter for SlidingWindowLimiter {
    async fn check(&self, config: &RateLimitConfig) -> Admission {
        let (count, reset_in_ms) = self.current_window(config).await;
        Admission {
            allowed: count < config.max_requests,
            remaining: config.max_requests.saturating_sub(count),
            reset_in_ms,
        }
    }

    async fn record(&self, config: &RateLimitConfig) {
        let mut windows = self.windows.lock().await;
        let now = Instant::now();
        let window_len = Duration::from_millis(config.window_ms);

        let window = windows
            .entry(config.key_prefix.clone())
            .or_insert_with(|| Window {
                started_at: now,
                count: 0,
            });

        if now.duration_since(window.started_at) >= window_len {
            window.started_at = now;
            window.count = 0;
        }

        window.count += 1;
    }
}
