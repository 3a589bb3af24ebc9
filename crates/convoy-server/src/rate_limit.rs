//! Fixed-window request limiter for the verification endpoints.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Default window: one hour.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(3600);

/// Outcome of a limit check. Carries the request count in the window,
/// including this request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Under the limit.
    Allowed(u32),
    /// Over the limit; the request was not counted.
    Exceeded(u32),
}

impl RateLimitResult {
    /// Whether the request may proceed.
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed(_))
    }
}

#[derive(Clone, Copy, Debug)]
struct Window {
    start: Instant,
    count: u32,
}

/// Counts requests per key in fixed windows.
pub struct RateLimiter {
    window: Duration,
    windows: DashMap<String, Window>,
}

/// Limiter key for an email address.
pub fn email_key(email: &str) -> String {
    format!("email:{}", email.trim().to_lowercase())
}

/// Limiter key for a client address.
pub fn ip_key(addr: &str) -> String {
    format!("ip:{addr}")
}

impl RateLimiter {
    /// Create a limiter with the given window length.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            windows: DashMap::new(),
        }
    }

    /// Count one request against `key` if it fits under `limit`.
    pub fn check_simple(&self, key: &str, limit: u32) -> RateLimitResult {
        self.check_at(key, limit, Instant::now())
    }

    /// [`Self::check_simple`] with an explicit clock.
    pub fn check_at(&self, key: &str, limit: u32, now: Instant) -> RateLimitResult {
        let mut entry = self.windows.entry(key.to_owned()).or_insert(Window {
            start: now,
            count: 0,
        });
        if now.saturating_duration_since(entry.start) >= self.window {
            *entry = Window {
                start: now,
                count: 0,
            };
        }
        if entry.count >= limit {
            return RateLimitResult::Exceeded(entry.count);
        }
        entry.count += 1;
        RateLimitResult::Allowed(entry.count)
    }

    /// Drop windows that have fully elapsed. Returns how many were removed.
    pub fn prune(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.start) < self.window);
        before - self.windows.len()
    }

    /// Keys currently tracked.
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}
