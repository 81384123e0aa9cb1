//! Fixed-window rate limiting per endpoint
//!
//! The window opens on the first request for an endpoint and lasts 60s;
//! the first request after it elapses starts a fresh window. State is
//! process-local and resets on restart.

use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Window length
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Tracked endpoints above which expired windows are dropped
const PRUNE_THRESHOLD: usize = 256;

struct Window {
    count: u32,
    started: Instant,
}

/// Per-endpoint fixed-window limiter
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    /// Limiter allowing `requests_per_minute` calls per endpoint per window
    pub fn new(requests_per_minute: u32) -> Self {
        Self::with_window(requests_per_minute, RATE_LIMIT_WINDOW)
    }

    /// Limiter with a custom window
    pub fn with_window(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Calls allowed per window
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Count a call; fails once the window's budget is spent
    pub fn check(&self, endpoint: &str) -> Result<()> {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        if windows.len() >= PRUNE_THRESHOLD {
            let span = self.window;
            windows.retain(|_, w| now.duration_since(w.started) < span);
        }
        let window = windows.entry(endpoint.to_string()).or_insert(Window {
            count: 0,
            started: now,
        });

        if now.duration_since(window.started) >= self.window {
            window.count = 0;
            window.started = now;
        }

        if window.count >= self.limit {
            let retry_after = self.window.saturating_sub(now.duration_since(window.started));
            warn!(
                "Rate limit reached for {} ({} per {:?})",
                endpoint, self.limit, self.window
            );
            return Err(Error::RateLimitExceeded {
                endpoint: endpoint.to_string(),
                retry_after,
            });
        }

        window.count += 1;
        Ok(())
    }

    /// Calls left in the endpoint's current window
    pub fn remaining(&self, endpoint: &str) -> u32 {
        let windows = self.windows.lock();
        match windows.get(endpoint) {
            Some(window) if Instant::now().duration_since(window.started) < self.window => {
                self.limit.saturating_sub(window.count)
            }
            _ => self.limit,
        }
    }

    /// Forget all windows
    pub fn reset(&self) {
        self.windows.lock().clear();
    }

    /// Endpoints with a stored window, expired or not
    pub(crate) fn tracked_endpoints(&self) -> usize {
        self.windows.lock().len()
    }
}

/// Endpoint key for a URL or path: its last non-empty path segment
pub fn endpoint_key(url: &str) -> String {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest);
    let path = match without_scheme {
        Some(rest) => rest.find('/').map(|i| &rest[i..]).unwrap_or("/"),
        None => url,
    };
    let path = path.split(['?', '#']).next().unwrap_or(path);

    path.split('/')
        .filter(|segment| !segment.is_empty())
        .last()
        .unwrap_or("/")
        .to_string()
}
