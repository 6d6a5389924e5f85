//! Fixed-window rate limiting per client.
//!
//! Each client key (the peer IP of the connection) owns a window
//! `{count, reset_time}`. Requests increment the count while the window is
//! open; once it expires the next request opens a fresh window. A request is
//! rejected once the count exceeds the configured maximum.
//!
//! Expired windows are swept lazily, at most once per window length, from
//! within [`FixedWindowLimiter::check`].

use agentlink_types::clock::{system_clock, SharedClock};
use agentlink_types::error::LinkError;
use axum::extract::ConnectInfo;
use axum::http::Extensions;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Mutex;

/// One client's current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitWindow {
    pub count: u32,
    pub reset_time: DateTime<Utc>,
}

/// Per-client fixed-window request counter.
pub struct FixedWindowLimiter {
    windows: DashMap<String, RateLimitWindow>,
    max: u32,
    window: Duration,
    clock: SharedClock,
    next_sweep: Mutex<DateTime<Utc>>,
}

impl FixedWindowLimiter {
    /// `max` requests per `window_secs` per client.
    pub fn new(max: u32, window_secs: u64) -> Self {
        let clock = system_clock();
        let window = Duration::seconds(window_secs.max(1) as i64);
        let next_sweep = clock.now() + window;
        Self {
            windows: DashMap::new(),
            max,
            window,
            clock,
            next_sweep: Mutex::new(next_sweep),
        }
    }

    /// Replace the time source, restarting the sweep schedule from its now.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.next_sweep = Mutex::new(clock.now() + self.window);
        self.clock = clock;
        self
    }

    /// Count one request for `key`.
    pub fn check(&self, key: &str) -> Result<(), LinkError> {
        let now = self.clock.now();
        self.sweep(now);

        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert(RateLimitWindow {
                count: 0,
                reset_time: now + self.window,
            });
        if now >= entry.reset_time {
            *entry = RateLimitWindow {
                count: 0,
                reset_time: now + self.window,
            };
        }
        entry.count = entry.count.saturating_add(1);

        if entry.count > self.max {
            let remaining = (entry.reset_time - now).num_milliseconds().max(0);
            let retry_after_secs = ((remaining + 999) / 1000).max(1) as u64;
            tracing::warn!(
                client = %key,
                count = entry.count,
                retry_after_secs,
                "Rate limit exceeded"
            );
            return Err(LinkError::RateLimited { retry_after_secs });
        }
        Ok(())
    }

    /// Window state for `key`, if one is tracked.
    pub fn window(&self, key: &str) -> Option<RateLimitWindow> {
        self.windows.get(key).map(|w| *w)
    }

    /// Number of tracked clients.
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }

    fn sweep(&self, now: DateTime<Utc>) {
        {
            let mut next = self.next_sweep.lock().unwrap_or_else(|e| e.into_inner());
            if now < *next {
                return;
            }
            *next = now + self.window;
        }
        let before = self.windows.len();
        self.windows.retain(|_, w| w.reset_time > now);
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            tracing::debug!(removed, "Swept expired rate-limit windows");
        }
    }
}

/// Peer address recorded by `into_make_service_with_connect_info`.
pub fn peer_addr(extensions: &Extensions) -> Option<SocketAddr> {
    extensions.get::<ConnectInfo<SocketAddr>>().map(|ci| ci.0)
}

/// Rate-limit key for a request: the peer IP.
///
/// `X-Agent-Id` is caller-supplied and unauthenticated at this point, so it
/// never selects the budget.
pub fn client_key(peer: Option<SocketAddr>) -> String {
    peer.map(|p| format!("ip:{}", p.ip()))
        .unwrap_or_else(|| "unknown".to_string())
}
