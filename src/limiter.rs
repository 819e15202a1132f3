//! Rate Limiter
//!
//! Rolling-window admission control for outbound calls to the remote generation
//! and sync service. Three conditions must hold before a call is admitted:
//!
//! - fewer than `max_per_window` calls in the trailing window (default 60s)
//! - at least `min_inter_call` since the most recent call
//! - fewer than `burst_limit` calls in the trailing burst sub-window (default 5s)
//!
//! Waiting is cooperative: the limiter computes how long the caller must sleep
//! from the ledger and sleeps once, rather than polling.

use crate::error::ApiError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Rate limiter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum calls admitted within any trailing window
    #[serde(default = "default_max_per_window")]
    pub max_per_window: usize,

    /// Length of the rolling window (seconds)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Minimum spacing between two consecutive calls (milliseconds)
    #[serde(default = "default_min_inter_call_ms")]
    pub min_inter_call_ms: u64,

    /// Maximum calls within the burst sub-window
    #[serde(default = "default_burst_limit")]
    pub burst_limit: usize,

    /// Length of the burst sub-window (seconds)
    #[serde(default = "default_burst_window_secs")]
    pub burst_window_secs: u64,

    /// Added to waits derived from the oldest ledger entry (milliseconds)
    #[serde(default = "default_safety_margin_ms")]
    pub safety_margin_ms: u64,
}

fn default_max_per_window() -> usize {
    5
}

fn default_window_secs() -> u64 {
    60
}

fn default_min_inter_call_ms() -> u64 {
    10_000
}

fn default_burst_limit() -> usize {
    1
}

fn default_burst_window_secs() -> u64 {
    5
}

fn default_safety_margin_ms() -> u64 {
    250
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_per_window: default_max_per_window(),
            window_secs: default_window_secs(),
            min_inter_call_ms: default_min_inter_call_ms(),
            burst_limit: default_burst_limit(),
            burst_window_secs: default_burst_window_secs(),
            safety_margin_ms: default_safety_margin_ms(),
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn min_inter_call(&self) -> Duration {
        Duration::from_millis(self.min_inter_call_ms)
    }

    pub fn burst_window(&self) -> Duration {
        Duration::from_secs(self.burst_window_secs)
    }

    pub fn safety_margin(&self) -> Duration {
        Duration::from_millis(self.safety_margin_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_per_window == 0 {
            return Err("max_per_window must be at least 1".to_string());
        }
        if self.burst_limit == 0 {
            return Err("burst_limit must be at least 1".to_string());
        }
        if self.window_secs == 0 {
            return Err("window_secs must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Ordered ledger of admitted call timestamps
#[derive(Debug, Default, Clone)]
pub struct RequestWindow {
    timestamps: VecDeque<Instant>,
}

impl RequestWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> impl Iterator<Item = &Instant> {
        self.timestamps.iter()
    }

    /// Drop entries that fell out of the trailing window ending at `now`
    pub fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.timestamps.front() {
            if now.saturating_duration_since(*oldest) >= window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// How long a call arriving at `now` must wait. Zero means admissible.
    pub fn wait_time(&mut self, now: Instant, config: &RateLimitConfig) -> Duration {
        self.prune(now, config.window());

        let mut wait = Duration::ZERO;

        if self.timestamps.len() >= config.max_per_window {
            // Window full: wait for the oldest entry to age out
            let overflow = self.timestamps.len() + 1 - config.max_per_window;
            if let Some(anchor) = self.timestamps.get(overflow - 1) {
                let ready = *anchor + config.window() + config.safety_margin();
                wait = wait.max(ready.saturating_duration_since(now));
            }
        }

        if let Some(last) = self.timestamps.back() {
            let ready = *last + config.min_inter_call();
            wait = wait.max(ready.saturating_duration_since(now));
        }

        let burst_window = config.burst_window();
        let in_burst = self
            .timestamps
            .iter()
            .filter(|ts| now.saturating_duration_since(**ts) < burst_window)
            .count();
        if in_burst >= config.burst_limit {
            let first_in_burst = self.timestamps.len() - in_burst;
            let overflow = in_burst + 1 - config.burst_limit;
            if let Some(anchor) = self.timestamps.get(first_in_burst + overflow - 1) {
                let ready = *anchor + burst_window + config.safety_margin();
                wait = wait.max(ready.saturating_duration_since(now));
            }
        }

        wait
    }

    pub fn record(&mut self, at: Instant) {
        self.timestamps.push_back(at);
    }

    /// Keep only the `keep` most recent entries
    pub fn retain_latest(&mut self, keep: usize) {
        while self.timestamps.len() > keep {
            self.timestamps.pop_front();
        }
    }
}

/// Shared limiter for all outbound generation calls
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    window: Mutex<RequestWindow>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            window: Mutex::new(RequestWindow::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Wait until a call is admissible, then record it. Never drops the caller.
    pub async fn admit(&self) {
        while let Some(wait) = self.try_admit() {
            sleep(wait).await;
        }
    }

    /// Like `admit`, but gives up with `ApiError::Cancelled` once `cancel` fires.
    pub async fn admit_or_cancel(&self, cancel: &CancellationToken) -> Result<(), ApiError> {
        loop {
            if cancel.is_cancelled() {
                return Err(ApiError::Cancelled);
            }
            let Some(wait) = self.try_admit() else {
                return Ok(());
            };
            tokio::select! {
                _ = cancel.cancelled() => return Err(ApiError::Cancelled),
                _ = sleep(wait) => {}
            }
        }
    }

    /// Admit immediately if possible; otherwise return the required wait.
    pub fn try_admit(&self) -> Option<Duration> {
        let now = Instant::now();
        let mut window = self.window.lock();
        let wait = window.wait_time(now, &self.config);
        if wait.is_zero() {
            window.record(now);
            None
        } else {
            debug!(
                wait_ms = wait.as_millis() as u64,
                recent_calls = window.len(),
                "Rate limiter holding call"
            );
            Some(wait)
        }
    }

    /// Trim the ledger after a throttling response so stale history does not
    /// immediately re-block the retry.
    pub fn retain_latest(&self, keep: usize) {
        self.window.lock().retain_latest(keep);
    }

    pub fn recent_calls(&self) -> usize {
        self.window.lock().len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
