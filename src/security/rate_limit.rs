//! Fixed-window per-client rate limiting.
//!
//! Each client identifier gets a counter that resets once more than one
//! window has elapsed since the last reset. Bursts straddling a window
//! boundary can reach twice the nominal rate; that approximation is accepted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::time;

use crate::config::RateLimitConfig;
use crate::observability::metrics;

/// Counter state for one client identifier.
#[derive(Debug, Clone, Copy)]
struct RateLimitEntry {
    count: u32,
    window_start: Instant,
}

/// Per-client fixed-window limiter.
///
/// The whole table sits behind one mutex so the reset-or-increment decision
/// is atomic across concurrent requests.
pub struct RateLimiter {
    entries: Mutex<HashMap<String, RateLimitEntry>>,
    max_requests: u32,
    window: Duration,
    stale_after: Duration,
    sweep_interval: Duration,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_requests: config.max_requests,
            window: Duration::from_secs(config.window_secs),
            stale_after: Duration::from_secs(config.stale_after_secs),
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
        }
    }

    /// Record a request from `client`. Returns `true` when the client is
    /// over its limit and the request must be rejected.
    pub fn exceeded(&self, client: &str) -> bool {
        self.exceeded_at(client, Instant::now())
    }

    /// [`exceeded`](Self::exceeded) evaluated at an explicit instant.
    pub fn exceeded_at(&self, client: &str, now: Instant) -> bool {
        let mut entries = self.entries.lock().expect("rate limiter mutex poisoned");

        let Some(entry) = entries.get_mut(client) else {
            entries.insert(
                client.to_string(),
                RateLimitEntry {
                    count: 1,
                    window_start: now,
                },
            );
            return false;
        };

        if now.saturating_duration_since(entry.window_start) > self.window {
            entry.count = 1;
            entry.window_start = now;
            return false;
        }

        entry.count = entry.count.saturating_add(1);
        entry.count > self.max_requests
    }

    /// Drop entries whose window started longer ago than the staleness
    /// threshold. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// [`sweep`](Self::sweep) evaluated at an explicit instant.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock().expect("rate limiter mutex poisoned");
        let before = entries.len();
        entries.retain(|_, entry| {
            now.saturating_duration_since(entry.window_start) <= self.stale_after
        });
        let removed = before - entries.len();
        metrics::record_rate_limit_entries(entries.len());
        removed
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("rate limiter mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run [`sweep`](Self::sweep) on a fixed interval until shutdown.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(self.sweep_interval);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.sweep();
                        if removed > 0 {
                            tracing::debug!(
                                removed,
                                remaining = self.len(),
                                "Swept stale rate limit entries"
                            );
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::info!("Rate limit sweeper received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        })
    }
}
