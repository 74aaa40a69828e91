use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the current window resets.
    pub reset_after: u64,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window limiter keyed by client address.
#[derive(Debug, Clone)]
pub struct ApiRateLimiter {
    window: Duration,
    max_requests: u32,
    buckets: Arc<DashMap<String, Window>>,
}

impl ApiRateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            buckets: Arc::new(DashMap::new()),
        }
    }

    pub fn check(&self, key: &str) -> Decision {
        let now = Instant::now();
        let window = self.window;

        let mut entry = self.buckets.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        let elapsed = now.duration_since(entry.started);
        let reset_after = ceil_secs(window.saturating_sub(elapsed));

        if entry.count >= self.max_requests {
            return Decision {
                allowed: false,
                limit: self.max_requests,
                remaining: 0,
                reset_after,
            };
        }

        entry.count += 1;
        Decision {
            allowed: true,
            limit: self.max_requests,
            remaining: self.max_requests - entry.count,
            reset_after,
        }
    }

    /// Drop buckets whose window has already elapsed.
    pub fn prune(&self) {
        let now = Instant::now();
        let window = self.window;
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.started) < window);
    }

    /// Prune once per window until `shutdown` flips to true.
    pub fn spawn_pruner(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.window.max(Duration::from_secs(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.prune(),
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }

    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn window_admits_up_to_limit_then_resets() {
        let limiter = ApiRateLimiter::new(Duration::from_secs(60), 2);

        let first = limiter.check("10.0.0.1");
        assert!(first.allowed);
        assert_eq!(first.remaining, 1);
        assert_eq!(first.reset_after, 60);

        assert!(limiter.check("10.0.0.1").allowed);
        let denied = limiter.check("10.0.0.1");
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);

        // Other clients have their own window.
        assert!(limiter.check("10.0.0.2").allowed);

        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(limiter.check("10.0.0.1").reset_after, 15);

        tokio::time::advance(Duration::from_secs(15)).await;
        let fresh = limiter.check("10.0.0.1");
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn prune_drops_expired_buckets() {
        let limiter = ApiRateLimiter::new(Duration::from_secs(10), 5);
        limiter.check("a");
        limiter.check("b");
        assert_eq!(limiter.tracked_clients(), 2);

        tokio::time::advance(Duration::from_secs(11)).await;
        limiter.check("b");
        limiter.prune();
        assert_eq!(limiter.tracked_clients(), 1);
    }
}
