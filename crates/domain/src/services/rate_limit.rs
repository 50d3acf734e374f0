//! Fixed-window request limiting keyed by `ip:path`.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration as StdDuration,
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use tokio::{sync::oneshot, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, warn};

use crate::storage::{StorageError, StorageResult};

pub const DEFAULT_SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCounter {
    pub count: u32,
    pub window_start: DateTime<Utc>,
}

/// Counter backend. The in-memory store is per process; a shared backend can
/// implement this trait for multi-instance deployments.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Records one hit for `key`, opening a fresh window when the stored one
    /// started at or before `now - window`.
    async fn hit(
        &self,
        key: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> StorageResult<WindowCounter>;
    /// Drops windows that started before `cutoff`, returning how many went.
    async fn evict_before(&self, cutoff: DateTime<Utc>) -> StorageResult<usize>;
}

#[derive(Clone, Default)]
pub struct InMemoryRateLimitStore {
    inner: Arc<Mutex<HashMap<String, WindowCounter>>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, WindowCounter>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn hit(
        &self,
        key: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> StorageResult<WindowCounter> {
        let mut guard = self.lock();
        let entry = guard.entry(key.to_owned()).or_insert(WindowCounter {
            count: 0,
            window_start: now,
        });
        if now - entry.window_start >= window {
            *entry = WindowCounter {
                count: 0,
                window_start: now,
            };
        }
        entry.count = entry.count.saturating_add(1);
        Ok(*entry)
    }

    async fn evict_before(&self, cutoff: DateTime<Utc>) -> StorageResult<usize> {
        let mut guard = self.lock();
        let before = guard.len();
        guard.retain(|_, counter| counter.window_start >= cutoff);
        Ok(before - guard.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after_secs: u64 },
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    window: Duration,
    max_requests: u32,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, window: StdDuration, max_requests: u32) -> Self {
        Self {
            store,
            window: Duration::from_std(window).unwrap_or_else(|_| Duration::minutes(15)),
            max_requests: max_requests.max(1),
        }
    }

    pub fn in_memory(window: StdDuration, max_requests: u32) -> Self {
        Self::new(Arc::new(InMemoryRateLimitStore::new()), window, max_requests)
    }

    pub fn key(identifier: &str, path: &str) -> String {
        format!("{identifier}:{path}")
    }

    /// Counts the request and decides. Store failures let the request through.
    pub async fn check(&self, identifier: &str, path: &str, now: DateTime<Utc>) -> RateDecision {
        let key = Self::key(identifier, path);
        let counter = match self.store.hit(&key, now, self.window).await {
            Ok(counter) => counter,
            Err(err) => {
                warn!(%key, error = %err, "rate limit store failed; allowing request");
                return RateDecision::Allowed {
                    remaining: self.max_requests,
                };
            }
        };

        if counter.count > self.max_requests {
            counter!("rate_limit_rejections_total").increment(1);
            let reset_at = counter.window_start + self.window;
            let retry_after_secs = (reset_at - now).num_seconds().max(1) as u64;
            RateDecision::Limited { retry_after_secs }
        } else {
            RateDecision::Allowed {
                remaining: self.max_requests - counter.count,
            }
        }
    }

    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, StorageError> {
        self.store.evict_before(now - self.window).await
    }

    /// Starts the periodic eviction task. The returned handle must be shut
    /// down when the process stops serving.
    pub fn spawn_sweeper(&self, every: StdDuration) -> SweeperHandle {
        let limiter = self.clone();
        let (tx, mut rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut rx => break,
                    _ = ticker.tick() => {
                        match limiter.sweep(Utc::now()).await {
                            Ok(evicted) => debug!(evicted, "rate limit sweep finished"),
                            Err(err) => warn!(error = %err, "rate limit sweep failed"),
                        }
                    }
                }
            }
        });
        SweeperHandle {
            shutdown: Some(tx),
            task,
        }
    }
}

pub struct SweeperHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(err) = (&mut self.task).await {
            warn!(error = %err, "rate limit sweeper ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: StdDuration = StdDuration::from_secs(60);

    #[tokio::test]
    async fn allows_up_to_limit_then_rejects() {
        let limiter = RateLimiter::in_memory(WINDOW, 2);
        let now = Utc::now();

        assert_eq!(
            limiter.check("1.1.1.1", "/upload", now).await,
            RateDecision::Allowed { remaining: 1 }
        );
        assert_eq!(
            limiter.check("1.1.1.1", "/upload", now).await,
            RateDecision::Allowed { remaining: 0 }
        );
        assert_eq!(
            limiter.check("1.1.1.1", "/upload", now).await,
            RateDecision::Limited {
                retry_after_secs: 60
            }
        );
    }

    #[tokio::test]
    async fn keys_are_scoped_by_ip_and_path() {
        let limiter = RateLimiter::in_memory(WINDOW, 1);
        let now = Utc::now();
        assert!(matches!(
            limiter.check("1.1.1.1", "/a", now).await,
            RateDecision::Allowed { .. }
        ));
        assert!(matches!(
            limiter.check("1.1.1.1", "/b", now).await,
            RateDecision::Allowed { .. }
        ));
        assert!(matches!(
            limiter.check("2.2.2.2", "/a", now).await,
            RateDecision::Allowed { .. }
        ));
        assert!(matches!(
            limiter.check("1.1.1.1", "/a", now).await,
            RateDecision::Limited { .. }
        ));
    }

    #[tokio::test]
    async fn window_resets_after_expiry() {
        let limiter = RateLimiter::in_memory(WINDOW, 1);
        let start = Utc::now();
        limiter.check("ip", "/p", start).await;
        assert!(matches!(
            limiter.check("ip", "/p", start + Duration::seconds(30)).await,
            RateDecision::Limited {
                retry_after_secs: 30
            }
        ));
        assert_eq!(
            limiter.check("ip", "/p", start + Duration::seconds(60)).await,
            RateDecision::Allowed { remaining: 0 }
        );
    }

    #[tokio::test]
    async fn sweep_evicts_stale_windows() {
        let store = Arc::new(InMemoryRateLimitStore::new());
        let limiter = RateLimiter::new(store.clone(), WINDOW, 10);
        let start = Utc::now();
        limiter.check("old", "/p", start).await;
        limiter
            .check("fresh", "/p", start + Duration::seconds(90))
            .await;

        let evicted = limiter.sweep(start + Duration::seconds(100)).await.unwrap();
        assert_eq!(evicted, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn sweeper_shuts_down_cleanly() {
        let limiter = RateLimiter::in_memory(WINDOW, 10);
        let handle = limiter.spawn_sweeper(StdDuration::from_millis(10));
        tokio::time::sleep(StdDuration::from_millis(30)).await;
        handle.shutdown().await;
    }
}
