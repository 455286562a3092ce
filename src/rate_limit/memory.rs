//! In-process counters, and the store used when limiting is disabled.

use async_trait::async_trait;
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

use super::{Hit, RateLimitStore};
use crate::error::Result;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u64,
    resets_at: Instant,
}

/// Fixed windows in a mutex-guarded map.
#[derive(Default)]
pub struct MemoryRateLimitStore {
    windows: Mutex<HashMap<String, Window>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn incr(&self, key: &str, window: Duration) -> Result<Hit> {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;

        // Evict expired windows so the map tracks only active clients
        windows.retain(|_, w| w.resets_at > now);

        let entry = windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            resets_at: now + window,
        });
        entry.count += 1;

        Ok(Hit {
            count: entry.count,
            reset_after: entry.resets_at.saturating_duration_since(now),
        })
    }

    async fn decrement(&self, key: &str) -> Result<()> {
        let mut windows = self.windows.lock().await;
        if let Some(w) = windows.get_mut(key) {
            w.count = w.count.saturating_sub(1);
        }
        Ok(())
    }

    async fn reset_key(&self, key: &str) -> Result<()> {
        self.windows.lock().await.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Always permits; every hit reports a count of zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRateLimitStore;

#[async_trait]
impl RateLimitStore for NoopRateLimitStore {
    async fn incr(&self, _key: &str, window: Duration) -> Result<Hit> {
        Ok(Hit {
            count: 0,
            reset_after: window,
        })
    }

    async fn decrement(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    async fn reset_key(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "disabled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts_within_window() {
        let store = MemoryRateLimitStore::new();
        let window = Duration::from_secs(60);
        assert_eq!(store.incr("k", window).await.unwrap().count, 1);
        let hit = store.incr("k", window).await.unwrap();
        assert_eq!(hit.count, 2);
        assert!(hit.reset_after <= window);
        assert_eq!(store.incr("other", window).await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_decrement_and_reset() {
        let store = MemoryRateLimitStore::new();
        let window = Duration::from_secs(60);
        store.incr("k", window).await.unwrap();
        store.incr("k", window).await.unwrap();
        store.decrement("k").await.unwrap();
        assert_eq!(store.incr("k", window).await.unwrap().count, 2);
        store.reset_key("k").await.unwrap();
        assert_eq!(store.incr("k", window).await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_window_restarts_after_expiry() {
        let store = MemoryRateLimitStore::new();
        let window = Duration::from_millis(50);
        store.incr("k", window).await.unwrap();
        store.incr("k", window).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.incr("k", window).await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_noop_never_counts() {
        let store = NoopRateLimitStore;
        for _ in 0..10 {
            assert_eq!(store.incr("k", Duration::from_secs(1)).await.unwrap().count, 0);
        }
    }
}
